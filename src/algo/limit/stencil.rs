//! Per-vertex limit stencils.
//!
//! A stencil is the part of a vertex's neighbourhood that the Catmull-Clark
//! limit mask touches: the edge-connected ring and the face-diagonal ring.
//! Stencils are gathered once from the half-edge structure and then reused for
//! every relaxation sweep, so the sweeps only touch flat index lists.

use nalgebra::{Point3, Vector3};

use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

/// Weights of the Catmull-Clark limit mask for one valence.
///
/// For a vertex `v` of valence `n` the limit position is
/// `L = vertex·v + adjacent·Σadj + diagonal·Σdiag`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitWeights {
    /// Weight of the vertex itself, `n / (n + 5)`.
    pub vertex: f64,
    /// Weight applied to the sum of edge neighbours, `4 / (n (n + 5))`.
    pub adjacent: f64,
    /// Weight applied to the sum of face-diagonal neighbours, `1 / (n (n + 5))`.
    pub diagonal: f64,
}

impl LimitWeights {
    /// Mask weights for valence `n`, or `None` when `n < 3`.
    ///
    /// Vertices with fewer than three edges (open corners, dangling
    /// vertices) have no usable mask and are left alone.
    pub fn for_valence(n: usize) -> Option<Self> {
        if n < 3 {
            return None;
        }
        let n = n as f64;
        let denom = n * (n + 5.0);
        Some(Self {
            vertex: n / (n + 5.0),
            adjacent: 4.0 / denom,
            diagonal: 1.0 / denom,
        })
    }
}

/// Neighbourhood of one vertex, as raw vertex indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexStencil {
    /// Edge-connected neighbours, in rotation order.
    pub adjacent: Vec<usize>,
    /// Vertices sharing a face with the vertex that are neither the vertex
    /// nor edge-connected. Collected face by face; a vertex reached through
    /// two faces appears twice.
    pub diagonal: Vec<usize>,
}

impl VertexStencil {
    /// Number of incident edges.
    #[inline]
    pub fn valence(&self) -> usize {
        self.adjacent.len()
    }

    /// Limit mask weights for this stencil's valence.
    #[inline]
    pub fn weights(&self) -> Option<LimitWeights> {
        LimitWeights::for_valence(self.valence())
    }

    fn sums(&self, positions: &[Point3<f64>]) -> (Vector3<f64>, Vector3<f64>) {
        let adj: Vector3<f64> = self.adjacent.iter().map(|&u| positions[u].coords).sum();
        let diag: Vector3<f64> = self.diagonal.iter().map(|&u| positions[u].coords).sum();
        (adj, diag)
    }
}

/// Limit stencils for every vertex of a mesh.
#[derive(Debug, Clone, Default)]
pub struct LimitStencils {
    stencils: Vec<VertexStencil>,
}

impl LimitStencils {
    /// Gather stencils from a mesh.
    pub fn build<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Self {
        let stencils = mesh
            .vertex_ids()
            .map(|v| build_vertex_stencil(mesh, v))
            .collect();
        Self { stencils }
    }

    /// Number of stencils (= vertices).
    #[inline]
    pub fn len(&self) -> usize {
        self.stencils.len()
    }

    /// True if there are no stencils.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stencils.is_empty()
    }

    /// Stencil of vertex `v`.
    #[inline]
    pub fn get(&self, v: usize) -> &VertexStencil {
        &self.stencils[v]
    }

    /// Iterate over stencils in vertex order.
    pub fn iter(&self) -> impl Iterator<Item = &VertexStencil> + '_ {
        self.stencils.iter()
    }

    /// Number of vertices the relaxation will move (valence ≥ 3).
    pub fn num_relaxable(&self) -> usize {
        self.stencils.iter().filter(|s| s.valence() >= 3).count()
    }

    /// Forward limit operator for one vertex.
    ///
    /// Returns the vertex's own position when its valence is below 3.
    pub fn limit_position(&self, positions: &[Point3<f64>], v: usize) -> Point3<f64> {
        let stencil = &self.stencils[v];
        match stencil.weights() {
            Some(w) => {
                let (adj, diag) = stencil.sums(positions);
                Point3::from(positions[v].coords * w.vertex + adj * w.adjacent + diag * w.diagonal)
            }
            None => positions[v],
        }
    }

    /// Forward limit operator for every vertex.
    pub fn limit_positions(&self, positions: &[Point3<f64>]) -> Vec<Point3<f64>> {
        (0..self.stencils.len())
            .map(|v| self.limit_position(positions, v))
            .collect()
    }

    /// Solve the limit mask for the vertex position, holding neighbours fixed.
    ///
    /// This is the exact inverse of [`limit_position`](Self::limit_position):
    /// `v = (anchor − adjacent·Σadj − diagonal·Σdiag) / vertex`.
    /// Returns `None` when the vertex has valence below 3.
    pub fn relaxed_position(
        &self,
        positions: &[Point3<f64>],
        v: usize,
        anchor: &Point3<f64>,
    ) -> Option<Point3<f64>> {
        let stencil = &self.stencils[v];
        let w = stencil.weights()?;
        let (adj, diag) = stencil.sums(positions);
        Some(Point3::from(
            (anchor.coords - adj * w.adjacent - diag * w.diagonal) / w.vertex,
        ))
    }
}

fn build_vertex_stencil<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> VertexStencil {
    let adjacent: Vec<usize> = mesh.vertex_neighbors(v).map(|u| u.index()).collect();

    let mut diagonal = Vec::new();
    for f in mesh.vertex_faces(v) {
        for u in mesh.face_vertices(f) {
            let u = u.index();
            if u != v.index() && !adjacent.contains(&u) {
                diagonal.push(u);
            }
        }
    }

    VertexStencil { adjacent, diagonal }
}

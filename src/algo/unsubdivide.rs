//! Topology reduction: undoing Catmull-Clark levels.
//!
//! One Catmull-Clark step turns every n-gon into n quads of the form
//! `[original, edge, face, edge]`. Reading that pattern back tells which fine
//! vertices were original points; those become the coarse vertices, and every
//! face point becomes one coarse face whose corners are the original points
//! diagonally across its quads.
//!
//! Classification floods outward from a seed vertex. The seed is chosen where
//! the labelling is least ambiguous: an interior vertex whose valence is not 4
//! (edge points always have valence 4 inside the surface), then a boundary
//! vertex with valence 2 (an open corner of the original mesh), then the
//! lowest index. Face points never lie on the boundary, which fixes the one
//! remaining ambiguity of open meshes.
//!
//! Positions of the original points are kept as they are. Turning them into a
//! proper control cage is the job of [`limit`](crate::algo::limit).

use crate::algo::Progress;
use crate::error::{MeshError, Result};
use crate::mesh::{build_from_polygons, HalfEdgeMesh, MeshIndex, VertexId};

/// Options for [`unsubdivide`].
#[derive(Debug, Clone)]
pub struct UnsubdivideOptions {
    /// Number of Catmull-Clark levels to undo (default: 2).
    pub levels: usize,
}

impl Default for UnsubdivideOptions {
    fn default() -> Self {
        Self { levels: 2 }
    }
}

impl UnsubdivideOptions {
    /// Create options that undo `levels` subdivision steps.
    pub fn new(levels: usize) -> Self {
        Self { levels }
    }

    /// Set the number of levels.
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }
}

/// Role of a fine vertex in one Catmull-Clark step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointKind {
    /// A vertex of the coarser mesh.
    Original,
    /// Inserted on a coarse edge.
    Edge,
    /// Inserted at a coarse face centre.
    Face,
}

impl PointKind {
    /// The kind found diagonally across a quad.
    fn opposite(self) -> Self {
        match self {
            PointKind::Original => PointKind::Face,
            PointKind::Face => PointKind::Original,
            PointKind::Edge => PointKind::Edge,
        }
    }
}

/// Undo `options.levels` Catmull-Clark steps.
///
/// Returns a new mesh; the input is not modified. Zero levels returns a copy.
///
/// # Errors
/// [`MeshError::NotSubdivided`](crate::error::MeshError::NotSubdivided) when a
/// level is not all quads or its vertices cannot be consistently classified.
///
/// # Example
///
/// ```
/// use unsubd::algo::subdivide::{catmull_clark_subdivide, SubdivideOptions};
/// use unsubd::algo::unsubdivide::{unsubdivide, UnsubdivideOptions};
/// use unsubd::mesh::{build_from_quads, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(1.0, 1.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let mut mesh: HalfEdgeMesh = build_from_quads(&vertices, &[[0, 1, 2, 3]]).unwrap();
/// catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(2)).unwrap();
/// assert_eq!(mesh.num_faces(), 16);
///
/// let coarse = unsubdivide(&mesh, &UnsubdivideOptions::new(2)).unwrap();
/// assert_eq!(coarse.num_vertices(), 4);
/// assert_eq!(coarse.num_faces(), 1);
/// ```
pub fn unsubdivide<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    options: &UnsubdivideOptions,
) -> Result<HalfEdgeMesh<I>> {
    unsubdivide_with_progress(mesh, options, &Progress::none())
}

/// [`unsubdivide`] with progress reporting, one step per level.
pub fn unsubdivide_with_progress<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    options: &UnsubdivideOptions,
    progress: &Progress,
) -> Result<HalfEdgeMesh<I>> {
    let mut current = mesh.clone();

    for level in 1..=options.levels {
        progress.report(level - 1, options.levels, "Un-subdividing");
        current = unsubdivide_once(&current, level)?;
        log::debug!(
            "un-subdivision level {}: {} vertices, {} faces",
            level,
            current.num_vertices(),
            current.num_faces()
        );
    }
    progress.report(options.levels, options.levels, "Un-subdividing");

    Ok(current)
}

/// Classify every vertex of a quad mesh as an original, edge or face point.
///
/// Vertices not used by any face are `None`. `level` only labels errors.
pub fn classify_points<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    level: usize,
) -> Result<Vec<Option<PointKind>>> {
    if mesh.num_faces() == 0 {
        return Err(MeshError::not_subdivided(level, "mesh has no faces"));
    }
    if let Some(f) = mesh.face_ids().find(|&f| mesh.face_vertex_count(f) != 4) {
        return Err(MeshError::not_subdivided(
            level,
            format!("face {} has {} sides", f.index(), mesh.face_vertex_count(f)),
        ));
    }

    let mut labels: Vec<Option<PointKind>> = vec![None; mesh.num_vertices()];

    for v in mesh.vertex_ids() {
        if labels[v.index()].is_some() || mesh.vertex_faces(v).next().is_none() {
            continue;
        }

        let component = collect_component(mesh, v);
        let seed = choose_seed(mesh, &component);

        let candidates = std::iter::once(seed).chain(mesh.vertex_neighbors(seed));
        let mut resolved = false;
        for candidate in candidates {
            if let Some(found) = try_classify(mesh, candidate, &component, &labels) {
                labels = found;
                resolved = true;
                break;
            }
            log::trace!("seed {} gives a conflicting classification", candidate.index());
        }

        if !resolved {
            return Err(MeshError::not_subdivided(
                level,
                format!(
                    "no consistent original/edge/face labelling around vertex {}",
                    seed.index()
                ),
            ));
        }
    }

    Ok(labels)
}

/// Undo one Catmull-Clark step.
fn unsubdivide_once<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, level: usize) -> Result<HalfEdgeMesh<I>> {
    let labels = classify_points(mesh, level)?;

    // Coarse vertices: original points in fine-index order
    let mut remap = vec![usize::MAX; mesh.num_vertices()];
    let mut vertices = Vec::new();
    for v in mesh.vertex_ids() {
        if labels[v.index()] == Some(PointKind::Original) {
            remap[v.index()] = vertices.len();
            vertices.push(*mesh.position(v));
        }
    }

    let unused = labels.iter().filter(|l| l.is_none()).count();
    if unused > 0 {
        log::warn!("un-subdivision level {}: dropping {} unused vertices", level, unused);
    }

    // Coarse faces: one per face point, corners read across its quads
    let mut faces: Vec<Vec<usize>> = Vec::new();
    for v in mesh.vertex_ids() {
        if labels[v.index()] == Some(PointKind::Face) {
            faces.push(face_ring(mesh, v, &remap, level)?);
        }
    }

    build_from_polygons(&vertices, &faces).map_err(|e| {
        MeshError::not_subdivided(level, format!("recovered faces do not form a valid mesh: {}", e))
    })
}

/// Coarse face around face point `fp`, in the fine mesh's winding.
fn face_ring<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    fp: VertexId<I>,
    remap: &[usize],
    level: usize,
) -> Result<Vec<usize>> {
    let start = mesh.vertex(fp).halfedge;
    let mut ring = Vec::new();
    let mut he = start;

    loop {
        if !he.is_valid() || mesh.is_boundary_halfedge(he) || ring.len() > mesh.num_faces() {
            return Err(MeshError::not_subdivided(
                level,
                format!("face point {} is not surrounded by quads", fp.index()),
            ));
        }

        // Quad is [fp, edge, original, edge]
        let corner = mesh.origin(mesh.next(mesh.next(he)));
        let coarse = remap[corner.index()];
        if coarse == usize::MAX {
            return Err(MeshError::not_subdivided(
                level,
                format!("vertex {} opposite a face point is not an original point", corner.index()),
            ));
        }
        ring.push(coarse);

        he = mesh.twin(mesh.prev(he));
        if he == start {
            break;
        }
    }

    Ok(ring)
}

/// Vertices reachable from `start` along edges.
fn collect_component<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, start: VertexId<I>) -> Vec<VertexId<I>> {
    let mut visited = vec![false; mesh.num_vertices()];
    let mut stack = vec![start];
    let mut component = Vec::new();
    visited[start.index()] = true;

    while let Some(v) = stack.pop() {
        component.push(v);
        for u in mesh.vertex_neighbors(v) {
            if !visited[u.index()] {
                visited[u.index()] = true;
                stack.push(u);
            }
        }
    }

    component.sort_unstable_by_key(|v| v.index());
    component
}

fn choose_seed<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, component: &[VertexId<I>]) -> VertexId<I> {
    let interior_irregular = component
        .iter()
        .find(|&&v| !mesh.is_boundary_vertex(v) && mesh.valence(v) != 4);
    let open_corner = || {
        component
            .iter()
            .find(|&&v| mesh.is_boundary_vertex(v) && mesh.valence(v) == 2)
    };

    // Components are never empty; they contain their start vertex
    interior_irregular
        .or_else(open_corner)
        .or(component.first())
        .copied()
        .unwrap_or_default()
}

/// Flood from `seed` labelled as an original point.
///
/// Returns the updated labels, or `None` on a conflict.
fn try_classify<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    seed: VertexId<I>,
    component: &[VertexId<I>],
    labels: &[Option<PointKind>],
) -> Option<Vec<Option<PointKind>>> {
    let mut labels = labels.to_vec();
    flood(mesh, seed, &mut labels)?;

    // Face points are interior; if one landed on the boundary the
    // original/face roles are swapped
    let face_on_boundary = |labels: &[Option<PointKind>]| {
        component
            .iter()
            .any(|&v| labels[v.index()] == Some(PointKind::Face) && mesh.is_boundary_vertex(v))
    };

    if face_on_boundary(&labels) {
        for &v in component {
            labels[v.index()] = labels[v.index()].map(PointKind::opposite);
        }
        if face_on_boundary(&labels) {
            return None;
        }
    }

    Some(labels)
}

/// Label `v`: `Some(true)` if newly set, `Some(false)` if already `kind`,
/// `None` on a clash.
fn assign<I: MeshIndex>(
    labels: &mut [Option<PointKind>],
    v: VertexId<I>,
    kind: PointKind,
) -> Option<bool> {
    match labels[v.index()] {
        None => {
            labels[v.index()] = Some(kind);
            Some(true)
        }
        Some(existing) if existing == kind => Some(false),
        Some(_) => None,
    }
}

fn flood<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    seed: VertexId<I>,
    labels: &mut [Option<PointKind>],
) -> Option<()> {
    assign(labels, seed, PointKind::Original)?;
    let mut stack = vec![seed];

    while let Some(v) = stack.pop() {
        let kind = labels[v.index()]?;

        for he in mesh.vertex_halfedges(v) {
            if mesh.is_boundary_halfedge(he) {
                continue;
            }
            // Corners of this quad, starting at v
            let next = mesh.next(he);
            let corners = [
                (mesh.dest(he), PointKind::Edge),
                (mesh.dest(next), kind.opposite()),
                (mesh.origin(mesh.prev(he)), PointKind::Edge),
            ];

            for (u, expected) in corners {
                if assign(labels, u, expected)? && expected != PointKind::Edge {
                    stack.push(u);
                }
            }
        }
    }

    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::subdivide::{catmull_clark_subdivide, SubdivideOptions};
    use crate::mesh::{build_from_quads, to_face_vertex};
    use nalgebra::Point3;

    fn create_quad_cube() -> HalfEdgeMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let faces = vec![
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [2, 3, 7, 6],
            [0, 4, 7, 3],
            [1, 2, 6, 5],
        ];
        build_from_quads(&vertices, &faces).unwrap()
    }

    fn create_grid(n: usize) -> HalfEdgeMesh {
        let mut vertices = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                vertices.push(Point3::new(i as f64, j as f64, 0.0));
            }
        }
        let mut faces = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let v00 = j * (n + 1) + i;
                faces.push([v00, v00 + 1, v00 + n + 2, v00 + n + 1]);
            }
        }
        build_from_quads(&vertices, &faces).unwrap()
    }

    fn create_torus(nu: usize, nv: usize) -> HalfEdgeMesh {
        let mut vertices = Vec::new();
        for j in 0..nv {
            for i in 0..nu {
                let u = std::f64::consts::TAU * i as f64 / nu as f64;
                let v = std::f64::consts::TAU * j as f64 / nv as f64;
                let r = 2.0 + 0.5 * v.cos();
                vertices.push(Point3::new(r * u.cos(), r * u.sin(), 0.5 * v.sin()));
            }
        }
        let idx = |i: usize, j: usize| (j % nv) * nu + (i % nu);
        let mut faces = Vec::new();
        for j in 0..nv {
            for i in 0..nu {
                faces.push([idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), idx(i, j + 1)]);
            }
        }
        build_from_quads(&vertices, &faces).unwrap()
    }

    fn subdivided(mesh: &HalfEdgeMesh, levels: usize) -> HalfEdgeMesh {
        let mut fine = mesh.clone();
        catmull_clark_subdivide(&mut fine, &SubdivideOptions::new(levels)).unwrap();
        fine
    }

    /// Rotate each face so its smallest index comes first.
    fn canonical_faces(mesh: &HalfEdgeMesh) -> Vec<Vec<usize>> {
        to_face_vertex(mesh)
            .1
            .into_iter()
            .map(|mut face| {
                let min_pos = (0..face.len()).min_by_key(|&i| face[i]).unwrap_or(0);
                face.rotate_left(min_pos);
                face
            })
            .collect()
    }

    #[test]
    fn test_cube_round_trip() {
        let cube = create_quad_cube();
        let fine = subdivided(&cube, 2);
        assert_eq!(fine.num_faces(), 96);

        let coarse = unsubdivide(&fine, &UnsubdivideOptions::default()).unwrap();

        assert_eq!(coarse.num_vertices(), 8);
        assert_eq!(coarse.num_faces(), 6);
        assert!(coarse.is_valid());
        assert_eq!(canonical_faces(&coarse), canonical_faces(&cube));
    }

    #[test]
    fn test_original_points_keep_fine_positions() {
        let cube = create_quad_cube();
        let fine = subdivided(&cube, 1);
        let coarse = unsubdivide(&fine, &UnsubdivideOptions::new(1)).unwrap();

        // Subdivision emits the updated original vertices first
        for (i, p) in coarse.positions().iter().enumerate() {
            assert_eq!(*p, fine.positions()[i]);
        }
    }

    #[test]
    fn test_open_grid_round_trip() {
        let grid = create_grid(2);
        let fine = subdivided(&grid, 1);
        assert_eq!(fine.num_vertices(), 25);

        let coarse = unsubdivide(&fine, &UnsubdivideOptions::new(1)).unwrap();

        assert_eq!(coarse.num_vertices(), 9);
        assert_eq!(coarse.num_faces(), 4);
        assert_eq!(canonical_faces(&coarse), canonical_faces(&grid));
    }

    #[test]
    fn test_regular_torus_round_trip() {
        let torus = create_torus(4, 4);
        let fine = subdivided(&torus, 1);

        let coarse = unsubdivide(&fine, &UnsubdivideOptions::new(1)).unwrap();

        assert_eq!(coarse.num_vertices(), 16);
        assert_eq!(coarse.num_faces(), 16);
        assert!(coarse.is_quad_mesh());
    }

    #[test]
    fn test_classify_points_pattern() {
        let fine = subdivided(&create_quad_cube(), 1);
        let labels = classify_points(&fine, 1).unwrap();

        // 8 original points, then 6 face points, then 12 edge points
        assert!(labels[..8].iter().all(|&l| l == Some(PointKind::Original)));
        assert!(labels[8..14].iter().all(|&l| l == Some(PointKind::Face)));
        assert!(labels[14..].iter().all(|&l| l == Some(PointKind::Edge)));
    }

    #[test]
    fn test_disconnected_components() {
        let cube = create_quad_cube();
        let (mut vertices, mut faces) = to_face_vertex(&cube);
        let offset = vertices.len();
        let shifted: Vec<Point3<f64>> = vertices
            .iter()
            .map(|p| p + nalgebra::Vector3::new(5.0, 0.0, 0.0))
            .collect();
        vertices.extend(shifted);
        let copy: Vec<Vec<usize>> = faces
            .iter()
            .map(|f| f.iter().map(|&v| v + offset).collect())
            .collect();
        faces.extend(copy);
        let two_cubes: HalfEdgeMesh = build_from_polygons(&vertices, &faces).unwrap();

        let coarse = unsubdivide(&subdivided(&two_cubes, 1), &UnsubdivideOptions::new(1)).unwrap();
        assert_eq!(coarse.num_vertices(), 16);
        assert_eq!(coarse.num_faces(), 12);
    }

    #[test]
    fn test_zero_levels_is_a_copy() {
        let cube = create_quad_cube();
        let same = unsubdivide(&cube, &UnsubdivideOptions::new(0)).unwrap();
        assert_eq!(same.num_vertices(), 8);
        assert_eq!(canonical_faces(&same), canonical_faces(&cube));
    }

    #[test]
    fn test_rejects_non_quad_mesh() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        let faces: Vec<Vec<usize>> = vec![vec![0, 1, 2]];
        let triangle: HalfEdgeMesh = build_from_polygons(&vertices, &faces).unwrap();

        let result = unsubdivide(&triangle, &UnsubdivideOptions::new(1));
        assert!(matches!(result, Err(MeshError::NotSubdivided { level: 1, .. })));
    }

    #[test]
    fn test_rejects_unsubdivided_grid() {
        // Three quads across cannot come from one subdivision step
        let result = unsubdivide(&create_grid(3), &UnsubdivideOptions::new(1));
        assert!(matches!(result, Err(MeshError::NotSubdivided { level: 1, .. })));
    }

    #[test]
    fn test_reports_failing_level() {
        // 2x2 grid = one quad subdivided once; the single quad cannot be reduced
        let fine = subdivided(&create_grid(2), 1);
        let result = unsubdivide(&fine, &UnsubdivideOptions::new(3));
        assert!(matches!(result, Err(MeshError::NotSubdivided { level: 3, .. })));
    }
}

//! Catmull-Clark subdivision for polygon meshes.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::algo::Progress;
use crate::error::Result;
use crate::mesh::{build_from_quads, to_face_vertex, HalfEdgeMesh, MeshIndex};

use super::SubdivideOptions;

/// Performs Catmull-Clark subdivision on a polygon mesh.
///
/// Each iteration replaces every n-sided face by n quads, so the result is an
/// all-quad mesh after the first iteration.
///
/// # Arguments
///
/// * `mesh` - The mesh to subdivide (modified in place)
/// * `options` - Subdivision parameters
///
/// # Vertex Rules
///
/// - **Face point**: centroid of face vertices
/// - **Edge point**: `(v0 + v1 + f0 + f1) / 4` for interior edges, the
///   midpoint for boundary edges
/// - **Vertex point**: `(Q + 2R + (n-3)S) / n` where:
///   - Q = average of adjacent face points
///   - R = average of adjacent edge midpoints
///   - S = original position
///   - n = valence
/// - **Boundary vertex**: `3/4 S + 1/8 (b0 + b1)` from its two boundary
///   neighbours
/// - **Corner**: a boundary vertex of valence 2, or with any number of
///   boundary edges other than two, stays fixed
///
/// # Errors
/// Propagates mesh construction errors; the input mesh is left unchanged on
/// failure.
///
/// # Example
///
/// ```
/// use unsubd::algo::subdivide::{catmull_clark_subdivide, SubdivideOptions};
/// use unsubd::mesh::{build_from_polygons, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces: Vec<Vec<usize>> = vec![vec![0, 1, 2]];
/// let mut mesh: HalfEdgeMesh = build_from_polygons(&vertices, &faces).unwrap();
///
/// catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();
/// assert_eq!(mesh.num_faces(), 3);
/// assert!(mesh.is_quad_mesh());
/// ```
pub fn catmull_clark_subdivide<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    options: &SubdivideOptions,
) -> Result<()> {
    catmull_clark_subdivide_with_progress(mesh, options, &Progress::none())
}

/// Catmull-Clark subdivision with progress reporting.
pub fn catmull_clark_subdivide_with_progress<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    options: &SubdivideOptions,
    progress: &Progress,
) -> Result<()> {
    if options.iterations == 0 {
        return Ok(());
    }

    for iter in 0..options.iterations {
        progress.report(iter, options.iterations, "Catmull-Clark subdivision");
        *mesh = catmull_clark_subdivide_once(mesh, options.parallel)?;
        log::debug!(
            "Catmull-Clark level {}: {} vertices, {} faces",
            iter + 1,
            mesh.num_vertices(),
            mesh.num_faces()
        );
    }
    progress.report(options.iterations, options.iterations, "Catmull-Clark subdivision");
    Ok(())
}

/// Perform one iteration of Catmull-Clark subdivision.
fn catmull_clark_subdivide_once<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    parallel: bool,
) -> Result<HalfEdgeMesh<I>> {
    let (vertices, faces) = to_face_vertex(mesh);

    if vertices.is_empty() || faces.is_empty() {
        return Ok(mesh.clone());
    }

    // Step 1: Compute face points (centroids)
    let centroid = |face: &Vec<usize>| -> Point3<f64> {
        let sum: Vector3<f64> = face.iter().map(|&vi| vertices[vi].coords).sum();
        Point3::from(sum / face.len() as f64)
    };
    let face_points: Vec<Point3<f64>> = if parallel {
        faces.par_iter().map(centroid).collect()
    } else {
        faces.iter().map(centroid).collect()
    };

    // Step 2: Build edge information and compute edge points
    let edge_info = build_edge_info(&faces);
    let edge_points = compute_edge_points(&vertices, &face_points, &edge_info);

    // Step 3: Compute updated vertex positions
    let adjacency = VertexAdjacency::build(vertices.len(), &faces, &edge_info);
    let vertex_point = |i: usize| compute_vertex_point(i, &vertices, &face_points, &adjacency);
    let updated_vertices: Vec<Point3<f64>> = if parallel {
        (0..vertices.len()).into_par_iter().map(vertex_point).collect()
    } else {
        (0..vertices.len()).map(vertex_point).collect()
    };

    // Step 4: Build the subdivided quad mesh
    let (new_vertices, new_faces) =
        build_subdivided_mesh(&updated_vertices, &face_points, &edge_points, &faces, &edge_info);

    build_from_quads::<I>(&new_vertices, &new_faces)
}

/// Information about an edge for Catmull-Clark subdivision.
#[derive(Debug, Clone)]
struct EdgeInfo {
    /// Index of the new vertex created for this edge.
    new_vertex_index: usize,
    /// Indices of faces sharing this edge (second is None for boundary).
    faces: (usize, Option<usize>),
}

impl EdgeInfo {
    fn is_boundary(&self) -> bool {
        self.faces.1.is_none()
    }
}

#[inline]
fn edge_key(v0: usize, v1: usize) -> (usize, usize) {
    if v0 < v1 {
        (v0, v1)
    } else {
        (v1, v0)
    }
}

/// Build a map from edge (v0, v1) to edge information.
///
/// Edge points are numbered in first-encounter order, walking faces in order.
fn build_edge_info(faces: &[Vec<usize>]) -> HashMap<(usize, usize), EdgeInfo> {
    let mut edge_map: HashMap<(usize, usize), EdgeInfo> = HashMap::new();
    let mut next_edge_vertex = 0;

    for (face_idx, face) in faces.iter().enumerate() {
        let k = face.len();
        for i in 0..k {
            let key = edge_key(face[i], face[(i + 1) % k]);

            if let Some(info) = edge_map.get_mut(&key) {
                // Second face sharing this edge
                info.faces.1 = Some(face_idx);
            } else {
                edge_map.insert(
                    key,
                    EdgeInfo {
                        new_vertex_index: next_edge_vertex,
                        faces: (face_idx, None),
                    },
                );
                next_edge_vertex += 1;
            }
        }
    }

    edge_map
}

/// Compute edge points for Catmull-Clark subdivision.
fn compute_edge_points(
    vertices: &[Point3<f64>],
    face_points: &[Point3<f64>],
    edge_info: &HashMap<(usize, usize), EdgeInfo>,
) -> Vec<Point3<f64>> {
    let mut edge_points = vec![Point3::origin(); edge_info.len()];

    for (&(v0, v1), info) in edge_info {
        let ends = vertices[v0].coords + vertices[v1].coords;

        let new_pos = match info.faces.1 {
            // Interior edge: average of both endpoints and both face points
            Some(f1) => Point3::from(
                (ends + face_points[info.faces.0].coords + face_points[f1].coords) / 4.0,
            ),
            // Boundary edge: midpoint
            None => Point3::from(ends * 0.5),
        };

        edge_points[info.new_vertex_index] = new_pos;
    }

    edge_points
}

/// Per-vertex incident faces, edges and boundary neighbours.
struct VertexAdjacency {
    faces: Vec<Vec<usize>>,
    edges: Vec<Vec<(usize, usize)>>,
    boundary_neighbors: Vec<Vec<usize>>,
}

impl VertexAdjacency {
    fn build(
        num_vertices: usize,
        faces: &[Vec<usize>],
        edge_info: &HashMap<(usize, usize), EdgeInfo>,
    ) -> Self {
        let mut vertex_faces: Vec<Vec<usize>> = vec![Vec::new(); num_vertices];
        let mut vertex_edges: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_vertices];
        let mut boundary_neighbors: Vec<Vec<usize>> = vec![Vec::new(); num_vertices];

        for (face_idx, face) in faces.iter().enumerate() {
            for &vi in face {
                vertex_faces[vi].push(face_idx);
            }
        }

        for (&(v0, v1), info) in edge_info {
            vertex_edges[v0].push((v0, v1));
            vertex_edges[v1].push((v0, v1));

            if info.is_boundary() {
                boundary_neighbors[v0].push(v1);
                boundary_neighbors[v1].push(v0);
            }
        }

        // HashMap order is arbitrary; fix the summation order
        for list in &mut boundary_neighbors {
            list.sort_unstable();
        }
        for list in &mut vertex_edges {
            list.sort_unstable();
        }

        Self {
            faces: vertex_faces,
            edges: vertex_edges,
            boundary_neighbors,
        }
    }
}

/// Compute the updated position of one original vertex.
fn compute_vertex_point(
    i: usize,
    vertices: &[Point3<f64>],
    face_points: &[Point3<f64>],
    adjacency: &VertexAdjacency,
) -> Point3<f64> {
    let pos = vertices[i];
    let boundary = &adjacency.boundary_neighbors[i];

    if !boundary.is_empty() {
        // Valence 2 is an open corner even with two boundary neighbours
        return if boundary.len() == 2 && adjacency.edges[i].len() > 2 {
            // Regular boundary vertex: 1/8 * (left + right) + 3/4 * v
            let left = &vertices[boundary[0]];
            let right = &vertices[boundary[1]];
            Point3::from((left.coords + right.coords) * (1.0 / 8.0) + pos.coords * (3.0 / 4.0))
        } else {
            // Corner: keep position
            pos
        };
    }

    let incident_faces = &adjacency.faces[i];
    let incident_edges = &adjacency.edges[i];
    if incident_faces.is_empty() || incident_edges.is_empty() {
        return pos;
    }

    // Q = average of adjacent face points
    let q: Vector3<f64> = incident_faces
        .iter()
        .map(|&fi| face_points[fi].coords)
        .sum::<Vector3<f64>>()
        / incident_faces.len() as f64;

    // R = average of adjacent edge midpoints
    let r: Vector3<f64> = incident_edges
        .iter()
        .map(|&(v0, v1)| (vertices[v0].coords + vertices[v1].coords) * 0.5)
        .sum::<Vector3<f64>>()
        / incident_edges.len() as f64;

    let n = incident_edges.len() as f64;
    Point3::from((q + r * 2.0 + pos.coords * (n - 3.0)) / n)
}

/// Build the subdivided quad mesh with new connectivity.
fn build_subdivided_mesh(
    updated_vertices: &[Point3<f64>],
    face_points: &[Point3<f64>],
    edge_points: &[Point3<f64>],
    original_faces: &[Vec<usize>],
    edge_info: &HashMap<(usize, usize), EdgeInfo>,
) -> (Vec<Point3<f64>>, Vec<[usize; 4]>) {
    let num_original = updated_vertices.len();
    let num_face_points = face_points.len();

    // New vertices: original (updated) + face points + edge points
    let mut new_vertices: Vec<Point3<f64>> = updated_vertices.to_vec();
    new_vertices.extend(face_points.iter().cloned());
    new_vertices.extend(edge_points.iter().cloned());

    // Every face edge was registered by build_edge_info
    let edge_point = |v0: usize, v1: usize| -> usize {
        let offset = edge_info
            .get(&edge_key(v0, v1))
            .map_or(0, |info| info.new_vertex_index);
        num_original + num_face_points + offset
    };

    let num_corners: usize = original_faces.iter().map(Vec::len).sum();
    let mut new_faces: Vec<[usize; 4]> = Vec::with_capacity(num_corners);

    for (face_idx, face) in original_faces.iter().enumerate() {
        let fp = num_original + face_idx;
        let k = face.len();

        // One quad per corner, keeping the face's winding:
        // v -> e(v, next) -> fp -> e(prev, v)
        for i in 0..k {
            let v = face[i];
            let next = face[(i + 1) % k];
            let prev = face[(i + k - 1) % k];
            new_faces.push([v, edge_point(v, next), fp, edge_point(prev, v)]);
        }
    }

    (new_vertices, new_faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_polygons, VertexId};

    fn create_single_quad() -> HalfEdgeMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2, 3]];
        build_from_quads(&vertices, &faces).unwrap()
    }

    fn create_two_quads() -> HalfEdgeMesh {
        // Two quads sharing an edge
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2, 3], [1, 4, 5, 2]];
        build_from_quads(&vertices, &faces).unwrap()
    }

    fn create_quad_cube() -> HalfEdgeMesh {
        let vertices = vec![
            // Bottom face (z = 0)
            Point3::new(0.0, 0.0, 0.0), // 0
            Point3::new(1.0, 0.0, 0.0), // 1
            Point3::new(1.0, 1.0, 0.0), // 2
            Point3::new(0.0, 1.0, 0.0), // 3
            // Top face (z = 1)
            Point3::new(0.0, 0.0, 1.0), // 4
            Point3::new(1.0, 0.0, 1.0), // 5
            Point3::new(1.0, 1.0, 1.0), // 6
            Point3::new(0.0, 1.0, 1.0), // 7
        ];
        let faces = vec![
            [0, 3, 2, 1], // Bottom (CCW when viewed from below)
            [4, 5, 6, 7], // Top
            [0, 1, 5, 4], // Front
            [2, 3, 7, 6], // Back
            [0, 4, 7, 3], // Left
            [1, 2, 6, 5], // Right
        ];
        build_from_quads(&vertices, &faces).unwrap()
    }

    fn create_tetrahedron() -> HalfEdgeMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        let faces: Vec<Vec<usize>> =
            vec![vec![0, 2, 1], vec![0, 1, 3], vec![1, 2, 3], vec![2, 0, 3]];
        build_from_polygons(&vertices, &faces).unwrap()
    }

    fn euler(mesh: &HalfEdgeMesh) -> i64 {
        mesh.num_vertices() as i64 - mesh.num_edges() as i64 + mesh.num_faces() as i64
    }

    #[test]
    fn test_catmull_clark_single_quad() {
        let mut mesh = create_single_quad();

        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();

        // 1 quad -> 4 quads
        assert_eq!(mesh.num_faces(), 4);
        // 4 original + 1 face point + 4 edge points = 9
        assert_eq!(mesh.num_vertices(), 9);
        assert!(mesh.is_valid());
        assert!(mesh.is_quad_mesh());

        // Corners stay, the face point is the centre
        assert_eq!(*mesh.position(VertexId::new(2)), Point3::new(1.0, 1.0, 0.0));
        assert!((mesh.positions()[4] - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_catmull_clark_two_quads() {
        let mut mesh = create_two_quads();

        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();

        // 2 quads -> 8 quads
        assert_eq!(mesh.num_faces(), 8);
        // 6 original + 2 face points + 7 edge points = 15
        assert_eq!(mesh.num_vertices(), 15);
        assert!(mesh.is_valid());
        assert!(mesh.is_quad_mesh());
    }

    #[test]
    fn test_catmull_clark_boundary_rules() {
        let mut mesh = create_two_quads();
        mesh.set_position(VertexId::new(1), Point3::new(1.0, 0.2, 0.0));
        let before = mesh.positions();

        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();

        // Valence-2 corners stay put
        for i in [0, 3, 4, 5] {
            assert_eq!(*mesh.position(VertexId::new(i)), before[i], "corner {}", i);
        }
        // Valence-3 boundary vertex: 3/4 S + 1/8 (b0 + b1)
        let smoothed = mesh.position(VertexId::new(1));
        assert!((smoothed - Point3::new(1.0, 0.15, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_catmull_clark_triangles_become_quads() {
        let mut mesh = create_tetrahedron();

        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();

        // 4 triangles -> 12 quads; 4 + 4 + 6 vertices
        assert_eq!(mesh.num_faces(), 12);
        assert_eq!(mesh.num_vertices(), 14);
        assert!(mesh.is_quad_mesh());
        assert_eq!(euler(&mesh), 2);
    }

    #[test]
    fn test_catmull_clark_two_iterations() {
        let mut mesh = create_quad_cube();
        let original_faces = mesh.num_faces();

        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(2)).unwrap();

        // Each iteration quadruples: 4 * 4 = 16x
        assert_eq!(mesh.num_faces(), original_faces * 16);
        assert!(mesh.is_valid());
        assert!(mesh.is_quad_mesh());
    }

    #[test]
    fn test_catmull_clark_preserves_euler() {
        let mut mesh = create_quad_cube();
        let original_euler = euler(&mesh);

        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();

        assert_eq!(original_euler, euler(&mesh), "Euler characteristic should be preserved");
    }

    #[test]
    fn test_catmull_clark_zero_iterations() {
        let mut mesh = create_quad_cube();
        let before = mesh.positions();

        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(0)).unwrap();

        assert_eq!(mesh.num_faces(), 6);
        assert_eq!(mesh.positions(), before);
    }

    #[test]
    fn test_catmull_clark_cube_vertex_rule() {
        // Cube corner (valence 3): Q = (1/2, 1/2, 1/2) shifted, R likewise
        let mut mesh = create_quad_cube();
        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();

        // For the corner at the origin: Q = (1/3, 1/3, 1/3), R = (1/6, 1/6, 1/6), S = 0
        // (Q + 2R + 0·S) / 3 = (2/9, 2/9, 2/9)
        let p = mesh.positions()[0];
        let expected = Point3::new(2.0 / 9.0, 2.0 / 9.0, 2.0 / 9.0);
        assert!((p - expected).norm() < 1e-12, "got {:?}", p);
    }

    #[test]
    fn test_catmull_clark_interior_edge_point() {
        let mut mesh = create_two_quads();
        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();

        // Shared edge (1, 2): endpoints (1,0),(1,1), face points (0.5,0.5),(1.5,0.5)
        let expected = Point3::new(1.0, 0.5, 0.0);
        let found = mesh
            .positions()
            .iter()
            .skip(8)
            .any(|p| (p - expected).norm() < 1e-12);
        assert!(found);
    }

    #[test]
    fn test_catmull_clark_parallel_matches_sequential() {
        let mut a = create_quad_cube();
        let mut b = create_quad_cube();

        catmull_clark_subdivide(&mut a, &SubdivideOptions::new(2)).unwrap();
        catmull_clark_subdivide(&mut b, &SubdivideOptions::new(2).with_parallel(true)).unwrap();

        assert_eq!(a.positions(), b.positions());
        assert_eq!(to_face_vertex(&a).1, to_face_vertex(&b).1);
    }

    #[test]
    fn test_catmull_clark_shrinks_closed_mesh() {
        // Approximating scheme: the cube pulls away from its corners but keeps its centre
        let mut mesh = create_quad_cube();

        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(2)).unwrap();

        let positions = mesh.positions();
        let centroid: Vector3<f64> =
            positions.iter().map(|p| p.coords).sum::<Vector3<f64>>() / positions.len() as f64;
        assert!((centroid - Vector3::new(0.5, 0.5, 0.5)).norm() < 1e-9);

        let corner_distance = positions
            .iter()
            .map(|p| (p.coords - Vector3::new(0.5, 0.5, 0.5)).norm())
            .fold(0.0, f64::max);
        assert!(corner_distance < 3.0_f64.sqrt() / 2.0);
    }
}

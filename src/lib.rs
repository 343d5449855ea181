//! # unsubd
//!
//! Recover Catmull-Clark control cages from subdivided meshes.
//!
//! A mesh that went through a few levels of Catmull-Clark subdivision still
//! carries its original topology: it can be read back out of the quad
//! pattern. Its original vertex positions are lost, though, because every
//! subdivision step moves them toward the limit surface. unsubd undoes both:
//! it reduces the topology level by level and then relaxes the coarse vertices
//! until their limit positions land on the dense mesh again, so that
//! re-subdividing the cage reproduces the surface it came from.
//!
//! ## Features
//!
//! - **Half-edge data structure**: polygon faces, O(1) adjacency queries with
//!   type-safe indices
//! - **Flexible indexing**: Support for 16-bit, 32-bit, and 64-bit indices
//! - **Un-subdivision**: reverse any number of Catmull-Clark levels on quad meshes
//! - **Limit relaxation**: Gauss-Seidel or damped Jacobi inversion of the limit mask
//! - **File formats**: OBJ and PLY, keeping polygon faces and object names
//!
//! ## Quick Start
//!
//! ```no_run
//! use unsubd::prelude::*;
//! use unsubd::algo::cage::{fit_cage, CageOptions};
//!
//! // Load a mesh that was subdivided twice
//! let fine: HalfEdgeMesh = unsubd::io::load("dense.obj").unwrap();
//!
//! // Fit a cage and save it under its name
//! let cage = fit_cage(&fine, &CageOptions::default()).unwrap();
//! println!("Cage: {} vertices, {} faces", cage.mesh.num_vertices(), cage.mesh.num_faces());
//!
//! unsubd::io::save_named(&cage.mesh, &cage.name, "cage.obj").unwrap();
//! ```
//!
//! ## Building Meshes Programmatically
//!
//! ```
//! use unsubd::prelude::*;
//! use nalgebra::Point3;
//!
//! // A square pyramid: one quad and four triangles
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//!
//! let faces: Vec<Vec<usize>> = vec![
//!     vec![0, 3, 2, 1], // base
//!     vec![0, 1, 4],
//!     vec![1, 2, 4],
//!     vec![2, 3, 4],
//!     vec![3, 0, 4],
//! ];
//!
//! let mesh: HalfEdgeMesh = build_from_polygons(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_vertices(), 5);
//! assert_eq!(mesh.num_faces(), 5);
//! assert_eq!(mesh.valence(VertexId::new(4)), 4);
//! ```
//!
//! ## Mesh Traversal
//!
//! The half-edge structure enables efficient traversal of mesh elements:
//!
//! ```
//! use unsubd::prelude::*;
//! use nalgebra::Point3;
//!
//! # let vertices = vec![
//! #     Point3::new(0.0, 0.0, 0.0),
//! #     Point3::new(1.0, 0.0, 0.0),
//! #     Point3::new(1.0, 1.0, 0.0),
//! #     Point3::new(0.0, 1.0, 0.0),
//! # ];
//! # let mesh: HalfEdgeMesh = build_from_quads(&vertices, &[[0, 1, 2, 3]]).unwrap();
//! // Iterate over neighbors of a vertex
//! let v = VertexId::new(0);
//! for neighbor in mesh.vertex_neighbors(v) {
//!     println!("Neighbor: {:?}", neighbor);
//! }
//!
//! // Iterate over faces around a vertex
//! for face in mesh.vertex_faces(v) {
//!     println!("Adjacent face: {:?}", face);
//! }
//!
//! // Get vertices of a face
//! let f = FaceId::new(0);
//! let corners: Vec<VertexId> = mesh.face_vertices(f).collect();
//! assert_eq!(corners.len(), 4);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod io;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use unsubd::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        build_from_polygons, build_from_quads, to_face_vertex, Face, FaceId, HalfEdge,
        HalfEdgeId, HalfEdgeMesh, MeshIndex, Vertex, VertexId,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;

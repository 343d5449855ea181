//! Catmull-Clark subdivision.
//!
//! Catmull-Clark subdivision (Catmull & Clark, 1978) is an approximating
//! scheme for polygon meshes. Each iteration:
//!
//! 1. Creates a face point at each face centroid
//! 2. Creates edge points from the edge endpoints and the adjacent face points
//! 3. Updates original vertices using a weighted average of neighbors
//! 4. Splits every n-sided face into n quads
//!
//! After one iteration the mesh is all quads. The limit surface is C² except
//! at extraordinary vertices, where it is C¹.
//!
//! Cage fitting uses subdivision to measure how closely a fitted cage
//! reproduces the dense mesh it was recovered from, and the
//! [`unsubdivide`](crate::algo::unsubdivide) reducer is its exact topological
//! inverse.
//!
//! # Vertex order
//!
//! The output lists the updated original vertices first, then one face point
//! per input face (in face order), then one edge point per input edge. Faces
//! are emitted input face by input face, one quad per corner.
//!
//! # Example
//!
//! ```no_run
//! use unsubd::prelude::*;
//! use unsubd::algo::subdivide::{catmull_clark_subdivide, SubdivideOptions};
//!
//! let mut mesh: HalfEdgeMesh = unsubd::io::load("cage.obj").unwrap();
//!
//! let options = SubdivideOptions::new(2); // 2 iterations
//! catmull_clark_subdivide(&mut mesh, &options).unwrap();
//!
//! unsubd::io::save(&mesh, "dense.obj").unwrap();
//! ```
//!
//! # References
//!
//! - Catmull, E. & Clark, J. (1978). "Recursively generated B-spline surfaces
//!   on arbitrary topological meshes." Computer-Aided Design, 10(6), 350-355.

mod catmull_clark;

pub use catmull_clark::{catmull_clark_subdivide, catmull_clark_subdivide_with_progress};

/// Options for Catmull-Clark subdivision.
#[derive(Debug, Clone)]
pub struct SubdivideOptions {
    /// Number of subdivision iterations.
    pub iterations: usize,

    /// Whether to use parallel execution (default: false).
    pub parallel: bool,
}

impl Default for SubdivideOptions {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SubdivideOptions {
    /// Create options with the specified number of iterations.
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            parallel: false,
        }
    }

    /// Set the number of iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

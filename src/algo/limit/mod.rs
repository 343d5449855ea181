//! Catmull-Clark limit positions and their inversion.
//!
//! Every vertex of a Catmull-Clark control mesh has a limit position: the
//! point the surface converges to under infinite subdivision. For a vertex of
//! valence `n` with edge neighbours `adj` and face-diagonal neighbours `diag`:
//!
//! ```text
//! L(v) = n/(n+5)·v + 4/(n(n+5))·Σadj + 1/(n(n+5))·Σdiag
//! ```
//!
//! Fitting a cage means the reverse problem: given desired limit positions
//! (taken from the dense mesh), find control positions that produce them.
//! [`solve_limit_positions`] does this with relaxation sweeps that solve the
//! mask for one vertex at a time while its neighbours are held fixed.
//!
//! # Example
//!
//! ```
//! use unsubd::algo::limit::LimitStencils;
//! use unsubd::mesh::{build_from_quads, HalfEdgeMesh};
//! use nalgebra::Point3;
//!
//! let vertices: Vec<Point3<f64>> = (0..9)
//!     .map(|i| Point3::new((i % 3) as f64, (i / 3) as f64, 0.0))
//!     .collect();
//! let faces = vec![[0, 1, 4, 3], [1, 2, 5, 4], [3, 4, 7, 6], [4, 5, 8, 7]];
//! let mesh: HalfEdgeMesh = build_from_quads(&vertices, &faces).unwrap();
//!
//! let stencils = LimitStencils::build(&mesh);
//! assert_eq!(stencils.get(4).valence(), 4);
//!
//! // A flat regular patch is its own limit
//! let limit = stencils.limit_position(&mesh.positions(), 4);
//! assert!((limit - vertices[4]).norm() < 1e-12);
//! ```

mod solver;
mod stencil;

pub use solver::{
    solve_limit_positions, solve_limit_positions_with_progress, LimitSolveOptions, SolveReport,
    UpdateScheme, DEFAULT_JACOBI_DAMPING,
};
pub use stencil::{LimitStencils, LimitWeights, VertexStencil};

pub(crate) use solver::solve_with_sweep_callback;

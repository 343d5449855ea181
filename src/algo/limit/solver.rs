//! Iterative inversion of the limit mask.

use nalgebra::Point3;
use rayon::prelude::*;

use crate::algo::Progress;
use crate::error::{MeshError, Result};

use super::stencil::LimitStencils;

/// Damping used by [`UpdateScheme::jacobi`].
///
/// The undamped Jacobi step amplifies the smoothest error mode by `-5/n`
/// around valence-`n` vertices: `-1.25` on regular quads, `-5/3` at
/// valence 3. Damping by 0.6 brings the worst case back to `-0.6`.
pub const DEFAULT_JACOBI_DAMPING: f64 = 0.6;

/// How a relaxation sweep applies its updates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum UpdateScheme {
    /// Update positions in place in ascending vertex order. Later vertices in
    /// a sweep see the already-updated positions of earlier ones.
    #[default]
    GaussSeidel,

    /// Compute every update from a snapshot of the previous sweep, then blend
    /// `v ← (1 − damping)·v + damping·v'`. Independent of vertex order.
    ///
    /// With `damping = 1.0` this diverges on regular quad regions.
    Jacobi {
        /// Blend factor in `(0, 1]`.
        damping: f64,
    },
}

impl UpdateScheme {
    /// Damped Jacobi with [`DEFAULT_JACOBI_DAMPING`].
    pub fn jacobi() -> Self {
        UpdateScheme::Jacobi {
            damping: DEFAULT_JACOBI_DAMPING,
        }
    }
}

/// Options for the limit relaxation solver.
#[derive(Debug, Clone)]
pub struct LimitSolveOptions {
    /// Maximum number of sweeps over all vertices.
    pub iterations: usize,

    /// Update ordering.
    pub scheme: UpdateScheme,

    /// Stop early once a sweep moves no vertex further than this.
    /// `None` always runs all iterations.
    pub tolerance: Option<f64>,

    /// Whether to use parallel execution for Jacobi sweeps.
    /// Gauss-Seidel sweeps are always sequential.
    pub parallel: bool,
}

impl Default for LimitSolveOptions {
    fn default() -> Self {
        Self {
            iterations: 20,
            scheme: UpdateScheme::GaussSeidel,
            tolerance: None,
            parallel: false,
        }
    }
}

impl LimitSolveOptions {
    /// Set the number of sweeps.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the update scheme.
    pub fn with_scheme(mut self, scheme: UpdateScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Enable the early-exit displacement criterion.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
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

    fn validate(&self) -> Result<()> {
        if let UpdateScheme::Jacobi { damping } = self.scheme {
            if !(damping > 0.0 && damping <= 1.0) {
                return Err(MeshError::invalid_param("damping", damping, "must be in (0, 1]"));
            }
        }
        if let Some(tol) = self.tolerance {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(MeshError::invalid_param(
                    "tolerance",
                    tol,
                    "must be finite and non-negative",
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of a relaxation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    /// Sweeps actually performed.
    pub iterations: usize,
    /// Largest single-vertex move during the last sweep.
    pub max_displacement: f64,
    /// True if the run stopped early on the tolerance criterion.
    pub converged: bool,
    /// Vertices that were updated (valence ≥ 3).
    pub relaxed_vertices: usize,
    /// Vertices left untouched (valence < 3).
    pub skipped_vertices: usize,
}

/// Relax `positions` so that their limit positions approach `anchors`.
///
/// `positions` are updated in place. `anchors[i]` is the target limit position
/// of vertex `i`; `stencils` must come from the mesh the positions belong to.
/// Vertices of valence below 3 are never moved.
///
/// # Errors
/// [`MeshError::InvalidState`] if the three inputs disagree in length,
/// [`MeshError::InvalidParameter`] for a bad damping or tolerance.
///
/// # Example
///
/// ```
/// use unsubd::algo::limit::{solve_limit_positions, LimitSolveOptions, LimitStencils};
/// use unsubd::mesh::{build_from_quads, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices: Vec<Point3<f64>> = (0..9)
///     .map(|i| Point3::new((i % 3) as f64, (i / 3) as f64, 0.0))
///     .collect();
/// let faces = vec![[0, 1, 4, 3], [1, 2, 5, 4], [3, 4, 7, 6], [4, 5, 8, 7]];
/// let mesh: HalfEdgeMesh = build_from_quads(&vertices, &faces).unwrap();
///
/// let stencils = LimitStencils::build(&mesh);
/// let mut anchors = mesh.positions();
/// anchors[4].z = 0.5;
///
/// let mut positions = anchors.clone();
/// let options = LimitSolveOptions::default();
/// let report = solve_limit_positions(&mut positions, &stencils, &anchors, &options).unwrap();
/// assert_eq!(report.iterations, 20);
/// // The centre has to overshoot for its limit to reach the bump
/// assert!(positions[4].z > 0.5);
/// ```
pub fn solve_limit_positions(
    positions: &mut [Point3<f64>],
    stencils: &LimitStencils,
    anchors: &[Point3<f64>],
    options: &LimitSolveOptions,
) -> Result<SolveReport> {
    solve_limit_positions_with_progress(positions, stencils, anchors, options, &Progress::none())
}

/// [`solve_limit_positions`] with progress reporting, one step per sweep.
pub fn solve_limit_positions_with_progress(
    positions: &mut [Point3<f64>],
    stencils: &LimitStencils,
    anchors: &[Point3<f64>],
    options: &LimitSolveOptions,
    progress: &Progress,
) -> Result<SolveReport> {
    solve_with_sweep_callback(positions, stencils, anchors, options, &|sweep, total| {
        progress.report(sweep, total, "Relaxing cage")
    })
}

/// Shared solver loop. `on_sweep(done, total)` runs before each sweep and
/// once at the end.
pub(crate) fn solve_with_sweep_callback(
    positions: &mut [Point3<f64>],
    stencils: &LimitStencils,
    anchors: &[Point3<f64>],
    options: &LimitSolveOptions,
    on_sweep: &dyn Fn(usize, usize),
) -> Result<SolveReport> {
    options.validate()?;

    if positions.len() != stencils.len() || positions.len() != anchors.len() {
        return Err(MeshError::InvalidState(format!(
            "limit solve needs one stencil and one anchor per vertex ({} vertices, {} stencils, {} anchors)",
            positions.len(),
            stencils.len(),
            anchors.len()
        )));
    }

    let relaxed_vertices = stencils.num_relaxable();
    let mut report = SolveReport {
        iterations: 0,
        max_displacement: 0.0,
        converged: false,
        relaxed_vertices,
        skipped_vertices: positions.len() - relaxed_vertices,
    };

    if report.skipped_vertices > 0 {
        log::debug!(
            "limit solve: {} vertices have valence < 3 and stay fixed",
            report.skipped_vertices
        );
    }

    for iter in 0..options.iterations {
        on_sweep(iter, options.iterations);

        report.max_displacement = match options.scheme {
            UpdateScheme::GaussSeidel => gauss_seidel_sweep(positions, stencils, anchors),
            UpdateScheme::Jacobi { damping } => {
                jacobi_sweep(positions, stencils, anchors, damping, options.parallel)
            }
        };
        report.iterations = iter + 1;

        log::trace!(
            "limit solve sweep {}: max displacement {:.3e}",
            report.iterations,
            report.max_displacement
        );

        if options
            .tolerance
            .is_some_and(|tol| report.max_displacement <= tol)
        {
            report.converged = true;
            break;
        }
    }
    on_sweep(options.iterations, options.iterations);

    if positions.iter().any(|p| !p.coords.iter().all(|c| c.is_finite())) {
        log::warn!(
            "limit solve produced non-finite positions; the cage topology is likely degenerate"
        );
    }

    log::debug!(
        "limit solve: {} sweeps, last max displacement {:.3e}{}",
        report.iterations,
        report.max_displacement,
        if report.converged { " (converged)" } else { "" }
    );

    Ok(report)
}

fn gauss_seidel_sweep(
    positions: &mut [Point3<f64>],
    stencils: &LimitStencils,
    anchors: &[Point3<f64>],
) -> f64 {
    let mut max_move = 0.0_f64;
    for v in 0..positions.len() {
        if let Some(new_pos) = stencils.relaxed_position(positions, v, &anchors[v]) {
            max_move = max_move.max((new_pos - positions[v]).norm());
            positions[v] = new_pos;
        }
    }
    max_move
}

fn jacobi_sweep(
    positions: &mut [Point3<f64>],
    stencils: &LimitStencils,
    anchors: &[Point3<f64>],
    damping: f64,
    parallel: bool,
) -> f64 {
    let snapshot: &[Point3<f64>] = positions;
    let step = |v: usize| -> Point3<f64> {
        match stencils.relaxed_position(snapshot, v, &anchors[v]) {
            Some(target) => snapshot[v] + (target - snapshot[v]) * damping,
            None => snapshot[v],
        }
    };

    let new_positions: Vec<Point3<f64>> = if parallel {
        (0..snapshot.len()).into_par_iter().map(step).collect()
    } else {
        (0..snapshot.len()).map(step).collect()
    };

    let mut max_move = 0.0_f64;
    for (old, new) in positions.iter_mut().zip(new_positions) {
        max_move = max_move.max((new - *old).norm());
        *old = new;
    }
    max_move
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_quads, HalfEdgeMesh};

    /// Quad torus with `nu` x `nv` vertices; every vertex has valence 4.
    fn create_torus(nu: usize, nv: usize) -> HalfEdgeMesh {
        let (major, minor) = (2.0, 0.5);
        let mut vertices = Vec::with_capacity(nu * nv);
        for j in 0..nv {
            for i in 0..nu {
                let u = std::f64::consts::TAU * i as f64 / nu as f64;
                let v = std::f64::consts::TAU * j as f64 / nv as f64;
                let r = major + minor * v.cos();
                vertices.push(Point3::new(r * u.cos(), r * u.sin(), minor * v.sin()));
            }
        }
        let idx = |i: usize, j: usize| (j % nv) * nu + (i % nu);
        let mut faces = Vec::with_capacity(nu * nv);
        for j in 0..nv {
            for i in 0..nu {
                faces.push([idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), idx(i, j + 1)]);
            }
        }
        build_from_quads(&vertices, &faces).unwrap()
    }

    /// Open (n+1) x (n+1) grid with a saddle height field.
    fn create_saddle_grid(n: usize) -> HalfEdgeMesh {
        let mut vertices = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                let (x, y) = (i as f64, j as f64);
                vertices.push(Point3::new(x, y, 0.1 * x * y));
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

    fn max_error(a: &[Point3<f64>], b: &[Point3<f64>]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(p, q)| (p - q).norm())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_recovers_torus_cage() {
        let mesh = create_torus(8, 6);
        let stencils = LimitStencils::build(&mesh);
        let cage = mesh.positions();
        let anchors = stencils.limit_positions(&cage);
        assert!(max_error(&anchors, &cage) > 0.1);

        // Start from the limit positions, as a naive decimation would
        let mut positions = anchors.clone();
        let options = LimitSolveOptions::default();
        let report = solve_limit_positions(&mut positions, &stencils, &anchors, &options).unwrap();

        assert_eq!(report.iterations, 20);
        assert_eq!(report.skipped_vertices, 0);
        assert!(!report.converged);
        assert!(max_error(&positions, &cage) < 1e-5);
    }

    #[test]
    fn test_recovers_open_grid_cage() {
        let mesh = create_saddle_grid(4);
        let stencils = LimitStencils::build(&mesh);
        let cage = mesh.positions();
        let anchors = stencils.limit_positions(&cage);

        let mut positions = anchors.clone();
        let options = LimitSolveOptions::default().with_iterations(200);
        solve_limit_positions(&mut positions, &stencils, &anchors, &options).unwrap();

        assert!(max_error(&positions, &cage) < 1e-9);
    }

    #[test]
    fn test_low_valence_vertices_never_move() {
        let mesh = create_saddle_grid(3);
        let stencils = LimitStencils::build(&mesh);
        let mut positions = mesh.positions();
        let before = positions.clone();
        // Anchors far away from everything
        let anchors: Vec<Point3<f64>> = positions
            .iter()
            .map(|p| p + nalgebra::Vector3::new(3.0, -1.0, 2.0))
            .collect();

        let corners = [0, 3, 12, 15];
        for scheme in [UpdateScheme::GaussSeidel, UpdateScheme::jacobi()] {
            let options = LimitSolveOptions::default().with_scheme(scheme);
            let report =
                solve_limit_positions(&mut positions, &stencils, &anchors, &options).unwrap();
            assert_eq!(report.skipped_vertices, 4);
            for &c in &corners {
                assert_eq!(positions[c], before[c]);
            }
        }
    }

    #[test]
    fn test_converged_positions_are_stable() {
        let mesh = create_torus(6, 6);
        let stencils = LimitStencils::build(&mesh);
        let anchors = stencils.limit_positions(&mesh.positions());

        let mut positions = anchors.clone();
        let options = LimitSolveOptions::default()
            .with_iterations(500)
            .with_tolerance(1e-13);
        let report = solve_limit_positions(&mut positions, &stencils, &anchors, &options).unwrap();
        assert!(report.converged);
        assert!(report.iterations < 500);

        let settled = positions.clone();
        let more = LimitSolveOptions::default().with_iterations(10);
        let again = solve_limit_positions(&mut positions, &stencils, &anchors, &more).unwrap();
        assert!(again.max_displacement < 1e-12);
        assert!(max_error(&positions, &settled) < 1e-12);
    }

    #[test]
    fn test_damped_jacobi_converges_and_is_order_free() {
        let mesh = create_torus(8, 6);
        let stencils = LimitStencils::build(&mesh);
        let cage = mesh.positions();
        let anchors = stencils.limit_positions(&cage);

        let options = LimitSolveOptions::default()
            .with_scheme(UpdateScheme::jacobi())
            .with_iterations(60);

        let mut sequential = anchors.clone();
        solve_limit_positions(&mut sequential, &stencils, &anchors, &options).unwrap();
        assert!(max_error(&sequential, &cage) < 1e-6);

        let mut parallel = anchors.clone();
        let parallel_options = options.clone().with_parallel(true);
        solve_limit_positions(&mut parallel, &stencils, &anchors, &parallel_options).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_undamped_jacobi_diverges_on_regular_grid() {
        let mesh = create_torus(8, 6);
        let stencils = LimitStencils::build(&mesh);
        let cage = mesh.positions();
        let anchors = stencils.limit_positions(&cage);
        let start_error = max_error(&anchors, &cage);

        let options = LimitSolveOptions::default()
            .with_scheme(UpdateScheme::Jacobi { damping: 1.0 })
            .with_iterations(60);
        let mut positions = anchors.clone();
        solve_limit_positions(&mut positions, &stencils, &anchors, &options).unwrap();

        assert!(max_error(&positions, &cage) > start_error);
    }

    #[test]
    fn test_zero_iterations_no_change() {
        let mesh = create_torus(4, 4);
        let stencils = LimitStencils::build(&mesh);
        let mut positions = mesh.positions();
        let anchors = stencils.limit_positions(&positions);
        let before = positions.clone();

        let options = LimitSolveOptions::default().with_iterations(0);
        let report = solve_limit_positions(&mut positions, &stencils, &anchors, &options).unwrap();

        assert_eq!(report.iterations, 0);
        assert_eq!(positions, before);
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let mesh = create_torus(4, 4);
        let stencils = LimitStencils::build(&mesh);
        let mut positions = mesh.positions();
        let anchors = vec![Point3::origin(); 3];

        let options = LimitSolveOptions::default();
        let result = solve_limit_positions(&mut positions, &stencils, &anchors, &options);
        assert!(matches!(result, Err(MeshError::InvalidState(_))));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let mesh = create_torus(4, 4);
        let stencils = LimitStencils::build(&mesh);
        let mut positions = mesh.positions();
        let anchors = positions.clone();

        let bad_damping =
            LimitSolveOptions::default().with_scheme(UpdateScheme::Jacobi { damping: 0.0 });
        assert!(matches!(
            solve_limit_positions(&mut positions, &stencils, &anchors, &bad_damping),
            Err(MeshError::InvalidParameter { name: "damping", .. })
        ));

        let bad_tolerance = LimitSolveOptions::default().with_tolerance(f64::NAN);
        assert!(matches!(
            solve_limit_positions(&mut positions, &stencils, &anchors, &bad_tolerance),
            Err(MeshError::InvalidParameter { name: "tolerance", .. })
        ));
    }
}

//! Control cage fitting.
//!
//! The full pipeline that turns a subdivided mesh back into a cage:
//!
//! 1. Undo the Catmull-Clark levels topologically ([`unsubdivide`])
//! 2. Pair each coarse vertex with its nearest fine vertex ([`match_meshes`])
//! 3. Relax coarse positions until their limit positions hit those fine
//!    vertices ([`solve_limit_positions`](crate::algo::limit::solve_limit_positions))
//! 4. Rebuild an independent, named output mesh ([`rebuild_cage`])
//!
//! The fine mesh is only read. The cage shares no storage with it.
//!
//! # Example
//!
//! ```no_run
//! use unsubd::prelude::*;
//! use unsubd::algo::cage::{cage_deviation, fit_cage, CageOptions};
//!
//! let fine: HalfEdgeMesh = unsubd::io::load("dense.obj").unwrap();
//!
//! let cage = fit_cage(&fine, &CageOptions::default()).unwrap();
//! let deviation = cage_deviation(&cage.mesh, &fine, 2).unwrap();
//! println!("max deviation: {}", deviation.max);
//!
//! unsubd::io::save_named(&cage.mesh, &cage.name, "cage.obj").unwrap();
//! ```

use nalgebra::Point3;

use crate::algo::correspond::{match_meshes, match_nearest, MatchOptions};
use crate::algo::limit::{solve_with_sweep_callback, LimitSolveOptions, LimitStencils, SolveReport};
use crate::algo::subdivide::{catmull_clark_subdivide, SubdivideOptions};
use crate::algo::unsubdivide::{unsubdivide, UnsubdivideOptions};
use crate::algo::Progress;
use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeMesh, MeshIndex};

/// Name given to fitted cages unless overridden.
pub const DEFAULT_CAGE_NAME: &str = "Cage";

/// Pipeline stages reported through [`Progress`].
const STAGES: usize = 4;

/// Options for [`fit_cage`].
#[derive(Debug, Clone)]
pub struct CageOptions {
    /// Catmull-Clark levels to undo (default: 2).
    pub levels: usize,

    /// Relaxation settings.
    pub solve: LimitSolveOptions,

    /// Nearest-vertex matching settings.
    pub matching: MatchOptions,

    /// Name attached to the output mesh.
    pub name: String,
}

impl Default for CageOptions {
    fn default() -> Self {
        Self {
            levels: 2,
            solve: LimitSolveOptions::default(),
            matching: MatchOptions::default(),
            name: DEFAULT_CAGE_NAME.to_string(),
        }
    }
}

impl CageOptions {
    /// Set the number of levels to undo.
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    /// Set the relaxation settings.
    pub fn with_solve(mut self, solve: LimitSolveOptions) -> Self {
        self.solve = solve;
        self
    }

    /// Set the number of relaxation sweeps.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.solve.iterations = iterations;
        self
    }

    /// Set the output name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set whether matching and Jacobi sweeps run in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.matching.parallel = parallel;
        self.solve.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(self) -> Self {
        self.with_parallel(false)
    }
}

/// A fitted control cage.
#[derive(Debug, Clone)]
pub struct Cage<I: MeshIndex = u32> {
    /// Output object name.
    pub name: String,
    /// Cage topology and solved positions.
    pub mesh: HalfEdgeMesh<I>,
    /// Relaxation outcome, when the cage came from [`fit_cage`].
    pub report: Option<SolveReport>,
}

/// Distance between a re-subdivided cage and the mesh it should reproduce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationReport {
    /// Largest distance from a re-subdivided vertex to the nearest fine vertex.
    pub max: f64,
    /// Mean of the same distances.
    pub mean: f64,
}

/// Copy `coarse`'s topology with `positions` as its vertex positions.
///
/// # Errors
/// [`MeshError::InvalidState`] if `positions` does not have one entry per
/// coarse vertex.
pub fn rebuild_cage<I: MeshIndex>(
    coarse: &HalfEdgeMesh<I>,
    positions: &[Point3<f64>],
    name: &str,
) -> Result<Cage<I>> {
    if positions.len() != coarse.num_vertices() {
        return Err(MeshError::InvalidState(format!(
            "cage has {} vertices but {} positions were given",
            coarse.num_vertices(),
            positions.len()
        )));
    }

    let mut mesh = coarse.clone();
    for (v, &p) in coarse.vertex_ids().zip(positions) {
        mesh.set_position(v, p);
    }

    Ok(Cage {
        name: name.to_string(),
        mesh,
        report: None,
    })
}

/// Fit a control cage to a Catmull-Clark subdivided mesh.
///
/// # Errors
/// [`MeshError::EmptyMesh`] for a mesh without faces,
/// [`MeshError::NotSubdivided`] when the topology cannot be reduced, and any
/// solver parameter error.
pub fn fit_cage<I: MeshIndex>(fine: &HalfEdgeMesh<I>, options: &CageOptions) -> Result<Cage<I>> {
    fit_cage_with_progress(fine, options, &Progress::none())
}

/// [`fit_cage`] with progress reporting across the pipeline stages.
pub fn fit_cage_with_progress<I: MeshIndex>(
    fine: &HalfEdgeMesh<I>,
    options: &CageOptions,
    progress: &Progress,
) -> Result<Cage<I>> {
    if fine.num_faces() == 0 {
        return Err(MeshError::EmptyMesh);
    }
    log::info!(
        "fitting cage to {} vertices, {} faces ({} levels)",
        fine.num_vertices(),
        fine.num_faces(),
        options.levels
    );

    progress.report(0, STAGES, "Un-subdividing");
    let coarse = unsubdivide(fine, &UnsubdivideOptions::new(options.levels))?;
    log::info!(
        "coarse topology: {} vertices, {} faces",
        coarse.num_vertices(),
        coarse.num_faces()
    );

    progress.report(1, STAGES, "Matching vertices");
    let correspondence = match_meshes(fine, &coarse, &options.matching)?;
    let anchors = correspondence.anchors(&fine.positions());
    log::info!(
        "matched coarse vertices (max distance {:.3e})",
        correspondence.max_distance()
    );

    let stencils = LimitStencils::build(&coarse);
    let mut positions = coarse.positions();
    let report = solve_with_sweep_callback(
        &mut positions,
        &stencils,
        &anchors,
        &options.solve,
        &|sweep, total| progress.report_sub(sweep, total, 2, STAGES, "Relaxing cage"),
    )?;
    log::info!(
        "relaxed {} vertices in {} sweeps (last max displacement {:.3e})",
        report.relaxed_vertices,
        report.iterations,
        report.max_displacement
    );
    if report.skipped_vertices > 0 {
        log::warn!(
            "{} cage vertices have valence < 3 and keep their un-subdivided positions",
            report.skipped_vertices
        );
    }

    progress.report(3, STAGES, "Building cage");
    let mut cage = rebuild_cage(&coarse, &positions, &options.name)?;
    cage.report = Some(report);
    progress.report(STAGES, STAGES, "Done");

    Ok(cage)
}

/// Re-subdivide `cage` `levels` times and measure how far its vertices land
/// from the vertices of `fine`.
pub fn cage_deviation<I: MeshIndex>(
    cage: &HalfEdgeMesh<I>,
    fine: &HalfEdgeMesh<I>,
    levels: usize,
) -> Result<DeviationReport> {
    let mut refined = cage.clone();
    catmull_clark_subdivide(&mut refined, &SubdivideOptions::new(levels))?;

    let nearest = match_nearest(&fine.positions(), &refined.positions(), &MatchOptions::default())?;
    Ok(DeviationReport {
        max: nearest.max_distance(),
        mean: nearest.mean_distance(),
    })
}

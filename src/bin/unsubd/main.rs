//! unsubd CLI - recover Catmull-Clark control cages from the command line.
//!
//! Usage: unsubd <COMMAND> [OPTIONS] <INPUT> [OUTPUT]
//!
//! Run `unsubd --help` for available commands. Set `RUST_LOG=debug` for
//! per-stage detail.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};

use unsubd::algo::cage::{cage_deviation, fit_cage_with_progress, CageOptions, DEFAULT_CAGE_NAME};
use unsubd::algo::limit::{LimitSolveOptions, UpdateScheme, DEFAULT_JACOBI_DAMPING};
use unsubd::algo::unsubdivide::{unsubdivide, unsubdivide_with_progress, UnsubdivideOptions};
use unsubd::algo::{subdivide, Progress};
use unsubd::io;
use unsubd::mesh::HalfEdgeMesh;

#[derive(Parser)]
#[command(name = "unsubd")]
#[command(author, version, about = "Catmull-Clark cage recovery CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh information
    Info {
        /// Input mesh file
        input: PathBuf,
    },

    /// Fit a control cage to a subdivided mesh
    Cage {
        /// Input mesh file (subdivided)
        input: PathBuf,

        /// Output cage file
        output: PathBuf,

        /// Number of subdivision levels to undo
        #[arg(short, long, default_value = "2")]
        levels: usize,

        /// Number of relaxation sweeps
        #[arg(short, long, default_value = "20")]
        iterations: usize,

        /// Relaxation update scheme
        #[arg(short, long, value_enum, default_value = "gauss-seidel")]
        scheme: Scheme,

        /// Damping factor for the Jacobi scheme (0.0 to 1.0]
        #[arg(short, long, default_value_t = DEFAULT_JACOBI_DAMPING)]
        damping: f64,

        /// Stop early once no vertex moves more than this
        #[arg(short, long)]
        tolerance: Option<f64>,

        /// Object name written to the output
        #[arg(short, long, default_value = DEFAULT_CAGE_NAME)]
        name: String,

        /// Re-subdivide the cage and report its deviation from the input
        #[arg(long)]
        verify: bool,

        /// Use sequential execution instead of parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Reduce the topology of a subdivided mesh without moving vertices
    Unsubdivide {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Number of subdivision levels to undo
        #[arg(short, long, default_value = "2")]
        levels: usize,
    },

    /// Apply Catmull-Clark subdivision
    Subdivide {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Number of subdivision iterations
        #[arg(short, long, default_value = "1")]
        iterations: usize,

        /// Use sequential execution instead of parallel
        #[arg(long)]
        sequential: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scheme {
    /// In-place updates, converges fastest
    GaussSeidel,
    /// Damped simultaneous updates, parallelizable
    Jacobi,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Info { input } => cmd_info(&input),
        Commands::Cage {
            input,
            output,
            levels,
            iterations,
            scheme,
            damping,
            tolerance,
            name,
            verify,
            sequential,
        } => {
            let scheme = match scheme {
                Scheme::GaussSeidel => UpdateScheme::GaussSeidel,
                Scheme::Jacobi => UpdateScheme::Jacobi { damping },
            };
            let mut solve = LimitSolveOptions::default()
                .with_iterations(iterations)
                .with_scheme(scheme);
            if let Some(tolerance) = tolerance {
                solve = solve.with_tolerance(tolerance);
            }
            let options = CageOptions::default()
                .with_levels(levels)
                .with_solve(solve)
                .with_name(name)
                .with_parallel(!sequential);
            cmd_cage(&input, &output, &options, verify)
        }
        Commands::Unsubdivide {
            input,
            output,
            levels,
        } => cmd_unsubdivide(&input, &output, levels),
        Commands::Subdivide {
            input,
            output,
            iterations,
            sequential,
        } => cmd_subdivide(&input, &output, iterations, sequential),
    }
}

/// Create a progress reporter that displays a progress bar on stderr.
fn create_progress() -> Progress {
    // Highest percent shown so far, so the bar never moves backwards
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        let previous = max_percent.fetch_max(raw_percent, Ordering::Relaxed);
        let percent = previous.max(raw_percent);
        if percent == previous && percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);

        eprint!("\r[{}{}] {:3}% {:<24}", bar, space, percent, message);
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn cmd_info(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mesh: HalfEdgeMesh = io::load(input)?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.num_vertices());
    println!("Faces: {}", mesh.num_faces());
    println!("Edges: {}", mesh.num_edges());
    println!("Half-edges: {}", mesh.num_halfedges());
    println!("Surface area: {:.6}", mesh.surface_area());

    if let Some((min, max)) = mesh.bounding_box() {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
        let diag = max - min;
        println!("Dimensions: {:.3} x {:.3} x {:.3}", diag.x, diag.y, diag.z);
    }
    println!("Average edge length: {:.6}", mesh.average_edge_length());

    if mesh.is_quad_mesh() {
        println!("Mesh type: Quad mesh");
    } else if mesh.is_triangle_mesh() {
        println!("Mesh type: Triangle mesh");
    } else {
        let quads = mesh
            .face_ids()
            .filter(|&f| mesh.face_vertex_count(f) == 4)
            .count();
        println!(
            "Mesh type: Mixed polygon mesh ({} quads, {} other)",
            quads,
            mesh.num_faces() - quads
        );
    }

    let boundary = mesh
        .vertex_ids()
        .filter(|&v| mesh.is_boundary_vertex(v))
        .count();
    if boundary == 0 {
        println!("Topology: Closed (no boundary)");
    } else {
        println!("Topology: Open ({} boundary vertices)", boundary);
    }
    let euler = mesh.num_vertices() as i64 - mesh.num_edges() as i64 + mesh.num_faces() as i64;
    println!("Euler characteristic: {}", euler);

    let mut histogram: BTreeMap<usize, usize> = BTreeMap::new();
    for v in mesh.vertex_ids() {
        *histogram.entry(mesh.valence(v)).or_default() += 1;
    }
    println!("Valence histogram:");
    for (valence, count) in &histogram {
        println!("  {:>3}: {}", valence, count);
    }

    Ok(())
}

fn cmd_cage(
    input: &PathBuf,
    output: &PathBuf,
    options: &CageOptions,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh: HalfEdgeMesh = io::load(input)?;

    println!("Loaded: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());

    let mode = if options.solve.parallel { "parallel" } else { "sequential" };
    let scheme = match options.solve.scheme {
        UpdateScheme::GaussSeidel => "Gauss-Seidel".to_string(),
        UpdateScheme::Jacobi { damping } => format!("Jacobi, damping {}", damping),
    };
    println!(
        "Fitting cage ({} levels, {} sweeps, {}, {})...",
        options.levels, options.solve.iterations, scheme, mode
    );
    let progress = create_progress();

    let start = Instant::now();
    let cage = fit_cage_with_progress(&mesh, options, &progress)?;
    let elapsed = start.elapsed();

    println!(
        "Result: {} vertices, {} faces",
        cage.mesh.num_vertices(),
        cage.mesh.num_faces()
    );
    if let Some(report) = &cage.report {
        println!(
            "Relaxed {} vertices in {} sweeps{} (last max displacement {:.3e})",
            report.relaxed_vertices,
            report.iterations,
            if report.converged { ", converged" } else { "" },
            report.max_displacement
        );
        if report.skipped_vertices > 0 {
            println!("Skipped {} vertices with valence < 3", report.skipped_vertices);
        }
    }

    if verify {
        let naive = unsubdivide(&mesh, &UnsubdivideOptions::new(options.levels))?;
        let before = cage_deviation(&naive, &mesh, options.levels)?;
        let after = cage_deviation(&cage.mesh, &mesh, options.levels)?;
        println!(
            "Deviation after re-subdivision: max {:.3e}, mean {:.3e} (un-subdivided: max {:.3e}, mean {:.3e})",
            after.max, after.mean, before.max, before.mean
        );
    }

    io::save_named(&cage.mesh, &cage.name, output)?;
    println!("Saved: {} '{}' ({:.2?})", output.display(), cage.name, elapsed);

    Ok(())
}

fn cmd_unsubdivide(
    input: &PathBuf,
    output: &PathBuf,
    levels: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh: HalfEdgeMesh = io::load(input)?;

    println!("Loaded: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());
    println!("Un-subdividing ({} levels)...", levels);
    let progress = create_progress();

    let start = Instant::now();
    let coarse = unsubdivide_with_progress(&mesh, &UnsubdivideOptions::new(levels), &progress)?;
    let elapsed = start.elapsed();

    println!("Result: {} vertices, {} faces", coarse.num_vertices(), coarse.num_faces());
    io::save(&coarse, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);

    Ok(())
}

fn cmd_subdivide(
    input: &PathBuf,
    output: &PathBuf,
    iterations: usize,
    sequential: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut mesh: HalfEdgeMesh = io::load(input)?;

    println!("Loaded: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());

    let options = subdivide::SubdivideOptions::new(iterations).with_parallel(!sequential);
    let mode = if sequential { "sequential" } else { "parallel" };
    let progress = create_progress();

    println!("Applying Catmull-Clark subdivision ({} iterations, {})...", iterations, mode);
    let start = Instant::now();
    subdivide::catmull_clark_subdivide_with_progress(&mut mesh, &options, &progress)?;
    let elapsed = start.elapsed();

    println!("Result: {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces());
    io::save(&mesh, output)?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);

    Ok(())
}

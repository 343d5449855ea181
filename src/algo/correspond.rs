//! Coarse-to-fine vertex correspondence.
//!
//! Each coarse vertex is paired with its nearest fine vertex, and that fine
//! vertex's position becomes the limit position the solver aims for. The
//! fine points go into a static k-d tree once; the tree is dropped when
//! matching finishes. Planar and axis-aligned meshes put many points on the
//! same coordinate value, which the tree has to accept.

use std::num::NonZeroUsize;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::Point3;
use rayon::prelude::*;

use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeMesh, MeshIndex};

/// Candidates examined by the first query; doubled while all of them tie.
const TIE_CANDIDATES: usize = 4;

/// Options for nearest-vertex matching.
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    /// Whether to run queries in parallel (default: false).
    /// The result does not depend on this flag.
    pub parallel: bool,
}

impl MatchOptions {
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

/// Nearest fine vertex for every coarse vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondence {
    targets: Vec<usize>,
    distances: Vec<f64>,
}

impl Correspondence {
    /// Number of matched coarse vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True if nothing was matched.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Fine vertex matched to coarse vertex `coarse`.
    #[inline]
    pub fn target(&self, coarse: usize) -> usize {
        self.targets[coarse]
    }

    /// Fine vertex indices, in coarse vertex order.
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Euclidean match distances, in coarse vertex order.
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Largest match distance.
    pub fn max_distance(&self) -> f64 {
        self.distances.iter().copied().fold(0.0, f64::max)
    }

    /// Mean match distance (0 when empty).
    pub fn mean_distance(&self) -> f64 {
        if self.distances.is_empty() {
            return 0.0;
        }
        self.distances.iter().sum::<f64>() / self.distances.len() as f64
    }

    /// Fine positions of the matched vertices: one anchor per coarse vertex.
    pub fn anchors(&self, fine_points: &[Point3<f64>]) -> Vec<Point3<f64>> {
        self.targets.iter().map(|&i| fine_points[i]).collect()
    }
}

/// Match every coarse point to its nearest fine point.
///
/// Among fine points at exactly the same distance the lowest index wins, so
/// the result is the same across runs and with or without `parallel`.
///
/// # Errors
/// [`MeshError::EmptyMesh`] if either point set is empty.
///
/// # Example
///
/// ```
/// use unsubd::algo::correspond::{match_nearest, MatchOptions};
/// use nalgebra::Point3;
///
/// let fine = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(2.0, 0.0, 0.0),
/// ];
/// let coarse = vec![Point3::new(1.9, 0.1, 0.0), Point3::new(0.5, 0.0, 0.0)];
///
/// let matches = match_nearest(&fine, &coarse, &MatchOptions::default()).unwrap();
/// assert_eq!(matches.targets(), &[2, 0]);
/// ```
pub fn match_nearest(
    fine_points: &[Point3<f64>],
    coarse_points: &[Point3<f64>],
    options: &MatchOptions,
) -> Result<Correspondence> {
    if fine_points.is_empty() || coarse_points.is_empty() {
        return Err(MeshError::EmptyMesh);
    }
    if coarse_points.len() > fine_points.len() {
        log::warn!(
            "matching {} coarse vertices against only {} fine vertices; some fine vertices will be shared",
            coarse_points.len(),
            fine_points.len()
        );
    }

    let entries: Vec<[f64; 3]> = fine_points.iter().map(|p| [p.x, p.y, p.z]).collect();
    let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(&entries);
    let query = |p: &Point3<f64>| nearest_lowest_index(&tree, [p.x, p.y, p.z], entries.len());

    let matches: Vec<(usize, f64)> = if options.parallel {
        coarse_points.par_iter().map(query).collect()
    } else {
        coarse_points.iter().map(query).collect()
    };
    drop(tree);

    let (targets, distances): (Vec<usize>, Vec<f64>) = matches.into_iter().unzip();
    let correspondence = Correspondence { targets, distances };

    log::debug!(
        "matched {} coarse vertices to {} fine vertices (max distance {:.3e}, mean {:.3e})",
        correspondence.len(),
        fine_points.len(),
        correspondence.max_distance(),
        correspondence.mean_distance()
    );

    Ok(correspondence)
}

/// Nearest point to `query`, lowest index among exact ties.
///
/// Widens the candidate count until some candidate is strictly farther than
/// the best one, so every tied point has been seen.
fn nearest_lowest_index(
    tree: &ImmutableKdTree<f64, 3>,
    query: [f64; 3],
    len: usize,
) -> (usize, f64) {
    let mut k = TIE_CANDIDATES.min(len);
    loop {
        let max_qty = NonZeroUsize::new(k).unwrap_or(NonZeroUsize::MIN);
        let results = tree.nearest_n::<SquaredEuclidean>(&query, max_qty);
        let best = results
            .iter()
            .map(|n| n.distance)
            .fold(f64::INFINITY, f64::min);
        let tied = results.iter().filter(|n| n.distance == best);

        if tied.clone().count() < results.len() || k >= len {
            let index = tied.map(|n| n.item as usize).min().unwrap_or(0);
            return (index, best.sqrt());
        }
        k = (k * 2).min(len);
    }
}

/// [`match_nearest`] over the vertex positions of two meshes.
pub fn match_meshes<I: MeshIndex>(
    fine: &HalfEdgeMesh<I>,
    coarse: &HalfEdgeMesh<I>,
    options: &MatchOptions,
) -> Result<Correspondence> {
    match_nearest(&fine.positions(), &coarse.positions(), options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice(n: usize) -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    points.push(Point3::new(i as f64, j as f64, k as f64));
                }
            }
        }
        points
    }

    #[test]
    fn test_exact_matches() {
        let fine = lattice(4);
        let coarse = vec![fine[5], fine[63], fine[0], fine[21]];

        let matches = match_nearest(&fine, &coarse, &MatchOptions::default()).unwrap();

        assert_eq!(matches.targets(), &[5, 63, 0, 21]);
        assert_eq!(matches.max_distance(), 0.0);
        assert_eq!(matches.anchors(&fine), coarse);
    }

    #[test]
    fn test_nearest_with_distance() {
        let fine = lattice(3);
        let coarse = vec![Point3::new(2.2, 1.0, 0.9)];

        let matches = match_nearest(&fine, &coarse, &MatchOptions::default()).unwrap();

        // (2, 1, 1) is index 1*9 + 1*3 + 2
        assert_eq!(matches.target(0), 14);
        let expected = (0.2_f64 * 0.2 + 0.1 * 0.1).sqrt();
        assert!((matches.distances()[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        // Query sits exactly between fine vertices 3 and 1
        let fine = vec![
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
        ];
        let coarse = vec![Point3::origin()];

        for _ in 0..5 {
            let matches = match_nearest(&fine, &coarse, &MatchOptions::default()).unwrap();
            assert_eq!(matches.target(0), 1);
        }
    }

    #[test]
    fn test_duplicate_fine_points_pick_lowest_index() {
        let p = Point3::new(0.5, 0.5, 0.5);
        let fine = vec![Point3::new(3.0, 3.0, 3.0), p, Point3::new(-2.0, 0.0, 0.0), p];

        let matches = match_nearest(&fine, &[p], &MatchOptions::default()).unwrap();
        assert_eq!(matches.target(0), 1);
    }

    #[test]
    fn test_many_equidistant_points_pick_lowest_index() {
        // Eight cube corners around the query, listed after two far points
        let mut fine = vec![Point3::new(9.0, 9.0, 9.0), Point3::new(-9.0, 0.0, 0.0)];
        for &(x, y, z) in &[
            (1.0, 1.0, 1.0),
            (-1.0, 1.0, 1.0),
            (1.0, -1.0, 1.0),
            (-1.0, -1.0, 1.0),
            (1.0, 1.0, -1.0),
            (-1.0, 1.0, -1.0),
            (1.0, -1.0, -1.0),
            (-1.0, -1.0, -1.0),
        ] {
            fine.push(Point3::new(x, y, z));
        }

        let matches = match_nearest(&fine, &[Point3::origin()], &MatchOptions::default()).unwrap();
        assert_eq!(matches.target(0), 2);
        assert!((matches.distances()[0] - 3.0_f64.sqrt()).abs() < 1e-12);

        // Eleven copies of one point behind a single decoy
        let p = Point3::new(0.25, -0.5, 2.0);
        let mut copies = vec![Point3::new(0.0, 0.0, 0.0)];
        copies.extend(std::iter::repeat(p).take(11));
        let matches = match_nearest(&copies, &[p], &MatchOptions::default()).unwrap();
        assert_eq!(matches.target(0), 1);
    }

    #[test]
    fn test_flat_point_grid() {
        // Every point shares z, and each row and column shares x or y
        let n = 200;
        let fine: Vec<Point3<f64>> = (0..n * n)
            .map(|i| Point3::new((i % n) as f64 * 0.5, (i / n) as f64 * 0.5, 0.0))
            .collect();
        let coarse = vec![
            Point3::new(10.1, 20.2, 0.3),
            Point3::new(-3.0, -3.0, 0.0),
            Point3::new(99.5, 99.5, 0.0),
        ];

        let matches = match_nearest(&fine, &coarse, &MatchOptions::default()).unwrap();
        assert_eq!(matches.target(0), 40 * n + 20);
        assert_eq!(matches.target(1), 0);
        assert_eq!(matches.target(2), n * n - 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let fine = lattice(6);
        let coarse: Vec<Point3<f64>> = (0..50)
            .map(|i| {
                let t = i as f64 * 0.37;
                Point3::new(t.sin() * 2.5 + 2.5, t.cos() * 2.5 + 2.5, (t * 0.5) % 5.0)
            })
            .collect();

        let sequential = match_nearest(&fine, &coarse, &MatchOptions::default()).unwrap();
        let parallel =
            match_nearest(&fine, &coarse, &MatchOptions::default().with_parallel(true)).unwrap();

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_more_coarse_than_fine_still_matches() {
        let fine = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let coarse = vec![
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.9, 0.0, 0.0),
            Point3::new(0.2, 0.0, 0.0),
        ];

        let matches = match_nearest(&fine, &coarse, &MatchOptions::default()).unwrap();
        assert_eq!(matches.targets(), &[0, 1, 0]);
    }

    #[test]
    fn test_empty_sets_rejected() {
        let points = vec![Point3::origin()];
        assert!(matches!(
            match_nearest(&[], &points, &MatchOptions::default()),
            Err(MeshError::EmptyMesh)
        ));
        assert!(matches!(
            match_nearest(&points, &[], &MatchOptions::default()),
            Err(MeshError::EmptyMesh)
        ));
    }
}

//! # Positional matcher
//!
//! Asymmetric nearest-neighbour matching of two point sets on the sphere.
//! For every point of list 1, find the closest point of list 2 and report the
//! angular separation; separations beyond the match radius are reported as
//! unmatched. The pairing is intentionally asymmetric: swapping the lists may
//! produce a different pair set when list 2 holds duplicate near-neighbours.
//!
//! ## Algorithm
//! -----------------
//! Coordinates are projected to 3-D Cartesian unit vectors; list 2 is indexed
//! with a k-d tree queried by chord distance, which is monotone in angular
//! separation so pruning stays exact. Below
//! [`MATCHER_BRUTE_FORCE_THRESHOLD`] reference points a linear scan is used
//! instead, since tree construction does not pay off there.
//!
//! ## Radius semantics
//! -----------------
//! The radius bound is enforced **inside** the matcher: a nearest neighbour
//! farther than `radius` is reported as unmatched (`NaN` separation, `None`
//! index), so no caller-side finiteness filtering can ever admit an
//! out-of-radius pair.

use nalgebra::Vector3;

use crate::constants::{Degree, MATCHER_BRUTE_FORCE_THRESHOLD, RADEG};

/// Per-point outcome of [`match_lists`], index-aligned with list 1.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Angular separation to the nearest list-2 point, in degrees.
    /// `NaN` when the point is unmatched.
    pub separation: Vec<Degree>,
    /// Positional index of the nearest neighbour in list 2, or `None` when
    /// unmatched (no neighbour within the radius, or list 2 empty).
    pub index: Vec<Option<usize>>,
}

impl MatchResult {
    pub fn len(&self) -> usize {
        self.separation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.separation.is_empty()
    }

    /// Number of matched points.
    pub fn n_good(&self) -> usize {
        self.index.iter().filter(|i| i.is_some()).count()
    }
}

fn unit_vector(ra_deg: Degree, dec_deg: Degree) -> Vector3<f64> {
    let ra = ra_deg * RADEG;
    let dec = dec_deg * RADEG;
    Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin())
}

/// Chord length between two unit vectors → angular separation in degrees.
fn chord_to_separation(chord: f64) -> Degree {
    2.0 * (0.5 * chord).clamp(-1.0, 1.0).asin() / RADEG
}

/// Angular separation → chord length between unit vectors.
fn separation_to_chord(sep_deg: Degree) -> f64 {
    2.0 * (0.5 * sep_deg * RADEG).sin()
}

// ---------------------------------------------------------------------------
// k-d tree over 3-D unit vectors
// ---------------------------------------------------------------------------

const LEAF_SIZE: usize = 16;

enum KdNode {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        axis: usize,
        threshold: f64,
        left: Box<KdNode>,
        right: Box<KdNode>,
    },
}

struct KdTree {
    points: Vec<Vector3<f64>>,
    /// Permutation of point indices, partitioned by the tree nodes.
    order: Vec<usize>,
    root: KdNode,
}

impl KdTree {
    fn build(points: Vec<Vector3<f64>>) -> KdTree {
        let mut order: Vec<usize> = (0..points.len()).collect();
        let root = Self::build_node(&points, &mut order, 0, points.len());
        KdTree {
            points,
            order,
            root,
        }
    }

    fn build_node(points: &[Vector3<f64>], order: &mut [usize], start: usize, end: usize) -> KdNode {
        let len = end - start;
        if len <= LEAF_SIZE {
            return KdNode::Leaf { start, end };
        }
        // Split on the axis with the widest spread for balanced partitions.
        let slice = &order[start..end];
        let mut axis = 0;
        let mut best_spread = f64::NEG_INFINITY;
        for candidate in 0..3 {
            let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
            for &i in slice {
                let x = points[i][candidate];
                lo = lo.min(x);
                hi = hi.max(x);
            }
            if hi - lo > best_spread {
                best_spread = hi - lo;
                axis = candidate;
            }
        }
        let mid = len / 2;
        order[start..end].select_nth_unstable_by(mid, |&a, &b| {
            points[a][axis]
                .partial_cmp(&points[b][axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let threshold = points[order[start + mid]][axis];
        let left = Box::new(Self::build_node(points, order, start, start + mid));
        let right = Box::new(Self::build_node(points, order, start + mid, end));
        KdNode::Split {
            axis,
            threshold,
            left,
            right,
        }
    }

    /// Nearest point to `query` by squared chord distance.
    fn nearest(&self, query: &Vector3<f64>) -> (usize, f64) {
        let mut best = (usize::MAX, f64::INFINITY);
        self.search(&self.root, query, &mut best);
        best
    }

    fn search(&self, node: &KdNode, query: &Vector3<f64>, best: &mut (usize, f64)) {
        match node {
            KdNode::Leaf { start, end } => {
                for &i in &self.order[*start..*end] {
                    let d2 = (self.points[i] - query).norm_squared();
                    if d2 < best.1 {
                        *best = (i, d2);
                    }
                }
            }
            KdNode::Split {
                axis,
                threshold,
                left,
                right,
            } => {
                let delta = query[*axis] - threshold;
                let (near, far) = if delta < 0.0 {
                    (left, right)
                } else {
                    (right, left)
                };
                self.search(near, query, best);
                // The far half can only win if the splitting plane is closer
                // than the current best.
                if delta * delta < best.1 {
                    self.search(far, query, best);
                }
            }
        }
    }
}

/// Match every (ra1, dec1) point against its nearest (ra2, dec2) neighbour.
///
/// Arguments
/// -----------------
/// * `ra1`, `dec1` – Coordinates of the query points, in degrees.
/// * `ra2`, `dec2` – Coordinates of the reference points, in degrees.
/// * `radius` – Maximum admissible separation, in degrees.
///
/// Return
/// ----------
/// * A [`MatchResult`] aligned with list 1. Zero-length inputs are valid:
///   an empty list 1 yields an empty result, an empty list 2 yields all rows
///   unmatched.
pub fn match_lists(
    ra1: &[Degree],
    dec1: &[Degree],
    ra2: &[Degree],
    dec2: &[Degree],
    radius: Degree,
) -> MatchResult {
    let n1 = ra1.len();
    let n2 = ra2.len();
    let mut separation = vec![f64::NAN; n1];
    let mut index = vec![None; n1];
    if n1 == 0 || n2 == 0 {
        return MatchResult { separation, index };
    }

    let queries: Vec<Vector3<f64>> = ra1
        .iter()
        .zip(dec1)
        .map(|(&ra, &dec)| unit_vector(ra, dec))
        .collect();
    let refs: Vec<Vector3<f64>> = ra2
        .iter()
        .zip(dec2)
        .map(|(&ra, &dec)| unit_vector(ra, dec))
        .collect();
    let max_chord2 = separation_to_chord(radius).powi(2);

    let mut record = |slot: usize, nearest: (usize, f64)| {
        let (j, d2) = nearest;
        if d2 <= max_chord2 {
            separation[slot] = chord_to_separation(d2.sqrt());
            index[slot] = Some(j);
        }
    };

    if n2 < MATCHER_BRUTE_FORCE_THRESHOLD {
        for (slot, q) in queries.iter().enumerate() {
            let mut best = (usize::MAX, f64::INFINITY);
            for (j, r) in refs.iter().enumerate() {
                let d2 = (r - q).norm_squared();
                if d2 < best.1 {
                    best = (j, d2);
                }
            }
            record(slot, best);
        }
    } else {
        let tree = KdTree::build(refs);
        for (slot, q) in queries.iter().enumerate() {
            record(slot, tree.nearest(q));
        }
    }

    MatchResult { separation, index }
}

// ─────────────────────────────────────────────────────────────────────
// TCDE Core — KD-Tree
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Immutable 6D KD-tree over a field snapshot.
//!
//! Axes cycle 0..5 by depth; each split is the median of its range. Leaves
//! hold up to `KD_LEAF_SIZE` indices. The tree records the field generation
//! it was built from and refuses to answer field evaluations once stale.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::Array2;
use tcde_math::complex::{self, Complex32};
use tcde_math::metric::Metric;
use tcde_math::rbf::cutoff_radius;
use tcde_types::config::RbfKind;
use tcde_types::constants::{DIM, KD_LEAF_SIZE};
use tcde_types::error::{TcdeError, TcdeResult};
use tcde_types::state::Point;

use crate::evaluator::to_f64;
use crate::field::Field;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        axis: usize,
        value: f32,
        left: usize,
        right: usize,
    },
}

/// Max-heap entry ordered by squared distance.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist_sq: f32,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_sq
            .total_cmp(&other.dist_sq)
            .then(self.index.cmp(&other.index))
    }
}

#[derive(Debug, Clone)]
pub struct KdTree {
    nodes: Vec<Node>,
    root: Option<usize>,
    /// Center indices, permuted so every leaf owns a contiguous range
    order: Vec<usize>,
    /// Coordinate snapshot, one row per center
    points: Array2<f32>,
    epsilons: Vec<f32>,
    generation: u64,
    kind: RbfKind,
    has_local_metrics: bool,
}

impl KdTree {
    pub fn build(field: &Field) -> Self {
        let centers = field.centers();
        let n = centers.len();
        let points = Array2::from_shape_fn((n, DIM), |(i, k)| centers[i].point.coords[k]);
        let mut tree = KdTree {
            nodes: Vec::with_capacity(2 * n / KD_LEAF_SIZE + 1),
            root: None,
            order: (0..n).collect(),
            points,
            epsilons: centers.iter().map(|c| c.epsilon).collect(),
            generation: field.generation(),
            kind: field.kernel(),
            has_local_metrics: field.has_local_metrics(),
        };
        if n > 0 {
            let root = tree.build_range(0, n, 0);
            tree.root = Some(root);
        }
        tree
    }

    /// Rebuild in place if the field changed since this tree was built.
    pub fn refresh(&mut self, field: &Field) {
        if self.is_stale(field) {
            *self = KdTree::build(field);
        }
    }

    fn build_range(&mut self, start: usize, end: usize, depth: usize) -> usize {
        if end - start <= KD_LEAF_SIZE {
            self.nodes.push(Node::Leaf { start, end });
            return self.nodes.len() - 1;
        }
        let axis = depth % DIM;
        let mid = start + (end - start) / 2;
        let points = &self.points;
        self.order[start..end].select_nth_unstable_by(mid - start, |&a, &b| {
            points[[a, axis]].total_cmp(&points[[b, axis]])
        });
        let value = self.points[[self.order[mid], axis]];

        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { start, end });
        let left = self.build_range(start, mid, depth + 1);
        let right = self.build_range(mid, end, depth + 1);
        self.nodes[slot] = Node::Split {
            axis,
            value,
            left,
            right,
        };
        slot
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_stale(&self, field: &Field) -> bool {
        self.generation != field.generation()
    }

    /// Longest root-to-leaf path; 0 for an empty tree.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match nodes[at] {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        self.root.map_or(0, |r| walk(&self.nodes, r))
    }

    #[inline]
    fn dist_sq(&self, i: usize, p: &Point) -> f32 {
        let row = self.points.row(i);
        let mut acc = 0.0f32;
        for k in 0..DIM {
            let d = row[k] - p.coords[k];
            acc += d * d;
        }
        acc
    }

    /// The `k` nearest centers in Euclidean distance, closest first.
    pub fn knn(&self, p: &Point, k: usize) -> Vec<(usize, f32)> {
        let mut heap = BinaryHeap::with_capacity(k + 1);
        if let (Some(root), true) = (self.root, k > 0) {
            self.knn_visit(root, p, k, &mut heap);
        }
        let mut out: Vec<(usize, f32)> = heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| (c.index, c.dist_sq.sqrt()))
            .collect();
        out.truncate(k);
        out
    }

    fn knn_visit(&self, at: usize, p: &Point, k: usize, heap: &mut BinaryHeap<Candidate>) {
        match self.nodes[at] {
            Node::Leaf { start, end } => {
                for &i in &self.order[start..end] {
                    let cand = Candidate {
                        dist_sq: self.dist_sq(i, p),
                        index: i,
                    };
                    if heap.len() < k {
                        heap.push(cand);
                    } else if let Some(worst) = heap.peek() {
                        if cand < *worst {
                            heap.pop();
                            heap.push(cand);
                        }
                    }
                }
            }
            Node::Split {
                axis,
                value,
                left,
                right,
            } => {
                let diff = p.coords[axis] - value;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                self.knn_visit(near, p, k, heap);
                let worst = heap.peek().map_or(f32::INFINITY, |c| c.dist_sq);
                if heap.len() < k || diff * diff <= worst {
                    self.knn_visit(far, p, k, heap);
                }
            }
        }
    }

    /// All centers within Euclidean distance `radius` of `p`.
    pub fn radius(&self, p: &Point, radius: f32) -> Vec<usize> {
        let half = [radius; DIM];
        let r2 = radius * radius;
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.box_visit(root, p, &half, &mut |i| {
                if self.dist_sq(i, p) <= r2 {
                    out.push(i);
                }
            });
        }
        out
    }

    /// All centers with (p_i − p)ᵀ g (p_i − p) ≤ r². The traversal prunes on
    /// the axis box of half-width r·√(g⁻¹)_kk that encloses the ellipsoid.
    pub fn ellipsoid(&self, p: &Point, metric: &Metric, radius: f32) -> Vec<usize> {
        let half = ellipsoid_half_widths(metric, radius);
        let r2 = radius as f64 * radius as f64;
        let x = to_f64(p);
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.box_visit(root, p, &half, &mut |i| {
                if self.metric_dist_sq(i, &x, metric) <= r2 {
                    out.push(i);
                }
            });
        }
        out
    }

    #[inline]
    fn metric_dist_sq(&self, i: usize, x: &[f64; DIM], metric: &Metric) -> f64 {
        let row = self.points.row(i);
        let mut d = [0.0f64; DIM];
        for k in 0..DIM {
            d[k] = row[k] as f64 - x[k];
        }
        metric.quadratic_form(&d)
    }

    /// Visit every index in leaves that intersect the box p ± half.
    fn box_visit<F: FnMut(usize)>(&self, at: usize, p: &Point, half: &[f32; DIM], visit: &mut F) {
        match self.nodes[at] {
            Node::Leaf { start, end } => {
                for &i in &self.order[start..end] {
                    visit(i);
                }
            }
            Node::Split {
                axis,
                value,
                left,
                right,
            } => {
                let lo = p.coords[axis] - half[axis];
                let hi = p.coords[axis] + half[axis];
                // Left holds coordinates ≤ value, right holds ≥ value.
                if lo <= value {
                    self.box_visit(left, p, half, visit);
                }
                if hi >= value {
                    self.box_visit(right, p, half, visit);
                }
            }
        }
    }

    /// Φ(p) summed over centers with d_g(p, p_i) < 3·ε_i·√ln10 only.
    ///
    /// Kernels without compact decay, and fields with per-center metrics,
    /// take the naive sum.
    pub fn evaluate_fast(&self, field: &Field, p: &Point) -> TcdeResult<Complex32> {
        if self.is_stale(field) {
            return Err(TcdeError::StaleIndex {
                built: self.generation,
                current: field.generation(),
            });
        }
        if self.has_local_metrics || self.kind != RbfKind::Gaussian || self.is_empty() {
            return Ok(field.evaluate(p));
        }
        let max_eps = self.epsilons.iter().fold(0.0f32, |m, &e| m.max(e));
        let reach = cutoff_radius(self.kind, max_eps).unwrap_or(f32::INFINITY);
        let metric = field.metric();
        let half = ellipsoid_half_widths(metric, reach);
        let x = to_f64(p);

        let mut selected = Vec::new();
        if let Some(root) = self.root {
            self.box_visit(root, p, &half, &mut |i| {
                let cutoff = cutoff_radius(self.kind, self.epsilons[i]).unwrap_or(f32::INFINITY);
                let c2 = cutoff as f64 * cutoff as f64;
                if self.metric_dist_sq(i, &x, metric) < c2 {
                    selected.push(i);
                }
            });
        }
        // Ascending index order keeps the summation order of the naive path.
        selected.sort_unstable();
        Ok(complex::narrow(field.sample_subset(&x, selected)))
    }
}

/// Relative padding of the pruning box against rounding of g⁻¹.
const BOX_PAD: f32 = 1e-5;

fn ellipsoid_half_widths(metric: &Metric, radius: f32) -> [f32; DIM] {
    let mut half = [radius; DIM];
    if let Some(inv) = metric.inverse() {
        for (k, h) in half.iter_mut().enumerate() {
            *h = radius * inv[k][k].max(0.0).sqrt() * (1.0 + BOX_PAD);
        }
    }
    half
}

//! Binary classification tree (CART, gini impurity).
//!
//! Nodes live in a flat arena; children are referenced by index so the
//! fitted tree serializes as plain data.

use intraday_core::config::TrainingConfig;
use ordered_float::OrderedFloat;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth (root is depth 0). `None` grows until pure.
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node.
    pub min_samples_split: usize,
    /// Minimum samples in each leaf.
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means ceil(sqrt(n_features)).
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

impl From<&TrainingConfig> for TreeParams {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: config.max_features,
        }
    }
}

impl TreeParams {
    fn features_per_split(&self, n_features: usize) -> usize {
        let default = (n_features as f64).sqrt().ceil() as usize;
        self.max_features.unwrap_or(default).clamp(1, n_features.max(1))
    }
}

/// Tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        /// Fraction of positive samples reaching this leaf.
        proba: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        /// Samples with `value <= threshold` go left.
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
    },
}

/// Best split found for one node.
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

/// A fitted classification tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Fit on the rows of `x` named by `indices` (repeats allowed).
    pub fn fit(
        x: &[Vec<f64>],
        y: &[u8],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut builder = TreeBuilder {
            x,
            y,
            params,
            n_features,
            per_split: params.features_per_split(n_features),
            nodes: Vec::new(),
        };
        let mut root = indices.to_vec();
        builder.grow(&mut root, 0, rng);
        Self { nodes: builder.nodes }
    }

    /// Probability of the positive class.
    pub fn predict_proba_one(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { proba, .. }) => return *proba,
                Some(Node::Split { feature, threshold, left, right, .. }) => {
                    let value = row.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if value <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    /// Number of nodes.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves.
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    /// Depth of the deepest leaf (a single leaf has depth 0).
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            match self.nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
                Some(Node::Leaf { .. }) => max_depth = max_depth.max(depth),
                None => {}
            }
        }
        max_depth
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    params: &'a TreeParams,
    n_features: usize,
    per_split: usize,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `indices`, returning its node index.
    fn grow(&mut self, indices: &mut [usize], depth: usize, rng: &mut ChaCha8Rng) -> usize {
        let n = indices.len();
        let positives = indices.iter().filter(|&&i| self.y[i] == 1).count();
        let impurity = gini(positives, n);

        let node_idx = self.nodes.len();
        let proba = if n > 0 { positives as f64 / n as f64 } else { 0.0 };
        self.nodes.push(Node::Leaf { proba, n_samples: n });

        let depth_exhausted = self.params.max_depth.is_some_and(|max| depth >= max);
        if depth_exhausted || n < self.params.min_samples_split || impurity <= f64::EPSILON {
            return node_idx;
        }

        let Some(split) = self.best_split(indices, impurity, rng) else {
            return node_idx;
        };

        // Partition in place: left block holds values <= threshold.
        let mut boundary = 0;
        for i in 0..n {
            if self.x[indices[i]][split.feature] <= split.threshold {
                indices.swap(i, boundary);
                boundary += 1;
            }
        }
        let (left_rows, right_rows) = indices.split_at_mut(boundary);

        let left = self.grow(left_rows, depth + 1, rng);
        let right = self.grow(right_rows, depth + 1, rng);
        self.nodes[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            n_samples: n,
        };
        node_idx
    }

    /// Lowest weighted-gini split over a random feature subset.
    fn best_split(
        &self,
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        if n < 2 || self.n_features == 0 {
            return None;
        }
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total_pos = indices.iter().filter(|&&i| self.y[i] == 1).count();

        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();
        // Draw features in random order; keep drawing past the per-split
        // budget until at least one non-constant feature has been seen.
        let order = sample(rng, self.n_features, self.n_features);
        for (visited, feature) in order.into_iter().enumerate() {
            if visited >= self.per_split && best.is_some() {
                break;
            }
            sorted.sort_by_key(|&i| OrderedFloat(self.x[i][feature]));

            let mut left_pos = 0;
            for k in 0..n - 1 {
                if self.y[sorted[k]] == 1 {
                    left_pos += 1;
                }
                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let a = self.x[sorted[k]][feature];
                let b = self.x[sorted[k + 1]][feature];
                if OrderedFloat(a) == OrderedFloat(b) {
                    continue;
                }

                let weighted = (n_left as f64 * gini(left_pos, n_left)
                    + n_right as f64 * gini(total_pos - left_pos, n_right))
                    / n as f64;
                if best.as_ref().map_or(true, |s| weighted < s.impurity) {
                    let mid = a + (b - a) / 2.0;
                    let threshold = if mid > a && mid < b { mid } else { a };
                    best = Some(SplitCandidate { feature, threshold, impurity: weighted });
                }
            }
        }

        best.filter(|s| s.impurity < parent_impurity - 1e-12)
    }
}

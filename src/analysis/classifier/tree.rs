// CART trees - greedy binary splits on one feature at a time
//
// One growth routine serves both tree flavours: classification trees split
// on Gini impurity and store class distributions in their leaves, regression
// trees (used by gradient boosting) split on squared error and store
// whatever value the caller computes for each leaf's members.

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::Estimator;
use crate::error::PipelineError;

/// Minimum gap between consecutive sorted values for a threshold
const FEATURE_THRESHOLD: f64 = 1e-7;
const PURITY_EPSILON: f64 = 1e-12;

/// Running impurity statistics of one side of a split
pub trait Criterion: Clone {
    fn push(&mut self, sample: usize);
    fn pop(&mut self, sample: usize);
    /// Impurity scaled by the number of samples (sum of losses)
    fn weighted_impurity(&self) -> f64;
}

/// Gini impurity over class counts
#[derive(Clone)]
pub struct Gini<'a> {
    targets: &'a [usize],
    counts: Vec<f64>,
    total: f64,
}

impl<'a> Gini<'a> {
    pub fn new(targets: &'a [usize], n_classes: usize) -> Self {
        Self {
            targets,
            counts: vec![0.0; n_classes],
            total: 0.0,
        }
    }
}

impl Criterion for Gini<'_> {
    fn push(&mut self, sample: usize) {
        self.counts[self.targets[sample]] += 1.0;
        self.total += 1.0;
    }

    fn pop(&mut self, sample: usize) {
        self.counts[self.targets[sample]] -= 1.0;
        self.total -= 1.0;
    }

    fn weighted_impurity(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        let sum_sq: f64 = self.counts.iter().map(|c| c * c).sum();
        self.total - sum_sq / self.total
    }
}

/// Squared error around the mean
#[derive(Clone)]
pub struct SquaredError<'a> {
    targets: &'a [f64],
    sum: f64,
    sum_sq: f64,
    total: f64,
}

impl<'a> SquaredError<'a> {
    pub fn new(targets: &'a [f64]) -> Self {
        Self {
            targets,
            sum: 0.0,
            sum_sq: 0.0,
            total: 0.0,
        }
    }
}

impl Criterion for SquaredError<'_> {
    fn push(&mut self, sample: usize) {
        let v = self.targets[sample];
        self.sum += v;
        self.sum_sq += v * v;
        self.total += 1.0;
    }

    fn pop(&mut self, sample: usize) {
        let v = self.targets[sample];
        self.sum -= v;
        self.sum_sq -= v * v;
        self.total -= 1.0;
    }

    fn weighted_impurity(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        (self.sum_sq - self.sum * self.sum / self.total).max(0.0)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(usize),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth limits
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeParams {
    /// Maximum depth; unbounded when `None`
    pub max_depth: Option<usize>,
    /// Features examined per split; all when `None`
    pub max_features: Option<usize>,
}

/// A fitted binary tree whose leaves hold value vectors
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    leaves: Vec<Vec<f64>>,
}

struct Split {
    feature: usize,
    threshold: f64,
    position: usize,
    sorted: Vec<usize>,
}

impl Tree {
    /// Grow a tree over the rows in `samples`
    ///
    /// # Arguments
    /// * `criterion` - Builds an empty criterion for a node
    /// * `leaf_value` - Computes a leaf's stored vector from its members
    pub fn grow<C: Criterion>(
        x: ArrayView2<'_, f64>,
        samples: Vec<usize>,
        params: TreeParams,
        rng: &mut StdRng,
        criterion: impl Fn() -> C,
        leaf_value: impl Fn(&[usize]) -> Vec<f64>,
    ) -> Tree {
        let mut tree = Tree::default();
        let root = tree.nodes.len();
        tree.nodes.push(Node::Leaf(0));
        let mut stack = vec![(root, samples, 0usize)];

        while let Some((slot, members, depth)) = stack.pop() {
            let depth_exhausted = params.max_depth.is_some_and(|max| depth >= max);
            let mut node_criterion = criterion();
            for &sample in &members {
                node_criterion.push(sample);
            }
            let pure = node_criterion.weighted_impurity() <= PURITY_EPSILON;

            let split = if depth_exhausted || pure || members.len() < 2 {
                None
            } else {
                best_split(x, &members, &node_criterion, params.max_features, rng, &criterion)
            };

            match split {
                Some(split) => {
                    let left_slot = tree.nodes.len();
                    tree.nodes.push(Node::Leaf(0));
                    let right_slot = tree.nodes.len();
                    tree.nodes.push(Node::Leaf(0));
                    tree.nodes[slot] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left: left_slot,
                        right: right_slot,
                    };
                    let (left, right) = split.sorted.split_at(split.position);
                    stack.push((right_slot, right.to_vec(), depth + 1));
                    stack.push((left_slot, left.to_vec(), depth + 1));
                }
                None => {
                    tree.nodes[slot] = Node::Leaf(tree.leaves.len());
                    tree.leaves.push(leaf_value(&members));
                }
            }
        }
        tree
    }

    /// Leaf vector reached by `row`
    pub fn leaf(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf(leaf) => return &self.leaves[*leaf],
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.leaves.len()
    }
}

fn best_split<C: Criterion>(
    x: ArrayView2<'_, f64>,
    members: &[usize],
    parent: &C,
    max_features: Option<usize>,
    rng: &mut StdRng,
    criterion: &impl Fn() -> C,
) -> Option<Split> {
    let mut features: Vec<usize> = (0..x.ncols()).collect();
    if let Some(limit) = max_features {
        features.shuffle(rng);
        features.truncate(limit.max(1));
    }

    let mut best: Option<(f64, Split)> = None;
    for feature in features {
        let mut sorted = members.to_vec();
        sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left = criterion();
        let mut right = parent.clone();
        let mut best_here: Option<(f64, usize)> = None;
        for position in 1..sorted.len() {
            let moved = sorted[position - 1];
            left.push(moved);
            right.pop(moved);
            let lo = x[[moved, feature]];
            let hi = x[[sorted[position], feature]];
            if hi <= lo + FEATURE_THRESHOLD {
                continue;
            }
            let score = left.weighted_impurity() + right.weighted_impurity();
            if best_here.map_or(true, |(s, _)| score < s) {
                best_here = Some((score, position));
            }
        }

        if let Some((score, position)) = best_here {
            if best.as_ref().map_or(true, |(s, _)| score < *s) {
                let lo = x[[sorted[position - 1], feature]];
                let hi = x[[sorted[position], feature]];
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some((
                    score,
                    Split {
                        feature,
                        threshold,
                        position,
                        sorted,
                    },
                ));
            }
        }
    }
    best.map(|(_, split)| split)
}

/// Class distribution of `members`
pub fn class_distribution(targets: &[usize], members: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    for &m in members {
        counts[targets[m]] += 1.0;
    }
    let total = members.len().max(1) as f64;
    counts.iter_mut().for_each(|c| *c /= total);
    counts
}

/// CART classifier (Gini, unbounded depth unless limited)
#[derive(Debug, Clone)]
pub struct DecisionTree {
    params: TreeParams,
    seed: u64,
    n_classes: usize,
    tree: Tree,
}

impl DecisionTree {
    pub fn new(params: TreeParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            n_classes: 0,
            tree: Tree::default(),
        }
    }

    /// Fit on an explicit (possibly repeated) sample list
    pub fn fit_samples(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
        samples: Vec<usize>,
        rng: &mut StdRng,
    ) {
        self.n_classes = n_classes;
        self.tree = Tree::grow(
            x,
            samples,
            self.params,
            rng,
            || Gini::new(y, n_classes),
            |members| class_distribution(y, members, n_classes),
        );
    }
}

impl Estimator for DecisionTree {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> Result<(), PipelineError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.fit_samples(x, y, n_classes, (0..x.nrows()).collect(), &mut rng);
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> ndarray::Array2<f64> {
        let mut out = ndarray::Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (k, &p) in self.tree.leaf(row).iter().enumerate() {
                out[[i, k]] = p;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_gini_of_pure_and_mixed_sets() {
        let targets = [0, 0, 1, 1];
        let mut gini = Gini::new(&targets, 2);
        gini.push(0);
        gini.push(1);
        assert_eq!(gini.weighted_impurity(), 0.0);
        gini.push(2);
        gini.push(3);
        assert!((gini.weighted_impurity() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_tree_fits_training_data_exactly() {
        let x = array![[0.0, 5.0], [1.0, 3.0], [2.0, 4.0], [3.0, 1.0], [4.0, 2.0], [5.0, 0.0]];
        let y = [0, 0, 1, 1, 0, 1];
        let mut tree = DecisionTree::new(TreeParams::default(), 42);
        tree.fit(x.view(), &y, 2).unwrap();
        assert_eq!(tree.predict(x.view()), y.to_vec());
    }

    #[test]
    fn test_depth_limit_caps_leaves() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0]];
        let targets = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = Tree::grow(
            x.view(),
            (0..8).collect(),
            TreeParams {
                max_depth: Some(1),
                max_features: None,
            },
            &mut rng,
            || SquaredError::new(&targets),
            |members| vec![members.len() as f64],
        );
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn test_constant_features_make_a_leaf() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = [0, 1, 1];
        let mut tree = DecisionTree::new(TreeParams::default(), 42);
        tree.fit(x.view(), &y, 2).unwrap();
        let proba = tree.predict_proba(x.view());
        assert!((proba[[0, 1]] - 2.0 / 3.0).abs() < 1e-12);
    }
}

// Gradient boosting - multinomial deviance with shallow regression trees
//
// Every stage fits one squared-error tree per class to the softmax residuals
// and replaces each leaf's mean by a single Newton step, as in Friedman's
// multiclass TreeBoost.
//
// References:
// - Friedman, J. (2001). Greedy Function Approximation: A Gradient Boosting
//   Machine

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::tree::{SquaredError, Tree, TreeParams};
use super::Estimator;
use crate::error::PipelineError;

/// Smallest class prior used for the initial log-odds
const MIN_PRIOR: f64 = 1e-12;

/// Row-wise softmax of raw scores
pub fn softmax_rows(scores: &Array2<f64>) -> Array2<f64> {
    let mut out = scores.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

#[derive(Debug, Clone)]
pub struct GradientBoosting {
    n_stages: usize,
    learning_rate: f64,
    max_depth: usize,
    seed: u64,
    n_classes: usize,
    init: Vec<f64>,
    stages: Vec<Vec<Tree>>,
}

impl GradientBoosting {
    pub fn new(n_stages: usize, learning_rate: f64, max_depth: usize, seed: u64) -> Self {
        Self {
            n_stages,
            learning_rate,
            max_depth: max_depth.max(1),
            seed,
            n_classes: 0,
            init: Vec::new(),
            stages: Vec::new(),
        }
    }

    fn raw_scores(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut scores = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for k in 0..self.n_classes {
                scores[[i, k]] = self.init[k] + self.stage_sum(row, k);
            }
        }
        scores
    }

    fn stage_sum(&self, row: ArrayView1<'_, f64>, class: usize) -> f64 {
        self.stages
            .iter()
            .map(|trees| self.learning_rate * trees[class].leaf(row)[0])
            .sum()
    }
}

impl Estimator for GradientBoosting {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> Result<(), PipelineError> {
        let n = x.nrows();
        if n == 0 {
            return Err(PipelineError::EmptyInput { operation: "fit gradient boosting" });
        }
        let k_classes = n_classes.max(1);
        let mut counts = vec![0.0; k_classes];
        for &label in y {
            counts[label] += 1.0;
        }
        self.n_classes = k_classes;
        self.init = counts
            .iter()
            .map(|c| (c / n as f64).max(MIN_PRIOR).ln())
            .collect();
        self.stages = Vec::with_capacity(self.n_stages);

        let params = TreeParams {
            max_depth: Some(self.max_depth),
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut scores = Array2::<f64>::zeros((n, k_classes));
        for i in 0..n {
            for k in 0..k_classes {
                scores[[i, k]] = self.init[k];
            }
        }
        let newton_scale = (k_classes as f64 - 1.0) / k_classes as f64;

        for _ in 0..self.n_stages {
            let probabilities = softmax_rows(&scores);
            let mut trees = Vec::with_capacity(k_classes);
            for k in 0..k_classes {
                let residuals: Vec<f64> = (0..n)
                    .map(|i| if y[i] == k { 1.0 } else { 0.0 } - probabilities[[i, k]])
                    .collect();
                let tree = Tree::grow(
                    x,
                    (0..n).collect(),
                    params,
                    &mut rng,
                    || SquaredError::new(&residuals),
                    |members| {
                        let numerator: f64 = members.iter().map(|&i| residuals[i]).sum();
                        let denominator: f64 = members
                            .iter()
                            .map(|&i| residuals[i].abs() * (1.0 - residuals[i].abs()))
                            .sum();
                        if denominator.abs() < 1e-150 {
                            vec![0.0]
                        } else {
                            vec![newton_scale * numerator / denominator]
                        }
                    },
                );
                for (i, row) in x.rows().into_iter().enumerate() {
                    scores[[i, k]] += self.learning_rate * tree.leaf(row)[0];
                }
                trees.push(tree);
            }
            self.stages.push(trees);
        }
        tracing::debug!(stages = self.stages.len(), "[Classifier] Fitted gradient boosting");
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        softmax_rows(&self.raw_scores(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let p = softmax_rows(&array![[1.0, 2.0, 3.0], [1000.0, 0.0, -1000.0]]);
        for row in p.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert!(p[[1, 0]] > 0.999);
    }

    #[test]
    fn test_boosting_learns_three_classes() {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.2],
            [0.2, 0.1],
            [3.0, 3.0],
            [3.1, 3.2],
            [3.2, 3.1],
            [6.0, 0.0],
            [6.1, 0.2],
            [6.2, 0.1]
        ];
        let y = [0, 0, 0, 1, 1, 1, 2, 2, 2];
        let mut model = GradientBoosting::new(30, 0.1, 3, 42);
        model.fit(x.view(), &y, 3).unwrap();
        assert_eq!(model.predict(x.view()), y.to_vec());
    }

    #[test]
    fn test_no_stages_predicts_prior() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = [0, 1, 1];
        let mut model = GradientBoosting::new(0, 0.1, 3, 42);
        model.fit(x.view(), &y, 2).unwrap();
        let p = model.predict_proba(x.view());
        assert!((p[[0, 1]] - 2.0 / 3.0).abs() < 1e-12);
    }
}

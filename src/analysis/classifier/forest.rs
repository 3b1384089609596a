// Random forest - bagged CART trees with per-split feature subsampling

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::tree::{DecisionTree, TreeParams};
use super::Estimator;
use crate::error::PipelineError;

/// Forest of bootstrapped Gini trees; probabilities are averaged
#[derive(Debug, Clone)]
pub struct RandomForest {
    n_trees: usize,
    seed: u64,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(n_trees: usize, seed: u64) -> Self {
        Self {
            n_trees: n_trees.max(1),
            seed,
            n_classes: 0,
            trees: Vec::new(),
        }
    }

    /// Features examined per split: `max(1, floor(sqrt(d)))`
    pub fn max_features(n_features: usize) -> usize {
        ((n_features as f64).sqrt().floor() as usize).max(1)
    }
}

impl Estimator for RandomForest {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> Result<(), PipelineError> {
        let n = x.nrows();
        if n == 0 {
            return Err(PipelineError::EmptyInput { operation: "fit random forest" });
        }
        let params = TreeParams {
            max_depth: None,
            max_features: Some(Self::max_features(x.ncols())),
        };
        let mut rng = StdRng::seed_from_u64(self.seed);

        self.n_classes = n_classes;
        self.trees = (0..self.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut tree = DecisionTree::new(params, self.seed);
                tree.fit_samples(x, y, n_classes, bootstrap, &mut rng);
                tree
            })
            .collect();
        tracing::debug!(trees = self.trees.len(), "[Classifier] Fitted random forest");
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut total = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for tree in &self.trees {
            total += &tree.predict_proba(x);
        }
        total / self.trees.len().max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_max_features() {
        assert_eq!(RandomForest::max_features(1), 1);
        assert_eq!(RandomForest::max_features(13), 3);
        assert_eq!(RandomForest::max_features(16), 4);
    }

    #[test]
    fn test_forest_separates_easy_classes_and_is_seeded() {
        let x = array![
            [0.0, 0.1],
            [0.2, 0.0],
            [0.1, 0.3],
            [0.3, 0.2],
            [5.0, 5.1],
            [5.2, 5.0],
            [5.1, 5.3],
            [5.3, 5.2]
        ];
        let y = [0, 0, 0, 0, 1, 1, 1, 1];
        let mut forest = RandomForest::new(20, 42);
        forest.fit(x.view(), &y, 2).unwrap();
        let probe = array![[0.15, 0.15], [5.15, 5.15]];
        assert_eq!(forest.predict(probe.view()), vec![0, 1]);

        let mut again = RandomForest::new(20, 42);
        again.fit(x.view(), &y, 2).unwrap();
        assert_eq!(forest.predict_proba(probe.view()), again.predict_proba(probe.view()));

        let rows: Vec<f64> = forest.predict_proba(x.view()).rows().into_iter().map(|r| r.sum()).collect();
        assert!(rows.iter().all(|s| (s - 1.0).abs() < 1e-9));
    }
}

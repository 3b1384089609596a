// Classifier - supervised evaluation of labeled tables
//
// A table's feature columns are split into stratified train/test partitions,
// one of the supported models is fitted on the training rows, and the test
// predictions are scored with accuracy, a per-class report and a confusion
// matrix. Every model is seeded from `ClassificationConfig.seed`, so the
// same table and parameters always produce the same result.

pub mod boosting;
pub mod forest;
pub mod metrics;
pub mod split;
pub mod svm;
pub mod tree;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2, Axis};
use serde::Serialize;

use crate::analysis::table::FeatureTable;
use crate::config::ClassificationConfig;
use crate::error::PipelineError;

pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use metrics::ClassificationReport;
pub use split::{stratified_split, TrainTestSplit};
pub use svm::LinearSvm;
pub use tree::{DecisionTree, TreeParams};

/// Digits shown in the rendered report
pub const REPORT_DIGITS: usize = 2;

/// A probabilistic multi-class model over dense class indices `0..n_classes`
pub trait Estimator {
    /// Fit on rows of `x` with class indices `y`
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> Result<(), PipelineError>;

    /// Class probabilities, one row per sample and one column per class
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64>;

    /// Most probable class per row (first index wins ties)
    fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<usize> {
        self.predict_proba(x)
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (k, &p) in row.iter().enumerate() {
                    if p > row[best] {
                        best = k;
                    }
                }
                best
            })
            .collect()
    }
}

/// Soft vote: mean class probabilities of the member models
pub struct Voting {
    members: Vec<Box<dyn Estimator + Send>>,
}

impl Voting {
    pub fn new(members: Vec<Box<dyn Estimator + Send>>) -> Self {
        Self { members }
    }
}

impl Estimator for Voting {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> Result<(), PipelineError> {
        for member in &mut self.members {
            member.fit(x, y, n_classes)?;
        }
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut probabilities = self.members.iter().map(|m| m.predict_proba(x));
        let Some(first) = probabilities.next() else {
            return Array2::zeros((x.nrows(), 0));
        };
        let summed = probabilities.fold(first, |acc, p| acc + p);
        summed / self.members.len() as f64
    }
}

/// Supported supervised models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    RandomForest,
    DecisionTree,
    GradientBoosting,
    LinearSvm,
    Voting,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "Random Forest",
            ModelKind::DecisionTree => "Decision Tree",
            ModelKind::GradientBoosting => "Gradient Boosting",
            ModelKind::LinearSvm => "Linear SVM",
            ModelKind::Voting => "Voting Classifier",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "randomforest" => Ok(ModelKind::RandomForest),
            "decisiontree" => Ok(ModelKind::DecisionTree),
            "gradientboosting" => Ok(ModelKind::GradientBoosting),
            "linearsvm" => Ok(ModelKind::LinearSvm),
            "votingclassifier" | "voting" => Ok(ModelKind::Voting),
            _ => Err(PipelineError::UnsupportedOption {
                option: "model",
                value: s.to_string(),
                expected: "Random Forest, Decision Tree, Gradient Boosting, Linear SVM, Voting Classifier",
            }),
        }
    }
}

/// Test-set evaluation of one fitted model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub accuracy: f64,
    pub report: ClassificationReport,
    /// Rows are true labels, columns predicted, both ordered as `labels`
    pub confusion_matrix: Vec<Vec<u64>>,
    /// Ascending union of true and predicted test labels
    pub labels: Vec<i64>,
}

/// Classifier fits and evaluates supervised models on labeled tables
pub struct Classifier {
    config: ClassificationConfig,
}

impl Classifier {
    pub fn new(config: &ClassificationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Build an unfitted estimator for `kind`
    pub fn estimator(&self, kind: ModelKind) -> Box<dyn Estimator + Send> {
        let seed = self.config.seed;
        match kind {
            ModelKind::RandomForest => Box::new(RandomForest::new(self.config.forest_trees, seed)),
            ModelKind::DecisionTree => Box::new(DecisionTree::new(TreeParams::default(), seed)),
            ModelKind::GradientBoosting => Box::new(GradientBoosting::new(
                self.config.boosting_stages,
                self.config.boosting_learning_rate,
                self.config.boosting_max_depth,
                seed,
            )),
            ModelKind::LinearSvm => Box::new(LinearSvm::new(
                self.config.svm_c,
                self.config.svm_max_iterations,
                seed,
            )),
            ModelKind::Voting => Box::new(Voting::new(vec![
                self.estimator(ModelKind::RandomForest),
                self.estimator(ModelKind::DecisionTree),
                self.estimator(ModelKind::LinearSvm),
            ])),
        }
    }

    /// Train on a stratified split of `table` and score the held-out rows
    ///
    /// # Arguments
    /// * `table` - Table with a `label` column and at least one feature column
    /// * `model` - Model to fit
    /// * `split_pct` - Training percentage, 1..=99
    ///
    /// # Returns
    /// Accuracy, report and confusion matrix over the test rows
    pub fn classify(
        &self,
        table: &FeatureTable,
        model: ModelKind,
        split_pct: i64,
    ) -> Result<ClassificationResult, PipelineError> {
        if table.is_empty() {
            return Err(PipelineError::EmptyInput { operation: "classify" });
        }
        let labels = table.labels().ok_or(PipelineError::MissingLabel)?;
        if table.feature_names().is_empty() {
            return Err(PipelineError::NoFeatureColumns { operation: "classification" });
        }
        if !(1..=99).contains(&split_pct) {
            return Err(PipelineError::invalid(
                "split_pct",
                format!("must be between 1 and 99, got {split_pct}"),
            ));
        }
        let classes: Vec<i64> = labels.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if classes.len() < 2 {
            return Err(PipelineError::InsufficientClasses { found: classes.len() });
        }
        let x = table.features();
        if x.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::invalid("features", "contains NaN or infinite values"));
        }

        // Dense class indices in ascending label order
        let encoded: Vec<usize> = labels
            .iter()
            .map(|label| classes.partition_point(|c| c < label))
            .collect();
        let split = stratified_split(&encoded, classes.len(), split_pct as usize, self.config.seed)?;

        let x_train = x.select(Axis(0), &split.train);
        let x_test = x.select(Axis(0), &split.test);
        let y_train: Vec<usize> = split.train.iter().map(|&i| encoded[i]).collect();

        let mut estimator = self.estimator(model);
        estimator.fit(x_train.view(), &y_train, classes.len())?;
        let predicted: Vec<i64> = estimator
            .predict(x_test.view())
            .into_iter()
            .map(|k| classes[k])
            .collect();
        let truth: Vec<i64> = split.test.iter().map(|&i| labels[i]).collect();

        let observed = metrics::label_union(&truth, &predicted);
        let confusion_matrix = metrics::confusion_matrix(&truth, &predicted, &observed);
        let report = ClassificationReport::from_confusion(&observed, &confusion_matrix);
        let accuracy = metrics::accuracy(&truth, &predicted);

        tracing::info!(
            model = %model,
            train_rows = split.train.len(),
            test_rows = split.test.len(),
            accuracy,
            "[Classifier] Evaluated model"
        );

        Ok(ClassificationResult {
            accuracy,
            report,
            confusion_matrix,
            labels: observed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Two well separated groups in the x/y plane
    fn labeled(n_per_class: usize) -> FeatureTable {
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for class in 0..2 {
            for i in 0..n_per_class {
                let offset = class as f64 * 10.0;
                values.push(offset + i as f64 * 0.1);
                values.push(offset - i as f64 * 0.05);
                labels.push(class as i64);
            }
        }
        FeatureTable::new(
            vec!["x".into(), "y".into()],
            Array2::from_shape_vec((2 * n_per_class, 2), values).unwrap(),
        )
        .unwrap()
        .with_labels(labels)
        .unwrap()
    }

    #[test]
    fn test_model_names() {
        assert_eq!("Random Forest".parse::<ModelKind>().unwrap(), ModelKind::RandomForest);
        assert_eq!("Decision Tree".parse::<ModelKind>().unwrap(), ModelKind::DecisionTree);
        assert_eq!("Gradient Boosting".parse::<ModelKind>().unwrap(), ModelKind::GradientBoosting);
        assert_eq!("Linear SVM".parse::<ModelKind>().unwrap(), ModelKind::LinearSvm);
        assert_eq!("Voting Classifier".parse::<ModelKind>().unwrap(), ModelKind::Voting);
        assert!(matches!(
            "Naive Bayes".parse::<ModelKind>(),
            Err(PipelineError::UnsupportedOption { .. })
        ));
    }

    #[test]
    fn test_every_model_scores_separable_data() {
        let classifier = Classifier::new(&ClassificationConfig::default());
        let table = labeled(10);
        for model in [
            ModelKind::RandomForest,
            ModelKind::DecisionTree,
            ModelKind::GradientBoosting,
            ModelKind::LinearSvm,
            ModelKind::Voting,
        ] {
            let result = classifier.classify(&table, model, 70).unwrap();
            let total: u64 = result.confusion_matrix.iter().flatten().sum();
            assert_eq!(total, 6, "{model}");
            assert_eq!(result.accuracy, 1.0, "{model}");
            assert_eq!(result.labels, vec![0, 1]);
        }
    }

    #[test]
    fn test_results_are_reproducible() {
        let classifier = Classifier::new(&ClassificationConfig::default());
        let table = labeled(8);
        let a = classifier.classify(&table, ModelKind::RandomForest, 60).unwrap();
        let b = classifier.classify(&table, ModelKind::RandomForest, 60).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_validation_order() {
        let classifier = Classifier::new(&ClassificationConfig::default());
        let unlabeled = labeled(5).without_labels();
        assert!(matches!(
            classifier.classify(&unlabeled, ModelKind::DecisionTree, 70),
            Err(PipelineError::MissingLabel)
        ));

        let table = labeled(5);
        for pct in [0, 100, -5] {
            assert!(matches!(
                classifier.classify(&table, ModelKind::DecisionTree, pct),
                Err(PipelineError::InvalidParameter { .. })
            ));
        }

        let one_class = labeled(5).with_labels(vec![3; 10]).unwrap();
        assert!(matches!(
            classifier.classify(&one_class, ModelKind::DecisionTree, 70),
            Err(PipelineError::InsufficientClasses { found: 1 })
        ));
    }

    #[test]
    fn test_labels_keep_their_ids() {
        let classifier = Classifier::new(&ClassificationConfig::default());
        let table = labeled(6)
            .with_labels([vec![-1; 6], vec![7; 6]].concat())
            .unwrap();
        let result = classifier.classify(&table, ModelKind::DecisionTree, 50).unwrap();
        assert_eq!(result.labels, vec![-1, 7]);
        assert_eq!(result.report.classes[1].label, 7);
    }
}

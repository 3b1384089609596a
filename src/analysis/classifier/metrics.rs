// Classification metrics - confusion matrix and per-class report

use serde::Serialize;

/// Sorted union of the labels seen in truth and predictions
pub fn label_union(truth: &[i64], predicted: &[i64]) -> Vec<i64> {
    let mut labels: Vec<i64> = truth.iter().chain(predicted).copied().collect();
    labels.sort_unstable();
    labels.dedup();
    labels
}

/// Confusion matrix; rows are true labels, columns predicted, both in
/// `labels` order
pub fn confusion_matrix(truth: &[i64], predicted: &[i64], labels: &[i64]) -> Vec<Vec<u64>> {
    let mut matrix = vec![vec![0u64; labels.len()]; labels.len()];
    for (t, p) in truth.iter().zip(predicted) {
        if let (Ok(row), Ok(col)) = (labels.binary_search(t), labels.binary_search(p)) {
            matrix[row][col] += 1;
        }
    }
    matrix
}

/// Fraction of matching positions; 0 for empty input
pub fn accuracy(truth: &[i64], predicted: &[i64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let hits = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    hits as f64 / truth.len() as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub label: i64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Averages {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Per-class precision/recall/F1 with macro and weighted averages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassReport>,
    pub accuracy: f64,
    pub macro_avg: Averages,
    pub weighted_avg: Averages,
    pub total_support: u64,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl ClassificationReport {
    /// Build from a confusion matrix over `labels`; undefined ratios are 0
    pub fn from_confusion(labels: &[i64], matrix: &[Vec<u64>]) -> Self {
        let k = labels.len();
        let classes: Vec<ClassReport> = (0..k)
            .map(|c| {
                let tp = matrix[c][c];
                let support: u64 = matrix[c].iter().sum();
                let predicted: u64 = (0..k).map(|r| matrix[r][c]).sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassReport {
                    label: labels[c],
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let total_support: u64 = classes.iter().map(|c| c.support).sum();
        let correct: u64 = (0..k).map(|c| matrix[c][c]).sum();
        let count = k.max(1) as f64;
        let macro_avg = Averages {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / count,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / count,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / count,
        };
        let weight = |value: fn(&ClassReport) -> f64| {
            if total_support == 0 {
                0.0
            } else {
                classes.iter().map(|c| value(c) * c.support as f64).sum::<f64>() / total_support as f64
            }
        };
        let weighted_avg = Averages {
            precision: weight(|c| c.precision),
            recall: weight(|c| c.recall),
            f1: weight(|c| c.f1),
        };

        Self {
            accuracy: ratio(correct, total_support),
            classes,
            macro_avg,
            weighted_avg,
            total_support,
        }
    }

    /// Fixed-width text table in the familiar scikit-learn layout
    pub fn render(&self, digits: usize) -> String {
        const WEIGHTED: &str = "weighted avg";
        let names: Vec<String> = self.classes.iter().map(|c| c.label.to_string()).collect();
        let width = names
            .iter()
            .map(String::len)
            .chain([WEIGHTED.len(), digits])
            .max()
            .unwrap_or(WEIGHTED.len());

        let mut out = format!("{:>width$} ", "");
        for header in ["precision", "recall", "f1-score", "support"] {
            out.push_str(&format!(" {header:>9}"));
        }
        out.push_str("\n\n");

        for (name, class) in names.iter().zip(&self.classes) {
            out.push_str(&format!(
                "{name:>width$}  {:>9.digits$} {:>9.digits$} {:>9.digits$} {:>9}\n",
                class.precision, class.recall, class.f1, class.support
            ));
        }
        out.push('\n');

        out.push_str(&format!(
            "{:>width$}  {:>9} {:>9} {:>9.digits$} {:>9}\n",
            "accuracy", "", "", self.accuracy, self.total_support
        ));
        for (name, avg) in [("macro avg", &self.macro_avg), (WEIGHTED, &self.weighted_avg)] {
            out.push_str(&format!(
                "{name:>width$}  {:>9.digits$} {:>9.digits$} {:>9.digits$} {:>9}\n",
                avg.precision, avg.recall, avg.f1, self.total_support
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_over_label_union() {
        let truth = [0, 0, 1, 1];
        let predicted = [0, 2, 1, 1];
        let labels = label_union(&truth, &predicted);
        assert_eq!(labels, vec![0, 1, 2]);
        let cm = confusion_matrix(&truth, &predicted, &labels);
        assert_eq!(cm, vec![vec![1, 0, 1], vec![0, 2, 0], vec![0, 0, 0]]);
        assert_eq!(cm.iter().flatten().sum::<u64>(), 4);
    }

    #[test]
    fn test_report_values_and_zero_division() {
        let truth = [0, 0, 1, 1];
        let predicted = [0, 2, 1, 1];
        let labels = label_union(&truth, &predicted);
        let report = ClassificationReport::from_confusion(&labels, &confusion_matrix(&truth, &predicted, &labels));
        assert_eq!(report.total_support, 4);
        assert!((report.accuracy - 0.75).abs() < 1e-12);
        assert!((report.classes[0].recall - 0.5).abs() < 1e-12);
        assert_eq!(report.classes[0].precision, 1.0);
        assert_eq!(report.classes[2].precision, 0.0);
        assert_eq!(report.classes[2].f1, 0.0);
        assert_eq!(report.classes[2].support, 0);
    }

    #[test]
    fn test_render_layout() {
        let labels = [0, 1];
        let report = ClassificationReport::from_confusion(&labels, &[vec![2, 0], vec![0, 1]]);
        let text = report.render(2);
        let lines: Vec<&str> = text.lines().collect();
        let pad = |n: usize| " ".repeat(n);
        assert_eq!(lines[0], format!("{}precision    recall  f1-score   support", pad(14)));
        assert_eq!(lines[1], "");
        assert_eq!(
            lines[2],
            format!("{}0{}1.00{}1.00{}1.00{}2", pad(11), pad(7), pad(6), pad(6), pad(9))
        );
        assert_eq!(lines[5], format!("    accuracy{}1.00{}3", pad(27), pad(9)));
        assert!(lines[6].starts_with("   macro avg"));
        assert!(lines[7].starts_with("weighted avg"));
    }

    #[test]
    fn test_accuracy_empty_is_zero() {
        assert_eq!(accuracy(&[], &[]), 0.0);
    }
}

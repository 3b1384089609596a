// Linear SVM - L1-loss dual coordinate descent with one-vs-rest for K > 2
//
// Inputs are standardized with the training mean/std before fitting; the
// bias is learned as the weight of a constant augmented feature. Decision
// values become probabilities through a logistic squash, normalized across
// the one-vs-rest machines.
//
// References:
// - Hsieh, C.-J. et al. (2008). A Dual Coordinate Descent Method for
//   Large-scale Linear SVM

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::Estimator;
use crate::error::PipelineError;

/// Projected-gradient spread below which a pass counts as converged
const TOLERANCE: f64 = 1e-3;

/// One binary machine: weights over standardized features plus bias
#[derive(Debug, Clone)]
struct BinaryMachine {
    weights: Array1<f64>,
    bias: f64,
}

impl BinaryMachine {
    fn decision(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.weights.dot(&row) + self.bias
    }
}

#[derive(Debug, Clone)]
pub struct LinearSvm {
    c: f64,
    max_iterations: usize,
    seed: u64,
    n_classes: usize,
    mean: Array1<f64>,
    scale: Array1<f64>,
    machines: Vec<BinaryMachine>,
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

impl LinearSvm {
    pub fn new(c: f64, max_iterations: usize, seed: u64) -> Self {
        Self {
            c: if c > 0.0 { c } else { 1.0 },
            max_iterations: max_iterations.max(1),
            seed,
            n_classes: 0,
            mean: Array1::zeros(0),
            scale: Array1::zeros(0),
            machines: Vec::new(),
        }
    }

    fn standardize(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        (&x - &self.mean) / &self.scale
    }

    /// Solve the dual for targets in {-1, +1}
    fn solve(&self, x: &Array2<f64>, signs: &[f64], rng: &mut StdRng) -> BinaryMachine {
        let (n, d) = x.dim();
        let mut alpha = vec![0.0; n];
        let mut w = Array1::<f64>::zeros(d);
        let mut b = 0.0;
        // Diagonal of Q, with the augmented bias feature contributing 1
        let q_diag: Vec<f64> = x.rows().into_iter().map(|r| r.dot(&r) + 1.0).collect();
        let mut order: Vec<usize> = (0..n).collect();

        for _ in 0..self.max_iterations {
            order.shuffle(rng);
            let mut pg_max = f64::NEG_INFINITY;
            let mut pg_min = f64::INFINITY;

            for &i in &order {
                let row = x.row(i);
                let gradient = signs[i] * (w.dot(&row) + b) - 1.0;
                let projected = if alpha[i] <= 0.0 {
                    gradient.min(0.0)
                } else if alpha[i] >= self.c {
                    gradient.max(0.0)
                } else {
                    gradient
                };
                pg_max = pg_max.max(projected);
                pg_min = pg_min.min(projected);

                if projected.abs() > 1e-12 {
                    let previous = alpha[i];
                    alpha[i] = (previous - gradient / q_diag[i]).clamp(0.0, self.c);
                    let step = (alpha[i] - previous) * signs[i];
                    w.scaled_add(step, &row);
                    b += step;
                }
            }

            if pg_max - pg_min < TOLERANCE {
                break;
            }
        }
        BinaryMachine { weights: w, bias: b }
    }
}

impl Estimator for LinearSvm {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> Result<(), PipelineError> {
        if x.nrows() == 0 {
            return Err(PipelineError::EmptyInput { operation: "fit linear SVM" });
        }
        self.mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| PipelineError::computation("Linear SVM", "cannot average empty input"))?;
        self.scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 0.0 { s } else { 1.0 });
        self.n_classes = n_classes;

        let standardized = self.standardize(x);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let positives: Vec<usize> = if n_classes == 2 { vec![1] } else { (0..n_classes).collect() };

        self.machines = positives
            .into_iter()
            .map(|class| {
                let signs: Vec<f64> = y.iter().map(|&l| if l == class { 1.0 } else { -1.0 }).collect();
                self.solve(&standardized, &signs, &mut rng)
            })
            .collect();
        tracing::debug!(machines = self.machines.len(), "[Classifier] Fitted linear SVM");
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let standardized = self.standardize(x);
        let mut out = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (i, row) in standardized.rows().into_iter().enumerate() {
            if self.n_classes == 2 {
                let p = sigmoid(self.machines[0].decision(row));
                out[[i, 0]] = 1.0 - p;
                out[[i, 1]] = p;
                continue;
            }
            for (k, machine) in self.machines.iter().enumerate() {
                out[[i, k]] = sigmoid(machine.decision(row));
            }
            let total = out.row(i).sum();
            if total > 0.0 {
                out.row_mut(i).mapv_inplace(|p| p / total);
            }
        }
        out
    }
}

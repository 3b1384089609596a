// t-SNE - exact t-distributed stochastic neighbour embedding
//
// Input affinities are Gaussian conditionals calibrated to a target
// perplexity by binary search on the precision of each point, then
// symmetrised. The embedding is optimised with the exact O(n²) gradient,
// early exaggeration, momentum and per-parameter gains.
//
// References:
// - van der Maaten, L. & Hinton, G. (2008). Visualizing Data using t-SNE

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::pca::Pca;
use super::Reducer;
use crate::analysis::distance::pairwise_squared;
use crate::error::PipelineError;

const EARLY_EXAGGERATION: f64 = 12.0;
const EXAGGERATION_ITERATIONS: usize = 250;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MIN_GAIN: f64 = 0.01;
const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
const INIT_SCALE: f64 = 1e-4;

/// Perplexity used for `n_samples` points
pub fn perplexity_for(n_samples: usize) -> f64 {
    (n_samples.saturating_sub(1) as f64).clamp(5.0, 30.0)
}

/// Exact t-SNE with PCA initialisation
#[derive(Debug, Clone)]
pub struct Tsne {
    pub seed: u64,
    pub iterations: usize,
}

impl Tsne {
    pub fn new(seed: u64, iterations: usize) -> Self {
        Self { seed, iterations }
    }

    /// Symmetric joint probabilities P for the given perplexity
    fn joint_probabilities(distances: &Array2<f64>, perplexity: f64) -> Array2<f64> {
        let n = distances.nrows();
        let target_entropy = perplexity.ln();
        let mut conditional = Array2::<f64>::zeros((n, n));

        for i in 0..n {
            let mut beta = 1.0;
            let mut beta_min = f64::NEG_INFINITY;
            let mut beta_max = f64::INFINITY;
            let mut row = vec![0.0; n];

            for _ in 0..PERPLEXITY_STEPS {
                let mut sum = 0.0;
                for j in 0..n {
                    row[j] = if j == i {
                        0.0
                    } else {
                        (-distances[[i, j]] * beta).exp()
                    };
                    sum += row[j];
                }
                if sum <= 0.0 {
                    sum = f64::EPSILON;
                }
                let mut weighted = 0.0;
                for j in 0..n {
                    row[j] /= sum;
                    weighted += distances[[i, j]] * row[j];
                }
                let entropy = sum.ln() + beta * weighted;
                let diff = entropy - target_entropy;
                if diff.abs() <= PERPLEXITY_TOLERANCE {
                    break;
                }
                if diff > 0.0 {
                    beta_min = beta;
                    beta = if beta_max.is_infinite() {
                        beta * 2.0
                    } else {
                        (beta + beta_max) / 2.0
                    };
                } else {
                    beta_max = beta;
                    beta = if beta_min.is_infinite() {
                        beta / 2.0
                    } else {
                        (beta + beta_min) / 2.0
                    };
                }
            }
            for j in 0..n {
                conditional[[i, j]] = row[j];
            }
        }

        let joint = (&conditional + &conditional.t()) / (2.0 * n as f64);
        joint.mapv(|p| p.max(1e-12))
    }

    /// PCA start scaled to a tiny spread, or seeded noise when PCA is undefined
    fn initial_embedding(
        &self,
        data: ArrayView2<'_, f64>,
        n_components: usize,
        rng: &mut StdRng,
    ) -> Array2<f64> {
        if let Ok(pca) = Pca.fit_transform(data, n_components) {
            let first = pca.column(0);
            let std = first.std(0.0);
            if std > 0.0 && std.is_finite() {
                return pca.mapv(|v| v / std * INIT_SCALE);
            }
        }
        Array2::from_shape_fn((data.nrows(), n_components), |_| {
            rng.gen_range(-INIT_SCALE..INIT_SCALE)
        })
    }
}

impl Reducer for Tsne {
    fn fit_transform(
        &self,
        data: ArrayView2<'_, f64>,
        n_components: usize,
    ) -> Result<Array2<f64>, PipelineError> {
        let n = data.nrows();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let perplexity = perplexity_for(n);
        let p = Self::joint_probabilities(&pairwise_squared(data), perplexity);
        let learning_rate = (n as f64 / EARLY_EXAGGERATION / 4.0).max(50.0);

        let mut y = self.initial_embedding(data, n_components, &mut rng);
        let mut update = Array2::<f64>::zeros((n, n_components));
        let mut gains = Array2::<f64>::ones((n, n_components));
        let mut num = Array2::<f64>::zeros((n, n));
        let mut grad = Array2::<f64>::zeros((n, n_components));

        tracing::debug!(
            n_samples = n,
            perplexity,
            learning_rate,
            "[Reducer] Running t-SNE"
        );

        for iteration in 0..self.iterations {
            let (exaggeration, momentum) = if iteration < EXAGGERATION_ITERATIONS {
                (EARLY_EXAGGERATION, INITIAL_MOMENTUM)
            } else {
                (1.0, FINAL_MOMENTUM)
            };

            let mut z = 0.0;
            for i in 0..n {
                for j in (i + 1)..n {
                    let d: f64 = (0..n_components)
                        .map(|c| (y[[i, c]] - y[[j, c]]).powi(2))
                        .sum();
                    let q = 1.0 / (1.0 + d);
                    num[[i, j]] = q;
                    num[[j, i]] = q;
                    z += 2.0 * q;
                }
            }
            let z = z.max(f64::MIN_POSITIVE);

            grad.fill(0.0);
            for i in 0..n {
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let coeff = 4.0 * (exaggeration * p[[i, j]] - num[[i, j]] / z) * num[[i, j]];
                    for c in 0..n_components {
                        grad[[i, c]] += coeff * (y[[i, c]] - y[[j, c]]);
                    }
                }
            }

            for ((g, u), gain) in grad.iter().zip(update.iter_mut()).zip(gains.iter_mut()) {
                *gain = if *g * *u < 0.0 {
                    *gain + 0.2
                } else {
                    (*gain * 0.8).max(MIN_GAIN)
                };
                *u = momentum * *u - learning_rate * *gain * g;
            }
            y += &update;
        }

        if y.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::computation("t-SNE", "embedding diverged"));
        }
        Ok(y)
    }
}

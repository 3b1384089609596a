// PCA - exact principal component analysis
//
// The covariance matrix of the centred data is diagonalised with the cyclic
// Jacobi method, which is exact for the small symmetric matrices produced by
// per-segment feature vectors. Component signs are fixed so that the largest
// absolute loading of each component is positive, making results
// reproducible across runs and platforms.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::Reducer;
use crate::error::PipelineError;

const MAX_SWEEPS: usize = 100;
const OFF_DIAGONAL_TOLERANCE: f64 = 1e-12;

/// Principal component projection
#[derive(Debug, Clone, Copy, Default)]
pub struct Pca;

/// Eigen-decomposition of a symmetric matrix
///
/// # Returns
/// `(eigenvalues, eigenvectors)` sorted by descending eigenvalue, with
/// eigenvectors stored as columns.
pub fn symmetric_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);

    for _ in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[[p, q]].powi(2))
            .sum();
        if off < OFF_DIAGONAL_TOLERANCE {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));
    let values = order.iter().map(|&i| a[[i, i]]).collect();
    let vectors = v.select(Axis(1), &order);
    (values, vectors)
}

impl Pca {
    /// Top `n_components` principal axes as columns, sign-normalized
    pub fn components(
        &self,
        centered: &Array2<f64>,
        n_components: usize,
    ) -> Array2<f64> {
        let n = centered.nrows();
        let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };
        let covariance = centered.t().dot(centered) / denom;
        let (_, vectors) = symmetric_eigen(&covariance);
        let mut components = vectors.slice(ndarray::s![.., ..n_components]).to_owned();

        for mut column in components.columns_mut() {
            let pivot = column
                .iter()
                .copied()
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(0.0);
            if pivot < 0.0 {
                column.mapv_inplace(|x| -x);
            }
        }
        components
    }
}

impl Reducer for Pca {
    fn fit_transform(
        &self,
        data: ArrayView2<'_, f64>,
        n_components: usize,
    ) -> Result<Array2<f64>, PipelineError> {
        if data.ncols() < n_components {
            return Err(PipelineError::invalid(
                "n_components",
                format!(
                    "PCA needs at least {} feature columns, got {}",
                    n_components,
                    data.ncols()
                ),
            ));
        }
        let mean: Array1<f64> = data
            .mean_axis(Axis(0))
            .ok_or(PipelineError::EmptyInput { operation: "reduce" })?;
        let centered = &data - &mean;
        let components = self.components(&centered, n_components);
        Ok(centered.dot(&components))
    }
}

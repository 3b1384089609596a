// Distance helpers shared by the embedding and clustering stages

use ndarray::{Array2, ArrayView1, ArrayView2};

/// Squared Euclidean distance between two rows
pub fn squared_euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Symmetric n×n matrix of squared Euclidean distances between rows
pub fn pairwise_squared(data: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = data.nrows();
    let mut out = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = squared_euclidean(data.row(i), data.row(j));
            out[[i, j]] = d;
            out[[j, i]] = d;
        }
    }
    out
}

/// Symmetric n×n matrix of Euclidean distances between rows
pub fn pairwise_euclidean(data: ArrayView2<'_, f64>) -> Array2<f64> {
    pairwise_squared(data).mapv(f64::sqrt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pairwise_is_symmetric_with_zero_diagonal() {
        let data = array![[0.0, 0.0], [3.0, 4.0], [6.0, 8.0]];
        let d = pairwise_euclidean(data.view());
        assert_eq!(d[[0, 1]], 5.0);
        assert_eq!(d[[2, 0]], 10.0);
        assert_eq!(d[[1, 1]], 0.0);
        assert_eq!(d[[1, 2]], d[[2, 1]]);
    }
}

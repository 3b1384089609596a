// UMAP - uniform manifold approximation and projection
//
// Builds a fuzzy k-nearest-neighbour graph (per-point local connectivity ρ
// and bandwidth σ found by binary search), symmetrises it with the
// probabilistic t-conorm, then lays the graph out with stochastic gradient
// descent using attractive edge samples and negative sampling.
//
// References:
// - McInnes, L., Healy, J. & Melville, J. (2018). UMAP: Uniform Manifold
//   Approximation and Projection for Dimension Reduction

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::pca::Pca;
use super::Reducer;
use crate::analysis::distance::pairwise_euclidean;
use crate::error::PipelineError;

/// Curve parameters fitted for `min_dist = 0.1`, `spread = 1.0`
const CURVE_A: f64 = 1.577;
const CURVE_B: f64 = 0.8951;
const NEGATIVE_SAMPLE_RATE: usize = 5;
const SIGMA_STEPS: usize = 64;
const SIGMA_TOLERANCE: f64 = 1e-5;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_EXTENT: f64 = 10.0;

/// UMAP with PCA initialisation
#[derive(Debug, Clone)]
pub struct Umap {
    pub seed: u64,
    pub n_neighbors: usize,
    pub n_epochs: usize,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    head: usize,
    tail: usize,
    weight: f64,
}

fn clip(value: f64) -> f64 {
    value.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

impl Umap {
    pub fn new(seed: u64, n_neighbors: usize, n_epochs: usize) -> Self {
        Self {
            seed,
            n_neighbors,
            n_epochs,
        }
    }

    /// Effective neighbourhood size for `n_samples` points
    pub fn neighbors_for(&self, n_samples: usize) -> usize {
        self.n_neighbors.min(n_samples.saturating_sub(1)).max(1)
    }

    /// Fuzzy simplicial set as an undirected weighted edge list
    fn fuzzy_graph(&self, data: ArrayView2<'_, f64>) -> Vec<Edge> {
        let n = data.nrows();
        let k = self.neighbors_for(n);
        let distances = pairwise_euclidean(data);
        let target = (k as f64).log2();
        let mean_distance = if n > 1 {
            distances.sum() / (n * (n - 1)) as f64
        } else {
            0.0
        };

        let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for i in 0..n {
            let mut neighbors: Vec<usize> = (0..n).filter(|&j| j != i).collect();
            neighbors.sort_by(|&a, &b| distances[[i, a]].total_cmp(&distances[[i, b]]).then(a.cmp(&b)));
            neighbors.truncate(k);

            let rho = neighbors
                .iter()
                .map(|&j| distances[[i, j]])
                .find(|&d| d > 0.0)
                .unwrap_or(0.0);

            let (mut lo, mut hi, mut sigma) = (0.0, f64::INFINITY, 1.0);
            for _ in 0..SIGMA_STEPS {
                let total: f64 = neighbors
                    .iter()
                    .map(|&j| (-(distances[[i, j]] - rho).max(0.0) / sigma).exp())
                    .sum();
                if (total - target).abs() < SIGMA_TOLERANCE {
                    break;
                }
                if total > target {
                    hi = sigma;
                    sigma = (lo + hi) / 2.0;
                } else {
                    lo = sigma;
                    sigma = if hi.is_infinite() { sigma * 2.0 } else { (lo + hi) / 2.0 };
                }
            }
            sigma = sigma.max(1e-3 * mean_distance).max(f64::MIN_POSITIVE);

            for &j in &neighbors {
                let weight = (-(distances[[i, j]] - rho).max(0.0) / sigma).exp();
                directed.insert((i, j), weight);
            }
        }

        let mut edges = Vec::new();
        for (&(i, j), &w_ij) in &directed {
            let w_ji = directed.get(&(j, i)).copied().unwrap_or(0.0);
            if i < j || w_ji == 0.0 {
                let (head, tail) = if i < j { (i, j) } else { (j, i) };
                let weight = w_ij + w_ji - w_ij * w_ji;
                edges.push(Edge { head, tail, weight });
            }
        }
        edges
    }

    /// PCA start scaled into `[-10, 10]`, or seeded noise when PCA is undefined
    fn initial_embedding(
        &self,
        data: ArrayView2<'_, f64>,
        n_components: usize,
        rng: &mut StdRng,
    ) -> Array2<f64> {
        if let Ok(pca) = Pca.fit_transform(data, n_components) {
            let extent = pca.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            if extent > 0.0 && extent.is_finite() {
                return pca.mapv(|v| v / extent * INIT_EXTENT);
            }
        }
        Array2::from_shape_fn((data.nrows(), n_components), |_| {
            rng.gen_range(-INIT_EXTENT..INIT_EXTENT)
        })
    }
}

impl Reducer for Umap {
    fn fit_transform(
        &self,
        data: ArrayView2<'_, f64>,
        n_components: usize,
    ) -> Result<Array2<f64>, PipelineError> {
        let n = data.nrows();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut embedding = self.initial_embedding(data, n_components, &mut rng);
        if n < 2 || self.n_epochs == 0 {
            return Ok(embedding);
        }

        let mut edges = self.fuzzy_graph(data);
        let max_weight = edges.iter().map(|e| e.weight).fold(0.0, f64::max);
        if max_weight <= 0.0 {
            return Ok(embedding);
        }
        let floor = max_weight / self.n_epochs as f64;
        edges.retain(|e| e.weight >= floor);

        tracing::debug!(
            n_samples = n,
            n_neighbors = self.neighbors_for(n),
            edges = edges.len(),
            "[Reducer] Running UMAP"
        );

        let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_weight / e.weight).collect();
        let epochs_per_negative: Vec<f64> = epochs_per_sample
            .iter()
            .map(|e| e / NEGATIVE_SAMPLE_RATE as f64)
            .collect();
        let mut next_sample = epochs_per_sample.clone();
        let mut next_negative = epochs_per_negative.clone();
        let mut current = vec![0.0; n_components];
        let mut other = vec![0.0; n_components];

        for epoch in 0..self.n_epochs {
            let alpha = 1.0 - epoch as f64 / self.n_epochs as f64;
            let now = epoch as f64;

            for (e, edge) in edges.iter().enumerate() {
                if next_sample[e] > now {
                    continue;
                }

                for c in 0..n_components {
                    current[c] = embedding[[edge.head, c]];
                    other[c] = embedding[[edge.tail, c]];
                }
                let dist_sq: f64 = current.iter().zip(&other).map(|(a, b)| (a - b).powi(2)).sum();
                let attract = if dist_sq > 0.0 {
                    -2.0 * CURVE_A * CURVE_B * dist_sq.powf(CURVE_B - 1.0)
                        / (CURVE_A * dist_sq.powf(CURVE_B) + 1.0)
                } else {
                    0.0
                };
                for c in 0..n_components {
                    let grad = clip(attract * (current[c] - other[c])) * alpha;
                    embedding[[edge.head, c]] += grad;
                    embedding[[edge.tail, c]] -= grad;
                }
                next_sample[e] += epochs_per_sample[e];

                let n_negative = ((now - next_negative[e]) / epochs_per_negative[e]).max(0.0) as usize;
                for _ in 0..n_negative {
                    let k = rng.gen_range(0..n);
                    if k == edge.head {
                        continue;
                    }
                    for c in 0..n_components {
                        current[c] = embedding[[edge.head, c]];
                        other[c] = embedding[[k, c]];
                    }
                    let dist_sq: f64 =
                        current.iter().zip(&other).map(|(a, b)| (a - b).powi(2)).sum();
                    let repel = if dist_sq > 0.0 {
                        2.0 * CURVE_B / ((0.001 + dist_sq) * (CURVE_A * dist_sq.powf(CURVE_B) + 1.0))
                    } else {
                        0.0
                    };
                    for c in 0..n_components {
                        let grad = if repel > 0.0 {
                            clip(repel * (current[c] - other[c]))
                        } else {
                            GRADIENT_CLIP
                        };
                        embedding[[edge.head, c]] += grad * alpha;
                    }
                }
                next_negative[e] += n_negative as f64 * epochs_per_negative[e];
            }
        }

        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::computation("UMAP", "embedding diverged"));
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Array2<f64> {
        Array2::from_shape_fn((30, 4), |(i, j)| {
            let offset = if i < 15 { 0.0 } else { 50.0 };
            offset + ((i * 13 + j * 7) % 11) as f64 * 0.1
        })
    }

    #[test]
    fn test_neighbors_capped_by_sample_count() {
        let umap = Umap::new(42, 15, 10);
        assert_eq!(umap.neighbors_for(5), 4);
        assert_eq!(umap.neighbors_for(100), 15);
    }

    #[test]
    fn test_graph_weights_are_memberships() {
        let umap = Umap::new(42, 5, 10);
        let edges = umap.fuzzy_graph(two_blobs().view());
        assert!(!edges.is_empty());
        assert!(edges.iter().all(|e| e.weight > 0.0 && e.weight <= 1.0 + 1e-12));
        assert!(edges.iter().all(|e| e.head < e.tail));
    }

    #[test]
    fn test_deterministic_and_separates_blobs() {
        let data = two_blobs();
        let umap = Umap::new(42, 5, 200);
        let a = umap.fit_transform(data.view(), 2).unwrap();
        let b = umap.fit_transform(data.view(), 2).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dim(), (30, 2));

        let mean = |rows: std::ops::Range<usize>| -> (f64, f64) {
            let count = rows.len() as f64;
            let (sx, sy) = rows.fold((0.0, 0.0), |(sx, sy), i| (sx + a[[i, 0]], sy + a[[i, 1]]));
            (sx / count, sy / count)
        };
        let (ax, ay) = mean(0..15);
        let (bx, by) = mean(15..30);
        assert!(((ax - bx).powi(2) + (ay - by).powi(2)).sqrt() > 1.0);
    }
}

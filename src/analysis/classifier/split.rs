// Stratified train/test split
//
// Test size is the ceiling of the complementary percentage; each class is
// then allotted test rows proportionally (floors first, leftovers to the
// largest remainders) so class ratios match on both sides.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::PipelineError;

/// Row indices of each side, in ascending order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Number of test rows for `n` rows and a training percentage
pub fn test_size(n: usize, train_pct: usize) -> usize {
    (n * (100 - train_pct) + 99) / 100
}

/// Split row indices so each class keeps its proportion on both sides
///
/// # Arguments
/// * `labels` - Dense class index per row (`0..n_classes`)
/// * `train_pct` - Training percentage, 1..=99
/// * `seed` - Seed for the per-class shuffles
pub fn stratified_split(
    labels: &[usize],
    n_classes: usize,
    train_pct: usize,
    seed: u64,
) -> Result<TrainTestSplit, PipelineError> {
    let n = labels.len();
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (row, &label) in labels.iter().enumerate() {
        members[label].push(row);
    }

    if let Some(smallest) = members.iter().map(Vec::len).min() {
        if smallest < 2 {
            return Err(PipelineError::insufficient_samples(
                "a stratified split (per class)",
                2,
                smallest,
            ));
        }
    }

    let n_test = test_size(n, train_pct);
    let n_train = n - n_test;
    if n_test < n_classes {
        return Err(PipelineError::insufficient_samples("the test partition", n_classes, n_test));
    }
    if n_train < n_classes {
        return Err(PipelineError::insufficient_samples(
            "the training partition",
            n_classes,
            n_train,
        ));
    }

    let allocation = allocate(&members, n_test, n);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = TrainTestSplit {
        train: Vec::with_capacity(n_train),
        test: Vec::with_capacity(n_test),
    };
    for (rows, take) in members.iter_mut().zip(allocation) {
        rows.shuffle(&mut rng);
        split.test.extend_from_slice(&rows[..take]);
        split.train.extend_from_slice(&rows[take..]);
    }
    split.train.sort_unstable();
    split.test.sort_unstable();
    Ok(split)
}

/// Test rows per class: floors of the proportional share, then one extra to
/// the largest fractional parts (ties go to the lower class index)
fn allocate(members: &[Vec<usize>], n_test: usize, n: usize) -> Vec<usize> {
    let shares: Vec<f64> = members
        .iter()
        .map(|rows| rows.len() as f64 * n_test as f64 / n as f64)
        .collect();
    let mut take: Vec<usize> = shares.iter().map(|s| s.floor() as usize).collect();

    let mut order: Vec<usize> = (0..members.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = shares[a] - shares[a].floor();
        let fb = shares[b] - shares[b].floor();
        fb.total_cmp(&fa).then(a.cmp(&b))
    });

    let mut remaining = n_test.saturating_sub(take.iter().sum());
    while remaining > 0 {
        let before = remaining;
        for &class in &order {
            if remaining == 0 {
                break;
            }
            // Leave at least one row of every class for training
            if take[class] + 1 < members[class].len() {
                take[class] += 1;
                remaining -= 1;
            }
        }
        if remaining == before {
            break;
        }
    }
    take
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_size_rounds_up() {
        assert_eq!(test_size(10, 70), 3);
        assert_eq!(test_size(10, 75), 3);
        assert_eq!(test_size(7, 50), 4);
        assert_eq!(test_size(100, 99), 1);
    }

    #[test]
    fn test_split_preserves_class_balance() {
        let labels = [0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        let split = stratified_split(&labels, 2, 70, 42).unwrap();
        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 7);
        let test_classes: Vec<usize> = split.test.iter().map(|&i| labels[i]).collect();
        assert!(test_classes.contains(&0));
        assert!(test_classes.contains(&1));

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_deterministic() {
        let labels = [0, 1, 0, 1, 0, 1, 2, 2, 2, 0, 1, 2];
        let a = stratified_split(&labels, 3, 60, 42).unwrap();
        let b = stratified_split(&labels, 3, 60, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_singleton_class_is_rejected() {
        let labels = [0, 0, 0, 1];
        let err = stratified_split(&labels, 2, 50, 42).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientSamples { .. }));
    }

    #[test]
    fn test_test_side_too_small_for_classes() {
        let labels = [0, 0, 1, 1, 2, 2, 0, 1, 2, 0];
        let err = stratified_split(&labels, 3, 90, 42).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientSamples { required: 3, actual: 1, .. }
        ));
    }
}

// PipelineState: results held between requests
//
// Two slots, `features` (assembled feature table) and `reduced` (projection
// plus metadata and, after clustering, labels). Reads clone an `Arc` under a
// short read lock and writes swap the slot under a short write lock, so no
// lock is ever held while a stage computes. Concurrent writers race and the
// last write wins.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::analysis::FeatureTable;
use crate::error::{log_pipeline_error, PipelineError};

type Slot = RwLock<Option<Arc<FeatureTable>>>;

/// Pipeline slots shared by every request
#[derive(Debug, Default)]
pub struct PipelineState {
    features: Slot,
    reduced: Slot,
}

impl PipelineState {
    /// Create a state with both slots empty
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // LOCK HELPER METHODS
    // ========================================================================

    fn read_slot<'a>(
        slot: &'a Slot,
        name: &'static str,
    ) -> Result<RwLockReadGuard<'a, Option<Arc<FeatureTable>>>, PipelineError> {
        slot.read().map_err(|_| {
            let err = PipelineError::StatePoisoned { slot: name };
            log_pipeline_error(&err, "read_slot");
            err
        })
    }

    fn write_slot<'a>(
        slot: &'a Slot,
        name: &'static str,
    ) -> Result<RwLockWriteGuard<'a, Option<Arc<FeatureTable>>>, PipelineError> {
        slot.write().map_err(|_| {
            let err = PipelineError::StatePoisoned { slot: name };
            log_pipeline_error(&err, "write_slot");
            err
        })
    }

    // ========================================================================
    // SLOT ACCESS
    // ========================================================================

    /// Current feature table, if any
    pub fn features(&self) -> Result<Option<Arc<FeatureTable>>, PipelineError> {
        Ok(Self::read_slot(&self.features, "features")?.clone())
    }

    /// Current reduced table, if any
    pub fn reduced(&self) -> Result<Option<Arc<FeatureTable>>, PipelineError> {
        Ok(Self::read_slot(&self.reduced, "reduced")?.clone())
    }

    /// Replace the feature table
    ///
    /// The reduced slot is left as is; it keeps describing the previous
    /// features until the next reduction.
    pub fn set_features(&self, table: FeatureTable) -> Result<Arc<FeatureTable>, PipelineError> {
        let table = Arc::new(table);
        *Self::write_slot(&self.features, "features")? = Some(Arc::clone(&table));
        tracing::debug!(rows = table.n_rows(), "[PipelineState] Stored features");
        Ok(table)
    }

    /// Replace the reduced table
    pub fn set_reduced(&self, table: FeatureTable) -> Result<Arc<FeatureTable>, PipelineError> {
        let table = Arc::new(table);
        *Self::write_slot(&self.reduced, "reduced")? = Some(Arc::clone(&table));
        tracing::debug!(rows = table.n_rows(), "[PipelineState] Stored reduced table");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::thread;

    fn table(value: f64) -> FeatureTable {
        FeatureTable::new(vec!["feature_1".into()], array![[value]]).unwrap()
    }

    #[test]
    fn test_slots_start_empty() {
        let state = PipelineState::new();
        assert!(state.features().unwrap().is_none());
        assert!(state.reduced().unwrap().is_none());
    }

    #[test]
    fn test_set_and_read_back() {
        let state = PipelineState::new();
        state.set_features(table(1.0)).unwrap();
        let stored = state.features().unwrap().unwrap();
        assert_eq!(stored.features()[[0, 0]], 1.0);
        assert!(state.reduced().unwrap().is_none());
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let state = PipelineState::new();
        state.set_features(table(1.0)).unwrap();
        let snapshot = state.features().unwrap().unwrap();
        state.set_features(table(2.0)).unwrap();
        assert_eq!(snapshot.features()[[0, 0]], 1.0);
        assert_eq!(state.features().unwrap().unwrap().features()[[0, 0]], 2.0);
    }

    #[test]
    fn test_concurrent_writers_leave_one_complete_table() {
        let state = Arc::new(PipelineState::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = Arc::clone(&state);
                thread::spawn(move || state.set_reduced(table(i as f64)).map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        let value = state.reduced().unwrap().unwrap().features()[[0, 0]];
        assert!((0.0..8.0).contains(&value));
    }
}

//! Remote synchronizer: pushes the current presence record to the shared
//! store once per heartbeat tick and once at session start.
//!
//! A failed write is logged and dropped, with no retry and no local queue.
//! The next tick carries fresh data, so a transient failure heals within
//! one heartbeat interval.

use std::sync::Arc;
use tabpulse_protocol::PresenceRecord;
use tracing::{debug, warn};

use crate::error::PresenceError;
use crate::store::PresenceStore;

pub struct RemoteSynchronizer {
    store: Arc<dyn PresenceStore>,
}

impl RemoteSynchronizer {
    pub fn new(store: Arc<dyn PresenceStore>) -> Self {
        Self { store }
    }

    /// Idempotent full-record upsert, last-writer-wins on the identity
    /// triple. Malformed records are refused rather than written.
    pub fn try_publish(&self, record: &PresenceRecord) -> Result<(), PresenceError> {
        record.validate().map_err(PresenceError::InvalidRecord)?;
        self.store
            .upsert(record)
            .map_err(PresenceError::StoreWrite)?;
        debug!(
            tab_id = %record.tab_id,
            state = record.state.as_str(),
            "Presence published"
        );
        Ok(())
    }

    /// Heartbeat-facing publish: returns whether the write landed, and
    /// failures never propagate out of the tick.
    pub fn publish(&self, record: &PresenceRecord) -> bool {
        match self.try_publish(record) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, tab_id = %record.tab_id, "Presence upsert failed; dropped");
                false
            }
        }
    }
}

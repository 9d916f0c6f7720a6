//! Tab registry reader.
//!
//! Polls the shared store for every presence row belonging to one user and
//! republishes them grouped by device. Each successful fetch replaces the
//! previous view wholesale; there is no incremental merge. Fetches are
//! tagged with a monotonically increasing generation and a result is
//! discarded if a newer generation has already been applied, so a slow
//! response can never overwrite a fresher one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tabpulse_protocol::{PresenceRecord, PresenceState};
use tracing::{debug, warn};

use crate::classify::classify_last_seen;
use crate::store::PresenceStore;

/// A presence row annotated with the reader-side display classification.
///
/// `display_state` is derived from `last_seen` alone on the reader's clock,
/// with the same thresholds the owning tab uses. It can disagree with the
/// persisted `state` transiently; consumers that want flicker-free display
/// should prefer `display_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub record: PresenceRecord,
    pub display_state: PresenceState,
}

/// All of one device's known tabs, in store return order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceGroup {
    pub device_id: String,
    pub entries: Vec<RegistryEntry>,
}

/// The polled, grouped view of a user's presence rows.
///
/// On read failure the previous groups are retained and `last_error` is set
/// for the UI layer; transient errors never clear data.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryView {
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<String>,
    pub groups: Vec<DeviceGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl RegistryView {
    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|group| group.entries.len()).sum()
    }
}

/// Partition records by device, preserving the order the store returned:
/// groups appear in first-seen order and entries keep their relative order.
pub fn group_by_device(records: Vec<PresenceRecord>, now: DateTime<Utc>) -> Vec<DeviceGroup> {
    let mut groups: Vec<DeviceGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let display_state = display_state_for(&record, now);
        let entry = RegistryEntry {
            record,
            display_state,
        };
        match index.get(&entry.record.device_id) {
            Some(&position) => groups[position].entries.push(entry),
            None => {
                index.insert(entry.record.device_id.clone(), groups.len());
                groups.push(DeviceGroup {
                    device_id: entry.record.device_id.clone(),
                    entries: vec![entry],
                });
            }
        }
    }

    groups
}

fn display_state_for(record: &PresenceRecord, now: DateTime<Utc>) -> PresenceState {
    match DateTime::parse_from_rfc3339(&record.last_seen) {
        Ok(last_seen) => classify_last_seen(now, last_seen.with_timezone(&Utc)),
        Err(_) => {
            debug!(
                tab_id = %record.tab_id,
                last_seen = %record.last_seen,
                "Unparseable last_seen; classifying as stale"
            );
            PresenceState::Stale
        }
    }
}

pub struct Registry {
    user_id: String,
    view: Mutex<RegistryView>,
    subscribers: Mutex<Vec<Sender<RegistryView>>>,
    next_generation: AtomicU64,
}

impl Registry {
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            view: Mutex::new(RegistryView::default()),
            subscribers: Mutex::new(Vec::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Latest applied view.
    pub fn snapshot(&self) -> RegistryView {
        self.lock_view().clone()
    }

    /// Update notifications: every applied fetch (success or failure) sends
    /// the resulting view. Dropped receivers are pruned on the next notify.
    pub fn subscribe(&self) -> Receiver<RegistryView> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// One fetch-and-apply cycle against the store.
    pub fn poll_once(&self, store: &dyn PresenceStore) {
        let generation = self.begin_fetch();
        let result = store.fetch_for_user(&self.user_id);
        self.apply(generation, result, Utc::now());
    }

    pub(crate) fn begin_fetch(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn apply(
        &self,
        generation: u64,
        result: Result<Vec<PresenceRecord>, String>,
        now: DateTime<Utc>,
    ) {
        let view = match result {
            Ok(records) => {
                let mut view = self.lock_view();
                if generation <= view.generation {
                    debug!(
                        generation,
                        applied = view.generation,
                        "Discarding superseded registry fetch"
                    );
                    return;
                }
                view.generation = generation;
                view.fetched_at = Some(now.to_rfc3339());
                view.groups = group_by_device(records, now);
                view.last_error = None;
                debug!(
                    generation,
                    devices = view.groups.len(),
                    records = view.record_count(),
                    "Registry view refreshed"
                );
                view.clone()
            }
            Err(err) => {
                warn!(error = %err, "Registry fetch failed; keeping previous view");
                let mut view = self.lock_view();
                view.last_error = Some(err);
                view.clone()
            }
        };

        self.notify(view);
    }

    fn notify(&self, view: RegistryView) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|subscriber| subscriber.send(view.clone()).is_ok());
    }

    fn lock_view(&self) -> MutexGuard<'_, RegistryView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Presence session: an explicitly owned component holding its own timers
//! and activity state, constructed per signed-in user and torn down on
//! sign-out.
//!
//! Two plain threads run per session: the heartbeat (recompute + remote
//! write) and the registry poller (remote read + republish). They are not
//! synchronized with each other and may interleave arbitrarily. Both are
//! cancelable and idempotently stoppable, so no orphaned writes can target
//! a stale user after logout.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tabpulse_protocol::{PresenceRecord, PresenceState};
use tracing::{debug, info};

use crate::activity::ActivityMonitor;
use crate::classify::classify;
use crate::error::PresenceError;
use crate::identity::IdentityStore;
use crate::registry::Registry;
use crate::store::PresenceStore;
use crate::sync::RemoteSynchronizer;

// Cadences. The heartbeat drives state recompute + remote write; the
// registry poll drives remote read + UI refresh.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const REGISTRY_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_id: String,
    pub user_agent: String,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
}

impl SessionConfig {
    pub fn new(user_id: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_agent: user_agent.into(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            poll_interval: REGISTRY_POLL_INTERVAL,
        }
    }
}

struct SessionShared {
    activity: Arc<ActivityMonitor>,
    record: Mutex<PresenceRecord>,
    sync: RemoteSynchronizer,
}

pub struct PresenceSession {
    shared: Arc<SessionShared>,
    registry: Arc<Registry>,
    stop: Arc<AtomicBool>,
    heartbeat_stop: Sender<()>,
    poll_wake: Sender<()>,
    heartbeat: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

impl PresenceSession {
    /// Initialize presence for a signed-in user.
    ///
    /// Refuses to start without a user id rather than writing malformed
    /// rows. The initial record is published immediately so newly opened
    /// tabs are visible to others without waiting a full heartbeat.
    pub fn start(
        config: SessionConfig,
        identity: &IdentityStore,
        store: Arc<dyn PresenceStore>,
    ) -> Result<PresenceSession, PresenceError> {
        let user_id = config.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(PresenceError::NotReady);
        }

        let device_id = identity.device_id();
        let tab_id = identity.tab_id();
        let now = Utc::now();

        let record = PresenceRecord {
            user_id: user_id.clone(),
            device_id,
            tab_id: tab_id.clone(),
            user_agent: config.user_agent,
            is_active: true,
            last_seen: now.to_rfc3339(),
            state: PresenceState::Active,
        };
        record.validate().map_err(PresenceError::InvalidRecord)?;

        let sync = RemoteSynchronizer::new(Arc::clone(&store));
        sync.publish(&record);

        info!(user_id = %user_id, tab_id = %tab_id, "Presence session started");

        let shared = Arc::new(SessionShared {
            activity: Arc::new(ActivityMonitor::new(now)),
            record: Mutex::new(record),
            sync,
        });
        let registry = Arc::new(Registry::new(user_id));
        let stop = Arc::new(AtomicBool::new(false));
        let (heartbeat_stop, heartbeat_stop_rx) = mpsc::channel();
        let (poll_wake, poll_wake_rx) = mpsc::channel();

        let heartbeat = {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            let poll_wake = poll_wake.clone();
            let interval = config.heartbeat_interval;
            thread::spawn(move || loop {
                match heartbeat_stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                heartbeat_tick(&shared, &poll_wake);
            })
        };

        let poller = {
            let registry = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            let interval = config.poll_interval;
            thread::spawn(move || loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                registry.poll_once(store.as_ref());
                match poll_wake_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            })
        };

        Ok(PresenceSession {
            shared,
            registry,
            stop,
            heartbeat_stop,
            poll_wake,
            heartbeat: Some(heartbeat),
            poller: Some(poller),
        })
    }

    /// The activity monitor the host feeds focus/visibility/input signals.
    pub fn activity(&self) -> Arc<ActivityMonitor> {
        Arc::clone(&self.shared.activity)
    }

    /// The polled registry view of all of this user's tabs.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// The record as of the last heartbeat tick.
    pub fn current_record(&self) -> PresenceRecord {
        self.shared
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel both timers and wait for them to exit. Stopping an already
    /// stopped session is a no-op.
    pub fn stop(&mut self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.heartbeat_stop.send(());
        let _ = self.poll_wake.send(());
        if let Some(handle) = self.heartbeat.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.poller.take() {
            let _ = handle.join();
        }
        info!("Presence session stopped");
    }
}

impl Drop for PresenceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One heartbeat: sample activity, classify against wall-clock now,
/// re-derive the record, publish. State is sampled here and only here, so
/// raw focus churn between ticks never causes a transition on its own.
fn heartbeat_tick(shared: &SessionShared, poll_wake: &Sender<()>) {
    let now = Utc::now();
    let snapshot = shared.activity.snapshot();
    let state = classify(now, snapshot.last_activity_at, snapshot.focused);

    let (record, previous) = {
        let mut record = shared
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = record.state;
        record.state = state;
        record.is_active = snapshot.focused;
        record.last_seen = snapshot.last_activity_at.to_rfc3339();
        (record.clone(), previous)
    };

    if previous == state {
        debug!(state = state.as_str(), "Heartbeat");
    } else {
        info!(
            tab_id = %record.tab_id,
            from = previous.as_str(),
            to = state.as_str(),
            "Presence state changed"
        );
    }

    shared.sync.publish(&record);

    // A locally observed change refreshes the registry without waiting for
    // the next poll interval.
    if previous != state {
        let _ = poll_wake.send(());
    }
}

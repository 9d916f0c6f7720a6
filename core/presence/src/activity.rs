//! Activity signal tracking for a single tab.
//!
//! Five fire-and-forget notifications feed two pieces of state: the
//! timestamp of the last user activity and whether the tab currently holds
//! focus. Signals may arrive in bursts or not at all (a fully backgrounded
//! tab can stay silent for hours); none of them block the caller, and state
//! is only sampled at heartbeat tick boundaries.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Coarse user-input kinds that refresh the activity clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Pointer,
    Key,
    Touch,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Pointer => "pointer",
            InteractionKind::Key => "key",
            InteractionKind::Touch => "touch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySnapshot {
    pub last_activity_at: DateTime<Utc>,
    pub focused: bool,
}

#[derive(Debug)]
pub struct ActivityMonitor {
    inner: Mutex<ActivitySnapshot>,
}

impl ActivityMonitor {
    /// A freshly opened tab starts focused with the clock at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(ActivitySnapshot {
                last_activity_at: now,
                focused: true,
            }),
        }
    }

    /// Focus gain marks the tab focused and refreshes the activity clock.
    pub fn focus_gained(&self) {
        let now = Utc::now();
        let mut state = self.lock();
        state.focused = true;
        state.last_activity_at = now;
        tracing::debug!("Tab focus gained");
    }

    /// Focus loss clears the flag but leaves the activity clock untouched.
    pub fn focus_lost(&self) {
        self.lock().focused = false;
        tracing::debug!("Tab focus lost");
    }

    /// Visibility maps onto the focus flag: visible behaves like focus gain,
    /// hidden like focus loss.
    pub fn visibility_changed(&self, visible: bool) {
        if visible {
            self.focus_gained();
        } else {
            self.focus_lost();
        }
    }

    /// Pointer/key/touch input refreshes the clock without touching focus.
    pub fn interaction(&self, kind: InteractionKind) {
        let now = Utc::now();
        self.lock().last_activity_at = now;
        tracing::debug!(kind = kind.as_str(), "User interaction");
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, ActivitySnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn force(&self, last_activity_at: DateTime<Utc>, focused: bool) {
        let mut state = self.lock();
        state.last_activity_at = last_activity_at;
        state.focused = focused;
    }
}

//! Presence classification.
//!
//! State is recomputed from absolute elapsed time and current focus on every
//! heartbeat tick rather than incrementally, so a missed tick cannot
//! desynchronize the machine.

use chrono::{DateTime, Utc};
use tabpulse_protocol::PresenceState;

// Classification thresholds (seconds).
pub const IDLE_THRESHOLD_SECS: i64 = 5 * 60;
pub const STALE_THRESHOLD_SECS: i64 = 30 * 60;

/// Classify a tab from its last activity time and focus flag.
///
/// Total over its input domain: focus loss alone caps at `Idle`; only
/// elapsed inactivity can produce `Stale`.
pub fn classify(now: DateTime<Utc>, last_activity_at: DateTime<Utc>, focused: bool) -> PresenceState {
    let elapsed_secs = now.signed_duration_since(last_activity_at).num_seconds();

    if elapsed_secs > STALE_THRESHOLD_SECS {
        PresenceState::Stale
    } else if elapsed_secs > IDLE_THRESHOLD_SECS || !focused {
        PresenceState::Idle
    } else {
        PresenceState::Active
    }
}

/// Display classification for registry rows, from `last_seen` alone.
///
/// Recomputed on the reader's clock with the same thresholds as
/// [`classify`]. It can disagree transiently with the `state` the owning tab
/// persisted, since the two run on different clocks and cadences.
pub fn classify_last_seen(now: DateTime<Utc>, last_seen: DateTime<Utc>) -> PresenceState {
    classify(now, last_seen, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("parse")
            .with_timezone(&Utc)
    }

    #[test]
    fn recent_activity_with_focus_is_active() {
        let now = at("2026-03-01T12:00:00Z");
        for secs in [0, 1, 60, IDLE_THRESHOLD_SECS] {
            let last = now - Duration::seconds(secs);
            assert_eq!(classify(now, last, true), PresenceState::Active);
        }
    }

    #[test]
    fn elapsed_past_idle_threshold_is_idle_even_when_focused() {
        let now = at("2026-03-01T12:00:00Z");
        for secs in [IDLE_THRESHOLD_SECS + 1, 10 * 60, STALE_THRESHOLD_SECS] {
            let last = now - Duration::seconds(secs);
            assert_eq!(classify(now, last, true), PresenceState::Idle);
        }
    }

    #[test]
    fn unfocused_is_idle_regardless_of_recent_activity() {
        let now = at("2026-03-01T12:00:00Z");
        assert_eq!(classify(now, now, false), PresenceState::Idle);
        assert_eq!(
            classify(now, now - Duration::seconds(30), false),
            PresenceState::Idle
        );
    }

    #[test]
    fn elapsed_past_stale_threshold_is_stale_regardless_of_focus() {
        let now = at("2026-03-01T12:00:00Z");
        let last = now - Duration::seconds(STALE_THRESHOLD_SECS + 1);
        assert_eq!(classify(now, last, true), PresenceState::Stale);
        assert_eq!(classify(now, last, false), PresenceState::Stale);
    }

    #[test]
    fn classification_is_idempotent_for_identical_inputs() {
        let now = at("2026-03-01T12:00:00Z");
        let last = now - Duration::seconds(400);
        assert_eq!(classify(now, last, true), classify(now, last, true));
    }

    // Scenario: tab opens, no interaction for 4 minutes with focus held.
    #[test]
    fn four_quiet_minutes_with_focus_held_stays_active() {
        let now = at("2026-03-01T12:04:00Z");
        let last = at("2026-03-01T12:00:00Z");
        assert_eq!(classify(now, last, true), PresenceState::Active);
    }

    // Scenario: tab blurred at t=0, heartbeat evaluates 30 seconds later.
    #[test]
    fn blurred_tab_reports_idle_at_next_heartbeat() {
        let now = at("2026-03-01T12:00:30Z");
        let last = at("2026-03-01T12:00:00Z");
        assert_eq!(classify(now, last, false), PresenceState::Idle);
    }

    // Scenario: focused but quiet for 31 minutes, then a single keypress.
    #[test]
    fn stale_tab_recovers_to_active_after_interaction() {
        let quiet_since = at("2026-03-01T12:00:00Z");
        let now = at("2026-03-01T12:31:00Z");
        assert_eq!(classify(now, quiet_since, true), PresenceState::Stale);

        // The keypress refreshes last activity; the next tick sees it fresh.
        let next_tick = at("2026-03-01T12:31:30Z");
        assert_eq!(classify(next_tick, now, true), PresenceState::Active);
    }

    #[test]
    fn display_classification_uses_same_thresholds() {
        let now = at("2026-03-01T12:00:00Z");
        assert_eq!(
            classify_last_seen(now, now - Duration::seconds(60)),
            PresenceState::Active
        );
        assert_eq!(
            classify_last_seen(now, now - Duration::seconds(IDLE_THRESHOLD_SECS + 1)),
            PresenceState::Idle
        );
        assert_eq!(
            classify_last_seen(now, now - Duration::seconds(STALE_THRESHOLD_SECS + 1)),
            PresenceState::Stale
        );
    }
}

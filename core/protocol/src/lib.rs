//! Presence record types and validation for tabpulse.
//!
//! This crate is shared by the engine and its clients to prevent schema
//! drift. The shared-store row is the only wire-relevant contract, so the
//! types that cross it live here, and the engine remains the authority on
//! how records are produced.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Maximum length accepted for any identifier field.
pub const MAX_ID_LEN: usize = 128;

/// A tab's computed activity classification, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Active,
    Idle,
    Stale,
}

impl PresenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceState::Active => "active",
            PresenceState::Idle => "idle",
            PresenceState::Stale => "stale",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "active" => Some(PresenceState::Active),
            "idle" => Some(PresenceState::Idle),
            "stale" => Some(PresenceState::Stale),
            _ => None,
        }
    }
}

/// One tab's presence row, keyed by `(user_id, device_id, tab_id)`.
///
/// Owned exclusively by the tab session that created it; other tabs and
/// devices only ever read it back through registry queries. `last_seen` is
/// the RFC3339 timestamp of the last observed user activity, not the last
/// heartbeat write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub device_id: String,
    pub tab_id: String,
    pub user_agent: String,
    pub is_active: bool,
    pub last_seen: String,
    pub state: PresenceState,
}

impl PresenceRecord {
    /// The composite natural key this record is stored under.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.user_id, &self.device_id, &self.tab_id)
    }

    pub fn validate(&self) -> Result<(), String> {
        require_id(&self.user_id, "user_id")?;
        require_id(&self.device_id, "device_id")?;
        require_id(&self.tab_id, "tab_id")?;

        if DateTime::parse_from_rfc3339(&self.last_seen).is_err() {
            return Err("last_seen must be RFC3339".to_string());
        }

        Ok(())
    }
}

fn require_id(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field));
    }
    if value.len() > MAX_ID_LEN {
        return Err(format!(
            "{} must be {} characters or fewer",
            field, MAX_ID_LEN
        ));
    }
    Ok(())
}

//! Local identity slots for the device and tab identifiers.
//!
//! Two independent key-value slots back the identity triple: a durable slot
//! shared by every tab on the device, and a session slot scoped to one tab's
//! lifetime. When a slot is unavailable the id degrades to an ephemeral
//! value and a warning is logged; presence keeps running either way.

use fs_err as fs;
use rand::RngCore;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

const DATA_DIR: &str = ".tabpulse";
const DEVICE_ID_FILE: &str = "device-id";

/// A single persisted identifier slot.
pub trait IdentitySlot: Send + Sync {
    fn load(&self) -> Result<Option<String>, String>;
    fn store(&self, value: &str) -> Result<(), String>;
}

/// Durable slot backed by a file, shared across tabs and restarts.
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The default on-disk location for the device identifier.
    pub fn default_device_slot() -> Result<Self, String> {
        let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
        Ok(Self::new(home.join(DATA_DIR).join(DEVICE_ID_FILE)))
    }
}

impl IdentitySlot for FileSlot {
    fn load(&self) -> Result<Option<String>, String> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(format!("Failed to read identity slot: {}", err)),
        }
    }

    fn store(&self, value: &str) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| format!("Failed to create identity dir: {}", err))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, value)
            .map_err(|err| format!("Failed to write identity slot: {}", err))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|err| format!("Failed to commit identity slot: {}", err))?;
        Ok(())
    }
}

/// Session-scoped slot held in process memory.
///
/// Lives exactly as long as the tab session that owns it and is invisible to
/// every other tab, including those on the same device.
#[derive(Default)]
pub struct SessionSlot {
    value: Mutex<Option<String>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentitySlot for SessionSlot {
    fn load(&self) -> Result<Option<String>, String> {
        Ok(self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn store(&self, value: &str) -> Result<(), String> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.to_string());
        Ok(())
    }
}

/// Produces and persists the per-device and per-tab identifiers.
pub struct IdentityStore {
    device_slot: Box<dyn IdentitySlot>,
    tab_slot: Box<dyn IdentitySlot>,
}

impl IdentityStore {
    pub fn new(device_slot: Box<dyn IdentitySlot>, tab_slot: Box<dyn IdentitySlot>) -> Self {
        Self {
            device_slot,
            tab_slot,
        }
    }

    /// Default wiring: device id in `~/.tabpulse/device-id`, tab id in
    /// process memory. If the home directory cannot be resolved the device
    /// slot degrades to session scope as well.
    pub fn with_default_slots() -> Self {
        let device_slot: Box<dyn IdentitySlot> = match FileSlot::default_device_slot() {
            Ok(slot) => Box::new(slot),
            Err(err) => {
                warn!(error = %err, "Device identity slot unavailable; device id will not persist");
                Box::new(SessionSlot::new())
            }
        };
        Self::new(device_slot, Box::new(SessionSlot::new()))
    }

    /// Stable per-device identifier, generated and stored on first use.
    pub fn device_id(&self) -> String {
        get_or_create(self.device_slot.as_ref(), "device")
    }

    /// Per-tab-session identifier, never shared with other tabs.
    pub fn tab_id(&self) -> String {
        get_or_create(self.tab_slot.as_ref(), "tab")
    }
}

fn get_or_create(slot: &dyn IdentitySlot, kind: &str) -> String {
    match slot.load() {
        Ok(Some(id)) => return id,
        Ok(None) => {}
        Err(err) => {
            warn!(kind, error = %err, "Identity slot read failed; using ephemeral id");
        }
    }

    let id = generate_id();
    if let Err(err) = slot.store(&id) {
        warn!(kind, error = %err, "Identity slot write failed; id will not survive restart");
    }
    id
}

/// Random UUID-shaped identifier. No cryptographic uniqueness claim.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSlot;

    impl IdentitySlot for BrokenSlot {
        fn load(&self) -> Result<Option<String>, String> {
            Err("slot offline".to_string())
        }

        fn store(&self, _value: &str) -> Result<(), String> {
            Err("slot offline".to_string())
        }
    }

    #[test]
    fn generated_ids_are_uuid_shaped() {
        let id = generate_id();
        assert_eq!(id.len(), 36);
        let segments: Vec<&str> = id.split('-').collect();
        assert_eq!(
            segments.iter().map(|s| s.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(id
            .chars()
            .all(|c| c == '-' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn file_slot_round_trips_and_survives_reopen() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("nested").join("device-id");

        let slot = FileSlot::new(path.clone());
        assert_eq!(slot.load().expect("load"), None);
        slot.store("device-abc").expect("store");

        let reopened = FileSlot::new(path);
        assert_eq!(
            reopened.load().expect("load"),
            Some("device-abc".to_string())
        );
    }

    #[test]
    fn device_id_is_stable_across_stores_sharing_a_slot_path() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("device-id");

        let first = IdentityStore::new(
            Box::new(FileSlot::new(path.clone())),
            Box::new(SessionSlot::new()),
        );
        let second = IdentityStore::new(
            Box::new(FileSlot::new(path)),
            Box::new(SessionSlot::new()),
        );

        assert_eq!(first.device_id(), second.device_id());
    }

    #[test]
    fn tabs_on_one_device_never_share_a_tab_id() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("device-id");

        let first = IdentityStore::new(
            Box::new(FileSlot::new(path.clone())),
            Box::new(SessionSlot::new()),
        );
        let second = IdentityStore::new(
            Box::new(FileSlot::new(path)),
            Box::new(SessionSlot::new()),
        );

        assert_eq!(first.device_id(), second.device_id());
        assert_ne!(first.tab_id(), second.tab_id());
    }

    #[test]
    fn tab_id_is_stable_within_one_session() {
        let store = IdentityStore::new(Box::new(SessionSlot::new()), Box::new(SessionSlot::new()));
        assert_eq!(store.tab_id(), store.tab_id());
    }

    #[test]
    fn broken_slot_degrades_to_ephemeral_ids() {
        let store = IdentityStore::new(Box::new(BrokenSlot), Box::new(BrokenSlot));
        let first = store.device_id();
        assert_eq!(first.len(), 36);
        // Nothing persisted, so each call mints a fresh id.
        assert_ne!(first, store.device_id());
    }
}

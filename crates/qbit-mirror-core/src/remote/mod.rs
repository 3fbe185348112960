pub mod qbittorrent;

use crate::error::RemoteError;
use serde::Deserialize;
use std::collections::BTreeMap;

pub use qbittorrent::QbitClient;

/// States of a torrent that is still fetching payload (or queued to).
pub const TRANSFERRING_STATES: [&str; 9] = [
    "downloading",
    "metaDL",
    "allocating",
    "checkingDL",
    "pausedDL",
    "stoppedDL",
    "queuedDL",
    "stalledDL",
    "forcedDL",
];

/// States of a torrent the client gave up on.
pub const ERRORED_STATES: [&str; 3] = ["error", "missingFiles", "unknown"];

/// A torrent as reported by `/api/v2/torrents/info`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Item {
    #[serde(rename = "hash")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "size", default)]
    pub size_bytes: i64,
    pub state: String,
    #[serde(default)]
    pub save_path: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub ratio: f64,
    #[serde(rename = "uploaded", default)]
    pub uploaded_bytes: i64,
    #[serde(rename = "auto_tmm", default)]
    pub auto_managed: bool,
}

/// Why a destination item should not stay on the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnwantedState {
    Transferring,
    Errored(String),
}

impl UnwantedState {
    pub fn classify(state: &str) -> Option<Self> {
        if TRANSFERRING_STATES.contains(&state) {
            Some(UnwantedState::Transferring)
        } else if ERRORED_STATES.contains(&state) {
            Some(UnwantedState::Errored(state.to_string()))
        } else {
            None
        }
    }

    /// Blacklist reason tag.
    pub fn reason(&self) -> String {
        match self {
            UnwantedState::Transferring => "download".to_string(),
            UnwantedState::Errored(state) => format!("errored:{}", state),
        }
    }
}

/// Server-side state filter for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    Seeding,
}

impl StateFilter {
    pub fn as_query(self) -> &'static str {
        match self {
            StateFilter::Seeding => "seeding",
        }
    }

    pub fn matches(self, state: &str) -> bool {
        match self {
            StateFilter::Seeding => {
                matches!(state, "uploading" | "stalledUP" | "queuedUP" | "forcedUP" | "checkingUP")
            }
        }
    }
}

/// Parameters for adding an exported torrent to an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct AddOptions {
    pub save_path: String,
    pub category: String,
    pub tags: String,
    pub skip_checking: bool,
    pub paused: bool,
    pub auto_managed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddStatus {
    Accepted,
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct Category {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "savePath", default)]
    pub save_path: String,
}

/// Command surface of one item-management service.
///
/// Implementations are blocking; the engine calls them strictly one after another.
pub trait RemoteEndpoint {
    /// Human-readable name used in logs ("source", "destination", ...).
    fn label(&self) -> &str;

    fn version(&self) -> Result<String, RemoteError>;

    fn list(&self, filter: Option<StateFilter>) -> Result<Vec<Item>, RemoteError>;

    fn list_by_ids(&self, ids: &[&str]) -> Result<Vec<Item>, RemoteError>;

    fn export(&self, id: &str) -> Result<Vec<u8>, RemoteError>;

    fn add(&self, blob: &[u8], options: &AddOptions) -> Result<AddStatus, RemoteError>;

    fn delete(&self, ids: &[&str], delete_files: bool) -> Result<(), RemoteError>;

    fn set_force_active(&self, ids: &[&str], enable: bool) -> Result<(), RemoteError>;

    fn list_categories(&self) -> Result<BTreeMap<String, Category>, RemoteError>;

    fn create_category(&self, name: &str, save_path: &str) -> Result<(), RemoteError>;

    /// Whether `id` is currently present on this endpoint.
    fn contains(&self, id: &str) -> Result<bool, RemoteError> {
        Ok(!self.list_by_ids(&[id])?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unwanted_states() {
        assert_eq!(
            UnwantedState::classify("stalledDL"),
            Some(UnwantedState::Transferring)
        );
        assert_eq!(
            UnwantedState::classify("missingFiles").map(|s| s.reason()),
            Some("errored:missingFiles".to_string())
        );
        assert_eq!(UnwantedState::classify("uploading"), None);
        assert_eq!(UnwantedState::Transferring.reason(), "download");
    }

    #[test]
    fn test_item_decodes_from_webui_json() {
        let json = r#"{
            "hash": "abc123",
            "name": "Some.Release",
            "category": "movies",
            "size": 2147483648,
            "state": "stalledUP",
            "save_path": "/data/movies",
            "tags": "hd,x265",
            "ratio": 1.25,
            "uploaded": 1073741824,
            "auto_tmm": true,
            "num_seeds": 4
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "abc123");
        assert_eq!(item.size_bytes, 2_147_483_648);
        assert_eq!(item.uploaded_bytes, 1_073_741_824);
        assert!(item.auto_managed);
        assert_eq!(item.tags, "hd,x265");
    }

    #[test]
    fn test_seeding_filter_matches_default_seeding_states() {
        for state in crate::config::DEFAULT_SEEDING_STATES {
            assert!(StateFilter::Seeding.matches(state), "{} should be seeding", state);
        }
        assert!(!StateFilter::Seeding.matches("downloading"));
    }
}

use std::collections::BTreeMap;
use std::fmt;

use crate::remote::Item;

/// One row of the source snapshot, the source's view as of the last pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub id: String,
    pub display_name: String,
    pub category: String,
    pub size_bytes: i64,
    pub state: String,
}

impl From<&Item> for SnapshotEntry {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            display_name: item.name.clone(),
            category: item.category.clone(),
            size_bytes: item.size_bytes,
            state: item.state.clone(),
        }
    }
}

/// An item believed to be held by the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationRecord {
    pub id: String,
    pub display_name: String,
    pub category: String,
    pub size_bytes: i64,
    /// Filled by the store on insert; ignored when writing.
    pub replicated_at: String,
}

impl From<&Item> for ReplicationRecord {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            display_name: item.name.clone(),
            category: item.category.clone(),
            size_bytes: item.size_bytes,
            replicated_at: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlacklistEntry {
    pub id: String,
    pub display_name: String,
    pub reason: String,
    pub blacklisted_at: String,
    pub attempt_count: i64,
}

/// Input to a blacklist upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct BlacklistCandidate {
    pub id: String,
    pub display_name: String,
    pub reason: String,
}

/// An item confirmed gone from the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedItem {
    pub id: String,
    pub display_name: String,
}

impl From<&Item> for RemovedItem {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            display_name: item.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuditOperation {
    Replicate,
    Delete,
    Blacklist,
    Unblacklist,
}

impl AuditOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditOperation::Replicate => "REPLICATE",
            AuditOperation::Delete => "DELETE",
            AuditOperation::Blacklist => "BLACKLIST",
            AuditOperation::Unblacklist => "UNBLACKLIST",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditLogEntry {
    pub sequence_id: i64,
    pub timestamp: String,
    pub operation: String,
    pub item_id: String,
    pub item_name: String,
    pub details: Option<String>,
}

/// Aggregate view over all tables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreStats {
    pub snapshot_count: i64,
    pub snapshot_bytes: i64,
    pub replicated_count: i64,
    pub replicated_bytes: i64,
    pub blacklist_count: i64,
    /// Audit rows per operation over the last 24 hours.
    pub operations_24h: BTreeMap<String, i64>,
}

impl StoreStats {
    pub fn snapshot_gib(&self) -> f64 {
        self.snapshot_bytes as f64 / crate::GIB
    }

    pub fn replicated_gib(&self) -> f64 {
        self.replicated_bytes as f64 / crate::GIB
    }
}

use std::fmt;

/// The five ordered phases of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Snapshot,
    BlacklistCleanup,
    Replication,
    OrphanEviction,
    UnwantedEviction,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Snapshot,
        Phase::BlacklistCleanup,
        Phase::Replication,
        Phase::OrphanEviction,
        Phase::UnwantedEviction,
    ];

    pub fn number(self) -> usize {
        match self {
            Phase::Snapshot => 1,
            Phase::BlacklistCleanup => 2,
            Phase::Replication => 3,
            Phase::OrphanEviction => 4,
            Phase::UnwantedEviction => 5,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Phase::Snapshot => "Capturing source snapshot",
            Phase::BlacklistCleanup => "Cleaning blacklist",
            Phase::Replication => "Replicating missing items",
            Phase::OrphanEviction => "Removing orphans",
            Phase::UnwantedEviction => "Removing unwanted items",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.number(), Phase::ALL.len(), self.title())
    }
}

/// Trait for reporting reconciliation progress.
///
/// CLI implements with indicatif progress bars. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_phase_start(&self, _phase: Phase) {}
    fn on_items_start(&self, _phase: Phase, _total: usize) {}
    fn on_item_progress(&self, _phase: Phase, _done: usize, _total: usize, _name: &str) {}
    fn on_items_complete(&self, _phase: Phase, _succeeded: usize, _failed: usize) {}
    fn on_settle_tick(&self, _remaining_secs: u64) {}
    fn on_phase_complete(&self, _phase: Phase, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

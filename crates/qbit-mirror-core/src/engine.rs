use crate::config::AppConfig;
use crate::error::Error;
use crate::policy::{self, Verdict};
use crate::progress::{Phase, ProgressReporter};
use crate::remote::{Item, RemoteEndpoint, StateFilter, UnwantedState};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::storage::models::{
    BlacklistCandidate, RemovedItem, ReplicationRecord, SnapshotEntry, StoreStats,
};
use crate::storage::Database;
use crate::verify::Verifier;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pause after a pass that replicated something, before inspecting destination states.
pub const SETTLE_DELAY: Duration = Duration::from_secs(10);
const ORPHAN_INTERVAL: Duration = Duration::from_millis(300);
const UNWANTED_INTERVAL: Duration = Duration::from_millis(200);

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

pub struct SyncEngine<'a> {
    source: &'a dyn RemoteEndpoint,
    destination: &'a dyn RemoteEndpoint,
    db: &'a Database,
    config: &'a AppConfig,
    sleeper: &'a dyn Sleeper,
    retry: RetryPolicy,
    settle_delay: Duration,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PassReport {
    pub source_listed: usize,
    pub source_eligible: usize,
    pub blacklist_pruned: usize,
    pub destination_listed: usize,
    pub to_replicate: usize,
    pub replicated: usize,
    pub replication_failed: usize,
    pub skipped_blacklisted: usize,
    pub categories_created: usize,
    pub orphans_found: usize,
    pub orphans_removed: usize,
    pub orphans_failed: usize,
    pub settled: bool,
    pub unwanted_transferring: usize,
    pub unwanted_errored: usize,
    pub unwanted_removed: usize,
    pub unwanted_failed: usize,
    pub duration: Duration,
    pub final_stats: StoreStats,
}

/// Result of reconciling one externally supplied id.
#[derive(Debug, Clone, PartialEq)]
pub enum SingleOutcome {
    Blacklisted,
    NotFound,
    Filtered(String),
    AlreadyPresent,
    Replicated,
    Failed,
}

#[derive(Debug)]
struct ItemBatch<T> {
    succeeded: Vec<T>,
    failed: usize,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        source: &'a dyn RemoteEndpoint,
        destination: &'a dyn RemoteEndpoint,
        db: &'a Database,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            source,
            destination,
            db,
            config,
            sleeper: &THREAD_SLEEPER,
            retry: RetryPolicy::default(),
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    fn verifier(&self) -> Verifier<'_> {
        Verifier::new(&self.config.replication, self.sleeper).with_retry_policy(self.retry)
    }

    /// Run one full reconciliation pass:
    /// 1. Snapshot the eligible source items
    /// 2. Drop blacklist entries for items gone from the source
    /// 3. Replicate items missing on the destination (blacklist excluded)
    /// 4. Remove destination items absent from the source
    /// 5. Settle, then remove and blacklist destination items stuck transferring or errored
    ///
    /// A listing failure on either endpoint aborts the pass; per-item failures are counted.
    pub fn run_pass(&self, reporter: &dyn ProgressReporter) -> Result<PassReport, Error> {
        let pass_start = Instant::now();
        let mut report = PassReport::default();

        // Phase 1: Snapshot
        let phase_start = self.begin(reporter, Phase::Snapshot);
        let eligible = self.snapshot_source(&mut report)?;
        let universe: HashSet<String> = eligible.iter().map(|item| item.id.clone()).collect();
        self.finish(reporter, Phase::Snapshot, phase_start);

        // Phase 2: Blacklist cleanup
        let phase_start = self.begin(reporter, Phase::BlacklistCleanup);
        report.blacklist_pruned = self.db.prune_blacklist(&universe)?;
        if report.blacklist_pruned > 0 {
            info!(
                "{} items left the blacklist (no longer on source)",
                report.blacklist_pruned
            );
        } else {
            debug!("Blacklist unchanged");
        }
        self.finish(reporter, Phase::BlacklistCleanup, phase_start);

        // Phase 3: Replication
        let phase_start = self.begin(reporter, Phase::Replication);
        self.replicate_missing(&eligible, reporter, &mut report)?;
        self.finish(reporter, Phase::Replication, phase_start);

        // Phase 4: Orphan eviction
        let phase_start = self.begin(reporter, Phase::OrphanEviction);
        self.evict_orphans(&universe, reporter, &mut report)?;
        self.finish(reporter, Phase::OrphanEviction, phase_start);

        // Phase 5: Settle + unwanted-state eviction
        let phase_start = self.begin(reporter, Phase::UnwantedEviction);
        if report.replicated > 0 {
            self.settle(reporter);
            report.settled = true;
        }
        self.evict_unwanted(reporter, &mut report)?;
        self.finish(reporter, Phase::UnwantedEviction, phase_start);

        report.final_stats = self.db.stats()?;
        report.duration = pass_start.elapsed();
        info!(
            "Pass complete in {:.2}s: {} replicated, {} orphans removed, {} unwanted removed",
            report.duration.as_secs_f64(),
            report.replicated,
            report.orphans_removed,
            report.unwanted_removed,
        );
        Ok(report)
    }

    fn begin(&self, reporter: &dyn ProgressReporter, phase: Phase) -> Instant {
        info!("{}", phase);
        reporter.on_phase_start(phase);
        Instant::now()
    }

    fn finish(&self, reporter: &dyn ProgressReporter, phase: Phase, started: Instant) {
        let elapsed = started.elapsed().as_secs_f64();
        debug!("Phase {} finished in {:.2}s", phase.number(), elapsed);
        reporter.on_phase_complete(phase, elapsed);
    }

    fn snapshot_source(&self, report: &mut PassReport) -> Result<Vec<Item>, Error> {
        let filter = self
            .config
            .policy
            .only_seeding_states
            .then_some(StateFilter::Seeding);
        let listed = self.source.list(filter)?;
        report.source_listed = listed.len();

        let eligible: Vec<Item> = listed
            .into_iter()
            .filter(|item| match policy::eligible(item, &self.config.policy) {
                Verdict::Eligible => true,
                Verdict::Rejected(rejection) => {
                    debug!(id = %item.id, "Filtered: {}", rejection);
                    false
                }
            })
            .collect();
        report.source_eligible = eligible.len();

        let entries: Vec<SnapshotEntry> = eligible.iter().map(SnapshotEntry::from).collect();
        self.db.replace_snapshot(&entries)?;
        info!(
            "{} listed on {} -> {} after filters",
            report.source_listed,
            self.source.label(),
            report.source_eligible
        );
        Ok(eligible)
    }

    fn replicate_missing(
        &self,
        eligible: &[Item],
        reporter: &dyn ProgressReporter,
        report: &mut PassReport,
    ) -> Result<(), Error> {
        let destination_ids: HashSet<String> = self
            .destination
            .list(None)?
            .into_iter()
            .map(|item| item.id)
            .collect();
        let blacklist = self.db.blacklist_ids()?;
        report.destination_listed = destination_ids.len();

        let missing: Vec<&Item> = eligible
            .iter()
            .filter(|item| !destination_ids.contains(&item.id))
            .collect();
        let to_replicate: Vec<&Item> = missing
            .iter()
            .copied()
            .filter(|item| !blacklist.contains(&item.id))
            .collect();
        report.skipped_blacklisted = missing.len() - to_replicate.len();
        report.to_replicate = to_replicate.len();

        info!(
            "{} on {}, {} blacklisted, {} to replicate",
            destination_ids.len(),
            self.destination.label(),
            blacklist.len(),
            to_replicate.len()
        );
        if report.skipped_blacklisted > 0 {
            info!("{} items skipped (blacklist)", report.skipped_blacklisted);
        }
        if to_replicate.is_empty() {
            return Ok(());
        }

        report.categories_created = self.sync_categories();

        let verifier = self.verifier();
        let interval = self.config.replication.sync_interval();
        let batch = self.run_items(
            Phase::Replication,
            &to_replicate,
            interval,
            reporter,
            |item| {
                verifier
                    .replicate(self.source, self.destination, item)
                    .then(|| ReplicationRecord::from(*item))
            },
        );

        report.replicated = batch.succeeded.len();
        report.replication_failed = batch.failed;
        self.db.add_replications(&batch.succeeded)?;
        info!(
            "Replicated: {} | Failed: {}",
            report.replicated, report.replication_failed
        );
        Ok(())
    }

    fn evict_orphans(
        &self,
        universe: &HashSet<String>,
        reporter: &dyn ProgressReporter,
        report: &mut PassReport,
    ) -> Result<(), Error> {
        let current = self.destination.list(None)?;
        let orphans: Vec<&Item> = current
            .iter()
            .filter(|item| !universe.contains(&item.id))
            .collect();
        report.orphans_found = orphans.len();
        if orphans.is_empty() {
            info!("No orphans");
            return Ok(());
        }
        info!("{} orphans detected", orphans.len());

        let verifier = self.verifier();
        let delete_files = self.config.replication.cleanup_mode.deletes_files();
        let batch = self.run_items(
            Phase::OrphanEviction,
            &orphans,
            ORPHAN_INTERVAL,
            reporter,
            |item| {
                verifier
                    .delete(self.destination, item, delete_files)
                    .then(|| RemovedItem::from(*item))
            },
        );

        report.orphans_removed = batch.succeeded.len();
        report.orphans_failed = batch.failed;
        self.db.remove_replications(&batch.succeeded)?;
        info!(
            "Orphans removed ({}): {} | Failed: {}",
            self.config.replication.cleanup_mode, report.orphans_removed, report.orphans_failed
        );
        Ok(())
    }

    fn settle(&self, reporter: &dyn ProgressReporter) {
        info!(
            "Waiting {}s for {} to settle",
            self.settle_delay.as_secs(),
            self.destination.label()
        );
        let tick = Duration::from_secs(1);
        let mut remaining = self.settle_delay;
        while !remaining.is_zero() {
            reporter.on_settle_tick(remaining.as_secs().max(1));
            let wait = remaining.min(tick);
            self.sleeper.sleep(wait);
            remaining -= wait;
        }
    }

    fn evict_unwanted(
        &self,
        reporter: &dyn ProgressReporter,
        report: &mut PassReport,
    ) -> Result<(), Error> {
        let current = self.destination.list(None)?;

        let mut transferring: Vec<(&Item, UnwantedState)> = Vec::new();
        let mut errored: Vec<(&Item, UnwantedState)> = Vec::new();
        for item in &current {
            match UnwantedState::classify(&item.state) {
                Some(UnwantedState::Transferring) => {
                    transferring.push((item, UnwantedState::Transferring))
                }
                Some(state @ UnwantedState::Errored(_)) => errored.push((item, state)),
                None => {}
            }
        }
        report.unwanted_transferring = transferring.len();
        report.unwanted_errored = errored.len();

        let unwanted: Vec<(&Item, UnwantedState)> =
            transferring.into_iter().chain(errored).collect();
        if unwanted.is_empty() {
            info!("No unwanted items");
            return Ok(());
        }
        info!(
            "{} unwanted items ({} transferring, {} errored)",
            unwanted.len(),
            report.unwanted_transferring,
            report.unwanted_errored
        );

        let verifier = self.verifier();
        let batch = self.run_items(
            Phase::UnwantedEviction,
            &unwanted,
            UNWANTED_INTERVAL,
            reporter,
            |(item, state)| {
                if !verifier.delete(self.destination, item, false) {
                    return None;
                }
                debug!(id = %item.id, "Removed unwanted item ({})", state.reason());
                Some((
                    RemovedItem::from(*item),
                    BlacklistCandidate {
                        id: item.id.clone(),
                        display_name: item.name.clone(),
                        reason: state.reason(),
                    },
                ))
            },
        );

        report.unwanted_removed = batch.succeeded.len();
        report.unwanted_failed = batch.failed;

        let (removed, candidates): (Vec<RemovedItem>, Vec<BlacklistCandidate>) =
            batch.succeeded.into_iter().unzip();
        self.db.remove_replications(&removed)?;
        self.db.upsert_blacklist(&candidates)?;
        info!(
            "Unwanted removed and blacklisted: {} | Failed: {}",
            report.unwanted_removed, report.unwanted_failed
        );
        Ok(())
    }

    /// Apply `action` to each entry in order, waiting `interval` between entries.
    fn run_items<E, T, F>(
        &self,
        phase: Phase,
        entries: &[E],
        interval: Duration,
        reporter: &dyn ProgressReporter,
        mut action: F,
    ) -> ItemBatch<T>
    where
        E: ItemRef,
        F: FnMut(&E) -> Option<T>,
    {
        let total = entries.len();
        let mut batch = ItemBatch {
            succeeded: Vec::with_capacity(total),
            failed: 0,
        };
        reporter.on_items_start(phase, total);

        for (idx, entry) in entries.iter().enumerate() {
            reporter.on_item_progress(phase, idx + 1, total, &entry.item().name);
            match action(entry) {
                Some(value) => batch.succeeded.push(value),
                None => batch.failed += 1,
            }
            if idx + 1 < total {
                self.sleeper.sleep(interval);
            }
        }

        reporter.on_items_complete(phase, batch.succeeded.len(), batch.failed);
        batch
    }

    /// Create every source category missing on the destination. Failures are logged only.
    fn sync_categories(&self) -> usize {
        match self.try_sync_categories() {
            Ok(created) => created,
            Err(err) => {
                warn!("Category sync failed: {}", err);
                0
            }
        }
    }

    fn try_sync_categories(&self) -> Result<usize, Error> {
        let source_categories = self.source.list_categories()?;
        let destination_categories = self.destination.list_categories()?;

        let mut created = 0;
        for (name, category) in &source_categories {
            if !self.config.policy.allows_category(name)
                || destination_categories.contains_key(name)
            {
                continue;
            }
            self.destination.create_category(name, &category.save_path)?;
            info!("Created category '{}' on {}", name, self.destination.label());
            created += 1;
        }
        if created == 0 {
            debug!("Categories already in sync");
        }
        Ok(created)
    }

    /// Reconcile a single id (e.g. from a "torrent finished" hook). Never evicts anything.
    ///
    /// Info-hashes are matched case-insensitively by the WebUI, so `id` is
    /// lowercased before any lookup and the blacklist is checked again against
    /// the id the source actually returned.
    pub fn run_single(
        &self,
        id: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<SingleOutcome, Error> {
        let id = id.trim().to_ascii_lowercase();
        let id = id.as_str();
        if self.db.is_blacklisted(id)? {
            info!(id, "Item is blacklisted, skipping");
            return Ok(SingleOutcome::Blacklisted);
        }

        let item = match self.source.list_by_ids(&[id])?.into_iter().next() {
            Some(item) => item,
            None => {
                warn!(id, "Item not found on {}", self.source.label());
                return Ok(SingleOutcome::NotFound);
            }
        };
        if item.id != id && self.db.is_blacklisted(&item.id)? {
            info!(id = %item.id, "Item is blacklisted, skipping");
            return Ok(SingleOutcome::Blacklisted);
        }

        if let Verdict::Rejected(rejection) = policy::eligible(&item, &self.config.policy) {
            info!(id, "Filtered: {}", rejection);
            return Ok(SingleOutcome::Filtered(rejection.to_string()));
        }

        if self.destination.contains(&item.id)? {
            info!(id, "Already present on {}", self.destination.label());
            return Ok(SingleOutcome::AlreadyPresent);
        }

        self.sync_categories();

        info!(
            "Replicating '{}' ({:.2} GB, ratio {:.2})",
            item.name,
            item.size_bytes as f64 / crate::GIB,
            item.ratio
        );
        let verifier = self.verifier();
        let batch = self.run_items(
            Phase::Replication,
            &[&item],
            Duration::ZERO,
            reporter,
            |item| {
                verifier
                    .replicate(self.source, self.destination, item)
                    .then(|| ReplicationRecord::from(*item))
            },
        );

        if batch.succeeded.is_empty() {
            return Ok(SingleOutcome::Failed);
        }
        self.db.add_replications(&batch.succeeded)?;
        Ok(SingleOutcome::Replicated)
    }
}

/// Anything the per-item loop can name in progress output.
trait ItemRef {
    fn item(&self) -> &Item;
}

impl ItemRef for &Item {
    fn item(&self) -> &Item {
        *self
    }
}

impl ItemRef for (&Item, UnwantedState) {
    fn item(&self) -> &Item {
        self.0
    }
}

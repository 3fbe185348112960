//! Remote writes confirmed by observation.
//!
//! A replicate or delete only counts once a follow-up listing of the
//! destination shows the expected presence or absence. The return value of
//! the write call itself is never trusted on its own.

use tracing::{debug, error};

use crate::config::ReplicationConfig;
use crate::error::RemoteError;
use crate::remote::{AddOptions, AddStatus, Item, RemoteEndpoint};
use crate::retry::{poll_until, RetryPolicy, Sleeper};

pub struct Verifier<'a> {
    replication: &'a ReplicationConfig,
    sleeper: &'a dyn Sleeper,
    retry: RetryPolicy,
}

impl<'a> Verifier<'a> {
    pub fn new(replication: &'a ReplicationConfig, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            replication,
            sleeper,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn add_options(&self, item: &Item) -> AddOptions {
        AddOptions {
            save_path: item.save_path.clone(),
            category: item.category.clone(),
            tags: item.tags.clone(),
            skip_checking: self.replication.skip_checking,
            paused: self.replication.start_paused,
            auto_managed: item.auto_managed,
        }
    }

    /// Export `item` from `source`, add it to `destination` and wait until the
    /// destination lists it. Returns false on any failure.
    pub fn replicate(
        &self,
        source: &dyn RemoteEndpoint,
        destination: &dyn RemoteEndpoint,
        item: &Item,
    ) -> bool {
        match self.try_replicate(source, destination, item) {
            Ok(true) => {
                if self.replication.force_active {
                    self.force_active(destination, item);
                }
                true
            }
            Ok(false) => false,
            Err(err) => {
                error!(id = %item.id, "Replication of '{}' failed: {}", item.name, err);
                false
            }
        }
    }

    fn try_replicate(
        &self,
        source: &dyn RemoteEndpoint,
        destination: &dyn RemoteEndpoint,
        item: &Item,
    ) -> Result<bool, RemoteError> {
        let blob = source.export(&item.id)?;
        if blob.is_empty() {
            error!(id = %item.id, "Export from {} returned an empty file", source.label());
            return Ok(false);
        }

        match destination.add(&blob, &self.add_options(item))? {
            AddStatus::Accepted => {}
            AddStatus::Rejected(answer) => {
                error!(id = %item.id, "{} refused the item: {}", destination.label(), answer);
                return Ok(false);
            }
        }

        let confirmed = poll_until(self.retry, self.sleeper, |attempt| {
            debug!(id = %item.id, attempt, "Checking presence on {}", destination.label());
            destination.contains(&item.id)
        })?;
        if !confirmed {
            error!(
                id = %item.id,
                "Replication unconfirmed after {} checks",
                self.retry.max_attempts
            );
        }
        Ok(confirmed)
    }

    /// Best-effort: a failure here never undoes a confirmed replication.
    fn force_active(&self, destination: &dyn RemoteEndpoint, item: &Item) {
        match destination.set_force_active(&[item.id.as_str()], true) {
            Ok(()) => debug!(id = %item.id, "Force start enabled"),
            Err(err) => error!(id = %item.id, "Force start failed: {}", err),
        }
    }

    /// Delete `item` from `destination` and wait until it is no longer listed.
    pub fn delete(
        &self,
        destination: &dyn RemoteEndpoint,
        item: &Item,
        delete_files: bool,
    ) -> bool {
        match self.try_delete(destination, item, delete_files) {
            Ok(confirmed) => confirmed,
            Err(err) => {
                error!(id = %item.id, "Deletion of '{}' failed: {}", item.name, err);
                false
            }
        }
    }

    fn try_delete(
        &self,
        destination: &dyn RemoteEndpoint,
        item: &Item,
        delete_files: bool,
    ) -> Result<bool, RemoteError> {
        destination.delete(&[item.id.as_str()], delete_files)?;

        let confirmed = poll_until(self.retry, self.sleeper, |attempt| {
            debug!(id = %item.id, attempt, "Checking absence on {}", destination.label());
            destination.contains(&item.id).map(|present| !present)
        })?;
        if !confirmed {
            error!(
                id = %item.id,
                "Deletion unconfirmed after {} checks",
                self.retry.max_attempts
            );
        }
        Ok(confirmed)
    }
}

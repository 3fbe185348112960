use super::models::*;
use super::sqlite::Database;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Result, Transaction};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// UTC timestamp with second precision; sorts lexicographically.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn insert_audit_rows<'a, I>(tx: &Transaction<'_>, operation: AuditOperation, rows: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str, Option<String>)>,
{
    let now = now_timestamp();
    let mut stmt = tx.prepare_cached(
        "INSERT INTO audit_log (timestamp, operation, item_id, item_name, details) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (item_id, item_name, details) in rows {
        stmt.execute(params![now, operation.as_str(), item_id, item_name, details])?;
    }
    Ok(())
}

fn collect_ids(db: &Database, sql: &str) -> Result<HashSet<String>> {
    let mut stmt = db.connection().prepare(sql)?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<HashSet<String>>>()?;
    Ok(ids)
}

impl Database {
    // ── Source Snapshot ──────────────────────────────────────────

    /// Replace the whole snapshot with `entries` in one transaction.
    pub fn replace_snapshot(&self, entries: &[SnapshotEntry]) -> Result<usize> {
        let now = now_timestamp();
        let count = self.with_transaction(|tx| {
            tx.execute("DELETE FROM source_snapshot", [])?;
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO source_snapshot \
                 (id, name, category, size_bytes, state, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut count = 0;
            for entry in entries {
                count += stmt.execute(params![
                    entry.id,
                    entry.display_name,
                    entry.category,
                    entry.size_bytes,
                    entry.state,
                    now,
                ])?;
            }
            Ok(count)
        })?;
        debug!("Replaced source snapshot with {} entries", count);
        Ok(count)
    }

    pub fn snapshot_ids(&self) -> Result<HashSet<String>> {
        collect_ids(self, "SELECT id FROM source_snapshot")
    }

    // ── Blacklist ────────────────────────────────────────────────

    pub fn blacklist_ids(&self) -> Result<HashSet<String>> {
        collect_ids(self, "SELECT id FROM blacklist_entry")
    }

    pub fn is_blacklisted(&self, id: &str) -> Result<bool> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM blacklist_entry WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_blacklist_entry(&self, id: &str) -> Result<Option<BlacklistEntry>> {
        self.connection()
            .query_row(
                "SELECT id, name, reason, blacklisted_at, attempt_count \
                 FROM blacklist_entry WHERE id = ?1",
                params![id],
                |row| {
                    Ok(BlacklistEntry {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        reason: row.get(2)?,
                        blacklisted_at: row.get(3)?,
                        attempt_count: row.get(4)?,
                    })
                },
            )
            .optional()
    }

    pub fn list_blacklist(&self) -> Result<Vec<BlacklistEntry>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, name, reason, blacklisted_at, attempt_count \
             FROM blacklist_entry ORDER BY blacklisted_at DESC, id",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(BlacklistEntry {
                    id: row.get(0)?,
                    display_name: row.get(1)?,
                    reason: row.get(2)?,
                    blacklisted_at: row.get(3)?,
                    attempt_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Insert or refresh blacklist entries. A conflict bumps `attempt_count`
    /// and refreshes `reason` and `blacklisted_at`. One BLACKLIST audit row per item.
    pub fn upsert_blacklist(&self, candidates: &[BlacklistCandidate]) -> Result<usize> {
        if candidates.is_empty() {
            return Ok(0);
        }
        let now = now_timestamp();
        let count = self.with_transaction(|tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO blacklist_entry (id, name, reason, blacklisted_at, attempt_count) \
                 VALUES (?1, ?2, ?3, ?4, 1) \
                 ON CONFLICT(id) DO UPDATE SET \
                     attempt_count = attempt_count + 1, \
                     blacklisted_at = excluded.blacklisted_at, \
                     reason = excluded.reason, \
                     name = excluded.name",
            )?;
            let mut count = 0;
            for candidate in candidates {
                count += stmt.execute(params![
                    candidate.id,
                    candidate.display_name,
                    candidate.reason,
                    now,
                ])?;
            }
            insert_audit_rows(
                tx,
                AuditOperation::Blacklist,
                candidates.iter().map(|c| {
                    (
                        c.id.as_str(),
                        c.display_name.as_str(),
                        Some(format!("reason: {}", c.reason)),
                    )
                }),
            )?;
            Ok(count)
        })?;
        debug!("Upserted {} blacklist entries", count);
        Ok(count)
    }

    /// Remove every blacklist entry whose id is not in `keep`, auditing each removal.
    pub fn prune_blacklist(&self, keep: &HashSet<String>) -> Result<usize> {
        let removed = self.with_transaction(|tx| {
            let stale: Vec<(String, String)> = {
                let mut stmt = tx.prepare("SELECT id, name FROM blacklist_entry")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<(String, String)>>>()?;
                rows.into_iter().filter(|(id, _)| !keep.contains(id)).collect()
            };

            if stale.is_empty() {
                return Ok(0);
            }

            {
                let mut stmt = tx.prepare_cached("DELETE FROM blacklist_entry WHERE id = ?1")?;
                for (id, _) in &stale {
                    stmt.execute(params![id])?;
                }
            }
            insert_audit_rows(
                tx,
                AuditOperation::Unblacklist,
                stale.iter().map(|(id, name)| {
                    (
                        id.as_str(),
                        name.as_str(),
                        Some("no longer present on source".to_string()),
                    )
                }),
            )?;
            Ok(stale.len())
        })?;
        if removed > 0 {
            debug!("Pruned {} blacklist entries", removed);
        }
        Ok(removed)
    }

    // ── Replication Records ──────────────────────────────────────

    /// Record confirmed replications. Already-recorded ids are left untouched.
    pub fn add_replications(&self, records: &[ReplicationRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let now = now_timestamp();
        let count = self.with_transaction(|tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO replication_record \
                 (id, name, category, size_bytes, replicated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut count = 0;
            for record in records {
                count += stmt.execute(params![
                    record.id,
                    record.display_name,
                    record.category,
                    record.size_bytes,
                    now,
                ])?;
            }
            insert_audit_rows(
                tx,
                AuditOperation::Replicate,
                records.iter().map(|r| {
                    (
                        r.id.as_str(),
                        r.display_name.as_str(),
                        Some(format!("category: {}", r.category)),
                    )
                }),
            )?;
            Ok(count)
        })?;
        debug!("Recorded {} replications", count);
        Ok(count)
    }

    /// Forget items confirmed gone from the destination.
    pub fn remove_replications(&self, items: &[RemovedItem]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let count = self.with_transaction(|tx| {
            let mut stmt = tx.prepare_cached("DELETE FROM replication_record WHERE id = ?1")?;
            let mut count = 0;
            for item in items {
                count += stmt.execute(params![item.id])?;
            }
            insert_audit_rows(
                tx,
                AuditOperation::Delete,
                items
                    .iter()
                    .map(|i| (i.id.as_str(), i.display_name.as_str(), None)),
            )?;
            Ok(count)
        })?;
        debug!("Removed {} replication records", count);
        Ok(count)
    }

    pub fn is_replicated(&self, id: &str) -> Result<bool> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM replication_record WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_replication(&self, id: &str) -> Result<Option<ReplicationRecord>> {
        self.connection()
            .query_row(
                "SELECT id, name, category, size_bytes, replicated_at \
                 FROM replication_record WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ReplicationRecord {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        category: row.get(2)?,
                        size_bytes: row.get(3)?,
                        replicated_at: row.get(4)?,
                    })
                },
            )
            .optional()
    }

    // ── Audit Log ────────────────────────────────────────────────

    /// Most recent audit rows, newest first.
    pub fn recent_audit(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        let mut stmt = self.connection().prepare(
            "SELECT sequence_id, timestamp, operation, item_id, item_name, details \
             FROM audit_log ORDER BY sequence_id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditLogEntry {
                    sequence_id: row.get(0)?,
                    timestamp: row.get(1)?,
                    operation: row.get(2)?,
                    item_id: row.get(3)?,
                    item_name: row.get(4)?,
                    details: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn audit_count(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
    }

    // ── Statistics ───────────────────────────────────────────────

    pub fn stats(&self) -> Result<StoreStats> {
        let (snapshot_count, snapshot_bytes): (i64, i64) = self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM source_snapshot",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (replicated_count, replicated_bytes): (i64, i64) = self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM replication_record",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let blacklist_count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM blacklist_entry",
            [],
            |row| row.get(0),
        )?;

        let cutoff = (Utc::now() - ChronoDuration::hours(24))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut stmt = self.connection().prepare(
            "SELECT operation, COUNT(*) FROM audit_log \
             WHERE timestamp > ?1 GROUP BY operation",
        )?;
        let operations_24h = stmt
            .query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<String, i64>>>()?;

        Ok(StoreStats {
            snapshot_count,
            snapshot_bytes,
            replicated_count,
            replicated_bytes,
            blacklist_count,
            operations_24h,
        })
    }
}

//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawl::FailureClass;
use crate::diff::DiffKind;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    CrawlJobRecord, DiffRecord, DlqRecord, JobStatus, SnapshotRecord, SourceRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn source_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceRecord> {
        Ok(SourceRecord {
            id: row.get(0)?,
            url: row.get(1)?,
            name: row.get(2)?,
            allowed_host: row.get(3)?,
            etag: row.get(4)?,
            last_modified: row.get(5)?,
            last_crawl_at: row.get(6)?,
            is_active: row.get(7)?,
            crawl_frequency_ms: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CrawlJobRecord> {
        Ok(CrawlJobRecord {
            id: row.get(0)?,
            source_id: row.get(1)?,
            status: JobStatus::from_db_string(&row.get::<_, String>(2)?)
                .unwrap_or(JobStatus::Failed),
            attempt: row.get(3)?,
            trace_id: row.get(4)?,
            failure_class: row
                .get::<_, Option<String>>(5)?
                .and_then(|s| FailureClass::from_db_string(&s)),
            error_message: row.get(6)?,
            fetch_status: row.get(7)?,
            review_required: row.get(8)?,
            quality_json: row.get(9)?,
            config_hash: row.get(10)?,
            started_at: row.get(11)?,
            finished_at: row.get(12)?,
        })
    }

    fn snapshot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotRecord> {
        Ok(SnapshotRecord {
            id: row.get(0)?,
            source_id: row.get(1)?,
            fetched_at: row.get(2)?,
            http_status: row.get(3)?,
            content_hash: row.get(4)?,
            ingestion_key: row.get(5)?,
            raw_content: row.get(6)?,
            headers_json: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn diff_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiffRecord> {
        Ok(DiffRecord {
            id: row.get(0)?,
            source_id: row.get(1)?,
            old_snapshot_id: row.get(2)?,
            new_snapshot_id: row.get(3)?,
            kind: DiffKind::from_db_string(&row.get::<_, String>(4)?).unwrap_or(DiffKind::Text),
            score: row.get(5)?,
            changes_json: row.get(6)?,
            reviewed: row.get(7)?,
            reviewed_by: row.get(8)?,
            reviewed_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn dlq_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DlqRecord> {
        Ok(DlqRecord {
            id: row.get(0)?,
            source_id: row.get(1)?,
            job_id: row.get(2)?,
            reason: row.get(3)?,
            failure_class: FailureClass::from_db_string(&row.get::<_, String>(4)?)
                .unwrap_or(FailureClass::Permanent),
            attempt: row.get(5)?,
            replay_count: row.get(6)?,
            resolved_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

const SOURCE_COLUMNS: &str = "id, url, name, allowed_host, etag, last_modified, last_crawl_at,
     is_active, crawl_frequency_ms, created_at";

const JOB_COLUMNS: &str = "id, source_id, status, attempt, trace_id, failure_class, error_message,
     fetch_status, review_required, quality_json, config_hash, started_at, finished_at";

const SNAPSHOT_COLUMNS: &str = "id, source_id, fetched_at, http_status, content_hash,
     ingestion_key, raw_content, headers_json, created_at";

const DIFF_COLUMNS: &str = "id, source_id, old_snapshot_id, new_snapshot_id, kind, score,
     changes_json, reviewed, reviewed_by, reviewed_at, created_at";

const DLQ_COLUMNS: &str = "id, source_id, job_id, reason, failure_class, attempt, replay_count,
     resolved_at, created_at";

impl Storage for SqliteStorage {
    // ===== Sources =====

    fn insert_source(&mut self, source: &SourceRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO sources (id, url, name, allowed_host, etag, last_modified, last_crawl_at,
             is_active, crawl_frequency_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                source.id,
                source.url,
                source.name,
                source.allowed_host,
                source.etag,
                source.last_modified,
                source.last_crawl_at,
                source.is_active,
                source.crawl_frequency_ms,
                source.created_at,
            ],
        )?;
        Ok(())
    }

    fn find_source(&self, source_id: &str) -> StorageResult<Option<SourceRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1"))?;
        Ok(stmt
            .query_row(params![source_id], Self::source_from_row)
            .optional()?)
    }

    fn find_source_by_url(&self, url: &str) -> StorageResult<Option<SourceRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE url = ?1"))?;
        Ok(stmt
            .query_row(params![url], Self::source_from_row)
            .optional()?)
    }

    fn list_active_sources(&self) -> StorageResult<Vec<SourceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE is_active = 1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([], Self::source_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn list_due_sources(&self, now: DateTime<Utc>) -> StorageResult<Vec<SourceRecord>> {
        let sources = self.list_active_sources()?;
        Ok(sources.into_iter().filter(|s| s.is_due(now)).collect())
    }

    fn update_crawl_state(
        &mut self,
        source_id: &str,
        last_crawl_at: DateTime<Utc>,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE sources SET last_crawl_at = ?1,
             etag = COALESCE(?2, etag),
             last_modified = COALESCE(?3, last_modified)
             WHERE id = ?4",
            params![last_crawl_at, etag, last_modified, source_id],
        )?;
        if updated == 0 {
            return Err(StorageError::SourceNotFound(source_id.to_string()));
        }
        Ok(())
    }

    fn set_source_active(&mut self, source_id: &str, active: bool) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE sources SET is_active = ?1 WHERE id = ?2",
            params![active, source_id],
        )?;
        if updated == 0 {
            return Err(StorageError::SourceNotFound(source_id.to_string()));
        }
        Ok(())
    }

    // ===== Crawl jobs =====

    fn create_job(&mut self, job: &CrawlJobRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO crawl_jobs (id, source_id, status, attempt, trace_id, failure_class,
             error_message, fetch_status, review_required, quality_json, config_hash,
             started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                job.id,
                job.source_id,
                job.status.to_db_string(),
                job.attempt,
                job.trace_id,
                job.failure_class.map(|c| c.to_db_string()),
                job.error_message,
                job.fetch_status,
                job.review_required,
                job.quality_json,
                job.config_hash,
                job.started_at,
                job.finished_at,
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> StorageResult<Option<CrawlJobRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {JOB_COLUMNS} FROM crawl_jobs WHERE id = ?1"))?;
        Ok(stmt
            .query_row(params![job_id], Self::job_from_row)
            .optional()?)
    }

    fn count_jobs_for_source(&self, source_id: &str) -> StorageResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_jobs WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn mark_job_succeeded(
        &mut self,
        job_id: &str,
        fetch_status: u16,
        review_required: bool,
        quality_json: Option<&str>,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawl_jobs SET status = ?1, fetch_status = ?2, review_required = ?3,
             quality_json = ?4, finished_at = ?5 WHERE id = ?6",
            params![
                JobStatus::Succeeded.to_db_string(),
                fetch_status,
                review_required,
                quality_json,
                Utc::now(),
                job_id,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }

    fn mark_job_failed(
        &mut self,
        job_id: &str,
        failure_class: FailureClass,
        error_message: &str,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawl_jobs SET status = ?1, failure_class = ?2, error_message = ?3,
             finished_at = ?4 WHERE id = ?5",
            params![
                JobStatus::Failed.to_db_string(),
                failure_class.to_db_string(),
                error_message,
                Utc::now(),
                job_id,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }

    fn mark_job_policy_blocked(&mut self, job_id: &str, error_message: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawl_jobs SET status = ?1, failure_class = ?2, error_message = ?3,
             finished_at = ?4 WHERE id = ?5",
            params![
                JobStatus::PolicyBlocked.to_db_string(),
                FailureClass::PolicyBlocked.to_db_string(),
                error_message,
                Utc::now(),
                job_id,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }

    fn count_jobs_by_status(&self, status: JobStatus) -> StorageResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_jobs WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ===== Snapshots =====

    fn insert_snapshot_idempotent(
        &mut self,
        snapshot: &SnapshotRecord,
    ) -> StorageResult<(String, bool)> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM crawl_snapshots WHERE ingestion_key = ?1",
                params![snapshot.ingestion_key],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok((id, false));
        }

        let insert = self.conn.execute(
            "INSERT INTO crawl_snapshots (id, source_id, fetched_at, http_status, content_hash,
             ingestion_key, raw_content, headers_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                snapshot.id,
                snapshot.source_id,
                snapshot.fetched_at,
                snapshot.http_status,
                snapshot.content_hash,
                snapshot.ingestion_key,
                snapshot.raw_content,
                snapshot.headers_json,
                snapshot.created_at,
            ],
        );

        match insert {
            Ok(_) => Ok((snapshot.id.clone(), true)),
            // Lost a race on the UNIQUE key: the row exists, fetch its id
            Err(e) if is_unique_violation(&e) => {
                let id: String = self.conn.query_row(
                    "SELECT id FROM crawl_snapshots WHERE ingestion_key = ?1",
                    params![snapshot.ingestion_key],
                    |row| row.get(0),
                )?;
                Ok((id, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn latest_snapshot(&self, source_id: &str) -> StorageResult<Option<SnapshotRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM crawl_snapshots WHERE source_id = ?1
             ORDER BY fetched_at DESC LIMIT 1"
        ))?;
        Ok(stmt
            .query_row(params![source_id], Self::snapshot_from_row)
            .optional()?)
    }

    fn count_snapshots_for_source(&self, source_id: &str) -> StorageResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_snapshots WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ===== Diffs =====

    fn insert_diff(&mut self, diff: &DiffRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO diffs (id, source_id, old_snapshot_id, new_snapshot_id, kind, score,
             changes_json, reviewed, reviewed_by, reviewed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                diff.id,
                diff.source_id,
                diff.old_snapshot_id,
                diff.new_snapshot_id,
                diff.kind.to_db_string(),
                diff.score,
                diff.changes_json,
                diff.reviewed,
                diff.reviewed_by,
                diff.reviewed_at,
                diff.created_at,
            ],
        )?;
        Ok(())
    }

    fn diffs_for_source(&self, source_id: &str) -> StorageResult<Vec<DiffRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DIFF_COLUMNS} FROM diffs WHERE source_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![source_id], Self::diff_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ===== Dead-letter queue =====

    fn create_dlq_entry(&mut self, entry: &DlqRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO dlq_entries (id, source_id, job_id, reason, failure_class, attempt,
             replay_count, resolved_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id,
                entry.source_id,
                entry.job_id,
                entry.reason,
                entry.failure_class.to_db_string(),
                entry.attempt,
                entry.replay_count,
                entry.resolved_at,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_dlq_entry(&self, dlq_id: &str) -> StorageResult<Option<DlqRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {DLQ_COLUMNS} FROM dlq_entries WHERE id = ?1"))?;
        Ok(stmt
            .query_row(params![dlq_id], Self::dlq_from_row)
            .optional()?)
    }

    fn find_unresolved_by_source(&self, source_id: &str) -> StorageResult<Vec<DlqRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DLQ_COLUMNS} FROM dlq_entries
             WHERE source_id = ?1 AND resolved_at IS NULL ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![source_id], Self::dlq_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn mark_dlq_replayed(&mut self, dlq_id: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE dlq_entries SET replay_count = replay_count + 1 WHERE id = ?1",
            params![dlq_id],
        )?;
        if updated == 0 {
            return Err(StorageError::DlqEntryNotFound(dlq_id.to_string()));
        }
        Ok(())
    }

    fn resolve_dlq_entry(&mut self, dlq_id: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE dlq_entries SET resolved_at = ?1 WHERE id = ?2",
            params![at, dlq_id],
        )?;
        if updated == 0 {
            return Err(StorageError::DlqEntryNotFound(dlq_id.to_string()));
        }
        Ok(())
    }

    fn count_unresolved_dlq(&self) -> StorageResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dlq_entries WHERE resolved_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// True when a rusqlite error is a UNIQUE/constraint violation
fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ingestion_key;

    fn storage_with_source() -> (SqliteStorage, SourceRecord) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let source = SourceRecord::new_for_test("https://energy.example.gov/rebates");
        storage.insert_source(&source).unwrap();
        (storage, source)
    }

    #[test]
    fn test_insert_and_find_source() {
        let (storage, source) = storage_with_source();

        let found = storage.find_source(&source.id).unwrap().unwrap();
        assert_eq!(found.url, source.url);
        assert!(found.is_active);
        assert!(found.etag.is_none());

        assert!(storage.find_source("missing").unwrap().is_none());
    }

    #[test]
    fn test_find_source_by_url() {
        let (storage, source) = storage_with_source();
        let found = storage.find_source_by_url(&source.url).unwrap().unwrap();
        assert_eq!(found.id, source.id);
    }

    #[test]
    fn test_update_crawl_state_sets_validators() {
        let (mut storage, source) = storage_with_source();
        let now = Utc::now();

        storage
            .update_crawl_state(&source.id, now, Some("etag-1"), Some("Mon, 01 Jan 2026"))
            .unwrap();

        let found = storage.find_source(&source.id).unwrap().unwrap();
        assert_eq!(found.etag.as_deref(), Some("etag-1"));
        assert_eq!(found.last_modified.as_deref(), Some("Mon, 01 Jan 2026"));
        assert!(found.last_crawl_at.is_some());
    }

    #[test]
    fn test_update_crawl_state_preserves_validators_on_none() {
        let (mut storage, source) = storage_with_source();
        let now = Utc::now();

        storage
            .update_crawl_state(&source.id, now, Some("etag-1"), None)
            .unwrap();
        // A 304-style update carries no new validators
        storage
            .update_crawl_state(&source.id, now, None, None)
            .unwrap();

        let found = storage.find_source(&source.id).unwrap().unwrap();
        assert_eq!(found.etag.as_deref(), Some("etag-1"));
    }

    #[test]
    fn test_deactivate_source() {
        let (mut storage, source) = storage_with_source();
        storage.set_source_active(&source.id, false).unwrap();

        let found = storage.find_source(&source.id).unwrap().unwrap();
        assert!(!found.is_active);
        assert!(storage.list_active_sources().unwrap().is_empty());
    }

    #[test]
    fn test_list_due_sources() {
        let (mut storage, source) = storage_with_source();
        let now = Utc::now();

        // Never crawled: due
        assert_eq!(storage.list_due_sources(now).unwrap().len(), 1);

        // Just crawled: not due for another 60s
        storage
            .update_crawl_state(&source.id, now, None, None)
            .unwrap();
        assert!(storage.list_due_sources(now).unwrap().is_empty());

        let later = now + chrono::Duration::milliseconds(61_000);
        assert_eq!(storage.list_due_sources(later).unwrap().len(), 1);
    }

    #[test]
    fn test_job_lifecycle() {
        let (mut storage, source) = storage_with_source();

        let job = CrawlJobRecord::start(&source.id, 1, "trace-1", None);
        storage.create_job(&job).unwrap();

        let found = storage.get_job(&job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Running);
        assert!(found.finished_at.is_none());

        storage
            .mark_job_succeeded(&job.id, 200, false, Some("{\"completeness\":1.0}"))
            .unwrap();
        let found = storage.get_job(&job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Succeeded);
        assert_eq!(found.fetch_status, Some(200));
        assert_eq!(found.review_required, Some(false));
        assert!(found.finished_at.is_some());
    }

    #[test]
    fn test_job_failure_records_class() {
        let (mut storage, source) = storage_with_source();

        let job = CrawlJobRecord::start(&source.id, 2, "trace-2", None);
        storage.create_job(&job).unwrap();
        storage
            .mark_job_failed(&job.id, FailureClass::Transient, "request timeout")
            .unwrap();

        let found = storage.get_job(&job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Failed);
        assert_eq!(found.failure_class, Some(FailureClass::Transient));
        assert_eq!(found.error_message.as_deref(), Some("request timeout"));
    }

    #[test]
    fn test_job_policy_blocked() {
        let (mut storage, source) = storage_with_source();

        let job = CrawlJobRecord::start(&source.id, 1, "trace-3", None);
        storage.create_job(&job).unwrap();
        storage
            .mark_job_policy_blocked(&job.id, "disallowed by robots.txt")
            .unwrap();

        let found = storage.get_job(&job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::PolicyBlocked);
        assert_eq!(found.failure_class, Some(FailureClass::PolicyBlocked));
    }

    #[test]
    fn test_count_jobs() {
        let (mut storage, source) = storage_with_source();

        for i in 0..3 {
            let job = CrawlJobRecord::start(&source.id, i + 1, "t", None);
            storage.create_job(&job).unwrap();
        }

        assert_eq!(storage.count_jobs_for_source(&source.id).unwrap(), 3);
        assert_eq!(storage.count_jobs_by_status(JobStatus::Running).unwrap(), 3);
    }

    #[test]
    fn test_snapshot_idempotent_insert() {
        let (mut storage, source) = storage_with_source();
        let fetched_at = Utc::now();

        let first =
            SnapshotRecord::from_fetch(&source.id, fetched_at, 200, "page body".into(), None);
        let (id1, created1) = storage.insert_snapshot_idempotent(&first).unwrap();
        assert!(created1);
        assert_eq!(id1, first.id);

        // Same source, content, and fetch time: same ingestion key
        let replay =
            SnapshotRecord::from_fetch(&source.id, fetched_at, 200, "page body".into(), None);
        let (id2, created2) = storage.insert_snapshot_idempotent(&replay).unwrap();
        assert!(!created2);
        assert_eq!(id2, first.id);

        assert_eq!(storage.count_snapshots_for_source(&source.id).unwrap(), 1);
    }

    #[test]
    fn test_latest_snapshot_ordering() {
        let (mut storage, source) = storage_with_source();
        let now = Utc::now();

        let older = SnapshotRecord::from_fetch(
            &source.id,
            now - chrono::Duration::hours(1),
            200,
            "old body".into(),
            None,
        );
        let newer = SnapshotRecord::from_fetch(&source.id, now, 200, "new body".into(), None);

        storage.insert_snapshot_idempotent(&older).unwrap();
        storage.insert_snapshot_idempotent(&newer).unwrap();

        let latest = storage.latest_snapshot(&source.id).unwrap().unwrap();
        assert_eq!(latest.raw_content, "new body");
    }

    #[test]
    fn test_diff_insert_and_list() {
        let (mut storage, source) = storage_with_source();
        let now = Utc::now();

        let old = SnapshotRecord::from_fetch(
            &source.id,
            now - chrono::Duration::hours(1),
            200,
            "old".into(),
            None,
        );
        let new = SnapshotRecord::from_fetch(&source.id, now, 200, "new".into(), None);
        storage.insert_snapshot_idempotent(&old).unwrap();
        storage.insert_snapshot_idempotent(&new).unwrap();

        for kind in [DiffKind::Text, DiffKind::Visual, DiffKind::Semantic] {
            storage
                .insert_diff(&DiffRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    source_id: source.id.clone(),
                    old_snapshot_id: old.id.clone(),
                    new_snapshot_id: new.id.clone(),
                    kind,
                    score: 50,
                    changes_json: "{}".to_string(),
                    reviewed: false,
                    reviewed_by: None,
                    reviewed_at: None,
                    created_at: now,
                })
                .unwrap();
        }

        let diffs = storage.diffs_for_source(&source.id).unwrap();
        assert_eq!(diffs.len(), 3);
    }

    #[test]
    fn test_dlq_lifecycle() {
        let (mut storage, source) = storage_with_source();

        let job = CrawlJobRecord::start(&source.id, 1, "trace", None);
        storage.create_job(&job).unwrap();

        let entry = DlqRecord::for_failure(
            &source.id,
            &job.id,
            "request timeout",
            FailureClass::Transient,
            1,
        );
        storage.create_dlq_entry(&entry).unwrap();

        assert_eq!(storage.count_unresolved_dlq().unwrap(), 1);
        assert_eq!(
            storage.find_unresolved_by_source(&source.id).unwrap().len(),
            1
        );

        storage.mark_dlq_replayed(&entry.id).unwrap();
        storage.mark_dlq_replayed(&entry.id).unwrap();
        let found = storage.get_dlq_entry(&entry.id).unwrap().unwrap();
        assert_eq!(found.replay_count, 2);
        // Replay alone does not resolve
        assert!(found.resolved_at.is_none());

        storage.resolve_dlq_entry(&entry.id, Utc::now()).unwrap();
        let found = storage.get_dlq_entry(&entry.id).unwrap().unwrap();
        assert!(found.resolved_at.is_some());
        assert_eq!(storage.count_unresolved_dlq().unwrap(), 0);
        // History is retained, not deleted
        assert_eq!(found.reason, "request timeout");
    }

    #[test]
    fn test_missing_rows_error() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        assert!(matches!(
            storage.mark_dlq_replayed("missing"),
            Err(StorageError::DlqEntryNotFound(_))
        ));
        assert!(matches!(
            storage.mark_job_failed("missing", FailureClass::Permanent, "x"),
            Err(StorageError::JobNotFound(_))
        ));
        assert!(matches!(
            storage.update_crawl_state("missing", Utc::now(), None, None),
            Err(StorageError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_ingestion_key_matches_helper() {
        let (mut storage, source) = storage_with_source();
        let at = Utc::now();
        let snapshot = SnapshotRecord::from_fetch(&source.id, at, 200, "body".into(), None);
        storage.insert_snapshot_idempotent(&snapshot).unwrap();

        let stored = storage.latest_snapshot(&source.id).unwrap().unwrap();
        assert_eq!(
            stored.ingestion_key,
            ingestion_key(&source.id, &stored.content_hash, stored.fetched_at)
        );
    }
}

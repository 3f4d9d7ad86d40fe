//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawl::FailureClass;
use crate::storage::{CrawlJobRecord, DiffRecord, DlqRecord, JobStatus, SnapshotRecord, SourceRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("DLQ entry not found: {0}")]
    DlqEntryNotFound(String),

    #[error("Timestamp parse error: {0}")]
    Timestamp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Repository-style CRUD over the five persisted entities. Implementations
/// must enforce a uniqueness constraint on snapshot ingestion keys; the crawl
/// executor treats a key conflict as "already ingested".
pub trait Storage {
    // ===== Sources =====

    /// Registers a new source
    fn insert_source(&mut self, source: &SourceRecord) -> StorageResult<()>;

    /// Gets a source by id
    fn find_source(&self, source_id: &str) -> StorageResult<Option<SourceRecord>>;

    /// Gets a source by exact URL
    fn find_source_by_url(&self, url: &str) -> StorageResult<Option<SourceRecord>>;

    /// Lists all active sources
    fn list_active_sources(&self) -> StorageResult<Vec<SourceRecord>>;

    /// Lists active sources whose crawl frequency has elapsed at `now`
    fn list_due_sources(&self, now: DateTime<Utc>) -> StorageResult<Vec<SourceRecord>>;

    /// Updates crawl bookkeeping after a fetch attempt
    ///
    /// `etag`/`last_modified` of `None` leave the stored validators in place
    /// (a 304 carries no new ones).
    fn update_crawl_state(
        &mut self,
        source_id: &str,
        last_crawl_at: DateTime<Utc>,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> StorageResult<()>;

    /// Activates or deactivates a source (sources are never deleted)
    fn set_source_active(&mut self, source_id: &str, active: bool) -> StorageResult<()>;

    // ===== Crawl jobs =====

    /// Inserts a job row (status `running`)
    fn create_job(&mut self, job: &CrawlJobRecord) -> StorageResult<()>;

    /// Gets a job by id
    fn get_job(&self, job_id: &str) -> StorageResult<Option<CrawlJobRecord>>;

    /// Number of jobs ever created for a source (drives attempt numbering)
    fn count_jobs_for_source(&self, source_id: &str) -> StorageResult<u64>;

    /// Terminates a job as succeeded
    fn mark_job_succeeded(
        &mut self,
        job_id: &str,
        fetch_status: u16,
        review_required: bool,
        quality_json: Option<&str>,
    ) -> StorageResult<()>;

    /// Terminates a job as failed with its classification
    fn mark_job_failed(
        &mut self,
        job_id: &str,
        failure_class: FailureClass,
        error_message: &str,
    ) -> StorageResult<()>;

    /// Terminates a job as blocked by policy (robots or host rules)
    fn mark_job_policy_blocked(&mut self, job_id: &str, error_message: &str) -> StorageResult<()>;

    /// Counts jobs in a given status
    fn count_jobs_by_status(&self, status: JobStatus) -> StorageResult<u64>;

    // ===== Snapshots =====

    /// Inserts a snapshot unless its ingestion key already exists
    ///
    /// # Returns
    ///
    /// The id of the stored row and whether this call created it. A key
    /// conflict returns the existing row's id with `created = false`.
    fn insert_snapshot_idempotent(
        &mut self,
        snapshot: &SnapshotRecord,
    ) -> StorageResult<(String, bool)>;

    /// Most recent snapshot for a source, by fetch time
    fn latest_snapshot(&self, source_id: &str) -> StorageResult<Option<SnapshotRecord>>;

    /// Number of snapshots stored for a source
    fn count_snapshots_for_source(&self, source_id: &str) -> StorageResult<u64>;

    // ===== Diffs =====

    /// Inserts one diff row
    fn insert_diff(&mut self, diff: &DiffRecord) -> StorageResult<()>;

    /// All diffs for a source, newest first
    fn diffs_for_source(&self, source_id: &str) -> StorageResult<Vec<DiffRecord>>;

    // ===== Dead-letter queue =====

    /// Records a failure for later replay
    fn create_dlq_entry(&mut self, entry: &DlqRecord) -> StorageResult<()>;

    /// Gets a DLQ entry by id
    fn get_dlq_entry(&self, dlq_id: &str) -> StorageResult<Option<DlqRecord>>;

    /// Unresolved entries for a source, oldest first
    fn find_unresolved_by_source(&self, source_id: &str) -> StorageResult<Vec<DlqRecord>>;

    /// Increments an entry's replay counter
    fn mark_dlq_replayed(&mut self, dlq_id: &str) -> StorageResult<()>;

    /// Stamps an entry resolved
    fn resolve_dlq_entry(&mut self, dlq_id: &str, at: DateTime<Utc>) -> StorageResult<()>;

    /// Counts entries with no resolution timestamp
    fn count_unresolved_dlq(&self) -> StorageResult<u64>;
}

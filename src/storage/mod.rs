//! Storage module
//!
//! Persisted entities and their repository interface. The datastore is the
//! single source of truth for idempotency: snapshots carry a UNIQUE ingestion
//! key, and racing crawls that collide on it are treated as already-ingested
//! successes rather than errors.

mod schema;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::crawl::FailureClass;
use crate::diff::DiffKind;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Terminal and in-flight states of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    PolicyBlocked,
}

impl JobStatus {
    pub fn to_db_string(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::PolicyBlocked => "policy_blocked",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobStatus::Running),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            "policy_blocked" => Some(JobStatus::PolicyBlocked),
            _ => None,
        }
    }
}

/// A registered crawl target
///
/// Identity (`id`, `url`) is immutable; crawl bookkeeping fields are updated
/// by the executor after every attempt. Sources are deactivated, never
/// deleted.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: String,
    pub url: String,
    pub name: String,

    /// Host this source is allowed to reach when it differs from the URL's
    /// own host (canonical-host override)
    pub allowed_host: Option<String>,

    /// `ETag` from the last successful fetch, replayed as `If-None-Match`
    pub etag: Option<String>,

    /// `Last-Modified` from the last successful fetch, replayed as
    /// `If-Modified-Since`
    pub last_modified: Option<String>,

    pub last_crawl_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub crawl_frequency_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl SourceRecord {
    /// Creates a new source with a fresh id and no crawl history
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        crawl_frequency_ms: i64,
        allowed_host: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            name: name.into(),
            allowed_host,
            etag: None,
            last_modified: None,
            last_crawl_at: None,
            is_active: true,
            crawl_frequency_ms,
            created_at: Utc::now(),
        }
    }

    /// Whether this source is due for a crawl at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_crawl_at {
            None => true,
            Some(last) => {
                now - last >= chrono::Duration::milliseconds(self.crawl_frequency_ms)
            }
        }
    }

    #[cfg(test)]
    pub fn new_for_test(url: &str) -> Self {
        Self::new(url, "test source", 60_000, None)
    }
}

/// One crawl attempt
#[derive(Debug, Clone)]
pub struct CrawlJobRecord {
    pub id: String,
    pub source_id: String,
    pub status: JobStatus,
    pub attempt: u32,
    pub trace_id: String,
    pub failure_class: Option<FailureClass>,
    pub error_message: Option<String>,
    pub fetch_status: Option<u16>,
    pub review_required: Option<bool>,

    /// Parse quality metrics as JSON, present on parsed successes
    pub quality_json: Option<String>,

    /// Hash of the configuration the job ran under
    pub config_hash: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CrawlJobRecord {
    /// Creates a running job for one attempt
    pub fn start(source_id: &str, attempt: u32, trace_id: &str, config_hash: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            status: JobStatus::Running,
            attempt,
            trace_id: trace_id.to_string(),
            failure_class: None,
            error_message: None,
            fetch_status: None,
            review_required: None,
            quality_json: None,
            config_hash,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// One persisted fetch result; never mutated after insert
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    pub id: String,
    pub source_id: String,
    pub fetched_at: DateTime<Utc>,
    pub http_status: u16,
    pub content_hash: String,

    /// Idempotency token; UNIQUE at the storage layer
    pub ingestion_key: String,

    pub raw_content: String,
    pub headers_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SnapshotRecord {
    /// Builds a snapshot for a fetched page, deriving hash and ingestion key
    pub fn from_fetch(
        source_id: &str,
        fetched_at: DateTime<Utc>,
        http_status: u16,
        raw_content: String,
        headers_json: Option<String>,
    ) -> Self {
        let hash = content_hash(&raw_content);
        let key = ingestion_key(source_id, &hash, fetched_at);
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            fetched_at,
            http_status,
            content_hash: hash,
            ingestion_key: key,
            raw_content,
            headers_json,
            created_at: Utc::now(),
        }
    }
}

/// One diff row between two consecutive snapshots
#[derive(Debug, Clone)]
pub struct DiffRecord {
    pub id: String,
    pub source_id: String,
    pub old_snapshot_id: String,
    pub new_snapshot_id: String,
    pub kind: DiffKind,
    pub score: u8,
    pub changes_json: String,
    pub reviewed: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A failure awaiting replay; mutated only by `mark_replayed`/`resolve`
#[derive(Debug, Clone)]
pub struct DlqRecord {
    pub id: String,
    pub source_id: String,
    pub job_id: String,
    pub reason: String,
    pub failure_class: FailureClass,
    pub attempt: u32,
    pub replay_count: u32,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DlqRecord {
    /// Creates an unresolved entry for a failed job
    pub fn for_failure(
        source_id: &str,
        job_id: &str,
        reason: impl Into<String>,
        failure_class: FailureClass,
        attempt: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            job_id: job_id.to_string(),
            reason: reason.into(),
            failure_class,
            attempt,
            replay_count: 0,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }
}

/// SHA-256 hex digest of page content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic idempotency token for one (source, content, fetch time)
///
/// The same triple always derives the same key, so a replayed crawl of an
/// unchanged page collides at the UNIQUE constraint instead of inserting a
/// second snapshot.
pub fn ingestion_key(source_id: &str, content_hash: &str, fetched_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b":");
    hasher.update(content_hash.as_bytes());
    hasher.update(b":");
    hasher.update(fetched_at.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_db_round_trip() {
        for status in [
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::PolicyBlocked,
        ] {
            assert_eq!(
                JobStatus::from_db_string(status.to_db_string()),
                Some(status)
            );
        }
        assert_eq!(JobStatus::from_db_string("bogus"), None);
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }

    #[test]
    fn test_ingestion_key_is_deterministic() {
        let at = Utc::now();
        let hash = content_hash("page body");

        let key1 = ingestion_key("src-1", &hash, at);
        let key2 = ingestion_key("src-1", &hash, at);
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_ingestion_key_varies_by_component() {
        let at = Utc::now();
        let hash = content_hash("page body");

        let base = ingestion_key("src-1", &hash, at);
        assert_ne!(base, ingestion_key("src-2", &hash, at));
        assert_ne!(base, ingestion_key("src-1", &content_hash("other"), at));
        assert_ne!(
            base,
            ingestion_key("src-1", &hash, at + chrono::Duration::seconds(1))
        );
    }

    #[test]
    fn test_source_due_when_never_crawled() {
        let source = SourceRecord::new_for_test("https://energy.example.gov/rebates");
        assert!(source.is_due(Utc::now()));
    }

    #[test]
    fn test_source_due_after_frequency_elapses() {
        let mut source = SourceRecord::new_for_test("https://energy.example.gov/rebates");
        let now = Utc::now();
        source.last_crawl_at = Some(now - chrono::Duration::milliseconds(59_000));
        assert!(!source.is_due(now));

        source.last_crawl_at = Some(now - chrono::Duration::milliseconds(61_000));
        assert!(source.is_due(now));
    }

    #[test]
    fn test_inactive_source_never_due() {
        let mut source = SourceRecord::new_for_test("https://energy.example.gov/rebates");
        source.is_active = false;
        assert!(!source.is_due(Utc::now()));
    }

    #[test]
    fn test_snapshot_from_fetch_derives_key() {
        let snapshot = SnapshotRecord::from_fetch("src-1", Utc::now(), 200, "body".into(), None);
        assert_eq!(snapshot.content_hash, content_hash("body"));
        assert_eq!(
            snapshot.ingestion_key,
            ingestion_key("src-1", &snapshot.content_hash, snapshot.fetched_at)
        );
    }
}

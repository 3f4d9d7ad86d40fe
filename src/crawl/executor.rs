//! Crawl executor - one crawl attempt end to end
//!
//! The single entry point composing every other component:
//! resolve source → fetch (with retry) → persist snapshot idempotently →
//! compute diffs → run the parse pipeline → settle job and DLQ state.
//!
//! The executor never lets an error escape. Every call resolves to a
//! [`CrawlReport`]; failures leave an auditable trail (terminal job status
//! plus a DLQ entry) instead of propagating.

use crate::crawl::{classify_failure, FailureClass};
use crate::diff::build_diff_records;
use crate::fetch::FetchClient;
use crate::pipeline::ParsePipeline;
use crate::storage::{
    CrawlJobRecord, DiffRecord, DlqRecord, SnapshotRecord, SourceRecord, SqliteStorage, Storage,
};
use crate::CrawlError;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// What the executor always resolves to
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub success: bool,
    pub trace_id: String,

    /// Missing only when the failure predates job creation (unknown source,
    /// storage unavailable)
    pub job_id: Option<String>,
}

/// Orchestrates crawl attempts against shared storage and the fetch layer
pub struct CrawlExecutor {
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: Arc<FetchClient>,
    parser: Arc<dyn ParsePipeline>,
    max_fetch_attempts: u32,
    config_hash: Option<String>,
}

impl CrawlExecutor {
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        fetcher: Arc<FetchClient>,
        parser: Arc<dyn ParsePipeline>,
        max_fetch_attempts: u32,
        config_hash: Option<String>,
    ) -> Self {
        Self {
            storage,
            fetcher,
            parser,
            max_fetch_attempts,
            config_hash,
        }
    }

    /// Shared storage handle, for drivers that enumerate sources or DLQ
    /// entries around the executor
    pub fn storage(&self) -> &Arc<Mutex<SqliteStorage>> {
        &self.storage
    }

    /// Runs one crawl attempt for a source
    ///
    /// Passing `resume_job_id` re-enters a specific attempt idempotently: an
    /// existing job row with that id is reused, otherwise the new job is
    /// created under it.
    ///
    /// This method never returns an error; failures settle into job status
    /// and DLQ state and are reported through the returned [`CrawlReport`].
    pub async fn execute(&self, source_id: &str, resume_job_id: Option<&str>) -> CrawlReport {
        let trace_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let source = match self.resolve_source(source_id) {
            Ok(source) => source,
            Err(e) => {
                // No source row means no job row to settle into
                tracing::error!(
                    trace_id = %trace_id,
                    source_id,
                    stage = "crawl-execute",
                    result = "error",
                    details = %e,
                    "crawl aborted before job creation"
                );
                return CrawlReport {
                    success: false,
                    trace_id,
                    job_id: None,
                };
            }
        };

        let job = match self.open_job(&source, &trace_id, resume_job_id) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    trace_id = %trace_id,
                    source_id,
                    stage = "crawl-execute",
                    result = "error",
                    details = %e,
                    "job creation failed"
                );
                return CrawlReport {
                    success: false,
                    trace_id,
                    job_id: None,
                };
            }
        };

        // Nested stage events (fetch, pacing, parse) inherit the trace id
        // through this span
        let span = tracing::info_span!("crawl", trace_id = %trace_id, source_id = %source.id);
        let result = self.run_attempt(&source, &job).instrument(span).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                tracing::info!(
                    trace_id = %trace_id,
                    source_id = %source.id,
                    stage = "crawl-execute",
                    duration_ms,
                    result = "ok",
                );
                CrawlReport {
                    success: true,
                    trace_id,
                    job_id: Some(job.id),
                }
            }
            Err(e) => {
                self.settle_failure(&source, &job, &e);
                tracing::info!(
                    trace_id = %trace_id,
                    source_id = %source.id,
                    stage = "crawl-execute",
                    duration_ms,
                    result = "error",
                    details = %e,
                );
                CrawlReport {
                    success: false,
                    trace_id,
                    job_id: Some(job.id),
                }
            }
        }
    }

    fn resolve_source(&self, source_id: &str) -> Result<SourceRecord, CrawlError> {
        let storage = self.storage.lock().unwrap();
        storage
            .find_source(source_id)?
            .ok_or_else(|| CrawlError::SourceNotFound(source_id.to_string()))
    }

    /// Creates the job row for this attempt, or resumes an existing one
    fn open_job(
        &self,
        source: &SourceRecord,
        trace_id: &str,
        resume_job_id: Option<&str>,
    ) -> Result<CrawlJobRecord, CrawlError> {
        let mut storage = self.storage.lock().unwrap();

        if let Some(job_id) = resume_job_id {
            if let Some(existing) = storage.get_job(job_id)? {
                return Ok(existing);
            }
        }

        let attempt = storage.count_jobs_for_source(&source.id)? as u32 + 1;
        let mut job = CrawlJobRecord::start(&source.id, attempt, trace_id, self.config_hash.clone());
        if let Some(job_id) = resume_job_id {
            job.id = job_id.to_string();
        }
        storage.create_job(&job)?;
        Ok(job)
    }

    /// The fallible middle of the crawl; every error lands in `settle_failure`
    async fn run_attempt(
        &self,
        source: &SourceRecord,
        job: &CrawlJobRecord,
    ) -> Result<(), CrawlError> {
        let previous = {
            let storage = self.storage.lock().unwrap();
            storage.latest_snapshot(&source.id)?
        };

        let outcome = self
            .fetcher
            .fetch_with_retry(source, self.max_fetch_attempts)
            .await?;

        // Crawl bookkeeping updates on every successful fetch, 304 included
        {
            let mut storage = self.storage.lock().unwrap();
            storage.update_crawl_state(
                &source.id,
                outcome.fetched_at,
                outcome.etag.as_deref(),
                outcome.last_modified.as_deref(),
            )?;
        }

        if outcome.not_modified {
            // Nothing changed upstream: no snapshot, no diff, no parse
            let mut storage = self.storage.lock().unwrap();
            storage.mark_job_succeeded(&job.id, outcome.status_code, false, None)?;
            return Ok(());
        }

        let headers_json = serde_json::json!({
            "etag": outcome.etag,
            "last_modified": outcome.last_modified,
            "robots": outcome.robots_reason,
        })
        .to_string();

        let snapshot = SnapshotRecord::from_fetch(
            &source.id,
            outcome.fetched_at,
            outcome.status_code,
            outcome.content,
            Some(headers_json),
        );

        let (snapshot_id, created) = {
            let mut storage = self.storage.lock().unwrap();
            storage.insert_snapshot_idempotent(&snapshot)?
        };

        let parse = self.parser.run(source, &snapshot.raw_content);

        if created {
            if let Some(prev) = previous.filter(|p| !p.raw_content.is_empty()) {
                self.persist_diffs(source, &prev, &snapshot_id, &snapshot.raw_content)?;
            }
        } else {
            // Ingestion key collision: a replay or racing attempt already
            // stored this fetch. Treat as ingested; diffs exist already.
            tracing::debug!(
                source_id = %source.id,
                snapshot_id = %snapshot_id,
                "ingestion key already present, treating as success"
            );
        }

        let quality_json = serde_json::to_string(&parse.quality).ok();
        {
            let mut storage = self.storage.lock().unwrap();
            storage.mark_job_succeeded(
                &job.id,
                outcome.status_code,
                parse.review_required,
                quality_json.as_deref(),
            )?;
        }

        Ok(())
    }

    /// Computes and stores the three diff rows for a snapshot transition
    fn persist_diffs(
        &self,
        source: &SourceRecord,
        previous: &SnapshotRecord,
        new_snapshot_id: &str,
        new_content: &str,
    ) -> Result<(), CrawlError> {
        let drafts = build_diff_records(&previous.raw_content, new_content);
        let now = Utc::now();

        let mut storage = self.storage.lock().unwrap();
        for draft in drafts {
            storage.insert_diff(&DiffRecord {
                id: Uuid::new_v4().to_string(),
                source_id: source.id.clone(),
                old_snapshot_id: previous.id.clone(),
                new_snapshot_id: new_snapshot_id.to_string(),
                kind: draft.kind,
                score: draft.score,
                changes_json: draft.changes.to_string(),
                reviewed: false,
                reviewed_by: None,
                reviewed_at: None,
                created_at: now,
            })?;
        }
        Ok(())
    }

    /// Settles a failed attempt into job status and a DLQ entry
    ///
    /// Storage trouble here is logged and swallowed; the executor's contract
    /// is to resolve, not to throw.
    fn settle_failure(&self, source: &SourceRecord, job: &CrawlJobRecord, error: &CrawlError) {
        let class = classify_failure(error);
        let message = error.to_string();

        let mut storage = self.storage.lock().unwrap();

        let marked = match class {
            FailureClass::PolicyBlocked => storage.mark_job_policy_blocked(&job.id, &message),
            _ => storage.mark_job_failed(&job.id, class, &message),
        };
        if let Err(e) = marked {
            tracing::error!(job_id = %job.id, details = %e, "failed to mark job terminal");
        }

        let entry = DlqRecord::for_failure(&source.id, &job.id, &message, class, job.attempt);
        if let Err(e) = storage.create_dlq_entry(&entry) {
            tracing::error!(job_id = %job.id, details = %e, "failed to create DLQ entry");
        }
    }
}

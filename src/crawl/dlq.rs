//! Dead-letter queue replay
//!
//! Operators recover failed crawls from here. A replay re-runs the executor
//! for the entry's source under a fresh job, always bumps the replay counter,
//! and resolves the entry only when the replay crawl succeeds. The original
//! reason and replay history are retained for audit.

use crate::crawl::CrawlExecutor;
use crate::storage::Storage;
use crate::{CrawlError, Result};
use chrono::Utc;

/// Replays one DLQ entry
///
/// # Returns
///
/// Whether the replay crawl succeeded. The entry's replay counter increments
/// regardless of outcome.
pub async fn replay_dlq_by_id(executor: &CrawlExecutor, dlq_id: &str) -> Result<bool> {
    let entry = {
        let storage = executor.storage().lock().unwrap();
        storage
            .get_dlq_entry(dlq_id)?
            .ok_or_else(|| CrawlError::DlqEntryNotFound(dlq_id.to_string()))?
    };

    tracing::info!(
        dlq_id,
        source_id = %entry.source_id,
        replay_count = entry.replay_count,
        "replaying DLQ entry"
    );

    let report = executor.execute(&entry.source_id, None).await;

    {
        let mut storage = executor.storage().lock().unwrap();
        storage.mark_dlq_replayed(dlq_id)?;
        if report.success {
            storage.resolve_dlq_entry(dlq_id, Utc::now())?;
        }
    }

    Ok(report.success)
}

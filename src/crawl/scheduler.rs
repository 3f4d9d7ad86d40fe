//! Due-source scheduling
//!
//! The thin driver loop around the executor: enumerate active sources whose
//! crawl frequency has elapsed and run each once. A single process invocation
//! runs sources sequentially; per-host safety under any parallel drivers
//! comes from the shared host registry, and the ingestion-key constraint
//! keeps racing attempts from double-ingesting.

use crate::crawl::{CrawlExecutor, CrawlReport};
use crate::storage::Storage;
use crate::Result;
use chrono::Utc;

/// Crawls every source that is due right now
///
/// Returns one report per attempted source, in the order they were tried.
/// Individual crawl failures do not stop the loop; they are already settled
/// into job/DLQ state by the executor.
pub async fn run_due_sources(executor: &CrawlExecutor) -> Result<Vec<CrawlReport>> {
    let due = {
        let storage = executor.storage().lock().unwrap();
        storage.list_due_sources(Utc::now())?
    };

    tracing::info!(due = due.len(), "starting scheduled crawl pass");

    let mut reports = Vec::with_capacity(due.len());
    for source in due {
        let report = executor.execute(&source.id, None).await;
        if !report.success {
            tracing::warn!(
                source_id = %source.id,
                trace_id = %report.trace_id,
                "scheduled crawl failed; see job and DLQ state"
            );
        }
        reports.push(report);
    }

    Ok(reports)
}

//! Crawl orchestration module
//!
//! This module contains the crawl executor, failure classification, the
//! due-source scheduling loop, and DLQ replay. The executor is the single
//! entry point an external driver invokes, once per source per attempt.

mod classify;
mod dlq;
mod executor;
mod scheduler;

pub use classify::{classify_failure, FailureClass};
pub use dlq::replay_dlq_by_id;
pub use executor::{CrawlExecutor, CrawlReport};
pub use scheduler::run_due_sources;

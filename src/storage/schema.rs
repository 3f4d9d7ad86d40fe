//! Database schema definitions
//!
//! All SQL schema for the progwatch database. The ingestion-key UNIQUE
//! constraint on `crawl_snapshots` is the idempotency arbiter the executor
//! relies on; do not relax it.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Registered crawl targets
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    allowed_host TEXT,
    etag TEXT,
    last_modified TEXT,
    last_crawl_at TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    crawl_frequency_ms INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sources_active ON sources(is_active);

-- One row per crawl attempt
CREATE TABLE IF NOT EXISTS crawl_jobs (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id),
    status TEXT NOT NULL,
    attempt INTEGER NOT NULL,
    trace_id TEXT NOT NULL,
    failure_class TEXT,
    error_message TEXT,
    fetch_status INTEGER,
    review_required INTEGER,
    quality_json TEXT,
    config_hash TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_source ON crawl_jobs(source_id);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON crawl_jobs(status);

-- One row per persisted fetch result; ingestion_key enforces idempotency
CREATE TABLE IF NOT EXISTS crawl_snapshots (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id),
    fetched_at TEXT NOT NULL,
    http_status INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    ingestion_key TEXT NOT NULL UNIQUE,
    raw_content TEXT NOT NULL,
    headers_json TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_source ON crawl_snapshots(source_id, fetched_at);

-- Three rows (text/visual/semantic) per snapshot transition
CREATE TABLE IF NOT EXISTS diffs (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id),
    old_snapshot_id TEXT NOT NULL REFERENCES crawl_snapshots(id),
    new_snapshot_id TEXT NOT NULL REFERENCES crawl_snapshots(id),
    kind TEXT NOT NULL,
    score INTEGER NOT NULL,
    changes_json TEXT NOT NULL,
    reviewed INTEGER NOT NULL DEFAULT 0,
    reviewed_by TEXT,
    reviewed_at TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(old_snapshot_id, new_snapshot_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_diffs_source ON diffs(source_id);

-- Failed crawls awaiting replay; never deleted
CREATE TABLE IF NOT EXISTS dlq_entries (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id),
    job_id TEXT NOT NULL REFERENCES crawl_jobs(id),
    reason TEXT NOT NULL,
    failure_class TEXT NOT NULL,
    attempt INTEGER NOT NULL,
    replay_count INTEGER NOT NULL DEFAULT 0,
    resolved_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dlq_source ON dlq_entries(source_id);
CREATE INDEX IF NOT EXISTS idx_dlq_unresolved ON dlq_entries(resolved_at);
"#;

/// Initializes the database schema
///
/// Idempotent; safe to run on every open.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in [
            "sources",
            "crawl_jobs",
            "crawl_snapshots",
            "diffs",
            "dlq_entries",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_ingestion_key_unique_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO sources (id, url, name, crawl_frequency_ms, created_at)
             VALUES ('s1', 'https://a.example.gov/', 'a', 60000, '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let insert = "INSERT INTO crawl_snapshots
            (id, source_id, fetched_at, http_status, content_hash, ingestion_key, raw_content, created_at)
            VALUES (?1, 's1', '2026-01-01T00:00:00Z', 200, 'h', 'key-1', 'body', '2026-01-01T00:00:00Z')";

        conn.execute(insert, ["snap-1"]).unwrap();
        let dup = conn.execute(insert, ["snap-2"]);
        assert!(dup.is_err(), "duplicate ingestion key must be rejected");
    }
}

use rusqlite::Connection;

use crate::error::Result;

/// Initialise the queue schema in `conn`.
///
/// Creates the `jobs` table (idempotent) and an index on
/// `(status, available_at)` so the lease poll stays efficient with a large
/// backlog.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id               TEXT    NOT NULL PRIMARY KEY,
            kind             TEXT    NOT NULL,
            payload          TEXT    NOT NULL,   -- JSON-encoded string map
            status           TEXT    NOT NULL DEFAULT 'pending',
            attempts         INTEGER NOT NULL DEFAULT 0,
            available_at     TEXT    NOT NULL,   -- ISO-8601
            created_at       TEXT    NOT NULL,
            updated_at       TEXT    NOT NULL,
            lease_expires_at TEXT,               -- ISO-8601 or NULL
            leased_by        TEXT,
            last_error       TEXT
        ) STRICT;

        -- Lease poll: SELECT … WHERE status='pending' AND available_at <= ?
        CREATE INDEX IF NOT EXISTS idx_jobs_eligible ON jobs (status, available_at);
        ",
    )?;
    Ok(())
}

use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler state schema in `conn`.
///
/// One row, keyed to 1: the RFC3339 instant of the most recent successful
/// enqueue. The catch-up policy reads it at startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schedule_state (
            id            INTEGER NOT NULL PRIMARY KEY CHECK (id = 1),
            last_fired_at TEXT                -- ISO-8601 or NULL
        ) STRICT;

        INSERT OR IGNORE INTO schedule_state (id, last_fired_at) VALUES (1, NULL);
        ",
    )?;
    Ok(())
}

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use courier_core::types::JobPayload;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{QueueError, Result};
use crate::types::{JobRecord, JobStatus};

const MAX_KIND_LEN: usize = 64;
const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Backoff doubling stops here so the shift can never overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Column list for `jobs` queries.
const COLUMNS: &str = "id, kind, payload, status, attempts, available_at, \
                       created_at, updated_at, lease_expires_at, leased_by, last_error";

/// Retry policy applied when a job fails with `retry = true`.
#[derive(Debug, Clone)]
pub struct QueuePolicy {
    /// Total execution attempts before a job is terminally failed.
    pub max_attempts: u32,
    /// First retry delay; doubles on each further attempt.
    pub base_retry_delay_secs: u64,
    /// Upper bound on the backoff delay.
    pub max_retry_delay_secs: u64,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: courier_core::config::DEFAULT_MAX_ATTEMPTS,
            base_retry_delay_secs: courier_core::config::DEFAULT_BASE_RETRY_DELAY_SECS,
            max_retry_delay_secs: courier_core::config::DEFAULT_MAX_RETRY_DELAY_SECS,
        }
    }
}

impl From<&courier_core::config::QueueConfig> for QueuePolicy {
    fn from(cfg: &courier_core::config::QueueConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_retry_delay_secs: cfg.base_retry_delay_secs,
            max_retry_delay_secs: cfg.max_retry_delay_secs,
        }
    }
}

impl QueuePolicy {
    /// Delay before the next attempt, given the post-increment attempt count.
    fn backoff_delay(&self, attempts: u32) -> chrono::Duration {
        let exp = attempts.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let secs = self
            .base_retry_delay_secs
            .saturating_mul(1u64 << exp)
            .min(self.max_retry_delay_secs);
        chrono::Duration::seconds(secs as i64)
    }
}

/// Durable holding area for job records.
///
/// Wraps a single SQLite connection in a `Mutex`; every multi-step transition
/// runs inside a transaction, so concurrent processes sharing the database
/// file (WAL mode) cannot double-lease a record. Workers hold a time-bounded
/// lease, never ownership; the store is the only writer of job state.
pub struct QueueStore {
    db: Mutex<Connection>,
    policy: QueuePolicy,
}

impl QueueStore {
    /// Wrap an already-open connection, initialising the schema if needed.
    pub fn new(conn: Connection, policy: QueuePolicy) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            policy,
        })
    }

    /// Insert a new pending record. Returns the fully populated [`JobRecord`].
    ///
    /// `delay` pushes `available_at` into the future (enqueue-time deferral).
    /// Never blocks on downstream processing.
    #[instrument(skip(self, payload))]
    pub fn enqueue(
        &self,
        kind: &str,
        payload: &JobPayload,
        delay: Option<Duration>,
    ) -> Result<JobRecord> {
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(QueueError::InvalidJob("kind must not be empty".into()));
        }
        if kind.len() > MAX_KIND_LEN {
            return Err(QueueError::InvalidJob(format!(
                "kind exceeds {MAX_KIND_LEN} bytes"
            )));
        }
        let payload_json = serde_json::to_string(payload)?;
        if payload_json.len() > MAX_PAYLOAD_BYTES {
            return Err(QueueError::InvalidJob(format!(
                "payload exceeds {MAX_PAYLOAD_BYTES} bytes"
            )));
        }

        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let available_at = match delay {
            Some(d) => (now + clamped(d)).to_rfc3339(),
            None => now_str.clone(),
        };
        let id = Uuid::new_v4().to_string();

        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs
             (id, kind, payload, status, attempts, available_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?5, ?5)",
            rusqlite::params![id, kind, payload_json, available_at, now_str],
        )?;
        info!(job_id = %id, %kind, "job enqueued");

        Ok(JobRecord {
            id,
            kind: kind.to_string(),
            payload: payload.clone(),
            status: JobStatus::Pending,
            attempts: 0,
            available_at,
            created_at: now_str.clone(),
            updated_at: now_str,
            lease_expires_at: None,
            leased_by: None,
            last_error: None,
        })
    }

    /// Atomically claim the oldest eligible record for `worker_id`.
    ///
    /// Eligible means `status = 'pending'` and `available_at` has passed;
    /// FIFO by `available_at`, then `created_at`, then `id`. Expired leases
    /// are reclaimed first, so a crashed worker's job becomes claimable here
    /// without any separate bookkeeping. Returns `None` when nothing is due.
    #[instrument(skip(self))]
    pub fn lease(&self, worker_id: &str, lease_duration: Duration) -> Result<Option<JobRecord>> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        reclaim_in_tx(&tx, &now_str)?;

        let candidate: Option<String> = tx
            .query_row(
                "SELECT id FROM jobs
                 WHERE status = 'pending' AND available_at <= ?1
                 ORDER BY available_at, created_at, id
                 LIMIT 1",
                rusqlite::params![now_str],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        // Guarded on status so a concurrent process racing through the same
        // SELECT cannot claim the record twice.
        let expires = (now + clamped(lease_duration)).to_rfc3339();
        let claimed = tx.execute(
            "UPDATE jobs
             SET status = 'leased', leased_by = ?1, lease_expires_at = ?2, updated_at = ?3
             WHERE id = ?4 AND status = 'pending'",
            rusqlite::params![worker_id, expires, now_str, id],
        )?;
        if claimed == 0 {
            tx.commit()?;
            return Ok(None);
        }

        let job = tx.query_row(
            &format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"),
            rusqlite::params![id],
            row_to_job,
        )?;
        tx.commit()?;

        debug!(job_id = %job.id, kind = %job.kind, "job leased");
        Ok(Some(job))
    }

    /// Mark a record succeeded and release its lease.
    ///
    /// Returns `NotFound` when the id is unknown or the record is not
    /// currently leased by `worker_id` (the caller's lease raced away).
    pub fn complete(&self, id: &str, worker_id: &str) -> Result<()> {
        let now_str = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE jobs
             SET status = 'succeeded', leased_by = NULL, lease_expires_at = NULL, updated_at = ?1
             WHERE id = ?2 AND status = 'leased' AND leased_by = ?3",
            rusqlite::params![now_str, id, worker_id],
        )?;
        if n == 0 {
            return Err(QueueError::NotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job succeeded");
        Ok(())
    }

    /// Record a failed attempt and decide the record's next state.
    ///
    /// Increments `attempts`; with `retry` and attempts left under the
    /// policy's `max_attempts`, the record goes back to pending with an
    /// exponential backoff on `available_at`. Otherwise it is terminally
    /// failed. Returns the resulting status so callers can log the outcome.
    pub fn fail(&self, id: &str, worker_id: &str, error: &str, retry: bool) -> Result<JobStatus> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let attempts: Option<u32> = tx
            .query_row(
                "SELECT attempts FROM jobs
                 WHERE id = ?1 AND status = 'leased' AND leased_by = ?2",
                rusqlite::params![id, worker_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(attempts) = attempts else {
            return Err(QueueError::NotFound { id: id.to_string() });
        };

        let attempts = attempts + 1;
        let status = if retry && attempts < self.policy.max_attempts {
            let available_at = (now + self.policy.backoff_delay(attempts)).to_rfc3339();
            tx.execute(
                "UPDATE jobs
                 SET status = 'pending', attempts = ?1, available_at = ?2, last_error = ?3,
                     leased_by = NULL, lease_expires_at = NULL, updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![attempts, available_at, error, now_str, id],
            )?;
            JobStatus::Pending
        } else {
            tx.execute(
                "UPDATE jobs
                 SET status = 'failed', attempts = ?1, last_error = ?2,
                     leased_by = NULL, lease_expires_at = NULL, updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![attempts, error, now_str, id],
            )?;
            JobStatus::Failed
        };
        tx.commit()?;
        Ok(status)
    }

    /// Make records with expired leases eligible again.
    ///
    /// Returns how many were reclaimed. Also runs implicitly at the start of
    /// every [`lease`](Self::lease) call.
    pub fn reclaim_expired(&self) -> Result<usize> {
        let now_str = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        reclaim_in_tx(&conn, &now_str)
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        let conn = self.db.lock().unwrap();
        let job = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"),
                rusqlite::params![id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Most recently enqueued records first.
    pub fn list(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM jobs ORDER BY created_at DESC, id LIMIT ?1"
        ))?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_job)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Delete terminal records whose last transition is older than `older_than`.
    pub fn purge_finished(&self, older_than: Duration) -> Result<usize> {
        let cutoff = (Utc::now() - clamped(older_than)).to_rfc3339();
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM jobs
             WHERE status IN ('succeeded', 'failed') AND updated_at < ?1",
            rusqlite::params![cutoff],
        )?;
        if n > 0 {
            info!(count = n, "purged finished jobs");
        }
        Ok(n)
    }
}

/// Reset every expired lease to pending. Shared by `lease` and the sweep.
fn reclaim_in_tx(conn: &Connection, now_str: &str) -> Result<usize> {
    let n = conn.execute(
        "UPDATE jobs
         SET status = 'pending', leased_by = NULL, lease_expires_at = NULL, updated_at = ?1
         WHERE status = 'leased' AND lease_expires_at <= ?1",
        rusqlite::params![now_str],
    )?;
    if n > 0 {
        info!(count = n, "reclaimed expired leases");
    }
    Ok(n)
}

/// Convert a std duration to chrono, capped at ~100 years so timestamp
/// arithmetic cannot overflow.
fn clamped(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let payload_json: String = row.get(2)?;
    let payload: JobPayload = serde_json::from_str(&payload_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status_str: String = row.get(3)?;
    let status: JobStatus = status_str.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(JobRecord {
        id: row.get(0)?,
        kind: row.get(1)?,
        payload,
        status,
        attempts: row.get(4)?,
        available_at: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        lease_expires_at: row.get(8)?,
        leased_by: row.get(9)?,
        last_error: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::payload;

    const LEASE: Duration = Duration::from_secs(60);

    fn store() -> QueueStore {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        QueueStore::new(conn, QueuePolicy::default()).expect("init store")
    }

    fn store_with(policy: QueuePolicy) -> QueueStore {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        QueueStore::new(conn, policy).expect("init store")
    }

    #[test]
    fn enqueue_then_lease_roundtrips_payload() {
        let store = store();
        let p = payload([("to", "a@x.com"), ("subject", "S"), ("title", "T"), ("body", "B")]);
        let job = store.enqueue("email", &p, None).expect("enqueue");

        let leased = store.lease("w1", LEASE).expect("lease").expect("job due");
        assert_eq!(leased.id, job.id);
        assert_eq!(leased.kind, "email");
        assert_eq!(leased.payload, p);
        assert_eq!(leased.status, JobStatus::Leased);
        assert_eq!(leased.leased_by.as_deref(), Some("w1"));
        assert!(leased.lease_expires_at.is_some());
    }

    #[test]
    fn empty_kind_is_rejected() {
        let store = store();
        let err = store.enqueue("  ", &JobPayload::new(), None).unwrap_err();
        assert!(matches!(err, QueueError::InvalidJob(_)));
    }

    #[test]
    fn lease_is_exclusive() {
        let store = store();
        store.enqueue("email", &payload([("to", "a@x.com")]), None).expect("enqueue");

        let first = store.lease("w1", LEASE).expect("lease");
        let second = store.lease("w2", LEASE).expect("lease");
        assert!(first.is_some());
        assert!(second.is_none(), "second worker must not see the leased job");
    }

    #[test]
    fn eligible_jobs_are_fifo() {
        let store = store();
        let a = store.enqueue("email", &payload([("n", "1")]), None).expect("enqueue");
        std::thread::sleep(Duration::from_millis(5));
        let b = store.enqueue("email", &payload([("n", "2")]), None).expect("enqueue");

        let first = store.lease("w1", LEASE).expect("lease").expect("due");
        let second = store.lease("w1", LEASE).expect("lease").expect("due");
        assert_eq!(first.id, a.id);
        assert_eq!(second.id, b.id);
    }

    #[test]
    fn delayed_job_is_not_eligible_yet() {
        let store = store();
        store
            .enqueue("email", &JobPayload::new(), Some(Duration::from_secs(3600)))
            .expect("enqueue");
        assert!(store.lease("w1", LEASE).expect("lease").is_none());
    }

    #[test]
    fn complete_removes_job_from_rotation() {
        let store = store();
        let job = store.enqueue("email", &JobPayload::new(), None).expect("enqueue");
        let leased = store.lease("w1", LEASE).expect("lease").expect("due");
        store.complete(&leased.id, "w1").expect("complete");

        let after = store.get(&job.id).expect("get").expect("row kept");
        assert_eq!(after.status, JobStatus::Succeeded);
        assert!(store.lease("w2", LEASE).expect("lease").is_none());
    }

    #[test]
    fn complete_twice_returns_not_found() {
        let store = store();
        store.enqueue("email", &JobPayload::new(), None).expect("enqueue");
        let leased = store.lease("w1", LEASE).expect("lease").expect("due");
        store.complete(&leased.id, "w1").expect("complete");

        let err = store.complete(&leased.id, "w1").unwrap_err();
        assert!(matches!(err, QueueError::NotFound { .. }));
        let after = store.get(&leased.id).expect("get").expect("row");
        assert_eq!(after.status, JobStatus::Succeeded, "final state unchanged");
    }

    #[test]
    fn complete_by_wrong_worker_returns_not_found() {
        let store = store();
        store.enqueue("email", &JobPayload::new(), None).expect("enqueue");
        let leased = store.lease("w1", LEASE).expect("lease").expect("due");
        let err = store.complete(&leased.id, "w2").unwrap_err();
        assert!(matches!(err, QueueError::NotFound { .. }));
    }

    #[test]
    fn fail_with_retry_applies_backoff() {
        let store = store();
        store.enqueue("email", &JobPayload::new(), None).expect("enqueue");
        let leased = store.lease("w1", LEASE).expect("lease").expect("due");

        let status = store
            .fail(&leased.id, "w1", "connection refused", true)
            .expect("fail");
        assert_eq!(status, JobStatus::Pending);

        let after = store.get(&leased.id).expect("get").expect("row");
        assert_eq!(after.attempts, 1);
        assert_eq!(after.last_error.as_deref(), Some("connection refused"));
        assert!(after.available_at > Utc::now().to_rfc3339(), "backoff in the future");
        // Not eligible until the backoff elapses.
        assert!(store.lease("w2", LEASE).expect("lease").is_none());
    }

    #[test]
    fn fail_without_retry_is_terminal() {
        let store = store();
        store.enqueue("email", &JobPayload::new(), None).expect("enqueue");
        let leased = store.lease("w1", LEASE).expect("lease").expect("due");

        let status = store
            .fail(&leased.id, "w1", "bad recipient", false)
            .expect("fail");
        assert_eq!(status, JobStatus::Failed);
        assert!(store.lease("w2", LEASE).expect("lease").is_none());
    }

    #[test]
    fn attempts_exhausted_is_terminal_even_with_retry() {
        let store = store_with(QueuePolicy {
            max_attempts: 3,
            base_retry_delay_secs: 0,
            max_retry_delay_secs: 0,
        });
        let job = store.enqueue("email", &JobPayload::new(), None).expect("enqueue");

        for attempt in 1..=3u32 {
            let leased = store.lease("w1", LEASE).expect("lease").expect("due");
            assert_eq!(leased.id, job.id);
            let status = store.fail(&leased.id, "w1", "timeout", true).expect("fail");
            if attempt < 3 {
                assert_eq!(status, JobStatus::Pending);
            } else {
                assert_eq!(status, JobStatus::Failed, "third failure is terminal");
            }
        }

        let after = store.get(&job.id).expect("get").expect("row");
        assert_eq!(after.attempts, 3);
        assert_eq!(after.status, JobStatus::Failed);
        assert!(store.lease("w1", LEASE).expect("lease").is_none(), "never retried again");
    }

    #[test]
    fn expired_lease_is_reclaimed() {
        let store = store();
        let job = store.enqueue("email", &JobPayload::new(), None).expect("enqueue");

        // Zero-length lease: expired the instant it is granted.
        let leased = store
            .lease("w1", Duration::ZERO)
            .expect("lease")
            .expect("due");
        assert_eq!(leased.id, job.id);

        std::thread::sleep(Duration::from_millis(5));
        let reclaimed = store.reclaim_expired().expect("reclaim");
        assert_eq!(reclaimed, 1);

        let again = store.lease("w2", LEASE).expect("lease").expect("eligible again");
        assert_eq!(again.id, job.id);
        assert_eq!(again.leased_by.as_deref(), Some("w2"));
    }

    #[test]
    fn lease_reclaims_implicitly() {
        let store = store();
        store.enqueue("email", &JobPayload::new(), None).expect("enqueue");
        store
            .lease("w1", Duration::ZERO)
            .expect("lease")
            .expect("due");
        std::thread::sleep(Duration::from_millis(5));

        // No explicit sweep: the next lease call recovers the record itself.
        let again = store.lease("w2", LEASE).expect("lease");
        assert!(again.is_some());
    }

    #[test]
    fn fail_after_lease_expiry_returns_not_found() {
        let store = store();
        store.enqueue("email", &JobPayload::new(), None).expect("enqueue");
        let leased = store
            .lease("w1", Duration::ZERO)
            .expect("lease")
            .expect("due");
        std::thread::sleep(Duration::from_millis(5));
        store.reclaim_expired().expect("reclaim");

        let err = store.fail(&leased.id, "w1", "late", true).unwrap_err();
        assert!(matches!(err, QueueError::NotFound { .. }));
    }

    #[test]
    fn list_and_purge() {
        let store = store();
        store.enqueue("email", &JobPayload::new(), None).expect("enqueue");
        let leased = store.lease("w1", LEASE).expect("lease").expect("due");
        store.complete(&leased.id, "w1").expect("complete");
        store.enqueue("email", &JobPayload::new(), None).expect("enqueue");

        assert_eq!(store.list(10).expect("list").len(), 2);

        // updated_at of the succeeded row is in the past relative to now.
        std::thread::sleep(Duration::from_millis(5));
        let purged = store.purge_finished(Duration::ZERO).expect("purge");
        assert_eq!(purged, 1);
        assert_eq!(store.list(10).expect("list").len(), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = QueuePolicy {
            max_attempts: 10,
            base_retry_delay_secs: 30,
            max_retry_delay_secs: 120,
        };
        assert_eq!(policy.backoff_delay(1).num_seconds(), 30);
        assert_eq!(policy.backoff_delay(2).num_seconds(), 60);
        assert_eq!(policy.backoff_delay(3).num_seconds(), 120);
        assert_eq!(policy.backoff_delay(9).num_seconds(), 120, "capped");
    }
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_core::config::{CatchUpPolicy, ScheduleConfig};
use courier_queue::QueueStore;
use rusqlite::Connection;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::db::init_db;
use crate::error::Result;

/// Periodic producer: enqueues the configured job template on every tick.
pub struct ScheduleEngine {
    conn: Mutex<Connection>,
    store: Arc<QueueStore>,
    config: ScheduleConfig,
}

impl ScheduleEngine {
    /// Create a new engine, initialising the state schema if needed.
    ///
    /// `conn` holds only the `schedule_state` row; job records go through
    /// `store`.
    pub fn new(conn: Connection, store: Arc<QueueStore>, config: ScheduleConfig) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            store,
            config,
        })
    }

    /// Main loop. Fires every `interval_secs` until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval_secs,
            kind = %self.config.job.kind,
            "schedule engine started"
        );

        if needs_catch_up(
            self.config.catch_up,
            self.last_fired(),
            Utc::now(),
            self.config.interval_secs,
        ) {
            warn!("last fire is older than one interval — enqueuing make-up job");
            self.fire();
        }

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(match self.config.catch_up {
            CatchUpPolicy::Skip => MissedTickBehavior::Skip,
            CatchUpPolicy::Oldest => MissedTickBehavior::Delay,
        });
        // The first tick completes immediately; consume it so the cadence
        // starts one interval from now.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.fire();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("schedule engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    // --- private helpers ---------------------------------------------------

    /// Enqueue one instance of the configured job template.
    ///
    /// Enqueue failures are logged, not propagated: one missed fire is never
    /// fatal, the next tick tries again.
    fn fire(&self) {
        let job = &self.config.job;
        match self.store.enqueue(&job.kind, &job.payload, None) {
            Ok(record) => {
                info!(job_id = %record.id, kind = %record.kind, "scheduled job enqueued");
                self.record_fired(Utc::now());
            }
            Err(e) => error!("scheduled enqueue failed: {e}"),
        }
    }

    fn record_fired(&self, at: DateTime<Utc>) {
        let conn = self.conn.lock().unwrap();
        if let Err(e) = conn.execute(
            "UPDATE schedule_state SET last_fired_at = ?1 WHERE id = 1",
            rusqlite::params![at.to_rfc3339()],
        ) {
            warn!("failed to persist last fire time: {e}");
        }
    }

    fn last_fired(&self) -> Option<DateTime<Utc>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT last_fired_at FROM schedule_state WHERE id = 1",
            [],
            |row| row.get::<_, Option<String>>(0),
        )
        .ok()
        .flatten()
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
    }
}

/// A make-up fire is due when the policy allows it and the last recorded
/// fire is at least one interval old. A store with no recorded fire has
/// nothing to make up.
fn needs_catch_up(
    policy: CatchUpPolicy,
    last_fired: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval_secs: u64,
) -> bool {
    if policy != CatchUpPolicy::Oldest {
        return false;
    }
    match last_fired {
        Some(last) => now - last >= chrono::Duration::seconds(interval_secs.max(1) as i64),
        None => false,
    }
}

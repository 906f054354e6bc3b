use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::JobPayload;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_RETRY_DELAY_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRY_DELAY_SECS: u64 = 3600; // cap exponential backoff at 1h
pub const DEFAULT_SCHEDULE_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_LEASE_SECS: u64 = 60;
pub const DEFAULT_RECLAIM_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Top-level config (courier.toml + COURIER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourierConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    /// When absent, email jobs are logged instead of delivered.
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Retry policy applied by the queue store on `fail(retry=true)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Total execution attempts before a job is terminally failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay; doubles on each further attempt.
    #[serde(default = "default_base_retry_delay")]
    pub base_retry_delay_secs: u64,
    /// Upper bound on the backoff delay.
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_retry_delay_secs: DEFAULT_BASE_RETRY_DELAY_SECS,
            max_retry_delay_secs: DEFAULT_MAX_RETRY_DELAY_SECS,
        }
    }
}

/// What to do about ticks that elapsed while the scheduler process was down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUpPolicy {
    /// Wall-clock cadence only; elapsed ticks are dropped.
    Skip,
    /// Fire one make-up enqueue at startup when the last recorded tick is
    /// older than the interval, then resume normal cadence.
    Oldest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_schedule_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_catch_up")]
    pub catch_up: CatchUpPolicy,
    #[serde(default)]
    pub job: JobTemplate,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SCHEDULE_INTERVAL_SECS,
            catch_up: CatchUpPolicy::Skip,
            job: JobTemplate::default(),
        }
    }
}

/// The job the scheduler enqueues on every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTemplate {
    #[serde(default = "default_job_kind")]
    pub kind: String,
    #[serde(default)]
    pub payload: JobPayload,
}

impl Default for JobTemplate {
    fn default() -> Self {
        Self {
            kind: default_job_kind(),
            payload: JobPayload::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Sleep between lease attempts when the queue is empty.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// How long a leased job stays claimed before it is reclaimable.
    #[serde(default = "default_lease")]
    pub lease_secs: u64,
    #[serde(default = "default_reclaim_interval")]
    pub reclaim_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            lease_secs: DEFAULT_LEASE_SECS,
            reclaim_interval_secs: DEFAULT_RECLAIM_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default = "default_smtp_from")]
    pub from: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_retry_delay() -> u64 {
    DEFAULT_BASE_RETRY_DELAY_SECS
}
fn default_max_retry_delay() -> u64 {
    DEFAULT_MAX_RETRY_DELAY_SECS
}
fn default_schedule_interval() -> u64 {
    DEFAULT_SCHEDULE_INTERVAL_SECS
}
fn default_catch_up() -> CatchUpPolicy {
    CatchUpPolicy::Skip
}
fn default_job_kind() -> String {
    "email".to_string()
}
fn default_workers() -> usize {
    DEFAULT_WORKERS
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_lease() -> u64 {
    DEFAULT_LEASE_SECS
}
fn default_reclaim_interval() -> u64 {
    DEFAULT_RECLAIM_INTERVAL_SECS
}
fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}
fn default_smtp_from() -> String {
    "courier@localhost".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.courier/courier.db", home)
}

impl CourierConfig {
    /// Load config from a TOML file with COURIER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. COURIER_CONFIG env var
    ///   3. ~/.courier/courier.toml
    ///
    /// A missing file is fine: defaults apply and env overrides still work.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("COURIER_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: CourierConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("COURIER_").split("_"))
            .extract()
            .map_err(|e| crate::error::CourierError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.courier/courier.toml", home)
}

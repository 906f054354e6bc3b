use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use courier_core::types::JobPayload;
use courier_core::CourierConfig;
use courier_executor::ExecutorRegistry;
use courier_mailer::{EmailHandler, LogMailer, MailTransport, SmtpMailer};
use courier_queue::{QueuePolicy, QueueStore};
use courier_scheduler::ScheduleEngine;
use courier_worker::WorkerPool;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Durable email job queue: scheduler, workers, and a send CLI"
)]
struct Cli {
    /// Path to courier.toml (default: COURIER_CONFIG, then ~/.courier/courier.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue one email job immediately and print the assigned job id.
    SendEmail {
        #[arg(long)]
        to: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
        /// Defer eligibility by this many seconds.
        #[arg(long)]
        delay_secs: Option<u64>,
    },
    /// Run the worker pool until interrupted.
    Worker,
    /// Run the schedule engine until interrupted.
    Scheduler,
    /// List recent jobs with their status and attempts.
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete succeeded/failed jobs older than the cutoff.
    Purge {
        #[arg(long, default_value_t = 24)]
        older_than_hours: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("COURIER_LOG").unwrap_or_else(|_| {
                "courier_cli=info,courier_queue=info,courier_scheduler=info,\
                 courier_worker=info,courier_mailer=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = CourierConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({e}), using defaults");
        CourierConfig::default()
    });

    ensure_parent_dir(&config.database.path);

    match cli.command {
        Command::SendEmail {
            to,
            subject,
            title,
            body,
            delay_secs,
        } => {
            let store = open_store(&config)?;
            let mut payload = JobPayload::new();
            payload.insert("to".to_string(), to);
            if let Some(s) = subject {
                payload.insert("subject".to_string(), s);
            }
            if let Some(t) = title {
                payload.insert("title".to_string(), t);
            }
            if let Some(b) = body {
                payload.insert("body".to_string(), b);
            }

            let job = store.enqueue("email", &payload, delay_secs.map(Duration::from_secs))?;
            println!("{}", job.id);
        }

        Command::Worker => {
            let store = Arc::new(open_store(&config)?);
            let registry = Arc::new(build_registry(&config)?);
            let pool = WorkerPool::new(store, registry, config.worker.clone());
            info!("worker pool running — ctrl-c to stop");
            pool.run(shutdown_signal()).await;
        }

        Command::Scheduler => {
            let store = Arc::new(open_store(&config)?);
            let engine = ScheduleEngine::new(open_db(&config)?, store, config.schedule.clone())?;
            info!("schedule engine running — ctrl-c to stop");
            engine.run(shutdown_signal()).await;
        }

        Command::Jobs { limit } => {
            let store = open_store(&config)?;
            for job in store.list(limit)? {
                let error_suffix = job
                    .last_error
                    .map(|e| format!("  last_error={e}"))
                    .unwrap_or_default();
                println!(
                    "{}  {:<12} {:<9} attempts={} available_at={}{}",
                    job.id, job.kind, job.status, job.attempts, job.available_at, error_suffix
                );
            }
        }

        Command::Purge { older_than_hours } => {
            let store = open_store(&config)?;
            let n = store.purge_finished(Duration::from_secs(older_than_hours * 3600))?;
            println!("purged {n} finished jobs");
        }
    }

    Ok(())
}

/// Open the shared SQLite file. WAL so the scheduler, workers, and one-shot
/// commands can share it across processes; busy_timeout so writers queue
/// instead of failing fast.
fn open_db(config: &CourierConfig) -> anyhow::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(&config.database.path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    Ok(conn)
}

fn open_store(config: &CourierConfig) -> anyhow::Result<QueueStore> {
    let conn = open_db(config)?;
    Ok(QueueStore::new(conn, QueuePolicy::from(&config.queue))?)
}

/// Wire the fixed set of job handlers. Falls back to the log-only transport
/// when no `[smtp]` section is configured.
fn build_registry(config: &CourierConfig) -> anyhow::Result<ExecutorRegistry> {
    let transport: Box<dyn MailTransport> = match &config.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "SMTP transport configured");
            Box::new(SmtpMailer::new(smtp)?)
        }
        None => {
            warn!("no [smtp] config — emails will be logged, not delivered");
            Box::new(LogMailer)
        }
    };

    let mut registry = ExecutorRegistry::new();
    registry.register("email", Box::new(EmailHandler::new(transport)));
    Ok(registry)
}

/// Flip a watch channel to true on ctrl-c.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
    rx
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

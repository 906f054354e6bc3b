//! `courier-queue` — durable job queue over SQLite.
//!
//! # Overview
//!
//! Job records live in a single `jobs` table. Producers insert rows with
//! [`store::QueueStore::enqueue`]; workers claim them with
//! [`store::QueueStore::lease`], which is the sole serialisation point between
//! concurrent consumers. Every record moves `pending → leased` and then either
//! `→ succeeded`, `→ failed` (terminal), or back `→ pending` for a retry with
//! exponential backoff or after the lease expires.
//!
//! # Lifecycle
//!
//! | Transition            | Trigger                                      |
//! |-----------------------|----------------------------------------------|
//! | `pending → leased`    | `lease` (atomic, at most one worker per job) |
//! | `leased → succeeded`  | `complete`                                   |
//! | `leased → pending`    | `fail(retry)` with attempts left, or expiry  |
//! | `leased → failed`     | `fail` with attempts exhausted or no retry   |

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{QueueError, Result};
pub use store::{QueuePolicy, QueueStore};
pub use types::{JobRecord, JobStatus};

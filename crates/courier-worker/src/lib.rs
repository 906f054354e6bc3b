//! `courier-worker` — continuously lease and execute jobs.
//!
//! A [`pool::WorkerPool`] runs N independent worker tasks against the shared
//! queue store. Workers coordinate through `lease` alone; there is no
//! cross-worker state. A handler error becomes a `fail` transition on the
//! record, never a worker crash; a crashed worker's in-flight job comes back
//! through lease expiry, swept by the pool's reclamation task.

pub mod pool;

pub use pool::WorkerPool;

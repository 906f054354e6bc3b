//! `courier-scheduler` — periodic job enqueuing on a fixed cadence.
//!
//! The [`engine::ScheduleEngine`] ticks at a configured interval and enqueues
//! the configured job template into the queue store on every tick. Triggering
//! is fully decoupled from execution: the engine never waits for a job to run,
//! and a failed enqueue is logged and retried on the next tick.
//!
//! Ticks missed while the process was down are governed by
//! [`courier_core::config::CatchUpPolicy`]: dropped (`skip`, the default) or
//! made up with a single startup fire (`oldest`), decided against the
//! `last_fired_at` persisted in the `schedule_state` table.

pub mod db;
pub mod engine;
pub mod error;

pub use engine::ScheduleEngine;
pub use error::{Result, ScheduleError};

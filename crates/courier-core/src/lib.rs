//! `courier-core` — shared configuration and error types.
//!
//! Everything here is consumed by the other courier crates: the figment-based
//! [`config::CourierConfig`] loader, the [`types::JobPayload`] map that travels
//! with every job, and the top-level [`error::CourierError`].

pub mod config;
pub mod error;
pub mod types;

pub use config::CourierConfig;
pub use error::{CourierError, Result};
pub use types::JobPayload;

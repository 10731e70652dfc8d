//! # Observability
//!
//! Logging setup for hosts embedding the broker.

pub mod logging;

pub use logging::{init_logging, LoggingConfig};

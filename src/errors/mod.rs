//! # Error Handling
//!
//! Error types shared by every stage of the credential broker.

mod types;

pub use types::{Error, Result, ResultExt};

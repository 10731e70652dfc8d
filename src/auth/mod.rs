//! # Authentication
//!
//! Session login against the secrets server's GCP auth method.

pub mod login;

pub use login::SessionLogin;

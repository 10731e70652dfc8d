//! Secrets server (HashiCorp Vault) HTTP client.
//!
//! The broker treats the secrets server as a key-value request/response
//! interface: logical reads and writes under `/v1/<path>`, the auth login
//! write, and a token self-lookup for revocation checks.

pub mod client;
pub mod types;

pub use client::VaultClient;
pub use types::{SecretAuth, VaultSecret};

//! # gcp-vault
//!
//! Authenticates a workload running on Google Cloud against HashiCorp Vault
//! using its ambient service account identity, then reads and writes secrets
//! on its behalf.
//!
//! ## Flow
//!
//! ```text
//! CredentialBroker → TokenCache::get_token ──(valid)──────────────────────┐
//!        │                    └──(miss/expired/revoked)                    │
//!        ↓                                                                 ↓
//! IdentityResolver → AssertionSigner (IAM signJwt) → SessionLogin → Vault read/write
//!                                                          │
//!                                               TokenCache::save_token
//! ```
//!
//! ## Core Components
//!
//! - **IdentityResolver**: service account email and project from ambient
//!   credentials, falling back to the metadata server
//! - **AssertionSigner**: IAM-signed JWT addressed to `vault/<role>`, retried
//!   with exponential backoff
//! - **SessionLogin**: exchanges the assertion at `<auth_path>/login`, or adopts
//!   a local token
//! - **TokenCache**: shared session token in Cloud Storage or Redis, with
//!   jittered refresh and optional revocation checks
//! - **CredentialBroker**: the login state machine and the secret operations
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use gcp_vault::{Config, CredentialBroker, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config {
//!         secret_path: "secret/data/my-service".to_string(),
//!         vault_address: "https://vault.example.com:8200".to_string(),
//!         role: "my-service".to_string(),
//!         token_cache_storage_gcs: Some("my-token-bucket".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let broker = CredentialBroker::new(config)?;
//!     let secrets = broker.get_versioned_secrets().await?;
//!     println!("loaded {} secrets", secrets.len());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod broker;
pub mod cache;
pub mod config;
pub mod errors;
pub mod identity;
pub mod observability;
pub mod secrets;
pub mod utils;
pub mod vault;

// Re-export commonly used types and traits
pub use broker::{
    get_secrets, get_versioned_secrets, put_secrets, put_versioned_secrets, CredentialBroker,
    CredentialBrokerBuilder, SecretsTeller,
};
pub use cache::{InMemoryTokenCache, KeyValueTokenCache, ObjectStoreTokenCache, Token, TokenCache};
pub use config::{CacheBackend, Config, RevocationCheck};
pub use errors::{Error, Result};
pub use observability::{init_logging, LoggingConfig};
pub use secrets::{SecretMap, SecretString};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

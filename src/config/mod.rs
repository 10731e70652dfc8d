//! # Configuration Management
//!
//! Process-wide broker configuration: where the secrets live, how to log in,
//! and which token cache backend (if any) to share across instances.

mod settings;

pub use settings::{
    CacheBackend, Config, RevocationCheck, DEFAULT_AUTH_PATH, DEFAULT_CACHE_TIMEOUT_SECS,
    DEFAULT_REFRESH_THRESHOLD_SECS, DEFAULT_TOKEN_CACHE_KEY, ENV_PREFIX,
};

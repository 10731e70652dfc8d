//! # Configuration Settings
//!
//! Defines the broker configuration. A `Config` is immutable once a broker is
//! built from it; defaults mirror the secrets server's GCP auth conventions.

use crate::errors::{Error, Result};
use crate::secrets::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Default mount path of the GCP auth method
pub const DEFAULT_AUTH_PATH: &str = "auth/gcp";

/// Default key under which the session token is cached
pub const DEFAULT_TOKEN_CACHE_KEY: &str = "token-cache";

/// Default refresh threshold for cached tokens, in seconds
pub const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 300;

/// Default timeout for a single cache operation, in seconds
pub const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 30;

/// Prefix for environment overrides read by [`Config::load`]
pub const ENV_PREFIX: &str = "GCPVAULT";

/// Broker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Location of the secrets to read or write
    pub secret_path: String,

    /// Address of the secrets server
    #[validate(length(min = 1, message = "Vault address cannot be empty"))]
    pub vault_address: String,

    /// Role bound to the service account in the GCP auth method
    pub role: String,

    /// Pre-issued token for local development; skips identity and caching
    pub local_token: Option<SecretString>,

    /// Mount path of the GCP auth method
    pub auth_path: String,

    /// Retries applied to JWT signing
    #[validate(range(max = 20, message = "Max retries must be at most 20"))]
    pub max_retries: u32,

    /// First backoff interval between signing attempts
    #[validate(range(min = 1, message = "Initial backoff must be at least 1ms"))]
    pub signing_initial_backoff_ms: u64,

    /// Upper bound on the backoff interval between signing attempts
    #[validate(range(min = 1, message = "Max backoff must be at least 1ms"))]
    pub signing_max_backoff_ms: u64,

    /// Timeout applied to every outbound HTTP request
    #[validate(range(min = 1, max = 600, message = "Timeout must be between 1 and 600 seconds"))]
    pub request_timeout_secs: u64,

    /// Override for the IAM signing service (tests only)
    pub iam_address: Option<String>,

    /// Override for the compute metadata service (tests only)
    pub metadata_address: Option<String>,

    /// Object-store bucket holding the cached token
    pub token_cache_storage_gcs: Option<String>,

    /// Override for the object-store endpoint (tests only)
    pub token_cache_gcs_address: Option<String>,

    /// Key-value store `host:port` holding the cached token
    pub token_cache_storage_redis: Option<String>,

    /// Object name or key of the cached token
    pub token_cache_key_name: String,

    /// Refresh a cached token once it is this close to expiry
    pub cached_token_refresh_threshold_secs: u64,

    /// Upper bound of the random offset subtracted from the refresh deadline;
    /// half the threshold when unset
    pub cached_token_random_offset_secs: Option<u64>,

    /// Timeout for a single cache read or write, including the connect
    pub token_cache_timeout_secs: u64,

    /// When to verify a cached token against the secrets server
    pub revocation_check: RevocationCheck,

    /// Window used by [`RevocationCheck::NearExpiry`]
    pub revocation_check_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret_path: String::new(),
            vault_address: "https://127.0.0.1:8200".to_string(),
            role: String::new(),
            local_token: None,
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            max_retries: 2,
            signing_initial_backoff_ms: 500,
            signing_max_backoff_ms: 30_000,
            request_timeout_secs: 60,
            iam_address: None,
            metadata_address: None,
            token_cache_storage_gcs: None,
            token_cache_gcs_address: None,
            token_cache_storage_redis: None,
            token_cache_key_name: DEFAULT_TOKEN_CACHE_KEY.to_string(),
            cached_token_refresh_threshold_secs: DEFAULT_REFRESH_THRESHOLD_SECS,
            cached_token_random_offset_secs: None,
            token_cache_timeout_secs: DEFAULT_CACHE_TIMEOUT_SECS,
            revocation_check: RevocationCheck::Never,
            revocation_check_window_secs: 900,
        }
    }
}

/// Policy for checking a cached token against the secrets server before use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RevocationCheck {
    /// Trust any unexpired cached token
    #[default]
    Never,
    /// Look the token up before every reuse
    Always,
    /// Look the token up only when it expires within the configured window
    NearExpiry,
}

/// Token cache backend selected by configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    /// Object-store bucket
    ObjectStore { bucket: String },
    /// Key-value store address
    KeyValue { address: String },
}

impl Config {
    /// Load configuration from an optional file plus `GCPVAULT_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder =
            builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let mut loaded: Config = builder.build()?.try_deserialize()?;
        loaded.apply_defaults();
        Ok(loaded)
    }

    /// Replace empty or zero values with their defaults
    pub fn apply_defaults(&mut self) {
        if self.auth_path.trim().is_empty() {
            self.auth_path = DEFAULT_AUTH_PATH.to_string();
        }
        if self.token_cache_key_name.trim().is_empty() {
            self.token_cache_key_name = DEFAULT_TOKEN_CACHE_KEY.to_string();
        }
        if self.cached_token_refresh_threshold_secs == 0 {
            self.cached_token_refresh_threshold_secs = DEFAULT_REFRESH_THRESHOLD_SECS;
        }
        if self.token_cache_timeout_secs == 0 {
            self.token_cache_timeout_secs = DEFAULT_CACHE_TIMEOUT_SECS;
        }
        if self.local_token.as_ref().is_some_and(|t| t.is_empty()) {
            self.local_token = None;
        }
        for field in [
            &mut self.token_cache_storage_gcs,
            &mut self.token_cache_storage_redis,
            &mut self.iam_address,
            &mut self.metadata_address,
            &mut self.token_cache_gcs_address,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        self.cache_backend()?;

        if self.signing_initial_backoff_ms > self.signing_max_backoff_ms {
            return Err(Error::config("Initial signing backoff cannot exceed the max backoff"));
        }

        if self.random_offset() > self.refresh_threshold() {
            return Err(Error::config(format!(
                "Cached token random offset ({}s) cannot exceed the refresh threshold ({}s)",
                self.random_offset().as_secs(),
                self.cached_token_refresh_threshold_secs
            )));
        }

        url::Url::parse(&self.vault_address)
            .map_err(|e| Error::config(format!("Invalid Vault address: {}", e)))?;

        Ok(())
    }

    /// The configured cache backend, if any
    pub fn cache_backend(&self) -> Result<Option<CacheBackend>> {
        match (&self.token_cache_storage_gcs, &self.token_cache_storage_redis) {
            (Some(bucket), Some(address)) => Err(Error::configuration_conflict(format!(
                "token cache configured for both bucket '{}' and key-value store '{}'",
                bucket, address
            ))),
            (Some(bucket), None) => Ok(Some(CacheBackend::ObjectStore { bucket: bucket.clone() })),
            (None, Some(address)) => {
                Ok(Some(CacheBackend::KeyValue { address: address.clone() }))
            }
            (None, None) => Ok(None),
        }
    }

    /// Refresh threshold as Duration
    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.cached_token_refresh_threshold_secs)
    }

    /// Random offset bound as Duration
    pub fn random_offset(&self) -> Duration {
        Duration::from_secs(
            self.cached_token_random_offset_secs
                .unwrap_or(self.cached_token_refresh_threshold_secs / 2),
        )
    }

    /// Cache operation timeout as Duration
    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.token_cache_timeout_secs)
    }

    /// Outbound request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Revocation window as Duration
    pub fn revocation_window(&self) -> Duration {
        Duration::from_secs(self.revocation_check_window_secs)
    }
}

//! # Credential broker
//!
//! Authenticates to the secrets server with the workload's GCP identity and
//! reads or writes secrets on its behalf.
//!
//! Every operation runs the full login decision on its own:
//!
//! 1. A configured local token is used as-is. Identity and cache are skipped.
//! 2. Otherwise a cached token is reused while it is neither due for refresh
//!    nor (when the revocation policy asks) revoked.
//! 3. Otherwise the broker resolves the identity, has IAM sign an assertion,
//!    logs in, and writes the new token back to the cache.
//!
//! Concurrent callers are not coordinated. Two of them may both log in after
//! a miss; both tokens are valid and the cache keeps the last write.

pub mod teller;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn, Instrument, Span};

use crate::auth::SessionLogin;
use crate::cache::{
    self, is_revoked, JitterSource, RefreshPolicy, SeededJitter, Token, TokenCache,
};
use crate::config::Config;
use crate::errors::{Error, Result, ResultExt};
use crate::identity::{
    AssertionSigner, CredentialsFinder, DefaultCredentialsFinder, IdentityResolver, MetadataClient,
};
use crate::secrets::{unwrap_versioned, wrap_versioned, SecretMap};
use crate::utils::default_http_client;
use crate::utils::retry::ExponentialBackoff;
use crate::vault::VaultClient;

pub use teller::SecretsTeller;

/// Where the session token of a login came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenSource {
    Local,
    Cache,
    Login,
}

impl TokenSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cache => "cache",
            Self::Login => "login",
        }
    }
}

/// Orchestrates identity, signing, login and token caching
#[derive(Debug, Clone)]
pub struct CredentialBroker {
    config: Config,
    session: SessionLogin,
    resolver: IdentityResolver,
    signer: AssertionSigner,
    cache: Option<Arc<dyn TokenCache>>,
    policy: RefreshPolicy,
}

/// Builder for [`CredentialBroker`] with optional injected collaborators
#[derive(Debug)]
pub struct CredentialBrokerBuilder {
    config: Config,
    http: Option<reqwest::Client>,
    token_cache: Option<Arc<dyn TokenCache>>,
    credentials: Option<Arc<dyn CredentialsFinder>>,
    jitter: Option<Arc<dyn JitterSource>>,
}

impl CredentialBrokerBuilder {
    pub fn new(config: Config) -> Self {
        Self { config, http: None, token_cache: None, credentials: None, jitter: None }
    }

    /// HTTP client for every outbound call; its timeout and transport are kept
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Cache backend to use instead of one selected by configuration
    pub fn token_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.token_cache = Some(cache);
        self
    }

    /// Credentials lookup to use instead of application-default discovery
    pub fn credentials_finder(mut self, finder: Arc<dyn CredentialsFinder>) -> Self {
        self.credentials = Some(finder);
        self
    }

    /// Jitter source for cache refresh decisions
    pub fn jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn build(self) -> Result<CredentialBroker> {
        let mut config = self.config;
        config.apply_defaults();
        config.validate()?;

        if self.token_cache.is_some() {
            if let Some(backend) = config.cache_backend()? {
                return Err(Error::configuration_conflict(format!(
                    "a token cache was supplied but configuration also selects {:?}",
                    backend
                )));
            }
        }

        let http = match self.http {
            Some(http) => http,
            None => default_http_client(config.request_timeout())?,
        };

        let metadata = MetadataClient::new(http.clone(), config.metadata_address.as_deref());
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(DefaultCredentialsFinder::new(metadata.clone())));

        let cache = match self.token_cache {
            Some(cache) => Some(cache),
            None => cache::from_config(&config, http.clone(), credentials.clone())?,
        };

        let backoff = ExponentialBackoff::new(
            config.max_retries,
            Duration::from_millis(config.signing_initial_backoff_ms),
            Duration::from_millis(config.signing_max_backoff_ms),
        );
        let signer = AssertionSigner::new(http.clone(), config.iam_address.as_deref(), backoff);
        let resolver = IdentityResolver::new(credentials, metadata);
        let session =
            SessionLogin::new(http, &config.vault_address, &config.auth_path, &config.role);

        let jitter = self.jitter.unwrap_or_else(|| Arc::new(SeededJitter::from_entropy()));
        let policy = RefreshPolicy::from_config(&config, jitter);

        if let Some(cache) = &cache {
            debug!(backend = cache.backend_name(), "token cache enabled");
        }

        Ok(CredentialBroker { config, session, resolver, signer, cache, policy })
    }
}

impl CredentialBroker {
    /// Broker with every collaborator derived from `config`
    pub fn new(config: Config) -> Result<Self> {
        CredentialBrokerBuilder::new(config).build()
    }

    pub fn builder(config: Config) -> CredentialBrokerBuilder {
        CredentialBrokerBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read the secrets at the configured path.
    ///
    /// Fails with [`Error::NoSecretsFound`] when the response has no data; any
    /// warnings the server sent become the error detail.
    pub async fn get_secrets(&self) -> Result<SecretMap> {
        let span = crate::broker_span!("get_secrets", self.config.secret_path);
        async {
            let client = self.authenticated().await?;
            let secret = client
                .read(&self.config.secret_path)
                .await
                .context("unable to get secrets")?
                .ok_or_else(|| Error::no_secrets_found("no secrets found"))?;

            let warnings = secret.warnings().to_vec();
            match secret.data {
                Some(data) if !data.is_empty() => Ok(data),
                _ if !warnings.is_empty() => Err(Error::no_secrets_found(warnings.join(","))),
                _ => Err(Error::no_secrets_found("no secrets found")),
            }
        }
        .instrument(span)
        .await
    }

    /// Write `secrets` as the full body at the configured path
    pub async fn put_secrets(&self, secrets: &SecretMap) -> Result<()> {
        let span = crate::broker_span!("put_secrets", self.config.secret_path);
        async {
            let client = self.authenticated().await?;
            client
                .write(&self.config.secret_path, &serde_json::Value::Object(secrets.clone()))
                .await
                .context("unable to make vault request")?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Read versioned secrets, unwrapping the `data` envelope
    pub async fn get_versioned_secrets(&self) -> Result<SecretMap> {
        unwrap_versioned(self.get_secrets().await?)
    }

    /// Write versioned secrets as a raw POST of `{"data": secrets}`
    pub async fn put_versioned_secrets(&self, secrets: &SecretMap) -> Result<()> {
        let span = crate::broker_span!("put_versioned_secrets", self.config.secret_path);
        async {
            let client = self.authenticated().await?;
            client
                .raw_post(&self.config.secret_path, &wrap_versioned(secrets))
                .await
                .context("unable to make vault request")?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Login for a secret operation, recording where the token came from on
    /// the operation's span
    async fn authenticated(&self) -> Result<VaultClient> {
        let (client, source) =
            self.login_with_source().await.context("unable to login to vault")?;
        Span::current().record("token_source", source.as_str());
        Ok(client)
    }

    /// An authenticated client, from the local token, the cache, or a fresh
    /// login.
    pub async fn login(&self) -> Result<VaultClient> {
        self.login_with_source().await.map(|(client, _)| client)
    }

    #[instrument(skip(self), fields(role = %self.config.role))]
    async fn login_with_source(&self) -> Result<(VaultClient, TokenSource)> {
        if let Some(token) = &self.config.local_token {
            debug!("using local token");
            return Ok((self.session.local(token)?, TokenSource::Local));
        }

        let Some(cache) = &self.cache else {
            return Ok((self.full_login(None).await?, TokenSource::Login));
        };

        match self.with_cache_timeout(cache.as_ref(), cache.get_token()).await {
            Ok(Some(token)) => {
                if let Some(client) = self.reuse(&token).await? {
                    return Ok((client, TokenSource::Cache));
                }
            }
            Ok(None) => debug!(backend = cache.backend_name(), "token cache miss"),
            Err(e) => warn!(
                backend = cache.backend_name(),
                error = %e,
                "token cache read failed, logging in"
            ),
        }

        Ok((self.full_login(Some(cache.as_ref())).await?, TokenSource::Login))
    }

    async fn reuse(&self, token: &Token) -> Result<Option<VaultClient>> {
        let now = Utc::now();
        if self.policy.is_expired(token, now) {
            info!(expires = %token.expires, "cached token is expired");
            return Ok(None);
        }

        let client = self.session.local(&token.token)?;
        if self.policy.should_check_revocation(token, now) && is_revoked(&client).await {
            return Ok(None);
        }

        info!(expires = %token.expires, "retrieved token from cache");
        Ok(Some(client))
    }

    async fn full_login(&self, cache: Option<&dyn TokenCache>) -> Result<VaultClient> {
        info!("getting new token from vault");

        let identity = self
            .resolver
            .resolve()
            .await
            .context("unable to get service account from environment")?;
        let jwt = self.signer.sign(&identity, &self.config.role).await?;

        let mut client = self.session.client()?;
        let token = self.session.exchange(&mut client, &jwt).await?;

        if let Some(cache) = cache {
            self.with_cache_timeout(cache, cache.save_token(&token))
                .await
                .context("unable to save token to cache")?;
        }

        Ok(client)
    }

    async fn with_cache_timeout<T>(
        &self,
        cache: &dyn TokenCache,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.config.cache_timeout();
        match tokio::time::timeout(timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(Error::cache_unavailable(
                cache.backend_name(),
                format!("operation timed out after {:?}", timeout),
            )),
        }
    }
}

/// Read the secrets at `config.secret_path`
pub async fn get_secrets(config: Config) -> Result<SecretMap> {
    CredentialBroker::new(config)?.get_secrets().await
}

/// Write `secrets` at `config.secret_path`
pub async fn put_secrets(config: Config, secrets: &SecretMap) -> Result<()> {
    CredentialBroker::new(config)?.put_secrets(secrets).await
}

/// Read versioned secrets at `config.secret_path`
pub async fn get_versioned_secrets(config: Config) -> Result<SecretMap> {
    CredentialBroker::new(config)?.get_versioned_secrets().await
}

/// Write versioned secrets at `config.secret_path`
pub async fn put_versioned_secrets(config: Config, secrets: &SecretMap) -> Result<()> {
    CredentialBroker::new(config)?.put_versioned_secrets(secrets).await
}

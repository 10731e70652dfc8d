//! Signs the identity assertion presented to the secrets server.
//!
//! The assertion is a JWT whose payload names the service account (`sub`),
//! the auth role (`aud = "vault/<role>"`) and a five minute expiry. IAM's
//! `signJwt` signs it with a Google-managed key of the service account, so no
//! private key ever leaves Google.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::resolver::ResolvedIdentity;
use crate::errors::{Error, Result};
use crate::utils::retry::{with_retry, ExponentialBackoff};
use crate::utils::{join_url, truncate_body};

/// Default address of the IAM API
pub const DEFAULT_IAM_ADDRESS: &str = "https://iam.googleapis.com";

/// Audience scheme expected by the GCP auth method
pub const AUDIENCE_SCHEME: &str = "vault";

/// Lifetime of a signed assertion
pub const ASSERTION_LIFETIME_SECS: i64 = 5 * 60;

/// Payload of the identity assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub aud: String,
    pub sub: String,
    pub exp: i64,
}

impl AssertionClaims {
    /// Claims for `identity` against `role`, expiring five minutes from now
    pub fn new(service_account: &str, role: &str) -> Self {
        Self {
            aud: format!("{}/{}", AUDIENCE_SCHEME, role),
            sub: service_account.to_string(),
            exp: (Utc::now() + ChronoDuration::seconds(ASSERTION_LIFETIME_SECS)).timestamp(),
        }
    }
}

#[derive(Serialize)]
struct SignJwtRequest {
    payload: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignJwtResponse {
    signed_jwt: String,
}

/// Client for IAM `serviceAccounts.signJwt`
#[derive(Debug, Clone)]
pub struct AssertionSigner {
    http: reqwest::Client,
    iam_address: String,
    backoff: ExponentialBackoff,
}

impl AssertionSigner {
    /// Uses the caller's HTTP client (transport and timeout); authorization is
    /// added per request from the identity's token source.
    pub fn new(
        http: reqwest::Client,
        iam_address: Option<&str>,
        backoff: ExponentialBackoff,
    ) -> Self {
        Self {
            http,
            iam_address: iam_address
                .unwrap_or(DEFAULT_IAM_ADDRESS)
                .trim_end_matches('/')
                .to_string(),
            backoff,
        }
    }

    /// Sign an assertion for `identity` addressed to `role`.
    ///
    /// Each attempt rebuilds the claims so the expiry reflects signing time.
    /// After `max_retries` failed retries the last error is wrapped in
    /// [`Error::SigningFailed`].
    #[instrument(skip(self, identity), fields(service_account = %identity.email, role = %role))]
    pub async fn sign(&self, identity: &ResolvedIdentity, role: &str) -> Result<String> {
        let result = with_retry(&self.backoff, "sign_jwt", || self.sign_once(identity, role)).await;

        match result {
            Ok(jwt) => {
                info!(service_account = %identity.email, role = %role, "signed identity assertion");
                Ok(jwt)
            }
            Err(e) => Err(Error::signing_failed(self.backoff.max_retries, e)),
        }
    }

    async fn sign_once(&self, identity: &ResolvedIdentity, role: &str) -> Result<String> {
        let claims = AssertionClaims::new(&identity.email, role);
        let request = SignJwtRequest { payload: serde_json::to_string(&claims)? };

        let access_token = identity.token_source.access_token().await?;
        let url = join_url(&self.iam_address, &format!("v1/{}:signJwt", identity.resource_name()));
        debug!(url = %url, "requesting JWT signature");

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::iam(status.as_u16(), truncate_body(&body, 200)));
        }

        let signed: SignJwtResponse = response.json().await?;
        Ok(signed.signed_jwt)
    }
}

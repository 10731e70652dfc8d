//! # Workload identity
//!
//! Everything needed to prove who the workload is: ambient credential
//! discovery, the metadata server fallback for the service account email,
//! `yup_oauth2` access tokens for Google APIs, and the IAM-signed assertion
//! presented to the secrets server.

pub mod credentials;
pub mod metadata;
pub mod resolver;
pub mod signer;
pub mod token_source;

pub use credentials::{
    well_known_file, AmbientCredentials, CredentialsFinder, DefaultCredentialsFinder,
    CREDENTIALS_ENV_VAR,
};
pub use metadata::{MetadataClient, DEFAULT_METADATA_ADDRESS};
pub use resolver::{IdentityResolver, ResolvedIdentity, WILDCARD_PROJECT};
pub use signer::{AssertionClaims, AssertionSigner, DEFAULT_IAM_ADDRESS};
pub use token_source::{
    AccessTokenSource, Authenticator, OAuthTokenSource, StaticTokenSource, CLOUD_PLATFORM_SCOPE,
};

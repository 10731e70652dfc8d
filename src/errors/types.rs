//! # Error Types
//!
//! Error taxonomy for the credential broker using `thiserror`. Each variant names
//! the stage of the authenticate-and-fetch chain that failed, so a caller can
//! tell a missing identity from a rejected login without parsing strings.

/// Result type for credential broker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the credential broker
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Ambient application credentials could not be located or parsed
    #[error("Credentials unavailable: {message}")]
    CredentialsUnavailable { message: String },

    /// No service account identity could be determined
    #[error("Identity unavailable: {message}")]
    IdentityUnavailable { message: String },

    /// Signing the identity assertion failed after every retry
    #[error("Unable to sign JWT after {retries} retries: {source}")]
    SigningFailed {
        retries: u32,
        #[source]
        source: Box<Error>,
    },

    /// The login request to the secrets server failed
    #[error("Login failed: {message}")]
    LoginFailed { message: String },

    /// The login response carried no usable auth block
    #[error("Invalid auth response: {message}")]
    AuthResponseInvalid { message: String },

    /// The token cache backend failed (distinct from a clean miss)
    #[error("Token cache unavailable ({backend}): {message}")]
    CacheUnavailable { backend: &'static str, message: String },

    /// The secrets server returned nothing at the configured path
    #[error("No secrets found: {message}")]
    NoSecretsFound { message: String },

    /// Mutually exclusive options were configured together
    #[error("Configuration conflict: {message}")]
    ConfigurationConflict { message: String },

    /// Invalid or unloadable configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Non-success response from the secrets server
    #[error("Vault request failed (status {status}): {message}")]
    Vault { status: u16, message: String },

    /// Non-success response from the IAM signing service
    #[error("IAM request failed (status {status}): {message}")]
    Iam { status: u16, message: String },

    /// An OAuth access token could not be minted for the ambient identity
    #[error("Access token unavailable: {message}")]
    TokenSource { message: String },

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error wrapped with the stage that produced it
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a credentials unavailable error
    pub fn credentials_unavailable<S: Into<String>>(message: S) -> Self {
        Self::CredentialsUnavailable { message: message.into() }
    }

    /// Create an identity unavailable error
    pub fn identity_unavailable<S: Into<String>>(message: S) -> Self {
        Self::IdentityUnavailable { message: message.into() }
    }

    /// Create a signing failed error wrapping the last attempt's error
    pub fn signing_failed(retries: u32, last: Error) -> Self {
        Self::SigningFailed { retries, source: Box::new(last) }
    }

    /// Create a login failed error
    pub fn login_failed<S: Into<String>>(message: S) -> Self {
        Self::LoginFailed { message: message.into() }
    }

    /// Create an invalid auth response error
    pub fn auth_response_invalid<S: Into<String>>(message: S) -> Self {
        Self::AuthResponseInvalid { message: message.into() }
    }

    /// Create a cache unavailable error
    pub fn cache_unavailable<S: Into<String>>(backend: &'static str, message: S) -> Self {
        Self::CacheUnavailable { backend, message: message.into() }
    }

    /// Create a no secrets found error
    pub fn no_secrets_found<S: Into<String>>(message: S) -> Self {
        Self::NoSecretsFound { message: message.into() }
    }

    /// Create a configuration conflict error
    pub fn configuration_conflict<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationConflict { message: message.into() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a secrets server error
    pub fn vault<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Vault { status, message: message.into() }
    }

    /// Create an IAM signing service error
    pub fn iam<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Iam { status, message: message.into() }
    }

    /// Create an access token error
    pub fn token_source<S: Into<String>>(message: S) -> Self {
        Self::TokenSource { message: message.into() }
    }

    /// Wrap this error with the stage that failed
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        Self::Context { context: context.into(), source: Box::new(self) }
    }

    /// The innermost error beneath any stage context
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Context { source, .. } = current {
            current = source;
        }
        current
    }
}

/// Adds stage context to fallible results
pub trait ResultExt<T> {
    /// Wrap the error, if any, with the stage that failed
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<S: Into<String>>(self, context: S) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::config(format!("Configuration loading failed: {}", error))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = Error::config("Test configuration error");
        assert!(matches!(error, Error::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: Test configuration error");
    }

    #[test]
    fn test_context_chain_display() {
        let error = Error::identity_unavailable("empty response from metadata service")
            .context("unable to resolve service account")
            .context("unable to login to vault");

        assert_eq!(
            error.to_string(),
            "unable to login to vault: unable to resolve service account: \
             Identity unavailable: empty response from metadata service"
        );
    }

    #[test]
    fn test_root_skips_context() {
        let error = Error::login_failed("denied").context("unable to login to vault");
        assert!(matches!(error.root(), Error::LoginFailed { .. }));

        let bare = Error::no_secrets_found("nothing");
        assert!(matches!(bare.root(), Error::NoSecretsFound { .. }));
    }

    #[test]
    fn test_signing_failed_wraps_last_error() {
        let error = Error::signing_failed(3, Error::vault(500, "backend unavailable"));
        assert!(error.to_string().contains("after 3 retries"));

        let source = std::error::Error::source(&error).map(|s| s.to_string());
        let expected = "Vault request failed (status 500): backend unavailable";
        assert_eq!(source.as_deref(), Some(expected));
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<()> = Err(Error::cache_unavailable("redis", "connection refused"));
        let err = result.context("unable to read cached token").unwrap_err();

        assert!(err.to_string().starts_with("unable to read cached token: "));
        assert!(matches!(err.root(), Error::CacheUnavailable { backend: "redis", .. }));
    }

    #[test]
    fn test_error_conversions() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Serialization(_)));
    }
}

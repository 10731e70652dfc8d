//! Secret payloads and the redacting string type.
//!
//! A secret payload is an unordered map of string keys to arbitrary JSON values,
//! returned verbatim by the secrets server. Versioned (KV v2) secrets nest the
//! payload one level deeper under a `data` key, on both read and write.

pub mod types;

pub use types::{serialize_exposed, SecretString};

use serde_json::{Map, Value};

use crate::errors::{Error, Result};

/// Secret payload as stored in the secrets server
pub type SecretMap = Map<String, Value>;

const VERSIONED_DATA_KEY: &str = "data";

/// Wrap a payload in the versioned-storage envelope.
pub fn wrap_versioned(secrets: &SecretMap) -> Value {
    let mut envelope = Map::with_capacity(1);
    envelope.insert(VERSIONED_DATA_KEY.to_string(), Value::Object(secrets.clone()));
    Value::Object(envelope)
}

/// Extract a payload from the versioned-storage envelope.
pub fn unwrap_versioned(mut envelope: SecretMap) -> Result<SecretMap> {
    match envelope.remove(VERSIONED_DATA_KEY) {
        Some(Value::Object(secrets)) => Ok(secrets),
        _ => Err(Error::no_secrets_found("no data in versioned secrets")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> SecretMap {
        json!({"my-sec": "123", "nested": {"n": 1}}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_wrap_then_unwrap_is_identity() {
        let secrets = sample();
        let wrapped = wrap_versioned(&secrets);

        assert_eq!(wrapped["data"]["my-sec"], "123");

        let unwrapped = unwrap_versioned(wrapped.as_object().cloned().unwrap()).unwrap();
        assert_eq!(unwrapped, secrets);
    }

    #[test]
    fn test_unwrap_without_data_key() {
        let err = unwrap_versioned(sample()).unwrap_err();
        assert!(matches!(err, Error::NoSecretsFound { .. }));
    }

    #[test]
    fn test_unwrap_with_non_object_data() {
        let envelope = json!({"data": "not-a-map"}).as_object().cloned().unwrap();
        assert!(unwrap_versioned(envelope).is_err());
    }
}

//! API-key and optional JWT bearer authentication.
//!
//! A bearer token is tried first when JWT is enabled and short-circuits on
//! success; otherwise the shared-secret key (header or query param) is
//! checked against the union of the primary key and the additional-keys
//! list — both are honored simultaneously, a legacy key is never revoked
//! just because a key list is also configured.

use crate::config::Config;
use crate::error::EngineError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    _rest: std::collections::HashMap<String, serde_json::Value>,
}

/// Validate a request's credentials against `config`.
///
/// `api_key` is whatever was found in the `X-API-Key` header or the
/// `api_key` query parameter (empty string if neither was present);
/// `bearer_token` is the token portion of an `Authorization: Bearer ...`
/// header, if any.
pub fn authenticate(config: &Config, api_key: Option<&str>, bearer_token: Option<&str>) -> Result<(), EngineError> {
    if config.enable_jwt {
        if let Some(token) = bearer_token {
            if verify_jwt(token, &config.jwt_secret).is_ok() {
                return Ok(());
            }
        }
    }

    let Some(key) = api_key.filter(|k| !k.is_empty()) else {
        return Err(EngineError::MissingCredential);
    };

    if config.valid_api_keys().contains(key) {
        Ok(())
    } else {
        Err(EngineError::InvalidCredential)
    }
}

fn verify_jwt(token: &str, secret: &str) -> Result<(), jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        let mut c = Config::default();
        c.api_key = "primary-secret".to_string();
        c.api_keys = vec!["fallback-secret".to_string()];
        c
    }

    #[test]
    fn accepts_primary_key() {
        let config = base_config();
        assert!(authenticate(&config, Some("primary-secret"), None).is_ok());
    }

    #[test]
    fn accepts_fallback_key() {
        let config = base_config();
        assert!(authenticate(&config, Some("fallback-secret"), None).is_ok());
    }

    #[test]
    fn rejects_missing_key() {
        let config = base_config();
        assert!(matches!(authenticate(&config, None, None), Err(EngineError::MissingCredential)));
    }

    #[test]
    fn rejects_wrong_key() {
        let config = base_config();
        assert!(matches!(authenticate(&config, Some("nope"), None), Err(EngineError::InvalidCredential)));
    }

    #[test]
    fn jwt_disabled_ignores_bearer_token() {
        let config = base_config();
        assert!(matches!(authenticate(&config, None, Some("whatever")), Err(EngineError::MissingCredential)));
    }
}

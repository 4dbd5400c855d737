//! Access-token validation for tokens issued by the identity service.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ServiceError;

use super::{Authenticator, Identity};

/// Claims the live API reads from an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the numeric user id, as a string.
    pub sub: String,
    /// Expiration (unix timestamp).
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Validates HS256 access tokens against a shared secret.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match issuer {
            Some(iss) => validation.set_issuer(&[iss]),
            None => validation.iss = None,
        }
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            config.jwt_issuer.as_deref(),
            config.jwt_audience.as_deref(),
        )
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Option<Identity>, ServiceError> {
        let data = match jsonwebtoken::decode::<AccessClaims>(token, &self.key, &self.validation) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(?e, "access token validation failed");
                return Ok(None);
            }
        };

        let user_id = match data.claims.sub.parse::<i64>() {
            Ok(id) if id > 0 => id,
            _ => {
                tracing::debug!(sub = %data.claims.sub, "access token subject is not a user id");
                return Ok(None);
            }
        };

        Ok(Some(Identity { user_id }))
    }
}

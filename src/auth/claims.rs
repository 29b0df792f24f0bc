//! Identity-token claims and the decoder capability.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Decoded identity-token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    /// Any claim not modelled above.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UserClaims {
    /// `exp` as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

/// Capability that turns a signed identity token into claims.
///
/// Implementations must not verify signatures; the token arrived from the
/// issuer over TLS.
pub trait IdentityTokenDecoder: Send + Sync {
    fn decode(&self, token: &str) -> Result<UserClaims, AuthError>;
}

/// Decodes the payload segment of a compact JWS without verification.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtPayloadDecoder;

impl IdentityTokenDecoder for JwtPayloadDecoder {
    fn decode(&self, token: &str) -> Result<UserClaims, AuthError> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_header), Some(payload), Some(_signature)) => payload,
            _ => {
                return Err(AuthError::Decode(
                    "expected three dot-separated segments".to_string(),
                ))
            }
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|err| AuthError::Decode(format!("payload is not base64url: {err}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| AuthError::Decode(format!("payload is not a claims object: {err}")))
    }
}

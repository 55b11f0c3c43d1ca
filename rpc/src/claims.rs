//! Unverified id-token claim decoding.
//!
//! The engine only reads claims from tokens the backend just issued to it, so
//! the signature is not checked here.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("token is not a three-part JWT")]
    Malformed,
    #[error("token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FirebaseClaims {
    sign_in_provider: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdTokenClaims {
    pub sub: String,
    pub user_id: Option<String>,
    pub email: Option<String>,
    /// Expiry, in epoch seconds.
    pub exp: u64,
    /// Issued-at, in epoch seconds.
    pub iat: u64,
    firebase: FirebaseClaims,
}

impl IdTokenClaims {
    pub fn decode(token: &str) -> Result<Self, ClaimsError> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ClaimsError::Malformed);
        };
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Account id: `user_id` when present, else `sub`.
    #[must_use]
    pub fn uid(&self) -> &str {
        self.user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.sub)
    }

    #[must_use]
    pub fn sign_in_provider(&self) -> Option<&str> {
        self.firebase.sign_in_provider.as_deref()
    }
}

//! Typed response bodies and their mapping onto neutral sign-in data.
//!
//! The backend answers sign-in calls with one of several response families.
//! [`SignInPayload`] flattens each family into a [`SignInData`] so the engine
//! builds users from a single shape.

use std::collections::HashMap;

use serde::Deserialize;
use warden_types::{AuthError, ErrorCode, ErrorKind};

use crate::claims::IdTokenClaims;

/// Token lifetime assumed when the backend omits or garbles `expiresIn`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

fn parse_expires_in(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
}

fn parse_millis(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or_default()
}

/// Provider-independent result of a sign-in call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignInData {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in_secs: u64,
    pub is_new_user: bool,
    /// Provider that authenticated the call, when the response names one.
    pub provider_id: Option<String>,
    pub user_name: Option<String>,
    pub profile: HashMap<String, serde_json::Value>,
}

/// Flattens a sign-in response family into [`SignInData`].
pub trait SignInPayload {
    fn into_sign_in_data(self) -> Result<SignInData, AuthError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyPasswordResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub profile_picture: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<String>,
    pub registered: bool,
}

impl SignInPayload for VerifyPasswordResponse {
    fn into_sign_in_data(self) -> Result<SignInData, AuthError> {
        Ok(SignInData {
            uid: self.local_id,
            email: self.email,
            display_name: self.display_name.filter(|name| !name.is_empty()),
            photo_url: self.profile_picture,
            expires_in_secs: parse_expires_in(self.expires_in.as_deref()),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            is_new_user: false,
            provider_id: Some(warden_types::EMAIL_PASSWORD_PROVIDER_ID.to_string()),
            ..SignInData::default()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyAssertionResponse {
    pub local_id: String,
    pub federated_id: Option<String>,
    pub provider_id: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub screen_name: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<String>,
    pub is_new_user: bool,
    pub need_confirmation: bool,
    /// JSON object encoded as a string.
    pub raw_user_info: Option<String>,
}

impl SignInPayload for VerifyAssertionResponse {
    fn into_sign_in_data(self) -> Result<SignInData, AuthError> {
        if self.need_confirmation {
            return Err(AuthError::new(
                ErrorKind::BackendRejected,
                ErrorCode::AccountExistsWithDifferentCredentials,
                ErrorCode::AccountExistsWithDifferentCredentials.description(),
            ));
        }
        let profile = self
            .raw_user_info
            .as_deref()
            .and_then(|raw| serde_json::from_str::<HashMap<String, serde_json::Value>>(raw).ok())
            .unwrap_or_default();
        Ok(SignInData {
            uid: self.local_id,
            email: self.email,
            display_name: self.display_name,
            photo_url: self.photo_url,
            expires_in_secs: parse_expires_in(self.expires_in.as_deref()),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            is_new_user: self.is_new_user,
            provider_id: self.provider_id,
            user_name: self.screen_name,
            profile,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyCustomTokenResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<String>,
    pub is_new_user: bool,
}

impl SignInPayload for VerifyCustomTokenResponse {
    /// The response carries no account id; it is read from the id token.
    fn into_sign_in_data(self) -> Result<SignInData, AuthError> {
        let claims = IdTokenClaims::decode(&self.id_token).map_err(|e| {
            AuthError::new(
                ErrorKind::InternalInconsistency,
                ErrorCode::Failure,
                format!("malformed id token in custom token response: {e}"),
            )
        })?;
        Ok(SignInData {
            uid: claims.uid().to_string(),
            email: claims.email.clone(),
            expires_in_secs: parse_expires_in(self.expires_in.as_deref()),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            is_new_user: self.is_new_user,
            provider_id: claims.sign_in_provider().map(str::to_string),
            ..SignInData::default()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignUpNewUserResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<String>,
}

impl SignInPayload for SignUpNewUserResponse {
    fn into_sign_in_data(self) -> Result<SignInData, AuthError> {
        Ok(SignInData {
            uid: self.local_id,
            email: self.email,
            display_name: self.display_name,
            expires_in_secs: parse_expires_in(self.expires_in.as_deref()),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            is_new_user: true,
            ..SignInData::default()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetOobConfirmationCodeResponse {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateAuthUriResponse {
    pub all_providers: Vec<String>,
    pub registered: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderUserInfo {
    pub provider_id: String,
    pub federated_id: Option<String>,
    pub raw_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountInfo {
    pub local_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: Option<String>,
    pub provider_user_info: Vec<ProviderUserInfo>,
    /// Epoch milliseconds, encoded as a string.
    pub created_at: Option<String>,
    /// Epoch milliseconds, encoded as a string.
    pub last_login_at: Option<String>,
}

impl AccountInfo {
    #[must_use]
    pub fn created_at_ms(&self) -> u64 {
        parse_millis(self.created_at.as_deref())
    }

    #[must_use]
    pub fn last_login_at_ms(&self) -> u64 {
        parse_millis(self.last_login_at.as_deref())
    }

    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|hash| !hash.is_empty())
            || self
                .provider_user_info
                .iter()
                .any(|info| info.provider_id == warden_types::EMAIL_PASSWORD_PROVIDER_ID)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GetAccountInfoResponse {
    pub users: Vec<AccountInfo>,
}

/// Refresh-token exchange result. snake_case, unlike the identity toolkit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecureTokenResponse {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<String>,
    pub token_type: Option<String>,
    pub user_id: Option<String>,
}

impl SecureTokenResponse {
    #[must_use]
    pub fn expires_in_secs(&self) -> u64 {
        parse_expires_in(self.expires_in.as_deref())
    }

    /// The fresh id token. Older deployments only fill `access_token`.
    #[must_use]
    pub fn fresh_id_token(&self) -> &str {
        if self.id_token.is_empty() {
            &self.access_token
        } else {
            &self.id_token
        }
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Secret;

/// Per-provider profile attached to a user account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub uid: String,
    pub provider_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    /// Milliseconds since the Unix epoch.
    pub creation_timestamp_ms: u64,
    /// Milliseconds since the Unix epoch.
    pub last_sign_in_timestamp_ms: u64,
}

/// Snapshot of the signed-in identity.
///
/// Returned by value from futures and `current_user()`; later token refreshes
/// do not mutate a snapshot already handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    /// Always `"firebase"` for accounts managed by the identity backend.
    pub provider_id: String,
    pub is_anonymous: bool,
    pub is_email_verified: bool,
    pub has_email_password_credential: bool,
    pub id_token: Secret,
    pub refresh_token: Secret,
    /// When the id token stops being valid, in epoch milliseconds.
    pub access_token_expires_at_ms: u64,
    /// When the id token was acquired, in epoch milliseconds.
    pub token_timestamp_ms: u64,
    pub metadata: UserMetadata,
    pub provider_data: Vec<UserInfo>,
}

impl User {
    /// Whether the id token is expired or will be within `buffer_ms` of `now_ms`.
    #[must_use]
    pub fn token_needs_refresh(&self, now_ms: u64, buffer_ms: u64) -> bool {
        self.id_token.is_empty()
            || now_ms.saturating_add(buffer_ms) >= self.access_token_expires_at_ms
    }
}

/// Provider-supplied details returned alongside a sign-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalUserInfo {
    pub provider_id: String,
    pub user_name: Option<String>,
    pub is_new_user: bool,
    pub profile: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignInResult {
    pub user: User,
    pub info: AdditionalUserInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchProvidersResult {
    pub providers: Vec<String>,
}

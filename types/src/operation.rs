use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies which API call produced a future.
///
/// The registry remembers the most recent future per kind so callers can ask
/// for the "last result" of an operation without holding the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    SignInWithCustomToken,
    SignInWithCredential,
    SignInAnonymously,
    SignInWithEmailAndPassword,
    CreateUserWithEmailAndPassword,
    SignInAndRetrieveDataWithCredential,
    FetchProvidersForEmail,
    SendPasswordResetEmail,
    GetToken,
    ReloadUser,
    /// Token fetches issued by the background refresher. Kept separate so they
    /// never replace the user-facing `GetToken` last result.
    GetTokenForRefresher,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignInWithCustomToken => "sign_in_with_custom_token",
            Self::SignInWithCredential => "sign_in_with_credential",
            Self::SignInAnonymously => "sign_in_anonymously",
            Self::SignInWithEmailAndPassword => "sign_in_with_email_and_password",
            Self::CreateUserWithEmailAndPassword => "create_user_with_email_and_password",
            Self::SignInAndRetrieveDataWithCredential => {
                "sign_in_and_retrieve_data_with_credential"
            }
            Self::FetchProvidersForEmail => "fetch_providers_for_email",
            Self::SendPasswordResetEmail => "send_password_reset_email",
            Self::GetToken => "get_token",
            Self::ReloadUser => "reload_user",
            Self::GetTokenForRefresher => "get_token_for_refresher",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FutureStatus {
    Pending,
    Complete,
    /// The handle refers to nothing: never issued, released, or abandoned.
    Invalid,
}

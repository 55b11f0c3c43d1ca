use std::fmt;

/// Default identity toolkit base URL.
pub const IDENTITY_TOOLKIT_URL: &str = "https://www.googleapis.com/identitytoolkit/v3/relyingparty";
/// Default secure token service URL.
pub const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Backend operations the engine can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    VerifyPassword,
    VerifyAssertion,
    VerifyCustomToken,
    SignUpNewUser,
    GetOobConfirmationCode,
    CreateAuthUri,
    GetAccountInfo,
    /// Refresh-token exchange on the secure token service.
    SecureToken,
}

impl Endpoint {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VerifyPassword => "verifyPassword",
            Self::VerifyAssertion => "verifyAssertion",
            Self::VerifyCustomToken => "verifyCustomToken",
            Self::SignUpNewUser => "signupNewUser",
            Self::GetOobConfirmationCode => "getOobConfirmationCode",
            Self::CreateAuthUri => "createAuthUri",
            Self::GetAccountInfo => "getAccountInfo",
            Self::SecureToken => "token",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base URLs for the two backend services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    identity_toolkit_url: String,
    secure_token_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(IDENTITY_TOOLKIT_URL, SECURE_TOKEN_URL)
    }
}

impl Endpoints {
    #[must_use]
    pub fn new(
        identity_toolkit_url: impl Into<String>,
        secure_token_url: impl Into<String>,
    ) -> Self {
        Self {
            identity_toolkit_url: identity_toolkit_url.into().trim_end_matches('/').to_string(),
            secure_token_url: secure_token_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Full request URL, API key included as the `key` query parameter.
    #[must_use]
    pub fn url_for(&self, endpoint: Endpoint, api_key: &str) -> String {
        match endpoint {
            Endpoint::SecureToken => format!("{}?key={api_key}", self.secure_token_url),
            other => format!(
                "{}/{}?key={api_key}",
                self.identity_toolkit_url,
                other.as_str()
            ),
        }
    }
}

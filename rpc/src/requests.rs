//! Typed request bodies, one per [`Endpoint`].

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Endpoint;
use crate::responses::{
    CreateAuthUriResponse, GetAccountInfoResponse, GetOobConfirmationCodeResponse,
    SecureTokenResponse, SignUpNewUserResponse, VerifyAssertionResponse,
    VerifyCustomTokenResponse, VerifyPasswordResponse,
};

/// Redirect URI the backend requires for assertion and auth-URI calls. Desktop
/// clients have no real redirect target.
const LOCALHOST_URI: &str = "http://localhost";

/// A request body bound to its endpoint and response schema.
pub trait RpcRequest: Serialize + Send + Sync {
    const ENDPOINT: Endpoint;
    type Response: DeserializeOwned + Send + 'static;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPasswordRequest {
    email: String,
    password: String,
    return_secure_token: bool,
}

impl VerifyPasswordRequest {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            return_secure_token: true,
        }
    }
}

impl RpcRequest for VerifyPasswordRequest {
    const ENDPOINT: Endpoint = Endpoint::VerifyPassword;
    type Response = VerifyPasswordResponse;
}

/// Federated sign-in. `post_body` is the form-encoded provider payload
/// (`id_token=...&providerId=google.com`).
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAssertionRequest {
    request_uri: &'static str,
    post_body: String,
    return_secure_token: bool,
    return_idp_credential: bool,
}

impl VerifyAssertionRequest {
    #[must_use]
    pub fn from_post_body(post_body: impl Into<String>) -> Self {
        Self {
            request_uri: LOCALHOST_URI,
            post_body: post_body.into(),
            return_secure_token: true,
            return_idp_credential: true,
        }
    }

    #[must_use]
    pub fn post_body(&self) -> &str {
        &self.post_body
    }
}

impl RpcRequest for VerifyAssertionRequest {
    const ENDPOINT: Endpoint = Endpoint::VerifyAssertion;
    type Response = VerifyAssertionResponse;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCustomTokenRequest {
    token: String,
    return_secure_token: bool,
}

impl VerifyCustomTokenRequest {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            return_secure_token: true,
        }
    }
}

impl RpcRequest for VerifyCustomTokenRequest {
    const ENDPOINT: Endpoint = Endpoint::VerifyCustomToken;
    type Response = VerifyCustomTokenResponse;
}

/// Creates an account. With no email/password the account is anonymous.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpNewUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    return_secure_token: bool,
}

impl SignUpNewUserRequest {
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            email: None,
            password: None,
            display_name: None,
            return_secure_token: true,
        }
    }

    #[must_use]
    pub fn with_email_and_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
            display_name: None,
            return_secure_token: true,
        }
    }
}

impl RpcRequest for SignUpNewUserRequest {
    const ENDPOINT: Endpoint = Endpoint::SignUpNewUser;
    type Response = SignUpNewUserResponse;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOobConfirmationCodeRequest {
    request_type: &'static str,
    email: String,
}

impl GetOobConfirmationCodeRequest {
    #[must_use]
    pub fn password_reset(email: impl Into<String>) -> Self {
        Self {
            request_type: "PASSWORD_RESET",
            email: email.into(),
        }
    }
}

impl RpcRequest for GetOobConfirmationCodeRequest {
    const ENDPOINT: Endpoint = Endpoint::GetOobConfirmationCode;
    type Response = GetOobConfirmationCodeResponse;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuthUriRequest {
    identifier: String,
    continue_uri: &'static str,
}

impl CreateAuthUriRequest {
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            identifier: email.into(),
            continue_uri: LOCALHOST_URI,
        }
    }
}

impl RpcRequest for CreateAuthUriRequest {
    const ENDPOINT: Endpoint = Endpoint::CreateAuthUri;
    type Response = CreateAuthUriResponse;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAccountInfoRequest {
    id_token: String,
}

impl GetAccountInfoRequest {
    #[must_use]
    pub fn new(id_token: impl Into<String>) -> Self {
        Self {
            id_token: id_token.into(),
        }
    }
}

impl RpcRequest for GetAccountInfoRequest {
    const ENDPOINT: Endpoint = Endpoint::GetAccountInfo;
    type Response = GetAccountInfoResponse;
}

/// Refresh-token grant. The secure token service uses snake_case fields.
#[derive(Serialize)]
pub struct SecureTokenRequest {
    grant_type: &'static str,
    refresh_token: String,
}

impl SecureTokenRequest {
    #[must_use]
    pub fn refresh(refresh_token: impl Into<String>) -> Self {
        Self {
            grant_type: "refresh_token",
            refresh_token: refresh_token.into(),
        }
    }
}

impl RpcRequest for SecureTokenRequest {
    const ENDPOINT: Endpoint = Endpoint::SecureToken;
    type Response = SecureTokenResponse;
}

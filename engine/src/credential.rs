//! Credential to request routing.
//!
//! The backend splits sign-in into two response families: password-based
//! credentials go to `verifyPassword`, every federated provider goes to
//! `verifyAssertion` with a form-encoded provider payload.

use url::form_urlencoded;
use warden_rpc::requests::{VerifyAssertionRequest, VerifyPasswordRequest};
use warden_types::{AuthError, Credential, ErrorCode, Secret};

pub(crate) enum SignInRequest {
    Password(VerifyPasswordRequest),
    Assertion(VerifyAssertionRequest),
}

fn append_secret(
    body: &mut form_urlencoded::Serializer<'_, String>,
    key: &str,
    value: Option<&Secret>,
) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        body.append_pair(key, value.expose());
    }
}

/// Build the request for a credential that already passed validation.
pub(crate) fn sign_in_request(credential: &Credential) -> Result<SignInRequest, AuthError> {
    let mut body = form_urlencoded::Serializer::new(String::new());
    match credential {
        Credential::EmailPassword { email, password } => {
            return Ok(SignInRequest::Password(VerifyPasswordRequest::new(
                email.as_str(),
                password.expose(),
            )));
        }
        Credential::Google {
            id_token,
            access_token,
        } => {
            append_secret(&mut body, "id_token", id_token.as_ref());
            append_secret(&mut body, "access_token", access_token.as_ref());
        }
        Credential::Facebook { access_token } | Credential::GitHub {
            token: access_token,
        } => {
            append_secret(&mut body, "access_token", Some(access_token));
        }
        Credential::Twitter { token, secret } => {
            append_secret(&mut body, "access_token", Some(token));
            append_secret(&mut body, "oauth_token_secret", Some(secret));
        }
        Credential::OAuth {
            id_token,
            access_token,
            raw_nonce,
            ..
        } => {
            append_secret(&mut body, "id_token", id_token.as_ref());
            append_secret(&mut body, "access_token", access_token.as_ref());
            if let Some(nonce) = raw_nonce.as_deref().filter(|n| !n.is_empty()) {
                body.append_pair("nonce", nonce);
            }
        }
        Credential::PlayGames { server_auth_code } => {
            append_secret(&mut body, "code", Some(server_auth_code));
        }
        Credential::GameCenter { .. } | Credential::Phone { .. } => {
            return Err(AuthError::invalid_credential(ErrorCode::ApiNotAvailable));
        }
    }
    body.append_pair("providerId", credential.provider_id());
    Ok(SignInRequest::Assertion(VerifyAssertionRequest::from_post_body(
        body.finish(),
    )))
}

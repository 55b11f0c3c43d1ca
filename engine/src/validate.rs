//! Structural checks run before any network call.

use std::sync::OnceLock;

use regex::Regex;
use warden_types::{AuthError, Credential, ErrorCode};

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

pub(crate) fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::invalid_argument(ErrorCode::MissingEmail));
    }
    if !email_regex().is_match(email) {
        return Err(AuthError::invalid_argument(ErrorCode::InvalidEmail));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::invalid_argument(ErrorCode::MissingPassword));
    }
    Ok(())
}

pub(crate) fn validate_email_and_password(email: &str, password: &str) -> Result<(), AuthError> {
    validate_email(email)?;
    validate_password(password)
}

pub(crate) fn validate_custom_token(token: &str) -> Result<(), AuthError> {
    if token.trim().is_empty() {
        return Err(AuthError::invalid_argument(ErrorCode::InvalidCustomToken));
    }
    Ok(())
}

pub(crate) fn validate_credential(credential: &Credential) -> Result<(), AuthError> {
    if !credential.is_supported_on_desktop() {
        return Err(AuthError::invalid_credential(ErrorCode::ApiNotAvailable));
    }
    if let Credential::EmailPassword { email, password } = credential {
        return validate_email_and_password(email, password.expose());
    }
    if !credential.has_payload() {
        return Err(AuthError::invalid_argument(ErrorCode::MissingCredential));
    }
    Ok(())
}

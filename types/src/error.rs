//! Authentication error taxonomy.
//!
//! Every failure surfaced to a caller is an [`AuthError`]: an [`ErrorKind`]
//! saying where the failure came from, a fine-grained [`ErrorCode`], and a
//! human-readable message. Backend error strings map 1:1 onto `ErrorCode`
//! through [`ErrorCode::from_backend_message`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a failure by origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input detected before any network call.
    InvalidArgument,
    /// Provider-specific credential validation failed locally.
    InvalidCredential,
    /// The transport could not deliver the request or read the response.
    NetworkFailure,
    /// The backend returned a structured error.
    BackendRejected,
    /// An equivalent operation is already running.
    AlreadyInProgress,
    /// A programming error inside the engine (double completion, missing session).
    InternalInconsistency,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidCredential => "invalid_credential",
            Self::NetworkFailure => "network_failure",
            Self::BackendRejected => "backend_rejected",
            Self::AlreadyInProgress => "already_in_progress",
            Self::InternalInconsistency => "internal_inconsistency",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed enumeration of auth error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Unclassified failure.
    Failure,
    InvalidEmail,
    MissingEmail,
    MissingPassword,
    WeakPassword,
    WrongPassword,
    UserNotFound,
    UserDisabled,
    EmailAlreadyInUse,
    OperationNotAllowed,
    TooManyRequests,
    InvalidCredential,
    MissingCredential,
    InvalidCustomToken,
    CustomTokenMismatch,
    InvalidApiKey,
    AppNotAuthorized,
    UserTokenExpired,
    InvalidUserToken,
    UserMismatch,
    CredentialAlreadyInUse,
    AccountExistsWithDifferentCredentials,
    RequiresRecentLogin,
    ExpiredActionCode,
    InvalidActionCode,
    InvalidMessagePayload,
    InvalidRecipientEmail,
    InvalidSender,
    NetworkRequestFailed,
    NoSignedInUser,
    ApiNotAvailable,
    Internal,
}

/// Backend error strings and the code each maps to.
///
/// The key is the part of the backend message before any ` : ` detail.
const BACKEND_ERROR_TABLE: &[(&str, ErrorCode)] = &[
    ("INVALID_EMAIL", ErrorCode::InvalidEmail),
    ("MISSING_EMAIL", ErrorCode::MissingEmail),
    ("MISSING_PASSWORD", ErrorCode::MissingPassword),
    ("WEAK_PASSWORD", ErrorCode::WeakPassword),
    ("INVALID_PASSWORD", ErrorCode::WrongPassword),
    ("EMAIL_NOT_FOUND", ErrorCode::UserNotFound),
    ("USER_NOT_FOUND", ErrorCode::UserNotFound),
    ("USER_DISABLED", ErrorCode::UserDisabled),
    ("EMAIL_EXISTS", ErrorCode::EmailAlreadyInUse),
    ("OPERATION_NOT_ALLOWED", ErrorCode::OperationNotAllowed),
    ("PASSWORD_LOGIN_DISABLED", ErrorCode::OperationNotAllowed),
    ("ADMIN_ONLY_OPERATION", ErrorCode::OperationNotAllowed),
    ("TOO_MANY_ATTEMPTS_TRY_LATER", ErrorCode::TooManyRequests),
    ("INVALID_IDP_RESPONSE", ErrorCode::InvalidCredential),
    ("INVALID_CREDENTIAL", ErrorCode::InvalidCredential),
    ("INVALID_CUSTOM_TOKEN", ErrorCode::InvalidCustomToken),
    ("CREDENTIAL_MISMATCH", ErrorCode::CustomTokenMismatch),
    ("INVALID_API_KEY", ErrorCode::InvalidApiKey),
    ("API key not valid. Please pass a valid API key.", ErrorCode::InvalidApiKey),
    ("PROJECT_NOT_FOUND", ErrorCode::AppNotAuthorized),
    ("TOKEN_EXPIRED", ErrorCode::UserTokenExpired),
    ("INVALID_ID_TOKEN", ErrorCode::InvalidUserToken),
    ("INVALID_REFRESH_TOKEN", ErrorCode::InvalidUserToken),
    ("USER_MISMATCH", ErrorCode::UserMismatch),
    ("FEDERATED_USER_ID_ALREADY_LINKED", ErrorCode::CredentialAlreadyInUse),
    ("CREDENTIAL_TOO_OLD_LOGIN_AGAIN", ErrorCode::RequiresRecentLogin),
    ("EXPIRED_OOB_CODE", ErrorCode::ExpiredActionCode),
    ("INVALID_OOB_CODE", ErrorCode::InvalidActionCode),
    ("INVALID_MESSAGE_PAYLOAD", ErrorCode::InvalidMessagePayload),
    ("INVALID_RECIPIENT_EMAIL", ErrorCode::InvalidRecipientEmail),
    ("INVALID_SENDER", ErrorCode::InvalidSender),
];

impl ErrorCode {
    /// Map a backend error message onto a code.
    ///
    /// Messages may carry a detail suffix (`WEAK_PASSWORD : Password should
    /// be at least 6 characters`); only the key before ` : ` is matched.
    /// Unknown keys map to [`ErrorCode::Failure`].
    #[must_use]
    pub fn from_backend_message(message: &str) -> Self {
        let key = message
            .split_once(" : ")
            .map_or(message, |(key, _)| key)
            .trim();
        BACKEND_ERROR_TABLE
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map_or(Self::Failure, |(_, code)| *code)
    }

    /// Default human-readable description for this code.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Failure => "An internal error has occurred.",
            Self::InvalidEmail => "The email address is badly formatted.",
            Self::MissingEmail => "An email address must be provided.",
            Self::MissingPassword => "A password must be provided.",
            Self::WeakPassword => "The given password is invalid.",
            Self::WrongPassword => {
                "The password is invalid or the user does not have a password."
            }
            Self::UserNotFound => "There is no user record corresponding to this identifier.",
            Self::UserDisabled => "The user account has been disabled by an administrator.",
            Self::EmailAlreadyInUse => {
                "The email address is already in use by another account."
            }
            Self::OperationNotAllowed => "The given sign-in provider is disabled.",
            Self::TooManyRequests => {
                "We have blocked all requests from this device due to unusual activity."
            }
            Self::InvalidCredential => "The supplied auth credential is malformed or has expired.",
            Self::MissingCredential => "A credential payload must be provided.",
            Self::InvalidCustomToken => "The custom token format is incorrect.",
            Self::CustomTokenMismatch => "The custom token corresponds to a different audience.",
            Self::InvalidApiKey => {
                "Your API key is invalid, please check you have copied it correctly."
            }
            Self::AppNotAuthorized => "This app is not authorized to use authentication.",
            Self::UserTokenExpired => "The user's credential is no longer valid.",
            Self::InvalidUserToken => "This user's credential isn't valid for this project.",
            Self::UserMismatch => {
                "The supplied credentials do not correspond to the previously signed in user."
            }
            Self::CredentialAlreadyInUse => {
                "This credential is already associated with a different user account."
            }
            Self::AccountExistsWithDifferentCredentials => {
                "An account already exists with the same email address but different \
                 sign-in credentials."
            }
            Self::RequiresRecentLogin => {
                "This operation is sensitive and requires recent authentication."
            }
            Self::ExpiredActionCode => "The action code has expired.",
            Self::InvalidActionCode => "The action code is invalid.",
            Self::InvalidMessagePayload => "The email template contains invalid characters.",
            Self::InvalidRecipientEmail => "The recipient email address is invalid.",
            Self::InvalidSender => "The email template sender is invalid.",
            Self::NetworkRequestFailed => "A network error has occurred.",
            Self::NoSignedInUser => "There is no signed-in user.",
            Self::ApiNotAvailable => "This operation is not available on this platform.",
            Self::Internal => "An internal inconsistency was detected.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A failed authentication operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}/{code}: {message}")]
pub struct AuthError {
    kind: ErrorKind,
    code: ErrorCode,
    message: String,
}

impl AuthError {
    #[must_use]
    pub fn new(kind: ErrorKind, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    /// Local input validation failure, using the code's default description.
    #[must_use]
    pub fn invalid_argument(code: ErrorCode) -> Self {
        Self::new(ErrorKind::InvalidArgument, code, code.description())
    }

    #[must_use]
    pub fn invalid_credential(code: ErrorCode) -> Self {
        Self::new(ErrorKind::InvalidCredential, code, code.description())
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::NetworkFailure,
            ErrorCode::NetworkRequestFailed,
            message,
        )
    }

    /// Structured backend rejection, mapped from the backend's message.
    #[must_use]
    pub fn backend(message: &str) -> Self {
        let code = ErrorCode::from_backend_message(message);
        Self::new(ErrorKind::BackendRejected, code, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalInconsistency, ErrorCode::Internal, message)
    }

    #[must_use]
    pub fn no_signed_in_user() -> Self {
        Self::new(
            ErrorKind::InvalidArgument,
            ErrorCode::NoSignedInUser,
            ErrorCode::NoSignedInUser.description(),
        )
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

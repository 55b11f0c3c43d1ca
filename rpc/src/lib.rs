//! Backend RPC boundary for the Warden auth engine.
//!
//! # Architecture
//!
//! - [`Endpoint`] / [`Endpoints`] - which backend method a request targets and where it lives
//! - [`requests`] / [`responses`] - serde bodies, one pair per endpoint, tied together by
//!   [`RpcRequest`]
//! - [`Transport`] - delivers an encoded request and returns the raw response
//! - [`HttpTransport`] - the reqwest-backed transport, with [`retry`] for transient failures
//! - [`execute`] - encode, send, and parse into a typed response or an [`AuthError`]
//!
//! # Error mapping
//!
//! | Condition | Result |
//! |-----------|--------|
//! | Transport could not deliver or read | `NetworkFailure` / `NetworkRequestFailed` |
//! | Non-2xx with `{"error":{"message":..}}` | `BackendRejected`, code mapped from the message |
//! | Non-2xx with any other body | `BackendRejected` / `Failure` |
//! | 2xx with a body that does not parse | `InternalInconsistency` / `Failure` |

pub mod claims;
mod endpoint;
mod http;
pub mod requests;
pub mod responses;
pub mod retry;

use std::fmt;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use warden_types::{ApiKey, AuthError, ErrorCode, ErrorKind};

pub use endpoint::{Endpoint, Endpoints, IDENTITY_TOOLKIT_URL, SECURE_TOKEN_URL};
pub use http::{HttpOptions, HttpTransport};
pub use requests::RpcRequest;
pub use responses::{SignInData, SignInPayload};

/// Longest error body echoed into an error message.
const MAX_ERROR_SNIPPET_CHARS: usize = 512;

/// An encoded request ready for delivery.
pub struct TransportRequest {
    pub endpoint: Endpoint,
    /// Full URL. Carries the API key, so it is kept out of `Debug`.
    pub url: String,
    pub body: Vec<u8>,
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRequest")
            .field("endpoint", &self.endpoint)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn ok_json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string())
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Request(#[from] retry::RetryError),
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
    #[error("response body exceeded {limit} bytes")]
    TooLarge { limit: usize },
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Delivers encoded requests to the backend.
///
/// Implementations must not retry a request that produced an HTTP response
/// the backend considers final; the engine relies on one `send` per
/// dispatched operation.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: TransportRequest)
    -> BoxFuture<'_, Result<TransportResponse, TransportError>>;
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut out: String = text.chars().take(MAX_ERROR_SNIPPET_CHARS).collect();
    if text.chars().count() > MAX_ERROR_SNIPPET_CHARS {
        out.push_str("...(truncated)");
    }
    out
}

/// Parse a raw response into `T`, or the error it encodes.
pub fn parse_response<T: DeserializeOwned>(
    endpoint: Endpoint,
    response: &TransportResponse,
) -> Result<T, AuthError> {
    if !response.is_success() {
        return Err(
            match serde_json::from_slice::<ErrorEnvelope>(&response.body) {
                Ok(envelope) => AuthError::backend(&envelope.error.message),
                Err(_) => AuthError::new(
                    ErrorKind::BackendRejected,
                    ErrorCode::Failure,
                    format!("HTTP {}: {}", response.status, snippet(&response.body)),
                ),
            },
        );
    }

    let body: &[u8] = if response.body.is_empty() {
        b"{}"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(%endpoint, %e, "Malformed backend response");
        AuthError::new(
            ErrorKind::InternalInconsistency,
            ErrorCode::Failure,
            format!("malformed {endpoint} response: {e}"),
        )
    })
}

/// Encode `request`, deliver it once, and parse the typed response.
pub async fn execute<R: RpcRequest>(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    api_key: &ApiKey,
    request: &R,
) -> Result<R::Response, AuthError> {
    let body = serde_json::to_vec(request)
        .map_err(|e| {
            AuthError::internal(format!("failed to encode {} request: {e}", R::ENDPOINT))
        })?;
    let outgoing = TransportRequest {
        endpoint: R::ENDPOINT,
        url: endpoints.url_for(R::ENDPOINT, api_key.expose_secret()),
        body,
    };

    tracing::debug!(endpoint = %R::ENDPOINT, "Sending backend request");
    let response = transport.send(outgoing).await.map_err(|e| {
        tracing::debug!(endpoint = %R::ENDPOINT, %e, "Backend request failed in transport");
        AuthError::network(e.to_string())
    })?;
    tracing::debug!(endpoint = %R::ENDPOINT, status = response.status, "Backend responded");

    parse_response::<R::Response>(R::ENDPOINT, &response)
}

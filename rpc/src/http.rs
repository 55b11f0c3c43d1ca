use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::retry::{RetryConfig, send_with_retry};
use crate::{Transport, TransportError, TransportRequest, TransportResponse};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 8;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Identity responses are small; anything past this is not a real answer.
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Permit plain `http://` endpoints (local emulators, tests).
    pub allow_insecure_http: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: RetryConfig::default().max_retries,
            allow_insecure_http: false,
        }
    }
}

fn client_builder(options: &HttpOptions) -> reqwest::ClientBuilder {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        "X-Client-Version",
        HeaderValue::from_static(concat!("warden/", env!("CARGO_PKG_VERSION"))),
    );
    default_headers.insert("X-Warden-OS", HeaderValue::from_static(std::env::consts::OS));

    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(options.timeout)
        .redirect(reqwest::redirect::Policy::none())
        .https_only(!options.allow_insecure_http)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers)
}

async fn read_capped_body(response: reqwest::Response) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(TransportError::Body)?;
        body.extend_from_slice(&chunk);
        if body.len() > MAX_RESPONSE_BYTES {
            return Err(TransportError::TooLarge {
                limit: MAX_RESPONSE_BYTES,
            });
        }
    }
    Ok(body)
}

/// reqwest-backed [`Transport`] with retry on transient failures.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl HttpTransport {
    pub fn new(options: &HttpOptions) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: client_builder(options).build()?,
            retry: RetryConfig::default().with_max_retries(options.max_retries),
        })
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn post(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let TransportRequest { endpoint, url, body } = request;
        let response = send_with_retry(
            || {
                self.client
                    .post(&url)
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone())
            },
            &self.retry,
        )
        .await?;

        let status = response.status().as_u16();
        let body = read_capped_body(response).await?;
        tracing::trace!(%endpoint, status, bytes = body.len(), "Read backend response");
        Ok(TransportResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>> {
        Box::pin(self.post(request))
    }
}

//! Shared test utilities and fixtures
//!
//! A recording stub transport, a manual clock, and a session harness wired
//! to both.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use warden_engine::{Auth, AuthConfig, ManualClock};
use warden_rpc::{Endpoint, Transport, TransportError, TransportRequest, TransportResponse};

/// Fixed wall-clock start for every harness.
pub const START_MS: u64 = 1_700_000_000_000;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: Endpoint,
    pub url: String,
    pub body: Value,
}

/// Transport double: records every call and answers from a per-endpoint
/// script, falling back to a default response per endpoint.
pub struct StubTransport {
    calls: Mutex<Vec<RecordedCall>>,
    scripted: Mutex<HashMap<Endpoint, VecDeque<TransportResponse>>>,
    defaults: Mutex<HashMap<Endpoint, TransportResponse>>,
    gated: AtomicBool,
    gate: Semaphore,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::default(),
            scripted: Mutex::default(),
            defaults: Mutex::default(),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        })
    }

    /// Answer every call to `endpoint` with `response` unless a scripted
    /// response is queued.
    pub fn respond(&self, endpoint: Endpoint, response: TransportResponse) {
        self.defaults.lock().unwrap().insert(endpoint, response);
    }

    /// Queue a one-shot response for the next call to `endpoint`.
    pub fn push(&self, endpoint: Endpoint, response: TransportResponse) {
        self.scripted
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(response);
    }

    /// Hold every subsequent call until [`release`](Self::release).
    pub fn hold(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Let `calls` held calls through.
    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.endpoint == endpoint)
            .count()
    }

    fn answer(&self, endpoint: Endpoint) -> Result<TransportResponse, TransportError> {
        if let Some(response) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
        {
            return Ok(response);
        }
        self.defaults
            .lock()
            .unwrap()
            .get(&endpoint)
            .cloned()
            .ok_or_else(|| TransportError::Unavailable(format!("no stub for {endpoint}")))
    }
}

impl Transport for StubTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>> {
        Box::pin(async move {
            let body = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
            self.calls.lock().unwrap().push(RecordedCall {
                endpoint: request.endpoint,
                url: request.url,
                body,
            });
            if self.gated.load(Ordering::SeqCst) {
                self.gate
                    .acquire()
                    .await
                    .map_err(|e| TransportError::Unavailable(e.to_string()))?
                    .forget();
            }
            self.answer(request.endpoint)
        })
    }
}

/// An unsigned JWT whose payload carries `uid`.
pub fn fake_id_token(uid: &str, label: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "sub": uid,
            "user_id": uid,
            "label": label,
            "firebase": { "sign_in_provider": "custom" }
        })
        .to_string(),
    );
    format!("{header}.{payload}.sig")
}

pub fn verify_password_ok(uid: &str, email: &str) -> TransportResponse {
    TransportResponse::ok_json(&json!({
        "localId": uid,
        "email": email,
        "displayName": "",
        "idToken": fake_id_token(uid, "password"),
        "refreshToken": format!("refresh-{uid}"),
        "expiresIn": "3600",
        "registered": true
    }))
}

pub fn sign_up_ok(uid: &str) -> TransportResponse {
    TransportResponse::ok_json(&json!({
        "localId": uid,
        "idToken": fake_id_token(uid, "anonymous"),
        "refreshToken": format!("refresh-{uid}"),
        "expiresIn": "3600"
    }))
}

pub fn secure_token_ok(id_token: &str) -> TransportResponse {
    TransportResponse::ok_json(&json!({
        "access_token": id_token,
        "id_token": id_token,
        "refresh_token": "refresh-rotated",
        "expires_in": "3600",
        "token_type": "Bearer"
    }))
}

pub fn backend_error(status: u16, message: &str) -> TransportResponse {
    TransportResponse::new(
        status,
        json!({ "error": { "code": status, "message": message } }).to_string(),
    )
}

pub struct Harness {
    pub auth: Auth,
    pub transport: Arc<StubTransport>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    harness_with(AuthConfig::new("test-api-key"))
}

pub fn harness_with(config: AuthConfig) -> Harness {
    init_tracing();
    let transport = StubTransport::new();
    let clock = Arc::new(ManualClock::new(START_MS));
    let auth = Auth::builder(config)
        .transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .clock(Arc::clone(&clock) as Arc<dyn warden_engine::Clock>)
        .build()
        .expect("session starts");
    Harness {
        auth,
        transport,
        clock,
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub const WAIT: Duration = Duration::from_secs(5);

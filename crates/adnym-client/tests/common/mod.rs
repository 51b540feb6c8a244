//! Shared harness for lifecycle integration tests: scripted transport,
//! gated transport for race tests, callback recorder, and envelope builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::sync::oneshot;

use adnym_client::{
    HttpRequest, HttpResponse, IdentityEnvelope, IdentityStatus, StatusCallback, StatusPayload,
    Transport, TransportError,
};
use adnym_codec::aead::{self, KeySecret};

/// A fixed "current instant" for manual clocks.
pub const NOW: u64 = 1_710_000_000_000;

const RESPONSE_KEY: [u8; 32] = [7u8; 32];

/// The base64 response key every test envelope carries.
pub fn response_key_b64() -> String {
    BASE64.encode(RESPONSE_KEY)
}

/// Build an envelope with offsets (in ms) relative to `now`.
pub fn envelope_at(
    now: u64,
    refresh_from_delta: i64,
    identity_expires_delta: i64,
    refresh_expires_delta: i64,
    token: &str,
) -> IdentityEnvelope {
    let at = |delta: i64| now.checked_add_signed(delta).expect("offset in range");
    IdentityEnvelope {
        advertising_token: token.to_string(),
        refresh_token: format!("refresh-of-{token}"),
        identity_expires: at(identity_expires_delta),
        refresh_from: at(refresh_from_delta),
        refresh_expires: at(refresh_expires_delta),
        refresh_response_key: response_key_b64(),
    }
}

/// Encrypted `{"status":"success","body":<envelope>}` response body.
pub fn success_body(envelope: &IdentityEnvelope) -> Vec<u8> {
    let key = KeySecret::from_bytes(&RESPONSE_KEY).expect("fixed key");
    let json = serde_json::json!({ "status": "success", "body": envelope }).to_string();
    let sealed = aead::seal(&key, json.as_bytes()).expect("seal response");
    BASE64.encode(sealed).into_bytes()
}

/// Plaintext `{"status": ...}` body, as the endpoint sends on HTTP errors.
pub fn plain_status_body(status: &str) -> Vec<u8> {
    format!(r#"{{"status":"{status}"}}"#).into_bytes()
}

/// Transport that replays a scripted queue of responses and records every
/// request it sees. An exhausted script fails the call.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_response(&self, status: u16, body: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse { status, body }));
    }

    pub fn push_transport_error(&self) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Network("scripted failure".into())));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into())))
    }
}

/// Transport that parks the request until the test releases a response,
/// for exercising the disconnect-races-refresh window.
pub struct GatedTransport {
    gate: Mutex<Option<oneshot::Receiver<HttpResponse>>>,
}

impl GatedTransport {
    pub fn new() -> (Arc<Self>, oneshot::Sender<HttpResponse>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                gate: Mutex::new(Some(rx)),
            }),
            tx,
        )
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn post(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let gate = self.gate.lock().unwrap().take();
        match gate {
            Some(rx) => rx
                .await
                .map_err(|_| TransportError::Network("gate dropped".into())),
            None => Err(TransportError::Network("gate already consumed".into())),
        }
    }
}

/// Records every callback invocation for later assertions.
#[derive(Clone, Default)]
pub struct CallbackRecorder {
    events: Arc<Mutex<Vec<StatusPayload>>>,
}

impl CallbackRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> StatusCallback {
        let events = Arc::clone(&self.events);
        Arc::new(move |payload| events.lock().unwrap().push(payload))
    }

    pub fn statuses(&self) -> Vec<IdentityStatus> {
        self.events.lock().unwrap().iter().map(|p| p.status).collect()
    }

    pub fn payloads(&self) -> Vec<StatusPayload> {
        self.events.lock().unwrap().clone()
    }
}

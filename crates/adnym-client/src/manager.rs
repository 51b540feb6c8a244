//! The identity lifecycle manager.
//!
//! [`IdentityClient`] owns the current envelope, the refresh timer, the
//! waiter queue, and the cookie mirror. It drives the lifecycle state
//! machine: classification at init, background refresh against the remote
//! endpoint, terminal transitions on opt-out and credential expiry, and the
//! retry policy for transient failures.
//!
//! ## Ordering guarantees
//!
//! Every transition mutates state and the cookie first, then runs the host
//! callback, then resolves queued waiters - in that order and outside the
//! state lock, so host code re-entering from the callback observes the
//! post-transition state. Waiter resolution is FIFO. A `disconnect` bumps
//! an epoch counter so that in-flight refresh completions and stale timer
//! fires become no-ops.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classify::{classify, token_returnable, IdentityState};
use crate::clock::Clock;
use crate::config::InitOptions;
use crate::cookie::{CookieDirective, CookieJar, IDENTITY_COOKIE_NAME};
use crate::envelope::IdentityEnvelope;
use crate::error::{ClientError, TokenError};
use crate::response::{
    interpret_refresh_response, RefreshOutcome, CLIENT_VERSION, CLIENT_VERSION_HEADER,
    REFRESH_PATH,
};
use crate::status::{IdentityStatus, StatusCallback, StatusPayload};
use crate::transport::{HttpRequest, Transport};

type TokenResult = Result<String, TokenError>;

/// Internal lifecycle phase; distinct from the callback status taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Initialising,
    Established,
    Refreshing,
    RefreshingWithExpiredToken,
    Unavailable(UnavailableKind),
    Disconnected,
}

/// Why the identity is unavailable, and whether that is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UnavailableKind {
    NoIdentity,
    Invalid,
    RefreshExpired,
    OptOut,
    /// Expired-but-recoverable: the envelope is kept and a retry is armed.
    Temporary,
}

#[derive(Clone)]
struct RuntimeOptions {
    callback: StatusCallback,
    refresh_retry_period: Duration,
    refresh_url: String,
    cookie_domain: Option<String>,
    cookie_path: String,
}

struct State {
    phase: Phase,
    identity: Option<IdentityEnvelope>,
    options: Option<RuntimeOptions>,
    waiters: VecDeque<oneshot::Sender<TokenResult>>,
    timer: Option<JoinHandle<()>>,
    epoch: u64,
    refresh_in_flight: bool,
    init_called: bool,
}

struct Core {
    clock: Arc<dyn Clock>,
    transport: Arc<dyn Transport>,
    cookies: Arc<dyn CookieJar>,
    state: Mutex<State>,
}

/// Deferred side effects collected under the state lock and run after it is
/// released: callback first, then waiter resolutions in FIFO order.
#[derive(Default)]
struct Effects {
    callback: Option<(StatusCallback, StatusPayload)>,
    resolutions: Vec<(oneshot::Sender<TokenResult>, TokenResult)>,
}

impl Effects {
    fn run(self) {
        if let Some((callback, payload)) = self.callback {
            callback(payload);
        }
        for (tx, result) in self.resolutions {
            let _ = tx.send(result);
        }
    }
}

/// The client-side identity lifecycle manager.
///
/// One instance per page; constructed over injected collaborators and
/// initialised exactly once. Cheap to clone handles are not provided -
/// share via `Arc` if needed.
pub struct IdentityClient {
    core: Arc<Core>,
}

impl IdentityClient {
    /// Create a client over the injected clock, transport, and cookie jar.
    ///
    /// The client is inert until [`init`](Self::init) runs.
    pub fn new(
        clock: Arc<dyn Clock>,
        transport: Arc<dyn Transport>,
        cookies: Arc<dyn CookieJar>,
    ) -> Self {
        Self {
            core: Arc::new(Core {
                clock,
                transport,
                cookies,
                state: Mutex::new(State {
                    phase: Phase::Initialising,
                    identity: None,
                    options: None,
                    waiters: VecDeque::new(),
                    timer: None,
                    epoch: 0,
                    refresh_in_flight: false,
                    init_called: false,
                }),
            }),
        }
    }

    /// One-shot initialisation.
    ///
    /// Adopts the supplied envelope (or the cookie's), classifies it, emits
    /// a single callback reflecting the post-init status, drains waiters
    /// accordingly, and arms the refresh timer. Must be called from within
    /// a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyInitialized`] on a second call (or any
    /// call after [`disconnect`](Self::disconnect)), and
    /// [`ClientError::Config`] when the options fail validation.
    pub fn init(&self, options: InitOptions) -> Result<(), ClientError> {
        options.validate()?;

        let core = &self.core;
        let mut state = core.lock_state();
        if state.init_called || state.phase == Phase::Disconnected {
            return Err(ClientError::AlreadyInitialized);
        }
        state.init_called = true;

        let runtime = RuntimeOptions {
            callback: Arc::clone(&options.callback),
            refresh_retry_period: Duration::from_millis(options.refresh_retry_period_ms),
            refresh_url: format!("{}{}", options.base_url.trim_end_matches('/'), REFRESH_PATH),
            cookie_domain: options.cookie_domain.clone(),
            cookie_path: options.cookie_path.clone(),
        };
        state.options = Some(runtime);

        let now = core.clock.now_ms();
        let (identity, from_cookie) = match options.identity {
            Some(envelope) => (Some(envelope.normalized()), false),
            None => (core.read_cookie_envelope(), true),
        };

        let effects = core.adopt_at_init(&mut state, identity, from_cookie, now);
        drop(state);
        effects.run();
        Ok(())
    }

    /// Synchronous token accessor; never triggers I/O.
    ///
    /// Returns the current advertising token while the lifecycle is
    /// established (including while a background refresh of a still-valid
    /// identity is in flight); `None` is the "not available" sentinel.
    pub fn advertising_token(&self) -> Option<String> {
        let state = self.core.lock_state();
        match state.phase {
            Phase::Established | Phase::Refreshing => {
                let now = self.core.clock.now_ms();
                if token_returnable(state.identity.as_ref(), now) {
                    state
                        .identity
                        .as_ref()
                        .map(|envelope| envelope.advertising_token.clone())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Asynchronous token accessor.
    ///
    /// The returned future resolves once the lifecycle has a definitive
    /// answer: immediately when a token is returnable or the state is
    /// terminal-negative, otherwise when the in-flight transition settles.
    /// Concurrent requests drain in FIFO order with identical outcomes.
    pub fn advertising_token_async(&self) -> TokenRequest {
        let mut state = self.core.lock_state();
        let now = self.core.clock.now_ms();

        let ready = match state.phase {
            Phase::Disconnected => Some(Err(TokenError::Disconnected)),
            Phase::Unavailable(kind) => match kind {
                UnavailableKind::NoIdentity | UnavailableKind::Invalid => {
                    Some(Err(TokenError::InitFailed))
                }
                UnavailableKind::RefreshExpired => Some(Err(TokenError::RefreshExpired)),
                UnavailableKind::OptOut => Some(Err(TokenError::OptOut)),
                UnavailableKind::Temporary => None,
            },
            Phase::Established => {
                if token_returnable(state.identity.as_ref(), now) {
                    state
                        .identity
                        .as_ref()
                        .map(|envelope| Ok(envelope.advertising_token.clone()))
                } else {
                    None
                }
            }
            Phase::Initialising | Phase::Refreshing | Phase::RefreshingWithExpiredToken => None,
        };

        match ready {
            Some(result) => TokenRequest::ready(result),
            None => {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                TokenRequest::waiting(rx)
            }
        }
    }

    /// Whether the host must run a fresh login to obtain an identity.
    ///
    /// `false` while a valid envelope is held or a refresh may still
    /// recover one.
    pub fn is_login_required(&self) -> bool {
        let state = self.core.lock_state();
        match state.phase {
            Phase::Established | Phase::Refreshing | Phase::RefreshingWithExpiredToken => false,
            Phase::Unavailable(UnavailableKind::Temporary) => false,
            Phase::Initialising => state.identity.is_none(),
            _ => true,
        }
    }

    /// Terminal teardown.
    ///
    /// Cancels the timer, clears the cookie, rejects every queued waiter
    /// with a disconnect error, and discards any in-flight refresh response
    /// on arrival. No further callbacks fire; subsequent `init` calls are
    /// rejected and token requests reject immediately.
    pub fn disconnect(&self) {
        let core = &self.core;
        let mut state = core.lock_state();
        if state.phase == Phase::Disconnected {
            return;
        }
        info!("disconnecting identity client");

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.epoch += 1;
        state.refresh_in_flight = false;
        core.clear_cookie(&state);
        state.identity = None;
        state.phase = Phase::Disconnected;

        let mut effects = Effects::default();
        drain_waiters(&mut state, &mut effects, Err(TokenError::Disconnected));
        drop(state);
        effects.run();
    }

    /// Cancel the refresh timer without touching any other state.
    ///
    /// Intended for host teardown in tests; the cookie and waiters are left
    /// as they are.
    pub fn abort(&self) {
        let mut state = self.core.lock_state();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.core.lock_state();
        f.debug_struct("IdentityClient")
            .field("phase", &state.phase)
            .field("identity", &state.identity.is_some())
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

impl Core {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("client state lock poisoned")
    }

    /// Classify the adopted envelope and run the matching init transition.
    fn adopt_at_init(
        self: &Arc<Self>,
        state: &mut State,
        identity: Option<IdentityEnvelope>,
        from_cookie: bool,
        now: u64,
    ) -> Effects {
        let mut effects = Effects::default();

        match classify(identity.as_ref(), now) {
            IdentityState::NoIdentity => {
                info!("init: no identity available");
                state.phase = Phase::Unavailable(UnavailableKind::NoIdentity);
                self.emit(
                    state,
                    &mut effects,
                    IdentityStatus::NoIdentity,
                    "No identity available",
                );
                drain_waiters(state, &mut effects, Err(TokenError::InitFailed));
            }
            IdentityState::Invalid => {
                warn!("init: identity envelope failed validation");
                state.phase = Phase::Unavailable(UnavailableKind::Invalid);
                self.clear_cookie(state);
                self.emit(
                    state,
                    &mut effects,
                    IdentityStatus::Invalid,
                    "Identity envelope failed validation",
                );
                drain_waiters(state, &mut effects, Err(TokenError::InitFailed));
            }
            IdentityState::RefreshExpired => {
                info!("init: refresh token already expired");
                state.phase = Phase::Unavailable(UnavailableKind::RefreshExpired);
                self.clear_cookie(state);
                self.emit(
                    state,
                    &mut effects,
                    IdentityStatus::RefreshExpired,
                    "Refresh token has expired",
                );
                drain_waiters(state, &mut effects, Err(TokenError::InitFailed));
            }
            IdentityState::Expired => {
                let envelope = identity.expect("classified envelope present");
                info!("init: identity expired, attempting refresh");
                if !from_cookie {
                    self.write_cookie(state, &envelope);
                }
                state.identity = Some(envelope);
                self.begin_refresh(state, now);
            }
            IdentityState::Established { refresh_due } => {
                let envelope = identity.expect("classified envelope present");
                if !from_cookie {
                    self.write_cookie(state, &envelope);
                }
                state.identity = Some(envelope);
                if refresh_due {
                    info!("init: identity established, refresh already due");
                    self.begin_refresh(state, now);
                } else {
                    info!("init: identity established");
                    state.phase = Phase::Established;
                    let delay = self.established_delay(state, now);
                    self.arm_timer(state, delay);
                    let text = if from_cookie {
                        "Identity established from cookie"
                    } else {
                        "Identity established from bootstrap envelope"
                    };
                    self.emit(state, &mut effects, IdentityStatus::Established, text);
                    let token = state
                        .identity
                        .as_ref()
                        .map(|envelope| envelope.advertising_token.clone())
                        .expect("established identity present");
                    drain_waiters(state, &mut effects, Ok(token));
                }
            }
        }

        effects
    }

    /// Move into a refreshing phase and issue the RPC. At most one RPC is
    /// in flight per instance.
    fn begin_refresh(self: &Arc<Self>, state: &mut State, now: u64) {
        let Some(envelope) = state.identity.clone() else {
            return;
        };
        if state.refresh_in_flight {
            return;
        }

        let expired = !token_returnable(Some(&envelope), now);
        state.phase = if expired {
            Phase::RefreshingWithExpiredToken
        } else {
            Phase::Refreshing
        };
        state.refresh_in_flight = true;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let options = state.options.clone().expect("init populated options");
        let epoch = state.epoch;
        let core = Arc::clone(self);
        debug!(url = %options.refresh_url, expired, "issuing refresh");

        tokio::spawn(async move {
            let request = HttpRequest {
                url: options.refresh_url.clone(),
                body: envelope.refresh_token.clone(),
                headers: vec![(CLIENT_VERSION_HEADER.to_string(), CLIENT_VERSION.to_string())],
            };
            let outcome = match core.transport.post(request).await {
                Ok(response) => interpret_refresh_response(
                    response.status,
                    &response.body,
                    &envelope.refresh_response_key,
                ),
                Err(err) => {
                    warn!(%err, "refresh transport failed");
                    RefreshOutcome::Error
                }
            };
            core.on_refresh_settled(epoch, outcome);
        });
    }

    /// Apply a settled refresh outcome. Late completions after disconnect
    /// (epoch mismatch) are discarded.
    fn on_refresh_settled(self: &Arc<Self>, epoch: u64, outcome: RefreshOutcome) {
        let mut state = self.lock_state();
        if state.epoch != epoch || !state.refresh_in_flight {
            debug!("discarding stale refresh completion");
            return;
        }
        state.refresh_in_flight = false;

        let now = self.clock.now_ms();
        let mut effects = Effects::default();

        match outcome {
            RefreshOutcome::Refreshed(envelope) => {
                info!("refresh succeeded");
                self.write_cookie(&state, &envelope);
                state.identity = Some(envelope);
                state.phase = Phase::Established;
                let delay = self.established_delay(&state, now);
                self.arm_timer(&mut state, delay);
                self.emit(
                    &mut state,
                    &mut effects,
                    IdentityStatus::Refreshed,
                    "Identity refreshed",
                );
                let token = state
                    .identity
                    .as_ref()
                    .map(|envelope| envelope.advertising_token.clone())
                    .expect("refreshed identity present");
                drain_waiters(&mut state, &mut effects, Ok(token));
            }
            RefreshOutcome::OptOut => {
                info!("refresh reported opt-out");
                self.settle_terminal(
                    &mut state,
                    &mut effects,
                    UnavailableKind::OptOut,
                    IdentityStatus::Optout,
                    "User has opted out",
                    TokenError::OptOut,
                );
            }
            RefreshOutcome::ExpiredToken => {
                info!("refresh reported an expired token");
                self.settle_terminal(
                    &mut state,
                    &mut effects,
                    UnavailableKind::RefreshExpired,
                    IdentityStatus::RefreshExpired,
                    "Refresh token has expired",
                    TokenError::RefreshExpired,
                );
            }
            RefreshOutcome::Error => match classify(state.identity.as_ref(), now) {
                IdentityState::Established { .. } => {
                    debug!("refresh failed; current token still valid, retry armed");
                    state.phase = Phase::Established;
                    let retry = state
                        .options
                        .as_ref()
                        .map(|options| options.refresh_retry_period)
                        .unwrap_or_default();
                    self.arm_timer(&mut state, retry);
                    let token = state
                        .identity
                        .as_ref()
                        .map(|envelope| envelope.advertising_token.clone())
                        .expect("valid identity present");
                    drain_waiters(&mut state, &mut effects, Ok(token));
                }
                IdentityState::Expired => {
                    info!("refresh failed with an expired identity; retry armed");
                    state.phase = Phase::Unavailable(UnavailableKind::Temporary);
                    let retry = state
                        .options
                        .as_ref()
                        .map(|options| options.refresh_retry_period)
                        .unwrap_or_default();
                    self.arm_timer(&mut state, retry);
                    self.emit(
                        &mut state,
                        &mut effects,
                        IdentityStatus::Expired,
                        "Identity expired; refresh retry scheduled",
                    );
                    drain_waiters(
                        &mut state,
                        &mut effects,
                        Err(TokenError::TemporarilyUnavailable),
                    );
                }
                _ => {
                    info!("refresh failed past the refresh deadline");
                    self.settle_terminal(
                        &mut state,
                        &mut effects,
                        UnavailableKind::RefreshExpired,
                        IdentityStatus::RefreshExpired,
                        "Refresh token has expired",
                        TokenError::RefreshExpired,
                    );
                }
            },
        }

        drop(state);
        effects.run();
    }

    /// Terminal-negative settlement: clear the cookie, drop the envelope,
    /// emit the status, reject all waiters. The timer stays disarmed.
    fn settle_terminal(
        self: &Arc<Self>,
        state: &mut State,
        effects: &mut Effects,
        kind: UnavailableKind,
        status: IdentityStatus,
        text: &str,
        error: TokenError,
    ) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        self.clear_cookie(state);
        state.identity = None;
        state.phase = Phase::Unavailable(kind);
        self.emit(state, effects, status, text);
        drain_waiters(state, effects, Err(error));
    }

    /// Timer fire: a no-op unless the phase still wants a background
    /// refresh and none is in flight.
    fn on_timer_fired(self: &Arc<Self>, epoch: u64) {
        let mut state = self.lock_state();
        if state.epoch != epoch || state.refresh_in_flight {
            return;
        }
        match state.phase {
            Phase::Established | Phase::Unavailable(UnavailableKind::Temporary) => {
                let now = self.clock.now_ms();
                debug!("refresh timer fired");
                self.begin_refresh(&mut state, now);
            }
            _ => {}
        }
    }

    /// Delay until the next scheduled refresh of the current envelope.
    fn established_delay(&self, state: &State, now: u64) -> Duration {
        let refresh_from = state
            .identity
            .as_ref()
            .map(|envelope| envelope.refresh_from)
            .unwrap_or(now);
        Duration::from_millis(refresh_from.saturating_sub(now))
    }

    /// Arm the refresh timer; exactly one timer exists at a time.
    fn arm_timer(self: &Arc<Self>, state: &mut State, delay: Duration) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let epoch = state.epoch;
        let core = Arc::clone(self);
        debug!(?delay, "arming refresh timer");
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            core.on_timer_fired(epoch);
        }));
    }

    /// Queue the host callback with a payload reflecting current state.
    fn emit(
        &self,
        state: &mut State,
        effects: &mut Effects,
        status: IdentityStatus,
        text: &str,
    ) {
        let Some(options) = state.options.as_ref() else {
            return;
        };
        let now = self.clock.now_ms();
        let (token, identity) = if token_returnable(state.identity.as_ref(), now) {
            (
                state
                    .identity
                    .as_ref()
                    .map(|envelope| envelope.advertising_token.clone()),
                state.identity.clone(),
            )
        } else {
            (None, None)
        };
        effects.callback = Some((
            Arc::clone(&options.callback),
            StatusPayload::new(status, text, token, identity),
        ));
    }

    fn read_cookie_envelope(&self) -> Option<IdentityEnvelope> {
        let raw = self.cookies.read(IDENTITY_COOKIE_NAME)?;
        match IdentityEnvelope::parse_cookie_value(&raw) {
            Ok(envelope) => Some(envelope),
            Err(err) => {
                warn!(%err, "identity cookie could not be parsed");
                None
            }
        }
    }

    fn write_cookie(&self, state: &State, envelope: &IdentityEnvelope) {
        let (domain, path) = cookie_params(state);
        let directive = CookieDirective {
            name: IDENTITY_COOKIE_NAME.to_string(),
            value: envelope.to_cookie_value(),
            expires_at_ms: envelope.refresh_expires,
            domain,
            path,
        };
        if let Err(err) = self.cookies.write(&directive) {
            warn!(%err, "identity cookie write failed; continuing in memory");
        }
    }

    fn clear_cookie(&self, state: &State) {
        let (domain, path) = cookie_params(state);
        self.cookies
            .clear(IDENTITY_COOKIE_NAME, domain.as_deref(), &path);
    }
}

fn cookie_params(state: &State) -> (Option<String>, String) {
    match state.options.as_ref() {
        Some(options) => (options.cookie_domain.clone(), options.cookie_path.clone()),
        None => (None, "/".to_string()),
    }
}

/// Reject or resolve every queued waiter with the same outcome, FIFO.
fn drain_waiters(state: &mut State, effects: &mut Effects, result: TokenResult) {
    while let Some(tx) = state.waiters.pop_front() {
        effects.resolutions.push((tx, result.clone()));
    }
}

/// A pending token request: the promise-shaped handle returned by
/// [`IdentityClient::advertising_token_async`].
pub struct TokenRequest {
    inner: RequestState,
}

enum RequestState {
    Ready(Option<TokenResult>),
    Waiting(oneshot::Receiver<TokenResult>),
}

impl TokenRequest {
    fn ready(result: TokenResult) -> Self {
        Self {
            inner: RequestState::Ready(Some(result)),
        }
    }

    fn waiting(rx: oneshot::Receiver<TokenResult>) -> Self {
        Self {
            inner: RequestState::Waiting(rx),
        }
    }
}

impl Future for TokenRequest {
    type Output = TokenResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            RequestState::Ready(slot) => {
                Poll::Ready(slot.take().expect("token request polled after completion"))
            }
            RequestState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or(Err(TokenError::Disconnected))),
        }
    }
}

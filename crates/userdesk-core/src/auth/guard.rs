//! Bearer-token handling shared by every authenticated request.
//!
//! `SessionGuard` attaches the current access token to outgoing requests and
//! turns a 401 into at most one concurrent refresh. Requests that hit a 401
//! while a refresh is in flight wait in a FIFO queue and are replayed with the
//! new token once it settles; if the refresh fails they all fail with
//! `SessionExpired`, credentials are cleared and a single login redirect is
//! signalled.
//!
//! Refresh state lives inside the guard rather than in a global, so separate
//! guards (one per API client) never share a refresh cycle. Clones of one
//! guard do share it.
//!
//! The refresh and the replays run on their own task. Every caller, the one
//! that started the cycle included, waits on a oneshot reply, so cancelling
//! any caller leaves the others untouched.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ApiRequest, ApiResponse, Transport, TransportError};

use super::credentials::CredentialStore;
use super::navigation::Navigator;
use super::session::Credential;
use super::token_format::{TokenFormat, TokenPlacement};

pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Upper bound on a single refresh call before the session is abandoned.
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub refresh_path: String,
    pub placement: TokenPlacement,
    pub token_format: TokenFormat,
    pub refresh_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            placement: TokenPlacement::default(),
            token_format: TokenFormat::default(),
            refresh_timeout: Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS),
        }
    }
}

type Reply = oneshot::Sender<Result<ApiResponse, ApiError>>;

/// A request parked behind the in-flight refresh.
struct PendingRequest {
    request: ApiRequest,
    reply: Reply,
}

/// `queue` is non-empty only while `refreshing` is set.
#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    queue: VecDeque<PendingRequest>,
}

impl RefreshState {
    fn settle(&mut self) -> VecDeque<PendingRequest> {
        self.refreshing = false;
        std::mem::take(&mut self.queue)
    }
}

/// Ownership of the current refresh cycle.
///
/// Dropping it without `finish` (the refresh task panicked or the runtime
/// shut down) resets the state and drops the queued replies, so waiters
/// see an error instead of hanging.
struct RefreshCycle<'a> {
    state: &'a Mutex<RefreshState>,
    settled: bool,
}

impl RefreshCycle<'_> {
    fn finish(mut self) -> VecDeque<PendingRequest> {
        self.settled = true;
        self.state.lock().settle()
    }
}

impl Drop for RefreshCycle<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let abandoned = self.state.lock().settle();
            warn!(queued = abandoned.len(), "Session refresh abandoned");
        }
    }
}

/// Attaches credentials to requests and coordinates token refresh.
/// Clone is cheap and clones share the same refresh cycle.
#[derive(Clone)]
pub struct SessionGuard {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    config: Arc<GuardConfig>,
    state: Arc<Mutex<RefreshState>>,
}

impl SessionGuard {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        config: GuardConfig,
    ) -> Self {
        Self {
            transport,
            store,
            navigator,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(RefreshState::default())),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Number of requests waiting on the in-flight refresh.
    pub fn pending_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Current credential; a store failure is logged and reads as none.
    pub fn current_credential(&self) -> Option<Credential> {
        match self.store.get() {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Failed to read credentials");
                None
            }
        }
    }

    /// Copy of `request` carrying the current access token, if there is one.
    pub fn prepare(&self, request: &ApiRequest) -> ApiRequest {
        match self.current_credential().filter(Credential::has_access_token) {
            Some(credential) => request.with_bearer(&credential.access_token, &self.config.placement),
            None => request.clone(),
        }
    }

    /// Send an authenticated request, renewing the session on a 401.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let prepared = self.prepare(&request);
        match self.transport.send(&prepared).await {
            Ok(response) => Ok(response),
            Err(error) => self.on_response_error(request, error).await,
        }
    }

    /// Classify a failed response and, for a renewable 401, refresh and replay.
    pub async fn on_response_error(
        &self,
        request: ApiRequest,
        error: TransportError,
    ) -> Result<ApiResponse, ApiError> {
        let status = match &error {
            TransportError::Network(msg) => {
                debug!(path = request.path(), error = %msg, "No response, not retrying");
                return Err(ApiError::Network(msg.clone()));
            }
            TransportError::Status { status, .. } => *status,
        };

        if status != StatusCode::UNAUTHORIZED
            || self.is_refresh_call(&request)
            || request.is_retried()
        {
            return Err(ApiError::from(error));
        }

        // Check-and-set under the lock, no await in between.
        let waiter = {
            let mut state = self.state.lock();
            if state.refreshing {
                let (reply, rx) = oneshot::channel();
                state.queue.push_back(PendingRequest {
                    request: request.clone(),
                    reply,
                });
                Some(rx)
            } else {
                state.refreshing = true;
                None
            }
        };

        let rx = match waiter {
            Some(rx) => {
                debug!(path = request.path(), "Refresh in flight, queueing request");
                rx
            }
            None => self.spawn_refresh(request, error),
        };

        rx.await.unwrap_or_else(|_| {
            Err(ApiError::SessionExpired(
                "Session refresh was abandoned".to_string(),
            ))
        })
    }

    /// Run the refresh cycle on its own task; the reply carries the outcome
    /// for the request that started it.
    fn spawn_refresh(
        &self,
        request: ApiRequest,
        error: TransportError,
    ) -> oneshot::Receiver<Result<ApiResponse, ApiError>> {
        let (reply, rx) = oneshot::channel();
        let guard = self.clone();
        tokio::spawn(async move {
            let cycle = RefreshCycle {
                state: &guard.state,
                settled: false,
            };
            let result = guard.refresh_and_replay(cycle, &request, error).await;
            // The caller may have gone away; the queue was still served.
            let _ = reply.send(result);
        });
        rx
    }

    fn is_refresh_call(&self, request: &ApiRequest) -> bool {
        let refresh_path = self.config.refresh_path.trim_end_matches('/');
        request.path().trim_end_matches('/') == refresh_path
    }

    async fn refresh_and_replay(
        &self,
        cycle: RefreshCycle<'_>,
        request: &ApiRequest,
        error: TransportError,
    ) -> Result<ApiResponse, ApiError> {
        let refresh_token = self
            .current_credential()
            .filter(Credential::has_refresh_token)
            .map(|c| c.refresh_token);

        let Some(refresh_token) = refresh_token else {
            warn!(path = request.path(), "No refresh token available, ending session");
            self.end_session(cycle, ApiError::from(error), request);
            return Err(ApiError::SessionExpired(
                "No refresh token available".to_string(),
            ));
        };

        match self.refresh(&refresh_token).await {
            Ok(credential) => {
                if let Err(e) = self.store.set(&credential) {
                    warn!(error = %e, "Failed to persist refreshed credentials");
                }
                let queued = cycle.finish();
                info!(queued = queued.len(), "Session refreshed, replaying requests");

                let token = credential.access_token.as_str();
                let original = self.replay(request, token);
                let mut replays = Vec::with_capacity(queued.len());
                for pending in queued {
                    replays.push(async move {
                        let result = self.replay(&pending.request, token).await;
                        // The waiter may have been dropped; nothing to deliver then.
                        let _ = pending.reply.send(result);
                    });
                }
                // Both joins poll in order, so replays start in queue order.
                let (result, _) = futures::join!(original, join_all(replays));
                result
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed, ending session");
                let expired = ApiError::SessionExpired(e.to_string());
                self.end_session(cycle, expired.clone(), request);
                Err(expired)
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credential, ApiError> {
        let request = ApiRequest::post(self.config.refresh_path.clone())
            .json_value(self.config.token_format.refresh_request(refresh_token));
        debug!(path = request.path(), "Refreshing session");

        let timeout = self.config.refresh_timeout;
        let response = tokio::time::timeout(timeout, self.transport.send(&request))
            .await
            .map_err(|_| ApiError::Timeout(timeout))?
            .map_err(ApiError::from)?;

        self.config
            .token_format
            .parse_credential(&response.body, Some(refresh_token))
    }

    /// Re-issue a request once with a fresh token. A second 401 comes back
    /// as `Unauthorized` because the copy is marked as retried.
    async fn replay(&self, request: &ApiRequest, access_token: &str) -> Result<ApiResponse, ApiError> {
        let retry = request
            .as_retry()
            .with_bearer(access_token, &self.config.placement);
        debug!(path = retry.path(), "Replaying request");
        self.transport.send(&retry).await.map_err(ApiError::from)
    }

    fn end_session(&self, cycle: RefreshCycle<'_>, waiter_error: ApiError, request: &ApiRequest) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credentials");
        }
        for pending in cycle.finish() {
            let _ = pending.reply.send(Err(waiter_error.clone()));
        }
        self.navigator.redirect_to_login(Some(request.path()));
    }
}

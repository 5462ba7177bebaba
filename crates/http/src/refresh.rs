//! Single-flight refresh-token exchange
//!
//! The coordinator is either idle or refreshing. The first caller to find it
//! idle becomes the leader and performs the one exchange; callers that arrive
//! while it is refreshing park on a oneshot channel and receive the leader's
//! outcome in arrival order. The state flips to refreshing under the lock,
//! before the first await, so a second exchange cannot start for the same
//! expiry window.

use crate::error::RefreshError;
use crate::transport::{ApiRequest, Transport};
use async_trait::async_trait;
use portal_core::{Navigator, RefreshEndpoint, Role, TokenStore, jwt};
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Tokens handed back by a successful exchange or login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
struct GrantBody {
    #[serde(default, rename = "accessToken", alias = "access_token", alias = "token", alias = "jwt")]
    access_token: Option<String>,
    #[serde(default, rename = "refreshToken", alias = "refresh_token")]
    refresh_token: Option<String>,
    #[serde(default)]
    roles: Option<Vec<String>>,
    #[serde(default)]
    data: Option<Box<GrantBody>>,
}

impl TokenGrant {
    /// Pull tokens out of a backend auth response.
    ///
    /// Accepts `{token, refreshToken}`, `{jwt, refresh_token}` and
    /// `{accessToken, refreshToken, roles}`, bare or wrapped in `{data: ...}`.
    pub fn from_json(body: &serde_json::Value) -> Option<Self> {
        let body = GrantBody::deserialize(body).ok()?;
        Self::from_body(body)
    }

    fn from_body(body: GrantBody) -> Option<Self> {
        let Some(access_token) = body.access_token.filter(|t| !t.is_empty()) else {
            return body.data.and_then(|inner| Self::from_body(*inner));
        };

        Some(Self {
            access_token,
            refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
            role: body
                .roles
                .map(|roles| Role::highest(roles.iter().map(String::as_str))),
        })
    }

    /// Role from the grant, else from the access token's claims.
    ///
    /// `None` when neither names a role, so the stored role is kept.
    pub fn resolve_role(&self, client_id: &str) -> Option<Role> {
        self.role.or_else(|| {
            jwt::decode(&self.access_token)
                .ok()
                .and_then(|claims| claims.granted_role(client_id))
        })
    }
}

/// Trades a refresh token for new tokens
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError>;
}

/// Exchange over HTTP, sent on the raw transport so it never re-enters the pipeline
pub struct HttpTokenExchange {
    transport: Arc<dyn Transport>,
    endpoint: RefreshEndpoint,
}

impl HttpTokenExchange {
    pub fn new(transport: Arc<dyn Transport>, endpoint: RefreshEndpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    fn request(&self, refresh_token: &str) -> Result<ApiRequest, RefreshError> {
        if self.endpoint.method.eq_ignore_ascii_case("GET") {
            let encoded: String =
                url::form_urlencoded::byte_serialize(refresh_token.as_bytes()).collect();
            let path = format!("{}/{encoded}", self.endpoint.path.trim_end_matches('/'));
            return Ok(ApiRequest::get(path));
        }

        ApiRequest::post(self.endpoint.path.clone())
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .map_err(|e| RefreshError::exchange(None, e.to_string()))
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        let request = self.request(refresh_token)?;
        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| RefreshError::exchange(None, e.to_string()))?;

        let status = response.status.as_u16();
        let response = response
            .error_for_status()
            .map_err(|e| RefreshError::exchange(Some(status), e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .map_err(|e| RefreshError::exchange(Some(status), e.to_string()))?;

        TokenGrant::from_json(&body).ok_or_else(|| {
            RefreshError::exchange(Some(status), "refresh response carried no access token")
        })
    }
}

type Outcome = Result<String, RefreshError>;

enum State {
    Idle,
    Refreshing { waiters: Vec<oneshot::Sender<Outcome>> },
}

enum Entry {
    Lead(String),
    Wait(oneshot::Receiver<Outcome>),
    NoRefreshToken,
}

/// Single-flight controller for the refresh-token exchange
pub struct RefreshCoordinator {
    tokens: TokenStore,
    exchange: Arc<dyn TokenExchange>,
    navigator: Arc<dyn Navigator>,
    login_path: String,
    client_id: String,
    state: Mutex<State>,
}

impl RefreshCoordinator {
    pub fn new(
        tokens: TokenStore,
        exchange: Arc<dyn TokenExchange>,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            exchange,
            navigator,
            login_path: login_path.into(),
            client_id: client_id.into(),
            state: Mutex::new(State::Idle),
        }
    }

    /// Whether an exchange is currently in flight
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), State::Refreshing { .. })
    }

    /// Obtain a fresh access token, sharing any exchange already in flight.
    ///
    /// On failure the session is cleared and the navigator is sent to the
    /// login path once per failed exchange.
    ///
    /// # Errors
    ///
    /// [`RefreshError::NoRefreshToken`] without a stored refresh token,
    /// [`RefreshError::Exchange`] when the backend rejects it, and
    /// [`RefreshError::Abandoned`] if the leading caller was dropped.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        match self.enter() {
            Entry::Wait(receiver) => {
                debug!("Refresh already in flight, waiting for its outcome");
                receiver.await.unwrap_or(Err(RefreshError::Abandoned))
            }
            Entry::NoRefreshToken => {
                warn!("No refresh token stored, ending session");
                self.tokens.clear();
                self.navigator.navigate(&self.login_path);
                Err(RefreshError::NoRefreshToken)
            }
            Entry::Lead(refresh_token) => self.lead(&refresh_token).await,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) -> Entry {
        let mut state = self.lock();
        match &mut *state {
            State::Refreshing { waiters } => {
                let (sender, receiver) = oneshot::channel();
                waiters.push(sender);
                Entry::Wait(receiver)
            }
            State::Idle => match self.tokens.refresh_token() {
                Some(refresh_token) => {
                    *state = State::Refreshing {
                        waiters: Vec::new(),
                    };
                    Entry::Lead(refresh_token)
                }
                None => Entry::NoRefreshToken,
            },
        }
    }

    async fn lead(&self, refresh_token: &str) -> Outcome {
        let mut flight = Flight {
            coordinator: self,
            settled: false,
        };

        debug!("Exchanging refresh token");
        let outcome = match self.exchange.exchange(refresh_token).await {
            Ok(grant) => {
                let role = grant.resolve_role(&self.client_id);
                self.tokens
                    .set(&grant.access_token, grant.refresh_token.as_deref(), role);
                info!("Access token refreshed");
                Ok(grant.access_token)
            }
            Err(e) => {
                warn!("Token refresh failed, ending session: {e}");
                self.tokens.clear();
                Err(e)
            }
        };

        flight.settle(&outcome);
        if outcome.is_err() {
            self.navigator.navigate(&self.login_path);
        }
        outcome
    }

    fn release(&self, outcome: &Outcome) {
        let waiters = match std::mem::replace(&mut *self.lock(), State::Idle) {
            State::Refreshing { waiters } => waiters,
            State::Idle => Vec::new(),
        };

        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "Releasing queued refresh callers");
        }
        for waiter in waiters {
            // A waiter whose caller went away has nobody left to tell
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Returns the coordinator to idle even if the leading future is dropped
struct Flight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Flight<'_> {
    fn settle(&mut self, outcome: &Outcome) {
        self.settled = true;
        self.coordinator.release(outcome);
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Token refresh dropped before completing");
            self.coordinator.release(&Err(RefreshError::Abandoned));
        }
    }
}

//! Concurrency behavior of the refresh coordinator and the retry-once pipeline

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use futures::future::join_all;
use portal_core::navigate::mock::MockNavigator;
use portal_core::{MemoryStore, Navigator, RefreshEndpoint, Role, SessionGate, TokenStore};
use portal_http::{
    ApiRequest, ApiResponse, ClientError, HttpTokenExchange, RefreshCoordinator, RefreshError,
    RequestPipeline, TokenExchange, TokenGrant, Transport,
};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend that accepts exactly one bearer token and 401s everything else
struct Backend {
    valid_token: Mutex<String>,
    sent: Mutex<Vec<(String, Option<String>)>>,
}

impl Backend {
    fn accepting(token: &str) -> Arc<Self> {
        Arc::new(Self {
            valid_token: Mutex::new(token.to_string()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<(String, Option<String>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for Backend {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let bearer = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);
        self.sent
            .lock()
            .unwrap()
            .push((request.path.clone(), bearer.clone()));

        if bearer.as_deref() == Some(self.valid_token.lock().unwrap().as_str()) {
            Ok(ApiResponse::new(StatusCode::OK, r#"{"ok":true}"#))
        } else {
            Ok(ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"message":"jwt expired"}"#,
            ))
        }
    }
}

/// Exchange that takes a while and counts how often it runs
struct SlowExchange {
    calls: AtomicUsize,
    delay: Duration,
    outcome: Result<TokenGrant, RefreshError>,
}

impl SlowExchange {
    fn granting(access_token: &str, refresh_token: &str) -> Arc<Self> {
        Self::with_grant(TokenGrant {
            access_token: access_token.to_string(),
            refresh_token: Some(refresh_token.to_string()),
            role: Some(Role::User),
        })
    }

    fn with_grant(grant: TokenGrant) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            outcome: Ok(grant),
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            outcome: Err(RefreshError::exchange(Some(401), "refresh token expired")),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchange for SlowExchange {
    async fn exchange(&self, _refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.outcome.clone()
    }
}

/// Holds requests to `/slow` back before handing them to the backend
struct Lagging {
    backend: Arc<Backend>,
    lag: Duration,
}

#[async_trait]
impl Transport for Lagging {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        if request.path == "/slow" {
            tokio::time::sleep(self.lag).await;
        }
        self.backend.send(request).await
    }
}

fn recording_navigator() -> (Arc<dyn Navigator>, Arc<Mutex<Vec<String>>>) {
    let visits = Arc::new(Mutex::new(Vec::new()));
    let sink = visits.clone();
    let navigator = move |path: &str| sink.lock().unwrap().push(path.to_string());
    (Arc::new(navigator), visits)
}

fn signed_in_store() -> TokenStore {
    let tokens = TokenStore::with_default_keys(Arc::new(MemoryStore::new()));
    tokens.set("access-1", Some("refresh-1"), Some(Role::User));
    tokens
}

fn build_pipeline(
    backend: Arc<dyn Transport>,
    tokens: &TokenStore,
    exchange: Arc<dyn TokenExchange>,
    navigator: Arc<dyn Navigator>,
) -> (RequestPipeline, Arc<RefreshCoordinator>) {
    let coordinator = Arc::new(RefreshCoordinator::new(
        tokens.clone(),
        exchange,
        navigator,
        "/login",
        "hire-hunt-client",
    ));
    (
        RequestPipeline::new(backend, tokens.clone(), coordinator.clone()),
        coordinator,
    )
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_401s_share_one_refresh() {
    let backend = Backend::accepting("access-2");
    let exchange = SlowExchange::granting("access-2", "refresh-2");
    let (navigator, visits) = recording_navigator();
    let tokens = signed_in_store();
    let (pipeline, coordinator) = build_pipeline(backend.clone(), &tokens, exchange.clone(), navigator);

    let results = join_all(
        ["/a", "/b", "/c"].map(|path| pipeline.execute::<serde_json::Value>(ApiRequest::get(path))),
    )
    .await;

    for result in results {
        assert_eq!(result.unwrap()["ok"], true);
    }
    assert_eq!(exchange.calls(), 1);
    assert!(!coordinator.is_refreshing());

    let session = tokens.get();
    assert_eq!(session.access_token.as_deref(), Some("access-2"));
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-2"));
    assert!(visits.lock().unwrap().is_empty());

    let retries: Vec<_> = backend
        .sent()
        .into_iter()
        .filter(|(_, bearer)| bearer.as_deref() == Some("access-2"))
        .map(|(path, _)| path)
        .collect();
    assert_eq!(retries.len(), 3);
    assert_eq!(backend.sent().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_caller_arriving_mid_refresh_gets_same_token() {
    let backend = Backend::accepting("access-2");
    let exchange = SlowExchange::granting("access-2", "refresh-2");
    let (navigator, _) = recording_navigator();
    let tokens = signed_in_store();
    let (_, coordinator) = build_pipeline(backend, &tokens, exchange.clone(), navigator);

    let leader = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.refresh().await }
    });
    tokio::task::yield_now().await;
    assert!(coordinator.is_refreshing());

    let late = coordinator.refresh().await;
    assert_eq!(late.as_deref(), Ok("access-2"));
    assert_eq!(leader.await.unwrap().as_deref(), Ok("access-2"));
    assert_eq!(exchange.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiters_are_released_in_arrival_order() {
    let exchange = SlowExchange::granting("access-2", "refresh-2");
    let (navigator, _) = recording_navigator();
    let tokens = signed_in_store();
    let (_, coordinator) =
        build_pipeline(Backend::accepting("access-2"), &tokens, exchange.clone(), navigator);
    let released = Arc::new(Mutex::new(Vec::new()));

    let leader = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.refresh().await }
    });
    tokio::task::yield_now().await;
    assert!(coordinator.is_refreshing());

    let mut waiters = Vec::new();
    for id in 1..=5 {
        waiters.push(tokio::spawn({
            let coordinator = coordinator.clone();
            let released = released.clone();
            async move {
                let outcome = coordinator.refresh().await;
                released.lock().unwrap().push(id);
                outcome
            }
        }));
        tokio::task::yield_now().await;
    }

    assert_eq!(leader.await.unwrap().as_deref(), Ok("access-2"));
    for waiter in waiters {
        assert_eq!(waiter.await.unwrap().as_deref(), Ok("access-2"));
    }
    assert_eq!(*released.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    assert_eq!(exchange.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_keeps_stored_role_when_token_has_none() {
    let role_less = encode(
        &Header::default(),
        &json!({"sub": "7", "exp": 9_999_999_999_i64}),
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap();
    let exchange = SlowExchange::with_grant(TokenGrant {
        access_token: role_less.clone(),
        refresh_token: None,
        role: None,
    });
    let (navigator, _) = recording_navigator();
    let tokens = TokenStore::with_default_keys(Arc::new(MemoryStore::new()));
    tokens.set("access-1", Some("refresh-1"), Some(Role::Admin));
    let (_, coordinator) =
        build_pipeline(Backend::accepting("never-issued"), &tokens, exchange, navigator);

    assert_eq!(coordinator.refresh().await, Ok(role_less.clone()));

    let session = tokens.get();
    assert_eq!(session.access_token, Some(role_less));
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(session.role, Some(Role::Admin));
    assert!(SessionGate::new(tokens).is_admin());
}

#[tokio::test(start_paused = true)]
async fn test_401_after_concurrent_refresh_reuses_new_token() {
    let backend = Backend::accepting("access-2");
    let lagging = Arc::new(Lagging {
        backend: backend.clone(),
        lag: Duration::from_millis(200),
    });
    let exchange = SlowExchange::granting("access-2", "refresh-2");
    let (navigator, visits) = recording_navigator();
    let tokens = signed_in_store();
    let (pipeline, _) = build_pipeline(lagging, &tokens, exchange.clone(), navigator);

    let (slow, fast) = tokio::join!(
        pipeline.execute::<serde_json::Value>(ApiRequest::get("/slow")),
        pipeline.execute::<serde_json::Value>(ApiRequest::get("/fast")),
    );

    assert_eq!(slow.unwrap()["ok"], true);
    assert_eq!(fast.unwrap()["ok"], true);
    // The slow request's 401 arrived after the fast one had already refreshed
    assert_eq!(exchange.calls(), 1);
    let slow_bearers: Vec<_> = backend
        .sent()
        .into_iter()
        .filter(|(path, _)| path == "/slow")
        .map(|(_, bearer)| bearer)
        .collect();
    assert_eq!(
        slow_bearers,
        vec![Some("access-1".to_string()), Some("access-2".to_string())]
    );
    assert_eq!(tokens.refresh_token().as_deref(), Some("refresh-2"));
    assert!(visits.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_refresh_fails_every_caller_and_logs_out() {
    let backend = Backend::accepting("never-issued");
    let exchange = SlowExchange::rejecting();
    let mut navigator = MockNavigator::new();
    navigator
        .expect_navigate()
        .withf(|path: &str| path == "/login")
        .times(1)
        .return_const(());
    let tokens = signed_in_store();
    let (pipeline, coordinator) =
        build_pipeline(backend.clone(), &tokens, exchange.clone(), Arc::new(navigator));

    let results = join_all(
        ["/a", "/b", "/c"].map(|path| pipeline.call(ApiRequest::get(path))),
    )
    .await;

    for result in results {
        assert!(matches!(
            result,
            Err(ClientError::Refresh(RefreshError::Exchange {
                status: Some(401),
                ..
            }))
        ));
    }
    assert_eq!(exchange.calls(), 1);
    assert!(!coordinator.is_refreshing());
    assert!(tokens.get().is_empty());
    // No request is re-sent after a failed refresh
    assert_eq!(backend.sent().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retried_request_is_not_retried_again() {
    let backend = Backend::accepting("never-issued");
    let exchange = SlowExchange::granting("access-2", "refresh-2");
    let (navigator, visits) = recording_navigator();
    let tokens = signed_in_store();
    let (pipeline, _) = build_pipeline(backend.clone(), &tokens, exchange.clone(), navigator);

    let response = pipeline.call(ApiRequest::get("/profile")).await.unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(exchange.calls(), 1);
    assert_eq!(
        backend.sent(),
        vec![
            ("/profile".to_string(), Some("access-1".to_string())),
            ("/profile".to_string(), Some("access-2".to_string())),
        ]
    );
    assert!(visits.lock().unwrap().is_empty());

    let error = pipeline
        .execute::<serde_json::Value>(ApiRequest::get("/profile"))
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::AuthenticationFailed(ref m) if m == "jwt expired"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_refresh_token_logs_out_without_exchange() {
    let backend = Backend::accepting("never-issued");
    let exchange = SlowExchange::granting("access-2", "refresh-2");
    let (navigator, visits) = recording_navigator();
    let tokens = TokenStore::with_default_keys(Arc::new(MemoryStore::new()));
    tokens.set("access-1", None, Some(Role::User));
    let (pipeline, coordinator) = build_pipeline(backend, &tokens, exchange.clone(), navigator);

    let result = pipeline.call(ApiRequest::get("/profile")).await;

    assert!(matches!(
        result,
        Err(ClientError::Refresh(RefreshError::NoRefreshToken))
    ));
    assert_eq!(exchange.calls(), 0);
    assert!(!coordinator.is_refreshing());
    assert!(tokens.get().is_empty());
    assert_eq!(*visits.lock().unwrap(), vec!["/login".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_non_401_responses_pass_through() {
    struct Forbidding;

    #[async_trait]
    impl Transport for Forbidding {
        async fn send(&self, _: &ApiRequest) -> Result<ApiResponse, ClientError> {
            Ok(ApiResponse::new(StatusCode::FORBIDDEN, "nope"))
        }
    }

    let exchange = SlowExchange::granting("access-2", "refresh-2");
    let (navigator, _) = recording_navigator();
    let tokens = signed_in_store();
    let (pipeline, _) = build_pipeline(Arc::new(Forbidding), &tokens, exchange.clone(), navigator);

    let response = pipeline.call(ApiRequest::get("/admin")).await.unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(exchange.calls(), 0);
    assert_eq!(tokens.access_token().as_deref(), Some("access-1"));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_leader_releases_waiters() {
    let exchange = Arc::new(SlowExchange {
        calls: AtomicUsize::new(0),
        delay: Duration::from_secs(3600),
        outcome: Err(RefreshError::exchange(None, "unreachable")),
    });
    let (navigator, visits) = recording_navigator();
    let tokens = signed_in_store();
    let coordinator = Arc::new(RefreshCoordinator::new(
        tokens.clone(),
        exchange.clone(),
        navigator,
        "/login",
        "hire-hunt-client",
    ));

    let leader = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.refresh().await }
    });
    tokio::task::yield_now().await;

    let waiter = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.refresh().await }
    });
    tokio::task::yield_now().await;
    assert!(coordinator.is_refreshing());

    leader.abort();
    assert!(leader.await.unwrap_err().is_cancelled());

    assert_eq!(waiter.await.unwrap(), Err(RefreshError::Abandoned));
    assert!(!coordinator.is_refreshing());
    // The session itself is untouched
    assert_eq!(tokens.refresh_token().as_deref(), Some("refresh-1"));
    assert!(visits.lock().unwrap().is_empty());
    assert_eq!(exchange.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_coordinator_returns_to_idle_between_refreshes() {
    let exchange = SlowExchange::granting("access-2", "refresh-2");
    let (navigator, _) = recording_navigator();
    let tokens = signed_in_store();
    let coordinator = RefreshCoordinator::new(
        tokens,
        exchange.clone(),
        navigator,
        "/login",
        "hire-hunt-client",
    );

    assert_eq!(coordinator.refresh().await.as_deref(), Ok("access-2"));
    assert_eq!(coordinator.refresh().await.as_deref(), Ok("access-2"));
    assert_eq!(exchange.calls(), 2);
}

#[tokio::test]
async fn test_refresh_endpoint_401_is_not_refreshed_again() {
    let backend = Backend::accepting("never-issued");
    let exchange = Arc::new(HttpTokenExchange::new(
        backend.clone(),
        RefreshEndpoint::default(),
    ));
    let (navigator, visits) = recording_navigator();
    let tokens = signed_in_store();
    let (pipeline, _) = build_pipeline(backend.clone(), &tokens, exchange, navigator);

    let result = pipeline.call(ApiRequest::get("/profile")).await;

    assert!(matches!(
        result,
        Err(ClientError::Refresh(RefreshError::Exchange {
            status: Some(401),
            ..
        }))
    ));
    let paths: Vec<_> = backend.sent().into_iter().map(|(path, _)| path).collect();
    assert_eq!(paths, vec!["/profile", "/api/auth/refresh-token"]);
    assert_eq!(*visits.lock().unwrap(), vec!["/login".to_string()]);
    assert!(tokens.get().is_empty());
}

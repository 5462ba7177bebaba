//! Wiring for one signed-in (or signed-out) client

use crate::client::{AdminApi, AuthApi, UserApi};
use crate::error::ClientError;
use crate::pipeline::RequestPipeline;
use crate::refresh::{HttpTokenExchange, RefreshCoordinator};
use crate::transport::{ReqwestTransport, Transport};
use portal_core::{KeyValueStore, Navigator, PortalConfig, SessionGate, TokenStore};
use std::sync::Arc;
use std::time::Duration;

/// Token store, gate, refresh coordinator, pipeline and API clients sharing
/// one storage backend and one transport
#[derive(Clone)]
pub struct PortalSession {
    tokens: TokenStore,
    gate: SessionGate,
    coordinator: Arc<RefreshCoordinator>,
    pipeline: RequestPipeline,
    auth: AuthApi,
    user: UserApi,
    admin: AdminApi,
}

impl PortalSession {
    /// Build a session talking to `config.api.base_url` over reqwest
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(
        config: &PortalConfig,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        let mut builder = ReqwestTransport::builder()
            .base_url(&config.api.base_url)
            .user_agent(&config.api.user_agent);
        if config.api.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.api.timeout_secs));
        }

        Ok(Self::with_transport(
            config,
            storage,
            navigator,
            Arc::new(builder.build()?),
        ))
    }

    /// Build a session over an existing transport
    pub fn with_transport(
        config: &PortalConfig,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let auth_config = &config.auth;
        let tokens = TokenStore::new(storage, auth_config.keys.clone());

        let exchange = Arc::new(HttpTokenExchange::new(
            transport.clone(),
            auth_config.refresh.clone(),
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            tokens.clone(),
            exchange,
            navigator.clone(),
            &auth_config.login_path,
            &auth_config.client_id,
        ));
        let pipeline = RequestPipeline::new(transport.clone(), tokens.clone(), coordinator.clone());

        Self {
            gate: SessionGate::new(tokens.clone()),
            auth: AuthApi::new(transport, tokens.clone(), &auth_config.client_id),
            user: UserApi::new(pipeline.clone()),
            admin: AdminApi::new(
                pipeline.clone(),
                tokens.clone(),
                navigator,
                &auth_config.login_path,
                &auth_config.dashboard_path,
            ),
            tokens,
            coordinator,
            pipeline,
        }
    }

    pub const fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub const fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub const fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub const fn auth(&self) -> &AuthApi {
        &self.auth
    }

    pub const fn user(&self) -> &UserApi {
        &self.user
    }

    pub const fn admin(&self) -> &AdminApi {
        &self.admin
    }

    /// Force a refresh-token exchange now
    ///
    /// # Errors
    ///
    /// Whatever [`RefreshCoordinator::refresh`] returns
    pub async fn refresh(&self) -> Result<String, ClientError> {
        Ok(self.coordinator.refresh().await?)
    }

    /// Drop the stored session
    pub fn logout(&self) {
        self.auth.logout();
    }
}

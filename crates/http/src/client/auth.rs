//! Authentication API client methods
//!
//! These endpoints are public: they go straight to the transport without a
//! bearer token and never trigger a refresh.

use crate::error::ClientError;
use crate::refresh::TokenGrant;
use crate::transport::{ApiRequest, Transport};
use crate::types::{ForgotPasswordRequest, LoginRequest, RegisterRequest};
use portal_core::TokenStore;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

/// Login, signup and password-reset endpoints
#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    client_id: String,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>, tokens: TokenStore, client_id: impl Into<String>) -> Self {
        Self {
            transport,
            tokens,
            client_id: client_id.into(),
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let response = self.transport.send(&request).await?;
        if !response.status.is_success() {
            warn!(path = %request.path, status = response.status.as_u16(), "Auth request failed");
        }
        response.error_for_status()?.json()
    }

    /// Log in and store the returned session.
    ///
    /// Any previous session is dropped first. The role comes from the
    /// response's `roles` when present, else from the access token's claims.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<JsonValue, ClientError> {
        self.tokens.clear();

        let request = ApiRequest::post("/auth/login").json(credentials)?;
        let body: JsonValue = self.execute(request).await?;

        match TokenGrant::from_json(&body) {
            Some(grant) => {
                let role = grant.resolve_role(&self.client_id);
                self.tokens
                    .set(&grant.access_token, grant.refresh_token.as_deref(), role);
                info!(role = role.map(|r| r.as_str()), "Logged in");
            }
            None => warn!("Login response carried no access token"),
        }

        Ok(body)
    }

    /// Create an account
    pub async fn register(&self, request: &RegisterRequest) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post("/auth/signup").json(request)?;
        self.execute(request).await
    }

    /// Ask for a password-reset email
    pub async fn forgot_password(&self, email: &str) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post("/auth/forgot-password").json(&ForgotPasswordRequest {
            email: email.to_string(),
        })?;
        self.execute(request).await
    }

    /// Complete a password reset
    pub async fn reset_password(&self, reset: &JsonValue) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post("/auth/reset-password").json(reset)?;
        self.execute(request).await
    }

    /// Drop the stored session
    pub fn logout(&self) {
        self.tokens.clear();
        info!("Logged out");
    }
}

//! Authenticated request pipeline
//!
//! Wraps a base [`Transport`]: attaches the stored bearer token, and on the
//! first 401 for a request asks the [`RefreshCoordinator`] for a new token and
//! re-sends once. If the stored token already changed while the request was in
//! flight, the re-send uses it without another exchange. A request never goes
//! out more than twice.

use crate::error::ClientError;
use crate::refresh::RefreshCoordinator;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use bytes::Bytes;
use portal_core::TokenStore;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// HTTP client wrapper that keeps the session alive
#[derive(Clone)]
pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: TokenStore,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            tokens,
            coordinator,
        }
    }

    /// Send `request`, refreshing and retrying once on a first 401.
    ///
    /// Any status other than the handled 401 comes back untouched, including
    /// a 401 on the retried request.
    ///
    /// # Errors
    ///
    /// Transport failures, and [`ClientError::Refresh`] when the session could
    /// not be refreshed.
    pub async fn call(&self, mut request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let sent_token = self.tokens.access_token();
        request.set_bearer(sent_token.as_deref())?;
        let response = self.transport.send(&request).await?;

        if response.status != StatusCode::UNAUTHORIZED || request.retried {
            return Ok(response);
        }

        request.retried = true;

        // A refresh that finished while this request was in flight already
        // replaced the token it was sent with
        let access_token = match self.tokens.access_token() {
            Some(current) if sent_token.as_deref() != Some(current.as_str()) => {
                debug!(method = %request.method, path = %request.path, "Token changed since dispatch, skipping refresh");
                current
            }
            _ => {
                debug!(method = %request.method, path = %request.path, "Unauthorized, refreshing session");
                self.coordinator.refresh().await?
            }
        };
        request.set_bearer(Some(&access_token))?;

        debug!(method = %request.method, path = %request.path, "Retrying with refreshed token");
        self.transport.send(&request).await
    }

    /// [`Self::call`], then map error statuses and decode the JSON body
    ///
    /// # Errors
    ///
    /// Everything [`Self::call`] returns, plus status and decoding errors
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        self.call(request).await?.error_for_status()?.json()
    }

    /// [`Self::call`], then map error statuses and return the raw body
    ///
    /// # Errors
    ///
    /// Everything [`Self::call`] returns, plus status errors
    pub async fn execute_bytes(&self, request: ApiRequest) -> Result<Bytes, ClientError> {
        Ok(self.call(request).await?.error_for_status()?.body)
    }
}

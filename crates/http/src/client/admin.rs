//! Admin back-office endpoints
//!
//! Calls are refused locally when no session is stored or the stored role is
//! not an admin one; the server still authorizes every request. A 403 from
//! the server sends the user back to the dashboard.

use crate::error::ClientError;
use crate::pipeline::RequestPipeline;
use crate::transport::ApiRequest;
use crate::types::Upload;
use portal_core::{Navigator, Role, SessionGate, TokenStore};
use reqwest::StatusCode;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::warn;

const ADMIN_BASE: &str = "/api/admin";

/// Admin API, every call goes through the request pipeline
#[derive(Clone)]
pub struct AdminApi {
    pipeline: RequestPipeline,
    tokens: TokenStore,
    navigator: Arc<dyn Navigator>,
    login_path: String,
    dashboard_path: String,
}

impl AdminApi {
    pub fn new(
        pipeline: RequestPipeline,
        tokens: TokenStore,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<String>,
        dashboard_path: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            tokens,
            navigator,
            login_path: login_path.into(),
            dashboard_path: dashboard_path.into(),
        }
    }

    fn authorize(&self) -> Result<(), ClientError> {
        if self.tokens.access_token().is_none() {
            warn!("No token found for admin request, redirecting to login");
            self.navigator.navigate(&self.login_path);
            return Err(ClientError::NotAuthenticated);
        }

        if !SessionGate::new(self.tokens.clone()).is_admin() {
            warn!("Admin access required, redirecting to dashboard");
            self.navigator.navigate(&self.dashboard_path);
            return Err(ClientError::AdminRequired);
        }

        Ok(())
    }

    async fn send(&self, request: ApiRequest) -> Result<crate::ApiResponse, ClientError> {
        self.authorize()?;

        let response = self.pipeline.call(request).await?;
        if response.status == StatusCode::FORBIDDEN {
            warn!("Insufficient admin permissions, redirecting to dashboard");
            self.navigator.navigate(&self.dashboard_path);
        }
        response.error_for_status()
    }

    async fn execute(&self, request: ApiRequest) -> Result<JsonValue, ClientError> {
        self.send(request).await?.json()
    }

    fn path(suffix: &str) -> String {
        format!("{ADMIN_BASE}{suffix}")
    }

    /// All registered users
    pub async fn users(&self) -> Result<JsonValue, ClientError> {
        self.execute(ApiRequest::get(Self::path("/users"))).await
    }

    /// Update a user record
    pub async fn update_user(&self, user_id: &str, user: &JsonValue) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::patch(Self::path(&format!("/update/user/{user_id}"))).json(user)?;
        self.execute(request).await
    }

    /// Remove a user account
    pub async fn delete_user(&self, user_id: &str) -> Result<JsonValue, ClientError> {
        self.execute(ApiRequest::delete(Self::path(&format!("/users/{user_id}"))))
            .await
    }

    /// Grant `role` to a user
    pub async fn update_user_role(&self, user_id: &str, role: Role) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::put(Self::path(&format!("/users/{user_id}/role")))
            .json(&json!({ "role": role }))?;
        self.execute(request).await
    }

    /// Counts shown on the admin dashboard
    pub async fn dashboard_stats(&self) -> Result<JsonValue, ClientError> {
        self.execute(ApiRequest::get(Self::path("/dashboard/stats")))
            .await
    }

    /// Users with an active subscription
    pub async fn subscription_users(&self) -> Result<JsonValue, ClientError> {
        self.execute(ApiRequest::get(Self::path("/subscription-users")))
            .await
    }

    /// Upload a PDF for distribution, with optional text fields alongside
    pub async fn upload_pdf(
        &self,
        pdf: Upload,
        fields: &[(String, String)],
    ) -> Result<JsonValue, ClientError> {
        let mut parts: Vec<_> = fields
            .iter()
            .map(|(name, value)| crate::transport::MultipartField::Text {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        parts.push(pdf.into_field("file"));

        let request = ApiRequest::post(Self::path("/upload-pdf")).multipart(parts);
        self.execute(request).await
    }

    /// Uploaded PDFs
    pub async fn pdfs(&self) -> Result<JsonValue, ClientError> {
        self.execute(ApiRequest::get(Self::path("/pdfs"))).await
    }

    /// Delete an uploaded PDF
    pub async fn delete_pdf(&self, pdf_id: &str) -> Result<JsonValue, ClientError> {
        self.execute(ApiRequest::delete(Self::path(&format!("/pdfs/{pdf_id}"))))
            .await
    }

    /// Job posts
    pub async fn posts(&self) -> Result<JsonValue, ClientError> {
        self.execute(ApiRequest::get(Self::path("/posts"))).await
    }

    /// Publish a job post
    pub async fn create_post(&self, post: &JsonValue) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post(Self::path("/posts")).json(post)?;
        self.execute(request).await
    }

    /// Edit a job post
    pub async fn update_post(&self, post_id: &str, post: &JsonValue) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::put(Self::path(&format!("/posts/{post_id}"))).json(post)?;
        self.execute(request).await
    }

    /// Remove a job post
    pub async fn delete_post(&self, post_id: &str) -> Result<JsonValue, ClientError> {
        self.execute(ApiRequest::delete(Self::path(&format!("/posts/{post_id}"))))
            .await
    }
}

//! Signed-in user endpoints: profile, referrals, email configs, payments

use crate::error::ClientError;
use crate::pipeline::RequestPipeline;
use crate::transport::ApiRequest;
use crate::types::Upload;
use bytes::Bytes;
use reqwest::header::{CACHE_CONTROL, HeaderValue};
use serde_json::Value as JsonValue;

/// User-facing API, every call goes through the request pipeline
#[derive(Clone)]
pub struct UserApi {
    pipeline: RequestPipeline,
}

impl UserApi {
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self { pipeline }
    }

    /// Get the signed-in user's profile
    pub async fn profile(&self) -> Result<JsonValue, ClientError> {
        self.pipeline
            .execute(ApiRequest::get("/api/users/profile"))
            .await
    }

    /// Update a user's profile
    pub async fn update_profile(
        &self,
        user_id: &str,
        user: &JsonValue,
    ) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::patch(format!("/api/users/profile/update/{user_id}")).json(user)?;
        self.pipeline.execute(request).await
    }

    /// Replace the profile image
    pub async fn upload_profile_image(&self, image: Upload) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::patch("/api/users/profile/upload-image")
            .multipart(vec![image.into_field("image")]);
        self.pipeline.execute(request).await
    }

    /// Download the signed-in user's profile image
    pub async fn profile_image(&self) -> Result<Bytes, ClientError> {
        self.pipeline
            .execute_bytes(ApiRequest::get("/api/users/profile/image"))
            .await
    }

    /// Download another user's profile image, bypassing caches
    pub async fn user_profile_image(&self, user_id: &str) -> Result<Bytes, ClientError> {
        let request = ApiRequest::get(format!("/api/users/{user_id}/profile/image"))
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        self.pipeline.execute_bytes(request).await
    }

    /// Remove the profile image
    pub async fn delete_profile_image(&self) -> Result<JsonValue, ClientError> {
        self.pipeline
            .execute(ApiRequest::delete("/api/users/profile/image"))
            .await
    }

    /// Users who signed up with this user's referral code
    pub async fn referred_users(&self) -> Result<JsonValue, ClientError> {
        self.pipeline
            .execute(ApiRequest::get("/api/users/referral/referred-users"))
            .await
    }

    /// Referral points balance
    pub async fn referral_points(&self) -> Result<JsonValue, ClientError> {
        self.pipeline
            .execute(ApiRequest::get("/api/referral/referral/points"))
            .await
    }

    /// Referral earnings
    pub async fn referral_earnings(&self) -> Result<JsonValue, ClientError> {
        self.pipeline
            .execute(ApiRequest::get("/api/referral/referral/earnings"))
            .await
    }

    /// List mail configurations
    pub async fn email_configs(&self) -> Result<JsonValue, ClientError> {
        self.pipeline
            .execute(ApiRequest::get("/api/email-config/getAllMailConfigs"))
            .await
    }

    /// Create a mail configuration
    pub async fn create_email_config(&self, config: &JsonValue) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post("/api/email-config/createConfig").json(config)?;
        self.pipeline.execute(request).await
    }

    /// Update a mail configuration
    pub async fn update_email_config(
        &self,
        config_id: &str,
        config: &JsonValue,
    ) -> Result<JsonValue, ClientError> {
        let request =
            ApiRequest::put(format!("/api/email-config/updateConfig/{config_id}")).json(config)?;
        self.pipeline.execute(request).await
    }

    /// Delete a mail configuration
    pub async fn delete_email_config(&self, config_id: &str) -> Result<JsonValue, ClientError> {
        self.pipeline
            .execute(ApiRequest::delete(format!(
                "/api/email-config/deleteConfig/{config_id}"
            )))
            .await
    }

    /// Send an email through the user's configured mailbox
    pub async fn share_email(&self, email: &JsonValue) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post("/api/share-email").json(email)?;
        self.pipeline.execute(request).await
    }

    /// Start a subscription payment
    pub async fn subscribe(&self, plan: &JsonValue) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post("/api/payment/subscribe").json(plan)?;
        self.pipeline.execute(request).await
    }

    /// Confirm a payment with the provider's verification data
    pub async fn verify_payment(&self, verification: &JsonValue) -> Result<JsonValue, ClientError> {
        let request = ApiRequest::post("/api/payment/verify").json(verification)?;
        self.pipeline.execute(request).await
    }

    /// Past subscriptions
    pub async fn subscription_history(&self) -> Result<JsonValue, ClientError> {
        self.pipeline
            .execute(ApiRequest::get("/api/payment/subscriptions/history/"))
            .await
    }

    /// Active subscription
    pub async fn current_subscription(&self) -> Result<JsonValue, ClientError> {
        self.pipeline
            .execute(ApiRequest::get("/api/payment/subscription/current/"))
            .await
    }

    /// Dashboard summary
    pub async fn dashboard(&self) -> Result<JsonValue, ClientError> {
        self.pipeline.execute(ApiRequest::get("/dashboard")).await
    }

    /// Job posts
    pub async fn posts(&self) -> Result<JsonValue, ClientError> {
        self.pipeline.execute(ApiRequest::get("/posts")).await
    }

    /// A single job post
    pub async fn post(&self, post_id: &str) -> Result<JsonValue, ClientError> {
        self.pipeline
            .execute(ApiRequest::get(format!("/posts/{post_id}")))
            .await
    }
}

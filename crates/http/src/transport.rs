//! Base transport: turns an [`ApiRequest`] into an [`ApiResponse`]
//!
//! Requests are plain data so the pipeline can dispatch the same request a
//! second time after a token refresh.

use crate::error::ClientError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Method, StatusCode, multipart};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// One field of a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

/// Request body kept in a form that can be sent more than once
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<MultipartField>),
}

/// Outbound API call, relative to the transport's base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub(crate) retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be represented as JSON
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach a multipart body
    pub fn multipart(mut self, fields: Vec<MultipartField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }

    /// Add a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header
    pub fn header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether this request has already been re-sent after a refresh
    pub const fn is_retried(&self) -> bool {
        self.retried
    }

    /// Replace (or drop) the bearer credential
    ///
    /// # Errors
    ///
    /// Returns an error if the token contains characters not allowed in a header
    pub fn set_bearer(&mut self, token: Option<&str>) -> Result<(), ClientError> {
        match token {
            Some(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                    ClientError::Configuration("access token is not a valid header value".into())
                })?;
                self.headers.insert(header::AUTHORIZATION, value);
            }
            None => {
                self.headers.remove(header::AUTHORIZATION);
            }
        }
        Ok(())
    }
}

/// Response as received, whatever its status
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Decode the body as JSON; an empty body reads as `null`
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Convert a non-success response into the matching [`ClientError`]
    ///
    /// # Errors
    ///
    /// Returns the mapped error when the status is not 2xx
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ClientError::from_response(self.status, &self.body))
        }
    }
}

/// Sends requests to the backend
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Create a new transport with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new transport builder
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, request: &ApiRequest) -> Result<reqwest::RequestBuilder, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(fields) => builder.multipart(build_form(fields)?),
        };

        Ok(builder)
    }
}

fn build_form(fields: &[MultipartField]) -> Result<multipart::Form, ClientError> {
    let mut form = multipart::Form::new();
    for field in fields {
        form = match field {
            MultipartField::Text { name, value } => form.text(name.clone(), value.clone()),
            MultipartField::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                let mut part = multipart::Part::bytes(bytes.to_vec()).file_name(file_name.clone());
                if let Some(content_type) = content_type {
                    part = part.mime_str(content_type)?;
                }
                form.part(name.clone(), part)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        debug!(method = %request.method, path = %request.path, "Dispatching request");

        let response = self.build_request(request)?.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!(method = %request.method, path = %request.path, status = status.as_u16(), "Response received");

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Builder for [`ReqwestTransport`]
#[derive(Default)]
pub struct ReqwestTransportBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ReqwestTransportBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the transport
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was given or the client fails to build
    pub fn build(self) -> Result<ReqwestTransport, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut client_builder = ClientBuilder::new();

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        client_builder = client_builder.user_agent(
            self.user_agent
                .unwrap_or_else(|| concat!("portal-client/", env!("CARGO_PKG_VERSION")).into()),
        );

        let client = client_builder.build()?;

        Ok(ReqwestTransport { client, base_url })
    }
}

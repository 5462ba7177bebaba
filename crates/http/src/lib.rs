//! HTTP side of the portal client
//!
//! A [`Transport`] sends plain [`ApiRequest`]s. The [`RequestPipeline`] sits on
//! top of it, attaching the stored bearer token and recovering from an expired
//! access token through the single-flight [`RefreshCoordinator`]. The typed
//! clients in [`client`] are thin wrappers over the pipeline, and
//! [`PortalSession`] wires everything together from a [`portal_core::PortalConfig`].

pub mod client;
pub mod error;
pub mod pipeline;
pub mod refresh;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{AdminApi, AuthApi, UserApi};
pub use error::{ClientError, RefreshError};
pub use pipeline::RequestPipeline;
pub use refresh::{HttpTokenExchange, RefreshCoordinator, TokenExchange, TokenGrant};
pub use session::PortalSession;
pub use transport::{
    ApiRequest, ApiResponse, MultipartField, ReqwestTransport, ReqwestTransportBuilder,
    RequestBody, Transport,
};
pub use types::{ForgotPasswordRequest, LoginRequest, RegisterRequest, Upload};

//! Typed API clients for the portal backend

pub mod admin;
pub mod auth;
pub mod user;

pub use admin::AdminApi;
pub use auth::AuthApi;
pub use user::UserApi;

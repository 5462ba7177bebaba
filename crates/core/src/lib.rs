//! Portal session core: persisted tokens, claims and the session gate

pub mod config;
pub mod error;
pub mod gate;
pub mod jwt;
pub mod navigate;
pub mod state_dir;
pub mod storage;
pub mod token_store;
pub mod types;

pub use config::{ApiConfig, AuthConfig, PortalConfig, RefreshEndpoint, StorageKeys};
pub use error::{CoreError, CoreResult, DecodeError};
pub use gate::SessionGate;
pub use jwt::Claims;
pub use navigate::{LoggingNavigator, Navigator};
pub use state_dir::StateDir;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use token_store::TokenStore;
pub use types::{Role, Session};

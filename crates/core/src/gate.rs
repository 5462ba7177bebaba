//! Read-only view of the session for UI decisions

use crate::jwt::{self, Claims};
use crate::token_store::TokenStore;
use crate::types::Role;
use chrono::Utc;
use tracing::debug;

/// Answers "is someone signed in, and as what" without touching the network.
///
/// An expired access token still counts as authenticated while a refresh token
/// is stored; the request pipeline upgrades it on the next call.
#[derive(Debug, Clone)]
pub struct SessionGate {
    tokens: TokenStore,
}

impl SessionGate {
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }

    /// Whether the stored session can be used for authenticated calls
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now().timestamp())
    }

    /// [`Self::is_authenticated`] evaluated at `now` (epoch seconds)
    pub fn is_authenticated_at(&self, now: i64) -> bool {
        let session = self.tokens.get();
        let Some(access_token) = session.access_token else {
            return false;
        };

        match jwt::decode(&access_token) {
            Ok(claims) if claims.is_expired_at(now) => {
                debug!("Access token expired, checking refresh token");
                session.refresh_token.is_some()
            }
            Ok(_) => true,
            Err(e) => {
                debug!("Stored access token is unreadable: {e}");
                false
            }
        }
    }

    /// Whether the stored role opens the admin back office
    pub fn is_admin(&self) -> bool {
        self.tokens.get().role.is_some_and(Role::is_admin)
    }

    /// Stored role, `USER` when none is stored
    pub fn role(&self) -> Role {
        self.tokens.get().role.unwrap_or_default()
    }

    /// Claims of the current access token, when it decodes
    pub fn claims(&self) -> Option<Claims> {
        self.tokens
            .access_token()
            .and_then(|token| jwt::decode(&token).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use std::sync::Arc;

    const NOW: i64 = 1_750_000_000;

    fn token_expiring_at(exp: i64) -> String {
        let body = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"7","exp":{exp}}}"#));
        format!("eyJhbGciOiJIUzI1NiJ9.{body}.sig")
    }

    fn gate() -> (TokenStore, SessionGate) {
        let tokens = TokenStore::with_default_keys(Arc::new(MemoryStore::new()));
        (tokens.clone(), SessionGate::new(tokens))
    }

    #[test]
    fn test_empty_store_is_not_authenticated() {
        let (_, gate) = gate();
        assert!(!gate.is_authenticated_at(NOW));
        assert!(!gate.is_admin());
        assert_eq!(gate.role(), Role::User);
    }

    #[test]
    fn test_future_expiry_without_refresh_token_is_authenticated() {
        let (tokens, gate) = gate();
        tokens.set(&token_expiring_at(NOW + 600), None, None);
        assert!(gate.is_authenticated_at(NOW));
    }

    #[test]
    fn test_expired_token_depends_on_refresh_token() {
        let (tokens, gate) = gate();
        tokens.set(&token_expiring_at(NOW), None, None);
        assert!(!gate.is_authenticated_at(NOW));

        tokens.set(&token_expiring_at(NOW - 60), Some("refresh"), None);
        assert!(gate.is_authenticated_at(NOW));
    }

    #[test]
    fn test_undecodable_token_is_not_authenticated() {
        let (tokens, gate) = gate();
        tokens.set("garbage", Some("refresh"), Some(Role::Admin));
        assert!(!gate.is_authenticated_at(NOW));
        assert!(gate.claims().is_none());
    }

    #[test]
    fn test_token_without_expiry_is_authenticated() {
        let (tokens, gate) = gate();
        let body = URL_SAFE_NO_PAD.encode(r#"{"sub":"7"}"#);
        tokens.set(&format!("h.{body}.s"), None, None);
        assert!(gate.is_authenticated_at(NOW));
    }

    #[test]
    fn test_admin_roles() {
        let (tokens, gate) = gate();
        tokens.set("t", None, Some(Role::Admin));
        assert!(gate.is_admin());

        tokens.set("t", None, Some(Role::SuperAdmin));
        assert!(gate.is_admin());
        assert_eq!(gate.role(), Role::SuperAdmin);

        tokens.set("t", None, Some(Role::User));
        assert!(!gate.is_admin());
    }
}

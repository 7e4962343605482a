// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Credential state and the auth epoch.
//!
//! The epoch is published on a `watch` channel and advances whenever the
//! effective identity changes (first login, switching user, logout). Caches
//! compare the epoch they were filled under against the current one.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::{RwLock, watch};
use tracing::debug;

/// Opaque counter identifying the current login identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AuthEpoch(pub u64);

/// Claims extracted from a session JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub id: Option<u64>,
    pub username: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    id: Option<u64>,
    username: Option<String>,
    exp: Option<i64>,
}

impl TokenIdentity {
    /// Decode the payload segment of a JWT. Returns `None` for API keys and
    /// anything else that is not a three-part token with a JSON payload.
    pub fn from_jwt(token: &str) -> Option<Self> {
        let mut parts = token.split('.');
        let (_, payload, _) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        let claims: Claims = serde_json::from_slice(&bytes).ok()?;
        Some(Self {
            id: claims.id,
            username: claims.username,
            expires_at: claims
                .exp
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        })
    }
}

#[derive(Debug, Clone)]
struct Credential {
    token: String,
    identity: Option<TokenIdentity>,
}

impl Credential {
    /// What decides whether two credentials belong to the same actor.
    fn identity_key(&self) -> String {
        match &self.identity {
            Some(TokenIdentity { id: Some(id), .. }) => format!("user:{}", id),
            Some(TokenIdentity {
                username: Some(name),
                ..
            }) => format!("username:{}", name),
            _ => format!("token:{}", self.token),
        }
    }
}

/// Holds the active credential and publishes the auth epoch.
#[derive(Debug)]
pub struct Auth {
    credential: RwLock<Option<Credential>>,
    epoch: watch::Sender<AuthEpoch>,
}

impl Default for Auth {
    fn default() -> Self {
        Self::new()
    }
}

impl Auth {
    /// Logged-out state at epoch 0.
    pub fn new() -> Self {
        let (epoch, _) = watch::channel(AuthEpoch::default());
        Self {
            credential: RwLock::new(None),
            epoch,
        }
    }

    /// Start out logged in with `token`, at epoch 1.
    pub fn with_token(token: impl Into<String>) -> Self {
        let token = token.into();
        let (epoch, _) = watch::channel(AuthEpoch(1));
        Self {
            credential: RwLock::new(Some(Credential {
                identity: TokenIdentity::from_jwt(&token),
                token,
            })),
            epoch,
        }
    }

    /// Install a token. The epoch advances unless the token belongs to the
    /// identity that is already logged in (a refresh).
    pub async fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        let next = Credential {
            identity: TokenIdentity::from_jwt(&token),
            token,
        };
        let mut guard = self.credential.write().await;
        let changed = guard
            .as_ref()
            .is_none_or(|current| current.identity_key() != next.identity_key());
        *guard = Some(next);
        drop(guard);

        if changed {
            self.advance();
        } else {
            debug!("Token refreshed for the same identity");
        }
    }

    /// Drop the credential. Advances the epoch if someone was logged in.
    pub async fn logout(&self) {
        let previous = self.credential.write().await.take();
        if previous.is_some() {
            self.advance();
        }
    }

    /// The bearer token, if any.
    pub async fn token(&self) -> Option<String> {
        self.credential.read().await.as_ref().map(|c| c.token.clone())
    }

    /// Claims of the current token, if it is a JWT.
    pub async fn identity(&self) -> Option<TokenIdentity> {
        self.credential
            .read()
            .await
            .as_ref()
            .and_then(|c| c.identity.clone())
    }

    pub async fn is_logged_in(&self) -> bool {
        self.credential.read().await.is_some()
    }

    /// Whether the current JWT has passed its `exp` claim. API keys never expire here.
    pub async fn is_expired(&self) -> bool {
        self.identity()
            .await
            .and_then(|id| id.expires_at)
            .is_some_and(|exp| exp <= Utc::now())
    }

    /// Current epoch.
    pub fn epoch(&self) -> AuthEpoch {
        *self.epoch.borrow()
    }

    /// Receiver that observes every epoch change.
    pub fn subscribe(&self) -> watch::Receiver<AuthEpoch> {
        self.epoch.subscribe()
    }

    fn advance(&self) {
        self.epoch.send_modify(|epoch| epoch.0 += 1);
        debug!(epoch = self.epoch().0, "Auth identity changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_identity_from_jwt() {
        let token = jwt(r#"{"id":7,"username":"alice","exp":4102444800}"#);
        let identity = TokenIdentity::from_jwt(&token).unwrap();
        assert_eq!(identity.id, Some(7));
        assert_eq!(identity.username.as_deref(), Some("alice"));
        assert_eq!(identity.expires_at.unwrap().timestamp(), 4102444800);

        assert!(TokenIdentity::from_jwt("plain-api-key").is_none());
        assert!(TokenIdentity::from_jwt("a.b.c.d").is_none());
    }

    #[tokio::test]
    async fn test_epoch_advances_on_identity_change() {
        let auth = Auth::new();
        assert_eq!(auth.epoch(), AuthEpoch(0));

        auth.set_token(jwt(r#"{"id":1}"#)).await;
        assert_eq!(auth.epoch(), AuthEpoch(1));

        // Refresh for the same user keeps the epoch.
        auth.set_token(jwt(r#"{"id":1,"exp":4102444800}"#)).await;
        assert_eq!(auth.epoch(), AuthEpoch(1));

        auth.set_token(jwt(r#"{"id":2}"#)).await;
        assert_eq!(auth.epoch(), AuthEpoch(2));

        auth.logout().await;
        assert_eq!(auth.epoch(), AuthEpoch(3));
        assert!(!auth.is_logged_in().await);

        // Logging out twice is not a change.
        auth.logout().await;
        assert_eq!(auth.epoch(), AuthEpoch(3));
    }

    #[tokio::test]
    async fn test_api_keys_compare_by_value() {
        let auth = Auth::new();
        let mut rx = auth.subscribe();

        auth.set_token("key-a").await;
        auth.set_token("key-a").await;
        assert_eq!(auth.epoch(), AuthEpoch(1));
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        auth.set_token("key-b").await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(auth.token().await.as_deref(), Some("key-b"));
        assert!(!auth.is_expired().await);
    }

    #[tokio::test]
    async fn test_with_token_starts_logged_in() {
        let auth = Auth::with_token("key-a");
        assert_eq!(auth.epoch(), AuthEpoch(1));
        assert!(auth.is_logged_in().await);

        auth.set_token("key-a").await;
        assert_eq!(auth.epoch(), AuthEpoch(1));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let auth = Auth::new();
        auth.set_token(jwt(r#"{"id":3,"exp":1}"#)).await;
        assert!(auth.is_expired().await);
    }
}

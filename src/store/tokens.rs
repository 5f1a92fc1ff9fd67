//! Bearer and activation tokens, stored by SHA-256 digest only.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// How often expired tokens are purged.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(300);

use super::StoreError;
use crate::models::{Scope, Token, TokenHash};

#[derive(Debug, Clone)]
struct StoredToken {
    user_id: i64,
    expiry: DateTime<Utc>,
    scope: Scope,
}

/// Token table keyed by digest; plaintext never reaches the store.
#[derive(Default)]
pub struct TokenStore {
    tokens: RwLock<HashMap<TokenHash, StoredToken>>,
    lookups: AtomicU64,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and persist a token for `user_id`.
    pub fn issue(&self, user_id: i64, ttl: Duration, scope: Scope) -> Result<Token, StoreError> {
        let token = Token::generate(user_id, ttl, scope);
        self.tokens
            .write()
            .map_err(|_| StoreError::Unavailable("tokens"))?
            .insert(
                token.hash,
                StoredToken {
                    user_id,
                    expiry: token.expiry,
                    scope,
                },
            );
        Ok(token)
    }

    /// Resolve a plaintext token to its user id.
    ///
    /// Unknown, expired and wrong-scope tokens are all `NotFound`.
    pub fn user_for(
        &self,
        scope: Scope,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let hash = Token::hash(plaintext);
        let tokens = self
            .tokens
            .read()
            .map_err(|_| StoreError::Unavailable("tokens"))?;

        match tokens.get(&hash) {
            Some(stored) if stored.scope == scope && stored.expiry > now => Ok(stored.user_id),
            _ => Err(StoreError::NotFound),
        }
    }

    /// Number of lookups performed so far.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Drop every token whose expiry is not after `now`.
    ///
    /// Returns the number of tokens removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| StoreError::Unavailable("tokens"))?;
        let before = tokens.len();
        tokens.retain(|_, t| t.expiry > now);
        Ok(before - tokens.len())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .tokens
            .read()
            .map_err(|_| StoreError::Unavailable("tokens"))?
            .len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn delete_all_for_user(&self, user_id: i64) -> Result<(), StoreError> {
        self.tokens
            .write()
            .map_err(|_| StoreError::Unavailable("tokens"))?
            .retain(|_, t| t.user_id != user_id);
        Ok(())
    }

    pub fn delete_scope_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        self.tokens
            .write()
            .map_err(|_| StoreError::Unavailable("tokens"))?
            .retain(|_, t| !(t.user_id == user_id && t.scope == scope));
        Ok(())
    }
}

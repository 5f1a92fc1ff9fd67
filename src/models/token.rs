use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::validation::TOKEN_LENGTH;

/// Unpadded base32 alphabet; every issued token uses only these bytes.
const TOKEN_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// SHA-256 digest of a token's plaintext.
pub type TokenHash = [u8; 32];

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
}

/// A freshly issued token. Only the plaintext and expiry are shown to clients.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub user_id: i64,
    #[serde(skip)]
    pub scope: Scope,
}

impl Token {
    /// Generate 26 random base32 characters (130 bits of entropy).
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope) -> Self {
        let mut rng = rand::rng();
        let plaintext: String = (0..TOKEN_LENGTH)
            .filter_map(|_| TOKEN_ALPHABET.as_slice().choose(&mut rng).copied())
            .map(char::from)
            .collect();

        let expiry = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));

        Self {
            hash: Self::hash(&plaintext),
            plaintext,
            expiry,
            user_id,
            scope,
        }
    }

    pub fn hash(plaintext: &str) -> TokenHash {
        Sha256::digest(plaintext.as_bytes()).into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::validation::is_token_shaped;

    #[test]
    fn test_generated_tokens_are_well_shaped() {
        for _ in 0..50 {
            let token = Token::generate(1, Duration::from_secs(60), Scope::Authentication);
            assert!(is_token_shaped(&token.plaintext), "{}", token.plaintext);
        }
    }

    #[test]
    fn test_tokens_are_distinct() {
        let a = Token::generate(1, Duration::from_secs(60), Scope::Authentication);
        let b = Token::generate(1, Duration::from_secs(60), Scope::Authentication);
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_expiry_follows_ttl() {
        let token = Token::generate(1, Duration::from_secs(3600), Scope::Activation);
        let remaining = token.expiry - Utc::now();
        assert!(remaining <= chrono::Duration::hours(1));
        assert!(remaining > chrono::Duration::minutes(59));
    }

    #[test]
    fn test_serialized_shape() {
        let token = Token::generate(9, Duration::from_secs(60), Scope::Authentication);
        let json = serde_json::to_value(&token).unwrap();

        assert_eq!(json["token"], token.plaintext.as_str());
        assert!(json.get("expiry").is_some());
        assert!(json.get("user_id").is_none());
        assert!(json.get("hash").is_none());
    }
}

//! Field-level validation that collects every failure before responding.
//!
//! Handlers create a [`Validator`], run all checks for the body or query
//! string, then call [`Validator::finish`]. Errors are keyed by the JSON
//! field name and the first message recorded for a key wins.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AppError, AppResult};

/// Field name → message, serialized as the `error` object of a 422.
pub type FieldErrors = BTreeMap<String, String>;

// =============================================================================
// Validation Constants
// =============================================================================

/// Minimum password length in bytes.
pub const MIN_PASSWORD_BYTES: usize = 8;

/// Maximum password length in bytes (argon2 input is bounded for cost reasons).
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Length of every opaque token handed to clients.
pub const TOKEN_LENGTH: usize = 26;

static EMAIL_RX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .ok()
});

/// Accumulates field errors across many checks.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `key` unless the key already has an error.
    pub fn add_error(&mut self, key: &str, message: impl Into<String>) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.into());
    }

    /// Record an error when `ok` is false.
    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Convert the collected errors into a 422, or `Ok(())` if there are none.
    pub fn finish(self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }

    // =========================================================================
    // Common checks
    // =========================================================================

    /// Non-empty string no longer than `max` bytes.
    pub fn required_text(&mut self, key: &str, value: &str, max: usize) {
        self.check(!value.is_empty(), key, "must be provided");
        self.check(
            value.len() <= max,
            key,
            &format!("must not be more than {max} bytes long"),
        );
    }

    /// Strictly positive identifier.
    pub fn positive_id(&mut self, key: &str, value: i64) {
        self.check(value > 0, key, "must be greater than zero");
    }

    pub fn non_negative(&mut self, key: &str, value: i64) {
        self.check(value >= 0, key, "must be zero or more");
    }

    pub fn email(&mut self, key: &str, value: &str) {
        self.check(!value.is_empty(), key, "must be provided");
        self.check(is_email(value), key, "must be a valid email address");
    }

    pub fn password(&mut self, key: &str, value: &str) {
        self.check(!value.is_empty(), key, "must be provided");
        self.check(
            value.len() >= MIN_PASSWORD_BYTES,
            key,
            &format!("must be at least {MIN_PASSWORD_BYTES} bytes long"),
        );
        self.check(
            value.len() <= MAX_PASSWORD_BYTES,
            key,
            &format!("must not be more than {MAX_PASSWORD_BYTES} bytes long"),
        );
    }

    /// Plaintext token shape, reported under `key`.
    pub fn token_plaintext(&mut self, key: &str, value: &str) {
        self.check(!value.is_empty(), key, "must be provided");
        self.check(
            value.len() == TOKEN_LENGTH,
            key,
            &format!("must be {TOKEN_LENGTH} bytes long"),
        );
    }
}

/// Loose RFC 5322 shape check.
pub fn is_email(value: &str) -> bool {
    EMAIL_RX.as_ref().is_some_and(|rx| rx.is_match(value))
}

/// True when `token` has the exact shape of a token this service issues:
/// 26 characters from the unpadded base32 alphabet (`A-Z`, `2-7`).
///
/// Checked before any store lookup so malformed credentials never reach it.
pub fn is_token_shaped(token: &str) -> bool {
    token.len() == TOKEN_LENGTH
        && token
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_per_key_wins() {
        let mut v = Validator::new();
        v.add_error("page", "must be an integer value");
        v.add_error("page", "must be greater than zero");

        assert_eq!(v.errors()["page"], "must be an integer value");
    }

    #[test]
    fn test_finish_collects_all_keys() {
        let mut v = Validator::new();
        v.positive_id("course_id", 0);
        v.positive_id("rank_id", -3);
        v.positive_id("posting_id", 7);

        match v.finish() {
            Err(AppError::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.contains_key("course_id"));
                assert!(errors.contains_key("rank_id"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_finish_ok_when_empty() {
        assert!(Validator::new().finish().is_ok());
    }

    #[test]
    fn test_required_text() {
        let mut v = Validator::new();
        v.required_text("course", "", 25);
        v.required_text("description", &"x".repeat(101), 100);
        v.required_text("grade", "A", 25);

        assert_eq!(v.errors()["course"], "must be provided");
        assert_eq!(v.errors()["description"], "must not be more than 100 bytes long");
        assert!(!v.errors().contains_key("grade"));
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_email("alice@example.com"));
        assert!(is_email("first.last+tag@sub.example.org"));
        assert!(!is_email("alice"));
        assert!(!is_email("alice@"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("alice@exa mple.com"));
    }

    #[test]
    fn test_password_bounds() {
        let mut v = Validator::new();
        v.password("password", "short");
        assert!(v.errors()["password"].contains("at least 8"));

        let mut v = Validator::new();
        v.password("password", &"p".repeat(73));
        assert!(v.errors()["password"].contains("not be more than 72"));

        let mut v = Validator::new();
        v.password("password", "correct horse battery");
        assert!(v.is_valid());
    }

    #[test]
    fn test_token_shape() {
        assert!(is_token_shaped("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
        assert!(is_token_shaped("Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"));
        // wrong length
        assert!(!is_token_shaped("ABC"));
        assert!(!is_token_shaped("ABCDEFGHIJKLMNOPQRSTUVWXYZA"));
        // outside the base32 alphabet
        assert!(!is_token_shaped("abcdefghijklmnopqrstuvwxyz"));
        assert!(!is_token_shaped("ABCDEFGHIJKLMNOPQRSTUVWXY1"));
        assert!(!is_token_shaped("ABCDEFGHIJKLMNOPQRSTUVWXY="));
        // 26 bytes but multi-byte characters
        assert!(!is_token_shaped("ÄBCDEFGHIJKLMNOPQRSTUVWXY"));
    }
}

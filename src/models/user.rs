use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::{AppError, AppResult};
use crate::store::{Record, SortKey};
use crate::validation::Validator;

/// A registered member of staff.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub regulation_number: String,
    pub username: String,
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub gender: String,
    pub formation: i64,
    pub rank: i64,
    pub postings: i64,
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.fname, self.lname)
    }

    /// Profile checks shared by registration and update.
    pub fn validate(&self, v: &mut Validator) {
        v.required_text("regulation_number", &self.regulation_number, 100);
        v.required_text("username", &self.username, 200);
        v.required_text("fname", &self.fname, 200);
        v.required_text("lname", &self.lname, 200);
        v.email("email", &self.email);
        v.check(!self.gender.is_empty(), "gender", "must be provided");
        v.non_negative("formation", self.formation);
        v.non_negative("rank", self.rank);
        v.non_negative("postings", self.postings);
    }
}

impl Record for User {
    const TABLE: &'static str = "users";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn sort_key(&self, column: &str) -> SortKey<'_> {
        match column {
            "username" => SortKey::Text(&self.username),
            "fname" => SortKey::Text(&self.fname),
            "lname" => SortKey::Text(&self.lname),
            "email" => SortKey::Text(&self.email),
            _ => SortKey::Int(self.id),
        }
    }

    fn version(&self) -> Option<i32> {
        Some(self.version)
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.email.to_lowercase())
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Body of `POST /v1/users`. Missing keys default to empty/zero and are
/// then reported by validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterUserRequest {
    pub regulation_number: String,
    pub username: String,
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub gender: String,
    pub formation: i64,
    pub rank: i64,
    pub postings: i64,
    pub password: String,
}

/// Body of `PATCH /v1/users/update/{id}`; absent keys keep their value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub regulation_number: Option<String>,
    pub username: Option<String>,
    pub fname: Option<String>,
    pub lname: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub formation: Option<i64>,
    pub rank: Option<i64>,
    pub postings: Option<i64>,
}

impl UpdateUserRequest {
    pub fn apply(self, user: &mut User) {
        if let Some(v) = self.regulation_number {
            user.regulation_number = v;
        }
        if let Some(v) = self.username {
            user.username = v;
        }
        if let Some(v) = self.fname {
            user.fname = v;
        }
        if let Some(v) = self.lname {
            user.lname = v;
        }
        if let Some(v) = self.email {
            user.email = v;
        }
        if let Some(v) = self.gender {
            user.gender = v;
        }
        if let Some(v) = self.formation {
            user.formation = v;
        }
        if let Some(v) = self.rank {
            user.rank = v;
        }
        if let Some(v) = self.postings {
            user.postings = v;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdatePasswordRequest {
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivateUserRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateTokenRequest {
    pub email: String,
    pub password: String,
}

// =============================================================================
// Password Hashing
// =============================================================================

/// Hash `plaintext` with Argon2id on the blocking pool.
pub async fn hash_password(plaintext: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || {
        let mut salt_bytes = [0u8; 16];
        rand::rng().fill(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AppError::Internal(format!("password salt encoding failed: {e}")))?;
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
}

/// Check `plaintext` against a stored PHC hash on the blocking pool.
pub async fn verify_password(plaintext: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)
            .map_err(|e| AppError::Internal(format!("stored password hash is invalid: {e}")))?;
        Ok(Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))?
}

/// Hash checked when a login names no known email.
static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

/// Verify `plaintext` against a fixed hash and discard the result.
///
/// Unknown emails then cost the same argon2 work as a wrong password.
pub async fn verify_dummy_password(plaintext: String) -> AppResult<()> {
    let hash = DUMMY_HASH
        .get_or_try_init(|| hash_password("training-records-unknown-user".to_string()))
        .await?;
    verify_password(plaintext, hash.clone()).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> User {
        User {
            id: 1,
            regulation_number: "RN-001".to_string(),
            username: "jdoe".to_string(),
            fname: "Jane".to_string(),
            lname: "Doe".to_string(),
            email: "jane@example.com".to_string(),
            gender: "f".to_string(),
            formation: 2,
            rank: 3,
            postings: 0,
            password_hash: String::new(),
            activated: false,
            version: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_user() {
        let mut v = Validator::new();
        sample().validate(&mut v);
        assert!(v.is_valid(), "{:?}", v.errors());
    }

    #[test]
    fn test_invalid_user_reports_every_field() {
        let user = User {
            regulation_number: String::new(),
            email: "nope".to_string(),
            gender: String::new(),
            rank: -1,
            ..sample()
        };
        let mut v = Validator::new();
        user.validate(&mut v);

        for key in ["regulation_number", "email", "gender", "rank"] {
            assert!(v.errors().contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_email_uniqueness_is_case_insensitive() {
        let user = User {
            email: "Jane@Example.com".to_string(),
            ..sample()
        };
        assert_eq!(user.unique_key().unwrap(), "jane@example.com");
    }

    #[test]
    fn test_serialization_hides_secrets() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("version").is_none());
        assert_eq!(json["username"], "jdoe");
    }

    #[test]
    fn test_update_request_applies_only_present_fields() {
        let mut user = sample();
        let update: UpdateUserRequest =
            serde_json::from_str(r#"{"fname":"Janet","rank":5}"#).unwrap();
        update.apply(&mut user);

        assert_eq!(user.fname, "Janet");
        assert_eq!(user.rank, 5);
        assert_eq!(user.lname, "Doe");
    }

    #[tokio::test]
    async fn test_password_hash_and_verify() {
        let hash = hash_password("pa55word-long".to_string()).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));

        assert!(verify_password("pa55word-long".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong-password".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_dummy_verification_runs_argon2() {
        verify_dummy_password("whatever-password".to_string())
            .await
            .unwrap();

        let hash = DUMMY_HASH.get().unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(
            !verify_password("whatever-password".to_string(), hash.clone())
                .await
                .unwrap()
        );
    }
}

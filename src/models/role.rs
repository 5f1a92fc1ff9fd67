use serde::{Deserialize, Serialize};

use crate::store::{Record, SortKey};
use crate::validation::Validator;

#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub id: i64,
    pub role: String,
}

impl Role {
    pub fn validate(&self, v: &mut Validator) {
        v.required_text("role", &self.role, 50);
    }
}

impl Record for Role {
    const TABLE: &'static str = "roles";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn sort_key(&self, column: &str) -> SortKey<'_> {
        match column {
            "role" => SortKey::Text(&self.role),
            _ => SortKey::Int(self.id),
        }
    }
}

/// Body of role create and update.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoleRequest {
    pub role: String,
}

/// Assignment of one role to one user. A user holds each role at most once.
#[derive(Debug, Clone, Serialize)]
pub struct UserRole {
    pub id: i64,
    pub user_id: i64,
    pub role_id: i64,
}

impl Record for UserRole {
    const TABLE: &'static str = "user_roles";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn sort_key(&self, _column: &str) -> SortKey<'_> {
        SortKey::Int(self.id)
    }

    fn unique_key(&self) -> Option<String> {
        Some(format!("{}:{}", self.user_id, self.role_id))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssignRoleRequest {
    pub user_id: i64,
    pub role_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChangeRoleRequest {
    pub old_role_id: i64,
    pub new_role_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RevokeRoleRequest {
    pub role_id: i64,
}

/// A user together with the names of the roles they hold.
#[derive(Debug, Clone, Serialize)]
pub struct UserWithRoles {
    pub id: i64,
    pub name: String,
    pub roles: Vec<String>,
}

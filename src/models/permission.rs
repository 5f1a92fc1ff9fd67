//! Closed set of capabilities a route can require.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// A capability tag such as `course:write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    UsersRead,
    UsersWrite,
    RoleRead,
    RoleWrite,
    FacilitatorRatingRead,
    FacilitatorRatingWrite,
    CourseRead,
    CourseWrite,
    CoursePostingRead,
    CoursePostingWrite,
    SessionRead,
    SessionWrite,
    UserSessionRead,
    UserSessionWrite,
    AttendanceWrite,
}

impl Permission {
    /// Every permission, in declaration order.
    pub const ALL: &'static [Permission] = &[
        Permission::UsersRead,
        Permission::UsersWrite,
        Permission::RoleRead,
        Permission::RoleWrite,
        Permission::FacilitatorRatingRead,
        Permission::FacilitatorRatingWrite,
        Permission::CourseRead,
        Permission::CourseWrite,
        Permission::CoursePostingRead,
        Permission::CoursePostingWrite,
        Permission::SessionRead,
        Permission::SessionWrite,
        Permission::UserSessionRead,
        Permission::UserSessionWrite,
        Permission::AttendanceWrite,
    ];

    /// Granted to every newly registered user.
    pub const DEFAULT_GRANT: &'static [Permission] = &[Permission::SessionRead];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::UsersRead => "users:read",
            Permission::UsersWrite => "users:write",
            Permission::RoleRead => "role:read",
            Permission::RoleWrite => "role:write",
            Permission::FacilitatorRatingRead => "facilitator_rating:read",
            Permission::FacilitatorRatingWrite => "facilitator_rating:write",
            Permission::CourseRead => "course:read",
            Permission::CourseWrite => "course:write",
            Permission::CoursePostingRead => "course_posting:read",
            Permission::CoursePostingWrite => "course_posting:write",
            Permission::SessionRead => "session:read",
            Permission::SessionWrite => "session:write",
            Permission::UserSessionRead => "user_session:read",
            Permission::UserSessionWrite => "user_session:write",
            Permission::AttendanceWrite => "attendance:write",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Tag that does not name a known permission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission {0:?}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

/// Permissions held by one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(BTreeSet<Permission>);

impl Permissions {
    pub fn includes(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }
}

impl From<BTreeSet<Permission>> for Permissions {
    fn from(set: BTreeSet<Permission>) -> Self {
        Self(set)
    }
}

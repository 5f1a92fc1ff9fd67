//! Per-user permission grants.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use super::StoreError;
use crate::models::{Permission, Permissions};

#[derive(Default)]
pub struct PermissionStore {
    grants: RwLock<HashMap<i64, BTreeSet<Permission>>>,
}

impl PermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permissions held by `user_id`; empty for unknown users.
    pub fn for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| StoreError::Unavailable("permissions"))?;
        Ok(Permissions::from(
            grants.get(&user_id).cloned().unwrap_or_default(),
        ))
    }

    pub fn grant(&self, user_id: i64, permissions: &[Permission]) -> Result<(), StoreError> {
        self.grants
            .write()
            .map_err(|_| StoreError::Unavailable("permissions"))?
            .entry(user_id)
            .or_default()
            .extend(permissions.iter().copied());
        Ok(())
    }

    pub fn revoke_all(&self, user_id: i64) -> Result<(), StoreError> {
        self.grants
            .write()
            .map_err(|_| StoreError::Unavailable("permissions"))?
            .remove(&user_id);
        Ok(())
    }
}

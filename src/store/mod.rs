//! In-process persistence implementing the list-query contract.
//!
//! Each resource lives in a [`Table`] keyed by a monotonically increasing id.
//! [`Table::list`] is the single place where filtering, sorting, tie-breaking
//! and pagination happen:
//!
//! ```text
//! rows ─▶ keep(row) ─▶ sort(column, direction) ─▶ then id ASC ─▶ skip(offset) ─▶ take(limit)
//!                                                      │
//!                                                      └─ total_records ─▶ Metadata
//! ```
//!
//! Tables hold plain data behind a `std::sync::RwLock`; no lock is held
//! across an `.await`.

mod permissions;
mod tokens;

use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use thiserror::Error;

use crate::error::AppError;
use crate::filters::{Filters, Metadata, SortDirection};
use crate::models::{
    Attendance, Course, CoursePosting, FacilitatorRating, Role, Scope, Session, User, UserRole,
    UserSession,
};

pub use permissions::PermissionStore;
pub use tokens::{PURGE_INTERVAL as TOKEN_PURGE_INTERVAL, TokenStore};

/// Failures surfaced by the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("edit conflict")]
    EditConflict,

    /// Another row already holds the record's unique key.
    #[error("duplicate key")]
    Duplicate,

    /// A writer panicked while holding a table lock.
    #[error("store unavailable: {0}")]
    Unavailable(&'static str),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::EditConflict => AppError::EditConflict,
            StoreError::Duplicate => {
                AppError::Conflict("a record with the same unique key already exists".to_string())
            }
            StoreError::Unavailable(table) => {
                AppError::Internal(format!("store table {table} is poisoned"))
            }
        }
    }
}

/// Value a record exposes for one sortable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey<'a> {
    Int(i64),
    Bool(bool),
    Text(&'a str),
}

/// A row stored in a [`Table`].
pub trait Record: Clone + Send + Sync + 'static {
    /// Table name used in logs and error messages.
    const TABLE: &'static str;

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Sort value for `column`, which is always a safe-list entry.
    fn sort_key(&self, column: &str) -> SortKey<'_>;

    /// Optimistic concurrency version, for records that carry one.
    fn version(&self) -> Option<i32> {
        None
    }

    fn set_version(&mut self, _version: i32) {}

    /// Key that must be unique across the table, if any.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

struct Rows<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

/// Id-keyed collection of one record type.
pub struct Table<T> {
    inner: RwLock<Rows<T>>,
}

impl<T: Record> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Table<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Rows {
                next_id: 1,
                rows: BTreeMap::new(),
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Rows<T>>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable(T::TABLE))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Rows<T>>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable(T::TABLE))
    }

    /// Insert `record`, assigning its id (and version 1 when versioned).
    pub fn insert(&self, mut record: T) -> Result<T, StoreError> {
        let mut guard = self.write()?;
        if let Some(key) = record.unique_key()
            && guard.rows.values().any(|r| r.unique_key().as_deref() == Some(key.as_str()))
        {
            return Err(StoreError::Duplicate);
        }

        let id = guard.next_id;
        guard.next_id += 1;
        record.set_id(id);
        if record.version().is_some() {
            record.set_version(1);
        }
        guard.rows.insert(id, record.clone());
        Ok(record)
    }

    pub fn get(&self, id: i64) -> Result<T, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.read()?
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// Replace the stored row with `record`.
    ///
    /// Versioned records must carry the version they were read at; the stored
    /// version is bumped on success and a mismatch is an edit conflict.
    pub fn update(&self, record: &T) -> Result<T, StoreError> {
        let mut guard = self.write()?;
        if let Some(key) = record.unique_key()
            && guard
                .rows
                .values()
                .any(|r| r.id() != record.id() && r.unique_key().as_deref() == Some(key.as_str()))
        {
            return Err(StoreError::Duplicate);
        }

        // A row deleted since it was read is reported as a conflict, like a
        // versioned UPDATE that matches no row.
        let stored = guard
            .rows
            .get_mut(&record.id())
            .ok_or(StoreError::EditConflict)?;

        let mut next = record.clone();
        if let (Some(expected), Some(current)) = (record.version(), stored.version()) {
            if expected != current {
                return Err(StoreError::EditConflict);
            }
            next.set_version(current + 1);
        }

        *stored = next.clone();
        Ok(next)
    }

    pub fn delete(&self, id: i64) -> Result<T, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.write()?.rows.remove(&id).ok_or(StoreError::NotFound)
    }

    /// Remove every row matching `pred`, returning how many were removed.
    pub fn delete_where(&self, pred: impl Fn(&T) -> bool) -> Result<usize, StoreError> {
        let mut guard = self.write()?;
        let before = guard.rows.len();
        guard.rows.retain(|_, row| !pred(row));
        Ok(before - guard.rows.len())
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Result<Option<T>, StoreError> {
        Ok(self.read()?.rows.values().find(|r| pred(r)).cloned())
    }

    /// All rows matching `pred`, in id order.
    pub fn select(&self, pred: impl Fn(&T) -> bool) -> Result<Vec<T>, StoreError> {
        Ok(self
            .read()?
            .rows
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect())
    }

    /// Filter, sort, tie-break on id and paginate.
    pub fn list(
        &self,
        filters: &Filters,
        keep: impl Fn(&T) -> bool,
    ) -> Result<(Vec<T>, Metadata), StoreError> {
        let guard = self.read()?;
        let column = filters.sort_column();
        let direction = filters.sort_direction();

        let mut matched: Vec<&T> = guard.rows.values().filter(|r| keep(r)).collect();
        matched.sort_by(|a, b| {
            let primary = a.sort_key(column).cmp(&b.sort_key(column));
            let primary = match direction {
                SortDirection::Asc => primary,
                SortDirection::Desc => primary.reverse(),
            };
            primary.then_with(|| a.id().cmp(&b.id()))
        });

        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(filters.offset())
            .take(filters.limit())
            .cloned()
            .collect();

        Ok((page, filters.metadata(total)))
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.rows.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Compare two optional values, `None` meaning "no filter".
pub fn matches_exact<V: PartialEq>(filter: Option<V>, value: V) -> bool {
    filter.is_none_or(|wanted| wanted == value)
}

/// Word-based, case-insensitive full-text match.
///
/// Every word of `query` must occur as a word of `haystack`; an absent or
/// empty query matches everything.
pub fn text_matches(haystack: &str, query: Option<&str>) -> bool {
    let Some(query) = query else {
        return true;
    };
    let words: HashSet<String> = tokenize(haystack).collect();
    tokenize(query).all(|word| words.contains(&word))
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Every table the API serves.
#[derive(Default)]
pub struct Database {
    pub users: Table<User>,
    pub tokens: TokenStore,
    pub permissions: PermissionStore,
    pub roles: Table<Role>,
    pub user_roles: Table<UserRole>,
    pub courses: Table<Course>,
    pub course_postings: Table<CoursePosting>,
    pub sessions: Table<Session>,
    pub user_sessions: Table<UserSession>,
    pub attendance: Table<Attendance>,
    pub facilitator_ratings: Table<FacilitatorRating>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a plaintext token of `scope` to its (unexpired) owner.
    pub fn user_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, StoreError> {
        let user_id = self.tokens.user_for(scope, plaintext, Utc::now())?;
        self.users.get(user_id)
    }

    /// Remove a user together with its tokens, grants and role assignments.
    pub fn delete_user(&self, id: i64) -> Result<User, StoreError> {
        let user = self.users.delete(id)?;
        self.tokens.delete_all_for_user(id)?;
        self.permissions.revoke_all(id)?;
        self.user_roles.delete_where(|ur| ur.user_id == id)?;
        Ok(user)
    }
}

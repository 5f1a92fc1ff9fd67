//! Pagination, sorting and query-string filters shared by every list endpoint.
//!
//! # Contract
//!
//! ```text
//! ?page=2&page_size=20&sort=-course
//!      │        │            │
//!      │        │            └─ column from the endpoint's safe-list, `-` = DESC
//!      │        └─ 1..=100, default per endpoint
//!      └─ 1..=10_000_000, default 1
//! ```
//!
//! [`Filters::parse`] records every problem in the caller's [`Validator`]
//! so that bad filters and bad endpoint-specific parameters are reported
//! together. Handlers must call [`Validator::finish`] before using the
//! returned filters; the store never sees an unvalidated sort column because
//! [`Filters::sort_column`] only ever yields entries of the safe-list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::validation::Validator;

/// Largest page number a client may ask for.
pub const MAX_PAGE: i64 = 10_000_000;

/// Largest page size a client may ask for.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Sort used when the client does not send one.
pub const DEFAULT_SORT: &str = "id";

/// Per-endpoint list configuration.
#[derive(Debug, Clone, Copy)]
pub struct ListSpec {
    /// Page size applied when `page_size` is absent.
    pub default_page_size: u32,
    /// Columns a client may sort by, without the `-` prefix.
    pub sort_safe_list: &'static [&'static str],
}

/// Direction of the primary sort column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Validated pagination and sort settings for one list query.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: u32,
    pub page_size: u32,
    /// Raw sort value as sent by the client (possibly `-` prefixed).
    pub sort: String,
    column: &'static str,
    direction: SortDirection,
}

impl Filters {
    /// Parse `page`, `page_size` and `sort` against `spec`.
    ///
    /// Errors are recorded in `v`; fields that failed fall back to their
    /// defaults so the remaining checks still run.
    pub fn parse(query: &QueryParams, spec: &ListSpec, v: &mut Validator) -> Self {
        let page = query.integer("page", 1, v);
        let page_size = query.integer("page_size", i64::from(spec.default_page_size), v);
        let sort = query.text("sort").unwrap_or(DEFAULT_SORT).to_string();

        v.check(page > 0, "page", "must be greater than zero");
        v.check(page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(page_size > 0, "page_size", "must be greater than zero");
        v.check(page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");

        let (requested, direction) = match sort.strip_prefix('-') {
            Some(column) => (column, SortDirection::Desc),
            None => (sort.as_str(), SortDirection::Asc),
        };
        let column = match spec.sort_safe_list.iter().find(|safe| **safe == requested) {
            Some(safe) => *safe,
            None => {
                v.add_error("sort", "invalid sort value");
                DEFAULT_SORT
            }
        };

        Self {
            page: u32::try_from(page).ok().filter(|p| *p > 0).unwrap_or(1),
            page_size: u32::try_from(page_size)
                .ok()
                .filter(|s| *s > 0)
                .unwrap_or(spec.default_page_size),
            sort,
            column,
            direction,
        }
    }

    /// Column name without the direction prefix; always a safe-list entry.
    pub fn sort_column(&self) -> &'static str {
        self.column
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.direction
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.page_size as usize)
    }

    /// Metadata for a result set of `total_records` rows.
    pub fn metadata(&self, total_records: usize) -> Metadata {
        Metadata::calculate(total_records, self.page, self.page_size)
    }
}

/// Pagination block returned under `@metadata`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: u32,
    pub page_size: u32,
    pub first_page: u32,
    pub last_page: u64,
    pub total_records: u64,
}

impl Metadata {
    /// All fields are zero when there are no records.
    pub fn calculate(total_records: usize, page: u32, page_size: u32) -> Self {
        if total_records == 0 || page_size == 0 {
            return Self::default();
        }

        let total = total_records as u64;
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: total.div_ceil(u64::from(page_size)),
            total_records: total,
        }
    }
}

// =============================================================================
// Query String Access
// =============================================================================

/// Raw query-string parameters, extracted with `Query<QueryParams>`.
///
/// Empty values are treated the same as absent ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Integer with a default for absent values; unparseable values record
    /// `must be an integer value` and yield the default.
    pub fn integer(&self, key: &str, default: i64, v: &mut Validator) -> i64 {
        match self.text(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                v.add_error(key, "must be an integer value");
                default
            }),
        }
    }

    /// Optional exact-match integer filter.
    pub fn optional_integer(&self, key: &str, v: &mut Validator) -> Option<i64> {
        let raw = self.text(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                v.add_error(key, "must be a valid integer");
                None
            }
        }
    }

    /// Optional exact-match boolean filter (`true/false`, `t/f`, `1/0`).
    pub fn optional_bool(&self, key: &str, v: &mut Validator) -> Option<bool> {
        let raw = self.text(key)?;
        match raw.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
            _ => {
                v.add_error(key, "must be a valid boolean");
                None
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const COURSES: ListSpec = ListSpec {
        default_page_size: 10,
        sort_safe_list: &["id", "course"],
    };

    fn parse(pairs: &[(&str, &str)]) -> (Filters, Validator) {
        let query: QueryParams = pairs.iter().copied().collect();
        let mut v = Validator::new();
        let filters = Filters::parse(&query, &COURSES, &mut v);
        (filters, v)
    }

    #[test]
    fn test_defaults_when_absent() {
        let (filters, v) = parse(&[]);

        assert!(v.is_valid());
        assert_eq!(filters.page, 1);
        assert_eq!(filters.page_size, 10);
        assert_eq!(filters.sort_column(), "id");
        assert_eq!(filters.sort_direction(), SortDirection::Asc);
        assert_eq!(filters.limit(), 10);
        assert_eq!(filters.offset(), 0);
    }

    #[test]
    fn test_descending_sort() {
        let (filters, v) = parse(&[("sort", "-course"), ("page", "3"), ("page_size", "20")]);

        assert!(v.is_valid());
        assert_eq!(filters.sort_column(), "course");
        assert_eq!(filters.sort_direction(), SortDirection::Desc);
        assert_eq!(filters.offset(), 40);
        assert_eq!(filters.limit(), 20);
    }

    #[test]
    fn test_non_numeric_page_is_error_not_default() {
        let (_, v) = parse(&[("page", "two")]);
        assert_eq!(v.errors()["page"], "must be an integer value");
    }

    #[test]
    fn test_page_bounds() {
        let (_, v) = parse(&[("page", "0"), ("page_size", "101")]);
        assert_eq!(v.errors()["page"], "must be greater than zero");
        assert_eq!(v.errors()["page_size"], "must be a maximum of 100");

        let (_, v) = parse(&[("page", "10000001"), ("page_size", "-1")]);
        assert_eq!(v.errors()["page"], "must be a maximum of 10 million");
        assert_eq!(v.errors()["page_size"], "must be greater than zero");
    }

    #[test]
    fn test_unsafe_sort_rejected_in_any_shape() {
        for sort in ["name", "-name", "--id", "id;drop table", "ID", "-"] {
            let (filters, v) = parse(&[("sort", sort)]);
            assert_eq!(v.errors()["sort"], "invalid sort value", "sort={sort}");
            assert_eq!(filters.sort_column(), DEFAULT_SORT);
        }
    }

    #[test]
    fn test_all_errors_reported_together() {
        let (_, v) = parse(&[("page", "x"), ("page_size", "0"), ("sort", "nope")]);
        assert_eq!(v.errors().len(), 3);
    }

    #[test]
    fn test_metadata_zero_when_empty() {
        assert_eq!(Metadata::calculate(0, 4, 10), Metadata::default());
    }

    #[test]
    fn test_metadata_last_page_rounds_up() {
        for (total, size, last) in [(1, 10, 1), (10, 10, 1), (11, 10, 2), (95, 20, 5), (7, 1, 7)] {
            let metadata = Metadata::calculate(total, 1, size);
            assert_eq!(metadata.last_page, last, "total={total} size={size}");
            assert_eq!(metadata.first_page, 1);
            assert_eq!(metadata.total_records, total as u64);
        }
    }

    #[test]
    fn test_metadata_current_page_past_end() {
        let metadata = Metadata::calculate(5, 9, 2);
        assert_eq!(metadata.current_page, 9);
        assert_eq!(metadata.last_page, 3);
    }

    #[test]
    fn test_optional_filters() {
        let query: QueryParams = [("course_id", "12"), ("mandatory", "t"), ("rank_id", "x"), ("posting_id", "")]
            .into_iter()
            .collect();
        let mut v = Validator::new();

        assert_eq!(query.optional_integer("course_id", &mut v), Some(12));
        assert_eq!(query.optional_bool("mandatory", &mut v), Some(true));
        assert_eq!(query.optional_integer("rank_id", &mut v), None);
        assert_eq!(query.optional_integer("posting_id", &mut v), None);
        assert_eq!(v.errors()["rank_id"], "must be a valid integer");
        assert_eq!(v.errors().len(), 1);
    }
}

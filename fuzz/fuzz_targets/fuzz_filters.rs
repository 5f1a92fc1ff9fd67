//! Fuzz testing for list query parsing.
//!
//! Feeds arbitrary `page`, `page_size`, `sort` and filter values through
//! [`Filters::parse`] and checks the guarantees the store relies on:
//!
//! - Parsing never panics
//! - The sort column is always an entry of the safe-list
//! - A query that validates has page and page size inside their bounds
//! - Metadata never reports a current page without records
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_filters
//! cargo +nightly fuzz run fuzz_filters -- -max_total_time=60
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use training_records::filters::{Filters, ListSpec, MAX_PAGE, MAX_PAGE_SIZE, QueryParams};
use training_records::validation::{Validator, is_token_shaped};

const SPEC: ListSpec = ListSpec {
    default_page_size: 10,
    sort_safe_list: &["id", "course_id", "credithours"],
};

#[derive(Debug, Arbitrary)]
struct Input {
    page: Option<String>,
    page_size: Option<String>,
    sort: Option<String>,
    mandatory: Option<String>,
    rank_id: Option<String>,
    total_records: u16,
    bearer: String,
}

fuzz_target!(|input: Input| {
    let pairs = [
        ("page", input.page),
        ("page_size", input.page_size),
        ("sort", input.sort),
        ("mandatory", input.mandatory),
        ("rank_id", input.rank_id),
    ];
    let query: QueryParams = pairs
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect();

    let mut v = Validator::new();
    let filters = Filters::parse(&query, &SPEC, &mut v);
    let _ = query.optional_bool("mandatory", &mut v);
    let _ = query.optional_integer("rank_id", &mut v);

    assert!(SPEC.sort_safe_list.contains(&filters.sort_column()));
    assert!(filters.page >= 1);
    assert!(filters.page_size >= 1);

    if v.is_valid() {
        assert!(i64::from(filters.page) <= MAX_PAGE);
        assert!(i64::from(filters.page_size) <= MAX_PAGE_SIZE);
    }

    let metadata = filters.metadata(usize::from(input.total_records));
    if input.total_records == 0 {
        assert_eq!(metadata.current_page, 0);
        assert_eq!(metadata.last_page, 0);
    } else {
        assert!(metadata.last_page >= 1);
    }

    // Token shape check is a pure function of the bytes
    if is_token_shaped(&input.bearer) {
        assert_eq!(input.bearer.len(), 26);
    }
});

//! Fuzz testing for JSON request body decoding.
//!
//! Any byte string must decode to a request or produce a 400 message,
//! never a panic. Bodies holding more than one JSON value are always
//! rejected.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_request_body
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use training_records::AppError;
use training_records::handlers::util::decode_body;
use training_records::models::{CreateCoursePostingRequest, RegisterUserRequest};

fuzz_target!(|data: &[u8]| {
    let posting = decode_body::<CreateCoursePostingRequest>(data);
    let _ = decode_body::<RegisterUserRequest>(data);

    if let Err(err) = &posting {
        assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
    }

    // A second top-level value is never accepted
    let mut doubled = data.to_vec();
    doubled.extend_from_slice(b" {}");
    if serde_json::from_slice::<serde_json::Value>(data).is_ok() {
        assert!(decode_body::<serde_json::Value>(&doubled).is_err());
    }
});

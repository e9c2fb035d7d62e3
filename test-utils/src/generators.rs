//! Shared proptest generators.

use cloudfn_firestore::classifier::{CLOSING_TRANSPORT_ERROR, UNAVAILABLE_SERVICE_ERROR};
use cloudfn_firestore::{BackendError, CollectionAllowlist, Fields, StatusCode};
use proptest::prelude::*;
use serde_json::Value;

/// Names in the default allowlist.
pub fn allowed_collection_strategy() -> impl Strategy<Value = String> {
    let names: Vec<String> = CollectionAllowlist::default().iter().map(str::to_string).collect();
    proptest::sample::select(names)
}

/// Names outside the default allowlist.
pub fn unknown_collection_strategy() -> impl Strategy<Value = String> {
    "[a-z_]{1,24}".prop_filter("must not be allowed", |name| {
        !CollectionAllowlist::default().contains(name)
    })
}

/// Non-empty document IDs.
pub fn document_id_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,32}"
}

/// Flat entities with string, integer and boolean fields.
pub fn entity_strategy() -> impl Strategy<Value = Fields> {
    proptest::collection::btree_map(
        "[a-z][a-z_]{0,11}",
        prop_oneof![
            "[ -~]{0,20}".prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ],
        1..8,
    )
    .prop_map(|map| map.into_iter().collect())
}

/// Errors the default classifier retries.
pub fn transient_error_strategy() -> impl Strategy<Value = BackendError> {
    prop_oneof![
        "[a-z ]{0,30}".prop_map(BackendError::unavailable),
        Just(BackendError::other(CLOSING_TRANSPORT_ERROR)),
        Just(BackendError::other(UNAVAILABLE_SERVICE_ERROR)),
        "[a-z ]{0,10}".prop_map(|prefix| {
            BackendError::other(format!("{prefix}The service is temporarily unavailable"))
        }),
    ]
}

/// Errors the default classifier treats as fatal.
pub fn fatal_error_strategy() -> impl Strategy<Value = BackendError> {
    let codes = vec![
        StatusCode::Cancelled,
        StatusCode::DeadlineExceeded,
        StatusCode::NotFound,
        StatusCode::PermissionDenied,
        StatusCode::InvalidArgument,
        StatusCode::Internal,
        StatusCode::Unauthenticated,
    ];
    prop_oneof![
        (proptest::sample::select(codes), "[a-z ]{0,30}")
            .prop_map(|(code, message)| BackendError::status(code, message)),
        "[a-z ]{1,30}".prop_map(BackendError::other),
    ]
}

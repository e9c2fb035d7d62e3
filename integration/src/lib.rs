//! End-to-end tests for the cloudfn-utils crates live in `tests/`.

#![forbid(unsafe_code)]

//! Shared test utilities for the cloudfn-utils crates.
//!
//! This crate provides:
//! - Scripted Firestore connectors, sessions and cursors with call counters
//! - A recording log sink
//! - Proptest generators for collection names, entities and backend errors
//! - Sample entities

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{RecordingSink, ScriptedConnector, ScriptedCursor, ScriptedSession};

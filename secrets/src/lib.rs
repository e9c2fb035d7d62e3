//! Secret Manager client.
//!
//! Reads the latest version of a secret of the function's project. Payloads
//! are returned as [`secrecy::SecretString`] and never appear in debug output.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod provider;

pub use client::SecretManagerClient;
pub use config::SecretManagerConfig;
pub use error::{SecretError, SecretResult};
pub use provider::{SecretProvider, StaticSecretProvider};

//! Firebase ID token verification.
//!
//! Checks the `Authorization: Bearer <token>` header of an incoming request
//! against Google's securetoken signing keys and returns the decoded token.
//! Every failure carries the HTTP status the handler should answer with.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod claims;
pub mod config;
pub mod error;
pub mod jwks;
pub mod verifier;

pub use claims::FirebaseToken;
pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use jwks::{JwkCache, KeyProvider, StaticKeyProvider};
pub use verifier::{FirebaseAuth, parse_bearer};

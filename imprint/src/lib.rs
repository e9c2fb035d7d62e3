//! Imprint Engine access.
//!
//! Access tokens for each fulfilment center live in the
//! `fc_shipping_secret_data` collection next to the name of the Secret
//! Manager secret holding the refresh token. [`ImprintClient::access_token`]
//! returns the stored token while it is valid and renews it otherwise.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod graphql;
pub mod model;

pub use client::{ImprintClient, PreparedOrderConfig};
pub use config::ImprintConfig;
pub use error::{ImprintError, ImprintResult};
pub use graphql::GraphQlClient;
pub use model::{ShippingSecretData, WarehouseAppId};

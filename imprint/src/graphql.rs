//! Bearer-authenticated GraphQL client.

use crate::error::{GraphQlErrorMessage, ImprintError, ImprintResult};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument};

#[derive(Serialize)]
struct GraphQlRequest<'a, V: Serialize> {
    query: &'a str,
    variables: &'a V,
}

#[derive(serde::Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

/// GraphQL client for one endpoint and access token.
#[derive(Clone)]
pub struct GraphQlClient {
    http: Client,
    url: String,
    token: SecretString,
}

impl fmt::Debug for GraphQlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQlClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl GraphQlClient {
    /// Create a client.
    #[must_use]
    pub const fn new(http: Client, url: String, token: SecretString) -> Self {
        Self { http, url, token }
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run `query` with `variables` and decode its `data` member.
    ///
    /// # Errors
    ///
    /// Returns [`ImprintError::GraphQlStatus`] for a non-success status,
    /// [`ImprintError::GraphQl`] when the response lists errors, and a decode
    /// error when `data` does not match `T`.
    #[instrument(skip(self, query, variables), fields(url = %self.url))]
    pub async fn query<V, T>(&self, query: &str, variables: &V) -> ImprintResult<T>
    where
        V: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(self.token.expose_secret())
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImprintError::GraphQlStatus { status, body });
        }

        let body: GraphQlResponse = response.json().await?;
        if !body.errors.is_empty() {
            return Err(ImprintError::GraphQl(body.errors));
        }
        debug!("GraphQL query succeeded");
        Ok(serde_json::from_value(body.data.unwrap_or(Value::Null))?)
    }
}

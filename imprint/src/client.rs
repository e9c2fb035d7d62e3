//! Access token renewal and request setup.

use crate::config::{APP_ID_ENV_VAR, AUTH_URL_ENV_VAR, GRAPHQL_URL_ENV_VAR, ImprintConfig};
use crate::error::{ImprintError, ImprintResult};
use crate::graphql::GraphQlClient;
use crate::model::ShippingSecretData;
use chrono::{TimeDelta, Utc};
use cloudfn_common::{HttpConfig, build_http_client};
use cloudfn_firestore::{Connector, FirestoreStore, SHIPPING_SECRET_COLLECTION};
use cloudfn_secrets::SecretProvider;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    #[serde(default)]
    access_token: String,
}

/// Everything needed to place an order with Imprint Engine.
#[derive(Debug, Clone)]
pub struct PreparedOrderConfig {
    /// Authenticated GraphQL client
    pub client: GraphQlClient,
    /// Platform application ID
    pub app_id: i64,
    /// Organization ID in Imprint Engine format
    pub external_id: i64,
}

/// Imprint Engine client backed by stored credentials.
pub struct ImprintClient<C: Connector> {
    store: Arc<FirestoreStore<C>>,
    secrets: Arc<dyn SecretProvider>,
    http: Client,
    config: ImprintConfig,
}

impl<C: Connector> std::fmt::Debug for ImprintClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImprintClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ImprintClient<C> {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        store: Arc<FirestoreStore<C>>,
        secrets: Arc<dyn SecretProvider>,
        config: ImprintConfig,
    ) -> ImprintResult<Self> {
        let http = build_http_client(&HttpConfig::default().with_timeout(config.timeout))?;
        Ok(Self {
            store,
            secrets,
            http,
            config,
        })
    }

    /// Read the stored credentials `credentials_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ImprintError::ModelLoad`] when the document cannot be read and
    /// [`ImprintError::ModelDecode`] when it has an unexpected shape.
    pub async fn load_model(
        &self,
        session: &mut C::Session,
        credentials_id: &str,
    ) -> ImprintResult<ShippingSecretData> {
        let document = self
            .store
            .get_entity(session, SHIPPING_SECRET_COLLECTION, credentials_id)
            .await
            .map_err(|source| ImprintError::ModelLoad {
                id: credentials_id.to_string(),
                source,
            })?;
        let mut model: ShippingSecretData = document.data()?;
        if model.id.is_empty() {
            model.id = document.id;
        }
        Ok(model)
    }

    /// Current access token for `credentials_id`, renewed and stored when the
    /// stored one has expired.
    ///
    /// # Errors
    ///
    /// Fails when the credentials cannot be read, the renewal fails, or the
    /// renewed token cannot be stored.
    #[instrument(skip(self, session))]
    pub async fn access_token(
        &self,
        session: &mut C::Session,
        credentials_id: &str,
    ) -> ImprintResult<SecretString> {
        let mut model = self.load_model(session, credentials_id).await?;
        if !model.is_expired_at(Utc::now()) {
            return Ok(SecretString::from(model.access_token));
        }

        info!("Imprint Engine access token expired, renewing");
        let token = self.renew_access_token(&model.secret_name).await?;

        let lifetime = TimeDelta::from_std(self.config.token_lifetime)
            .map_err(|e| ImprintError::Config(format!("invalid token lifetime: {e}")))?;
        model.access_token = token.expose_secret().to_string();
        model.token_expiration_date = Some(Utc::now() + lifetime);

        self.store
            .edit_entity(session, SHIPPING_SECRET_COLLECTION, &model.id, &model)
            .await
            .map_err(ImprintError::ModelSave)?;
        Ok(token)
    }

    /// Exchange the refresh token stored in `secret_name` for a new access token.
    ///
    /// # Errors
    ///
    /// Fails when the auth URL is unset, the refresh token cannot be read, or
    /// the endpoint does not answer 200 with an `accessToken`.
    #[instrument(skip(self))]
    pub async fn renew_access_token(&self, secret_name: &str) -> ImprintResult<SecretString> {
        let url = required(self.config.auth_url.as_deref(), AUTH_URL_ENV_VAR)?;
        let refresh_token = self.secrets.get_secret(secret_name).await?;

        let response = self
            .http
            .post(url)
            .bearer_auth(refresh_token.expose_secret())
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(ImprintError::AuthStatus(response.status()));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| ImprintError::AuthResponse(e.to_string()))?;
        if body.access_token.is_empty() {
            return Err(ImprintError::AuthResponse("no accessToken in response".to_string()));
        }
        Ok(SecretString::from(body.access_token))
    }

    /// GraphQL client authenticated with the access token of `credentials_id`.
    ///
    /// # Errors
    ///
    /// Fails when no token can be obtained or the GraphQL URL is unset.
    pub async fn graphql_client(
        &self,
        session: &mut C::Session,
        credentials_id: &str,
    ) -> ImprintResult<GraphQlClient> {
        let token = self.access_token(session, credentials_id).await?;
        let url = required(self.config.graphql_url.as_deref(), GRAPHQL_URL_ENV_VAR)?;
        Ok(GraphQlClient::new(self.http.clone(), url.to_string(), token))
    }

    /// Client and identifiers for an order of organization `org_id`.
    ///
    /// # Errors
    ///
    /// Fails when no client can be built, the application ID is not an
    /// integer, or `org_id` is not an integer.
    pub async fn request_config(
        &self,
        session: &mut C::Session,
        org_id: &str,
        credentials_id: &str,
    ) -> ImprintResult<PreparedOrderConfig> {
        let client = self.graphql_client(session, credentials_id).await?;
        let app_id = self
            .config
            .app_id
            .as_deref()
            .unwrap_or_default()
            .parse::<i64>()
            .map_err(|e| ImprintError::Config(format!("failed to parse {APP_ID_ENV_VAR}: {e}")))?;
        let external_id = org_id
            .parse::<i64>()
            .map_err(|e| ImprintError::InvalidExternalId(e.to_string()))?;
        Ok(PreparedOrderConfig {
            client,
            app_id,
            external_id,
        })
    }
}

fn required<'a>(value: Option<&'a str>, var: &str) -> ImprintResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ImprintError::Config(format!("{var} is empty")))
}

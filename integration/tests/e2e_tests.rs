//! End-to-end tests wiring the crates together against fake Google and
//! Imprint Engine endpoints.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cloudfn_auth::{AuthConfig, FirebaseAuth, StaticKeyProvider};
use cloudfn_common::{
    CloudLogger, JsonError, LogData, LoggerOptions, RetryBudget, Severity, StaticTokenSource,
};
use cloudfn_firestore::{
    FirestoreConfig, FirestoreError, FirestoreStore, RestConnector, SHIPPING_SECRET_COLLECTION,
};
use cloudfn_imprint::{ImprintClient, ImprintConfig, WarehouseAppId};
use cloudfn_secrets::{SecretManagerClient, SecretManagerConfig};
use cloudfn_test_utils::RecordingSink;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing_test::traced_test;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT: &str = "/v1/projects/demo/databases/(default)/documents";

fn rest_store(server: &MockServer, budget: u32) -> anyhow::Result<FirestoreStore<RestConnector>> {
    let config = FirestoreConfig::default()
        .with_endpoint(server.uri())
        .with_project_id("demo");
    let connector =
        RestConnector::with_token_source(config, Arc::new(StaticTokenSource::new("fs-token")))?;
    Ok(FirestoreStore::new(connector).with_budget(RetryBudget::Fixed(budget)))
}

fn rest_document(collection: &str, id: &str, fields: &Value) -> Value {
    json!({
        "name": format!("projects/demo/databases/(default)/documents/{collection}/{id}"),
        "fields": fields,
        "createTime": "2024-01-01T00:00:00Z",
        "updateTime": "2024-01-02T00:00:00Z",
    })
}

fn unavailable() -> ResponseTemplate {
    ResponseTemplate::new(503).set_body_json(json!({
        "error": {
            "code": 503,
            "message": "The service is temporarily unavailable",
            "status": "UNAVAILABLE"
        }
    }))
}

#[tokio::test]
#[traced_test]
async fn test_firestore_get_recovers_after_unavailable() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}/users/u-1")))
        .respond_with(unavailable())
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{ROOT}/users/u-1")))
        .and(header("authorization", "Bearer fs-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rest_document(
            "users",
            "u-1",
            &json!({ "name": { "stringValue": "Ada" } }),
        )))
        .mount(&server)
        .await;

    let store = rest_store(&server, 3)?;
    let mut session = store.connect().await?;

    let document = store.get_entity(&mut session, "users", "u-1").await?;

    assert_eq!(document.id, "u-1");
    assert_eq!(document.get("name"), Some(&json!("Ada")));
    assert_eq!(store.metrics().attempts.get(), 2);
    assert_eq!(store.metrics().refreshes.get(), 1);
    assert!(logs_contain("Firestore call failed, will retry"));
    Ok(())
}

#[tokio::test]
async fn test_firestore_exhausts_budget_over_rest() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{ROOT}/promo_items/p-1")))
        .respond_with(unavailable())
        .expect(2)
        .mount(&server)
        .await;

    let store = rest_store(&server, 2)?;
    let mut session = store.connect().await?;

    let err = store
        .delete_entity(&mut session, "promo_items", "p-1")
        .await
        .unwrap_err();

    assert!(matches!(err, FirestoreError::RetriesExhausted { attempts: 2, .. }));
    assert!(err.to_string().starts_with(
        "exceed retries number (2) for delete in the 'promo_items' collection"
    ));
    Ok(())
}

#[tokio::test]
async fn test_firestore_rejects_unknown_collection_without_traffic() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let store = rest_store(&server, 3)?;
    let mut session = store.connect().await?;

    let err = store
        .get_entity(&mut session, "orders", "o-1")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "collection name 'orders' does not exist");
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_imprint_order_setup_renews_expired_token() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let doc_path = format!("{ROOT}/{SHIPPING_SECRET_COLLECTION}/fc-1");
    let stored = json!({
        "id": { "stringValue": "fc-1" },
        "key_name": { "stringValue": "fc-1-key" },
        "secret_name": { "stringValue": "fc-1-refresh" },
        "access_token": { "stringValue": "old-token" },
        "token_expiration_date": { "timestampValue": "2020-01-01T00:00:00Z" }
    });

    Mock::given(method("GET"))
        .and(path(doc_path.clone()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(rest_document(
                SHIPPING_SECRET_COLLECTION,
                "fc-1",
                &stored,
            )),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(doc_path))
        .and(body_partial_json(json!({
            "fields": { "access_token": { "stringValue": "fresh-token" } }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(rest_document(
                SHIPPING_SECRET_COLLECTION,
                "fc-1",
                &stored,
            )),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/projects/demo/secrets/fc-1-refresh/versions/latest:access"))
        .and(header("authorization", "Bearer sm-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/demo/secrets/fc-1-refresh/versions/4",
            "payload": { "data": STANDARD.encode("refresh-1") }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ie/auth"))
        .and(header("authorization", "Bearer refresh-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "fresh-token" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ie/graphql"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "warehouse": { "app_id": 9 } } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(rest_store(&server, 2)?);
    let secrets = SecretManagerClient::with_token_source(
        SecretManagerConfig::default()
            .with_project_id("demo")
            .with_endpoint(server.uri()),
        Arc::new(StaticTokenSource::new("sm-token")),
    )?;
    let imprint = ImprintClient::new(
        store.clone(),
        Arc::new(secrets),
        ImprintConfig::default()
            .with_auth_url(format!("{}/ie/auth", server.uri()))
            .with_graphql_url(format!("{}/ie/graphql", server.uri()))
            .with_app_id("31"),
    )?;
    let mut session = store.connect().await?;

    let prepared = imprint.request_config(&mut session, "5001", "fc-1").await?;
    assert_eq!(prepared.app_id, 31);
    assert_eq!(prepared.external_id, 5001);

    let data: Value = prepared
        .client
        .query("query { warehouse { app_id } }", &json!({}))
        .await?;
    let warehouse: WarehouseAppId = serde_json::from_value(data["warehouse"].clone())?;
    assert_eq!(warehouse.app_id, 9);
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_request_is_logged_and_answered() -> anyhow::Result<()> {
    let sink = Arc::new(RecordingSink::new());
    let logger = CloudLogger::with_sink(
        LoggerOptions::default()
            .with_project_id("demo")
            .with_invoker("orders-function")
            .with_batch_size(1),
        sink.clone(),
    );
    let auth = FirebaseAuth::with_key_provider(
        AuthConfig::default().with_project_id("demo"),
        Arc::new(StaticKeyProvider::new()),
    )?;

    let mut headers = HeaderMap::new();
    headers.insert("Function-Execution-Id", HeaderValue::from_static("exec-42"));
    headers.insert("X-Cloud-Trace-Context", HeaderValue::from_static("abc123/1;o=1"));

    let err = auth
        .check_authorization(Some("Token abc"))
        .await
        .unwrap_err();
    let response = JsonError::new(err.to_string(), err.status());
    logger
        .for_request(Some(&headers))
        .warning("unauthorized request", vec![LogData::error(&err)])
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.body(), r#"{"message":"malformed auth header"}"#);

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.severity, Severity::Warning);
    assert_eq!(entry.payload.invoker, "orders-function");
    assert_eq!(entry.payload.execution_id, "exec-42");
    assert_eq!(entry.labels.get("execution_id").map(String::as_str), Some("exec-42"));
    assert_eq!(entry.trace.as_deref(), Some("projects/demo/traces/abc123"));
    assert_eq!(
        entry.payload.data_object,
        Some(vec![json!("malformed auth header")])
    );
    Ok(())
}

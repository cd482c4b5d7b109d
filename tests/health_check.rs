//! Integration tests for the public health and webhook endpoints

use std::net::TcpListener;

use portal_auth::configuration::{
    ApplicationSettings, DatabaseSettings, JwtSettings, PasswordSettings, RefreshSettings,
    Settings, WebhookSettings,
};
use portal_auth::startup::{run, AppState};
use portal_auth::webhook::WebhookSignatureVerifier;
use serde_json::json;

const SERVER_KEY: &str = "test-server-key";

fn spawn_app() -> String {
    let settings = Settings {
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "password".to_string(),
            port: 5432,
            host: "localhost".to_string(),
            database_name: "unused".to_string(),
            max_connections: 1,
        },
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            use_memory_store: true,
        },
        jwt: JwtSettings {
            secret: "integration-test-secret-at-least-32-chars".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            issuer: "portal_auth_test".to_string(),
        },
        password: PasswordSettings {
            argon2_memory_kib: 1024,
            argon2_iterations: 2,
            argon2_parallelism: 1,
            bcrypt_cost: 4,
        },
        refresh: RefreshSettings::default(),
        webhook: WebhookSettings {
            server_key: SERVER_KEY.to_string(),
        },
    };

    let listener = TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let state = AppState::in_memory(&settings).expect("Failed to build state");
    let server = run(listener, state)
        .expect("Failed to create server");

    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    format!("http://127.0.0.1:{}", port)
}

fn notification(gross_amount: &str, signature: &str) -> serde_json::Value {
    json!({
        "order_id": "INV-2024-0001",
        "status_code": "200",
        "gross_amount": gross_amount,
        "signature_key": signature,
        "transaction_status": "settlement"
    })
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn payment_webhook_accepts_valid_signature() {
    let addr = spawn_app();
    let signature =
        WebhookSignatureVerifier::sign("INV-2024-0001", "200", "150000.00", SERVER_KEY);

    let response = reqwest::Client::new()
        .post(&format!("{}/webhooks/payment", addr))
        .json(&notification("150000.00", &signature))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn payment_webhook_rejects_tampered_amount() {
    let addr = spawn_app();
    let signature =
        WebhookSignatureVerifier::sign("INV-2024-0001", "200", "150000.00", SERVER_KEY);

    let response = reqwest::Client::new()
        .post(&format!("{}/webhooks/payment", addr))
        .json(&notification("950000.00", &signature))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(401, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn payment_webhook_returns_400_when_data_is_missing() {
    let addr = spawn_app();

    let test_cases = vec![
        (json!({"status_code": "200", "gross_amount": "1.00", "signature_key": "x"}), "missing order_id"),
        (json!({"order_id": "1", "gross_amount": "1.00", "signature_key": "x"}), "missing status_code"),
        (json!({"order_id": "1", "status_code": "200", "gross_amount": "1.00"}), "missing signature_key"),
        (json!({}), "empty payload"),
    ];

    for (invalid_body, error_message) in test_cases {
        let response = reqwest::Client::new()
            .post(&format!("{}/webhooks/payment", addr))
            .json(&invalid_body)
            .send()
            .await
            .expect("Failed to execute request");

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when the payload was {}.",
            error_message
        );
    }
}

use std::net::TcpListener;

use portal_auth::configuration::{
    ApplicationSettings, DatabaseSettings, JwtSettings, PasswordSettings, RefreshSettings,
    Settings, WebhookSettings,
};
use portal_auth::startup::{run, AppState};
use serde_json::{json, Value};

pub struct TestApp {
    pub address: String,
}

fn test_settings() -> Settings {
    Settings {
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
        refresh: RefreshSettings {
            max_secret_mismatches: 1,
        },
        webhook: WebhookSettings {
            server_key: "test-server-key".to_string(),
        },
    }
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let state = AppState::in_memory(&test_settings()).expect("Failed to build state");
    let server = run(listener, state).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp { address }
}

impl TestApp {
    async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(&format!("{}{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn register(&self, email: &str, password: &str) -> Value {
        let response = self
            .post(
                "/auth/register",
                &json!({ "name": "John Doe", "email": email, "password": password }),
            )
            .await;
        assert_eq!(201, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }
}

// --- Registration Tests ---

#[tokio::test]
async fn register_returns_201_for_valid_credentials() {
    let app = spawn_app().await;

    let body = app.register("john@example.com", "SecurePass123").await;

    assert!(body.get("access_token").is_some());
    assert!(body.get("refresh_token").is_some());
    assert!(body.get("expires_at").is_some());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["email"], "john@example.com");
    assert_eq!(body["user"]["name"], "John Doe");
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn register_accepts_names_and_emails_containing_sql_words() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/auth/register",
            &json!({ "name": "Sandra Castillo", "email": "broadcast@x.com", "password": "SecurePass123" }),
        )
        .await;

    assert_eq!(201, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["user"]["name"], "Sandra Castillo");
    assert_eq!(body["user"]["email"], "broadcast@x.com");
}

#[tokio::test]
async fn register_returns_400_for_invalid_email() {
    let app = spawn_app().await;

    for invalid_email in ["notanemail", "user@", "@example.com", "user@@example.com"] {
        let response = app
            .post(
                "/auth/register",
                &json!({ "name": "Test User", "email": invalid_email, "password": "SecurePass123" }),
            )
            .await;

        assert_eq!(400, response.status().as_u16(),
            "Should reject invalid email: {}", invalid_email);
    }
}

#[tokio::test]
async fn register_returns_400_for_weak_password() {
    let app = spawn_app().await;

    let long_password = "a".repeat(129);
    let weak_passwords = vec![
        ("short", "password too short"),
        ("nouppercase123", "no uppercase"),
        ("NOLOWERCASE123", "no lowercase"),
        ("NoDigits", "no digits"),
        (long_password.as_str(), "password too long"),
    ];

    for (weak_password, reason) in weak_passwords {
        let response = app
            .post(
                "/auth/register",
                &json!({ "name": "Test User", "email": "test@example.com", "password": weak_password }),
            )
            .await;

        assert_eq!(400, response.status().as_u16(),
            "Should reject weak password: {}", reason);
    }
}

#[tokio::test]
async fn register_returns_409_for_duplicate_email() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;

    let response = app
        .post(
            "/auth/register",
            &json!({ "name": "John Doe", "email": "john@example.com", "password": "SecurePass123" }),
        )
        .await;

    assert_eq!(409, response.status().as_u16(),
        "Should reject duplicate email with 409 Conflict");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "USER_EXISTS");
}

#[tokio::test]
async fn register_returns_400_for_missing_fields() {
    let app = spawn_app().await;

    let test_cases = vec![
        (json!({"email": "test@example.com", "password": "Pass123"}), "missing name"),
        (json!({"name": "Test", "password": "Pass123"}), "missing email"),
        (json!({"name": "Test", "email": "test@example.com"}), "missing password"),
        (json!({}), "missing all fields"),
    ];

    for (body, reason) in test_cases {
        let response = app.post("/auth/register", &body).await;
        assert_eq!(400, response.status().as_u16(),
            "Should reject request: {}", reason);
    }
}

// --- Login Tests ---

#[tokio::test]
async fn login_returns_200_for_valid_credentials() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;

    let response = app
        .post("/auth/login", &json!({ "email": "john@example.com", "password": "SecurePass123" }))
        .await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.get("access_token").is_some());
    assert!(body.get("refresh_token").is_some());
    assert_eq!(body["user"]["email"], "john@example.com");
}

#[tokio::test]
async fn login_failures_are_uniform_401() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;

    let wrong_password = app
        .post("/auth/login", &json!({ "email": "john@example.com", "password": "WrongPassword123" }))
        .await;
    let unknown_user = app
        .post("/auth/login", &json!({ "email": "nonexistent@example.com", "password": "SecurePass123" }))
        .await;

    assert_eq!(401, wrong_password.status().as_u16());
    assert_eq!(401, unknown_user.status().as_u16());

    let a: Value = wrong_password.json().await.unwrap();
    let b: Value = unknown_user.json().await.unwrap();
    assert_eq!(a["code"], "INVALID_CREDENTIALS");
    assert_eq!(a["code"], b["code"]);
    assert_eq!(a["message"], b["message"]);
}

#[tokio::test]
async fn login_returns_400_for_missing_fields() {
    let app = spawn_app().await;

    let test_cases = vec![
        (json!({"email": "test@example.com"}), "missing password"),
        (json!({"password": "Pass123"}), "missing email"),
        (json!({}), "missing all fields"),
    ];

    for (body, reason) in test_cases {
        let response = app.post("/auth/login", &body).await;
        assert_eq!(400, response.status().as_u16(),
            "Should reject request: {}", reason);
    }
}

// --- Protected Routes Tests ---

#[tokio::test]
async fn protected_route_returns_401_without_token() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .get(&format!("{}/auth/me", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn protected_route_returns_401_with_invalid_token() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .get(&format!("{}/auth/me", &app.address))
        .header("Authorization", "Bearer invalid.token.here")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn protected_route_rejects_malformed_authorization_header() {
    let app = spawn_app().await;

    for header in ["Bearer", "Basic dXNlcjpwYXNz", "BearerToken"] {
        let response = reqwest::Client::new()
            .get(&format!("{}/api/me", &app.address))
            .header("Authorization", header)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(401, response.status().as_u16(),
            "Should reject malformed header: {}", header);
    }
}

#[tokio::test]
async fn get_current_user_returns_200_with_valid_token() {
    let app = spawn_app().await;
    let registered = app.register("john@example.com", "SecurePass123").await;
    let access_token = registered["access_token"].as_str().expect("No access token in response");

    for path in ["/auth/me", "/api/me"] {
        let response = reqwest::Client::new()
            .get(&format!("{}{}", &app.address, path))
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(200, response.status().as_u16());
        let body: Value = response.json().await.expect("Failed to parse response");
        assert_eq!(body["email"], "john@example.com");
        assert_eq!(body["name"], "John Doe");
    }
}

// --- Token Refresh Tests ---

#[tokio::test]
async fn register_login_refresh_then_replay_is_revoked() {
    let app = spawn_app().await;
    app.register("a@x.com", "Passw0rd!").await;

    let login = app
        .post("/auth/login", &json!({ "email": "a@x.com", "password": "Passw0rd!" }))
        .await;
    assert_eq!(200, login.status().as_u16());
    let login: Value = login.json().await.unwrap();
    let original = login["refresh_token"].as_str().expect("No refresh token").to_string();

    let (identifier, secret) = original.split_once('.').expect("token is not id.secret");
    assert!(!identifier.is_empty() && !secret.is_empty());
    assert!(!secret.contains('.'));

    let refreshed = app.post("/auth/refresh", &json!({ "refresh_token": original })).await;
    assert_eq!(200, refreshed.status().as_u16());
    let refreshed: Value = refreshed.json().await.unwrap();
    assert_ne!(refreshed["refresh_token"].as_str().unwrap(), original,
        "Refresh token should be rotated on each refresh");

    let replay = app.post("/auth/refresh", &json!({ "refresh_token": original })).await;
    assert_eq!(401, replay.status().as_u16());
    let replay: Value = replay.json().await.unwrap();
    assert_eq!(replay["code"], "TOKEN_REVOKED");
}

#[tokio::test]
async fn refresh_returns_401_for_bad_tokens() {
    let app = spawn_app().await;

    let malformed = app
        .post("/auth/refresh", &json!({ "refresh_token": "definitely_not_a_valid_token" }))
        .await;
    assert_eq!(401, malformed.status().as_u16());
    let malformed: Value = malformed.json().await.unwrap();
    assert_eq!(malformed["code"], "TOKEN_MALFORMED");

    let unknown_token = format!("{}.{}", "a".repeat(32), "b".repeat(64));
    let unknown = app.post("/auth/refresh", &json!({ "refresh_token": unknown_token })).await;
    assert_eq!(401, unknown.status().as_u16());
    let unknown: Value = unknown.json().await.unwrap();
    assert_eq!(unknown["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn refresh_returns_400_for_missing_token() {
    let app = spawn_app().await;
    let response = app.post("/auth/refresh", &json!({})).await;
    assert_eq!(400, response.status().as_u16());
}

// --- Logout Tests ---

#[tokio::test]
async fn logout_is_success_shaped_and_revokes() {
    let app = spawn_app().await;
    let registered = app.register("john@example.com", "SecurePass123").await;
    let token = registered["refresh_token"].as_str().unwrap();

    for presented in ["garbage", token, token] {
        let response = app.post("/auth/logout", &json!({ "refresh_token": presented })).await;
        assert_eq!(200, response.status().as_u16());
    }

    let response = app.post("/auth/refresh", &json!({ "refresh_token": token })).await;
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let app = spawn_app().await;
    let registered = app.register("john@example.com", "SecurePass123").await;
    let login: Value = app
        .post("/auth/login", &json!({ "email": "john@example.com", "password": "SecurePass123" }))
        .await
        .json()
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .post(&format!("{}/api/logout-all", &app.address))
        .header(
            "Authorization",
            format!("Bearer {}", login["access_token"].as_str().unwrap()),
        )
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["revoked"], 2);

    for token in [&registered["refresh_token"], &login["refresh_token"]] {
        let response = app.post("/auth/refresh", &json!({ "refresh_token": token })).await;
        assert_eq!(401, response.status().as_u16());
    }
}

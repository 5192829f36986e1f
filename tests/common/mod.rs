//! Common test utilities for E2E tests

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use portico::{AppState, config};
use tokio::net::TcpListener;

/// Test server instance
///
/// Runs the application against an in-process stub of the hosted
/// provider, so flows exercise the real client end to end.
pub struct TestServer {
    pub addr: String,
    pub provider_addr: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Spin up the stub provider first; its address goes into the
        // application configuration as the issuer URL.
        let provider_addr = spawn_stub_provider().await;

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            provider: config::ProviderConfig {
                issuer_url: provider_addr.clone(),
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
            },
            authorization: config::AuthorizationConfig {
                scopes: vec![
                    "openid".to_string(),
                    "profile".to_string(),
                    "email".to_string(),
                ],
                audience: None,
                callback_path: "/auth/callback".to_string(),
            },
            session: config::SessionConfig {
                secret: "test-secret-key-32-bytes-long!!!".to_string(),
                max_age: 604_800,
            },
            registry: config::RegistryConfig {
                max_clients: 100,
                client_ttl: 3_600,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = portico::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            provider_addr,
            state,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

/// Spawn a stub hosted provider on an ephemeral port
///
/// Serves the token and profile endpoints the hosted client talks to.
async fn spawn_stub_provider() -> String {
    let app = Router::new()
        .route("/oauth2/token", post(stub_token))
        .route("/oauth2/user_profile", get(stub_profile));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn stub_token() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "access_token": "stub-access-token",
        "token_type": "bearer",
        "expires_in": 3600,
        "id_token": "stub-id-token",
    }))
}

async fn stub_profile(headers: HeaderMap) -> Response {
    let has_bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Bearer "))
        .unwrap_or(false);

    if has_bearer {
        Json(serde_json::json!({
            "id": "kp_test_user",
            "org_code": "org_6a9f0c",
        }))
        .into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

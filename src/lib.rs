//! Portico - a sample web app integrating a hosted authentication provider
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Web Layer (Axum)                        │
//! │  - Server-rendered pages                                    │
//! │  - Auth flow handlers (login/signup/logout/callback)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Orchestration Layer                         │
//! │  - Correlation store (signed cookie)                        │
//! │  - Client registry (TTL-bounded concurrent map)             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Provider Boundary                           │
//! │  - ProviderClient trait (opaque collaborator)               │
//! │  - Hosted client over reqwest                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `auth`: correlation store and flow handlers
//! - `registry`: correlation id -> client instance map
//! - `provider`: hosted provider client boundary
//! - `pages`: server-rendered pages
//! - `config`: configuration management
//! - `error`: error types
//! - `metrics`: Prometheus instruments and endpoint

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pages;
pub mod provider;
pub mod registry;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; holds the immutable configuration and the
/// process-wide client registry.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Correlation id -> client instance registry
    pub registry: Arc<registry::ClientRegistry>,
}

impl AppState {
    /// Initialize application state with the hosted provider client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let http_client = reqwest::Client::builder()
            .user_agent("Portico/0.1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let factory = Arc::new(provider::HostedClientFactory::new(&config, http_client));
        let state = Self::with_factory(config, factory);

        tracing::info!("Application state initialized successfully");
        Ok(state)
    }

    /// Initialize application state with an injected client factory
    ///
    /// Used by tests to swap the hosted provider for scripted clients.
    pub fn with_factory(
        config: config::AppConfig,
        factory: Arc<dyn provider::ClientFactory>,
    ) -> Self {
        let registry = registry::ClientRegistry::new(&config.registry, factory);

        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(pages::pages_router())
        .merge(auth::auth_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(metrics::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}

//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub authorization: AuthorizationConfig,
    pub session: SessionConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "app.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the application
    ///
    /// # Returns
    /// Full URL like "https://app.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Hosted provider application configuration
///
/// Credentials issued by the provider for this application. Read-only
/// to the rest of the app; handed to the client factory at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider issuer base URL (e.g., "https://myapp.kinde.com")
    pub issuer_url: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
}

/// Per-authorization-request configuration
///
/// Scopes and redirect targets used when starting an authorize or
/// register flow.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationConfig {
    /// OAuth scopes requested from the provider
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Optional audience for the issued tokens
    pub audience: Option<String>,
    /// Path on this application the provider redirects back to
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "profile".to_string(),
        "email".to_string(),
    ]
}

fn default_callback_path() -> String {
    "/auth/callback".to_string()
}

/// Browser session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Correlation cookie signing secret (32+ bytes)
    pub secret: String,
    /// Correlation token max age in seconds (default: 604800 = 7 days)
    pub max_age: i64,
}

/// Client registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Maximum number of live client instances (default: 10000)
    pub max_clients: u64,
    /// Seconds an idle client instance stays in the registry (default: 3600)
    pub client_ttl: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (PORTICO_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("session.max_age", 604800)?
            .set_default("registry.max_clients", 10000)?
            .set_default("registry.client_ttl", 3600)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (PORTICO_*)
            .add_source(
                Environment::with_prefix("PORTICO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    /// Callback URL registered with the provider
    pub fn callback_url(&self) -> String {
        format!(
            "{}{}",
            self.server.base_url(),
            self.authorization.callback_path
        )
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.session.secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "session.secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.session.max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "session.max_age must be greater than 0".to_string(),
            ));
        }

        if url::Url::parse(&self.provider.issuer_url).is_err() {
            return Err(crate::error::AppError::Config(
                "provider.issuer_url must be an absolute URL".to_string(),
            ));
        }

        if self.authorization.scopes.is_empty() {
            return Err(crate::error::AppError::Config(
                "authorization.scopes must not be empty".to_string(),
            ));
        }

        if self.registry.max_clients == 0 {
            return Err(crate::error::AppError::Config(
                "registry.max_clients must be greater than 0".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure correlation cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

/// Hand-built configuration for unit tests across the crate
#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            domain: "localhost".to_string(),
            protocol: "http".to_string(),
        },
        provider: ProviderConfig {
            issuer_url: "https://myapp.kinde.com".to_string(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        },
        authorization: AuthorizationConfig {
            scopes: default_scopes(),
            audience: None,
            callback_path: default_callback_path(),
        },
        session: SessionConfig {
            secret: "x".repeat(32),
            max_age: 604_800,
        },
        registry: RegistryConfig {
            max_clients: 10_000,
            client_ttl: 3_600,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

//! Default `ProviderClient` backed by a Kinde-style hosted provider.
//!
//! The client only builds hosted-page URLs and performs the single
//! code-exchange POST; token semantics stay on the provider side.

use std::sync::Arc;

use axum::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use super::{AuthorizationState, ClientFactory, ProviderClient};
use crate::config::{AppConfig, AuthorizationConfig, ProviderConfig};
use crate::error::{AppError, Result};
use crate::metrics::PROVIDER_REQUESTS_TOTAL;

const AUTHORIZE_PATH: &str = "/oauth2/auth";
const TOKEN_PATH: &str = "/oauth2/token";
const PROFILE_PATH: &str = "/oauth2/user_profile";
const LOGOUT_PATH: &str = "/logout";

const STATE_NONCE_LEN: usize = 32;

/// Tokens returned by the provider's token endpoint
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct TokenSet {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    id_token: Option<String>,
}

/// Identity claims served by the provider's profile endpoint
#[derive(Debug, Deserialize)]
struct UserProfile {
    #[serde(default)]
    org_code: Option<String>,
}

/// Authorization URL prepared by authorize/register, consumed by the
/// browser redirect and checked again when the code comes back.
struct PendingAuthorization {
    url: String,
    nonce: String,
}

/// Mutable handshake state, guarded as one unit
struct Handshake {
    authorization: AuthorizationState,
    pending: Option<PendingAuthorization>,
    token: Option<TokenSet>,
}

/// One browser session's handle to the hosted provider
pub struct HostedClient {
    provider: ProviderConfig,
    callback_url: String,
    logout_redirect_url: String,
    http: reqwest::Client,
    handshake: Mutex<Handshake>,
}

impl HostedClient {
    pub fn new(
        provider: ProviderConfig,
        callback_url: String,
        logout_redirect_url: String,
        http: reqwest::Client,
    ) -> Self {
        Self {
            provider,
            callback_url,
            logout_redirect_url,
            http,
            handshake: Mutex::new(Handshake {
                authorization: AuthorizationState::Unauthorized,
                pending: None,
                token: None,
            }),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&self.provider.issuer_url)
            .and_then(|base| base.join(path))
            .map_err(|e| AppError::Config(format!("invalid provider URL: {e}")))
    }

    /// Prepare the hosted authorization page URL and park it until the
    /// browser is redirected there.
    async fn start_flow(&self, request: &AuthorizationConfig, register: bool) -> Result<()> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_NONCE_LEN)
            .map(char::from)
            .collect();

        let mut url = self.endpoint(AUTHORIZE_PATH)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.provider.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.callback_url)
                .append_pair("scope", &request.scopes.join(" "))
                .append_pair("state", &nonce);
            if let Some(audience) = &request.audience {
                pairs.append_pair("audience", audience);
            }
            if register {
                // Hint for the provider to land on its registration page
                pairs.append_pair("prompt", "create");
            }
        }

        let mut handshake = self.handshake.lock().await;
        handshake.authorization = AuthorizationState::NeedsUserAction;
        handshake.token = None;
        handshake.pending = Some(PendingAuthorization {
            url: url.into(),
            nonce,
        });

        Ok(())
    }
}

#[async_trait]
impl ProviderClient for HostedClient {
    async fn authorize(&self, request: &AuthorizationConfig) -> Result<()> {
        self.start_flow(request, false).await
    }

    async fn register(&self, request: &AuthorizationConfig) -> Result<()> {
        self.start_flow(request, true).await
    }

    async fn logout(&self) -> Result<String> {
        let mut handshake = self.handshake.lock().await;
        handshake.authorization = AuthorizationState::LoggedOut;
        handshake.pending = None;
        handshake.token = None;
        drop(handshake);

        let mut url = self.endpoint(LOGOUT_PATH)?;
        url.query_pairs_mut()
            .append_pair("redirect", &self.logout_redirect_url);
        Ok(url.into())
    }

    async fn redirect_url(&self) -> Result<String> {
        let handshake = self.handshake.lock().await;
        handshake
            .pending
            .as_ref()
            .map(|pending| pending.url.clone())
            .ok_or_else(|| AppError::Validation("no authorization in progress".to_string()))
    }

    async fn receive_code(&self, code: &str, state: &str) -> Result<()> {
        // Verify the nonce before touching the network; the lock is not
        // held across the exchange itself.
        {
            let handshake = self.handshake.lock().await;
            let pending = handshake
                .pending
                .as_ref()
                .ok_or_else(|| AppError::Validation("no authorization in progress".to_string()))?;
            if pending.nonce != state {
                return Err(AppError::StateMismatch);
            }
        }

        let token_url = self.endpoint(TOKEN_PATH)?;
        let response = self
            .http
            .post(token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.provider.client_id.as_str()),
                ("client_secret", self.provider.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.callback_url.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            PROVIDER_REQUESTS_TOTAL
                .with_label_values(&["token", "error"])
                .inc();
            return Err(AppError::Provider(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        PROVIDER_REQUESTS_TOTAL
            .with_label_values(&["token", "ok"])
            .inc();

        let token: TokenSet = response.json().await?;

        let mut handshake = self.handshake.lock().await;
        handshake.authorization = AuthorizationState::Authorized;
        handshake.pending = None;
        handshake.token = Some(token);

        Ok(())
    }

    async fn authorization_state(&self) -> AuthorizationState {
        self.handshake.lock().await.authorization
    }

    async fn organization(&self) -> Result<Option<String>> {
        let access_token = {
            let handshake = self.handshake.lock().await;
            if handshake.authorization != AuthorizationState::Authorized {
                return Err(AppError::Unauthorized);
            }
            handshake
                .token
                .as_ref()
                .map(|token| token.access_token.clone())
                .ok_or(AppError::Unauthorized)?
        };

        let profile_url = self.endpoint(PROFILE_PATH)?;
        let response = self
            .http
            .get(profile_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            PROVIDER_REQUESTS_TOTAL
                .with_label_values(&["profile", "error"])
                .inc();
            return Err(AppError::Provider(format!(
                "profile endpoint returned {}",
                response.status()
            )));
        }
        PROVIDER_REQUESTS_TOTAL
            .with_label_values(&["profile", "ok"])
            .inc();

        let profile: UserProfile = response.json().await?;
        Ok(profile.org_code)
    }
}

/// Builds `HostedClient` instances from the loaded configuration
pub struct HostedClientFactory {
    provider: ProviderConfig,
    callback_url: String,
    logout_redirect_url: String,
    http: reqwest::Client,
}

impl HostedClientFactory {
    pub fn new(config: &AppConfig, http: reqwest::Client) -> Self {
        Self {
            provider: config.provider.clone(),
            callback_url: config.callback_url(),
            logout_redirect_url: config.server.base_url(),
            http,
        }
    }
}

impl ClientFactory for HostedClientFactory {
    fn create(&self) -> Arc<dyn ProviderClient> {
        Arc::new(HostedClient::new(
            self.provider.clone(),
            self.callback_url.clone(),
            self.logout_redirect_url.clone(),
            self.http.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> HostedClient {
        HostedClient::new(
            ProviderConfig {
                issuer_url: "https://myapp.kinde.com".to_string(),
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
            },
            "http://localhost/auth/callback".to_string(),
            "http://localhost".to_string(),
            reqwest::Client::new(),
        )
    }

    fn test_request() -> AuthorizationConfig {
        AuthorizationConfig {
            scopes: vec!["openid".to_string(), "profile".to_string()],
            audience: None,
            callback_path: "/auth/callback".to_string(),
        }
    }

    #[tokio::test]
    async fn authorize_builds_hosted_page_url() {
        let client = test_client();
        client.authorize(&test_request()).await.unwrap();

        assert_eq!(
            client.authorization_state().await,
            AuthorizationState::NeedsUserAction
        );

        let url = client.redirect_url().await.unwrap();
        assert!(url.starts_with("https://myapp.kinde.com/oauth2/auth?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid+profile"));
        assert!(url.contains("state="));
        assert!(!url.contains("prompt=create"));
    }

    #[tokio::test]
    async fn register_adds_registration_hint() {
        let client = test_client();
        client.register(&test_request()).await.unwrap();

        let url = client.redirect_url().await.unwrap();
        assert!(url.contains("prompt=create"));
    }

    #[tokio::test]
    async fn redirect_url_before_any_flow_fails() {
        let client = test_client();
        let error = client.redirect_url().await.unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn receive_code_rejects_mismatched_state() {
        let client = test_client();
        client.authorize(&test_request()).await.unwrap();

        let error = client
            .receive_code("some-code", "not-the-nonce")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::StateMismatch));
    }

    #[tokio::test]
    async fn logout_returns_provider_logout_url() {
        let client = test_client();
        let url = client.logout().await.unwrap();

        assert!(url.starts_with("https://myapp.kinde.com/logout?"));
        assert!(url.contains("redirect=http%3A%2F%2Flocalhost"));
        assert_eq!(
            client.authorization_state().await,
            AuthorizationState::LoggedOut
        );
    }
}

//! Auth flow handlers
//!
//! Each operation correlates the browser session to a client instance,
//! drives one flow operation on it, and ends in a redirect: to the
//! provider's hosted pages while user action is needed, back to the
//! application home otherwise.

use axum::{
    Router,
    extract::{Query, State},
    response::Redirect,
    routing::get,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::correlation::{ensure_correlation, read_correlation};
use crate::AppState;
use crate::error::AppError;
use crate::metrics::AUTH_FLOWS_TOTAL;
use crate::provider::AuthorizationState;

/// Create the auth flow router
///
/// Routes:
/// - GET /auth/login - Start a sign-in flow
/// - GET /auth/signup - Start a registration flow
/// - GET /auth/logout - End the provider session
/// - GET /auth/callback - Provider redirect target
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/signup", get(signup))
        .route("/auth/logout", get(logout))
        .route("/auth/callback", get(callback))
}

/// GET /auth/login
///
/// Ensures a correlation id, fetches or creates this session's client
/// instance, and asks it to authorize. If the provider needs the user,
/// the browser is sent to the provider's sign-in page.
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let (correlation_id, jar) = ensure_correlation(jar, &state.config)?;
    let client = state.registry.get_or_create(&correlation_id).await;

    client.authorize(&state.config.authorization).await?;
    AUTH_FLOWS_TOTAL
        .with_label_values(&["login", "started"])
        .inc();

    if client.authorization_state().await == AuthorizationState::NeedsUserAction {
        let url = client.redirect_url().await?;
        tracing::info!(correlation_id = %correlation_id, "Redirecting to provider sign-in");
        return Ok((jar, Redirect::to(&url)));
    }
    Ok((jar, Redirect::to("/")))
}

/// GET /auth/signup
///
/// Identical shape to login, but starts the provider's registration
/// flow instead.
async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let (correlation_id, jar) = ensure_correlation(jar, &state.config)?;
    let client = state.registry.get_or_create(&correlation_id).await;

    client.register(&state.config.authorization).await?;
    AUTH_FLOWS_TOTAL
        .with_label_values(&["signup", "started"])
        .inc();

    if client.authorization_state().await == AuthorizationState::NeedsUserAction {
        let url = client.redirect_url().await?;
        tracing::info!(correlation_id = %correlation_id, "Redirecting to provider registration");
        return Ok((jar, Redirect::to(&url)));
    }
    Ok((jar, Redirect::to("/")))
}

/// GET /auth/logout
///
/// Ends the session's handshake and redirects the browser to the URL
/// the client returns (the provider's own logout endpoint).
async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let (correlation_id, jar) = ensure_correlation(jar, &state.config)?;
    let client = state.registry.get_or_create(&correlation_id).await;

    let url = client.logout().await?;
    AUTH_FLOWS_TOTAL
        .with_label_values(&["logout", "completed"])
        .inc();
    tracing::info!(correlation_id = %correlation_id, "Redirecting to provider logout");

    Ok((jar, Redirect::to(&url)))
}

/// Query parameters delivered by the provider redirect
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    /// Authorization code
    code: String,
    /// State nonce echoed back by the provider
    state: String,
}

/// GET /auth/callback
///
/// Completes the handshake for the session's pending client instance.
/// The instance is looked up, never created here: a session without a
/// prior login/signup is a client error, not a fresh flow.
async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<Redirect, AppError> {
    let correlation_id =
        read_correlation(&jar, &state.config).ok_or(AppError::UnknownCorrelation)?;
    let client = state.registry.get(&correlation_id).await?;

    client.receive_code(&query.code, &query.state).await?;

    if client.authorization_state().await == AuthorizationState::Authorized {
        AUTH_FLOWS_TOTAL
            .with_label_values(&["callback", "authorized"])
            .inc();
        // The organization claim is informational; a failed read must
        // not fail an otherwise completed handshake.
        match client.organization().await {
            Ok(Some(organization)) => tracing::info!(
                correlation_id = %correlation_id,
                organization = %organization,
                "Sign-in completed"
            ),
            Ok(None) => tracing::info!(
                correlation_id = %correlation_id,
                "Sign-in completed without organization claim"
            ),
            Err(error) => tracing::warn!(
                correlation_id = %correlation_id,
                error = %error,
                "Could not read organization claim"
            ),
        }
    } else {
        AUTH_FLOWS_TOTAL
            .with_label_values(&["callback", "incomplete"])
            .inc();
    }

    Ok(Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::header::LOCATION;
    use axum::response::IntoResponse;
    use mockall::predicate::always;

    use super::*;
    use crate::config::test_config;
    use crate::provider::{ClientFactory, MockProviderClient, ProviderClient};

    struct FixedFactory {
        client: Arc<MockProviderClient>,
    }

    impl ClientFactory for FixedFactory {
        fn create(&self) -> Arc<dyn ProviderClient> {
            self.client.clone()
        }
    }

    fn state_with(client: MockProviderClient) -> AppState {
        AppState::with_factory(
            test_config(),
            Arc::new(FixedFactory {
                client: Arc::new(client),
            }),
        )
    }

    fn location_of(response: axum::response::Response) -> String {
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("redirect location header")
            .to_string()
    }

    #[tokio::test]
    async fn login_without_session_redirects_to_provider() {
        let mut client = MockProviderClient::new();
        client
            .expect_authorize()
            .with(always())
            .times(1)
            .returning(|_| Ok(()));
        client
            .expect_authorization_state()
            .returning(|| AuthorizationState::NeedsUserAction);
        client
            .expect_redirect_url()
            .returning(|| Ok("https://provider.example.com/oauth2/auth?state=abc".to_string()));

        let state = state_with(client);
        let response = login(State(state), CookieJar::new())
            .await
            .unwrap()
            .into_response();

        assert_eq!(
            location_of(response),
            "https://provider.example.com/oauth2/auth?state=abc"
        );
    }

    #[tokio::test]
    async fn login_without_user_action_redirects_home() {
        let mut client = MockProviderClient::new();
        client.expect_authorize().times(1).returning(|_| Ok(()));
        client
            .expect_authorization_state()
            .returning(|| AuthorizationState::Authorized);

        let state = state_with(client);
        let response = login(State(state), CookieJar::new())
            .await
            .unwrap()
            .into_response();

        assert_eq!(location_of(response), "/");
    }

    #[tokio::test]
    async fn signup_starts_registration_flow() {
        let mut client = MockProviderClient::new();
        client.expect_register().times(1).returning(|_| Ok(()));
        client
            .expect_authorization_state()
            .returning(|| AuthorizationState::NeedsUserAction);
        client
            .expect_redirect_url()
            .returning(|| Ok("https://provider.example.com/oauth2/auth?prompt=create".to_string()));

        let state = state_with(client);
        let response = signup(State(state), CookieJar::new())
            .await
            .unwrap()
            .into_response();

        assert!(location_of(response).contains("prompt=create"));
    }

    #[tokio::test]
    async fn logout_redirects_to_client_url() {
        let mut client = MockProviderClient::new();
        client
            .expect_logout()
            .times(1)
            .returning(|| Ok("https://provider.example.com/logout?redirect=home".to_string()));

        let state = state_with(client);
        let response = logout(State(state), CookieJar::new())
            .await
            .unwrap()
            .into_response();

        assert_eq!(
            location_of(response),
            "https://provider.example.com/logout?redirect=home"
        );
    }

    #[tokio::test]
    async fn callback_without_correlation_cookie_is_not_found() {
        let state = state_with(MockProviderClient::new());
        let query = Query(CallbackQuery {
            code: "code".to_string(),
            state: "state".to_string(),
        });

        let error = callback(State(state), query, CookieJar::new())
            .await
            .unwrap_err();

        assert!(matches!(error, AppError::UnknownCorrelation));
    }
}

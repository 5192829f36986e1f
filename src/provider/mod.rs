//! Hosted provider client boundary
//!
//! The provider SDK is an opaque collaborator: it owns the handshake
//! protocol (code exchange, token storage) while the rest of the app
//! only drives it through the `ProviderClient` trait. The default
//! implementation in [`hosted`] talks to a Kinde-style hosted provider
//! over HTTP.

mod hosted;

pub use hosted::{HostedClient, HostedClientFactory};

use std::sync::Arc;

use axum::async_trait;

use crate::config::AuthorizationConfig;
use crate::error::Result;

/// Progress of one client instance's handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    /// No flow started yet
    Unauthorized,
    /// Flow started; the browser must visit the provider
    NeedsUserAction,
    /// Code exchange completed
    Authorized,
    /// Logged out at this application
    LoggedOut,
}

/// Stateful handle to one in-progress or completed handshake
///
/// One instance exists per correlation id, owned by the client
/// registry. Operations mutate the handshake state in place.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Start a login flow
    ///
    /// Prepares the provider authorization URL and moves the state to
    /// `NeedsUserAction` when the browser has to visit the provider.
    async fn authorize(&self, request: &AuthorizationConfig) -> Result<()>;

    /// Start a signup flow
    ///
    /// Same shape as [`authorize`](Self::authorize) with a registration
    /// hint for the provider's hosted pages.
    async fn register(&self, request: &AuthorizationConfig) -> Result<()>;

    /// End the provider session
    ///
    /// Returns the provider logout URL the browser should be sent to.
    async fn logout(&self) -> Result<String>;

    /// URL of the provider page the browser must visit next
    ///
    /// Only valid while the state is `NeedsUserAction`.
    async fn redirect_url(&self) -> Result<String>;

    /// Complete the handshake with the code delivered by the callback
    ///
    /// Verifies the returned state nonce and performs the code
    /// exchange. Moves the state to `Authorized` on success.
    async fn receive_code(&self, code: &str, state: &str) -> Result<()>;

    /// Current handshake state
    async fn authorization_state(&self) -> AuthorizationState;

    /// Organization claim of the authorized identity, if any
    async fn organization(&self) -> Result<Option<String>>;
}

/// Constructs client instances for the registry
///
/// Injectable so tests can substitute a scripted client without a
/// provider round trip.
pub trait ClientFactory: Send + Sync {
    /// Create a fresh, unauthorized client instance
    fn create(&self) -> Arc<dyn ProviderClient>;
}

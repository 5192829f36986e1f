//! Session-correlated auth orchestration
//!
//! Handles:
//! - Correlation of browser sessions to client instances
//! - Login/signup/logout flow handlers
//! - The provider redirect callback

pub mod correlation;
mod handlers;

pub use correlation::{
    CORRELATION_COOKIE, CorrelationId, CorrelationToken, create_correlation_token,
    ensure_correlation, read_correlation, verify_correlation_token,
};
pub use handlers::auth_router;

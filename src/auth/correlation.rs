//! Correlation store
//!
//! Links stateless browser requests to a stateful provider client.
//! The correlation id lives in an HMAC-signed cookie, so no
//! server-side session storage is needed.

use std::fmt;

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;

/// Name of the correlation cookie
pub const CORRELATION_COOKIE: &str = "portico_correlation";

/// Opaque per-browser-session identifier
///
/// Generated once per session and stable across all requests within
/// it; keys the client registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Signed payload stored in the correlation cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationToken {
    /// The session's correlation id
    pub correlation_id: CorrelationId,
    /// When the token was issued
    pub created_at: DateTime<Utc>,
    /// When the token stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl CorrelationToken {
    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Create a signed correlation token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
pub fn create_correlation_token(
    token: &CorrelationToken,
    secret: &str,
) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let payload = serde_json::to_string(token).map_err(|e| AppError::Internal(e.into()))?;
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Signing(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a correlation token
///
/// # Errors
/// Returns error if the signature is invalid, the token is malformed,
/// or it has expired.
pub fn verify_correlation_token(token: &str, secret: &str) -> Result<CorrelationToken, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 2 {
        return Err(AppError::Unauthorized);
    }

    let payload_b64 = parts[0];
    let signature_b64 = parts[1];

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Signing(e.to_string()))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;

    mac.verify_slice(&expected_signature)
        .map_err(|_| AppError::Unauthorized)?;

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;

    let payload_str = String::from_utf8(payload_bytes).map_err(|_| AppError::Unauthorized)?;

    let token: CorrelationToken =
        serde_json::from_str(&payload_str).map_err(|_| AppError::Unauthorized)?;

    if token.is_expired() {
        return Err(AppError::Unauthorized);
    }

    Ok(token)
}

/// Read the correlation id from the request's cookie jar
///
/// Returns `None` when the cookie is absent, tampered with, or
/// expired; the caller decides whether that means "new session" or
/// "no pending authorization".
pub fn read_correlation(jar: &CookieJar, config: &AppConfig) -> Option<CorrelationId> {
    let cookie = jar.get(CORRELATION_COOKIE)?;
    match verify_correlation_token(cookie.value(), &config.session.secret) {
        Ok(token) => Some(token.correlation_id),
        Err(_) => {
            // A present-but-unverifiable cookie degrades this request
            // to a fresh identity; the prior handshake is unreachable.
            tracing::warn!("Correlation cookie failed verification; treating session as new");
            None
        }
    }
}

/// Return the session's correlation id, minting one if absent
///
/// Idempotent within a session: once the cookie is set, repeated
/// calls return the same id without touching the jar.
pub fn ensure_correlation(
    jar: CookieJar,
    config: &AppConfig,
) -> Result<(CorrelationId, CookieJar), AppError> {
    if let Some(id) = read_correlation(&jar, config) {
        return Ok((id, jar));
    }

    let id = CorrelationId::generate();
    let now = Utc::now();
    let token = CorrelationToken {
        correlation_id: id.clone(),
        created_at: now,
        expires_at: now + Duration::seconds(config.session.max_age),
    };
    let signed = create_correlation_token(&token, &config.session.secret)?;

    let cookie = Cookie::build((CORRELATION_COOKIE, signed))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.should_use_secure_cookies())
        .build();

    tracing::debug!(correlation_id = %id, "Minted correlation id for new session");
    Ok((id, jar.add(cookie)))
}

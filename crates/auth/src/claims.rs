use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims read out of an access token's payload segment.
///
/// Decoding is structural only: the signature is never checked here. The
/// server verifies every token it receives; the client reads `exp` solely to
/// schedule renewal ahead of expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Expiry, in seconds since the Unix epoch.
    #[serde(default)]
    pub exp: Option<i64>,

    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub sub: Option<String>,

    /// Anything else the issuer put in the payload.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token is not a three-segment JWS")]
    Malformed,

    #[error("token payload is not base64url: {0}")]
    Encoding(String),

    #[error("token payload is not a JSON claims object: {0}")]
    Payload(String),
}

impl TokenClaims {
    /// Decode the payload segment of `token` without verifying it.
    pub fn decode(token: &str) -> Result<Self, ClaimsError> {
        let mut segments = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(ClaimsError::Malformed);
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ClaimsError::Encoding(e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Payload(e.to_string()))
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

/// Where a token sits relative to its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Expiry is further away than the renewal lead window.
    Fresh,
    /// Still valid, but expires within the lead window.
    Expiring,
    /// At or past expiry, or unreadable.
    Expired,
}

/// Classify `token` at `now` with the given renewal lead window.
///
/// A token without a readable `exp` counts as expired; the boundary is
/// inclusive (`exp == now` is expired).
pub fn classify(token: &str, now: DateTime<Utc>, lead: Duration) -> Freshness {
    let expires_at = match TokenClaims::decode(token).map(|c| c.expires_at()) {
        Ok(Some(at)) => at,
        Ok(None) | Err(_) => return Freshness::Expired,
    };

    if expires_at <= now {
        Freshness::Expired
    } else if expires_at <= now + lead {
        Freshness::Expiring
    } else {
        Freshness::Fresh
    }
}

/// Whether `token` is expired at `now`. Undecodable tokens are expired.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    classify(token, now, Duration::zero()) == Freshness::Expired
}

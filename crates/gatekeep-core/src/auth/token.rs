//! Client-side inspection of self-describing bearer tokens.
//!
//! Tokens are three dot-separated segments; the middle one is base64url
//! JSON carrying at least `sub` and `exp`. Nothing here verifies the
//! signature: the server remains the authority, these helpers only decide
//! whether a token is worth presenting.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Payload claims as decoded from a token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    /// Whole seconds since the epoch; fractional NumericDates are floored
    #[serde(default, deserialize_with = "numeric_date")]
    pub exp: Option<i64>,
}

fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|v| v.is_finite()).map(|v| v.floor() as i64))
}

/// Subject and expiry of a token that carries both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

/// Decode the payload segment. Returns `None` on any malformed input.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() || payload.is_empty() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Subject and expiry, when the token is decodable and carries both.
pub fn claims(token: &str) -> Option<TokenIdentity> {
    let decoded = decode(token)?;
    let subject = decoded.sub?;
    let expires_at = Utc.timestamp_opt(decoded.exp?, 0).single()?;
    Some(TokenIdentity {
        subject,
        expires_at,
    })
}

/// Whether the token is expired right now. Unreadable tokens count as expired.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// Expiry check against an explicit clock. A token is live only while
/// its `exp` is strictly after `now`.
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode(token).and_then(|c| c.exp) {
        Some(exp) => exp <= now.timestamp(),
        None => true,
    }
}

/// Seconds until expiry, clamped at zero. `None` for unreadable tokens.
pub fn seconds_until_expiry(token: &str) -> Option<i64> {
    let exp = decode(token)?.exp?;
    Some((exp - Utc::now().timestamp()).max(0))
}

use std::time::Duration;

use base64::Engine;
use base64::alphabet::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::Value as JsonValue;

/// Standard base64 that accepts payload segments with or without `=` padding.
/// URL-safe input is mapped onto this alphabet first, so both are accepted.
const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Reads the `exp` claim of a JWT without verifying it.
///
/// Returns the expiry in epoch milliseconds, or `None` when the token is
/// malformed, its payload is not JSON, or `exp` is missing or not a finite
/// number. Never panics on untrusted input.
#[must_use]
pub fn token_expiry_millis(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;

    let payload = payload.replace('-', "+").replace('_', "/");
    let bytes = match BASE64_LENIENT.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to decode JWT payload");
            return None;
        }
    };
    let claims: JsonValue = match serde_json::from_slice(&bytes) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse JWT payload");
            return None;
        }
    };

    let exp = match claims.get("exp")? {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    seconds_to_millis(exp)
}

fn seconds_to_millis(exp: f64) -> Option<i64> {
    let millis = (exp * 1000.0).trunc();
    // i64::MAX is not exactly representable; stay strictly inside the range.
    if millis.is_finite() && millis.abs() < 9.0e18 {
        Some(millis as i64)
    } else {
        None
    }
}

/// Whether a token expiring at `expires_at` must no longer be used at `now`.
///
/// A token is usable only while `now + buffer < expires_at`. Unknown expiry
/// counts as expired, which forces a fresh exchange.
#[must_use]
pub fn is_expired(expires_at: Option<i64>, now: i64, buffer: Duration) -> bool {
    let Some(expires_at) = expires_at else {
        return true;
    };
    let buffer = i64::try_from(buffer.as_millis()).unwrap_or(i64::MAX);
    now.saturating_add(buffer) >= expires_at
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

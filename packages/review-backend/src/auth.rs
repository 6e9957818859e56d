use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

const AUTH_COOKIE_NAME: &str = "auth_token";
const DEFAULT_TOKEN_TTL: &str = "24h";

type HmacSha256 = Hmac<Sha256>;

/// The learner a request acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: String,
}

impl AuthUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired or not yet valid")]
    OutsideValidity,
    #[error("invalid token lifetime: {0}")]
    InvalidExpiresIn(String),
}

/// Bearer header first, then the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    get_cookie(headers, AUTH_COOKIE_NAME)
}

/// Checks an HS256 token and returns the learner it was issued for.
pub fn verify_token(token: &str, secret: &str) -> Result<AuthUser, AuthError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let payload_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let sig_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidToken);
    }

    let header_json: serde_json::Value = decode_segment(header_b64)?;
    if header_json.get("alg").and_then(|value| value.as_str()) != Some("HS256") {
        return Err(AuthError::InvalidToken);
    }

    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload: serde_json::Value = decode_segment(payload_b64)?;
    validate_registered_claims(&payload, Utc::now())?;

    let learner_id = payload
        .get("sub")
        .or_else(|| payload.get("userId"))
        .and_then(|value| value.as_str())
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::InvalidToken)?;

    Ok(AuthUser::new(learner_id))
}

/// Issues a token for `learner_id`. Token issuance normally happens
/// upstream; this exists for operators and tests.
pub fn sign_token_for_learner(
    learner_id: &str,
    secret: &str,
    expires_in: Option<&str>,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let expires_in_ms = parse_expires_in_ms(expires_in.unwrap_or(DEFAULT_TOKEN_TTL))?;
    let issued_at = Utc::now();
    let exp = issued_at
        .checked_add_signed(chrono::Duration::milliseconds(expires_in_ms))
        .ok_or_else(|| AuthError::InvalidExpiresIn(expires_in_ms.to_string()))?;

    let header_json = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
    let payload_json = serde_json::json!({
        "sub": learner_id,
        "iat": issued_at.timestamp(),
        "exp": exp.timestamp(),
    });

    let header_b64 = URL_SAFE_NO_PAD.encode(header_json.to_string());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json.to_string());
    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok((format!("{signing_input}.{sig_b64}"), exp))
}

/// Lifetimes such as `30m`, `24h` or `7d`.
pub fn parse_expires_in_ms(value: &str) -> Result<i64, AuthError> {
    let trimmed = value.trim();
    let invalid = || AuthError::InvalidExpiresIn(value.to_string());
    if trimmed.len() < 2 {
        return Err(invalid());
    }

    let (digits, unit) = trimmed.split_at(trimmed.len() - 1);
    let amount: i64 = digits.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    let unit_ms = match unit {
        "s" => 1000,
        "m" => 60 * 1000,
        "h" => 60 * 60 * 1000,
        "d" => 24 * 60 * 60 * 1000,
        _ => return Err(invalid()),
    };
    amount.checked_mul(unit_ms).ok_or_else(invalid)
}

fn decode_segment(segment: &str) -> Result<serde_json::Value, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken)
}

fn validate_registered_claims(
    payload: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    let now = now.timestamp();

    if let Some(exp) = payload.get("exp").and_then(|value| value.as_i64()) {
        if now >= exp {
            return Err(AuthError::OutsideValidity);
        }
    }

    if let Some(nbf) = payload.get("nbf").and_then(|value| value.as_i64()) {
        if now < nbf {
            return Err(AuthError::OutsideValidity);
        }
    }

    Ok(())
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    #[test]
    fn signed_token_verifies_to_learner() {
        let (token, exp) = sign_token_for_learner("learner-7", SECRET, Some("1h")).unwrap();
        assert!(exp > Utc::now());
        assert_eq!(verify_token(&token, SECRET).unwrap(), AuthUser::new("learner-7"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, _) = sign_token_for_learner("learner-7", SECRET, None).unwrap();
        assert_eq!(verify_token(&token, "other"), Err(AuthError::InvalidToken));
    }

    #[test]
    fn expired_claims_are_rejected() {
        let past = serde_json::json!({ "sub": "a", "exp": Utc::now().timestamp() - 10 });
        assert_eq!(
            validate_registered_claims(&past, Utc::now()),
            Err(AuthError::OutsideValidity)
        );
        let future = serde_json::json!({ "sub": "a", "nbf": Utc::now().timestamp() + 60 });
        assert_eq!(
            validate_registered_claims(&future, Utc::now()),
            Err(AuthError::OutsideValidity)
        );
    }

    #[test]
    fn token_from_header_or_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; auth_token=abc"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn lifetimes_parse() {
        assert_eq!(parse_expires_in_ms("30s"), Ok(30_000));
        assert_eq!(parse_expires_in_ms("2h"), Ok(7_200_000));
        assert!(parse_expires_in_ms("h").is_err());
        assert!(parse_expires_in_ms("-1d").is_err());
        assert!(parse_expires_in_ms("5w").is_err());
    }
}

//! Caller identity.
//!
//! Signed-in shoppers arrive with `x-account-id`, set by the authenticating proxy
//! in front of this service. Guests carry a session token in the
//! `cart_session_id` cookie.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::convert::Infallible;

use super::ApiError;
use crate::application::CheckoutError;
use crate::domain::value_objects::Identity;

pub const ACCOUNT_HEADER: &str = "x-account-id";
pub const SESSION_COOKIE: &str = "cart_session_id";

const SESSION_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 30;

/// The resolved identity, if any. An account wins over a session cookie.
#[derive(Clone, Debug, Default)]
pub struct Caller(pub Option<Identity>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(identify(&parts.headers)))
    }
}

/// Like [`Caller`], but rejects with 401 when there is no identity. Placed
/// before a body extractor, the body is never read for anonymous callers.
#[derive(Clone, Debug)]
pub struct Authenticated(pub Identity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identify(&parts.headers).map(Self).ok_or_else(|| CheckoutError::Unauthenticated.into())
    }
}

pub fn identify(headers: &HeaderMap) -> Option<Identity> {
    let account = headers
        .get(ACCOUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(account) = account {
        return Some(Identity::Account(account.to_string()));
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| Identity::Session(value.to_string()))
}

/// `guest_<unix millis>_<random>`.
pub fn new_guest_token() -> String {
    let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(13).map(|c| char::from(c).to_ascii_lowercase()).collect();
    format!("guest_{}_{suffix}", Utc::now().timestamp_millis())
}

pub fn session_cookie(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{SESSION_COOKIE}={token}; Path=/; Max-Age={SESSION_MAX_AGE_SECS}; HttpOnly; SameSite=Lax")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCOUNT_HEADER, HeaderValue::from_static("buyer@example.com"));
        headers.insert(COOKIE, HeaderValue::from_static("cart_session_id=guest_1_abc"));

        assert_eq!(identify(&headers), Some(Identity::Account("buyer@example.com".into())));
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; cart_session_id=guest_1_abc; lang=en"));

        assert_eq!(identify(&headers), Some(Identity::Session("guest_1_abc".into())));
    }

    #[test]
    fn no_identity_without_header_or_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCOUNT_HEADER, HeaderValue::from_static("  "));
        headers.insert(COOKIE, HeaderValue::from_static("cart_session_id="));

        assert_eq!(identify(&headers), None);
    }

    #[test]
    fn guest_tokens_have_the_expected_shape() {
        let token = new_guest_token();
        let parts: Vec<_> = token.splitn(3, '_').collect();

        assert_eq!(parts[0], "guest");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 13);
        assert_ne!(token, new_guest_token());
    }

    #[test]
    fn cookie_lasts_thirty_days() {
        let cookie = session_cookie("guest_1_abc").unwrap();
        let cookie = cookie.to_str().unwrap();

        assert!(cookie.starts_with("cart_session_id=guest_1_abc;"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
    }
}

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use tracing::{debug, instrument, warn};

use super::token::TokenConfig;
use super::types::UserIdentity;
use crate::shared::AppError;

/// Application subprotocol a browser offers next to its token, so the upgrade
/// can negotiate a protocol other than the token itself
pub const WEBSOCKET_PROTOCOL: &str = "openvoice";

/// Resolves the user behind an incoming request.
/// The hub trusts the returned identity and never re-validates it.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<UserIdentity, AppError>;
}

/// Verifies session JWTs issued by the login service.
///
/// The token is looked up in this order:
/// 1. the session cookie (browsers can't set headers on a WebSocket upgrade)
/// 2. `Authorization: Bearer <token>`
/// 3. the first `Sec-WebSocket-Protocol` value other than [`WEBSOCKET_PROTOCOL`]
pub struct JwtAuthenticator {
    token_config: TokenConfig,
    cookie_name: String,
}

impl JwtAuthenticator {
    pub fn new(token_config: TokenConfig, cookie_name: impl Into<String>) -> Self {
        Self {
            token_config,
            cookie_name: cookie_name.into(),
        }
    }

    fn extract_token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        cookie_value(headers, &self.cookie_name)
            .or_else(|| bearer_token(headers))
            .or_else(|| {
                headers
                    .get(header::SEC_WEBSOCKET_PROTOCOL)
                    .and_then(|h| h.to_str().ok())
                    .and_then(|offered| {
                        offered
                            .split(',')
                            .map(str::trim)
                            .find(|protocol| *protocol != WEBSOCKET_PROTOCOL)
                    })
            })
            .filter(|token| !token.is_empty())
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    #[instrument(skip(self, headers))]
    async fn authenticate(&self, headers: &HeaderMap) -> Result<UserIdentity, AppError> {
        let token = self.extract_token(headers).ok_or_else(|| {
            warn!("Request carries no session token");
            AppError::Unauthorized("Missing session token".to_string())
        })?;

        let claims = self.token_config.validate_token(token)?;
        debug!(user_id = claims.user_id, "Session token accepted");
        Ok(claims.into())
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn authenticator() -> JwtAuthenticator {
        JwtAuthenticator::new(TokenConfig::new("test-secret"), "openvoice_session")
    }

    fn token_for(user: &UserIdentity) -> String {
        TokenConfig::new("test-secret").issue_token(user).unwrap()
    }

    #[tokio::test]
    async fn test_authenticates_from_cookie() {
        let user = UserIdentity::new(3, "carol");
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; openvoice_session={}", token_for(&user)))
                .unwrap(),
        );

        let identity = authenticator().authenticate(&headers).await.unwrap();
        assert_eq!(identity, user);
    }

    #[tokio::test]
    async fn test_authenticates_from_bearer_header() {
        let user = UserIdentity::new(4, "dave");
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token_for(&user))).unwrap(),
        );

        let identity = authenticator().authenticate(&headers).await.unwrap();
        assert_eq!(identity, user);
    }

    #[tokio::test]
    async fn test_authenticates_from_websocket_protocol_header() {
        let user = UserIdentity::new(5, "erin");
        let mut headers = HeaderMap::new();
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_str(&token_for(&user)).unwrap(),
        );

        let identity = authenticator().authenticate(&headers).await.unwrap();
        assert_eq!(identity, user);
    }

    #[tokio::test]
    async fn test_token_offered_next_to_application_protocol() {
        let user = UserIdentity::new(6, "frank");
        for offered in [
            format!("{}, {}", WEBSOCKET_PROTOCOL, token_for(&user)),
            format!("{}, {}", token_for(&user), WEBSOCKET_PROTOCOL),
        ] {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::SEC_WEBSOCKET_PROTOCOL,
                HeaderValue::from_str(&offered).unwrap(),
            );

            let identity = authenticator().authenticate(&headers).await.unwrap();
            assert_eq!(identity, user);
        }
    }

    #[tokio::test]
    async fn test_application_protocol_alone_is_not_a_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(WEBSOCKET_PROTOCOL),
        );

        let result = authenticator().authenticate(&headers).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let result = authenticator().authenticate(&HeaderMap::new()).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_forged_token_is_rejected() {
        let forged = TokenConfig::new("other-secret")
            .issue_token(&UserIdentity::new(1, "mallory"))
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", forged)).unwrap(),
        );

        let result = authenticator().authenticate(&headers).await;
        assert!(matches!(result, Err(AppError::JwtError(_))));
    }

    #[test]
    fn test_cookie_lookup_ignores_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("openvoice_session_old=stale; a=b"),
        );

        assert_eq!(cookie_value(&headers, "openvoice_session"), None);
        assert_eq!(cookie_value(&headers, "a"), Some("b"));
    }
}

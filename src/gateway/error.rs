use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use super::cors;
use super::token::TokenError;

/// Errors returned to proxy callers as plain text.
#[derive(Debug)]
pub enum GatewayError {
    MissingUrl,
    MissingAuth,
    Auth(TokenError),
    Config(String),
    Upstream(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingUrl => StatusCode::BAD_REQUEST,
            GatewayError::MissingAuth | GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Config(_) | GatewayError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::MissingUrl => write!(f, "Missing 'url' query parameter."),
            GatewayError::MissingAuth => {
                write!(f, "Unauthorized: Missing Authorization header.")
            }
            GatewayError::Auth(e) => write!(f, "Unauthorized: {}", e),
            GatewayError::Config(msg) => write!(f, "Server configuration error: {}", msg),
            GatewayError::Upstream(msg) => write!(f, "Proxy error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<TokenError> for GatewayError {
    fn from(e: TokenError) -> Self {
        GatewayError::Auth(e)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Upstream(e.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.to_string()).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        cors::apply(headers);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::MissingUrl.status(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::MissingAuth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::Auth(TokenError::Expired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::Config("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::Upstream("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            GatewayError::MissingUrl.to_string(),
            "Missing 'url' query parameter."
        );
        assert_eq!(
            GatewayError::Auth(TokenError::InvalidIssuer).to_string(),
            "Unauthorized: Invalid issuer"
        );
    }

    #[test]
    fn test_error_response_has_cors() {
        let response = GatewayError::MissingAuth.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use famgate_core::FilterLevel;
use serde::Deserialize;
use std::str::FromStr;
use url::Url;

use super::error::GatewayError;
use super::rewrite::rewrite_stream;
use super::token::bearer_token;
use super::{cors, AppState};

/// Accept header sent upstream, favoring HTML.
pub const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

pub const FILTER_LEVEL_HEADER: &str = "x-filter-level";

/// Upstream headers that describe the upstream connection, not the body.
static HOP_BY_HOP: [HeaderName; 5] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
];

#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    url: Option<String>,
}

/// `GET /proxy?url=...`
pub async fn proxy(
    State(state): State<AppState>,
    Query(params): Query<ProxyParams>,
    headers: HeaderMap,
) -> Response {
    match forward(&state, params, &headers).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Proxy request failed: {}", e);
            e.into_response()
        }
    }
}

/// `OPTIONS /proxy`
pub async fn preflight() -> Response {
    cors::preflight()
}

async fn forward(
    state: &AppState,
    params: ProxyParams,
    headers: &HeaderMap,
) -> Result<Response, GatewayError> {
    let raw_url = params
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or(GatewayError::MissingUrl)?;

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.trim().is_empty())
        .ok_or(GatewayError::MissingAuth)?;

    let validator = state
        .validator
        .as_ref()
        .ok_or_else(|| GatewayError::Config("project id is not configured".into()))?;
    let claims = validator.validate(bearer_token(authorization), Utc::now().timestamp())?;

    match headers
        .get(FILTER_LEVEL_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(FilterLevel::from_str)
    {
        Some(Ok(level)) => tracing::debug!("Filter level {} requested", level),
        Some(Err(e)) => tracing::debug!("Ignoring filter level header: {}", e),
        None => {}
    }

    let target = target_url(&raw_url)?;
    let upstream = state
        .client
        .get(target.clone())
        .header(header::USER_AGENT, state.config.user_agent.as_str())
        .header(header::ACCEPT, HTML_ACCEPT)
        .send()
        .await?;

    let status = upstream.status();
    let is_html = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|ct| ct.contains("text/html"));

    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        // Rewriting changes the length.
        if HOP_BY_HOP.contains(name) || (is_html && name == header::CONTENT_LENGTH) {
            continue;
        }
        response_headers.append(name.clone(), value.clone());
    }
    cors::apply(&mut response_headers);

    tracing::info!(
        "Proxying {} ({}) for {}",
        target,
        status,
        claims.sub.as_deref().unwrap_or("unknown subject")
    );

    let body = if is_html {
        Body::from_stream(rewrite_stream(upstream.bytes_stream(), target))
    } else {
        Body::from_stream(upstream.bytes_stream())
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// Parses the requested target, assuming `https` when no scheme is given.
pub fn target_url(raw: &str) -> Result<Url, GatewayError> {
    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!("https://{}", raw)
    };

    Url::parse(&candidate)
        .map_err(|e| GatewayError::Upstream(format!("invalid target URL '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::router;
    use axum::http::{Method, Request, StatusCode};
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde_json::json;
    use tower::ServiceExt;

    fn config(project_id: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            project_id: project_id.map(str::to_string),
            ..GatewayConfig::default()
        }
    }

    fn token(claims: serde_json::Value) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    async fn send(config: GatewayConfig, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let app = router(AppState::new(config));
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> axum::http::request::Builder {
        Request::builder().method(Method::GET).uri(uri)
    }

    #[tokio::test]
    async fn test_options_returns_cors_only() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/proxy")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(config(None), request).await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_missing_url() {
        let request = get("/proxy")
            .header(header::AUTHORIZATION, "Bearer a.b.c")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(config(Some("family-app")), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing 'url' query parameter.");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_missing_url_wins_over_missing_auth() {
        let request = get("/proxy?url=").body(Body::empty()).unwrap();
        let (status, _, _) = send(config(Some("family-app")), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_authorization() {
        let request = get("/proxy?url=example.com").body(Body::empty()).unwrap();
        let (status, _, body) = send(config(Some("family-app")), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Missing Authorization header."));
    }

    #[tokio::test]
    async fn test_missing_project_id_is_server_error() {
        let request = get("/proxy?url=example.com")
            .header(header::AUTHORIZATION, "Bearer a.b.c")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(config(None), request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("configuration"));
    }

    #[tokio::test]
    async fn test_malformed_token() {
        let request = get("/proxy?url=example.com")
            .header(header::AUTHORIZATION, "Bearer only.two")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(config(Some("family-app")), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Unauthorized: Invalid token format");
    }

    #[tokio::test]
    async fn test_expired_token() {
        let expired = token(json!({
            "exp": Utc::now().timestamp() - 10,
            "iss": "https://securetoken.google.com/family-app",
            "aud": "family-app",
        }));
        let request = get("/proxy?url=example.com")
            .header(header::AUTHORIZATION, format!("Bearer {}", expired))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(config(Some("family-app")), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.ends_with("Token expired"));
    }

    #[tokio::test]
    async fn test_wrong_audience() {
        let other = token(json!({
            "exp": Utc::now().timestamp() + 600,
            "iss": "https://securetoken.google.com/family-app",
            "aud": "other-app",
        }));
        let request = get("/proxy?url=example.com")
            .header(header::AUTHORIZATION, format!("Bearer {}", other))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(config(Some("family-app")), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.ends_with("Invalid audience"));
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = send(config(None), get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[test]
    fn test_target_url_defaults_to_https() {
        assert_eq!(
            target_url("example.com/page").unwrap().as_str(),
            "https://example.com/page"
        );
        assert_eq!(
            target_url("//example.com/a").unwrap().as_str(),
            "https://example.com/a"
        );
        assert_eq!(
            target_url("http://example.com/").unwrap().as_str(),
            "http://example.com/"
        );
        assert_eq!(
            target_url(" HTTPS://Example.com ").unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_target_url_invalid() {
        let err = target_url("http://[::1").unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
    }
}

//! Proxy gateway.
//!
//! Authenticates each request with a bearer token, fetches the target
//! page and streams it back with relative asset URLs rewritten. Requests
//! share no mutable state.

pub mod cors;
pub mod error;
pub mod handler;
pub mod rewrite;
pub mod token;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;

pub use error::GatewayError;
pub use token::{Claims, TokenError, TokenValidator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    /// `None` when no project id is configured.
    pub validator: Option<TokenValidator>,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let validator = config
            .project_id
            .as_deref()
            .map(|project_id| TokenValidator::new(project_id, &config.issuer_domain));
        Self {
            config: Arc::new(config),
            validator,
            client: reqwest::Client::new(),
        }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/proxy",
            get(handler::proxy).options(handler::preflight),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

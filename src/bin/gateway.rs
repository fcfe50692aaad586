//! FamGate Proxy Gateway
//!
//! Serves `/proxy?url=<target>` to approved family members. Each request
//! carries a bearer token whose claims are checked before the target is
//! fetched; HTML responses have relative asset URLs rewritten to point at
//! the target site.
//!
//! # Configuration
//!
//! Environment variables:
//! - `FAMGATE_PORT`: Port to listen on (default: 8787)
//! - `FAMGATE_PROJECT_ID`: Identity project tokens are issued for (required)
//! - `FAMGATE_ISSUER_DOMAIN`: Token issuer host (default: securetoken.google.com)
//! - `FAMGATE_USER_AGENT`: User agent for outbound fetches
//! - `FAMGATE_CONFIG`: Path to config file (default: ~/.config/famgate/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! port: 8787
//! project_id: "family-app"
//! issuer_domain: "securetoken.google.com"
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /proxy?url=...`: Proxied fetch (bearer token required)
//! - `OPTIONS /proxy`: CORS preflight

use clap::Parser;
use famgate::config::GatewayConfig;
use famgate::gateway::{router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "famgate-gateway")]
#[command(version)]
#[command(about = "FamGate proxy gateway")]
struct Cli {
    /// Path to config file
    #[arg(long, short, env = "FAMGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "famgate=info,famgate_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = GatewayConfig::load(cli.config)?;

    match config.project_id.as_deref() {
        Some(project_id) => tracing::info!("Accepting tokens for project {}", project_id),
        None => tracing::warn!("No project id configured - every proxy request will fail"),
    }
    tracing::warn!("Token signatures are not verified; only claims are checked");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(config));

    tracing::info!("Starting gateway on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

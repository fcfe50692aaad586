use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_ISSUER_DOMAIN: &str = "securetoken.google.com";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; FamGateProxy/1.0)";

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Port to listen on
    pub port: u16,
    /// Identity project the tokens are issued for. Required to serve
    /// proxy requests; absence is reported per request.
    pub project_id: Option<String>,
    /// Host part of the expected token issuer
    pub issuer_domain: String,
    /// User agent sent on outbound fetches
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            project_id: None,
            issuer_domain: DEFAULT_ISSUER_DOMAIN.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        if let Some(port) = std::env::var("FAMGATE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            config.port = port;
        }
        if let Ok(project_id) = std::env::var("FAMGATE_PROJECT_ID") {
            config.project_id = Some(project_id);
        }
        if let Ok(domain) = std::env::var("FAMGATE_ISSUER_DOMAIN") {
            config.issuer_domain = domain;
        }
        if let Ok(user_agent) = std::env::var("FAMGATE_USER_AGENT") {
            config.user_agent = user_agent;
        }

        // An empty project id is as good as none.
        config.project_id = config.project_id.filter(|p| !p.trim().is_empty());

        Ok(config)
    }

    /// Default config file path: <config_dir>/famgate/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("famgate")
            .join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

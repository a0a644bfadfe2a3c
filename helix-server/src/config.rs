//! Server-level startup configuration: environment variables plus an
//! optional YAML overlay, read once at startup (ambient stack, §9).

use helix_core::{HelixError, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout: Duration,
    pub cors_allow_any_origin: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080, request_timeout: Duration::from_secs(120), cors_allow_any_origin: false }
    }
}

impl ServerConfig {
    /// Reads `PORT` and then, if the `yaml-config` feature is enabled and
    /// `HELIX_CONFIG_FILE` names a readable file, overlays values from it —
    /// the same optional-overlay shape the teacher's `adk-server` carries
    /// under its `yaml-agent` feature.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("PORT") {
            config.port = port
                .parse()
                .map_err(|_| HelixError::ConfigInvalid(format!("PORT is not a valid port number: {port}")))?;
        }

        #[cfg(feature = "yaml-config")]
        {
            config = overlay_yaml(config)?;
        }

        Ok(config)
    }
}

#[cfg(feature = "yaml-config")]
fn overlay_yaml(mut config: ServerConfig) -> Result<ServerConfig> {
    let Ok(path) = std::env::var("HELIX_CONFIG_FILE") else {
        return Ok(config);
    };
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| HelixError::ConfigInvalid(format!("reading {path}: {e}")))?;
    let overlay: YamlOverlay =
        serde_yaml::from_str(&contents).map_err(|e| HelixError::ConfigInvalid(format!("parsing {path}: {e}")))?;

    if let Some(port) = overlay.port {
        config.port = port;
    }
    if let Some(secs) = overlay.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(cors) = overlay.cors_allow_any_origin {
        config.cors_allow_any_origin = cors;
    }
    Ok(config)
}

#[cfg(feature = "yaml-config")]
#[derive(Debug, serde::Deserialize, Default)]
struct YamlOverlay {
    port: Option<u16>,
    request_timeout_secs: Option<u64>,
    cors_allow_any_origin: Option<bool>,
}

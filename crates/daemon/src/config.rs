use anyhow::Context;
use serde::{Deserialize, Serialize};

use serial_link::LinkConfig;

/// Runtime configuration for the bridge daemon.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Serial device settings
    #[serde(default)]
    pub link: LinkConfig,
    /// Port for the realtime WebSocket feed
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    /// Port for the HTTP command/static surface
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Directory of static assets served at `/`
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    /// Fixed delay between reconnect attempts, in seconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_ws_port() -> u16 {
    8080
}

fn default_http_port() -> u16 {
    3000
}

fn default_static_dir() -> String {
    "static".to_string()
}

fn default_reconnect_delay() -> u64 {
    5
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            ws_port: default_ws_port(),
            http_port: default_http_port(),
            static_dir: default_static_dir(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

/// Load daemon configuration from `path`, falling back to defaults when
/// no file exists there.
pub fn load_config(path: &str) -> anyhow::Result<BridgeConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("could not parse configuration file at '{path}'"))?;
            tracing::info!("loaded configuration from {path}");
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("no configuration file at {path}, using defaults");
            Ok(BridgeConfig::default())
        }
        Err(e) => {
            Err(e).with_context(|| format!("could not read configuration file at '{path}'"))
        }
    }
}

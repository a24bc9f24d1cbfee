use serde::Deserialize;
use std::fs;
use tracing::info;

use gymshop_core::{Result, ShopError};

const CONFIG_PATH: &str = "config.toml";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 86_400;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: i64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_token_ttl() -> i64 {
    DEFAULT_TOKEN_TTL_SECONDS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        match fs::read_to_string(CONFIG_PATH) {
            Ok(content) => {
                let config: Config = toml::from_str(&content).map_err(|e| {
                    ShopError::InvalidInput(format!(
                        "Failed to parse config file '{CONFIG_PATH}': {e}"
                    ))
                })?;
                info!("Loaded configuration from {}", CONFIG_PATH);
                Ok(config)
            }
            Err(_) => Ok(Config::default()),
        }
    }
}

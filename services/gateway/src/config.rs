//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! API keys are loaded from the METAGEN_API_KEYS env var or api_keys_file,
//! never stored in the TOML directly to avoid leaking secrets. A config
//! without any keys is valid; requests then fail individually until keys
//! are provided.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Upstream generation API settings
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    pub endpoint_url: String,
    /// Request header carrying the API key.
    #[serde(default = "default_key_header")]
    pub key_header: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Key pool and retry settings
#[derive(Debug, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(skip)]
    pub api_keys: Option<Secret<String>>,
    /// Path to a file containing the raw key list (alternative to the
    /// METAGEN_API_KEYS env var). Keys are separated by newlines or commas.
    #[serde(default)]
    pub api_keys_file: Option<PathBuf>,
}

// Keeps a missing [dispatch] section and an empty one equivalent.
impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            api_keys: None,
            api_keys_file: None,
        }
    }
}

impl DispatchConfig {
    /// Raw key material for pool parsing; empty when no keys were provided.
    pub fn raw_keys(&self) -> &str {
        self.api_keys
            .as_ref()
            .map(|keys| keys.expose().as_str())
            .unwrap_or("")
    }
}

fn default_max_concurrency() -> usize {
    64
}

fn default_key_header() -> String {
    "x-goog-api-key".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// API key resolution order:
    /// 1. METAGEN_API_KEYS env var
    /// 2. api_keys_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        // Validate endpoint_url is a valid URL with http(s) scheme
        if !config.provider.endpoint_url.starts_with("http://")
            && !config.provider.endpoint_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "endpoint_url must start with http:// or https://, got: {}",
                config.provider.endpoint_url
            )));
        }

        // Validate timeout_secs is non-zero
        if config.provider.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        // Validate max_concurrency is non-zero
        if config.server.max_concurrency == 0 {
            return Err(common::Error::Config(
                "max_concurrency must be greater than 0".into(),
            ));
        }

        // Resolve API keys: env var takes precedence over file
        if let Ok(keys) = std::env::var("METAGEN_API_KEYS") {
            config.dispatch.api_keys = Some(Secret::new(keys));
        } else if let Some(ref keys_file) = config.dispatch.api_keys_file {
            let keys = std::fs::read_to_string(keys_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read api_keys_file {}: {e}",
                    keys_file.display()
                ))
            })?;
            let keys = keys.trim().to_owned();
            if !keys.is_empty() {
                config.dispatch.api_keys = Some(Secret::new(keys));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("metagen-gateway.toml")
    }
}

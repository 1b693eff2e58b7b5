use std::path::Path;
use serde::Deserialize;
use anyhow::{ensure, Context, Result};
use shared::protocol;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub advertise: AdvertiseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// DNS-SD type browsed and advertised
    #[serde(default = "default_service_type", rename = "type")]
    pub service_type: String,

    /// Bind mDNS to one interface instead of all
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvertiseConfig {
    /// Number of instances advertised at startup
    #[serde(default = "default_instances")]
    pub instances: usize,
}

fn default_service_type() -> String {
    protocol::PEER_SERVICE_TYPE.to_string()
}

fn default_instances() -> usize {
    10
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            interface: None,
        }
    }
}

impl Default for AdvertiseConfig {
    fn default() -> Self {
        Self {
            instances: default_instances(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents, path)
    }

    /// Like `load`, except a file that does not exist yields the built-in
    /// defaults. Any other failure, a malformed file included, is still an
    /// error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read config file: {}", path.display()))
            }
        }
    }

    fn parse(contents: &str, path: &Path) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        ensure!(
            protocol::is_valid_service_type(&config.service.service_type),
            "Invalid service type in config: {:?}",
            config.service.service_type
        );

        Ok(config)
    }
}

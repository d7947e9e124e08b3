//! Configuration file support
//!
//! Loads optional server and logging settings from a TOML file. Every key is
//! optional; command line flags and environment variables take precedence.

use serde::Deserialize;
use std::path::Path;

use crate::config::ConfigSources;
use crate::error::{KubaruError, Result};

/// Configuration file format
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Server settings
    pub server: ServerSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: Option<String>,
    /// Port to listen on
    pub port: Option<u16>,
    /// Directory to serve
    pub path: Option<String>,
    /// Username for basic auth
    pub user: Option<String>,
    /// Password for basic auth
    pub pass: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Filter directive used when RUST_LOG is not set (e.g. "info", "kubaru=debug")
    pub level: Option<String>,
    /// Output format
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            KubaruError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| KubaruError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Server settings as the lowest-precedence configuration layer
    pub fn sources(&self) -> ConfigSources {
        ConfigSources {
            user: self.server.user.clone(),
            pass: self.server.pass.clone(),
            host: self.server.host.clone(),
            port: self.server.port.map(|p| p.to_string()),
            path: self.server.path.clone(),
        }
    }
}

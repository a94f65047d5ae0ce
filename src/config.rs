//! Configuration for the partsbin server.
//!
//! Settings are read from `partsbin.toml` in the working directory and can
//! be overridden per-field by CLI flags. Every section and field is
//! optional.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! port = 8000
//! dev_mode = false
//!
//! [storage]
//! db_path = "partsbin.db"
//!
//! [logging]
//! filter = "partsbin=info,tower_http=warn"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::server::ServerConfig;

pub const CONFIG_FILE: &str = "partsbin.toml";

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Relaxed CORS for local frontend development.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            dev_mode: false,
        }
    }
}

/// Database location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("partsbin.db")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// An `EnvFilter` directive string. `RUST_LOG` takes precedence when
    /// set.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "partsbin=info,tower_http=warn".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

/// The complete partsbin.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartsbinToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl PartsbinToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse partsbin.toml")
    }

    /// Load from `dir/partsbin.toml`, or return defaults if the file
    /// doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize partsbin.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Resolve the runtime server settings, applying CLI overrides on top
    /// of the file.
    pub fn server_config(
        &self,
        port: Option<u16>,
        db_path: Option<PathBuf>,
        dev_mode: bool,
    ) -> ServerConfig {
        ServerConfig {
            port: port.unwrap_or(self.server.port),
            db_path: db_path.unwrap_or_else(|| self.storage.db_path.clone()),
            dev_mode: dev_mode || self.server.dev_mode,
        }
    }
}

//! migrt configuration.
//!
//! Looked up at `./migrt.toml`, then `<config dir>/migrt/config.toml`.
//!
//! ```toml
//! output_dir = "generated_code"
//! catalog_file = "file_index.json"
//! extension = "sql"
//! upload_dir = "uploads"
//!
//! [assist]
//! command = "llama-cli"
//! args = ["-m", "models/model.gguf"]
//! timeout_secs = 120
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MigrtError, MigrtResult};

/// Name of the project-local config file.
pub const LOCAL_CONFIG: &str = "migrt.toml";

/// Main configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where generated scripts and the catalog live
    pub output_dir: PathBuf,

    /// Catalog filename inside `output_dir`
    pub catalog_file: String,

    /// Script file extension
    pub extension: String,

    /// Where the sample mapping file is written
    pub upload_dir: PathBuf,

    /// External generation assist (optional)
    pub assist: Option<AssistConfig>,
}

/// Seconds an assist command may run before it is killed.
pub const DEFAULT_ASSIST_TIMEOUT_SECS: u64 = 120;

/// External assist command.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_assist_timeout")]
    pub timeout_secs: u64,
}

fn default_assist_timeout() -> u64 {
    DEFAULT_ASSIST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("generated_code"),
            catalog_file: "file_index.json".to_string(),
            extension: "sql".to_string(),
            upload_dir: PathBuf::from("uploads"),
            assist: None,
        }
    }
}

impl Config {
    /// Load from an explicit path, or the first config file found.
    pub fn load(path: Option<&Path>) -> MigrtResult<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let candidates = [
            Some(PathBuf::from(LOCAL_CONFIG)),
            dirs::config_dir().map(|d| d.join("migrt").join("config.toml")),
        ];
        for candidate in candidates.into_iter().flatten() {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> MigrtResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MigrtError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)
            .map_err(|e| MigrtError::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

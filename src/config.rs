use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to open config file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    /// Process exit code for a startup failure of this kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            ConfigError::Open { .. } => 1,
            ConfigError::Read { .. } => 2,
            ConfigError::Parse { .. } | ConfigError::Invalid { .. } => 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Discord bot token
    pub token: String,
    #[serde(default)]
    pub card_api: CardApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CardApiConfig {
    #[serde(default = "default_card_api_url")]
    pub base_url: String,
}

impl Default for CardApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_card_api_url(),
        }
    }
}

fn default_card_api_url() -> String {
    "https://arkhamdb.com".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut file = File::open(path).map_err(|source| ConfigError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config: Config = if is_toml {
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        // Fail at startup rather than on the first !card lookup
        config.card_api_url()?;

        Ok(config)
    }

    /// The card API base URL, parsed.
    pub fn card_api_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.card_api.base_url).map_err(|e| ConfigError::Invalid {
            field: "card_api.base_url",
            reason: e.to_string(),
        })?;

        if url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                field: "card_api.base_url",
                reason: format!("{} cannot carry a path", url),
            });
        }

        Ok(url)
    }
}

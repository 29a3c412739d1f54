use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::twitch::{Result, TwitchError, DEFAULT_AUTH_BASE_URL, DEFAULT_SCOPES, IRC_WS_URL};

const CONFIG_FILE: &str = "config.toml";
const CLIENT_ID_ENV: &str = "TWITCH_CLIENT_ID";

/// Settings for talking to Twitch
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TwitchSettings {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub auth_base_url: String,
    pub irc_url: String,
}

impl Default for TwitchSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            irc_url: IRC_WS_URL.to_string(),
        }
    }
}

/// Settings for the standalone runner
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    pub channel: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub twitch: TwitchSettings,
    pub runner: RunnerConfig,
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply environment overrides (`TWITCH_CLIENT_ID`)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(client_id) = std::env::var(CLIENT_ID_ENV) {
            if !client_id.is_empty() {
                self.twitch.client_id = client_id;
            }
        }
        self
    }
}

/// Default config location: `config.toml` at the project root
pub fn default_config_path() -> Result<PathBuf> {
    let project_root = project_root::get_project_root()
        .map_err(|e| TwitchError::ConfigError(format!("Cannot locate project root: {}", e)))?;
    Ok(project_root.join(CONFIG_FILE))
}

/// Load the config from `path`, or from the default location when `None`
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    if !config_path.exists() {
        log::warn!(
            "Config file not found at {}, using defaults",
            config_path.display()
        );
        return Ok(AppConfig::default().with_env_overrides());
    }

    log::info!("Loading config from {}", config_path.display());
    Ok(AppConfig::from_file(&config_path)?.with_env_overrides())
}

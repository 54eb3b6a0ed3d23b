use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::mode::ChatMode;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const SERVER_URL_ENV: &str = "MINDMATE_SERVER_URL";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub server_url: Option<String>,
    pub default_mode: Option<String>,
    pub session_id: Option<String>,
    /// Server that issued `session_id`
    pub session_server_url: Option<String>,
    /// Program and arguments that write a webm stream to stdout
    pub recorder_command: Option<Vec<String>>,
    /// Program and arguments; the audio file path is appended
    pub player_command: Option<Vec<String>>,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_session_id(server_url: &str, session_id: &str) -> Result<()> {
        Self::save_session_id_to(&Self::get_config_path()?, server_url, session_id)
    }

    /// Record the session a server issued. A file that fails to parse is left
    /// untouched and the error is returned.
    pub fn save_session_id_to(path: &Path, server_url: &str, session_id: &str) -> Result<()> {
        let mut config = Self::load_from(path)?;
        config.session_id = Some(session_id.to_string());
        config.session_server_url = Some(server_url.trim_end_matches('/').to_string());
        config.save_to(path)
    }

    /// Saved session id, only if it was issued by `server_url`
    pub fn session_for(&self, server_url: &str) -> Option<String> {
        let issued_by = self.session_server_url.as_deref()?;
        (issued_by.trim_end_matches('/') == server_url.trim_end_matches('/'))
            .then(|| self.session_id.clone())
            .flatten()
    }

    /// Server URL from the environment first, then the file, then the default
    pub fn resolved_server_url(&self) -> String {
        std::env::var(SERVER_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.server_url.clone())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn resolved_mode(&self) -> ChatMode {
        self.default_mode
            .as_deref()
            .and_then(ChatMode::from_str)
            .unwrap_or_default()
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("mindmate").join("config.json"))
    }
}

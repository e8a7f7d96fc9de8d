use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use anyhow::{anyhow, Result};

use crate::image::ImageSize;
use crate::state::AppMode;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_SEARCH_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub search_model: String,
    pub image_model: String,
    pub image_size: ImageSize,
    pub start_mode: AppMode,
    /// Where generated images are written (downloads dir when unset)
    pub image_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            search_model: DEFAULT_SEARCH_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            image_size: ImageSize::default(),
            start_mode: AppMode::default(),
            image_dir: None,
        }
    }

    pub fn load_from(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: impl Into<PathBuf>) -> Result<()> {
        let config_path = config_path.into();

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    /// Directory generated images are saved into
    pub fn resolved_image_dir(&self) -> PathBuf {
        self.image_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// `<config dir>/coki/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("coki").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"api_key":"abc","image_size":"4K"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.image_size, ImageSize::FourK);
        assert_eq!(config.search_model, DEFAULT_SEARCH_MODEL);
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coki").join("config.json");
        let mut config = Config::new();
        config.start_mode = AppMode::Chat;

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().start_mode, AppMode::Chat);
    }
}

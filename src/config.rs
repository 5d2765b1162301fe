use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000/chat";
const DEFAULT_STT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_STT_MODEL: &str = "whisper-large-v3-turbo";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Chat endpoint of the agent backend.
    pub backend_url: String,
    /// Played once at startup when set; a URL or a local file path.
    pub welcome_audio_url: Option<String>,
    pub playback_volume: f32,
    pub stt_base_url: String,
    pub stt_api_key: Option<String>,
    pub stt_model: String,
    pub stt_language: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            welcome_audio_url: None,
            playback_volume: 1.0,
            stt_base_url: DEFAULT_STT_BASE_URL.to_string(),
            stt_api_key: None,
            stt_model: DEFAULT_STT_MODEL.to_string(),
            stt_language: None,
        }
    }
}

impl Config {
    /// On first run the defaults are written out as an editable template;
    /// env fallbacks are applied to the returned value only, never saved.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            let defaults = Self::default();
            defaults.save()?;
            return Ok(defaults.with_env_fallback());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config.with_env_fallback())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    /// Environment variables fill in anything the file leaves empty.
    fn with_env_fallback(mut self) -> Self {
        if let Ok(url) = std::env::var("AGENTIVE_BACKEND_URL") {
            if !url.is_empty() {
                self.backend_url = url;
            }
        }
        if self.stt_api_key.as_deref().unwrap_or("").is_empty() {
            if let Ok(key) = std::env::var("GROQ_API_KEY") {
                if !key.is_empty() {
                    self.stt_api_key = Some(key);
                }
            }
        }
        self
    }

    /// The transcription key, if one is configured at all.
    pub fn stt_api_key(&self) -> Option<String> {
        self.stt_api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("agentive").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.stt_model, DEFAULT_STT_MODEL);
        assert!(config.stt_api_key().is_none());
        assert_eq!(config.playback_volume, 1.0);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"backend_url": "http://10.0.0.2:9000/chat"}"#).unwrap();
        assert_eq!(config.backend_url, "http://10.0.0.2:9000/chat");
        assert_eq!(config.stt_base_url, DEFAULT_STT_BASE_URL);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config: Config = serde_json::from_str(r#"{"stt_api_key": ""}"#).unwrap();
        assert!(config.stt_api_key().is_none());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.backend_url = "http://localhost:4242/chat".to_string();
        config.stt_language = Some("en".to_string());
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded: Config = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.backend_url, "http://localhost:4242/chat");
        assert_eq!(loaded.stt_language.as_deref(), Some("en"));
    }
}

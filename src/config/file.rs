//! Configuration file management for tessio.
//!
//! This module handles loading and saving application configuration from TOML files.
//! Configuration is stored in the user's config directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Playback volume (0-100)
    #[serde(default = "default_volume")]
    pub volume: u8,
}

fn default_volume() -> u8 {
    75
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
        }
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `tessio list-devices`
    /// - device name from `tessio list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Recording sample rate in Hz (16000 recommended for speech)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Assessment API configuration for response uploads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL of the assessment API, e.g. "https://api.example.com"
    #[serde(default)]
    pub api_base_url: String,
    /// Bearer token for the attempt, if the API requires one
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Candidate email sent with presign requests
    #[serde(default)]
    pub user_email: String,
    /// Attempt/session identifier used in upload-url paths
    #[serde(default)]
    pub session_id: String,
}

/// Timed-writing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritingConfig {
    /// Countdown applied to timed-writing questions that don't carry their own
    #[serde(default = "default_writing_secs")]
    pub default_duration_secs: u64,
}

fn default_writing_secs() -> u64 {
    420
}

impl Default for WritingConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: default_writing_secs(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TessioConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub writing: WritingConfig,
}

impl TessioConfig {
    /// Loads configuration from the user's config directory, falling back to
    /// defaults when no config file exists yet.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            tracing::debug!("No config file, using defaults");
            return Ok(Self::default());
        }
        let config_content = fs::read_to_string(&config_path)?;
        let config: TessioConfig = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Saves configuration to the user's config directory.
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = get_config_path()?;
        let config_content = toml::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        tracing::info!("Configuration saved");
        Ok(())
    }
}

/// Retrieves the path to the config file, creating the directory if needed.
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    let config_dir = home_dir.join(".config").join("tessio");
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("tessio.toml"))
}

/// Retrieves the state directory holding logs, creating it if needed.
///
/// Honors `XDG_STATE_HOME`, falling back to `~/.local/state/tessio`.
pub fn get_state_dir() -> anyhow::Result<PathBuf> {
    let state_dir = match std::env::var_os("XDG_STATE_HOME") {
        Some(xdg) => PathBuf::from(xdg).join("tessio"),
        None => {
            let home_dir = dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
            home_dir.join(".local").join("state").join("tessio")
        }
    };
    fs::create_dir_all(&state_dir)?;
    Ok(state_dir)
}

//! Configuration management for tessio.
//!
//! This module handles loading and saving application configuration from TOML
//! files in the user's config directory, plus the session-global playback
//! volume handle.

pub mod file;
pub mod volume;

pub use file::{
    get_config_path, get_state_dir, CaptureConfig, PlaybackConfig, TessioConfig, UploadConfig,
    WritingConfig,
};
pub use volume::VolumeHandle;

//! Persistent player configuration.
//!
//! Loaded from JSON, every field optional. Lookup order for the file:
//! CLI `--config` → `FLIPBOOK_CONFIG` env var → built-in defaults.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::bitmap_pool::ReuseRule;
use crate::core::player::PlaybackSettings;
use crate::entities::frame::PixelFormat;
use crate::entities::transform::ScaleMode;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "FLIPBOOK_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipbookConfig {
    /// Frame path template, e.g. `anim/frame_%03d.png`
    pub template: String,
    /// Explicit frame count; counted from the template folder when absent
    pub frame_count: Option<usize>,
    pub frame_duration_ms: u64,
    /// Minimum spacing between accepted drag samples
    pub speed_threshold_ms: u64,
    pub auto_play: bool,
    pub repeat: bool,
    pub play_enabled: bool,
    pub gesture_enabled: bool,
    pub scale_mode: ScaleMode,
    pub pixel_format: PixelFormat,
    /// Power-of-two decode subsampling (1 = full size)
    pub sample_size: u32,
    pub reuse_rule: ReuseRule,
}

impl Default for FlipbookConfig {
    fn default() -> Self {
        Self {
            template: String::new(),
            frame_count: None,
            frame_duration_ms: 20,
            speed_threshold_ms: 30,
            auto_play: true,
            repeat: true,
            play_enabled: true,
            gesture_enabled: true,
            scale_mode: ScaleMode::default(),
            pixel_format: PixelFormat::default(),
            sample_size: 1,
            reuse_rule: ReuseRule::default(),
        }
    }
}

impl FlipbookConfig {
    /// Resolve the config file path. Priority: CLI → `FLIPBOOK_CONFIG` → None
    pub fn locate(cli_path: Option<PathBuf>) -> Option<PathBuf> {
        cli_path.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
    }

    /// Load from `path` when given, otherwise defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_json_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Reject values the player cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.frame_duration_ms == 0 {
            bail!("frame_duration_ms must be positive");
        }
        if self.sample_size == 0 {
            bail!("sample_size must be at least 1");
        }
        Ok(())
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms)
    }

    pub fn speed_threshold(&self) -> Duration {
        Duration::from_millis(self.speed_threshold_ms)
    }

    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            auto_play: self.auto_play,
            repeat: self.repeat,
            frame_duration: self.frame_duration(),
            play_enabled: self.play_enabled,
            gesture_enabled: self.gesture_enabled,
        }
    }
}

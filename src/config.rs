use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// FFT window length, also the capture frame length
    #[serde(default = "default_window_len")]
    pub window_len: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Substring of the input device name; default device when unset
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_min_width")]
    pub min_width: usize,
    #[serde(default = "default_max_width")]
    pub max_width: usize,
    /// Leading columns dropped from every row
    #[serde(default = "default_trim")]
    pub trim: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            window_len: default_window_len(),
            overlap: default_overlap(),
            device: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            min_width: default_min_width(),
            max_width: default_max_width(),
            trim: default_trim(),
        }
    }
}

fn default_sample_rate() -> u32 { 16000 }
fn default_window_len() -> usize { 512 }
fn default_overlap() -> usize { 256 }
fn default_update_interval_ms() -> u64 { 50 }
fn default_min_width() -> usize { 12 }
fn default_max_width() -> usize { 256 }
fn default_trim() -> usize { 5 }

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;
        let display = &self.display;

        if audio.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if audio.window_len == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if audio.window_len <= audio.overlap {
            return Err(ConfigError::OverlapTooLarge {
                window: audio.window_len,
                overlap: audio.overlap,
            });
        }
        if display.max_width < display.min_width {
            return Err(ConfigError::WidthRange {
                min: display.min_width,
                max: display.max_width,
            });
        }
        if display.min_width <= display.trim {
            return Err(ConfigError::TrimTooLarge {
                min: display.min_width,
                trim: display.trim,
            });
        }
        if display.update_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    pub fn hop(&self) -> usize {
        self.audio.window_len - self.audio.overlap
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.display.update_interval_ms)
    }
}

/// Explicit path first, then `termgram.toml` in the working directory, then the
/// per-user config locations.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("termgram.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("termgram").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("termgram").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Option<Config> {
    toml::from_str(content).ok()
}

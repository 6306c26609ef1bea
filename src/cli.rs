use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "termgram", about = "Live microphone spectrum rendered as colored terminal rows")]
pub struct Cli {
    /// Config file (TOML). Defaults to ./termgram.toml or ~/.config/termgram/config.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input device name (substring match). Uses the default input device when omitted
    #[arg(short, long)]
    pub device: Option<String>,

    /// Minimum time between rendered rows, in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Upper bound on the rendered row width, in columns
    #[arg(long)]
    pub max_width: Option<usize>,

    /// Leading columns dropped from every row
    #[arg(long)]
    pub trim: Option<usize>,

    /// List available input devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

impl Cli {
    /// Command line values win over anything loaded from the config file.
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(ref device) = self.device {
            cfg.audio.device = Some(device.clone());
        }
        if let Some(ms) = self.interval_ms {
            cfg.display.update_interval_ms = ms;
        }
        if let Some(max_width) = self.max_width {
            cfg.display.max_width = max_width;
        }
        if let Some(trim) = self.trim {
            cfg.display.trim = trim;
        }
    }
}

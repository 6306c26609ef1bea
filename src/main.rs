mod audio;
mod cli;
mod config;
mod error;
mod render;
mod shutdown;
mod visualizer;

use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use audio::capture::{self, StreamHealth};
use cli::Cli;
use config::Config;
use render::terminal;
use visualizer::{CaptureLoop, Visualizer};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        let devices = capture::list_input_devices().context("Failed to enumerate input devices")?;
        println!("Input devices (* = default):");
        for line in &devices {
            println!("{}", line);
        }
        return Ok(());
    }

    let mut cfg = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}, using defaults", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };
    cli.apply(&mut cfg);
    cfg.validate().context("Invalid configuration")?;

    log::info!(
        "FFT window {} (overlap {}) @ {}Hz, row every {}ms, width {}-{} minus {}",
        cfg.audio.window_len,
        cfg.audio.overlap,
        cfg.audio.sample_rate,
        cfg.display.update_interval_ms,
        cfg.display.min_width,
        cfg.display.max_width,
        cfg.display.trim
    );

    shutdown::install_interrupt_handler();

    let health = Arc::new(StreamHealth::default());
    let (stream, frames) = capture::open_input_stream(&cfg.audio, Arc::clone(&health))
        .context("Failed to open audio input")?;

    let visualizer = Visualizer::new(&cfg, Instant::now());
    let mut capture_loop = CaptureLoop::new(visualizer, cfg.update_interval(), terminal::columns);

    let mut stdout = io::stdout().lock();
    capture_loop
        .run(stream, &frames, &health, shutdown::flag(), &mut stdout)
        .context("Audio capture stopped")
}

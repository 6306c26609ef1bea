use thiserror::Error;

/// Invalid fixed parameters, fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample rate must be > 0")]
    ZeroSampleRate,
    #[error("window length must be > 0")]
    ZeroWindow,
    #[error("window length ({window}) must be greater than overlap ({overlap})")]
    OverlapTooLarge { window: usize, overlap: usize },
    #[error("max width ({max}) must be >= min width ({min})")]
    WidthRange { min: usize, max: usize },
    #[error("min width ({min}) must be greater than trim offset ({trim})")]
    TrimTooLarge { min: usize, trim: usize },
    #[error("update interval must be > 0 ms")]
    ZeroInterval,
}

/// A frame the spectral processor refuses to analyze.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has {actual} samples, expected exactly {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FitError {
    #[error("terminal width {width} leaves no columns after trimming {trim}")]
    InsufficientWidth { width: usize, trim: usize },
}

/// Failures of the audio capture facility. All of these end the process.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("no default input device available")]
    NoDevice,
    #[error("no input device matching '{0}'")]
    DeviceNotFound(String),
    #[error("input device does not support {sample_rate} Hz capture")]
    UnsupportedConfig { sample_rate: u32 },
    #[error("failed to query input device: {0}")]
    Query(String),
    #[error("failed to build input stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("failed to start input stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("audio stream failed: {0}")]
    Fatal(String),
}

//! Microphone capture.
//!
//! The host delivers sample buffers of arbitrary size on its own callback
//! thread. They are re-chunked into exact analysis frames and pushed onto a
//! bounded channel consumed by the single processing loop. When that loop
//! falls behind, frames are dropped rather than queued; the drop count and any
//! non-fatal host errors ride along on the next frame's status.
//!
//! Nothing on the callback thread blocks: sample buffers are recycled through a
//! return channel once the loop is done with them, and shared state is only
//! touched through atomics or `try_lock`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};

use super::frame::{AudioFrame, FrameStatus};
use crate::config::AudioConfig;
use crate::error::StreamError;
use crate::visualizer::StreamHandle;

/// Frames buffered between the audio callback and the processing loop.
const FRAME_QUEUE_DEPTH: usize = 4;

/// Callback side of the frame queue.
pub struct FrameSender {
    frames: SyncSender<AudioFrame>,
    spare: Receiver<Vec<f32>>,
}

/// Loop side of the frame queue.
pub struct FrameReceiver {
    frames: Receiver<AudioFrame>,
    spare: SyncSender<Vec<f32>>,
}

/// A frame queue holding `depth` frames, plus a return path for their buffers
/// sized to cover every frame that can be in flight.
pub fn frame_channel(depth: usize) -> (FrameSender, FrameReceiver) {
    let (frames_tx, frames_rx) = mpsc::sync_channel(depth);
    let (spare_tx, spare_rx) = mpsc::sync_channel(depth + 2);
    (
        FrameSender {
            frames: frames_tx,
            spare: spare_rx,
        },
        FrameReceiver {
            frames: frames_rx,
            spare: spare_tx,
        },
    )
}

impl FrameSender {
    pub fn try_send(&self, frame: AudioFrame) -> Result<(), TrySendError<AudioFrame>> {
        self.frames.try_send(frame)
    }

    /// An empty buffer for the next frame, recycled when one is available.
    pub fn spare_buffer(&self, capacity: usize) -> Vec<f32> {
        match self.spare.try_recv() {
            Ok(mut buffer) => {
                buffer.clear();
                buffer
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Vec::with_capacity(capacity),
        }
    }
}

impl FrameReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<AudioFrame, RecvTimeoutError> {
        self.frames.recv_timeout(timeout)
    }

    /// Hands a processed frame's buffer back to the callback.
    pub fn recycle(&self, samples: Vec<f32>) {
        // Full or disconnected: the buffer is simply freed here.
        let _ = self.spare.try_send(samples);
    }
}

/// Collects interleaved samples into fixed-length mono frames, keeping channel 0.
pub struct FrameAssembler {
    frame_len: usize,
    channels: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_len: usize, channels: usize) -> Self {
        Self {
            frame_len,
            channels: channels.max(1),
            pending: Vec::with_capacity(frame_len),
        }
    }

    /// Calls `emit` once for every frame completed by `interleaved`; `emit`
    /// returns the buffer to fill next. Leftover samples wait for the next call.
    pub fn push<T, F>(&mut self, interleaved: &[T], mut emit: F)
    where
        T: Sample,
        f32: FromSample<T>,
        F: FnMut(Vec<f32>) -> Vec<f32>,
    {
        for sample_frame in interleaved.chunks(self.channels) {
            self.pending.push(f32::from_sample(sample_frame[0]));
            if self.pending.len() == self.frame_len {
                let frame = std::mem::take(&mut self.pending);
                self.pending = emit(frame);
                self.pending.clear();
            }
        }
    }
}

/// State shared between the host's callbacks and the processing loop.
#[derive(Debug, Default)]
pub struct StreamHealth {
    dropped: AtomicUsize,
    warnings: Mutex<Vec<String>>,
    fatal: Mutex<Option<String>>,
}

impl StreamHealth {
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Called from the error callback, never from the data callback.
    pub fn record_warning(&self, message: String) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(message);
        }
    }

    pub fn record_fatal(&self, message: String) {
        if let Ok(mut fatal) = self.fatal.lock() {
            fatal.get_or_insert(message);
        }
    }

    pub fn record_error(&self, err: cpal::StreamError) {
        match err {
            cpal::StreamError::DeviceNotAvailable => self.record_fatal(err.to_string()),
            other => self.record_warning(other.to_string()),
        }
    }

    /// Everything recorded since the last call. Warnings that are being
    /// written at this moment stay queued for the next frame.
    pub fn take_status(&self) -> FrameStatus {
        let backend_errors = self
            .warnings
            .try_lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default();
        FrameStatus {
            dropped_frames: self.dropped.swap(0, Ordering::Relaxed),
            backend_errors,
        }
    }

    /// Puts an undelivered status back so the next frame reports it.
    pub fn restore(&self, status: FrameStatus) {
        self.dropped.fetch_add(status.dropped_frames, Ordering::Relaxed);
        if !status.backend_errors.is_empty() {
            if let Ok(mut warnings) = self.warnings.try_lock() {
                let newer = std::mem::replace(&mut *warnings, status.backend_errors);
                warnings.extend(newer);
            }
        }
    }

    pub fn take_fatal(&self) -> Option<String> {
        self.fatal.lock().ok().and_then(|mut f| f.take())
    }
}

impl StreamHandle for cpal::Stream {
    fn close(self) {
        if let Err(err) = self.pause() {
            log::debug!("Pausing input stream failed: {}", err);
        }
        drop(self);
        log::debug!("Input stream closed");
    }
}

/// Opens and starts the capture stream. Frames arrive on the returned receiver
/// until the stream is dropped.
pub fn open_input_stream(
    cfg: &AudioConfig,
    health: Arc<StreamHealth>,
) -> Result<(cpal::Stream, FrameReceiver), StreamError> {
    let host = cpal::default_host();
    let device = select_device(&host, cfg.device.as_deref())?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let range = device
        .supported_input_configs()
        .map_err(|e| StreamError::Query(e.to_string()))?
        .filter(|r| {
            r.min_sample_rate().0 <= cfg.sample_rate && cfg.sample_rate <= r.max_sample_rate().0
        })
        .filter(|r| format_rank(r.sample_format()).is_some())
        .min_by_key(|r| (r.channels() != 1, format_rank(r.sample_format()), r.channels()))
        .ok_or(StreamError::UnsupportedConfig {
            sample_rate: cfg.sample_rate,
        })?;

    let supported = range.with_sample_rate(cpal::SampleRate(cfg.sample_rate));
    let sample_format = supported.sample_format();
    let block = cfg.window_len as u32;
    let buffer_size = match supported.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&block) => {
            cpal::BufferSize::Fixed(block)
        }
        _ => cpal::BufferSize::Default,
    };
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: cpal::SampleRate(cfg.sample_rate),
        buffer_size,
    };

    log::info!(
        "Input: {} @ {}Hz, {} channel(s), {:?}, buffer {:?}",
        name,
        cfg.sample_rate,
        config.channels,
        sample_format,
        config.buffer_size
    );

    let (tx, rx) = frame_channel(FRAME_QUEUE_DEPTH);
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, cfg.window_len, tx, health)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, cfg.window_len, tx, health)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, cfg.window_len, tx, health)?,
        _ => {
            return Err(StreamError::UnsupportedConfig {
                sample_rate: cfg.sample_rate,
            })
        }
    };
    stream.play()?;

    Ok((stream, rx))
}

/// One line per input device of the default host, default device marked.
pub fn list_input_devices() -> Result<Vec<String>, StreamError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let devices = host
        .input_devices()
        .map_err(|e| StreamError::Query(e.to_string()))?;

    let mut lines = Vec::new();
    for device in devices {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let marker = if default_name.as_deref() == Some(name.as_str()) { "*" } else { " " };
        let line = match device.default_input_config() {
            Ok(c) => format!(
                "{} {:<40} {}ch {}Hz {:?}",
                marker,
                name,
                c.channels(),
                c.sample_rate().0,
                c.sample_format()
            ),
            Err(err) => format!("{} {:<40} ({})", marker, name, err),
        };
        lines.push(line);
    }
    Ok(lines)
}

fn select_device(host: &cpal::Host, wanted: Option<&str>) -> Result<cpal::Device, StreamError> {
    let Some(wanted) = wanted else {
        return host.default_input_device().ok_or(StreamError::NoDevice);
    };
    host.input_devices()
        .map_err(|e| StreamError::Query(e.to_string()))?
        .find(|d| d.name().map(|n| n.contains(wanted)).unwrap_or(false))
        .ok_or_else(|| StreamError::DeviceNotFound(wanted.to_string()))
}

/// Preference order for sample formats; `None` for formats not handled.
fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    frame_len: usize,
    tx: FrameSender,
    health: Arc<StreamHealth>,
) -> Result<cpal::Stream, StreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut assembler = FrameAssembler::new(frame_len, config.channels as usize);
    let data_health = Arc::clone(&health);

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            assembler.push(data, |samples| {
                let frame = AudioFrame {
                    samples,
                    status: data_health.take_status(),
                };
                match tx.try_send(frame) {
                    Ok(()) => tx.spare_buffer(frame_len),
                    Err(TrySendError::Full(frame)) => {
                        data_health.restore(frame.status);
                        data_health.record_drop();
                        frame.samples
                    }
                    // The loop has stopped; nothing to report to.
                    Err(TrySendError::Disconnected(frame)) => frame.samples,
                }
            });
        },
        move |err| health.record_error(err),
        None,
    )?;
    Ok(stream)
}

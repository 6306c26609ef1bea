//! The capture loop: drains frames from the audio channel, rate-limits
//! rendering, and runs spectrum -> fit -> row for the frames it keeps.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use crate::audio::capture::{FrameReceiver, StreamHealth};
use crate::audio::frame::AudioFrame;
use crate::audio::spectrum::SpectralProcessor;
use crate::config::Config;
use crate::error::StreamError;
use crate::render::{fit, row};

pub const START_MESSAGE: &str = "Press Ctrl+C to stop.";
pub const STOP_MESSAGE: &str = "Stopped.";

/// An open capture stream, from the loop's point of view.
pub trait StreamHandle {
    /// Stops delivery and releases the underlying device.
    fn close(self);
}

/// Remembers when the last row was rendered.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_render: Instant,
}

impl RateLimiter {
    /// `start` counts as a render, so the first row appears one interval later.
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last_render: start,
        }
    }

    pub fn ready(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_render) >= self.interval
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_render = now;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered,
    /// Arrived before the update interval elapsed; discarded.
    RateLimited,
    /// Per-frame error; logged and discarded.
    Skipped,
}

pub struct Visualizer {
    processor: SpectralProcessor,
    limiter: RateLimiter,
    min_width: usize,
    max_width: usize,
    trim: usize,
}

impl Visualizer {
    pub fn new(cfg: &Config, start: Instant) -> Self {
        Self {
            processor: SpectralProcessor::new(
                cfg.audio.sample_rate,
                cfg.audio.window_len,
                cfg.hop(),
            ),
            limiter: RateLimiter::new(cfg.update_interval(), start),
            min_width: cfg.display.min_width,
            max_width: cfg.display.max_width,
            trim: cfg.display.trim,
        }
    }

    /// Handles one delivered frame. Only a failed terminal write is an error.
    pub fn on_frame<W: Write>(
        &mut self,
        frame: &AudioFrame,
        now: Instant,
        columns: usize,
        out: &mut W,
    ) -> io::Result<FrameOutcome> {
        if !frame.status.is_clean() {
            log::warn!("Input status: {}", frame.status);
        }
        if !self.limiter.ready(now) {
            return Ok(FrameOutcome::RateLimited);
        }
        let outcome = self.render(frame, columns, out)?;
        self.limiter.mark(now);
        Ok(outcome)
    }

    fn render<W: Write>(
        &self,
        frame: &AudioFrame,
        columns: usize,
        out: &mut W,
    ) -> io::Result<FrameOutcome> {
        let profile = match self.processor.process(&frame.samples) {
            Ok(profile) => profile,
            Err(err) => {
                log::warn!("Skipping frame: {}", err);
                return Ok(FrameOutcome::Skipped);
            }
        };

        let width = fit::clamp_width(columns, self.min_width, self.max_width);
        let fitted = match fit::fit_row(&profile, width, self.trim) {
            Ok(fitted) => fitted,
            Err(err) => {
                log::warn!("Skipping frame: {}", err);
                return Ok(FrameOutcome::Skipped);
            }
        };

        row::write_row(out, &fitted)?;
        Ok(FrameOutcome::Rendered)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Streaming,
    Stopped,
}

pub struct CaptureLoop<C> {
    visualizer: Visualizer,
    columns: C,
    poll: Duration,
    state: CaptureState,
}

impl<C: FnMut() -> usize> CaptureLoop<C> {
    /// `columns` queries the terminal width before each render; `poll` bounds
    /// how long a cancellation can go unnoticed while no frames arrive.
    pub fn new(visualizer: Visualizer, poll: Duration, columns: C) -> Self {
        Self {
            visualizer,
            columns,
            poll,
            state: CaptureState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Runs until `shutdown` is set (clean stop) or the stream fails. The
    /// stream is closed on every exit path before this returns.
    pub fn run<S, W>(
        &mut self,
        stream: S,
        frames: &FrameReceiver,
        health: &StreamHealth,
        shutdown: &AtomicBool,
        out: &mut W,
    ) -> Result<(), StreamError>
    where
        S: StreamHandle,
        W: Write,
    {
        self.state = CaptureState::Streaming;
        let result = announce(out, START_MESSAGE)
            .and_then(|()| self.stream_frames(frames, health, shutdown, out));
        stream.close();
        self.state = CaptureState::Stopped;

        result?;
        announce(out, STOP_MESSAGE)
    }

    fn stream_frames<W: Write>(
        &mut self,
        frames: &FrameReceiver,
        health: &StreamHealth,
        shutdown: &AtomicBool,
        out: &mut W,
    ) -> Result<(), StreamError> {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                log::debug!("Interrupt received");
                return Ok(());
            }
            if let Some(reason) = health.take_fatal() {
                return Err(StreamError::Fatal(reason));
            }

            match frames.recv_timeout(self.poll) {
                Ok(frame) => {
                    let columns = (self.columns)();
                    self.visualizer
                        .on_frame(&frame, Instant::now(), columns, out)
                        .map_err(terminal_failed)?;
                    frames.recycle(frame.samples);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(StreamError::Fatal("audio stream closed unexpectedly".into()));
                }
            }
        }
    }
}

fn announce<W: Write>(out: &mut W, message: &str) -> Result<(), StreamError> {
    writeln!(out, "{}", message)
        .and_then(|()| out.flush())
        .map_err(terminal_failed)
}

fn terminal_failed(err: io::Error) -> StreamError {
    StreamError::Fatal(format!("terminal write failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::frame_channel;
    use crate::render::palette::RESET;
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_millis(50);

    struct FakeStream(Arc<AtomicBool>);

    impl StreamHandle for FakeStream {
        fn close(self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn visualizer(start: Instant) -> Visualizer {
        Visualizer::new(&Config::default(), start)
    }

    fn capture_loop(start: Instant) -> CaptureLoop<impl FnMut() -> usize> {
        CaptureLoop::new(visualizer(start), Duration::from_millis(5), || 80)
    }

    fn sine_frame(freq: f32) -> AudioFrame {
        AudioFrame::new(
            (0..512)
                .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / 16000.0).sin())
                .collect(),
        )
    }

    fn rows(output: &[u8]) -> Vec<String> {
        String::from_utf8(output.to_vec())
            .unwrap()
            .lines()
            .filter(|l| l.contains(RESET))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn limiter_waits_one_interval_from_start() {
        let start = Instant::now();
        let limiter = RateLimiter::new(INTERVAL, start);
        assert!(!limiter.ready(start));
        assert!(!limiter.ready(start + Duration::from_millis(49)));
        assert!(limiter.ready(start + INTERVAL));
    }

    #[test]
    fn frames_closer_than_interval_are_discarded() {
        let start = Instant::now();
        let mut viz = visualizer(start);
        let mut out = Vec::new();
        let mut rendered_at = Vec::new();

        for k in 1..=50u64 {
            let now = start + Duration::from_millis(20 * k);
            match viz.on_frame(&sine_frame(1000.0), now, 80, &mut out).unwrap() {
                FrameOutcome::Rendered => rendered_at.push(now),
                FrameOutcome::RateLimited => {}
                FrameOutcome::Skipped => panic!("frame skipped"),
            }
        }

        // renders at 60, 120, ..., 960 ms
        assert_eq!(rendered_at.len(), 16);
        for pair in rendered_at.windows(2) {
            assert!(pair[1] - pair[0] >= INTERVAL);
        }
        assert_eq!(rows(&out).len(), 16);
    }

    #[test]
    fn silent_frame_renders_lowest_level_row() {
        let start = Instant::now();
        let mut viz = visualizer(start);
        let mut out = Vec::new();
        let outcome = viz
            .on_frame(&AudioFrame::new(vec![0.0; 512]), start + INTERVAL, 3, &mut out)
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Rendered);
        let expected = format!("{}\n", "\x1b[35m \x1b[0m".repeat(7));
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn wide_terminal_is_clamped() {
        let start = Instant::now();
        let mut viz = visualizer(start);
        let mut out = Vec::new();
        viz.on_frame(&sine_frame(440.0), start + INTERVAL, 1000, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches(RESET).count(), 251);
    }

    #[test]
    fn undersized_frame_is_skipped_not_fatal() {
        let start = Instant::now();
        let mut viz = visualizer(start);
        let mut out = Vec::new();
        let outcome = viz
            .on_frame(&AudioFrame::new(vec![0.1; 100]), start + INTERVAL, 80, &mut out)
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert!(out.is_empty());

        let next = viz
            .on_frame(&sine_frame(1000.0), start + INTERVAL * 2, 80, &mut out)
            .unwrap();
        assert_eq!(next, FrameOutcome::Rendered);
    }

    #[test]
    fn insufficient_width_is_skipped_not_fatal() {
        let mut cfg = Config::default();
        cfg.display.min_width = 4;
        cfg.display.trim = 5;
        let start = Instant::now();
        let mut viz = Visualizer::new(&cfg, start);
        let mut out = Vec::new();
        let outcome = viz.on_frame(&sine_frame(1000.0), start + INTERVAL, 3, &mut out).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert!(out.is_empty());
    }

    #[test]
    fn frame_status_does_not_block_rendering() {
        let start = Instant::now();
        let mut viz = visualizer(start);
        let mut frame = sine_frame(1000.0);
        frame.status.dropped_frames = 3;
        let mut out = Vec::new();
        let outcome = viz.on_frame(&frame, start + INTERVAL, 80, &mut out).unwrap();
        assert_eq!(outcome, FrameOutcome::Rendered);
    }

    #[test]
    fn cancellation_closes_stream_and_reports_stop() {
        let (_tx, rx) = frame_channel(4);
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = AtomicBool::new(true);
        let health = StreamHealth::default();
        let mut capture = capture_loop(Instant::now());
        assert_eq!(capture.state(), CaptureState::Idle);

        let mut out = Vec::new();
        let stream = FakeStream(Arc::clone(&closed));
        let result = capture.run(stream, &rx, &health, &shutdown, &mut out);

        assert!(result.is_ok());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(capture.state(), CaptureState::Stopped);
        assert_eq!(String::from_utf8(out).unwrap(), "Press Ctrl+C to stop.\nStopped.\n");
    }

    #[test]
    fn fatal_stream_error_ends_loop_with_error() {
        let (_tx, rx) = frame_channel(4);
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = AtomicBool::new(false);
        let health = StreamHealth::default();
        health.record_fatal("device unplugged".into());
        let mut capture = capture_loop(Instant::now());

        let mut out = Vec::new();
        let stream = FakeStream(Arc::clone(&closed));
        let result = capture.run(stream, &rx, &health, &shutdown, &mut out);

        assert!(matches!(result, Err(StreamError::Fatal(ref m)) if m == "device unplugged"));
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(capture.state(), CaptureState::Stopped);
        assert!(!String::from_utf8(out).unwrap().contains(STOP_MESSAGE));
    }

    #[test]
    fn queued_frames_are_rate_limited_then_disconnect_is_fatal() {
        let (tx, rx) = frame_channel(4);
        for _ in 0..3 {
            tx.try_send(sine_frame(1000.0)).unwrap();
        }
        drop(tx);

        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = AtomicBool::new(false);
        let health = StreamHealth::default();
        let start = Instant::now() - Duration::from_secs(1);
        let mut capture = capture_loop(start);

        let mut out = Vec::new();
        let stream = FakeStream(Arc::clone(&closed));
        let result = capture.run(stream, &rx, &health, &shutdown, &mut out);

        assert!(matches!(result, Err(StreamError::Fatal(_))));
        assert!(closed.load(Ordering::SeqCst));
        // three frames back to back: only the first is rendered
        assert_eq!(rows(&out).len(), 1);
    }

    #[test]
    fn processed_frames_hand_their_buffers_back() {
        let (tx, rx) = frame_channel(4);
        let frame = sine_frame(1000.0);
        let buffer = frame.samples.as_ptr();
        tx.try_send(frame).unwrap();

        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = AtomicBool::new(false);
        let health = StreamHealth::default();
        let start = Instant::now() - Duration::from_secs(1);
        // stop right after the first frame
        let columns = || {
            shutdown.store(true, Ordering::SeqCst);
            80
        };
        let mut capture = CaptureLoop::new(visualizer(start), Duration::from_millis(5), columns);

        let mut out = Vec::new();
        let stream = FakeStream(Arc::clone(&closed));
        let result = capture.run(stream, &rx, &health, &shutdown, &mut out);

        assert!(result.is_ok());
        assert_eq!(rows(&out).len(), 1);
        let reused = tx.spare_buffer(512);
        assert!(reused.is_empty());
        assert_eq!(reused.as_ptr(), buffer);
    }
}

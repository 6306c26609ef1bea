use std::fmt;

/// Non-fatal conditions reported alongside a frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStatus {
    /// Frames discarded because the processing queue was full
    pub dropped_frames: usize,
    /// Backend errors the host reported since the previous frame
    pub backend_errors: Vec<String>,
}

impl FrameStatus {
    pub fn is_clean(&self) -> bool {
        self.dropped_frames == 0 && self.backend_errors.is_empty()
    }
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.dropped_frames > 0 {
            parts.push(format!("input overflow ({} frames dropped)", self.dropped_frames));
        }
        parts.extend(self.backend_errors.iter().cloned());
        write!(f, "{}", parts.join("; "))
    }
}

/// One window of mono samples, as delivered to the processing loop.
#[derive(Clone, Debug)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub status: FrameStatus,
}

#[cfg(test)]
impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            status: FrameStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_message_lists_every_condition() {
        let status = FrameStatus {
            dropped_frames: 2,
            backend_errors: vec!["xrun".into()],
        };
        assert!(!status.is_clean());
        assert_eq!(status.to_string(), "input overflow (2 frames dropped); xrun");
        assert!(FrameStatus::default().is_clean());
    }
}

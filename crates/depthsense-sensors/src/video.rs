//! Video frame source shared (read-only) by the active backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use depthsense_types::SensorError;

/// One RGB24 video frame.
///
/// The pixel buffer is reference-counted so handing a frame to several
/// models in the same cycle does not copy it.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Presentation time of the frame in milliseconds.
    pub timestamp_ms: u64,
    pub data: Arc<[u8]>,
}

impl VideoFrame {
    /// Wrap an RGB24 buffer, checking its length against the dimensions.
    pub fn new(width: u32, height: u32, timestamp_ms: u64, data: Vec<u8>) -> Result<Self, SensorError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(SensorError::ProcessingError(format!(
                "video frame holds {} bytes, expected {expected} for {width}x{height} RGB24",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            timestamp_ms,
            data: data.into(),
        })
    }

    /// Frame area in pixels.
    pub fn area(&self) -> f32 {
        self.width as f32 * self.height as f32
    }
}

/// A live camera stream, polled once per processing cycle.
///
/// Implemented by the application layer; the sensing stack never writes to
/// it.
pub trait VideoSource: Send + Sync {
    /// Stable identifier, e.g. `"user-camera"`.
    fn id(&self) -> &str;

    /// The most recent frame, or `None` while the stream is not yet ready.
    fn latest_frame(&self) -> Option<VideoFrame>;
}

/// Hands out each source frame at most once, based on its timestamp.
#[derive(Debug)]
pub struct FrameCursor {
    last_timestamp: AtomicU64,
}

impl FrameCursor {
    pub fn new() -> Self {
        Self {
            last_timestamp: AtomicU64::new(u64::MAX),
        }
    }

    /// Return the latest frame when it differs from the last one taken.
    pub fn take_fresh(&self, source: &dyn VideoSource) -> Option<VideoFrame> {
        let frame = source.latest_frame()?;
        let prev = self.last_timestamp.swap(frame.timestamp_ms, Ordering::AcqRel);
        (prev != frame.timestamp_ms).then_some(frame)
    }
}

impl Default for FrameCursor {
    fn default() -> Self {
        Self::new()
    }
}

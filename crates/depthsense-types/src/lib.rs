//! Shared domain types for the depthsense obstacle-sensing stack.
//!
//! Every backend, the sensing manager and the rendering-side geometry helpers
//! speak in terms of the types defined here:
//!
//! - [`ObstacleZone`] – a normalised screen-space rectangle with optional
//!   metric depth.
//! - [`DepthFrame`] – a raw per-pixel depth payload, produced only by the
//!   depth-session and monocular paths.
//! - [`SensingMode`] – which backend, if any, is running.
//! - [`SensorError`] – the error taxonomy surfaced to callers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Depth (metres) a consumer should assume for zones without an estimate.
pub const DEFAULT_OBSTACLE_DEPTH: f32 = 2.5;

/// Callback receiving the obstacle list of one processed frame.
pub type ObstacleCallback = Arc<dyn Fn(Vec<ObstacleZone>) + Send + Sync>;

/// Callback receiving the raw depth frame of one processed frame.
pub type DepthFrameCallback = Arc<dyn Fn(&DepthFrame) + Send + Sync>;

// ────────────────────────────────────────────────────────────────────────────
// ObstacleZone
// ────────────────────────────────────────────────────────────────────────────

/// Coarse classification of a detected obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Hand,
    Person,
    Object,
}

impl ZoneKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ZoneKind::Hand => "hand",
            ZoneKind::Person => "person",
            ZoneKind::Object => "object",
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected physical obstacle in normalised screen space.
///
/// `x`, `y` is the top-left corner; all four rectangle fields lie in `[0, 1]`
/// and the far edges never exceed 1.  Zones only live for one callback
/// invocation, so `id` is unique within a batch and nothing more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleZone {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Estimated distance from the camera in metres, always `> 0` when set.
    pub depth: Option<f32>,
    #[serde(rename = "type")]
    pub kind: ZoneKind,
    /// Fine-grained class name; equals the kind's name when the source model
    /// does not classify further.
    pub label: String,
    pub confidence: Option<f32>,
}

impl ObstacleZone {
    /// Build a zone from an unclipped rectangle.
    ///
    /// The rectangle is clipped to the unit square.  Returns `None` when the
    /// clipped rectangle has no area.
    pub fn new(
        id: impl Into<String>,
        kind: ZoneKind,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Option<Self> {
        Self::from_bounds(id, kind, x, y, x + width, y + height)
    }

    /// Build a zone from `[x_min, y_min, x_max, y_max]` bounds, clipping to
    /// the unit square.
    pub fn from_bounds(
        id: impl Into<String>,
        kind: ZoneKind,
        x_min: f32,
        y_min: f32,
        x_max: f32,
        y_max: f32,
    ) -> Option<Self> {
        if !(x_min.is_finite() && y_min.is_finite() && x_max.is_finite() && y_max.is_finite()) {
            return None;
        }
        let x0 = x_min.clamp(0.0, 1.0);
        let y0 = y_min.clamp(0.0, 1.0);
        let x1 = x_max.clamp(0.0, 1.0);
        let y1 = y_max.clamp(0.0, 1.0);
        if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
            return None;
        }
        Some(Self {
            id: id.into(),
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
            depth: None,
            kind,
            label: kind.as_str().to_string(),
            confidence: None,
        })
    }

    /// Attach a depth estimate.  Non-positive or non-finite values are
    /// discarded.
    pub fn with_depth(mut self, depth: Option<f32>) -> Self {
        self.depth = depth.filter(|d| d.is_finite() && *d > 0.0);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Attach a confidence score, clamped to `[0, 1]`.
    pub fn with_confidence(mut self, confidence: Option<f32>) -> Self {
        self.confidence = confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0));
        self
    }

    /// Depth estimate, or `default` when the backend could not estimate one.
    pub fn depth_or(&self, default: f32) -> f32 {
        self.depth.unwrap_or(default)
    }

    /// Centre of the rectangle in normalised screen space.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// `true` when `(px, py)` lies inside the rectangle grown by `padding` on
    /// every side.
    pub fn contains_padded(&self, px: f32, py: f32, padding: f32) -> bool {
        px >= self.x - padding
            && px <= self.x + self.width + padding
            && py >= self.y - padding
            && py <= self.y + self.height + padding
    }
}

/// The obstacle list of one processed frame, as fanned out to stream
/// subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleBatch {
    /// Monotonic per-manager sequence number.
    pub sequence: u64,
    pub mode: SensingMode,
    pub timestamp: DateTime<Utc>,
    pub zones: Vec<ObstacleZone>,
}

// ────────────────────────────────────────────────────────────────────────────
// DepthFrame
// ────────────────────────────────────────────────────────────────────────────

/// Encoding of the samples inside a [`DepthFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DepthFormat {
    /// Floating-point samples; `raw * raw_to_meters` is metres.
    Float32 { raw_to_meters: f32 },
    /// 16-bit samples (luminance-alpha packing); `raw * raw_to_meters` is
    /// metres.
    Uint16 { raw_to_meters: f32 },
    /// Relative inverse depth normalised to 0–255; higher is closer.  Has no
    /// metric scale.
    InverseRelative8,
}

/// Typed sample buffer, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum DepthSamples {
    F32(Vec<f32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
}

impl DepthSamples {
    pub fn len(&self) -> usize {
        match self {
            DepthSamples::F32(v) => v.len(),
            DepthSamples::U16(v) => v.len(),
            DepthSamples::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw per-pixel depth payload.  Ephemeral: consumed within the cycle that
/// produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    pub format: DepthFormat,
    pub samples: DepthSamples,
}

impl DepthFrame {
    /// Build a frame, checking that the buffer matches the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        format: DepthFormat,
        samples: DepthSamples,
    ) -> Result<Self, SensorError> {
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(SensorError::ProcessingError(format!(
                "depth buffer holds {} samples, expected {width}x{height}={expected}",
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            samples,
        })
    }

    /// Raw sample at pixel `(x, y)`, or `None` outside the frame.
    pub fn raw_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.width as usize + x as usize;
        match &self.samples {
            DepthSamples::F32(v) => v.get(idx).copied(),
            DepthSamples::U16(v) => v.get(idx).map(|s| *s as f32),
            DepthSamples::U8(v) => v.get(idx).map(|s| *s as f32),
        }
    }

    /// Metric depth at pixel `(x, y)`.  `None` outside the frame or when the
    /// format carries no metric scale.
    pub fn meters_at(&self, x: u32, y: u32) -> Option<f32> {
        let raw = self.raw_at(x, y)?;
        match self.format {
            DepthFormat::Float32 { raw_to_meters } | DepthFormat::Uint16 { raw_to_meters } => {
                Some(raw * raw_to_meters)
            }
            DepthFormat::InverseRelative8 => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SensingMode
// ────────────────────────────────────────────────────────────────────────────

/// The backend strategies the sensing manager can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensingMode {
    #[default]
    None,
    /// Landmark-based hand tracking.
    Hands,
    /// Platform AR session streaming a depth buffer.
    DepthSession,
    /// Hands + faces + generic objects fused per frame.
    MultiModel,
    /// Monocular depth-network inference.
    Monocular,
}

impl SensingMode {
    /// Every backend-carrying mode, excluding [`SensingMode::None`].
    pub const BACKENDS: [SensingMode; 4] = [
        SensingMode::Hands,
        SensingMode::DepthSession,
        SensingMode::MultiModel,
        SensingMode::Monocular,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SensingMode::None => "none",
            SensingMode::Hands => "hands",
            SensingMode::DepthSession => "depth-session",
            SensingMode::MultiModel => "multi-model",
            SensingMode::Monocular => "monocular",
        }
    }
}

impl fmt::Display for SensingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "none" | "off" => Ok(SensingMode::None),
            "hands" | "hand" => Ok(SensingMode::Hands),
            "depth-session" | "depth" | "xr" => Ok(SensingMode::DepthSession),
            "multi-model" | "multi" => Ok(SensingMode::MultiModel),
            "monocular" | "mono" => Ok(SensingMode::Monocular),
            other => Err(format!("unknown sensing mode '{other}'")),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error taxonomy for the sensing subsystem.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SensorError {
    /// Model or session unreachable/rejected after every fallback was tried.
    #[error("Initialization of {backend} failed: {cause}")]
    InitializationFailed { backend: String, cause: String },

    /// A single frame's inference failed.  Logged and skipped, never fatal.
    #[error("Frame processing error: {0}")]
    ProcessingError(String),

    /// The capability probe determined the backend cannot run here.
    #[error("{mode} is not supported on this platform: {reason}")]
    UnsupportedPlatform { mode: SensingMode, reason: String },
}

impl SensorError {
    pub fn init(backend: impl Into<String>, cause: impl fmt::Display) -> Self {
        SensorError::InitializationFailed {
            backend: backend.into(),
            cause: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_is_clipped_to_unit_square() {
        let z = ObstacleZone::new("z", ZoneKind::Hand, -0.1, 0.9, 0.3, 0.3).unwrap();
        assert_eq!(z.x, 0.0);
        assert!((z.width - 0.2).abs() < 1e-6);
        assert!((z.y - 0.9).abs() < 1e-6);
        assert!((z.y + z.height - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zone_outside_frame_is_rejected() {
        assert!(ObstacleZone::new("z", ZoneKind::Object, 1.2, 0.2, 0.1, 0.1).is_none());
        assert!(ObstacleZone::new("z", ZoneKind::Object, 0.2, 0.2, 0.0, 0.1).is_none());
        assert!(ObstacleZone::new("z", ZoneKind::Object, f32::NAN, 0.2, 0.1, 0.1).is_none());
    }

    #[test]
    fn non_positive_depth_is_dropped() {
        let z = ObstacleZone::new("z", ZoneKind::Object, 0.1, 0.1, 0.2, 0.2)
            .unwrap()
            .with_depth(Some(0.0));
        assert_eq!(z.depth, None);
        assert!((z.depth_or(DEFAULT_OBSTACLE_DEPTH) - 2.5).abs() < f32::EPSILON);
    }

    #[test]
    fn label_defaults_to_kind() {
        let z = ObstacleZone::new("z", ZoneKind::Person, 0.1, 0.1, 0.2, 0.2).unwrap();
        assert_eq!(z.label, "person");
        let z = z.with_label("chair");
        assert_eq!(z.label, "chair");
    }

    #[test]
    fn confidence_is_clamped() {
        let z = ObstacleZone::new("z", ZoneKind::Object, 0.1, 0.1, 0.2, 0.2)
            .unwrap()
            .with_confidence(Some(1.4));
        assert_eq!(z.confidence, Some(1.0));
    }

    #[test]
    fn zone_serializes_kind_as_type() {
        let z = ObstacleZone::new("hand-0", ZoneKind::Hand, 0.1, 0.1, 0.2, 0.2).unwrap();
        let json = serde_json::to_value(&z).unwrap();
        assert_eq!(json["type"], "hand");
    }

    #[test]
    fn depth_frame_rejects_mismatched_buffer() {
        let err = DepthFrame::new(
            4,
            4,
            DepthFormat::Float32 { raw_to_meters: 1.0 },
            DepthSamples::F32(vec![0.0; 15]),
        );
        assert!(matches!(err, Err(SensorError::ProcessingError(_))));
    }

    #[test]
    fn depth_frame_scales_uint16_samples() {
        let frame = DepthFrame::new(
            2,
            1,
            DepthFormat::Uint16 { raw_to_meters: 0.001 },
            DepthSamples::U16(vec![1500, 250]),
        )
        .unwrap();
        assert!((frame.meters_at(0, 0).unwrap() - 1.5).abs() < 1e-6);
        assert!((frame.meters_at(1, 0).unwrap() - 0.25).abs() < 1e-6);
        assert_eq!(frame.meters_at(2, 0), None);
    }

    #[test]
    fn relative_frame_has_no_metric_scale() {
        let frame = DepthFrame::new(
            1,
            1,
            DepthFormat::InverseRelative8,
            DepthSamples::U8(vec![200]),
        )
        .unwrap();
        assert_eq!(frame.meters_at(0, 0), None);
        assert_eq!(frame.raw_at(0, 0), Some(200.0));
    }

    #[test]
    fn sensing_mode_parses_and_displays() {
        for mode in SensingMode::BACKENDS {
            assert_eq!(mode.to_string().parse::<SensingMode>().unwrap(), mode);
        }
        assert_eq!("None".parse::<SensingMode>().unwrap(), SensingMode::None);
        assert!("lidar".parse::<SensingMode>().is_err());
    }

    #[test]
    fn sensor_error_display() {
        let err = SensorError::init("hands", "all sources exhausted");
        assert!(err.to_string().contains("hands"));
        let err = SensorError::UnsupportedPlatform {
            mode: SensingMode::DepthSession,
            reason: "no AR runtime".into(),
        };
        assert!(err.to_string().contains("depth-session"));
    }
}

//! Per-backend tuning.
//!
//! Every struct deserialises from TOML with all fields optional; missing
//! fields fall back to the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::AssetSource;

fn default_load_timeout_ms() -> u64 {
    10_000
}

fn default_padding() -> f32 {
    0.05
}

fn default_max_hands() -> usize {
    2
}

fn default_hand_sources() -> Vec<AssetSource> {
    vec![
        AssetSource::new(
            "gcs",
            "https://storage.googleapis.com/mediapipe-models/hand_landmarker/hand_landmarker/float16/1/hand_landmarker.task",
        ),
        AssetSource::new(
            "jsdelivr",
            "https://cdn.jsdelivr.net/npm/@mediapipe/tasks-vision/models/hand_landmarker.task",
        ),
        AssetSource::new("local", "models/hand_landmarker.task"),
    ]
}

fn default_face_sources() -> Vec<AssetSource> {
    vec![
        AssetSource::new(
            "gcs",
            "https://storage.googleapis.com/mediapipe-models/face_detector/blaze_face_short_range/float16/1/blaze_face_short_range.tflite",
        ),
        AssetSource::new("local", "models/blaze_face_short_range.tflite"),
    ]
}

fn default_object_sources() -> Vec<AssetSource> {
    vec![
        AssetSource::new(
            "gcs",
            "https://storage.googleapis.com/mediapipe-models/object_detector/efficientdet_lite0/int8/1/efficientdet_lite0.tflite",
        ),
        AssetSource::new("local", "models/efficientdet_lite0.tflite"),
    ]
}

fn default_depth_network_sources() -> Vec<AssetSource> {
    vec![
        AssetSource::new("hub", "https://huggingface.co/Intel/dpt-hybrid-midas/resolve/main/midas_small.onnx"),
        AssetSource::new("local", "models/midas_small.onnx"),
    ]
}

/// Landmark Hand Sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandSensorConfig {
    pub max_hands: usize,
    /// Box padding as a fraction of the frame.
    pub padding: f32,
    pub frame_interval_ms: u64,
    pub load_timeout_ms: u64,
    pub sources: Vec<AssetSource>,
}

impl Default for HandSensorConfig {
    fn default() -> Self {
        Self {
            max_hands: default_max_hands(),
            padding: default_padding(),
            frame_interval_ms: 33,
            load_timeout_ms: default_load_timeout_ms(),
            sources: default_hand_sources(),
        }
    }
}

impl HandSensorConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

/// Platform Depth-Session Sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthSessionConfig {
    /// Cells per side of the sampling grid.
    pub grid_size: u32,
    /// A cell is occupied when its depth lies strictly inside
    /// `(near_m, far_m)`.
    pub near_m: f32,
    pub far_m: f32,
    /// Zones whose centres lie closer than this (normalised units) merge.
    pub merge_distance: f32,
    pub confidence: f32,
    pub frame_interval_ms: u64,
    pub session_timeout_ms: u64,
}

impl Default for DepthSessionConfig {
    fn default() -> Self {
        Self {
            grid_size: 10,
            near_m: 0.1,
            far_m: 2.0,
            merge_distance: 0.15,
            confidence: 0.8,
            frame_interval_ms: 33,
            session_timeout_ms: default_load_timeout_ms(),
        }
    }
}

impl DepthSessionConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

/// Multi-Model Sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiModelConfig {
    pub max_hands: usize,
    pub padding: f32,
    /// ≈ 15 fps.
    pub frame_interval_ms: u64,
    /// `depth ≈ k / face_width_px`; a 15 cm face seen through a ~600 px
    /// focal length gives k = 90.
    pub face_depth_constant: f32,
    pub face_min_depth_m: f32,
    pub face_max_depth_m: f32,
    pub load_timeout_ms: u64,
    pub hand_sources: Vec<AssetSource>,
    pub face_sources: Vec<AssetSource>,
    pub object_sources: Vec<AssetSource>,
}

impl Default for MultiModelConfig {
    fn default() -> Self {
        Self {
            max_hands: default_max_hands(),
            padding: default_padding(),
            frame_interval_ms: 66,
            face_depth_constant: 90.0,
            face_min_depth_m: 0.3,
            face_max_depth_m: 3.0,
            load_timeout_ms: default_load_timeout_ms(),
            hand_sources: default_hand_sources(),
            face_sources: default_face_sources(),
            object_sources: default_object_sources(),
        }
    }
}

impl MultiModelConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

/// Monocular Depth-Network Sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonocularConfig {
    pub grid_size: u32,
    /// Sample points per cell along each axis.
    pub samples_per_axis: u32,
    /// Metres the full 0–255 output range is mapped onto.
    pub max_range_m: f32,
    /// Cells nearer than this become zones.
    pub near_threshold_m: f32,
    /// ≈ 2 fps.
    pub frame_interval_ms: u64,
    pub load_timeout_ms: u64,
    pub sources: Vec<AssetSource>,
}

impl Default for MonocularConfig {
    fn default() -> Self {
        Self {
            grid_size: 8,
            samples_per_axis: 4,
            max_range_m: 5.0,
            near_threshold_m: 2.0,
            frame_interval_ms: 500,
            load_timeout_ms: default_load_timeout_ms(),
            sources: default_depth_network_sources(),
        }
    }
}

impl MonocularConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

/// All backend settings, as stored under `[sensors]` in the config file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    pub hands: HandSensorConfig,
    pub depth_session: DepthSessionConfig,
    pub multi_model: MultiModelConfig,
    pub monocular: MonocularConfig,
    /// Upper bound on how long `stop` waits for an in-flight cycle.
    pub teardown_grace_ms: u64,
}

impl SensorSettings {
    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(if self.teardown_grace_ms == 0 {
            2_000
        } else {
            self.teardown_grace_ms
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadence() {
        let s = SensorSettings::default();
        assert_eq!(s.multi_model.frame_interval(), Duration::from_millis(66));
        assert_eq!(s.monocular.frame_interval(), Duration::from_millis(500));
        assert_eq!(s.depth_session.grid_size, 10);
        assert_eq!(s.monocular.grid_size, 8);
        assert_eq!(s.teardown_grace(), Duration::from_secs(2));
        assert!(!s.hands.sources.is_empty());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg = HandSensorConfig {
            frame_interval_ms: 0,
            ..HandSensorConfig::default()
        };
        assert_eq!(cfg.frame_interval(), Duration::from_millis(1));
    }
}

//! Inference-model and AR-session seams.
//!
//! Each backend drives one or more of these traits.  Concrete runtimes
//! (ONNX, vendor SDKs, platform AR) implement them outside this crate; the
//! [`sim`][crate::sim] module ships deterministic in-process stand-ins.
//!
//! Models are obtained through a [`ModelLoader`] from an [`AssetSource`],
//! which lets the backends retry an ordered list of sources (see
//! [`assets`][crate::assets]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use depthsense_types::{DepthFrame, SensorError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::video::VideoFrame;

/// Failures reported by models, loaders and AR sessions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("asset unreachable: {0}")]
    Unreachable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("rejected by runtime: {0}")]
    Rejected(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl From<ModelError> for SensorError {
    fn from(err: ModelError) -> Self {
        SensorError::ProcessingError(err.to_string())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Assets
// ────────────────────────────────────────────────────────────────────────────

/// One place a model asset can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSource {
    /// Short name used in logs, e.g. `"cdn"`.
    pub name: String,
    pub uri: String,
}

impl AssetSource {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
        }
    }
}

/// Loads a model of type `M` from an [`AssetSource`].
#[async_trait]
pub trait ModelLoader<M: ?Sized + Send + Sync>: Send + Sync {
    /// Fetch and fully initialise the model.
    async fn load(&self, source: &AssetSource) -> Result<Arc<M>, ModelError>;

    /// Cheap reachability check that does not keep any model resident.
    async fn probe(&self, source: &AssetSource) -> Result<(), ModelError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Detection payloads
// ────────────────────────────────────────────────────────────────────────────

/// A hand/face keypoint.
///
/// Image landmarks carry normalised `x`, `y` in `[0, 1]` and a relative `z`;
/// world landmarks are metric, relative to the model's local origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// One hand found by a [`HandLandmarker`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandDetection {
    /// Normalised image-space landmarks (21 for the usual hand topology).
    pub landmarks: Vec<Landmark>,
    /// Metric landmarks, when the model provides them.
    pub world_landmarks: Option<Vec<Landmark>>,
    /// Hand-presence score.
    pub score: Option<f32>,
}

/// Axis-aligned box in source-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    pub bbox: PixelBox,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDetection {
    pub bbox: PixelBox,
    /// Class name as emitted by the detector, e.g. `"cup"`.
    pub class: String,
    pub score: f32,
}

/// Network input: HWC RGB, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

/// Raw network output: one relative inverse-depth value per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

// ────────────────────────────────────────────────────────────────────────────
// Model traits
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait HandLandmarker: Send + Sync {
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<HandDetection>, ModelError>;

    /// Release runtime resources.  Further `detect` calls may fail.
    fn close(&self);
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<FaceDetection>, ModelError>;

    fn close(&self);
}

#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<ObjectDetection>, ModelError>;

    fn close(&self);
}

#[async_trait]
pub trait DepthNetwork: Send + Sync {
    /// Fixed `(width, height)` the network expects.
    fn input_size(&self) -> (u32, u32);

    async fn predict(&self, input: &InputTensor) -> Result<DepthMap, ModelError>;

    fn close(&self);
}

// ────────────────────────────────────────────────────────────────────────────
// AR depth session
// ────────────────────────────────────────────────────────────────────────────

/// Features that can be requested from the platform AR runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionFeature {
    HitTest,
    Anchors,
    PlaneDetection,
    DepthSensing,
}

/// The feature set asked for when opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub features: Vec<SessionFeature>,
}

impl SessionRequest {
    /// Everything, including depth streaming.
    pub fn full() -> Self {
        Self {
            features: vec![
                SessionFeature::HitTest,
                SessionFeature::Anchors,
                SessionFeature::PlaneDetection,
                SessionFeature::DepthSensing,
            ],
        }
    }

    /// Baseline AR without depth streaming.
    pub fn baseline() -> Self {
        Self {
            features: vec![SessionFeature::HitTest, SessionFeature::Anchors],
        }
    }

    pub fn wants_depth(&self) -> bool {
        self.features.contains(&SessionFeature::DepthSensing)
    }
}

/// Entry point into the platform AR runtime.
#[async_trait]
pub trait DepthSessionProvider: Send + Sync {
    /// Whether an immersive AR session can be created at all.
    async fn is_supported(&self) -> bool;

    async fn request_session(&self, request: &SessionRequest) -> Result<Arc<dyn DepthSession>, ModelError>;
}

/// A running AR session.
#[async_trait]
pub trait DepthSession: Send + Sync {
    /// Whether depth streaming was granted.
    fn depth_enabled(&self) -> bool;

    /// Depth information for the next session frame; `Ok(None)` when the
    /// frame carried none.
    async fn next_depth_frame(&self) -> Result<Option<DepthFrame>, ModelError>;

    /// Terminate the session and release its resources.
    async fn end(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_request_drops_depth() {
        assert!(SessionRequest::full().wants_depth());
        assert!(!SessionRequest::baseline().wants_depth());
    }

    #[test]
    fn model_error_maps_to_processing_error() {
        let err: SensorError = ModelError::Inference("nan output".into()).into();
        assert!(matches!(err, SensorError::ProcessingError(m) if m.contains("nan output")));
    }

    #[test]
    fn pixel_box_area_ignores_negative_extent() {
        assert_eq!(PixelBox::new(0.0, 0.0, -2.0, 3.0).area(), 0.0);
        assert_eq!(PixelBox::new(0.0, 0.0, 2.0, 3.0).area(), 6.0);
    }
}

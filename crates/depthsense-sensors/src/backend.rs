//! The contract every obstacle-sensing backend implements.

use std::sync::Arc;

use async_trait::async_trait;
use depthsense_types::{DepthFrameCallback, ObstacleCallback, SensingMode, SensorError};

use crate::video::VideoSource;

/// A strategy that turns a camera (or AR session) into obstacle zones.
///
/// Lifecycle: construct, [`initialize`](SensorBackend::initialize) once,
/// [`stop`](SensorBackend::stop) when done.  Between the two the backend
/// runs its own per-frame loop and calls `on_obstacles` once per processed
/// frame, possibly with an empty list.
#[async_trait]
pub trait SensorBackend: Send + Sync {
    /// The mode this backend implements.
    fn mode(&self) -> SensingMode;

    /// Acquire models/sessions and start the frame loop.
    ///
    /// A second call on an already running backend is a logged no-op.
    ///
    /// # Errors
    ///
    /// [`SensorError::InitializationFailed`] when a required model or
    /// session could not be obtained from any configured source.  Whatever
    /// was acquired before the failure stays owned by the backend until
    /// [`stop`](SensorBackend::stop) releases it.
    async fn initialize(
        &mut self,
        video: Arc<dyn VideoSource>,
        on_obstacles: ObstacleCallback,
        on_depth: Option<DepthFrameCallback>,
    ) -> Result<(), SensorError>;

    /// Stop the loop, wait for the in-flight cycle and release every held
    /// resource.  Safe to call at any time, including after a failed or
    /// partial `initialize`, and more than once.
    async fn stop(&mut self);
}

//! Landmark Hand Sensor.
//!
//! Runs a hand-landmark model on every fresh camera frame and reports one
//! [`ZoneKind::Hand`][depthsense_types::ZoneKind::Hand] zone per detected
//! hand (see [`landmarks::hand_zones`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use depthsense_types::{DepthFrameCallback, ObstacleCallback, SensingMode, SensorError};
use futures_util::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assets::load_model;
use crate::backend::SensorBackend;
use crate::config::HandSensorConfig;
use crate::frame_loop::FrameLoop;
use crate::landmarks;
use crate::model::{HandLandmarker, ModelLoader};
use crate::video::{FrameCursor, VideoSource};

pub struct HandSensor {
    config: HandSensorConfig,
    loader: Arc<dyn ModelLoader<dyn HandLandmarker>>,
    grace: Duration,
    instance: Uuid,
    model: Option<Arc<dyn HandLandmarker>>,
    frame_loop: Option<FrameLoop>,
}

impl HandSensor {
    pub fn new(
        config: HandSensorConfig,
        loader: Arc<dyn ModelLoader<dyn HandLandmarker>>,
        grace: Duration,
    ) -> Self {
        Self {
            config,
            loader,
            grace,
            instance: Uuid::new_v4(),
            model: None,
            frame_loop: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.frame_loop.is_some()
    }
}

#[async_trait]
impl SensorBackend for HandSensor {
    fn mode(&self) -> SensingMode {
        SensingMode::Hands
    }

    async fn initialize(
        &mut self,
        video: Arc<dyn VideoSource>,
        on_obstacles: ObstacleCallback,
        _on_depth: Option<DepthFrameCallback>,
    ) -> Result<(), SensorError> {
        if self.frame_loop.is_some() {
            warn!(instance = %self.instance, "hand sensor already initialised; ignoring");
            return Ok(());
        }

        let model = load_model(
            "hand-landmarker",
            self.loader.as_ref(),
            &self.config.sources,
            self.config.load_timeout(),
        )
        .await?;
        self.model = Some(Arc::clone(&model));

        let cursor = Arc::new(FrameCursor::new());
        let max_hands = self.config.max_hands;
        let padding = self.config.padding;
        let instance = self.instance;
        let video_id = video.id().to_string();

        self.frame_loop = Some(FrameLoop::spawn("hands", self.config.frame_interval(), move |state| {
            let model = Arc::clone(&model);
            let video = Arc::clone(&video);
            let cursor = Arc::clone(&cursor);
            let on_obstacles = Arc::clone(&on_obstacles);
            async move {
                let Some(frame) = cursor.take_fresh(video.as_ref()) else {
                    return;
                };
                match model.detect(&frame).await {
                    Ok(hands) => {
                        let zones = landmarks::hand_zones(&hands, max_hands, padding);
                        debug!(%instance, zones = zones.len(), "hand frame processed");
                        state.emit(zones, |zones| on_obstacles(zones));
                    }
                    Err(e) => warn!(%instance, error = %e, "hand inference failed; frame skipped"),
                }
            }
            .boxed()
        }));

        info!(instance = %self.instance, video = %video_id, "hand sensor started");
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.stop(self.grace).await;
        }
        if let Some(model) = self.model.take() {
            model.close();
            info!(instance = %self.instance, "hand sensor stopped");
        }
    }
}

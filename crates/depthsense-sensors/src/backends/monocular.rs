//! Monocular Depth-Network Sensor.
//!
//! Every cycle resizes the current frame to the network's input size, runs a
//! relative depth network and rescales the output to 0–255 (higher is
//! closer).  An 8×8 grid is then sampled sparsely; cells whose estimated
//! distance falls below the near threshold become [`ZoneKind::Object`]
//! zones.  The normalised map is also forwarded to the depth-frame callback.
//!
//! This is the most expensive backend, hence the slow default cadence.  All
//! per-frame buffers are dropped before the cycle ends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use depthsense_types::{
    DepthFormat, DepthFrame, DepthFrameCallback, DepthSamples, ObstacleCallback, ObstacleZone, SensingMode,
    SensorError, ZoneKind,
};
use futures_util::FutureExt;
use image::RgbImage;
use image::imageops::{self, FilterType};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assets::load_model;
use crate::backend::SensorBackend;
use crate::config::MonocularConfig;
use crate::frame_loop::FrameLoop;
use crate::model::{DepthMap, DepthNetwork, InputTensor, ModelLoader};
use crate::video::{FrameCursor, VideoFrame, VideoSource};

const MIN_ZONE_DEPTH: f32 = 0.05;

pub struct MonocularSensor {
    config: MonocularConfig,
    loader: Arc<dyn ModelLoader<dyn DepthNetwork>>,
    grace: Duration,
    instance: Uuid,
    network: Option<Arc<dyn DepthNetwork>>,
    frame_loop: Option<FrameLoop>,
}

impl MonocularSensor {
    pub fn new(config: MonocularConfig, loader: Arc<dyn ModelLoader<dyn DepthNetwork>>, grace: Duration) -> Self {
        Self {
            config,
            loader,
            grace,
            instance: Uuid::new_v4(),
            network: None,
            frame_loop: None,
        }
    }
}

#[async_trait]
impl SensorBackend for MonocularSensor {
    fn mode(&self) -> SensingMode {
        SensingMode::Monocular
    }

    async fn initialize(
        &mut self,
        video: Arc<dyn VideoSource>,
        on_obstacles: ObstacleCallback,
        on_depth: Option<DepthFrameCallback>,
    ) -> Result<(), SensorError> {
        if self.frame_loop.is_some() {
            warn!(instance = %self.instance, "monocular sensor already initialised; ignoring");
            return Ok(());
        }

        let network = load_model(
            "depth-network",
            self.loader.as_ref(),
            &self.config.sources,
            self.config.load_timeout(),
        )
        .await?;
        self.network = Some(Arc::clone(&network));

        let cursor = Arc::new(FrameCursor::new());
        let config = Arc::new(self.config.clone());
        let instance = self.instance;

        self.frame_loop = Some(FrameLoop::spawn("monocular", self.config.frame_interval(), move |state| {
            let network = Arc::clone(&network);
            let video = Arc::clone(&video);
            let cursor = Arc::clone(&cursor);
            let on_obstacles = Arc::clone(&on_obstacles);
            let on_depth = on_depth.clone();
            let config = Arc::clone(&config);
            async move {
                let Some(frame) = cursor.take_fresh(video.as_ref()) else {
                    return;
                };
                let (width, height) = network.input_size();
                let input = match preprocess(&frame, width, height) {
                    Ok(input) => input,
                    Err(e) => {
                        warn!(%instance, error = %e, "frame preprocessing failed; skipped");
                        return;
                    }
                };
                drop(frame);

                let raw = network.predict(&input).await;
                drop(input);
                let map = match raw {
                    Ok(map) => map,
                    Err(e) => {
                        warn!(%instance, error = %e, "depth inference failed; frame skipped");
                        return;
                    }
                };

                let Some(normalized) = normalize_depth_map(&map) else {
                    debug!(%instance, "flat depth output; no obstacles");
                    state.emit(Vec::new(), |zones| on_obstacles(zones));
                    return;
                };
                let (map_w, map_h) = (map.width, map.height);
                drop(map);

                let zones = zones_from_inverse_depth(&normalized, map_w, map_h, &config);
                if let Some(on_depth) = &on_depth {
                    match DepthFrame::new(map_w, map_h, DepthFormat::InverseRelative8, DepthSamples::U8(normalized)) {
                        Ok(depth) => {
                            state.emit(&depth, |d| on_depth(d));
                        }
                        Err(e) => warn!(%instance, error = %e, "depth map has inconsistent size"),
                    }
                }
                debug!(%instance, zones = zones.len(), "monocular frame processed");
                state.emit(zones, |zones| on_obstacles(zones));
            }
            .boxed()
        }));

        info!(instance = %self.instance, "monocular sensor started");
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.stop(self.grace).await;
        }
        if let Some(network) = self.network.take() {
            network.close();
            info!(instance = %self.instance, "monocular sensor stopped");
        }
    }
}

/// Resize to the network input and scale channels to `[0, 1]`.
pub fn preprocess(frame: &VideoFrame, width: u32, height: u32) -> Result<InputTensor, SensorError> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec()).ok_or_else(|| {
        SensorError::ProcessingError(format!(
            "frame buffer does not match {}x{} RGB24",
            frame.width, frame.height
        ))
    })?;
    let resized = imageops::resize(&image, width, height, FilterType::Triangle);
    let data = resized.as_raw().iter().map(|v| *v as f32 / 255.0).collect();
    Ok(InputTensor { width, height, data })
}

/// Rescale raw network output to 0–255.
///
/// `None` when the map is empty or flat, which carries no relative depth
/// information.
pub fn normalize_depth_map(map: &DepthMap) -> Option<Vec<u8>> {
    let (min, max) = map
        .data
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return None;
    }
    Some(
        map.data
            .iter()
            .map(|v| {
                if v.is_finite() {
                    ((v - min) / range * 255.0).round() as u8
                } else {
                    0
                }
            })
            .collect(),
    )
}

/// Grid-sample a 0–255 inverse-depth map into near-obstacle zones, ids
/// `mono-0`, `mono-1`, …
pub fn zones_from_inverse_depth(
    values: &[u8],
    width: u32,
    height: u32,
    config: &MonocularConfig,
) -> Vec<ObstacleZone> {
    if width == 0 || height == 0 || values.len() < width as usize * height as usize {
        return Vec::new();
    }
    let n = config.grid_size.max(1);
    let s = config.samples_per_axis.max(1);
    let cell = 1.0 / n as f32;
    let (cell_w, cell_h) = (width as f32 / n as f32, height as f32 / n as f32);
    let mut zones = Vec::new();

    for row in 0..n {
        for col in 0..n {
            let mut sum = 0u32;
            for sy in 0..s {
                for sx in 0..s {
                    let px = (col as f32 * cell_w + (sx as f32 + 0.5) * cell_w / s as f32) as u32;
                    let py = (row as f32 * cell_h + (sy as f32 + 0.5) * cell_h / s as f32) as u32;
                    let idx = py.min(height - 1) as usize * width as usize + px.min(width - 1) as usize;
                    sum += values[idx] as u32;
                }
            }
            let avg = sum as f32 / (s * s) as f32;
            let depth = (255.0 - avg) / 255.0 * config.max_range_m;
            if depth < config.near_threshold_m {
                let confidence = (config.near_threshold_m - depth) / config.near_threshold_m;
                let zone = ObstacleZone::new(
                    format!("mono-{}", zones.len()),
                    ZoneKind::Object,
                    col as f32 * cell,
                    row as f32 * cell,
                    cell,
                    cell,
                );
                zones.extend(
                    zone.map(|z| z.with_depth(Some(depth.max(MIN_ZONE_DEPTH))).with_confidence(Some(confidence))),
                );
            }
        }
    }
    zones
}

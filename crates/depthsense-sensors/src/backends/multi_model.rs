//! Multi-Model Sensor.
//!
//! Hands, faces and generic objects are detected concurrently on each fresh
//! frame and fused into one obstacle list.  Each detector has its own depth
//! heuristic:
//!
//! | source | kind | depth |
//! |---|---|---|
//! | hand landmarks | `hand` | mean metric landmark distance, else none |
//! | face box | `person` | `k / face_width_px`, clamped |
//! | object box | `person` for class `person`, else `object` | banded by on-screen area |
//!
//! If any of the three detectors fails on a frame, that frame is skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use depthsense_types::{
    DepthFrameCallback, ObstacleCallback, ObstacleZone, SensingMode, SensorError, ZoneKind,
};
use futures_util::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assets::load_model;
use crate::backend::SensorBackend;
use crate::config::MultiModelConfig;
use crate::frame_loop::FrameLoop;
use crate::landmarks;
use crate::model::{
    FaceDetection, FaceDetector, HandDetection, HandLandmarker, ModelLoader, ObjectDetection, ObjectDetector,
};
use crate::video::{FrameCursor, VideoSource};

/// Relative-area bands, largest first: `(min fraction of frame, metres)`.
const AREA_DEPTH_BANDS: [(f32, f32); 3] = [(0.30, 0.5), (0.10, 1.0), (0.05, 1.5)];
const FAR_OBJECT_DEPTH: f32 = 2.5;

/// The three models, once loaded.
#[derive(Clone)]
struct Models {
    hands: Arc<dyn HandLandmarker>,
    faces: Arc<dyn FaceDetector>,
    objects: Arc<dyn ObjectDetector>,
}

pub struct MultiModelSensor {
    config: MultiModelConfig,
    hand_loader: Arc<dyn ModelLoader<dyn HandLandmarker>>,
    face_loader: Arc<dyn ModelLoader<dyn FaceDetector>>,
    object_loader: Arc<dyn ModelLoader<dyn ObjectDetector>>,
    grace: Duration,
    instance: Uuid,
    hands: Option<Arc<dyn HandLandmarker>>,
    faces: Option<Arc<dyn FaceDetector>>,
    objects: Option<Arc<dyn ObjectDetector>>,
    frame_loop: Option<FrameLoop>,
}

impl MultiModelSensor {
    pub fn new(
        config: MultiModelConfig,
        hand_loader: Arc<dyn ModelLoader<dyn HandLandmarker>>,
        face_loader: Arc<dyn ModelLoader<dyn FaceDetector>>,
        object_loader: Arc<dyn ModelLoader<dyn ObjectDetector>>,
        grace: Duration,
    ) -> Self {
        Self {
            config,
            hand_loader,
            face_loader,
            object_loader,
            grace,
            instance: Uuid::new_v4(),
            hands: None,
            faces: None,
            objects: None,
            frame_loop: None,
        }
    }

    /// Load all three models concurrently, keeping whatever succeeded so
    /// that [`release_models`](Self::release_models) can close it.
    async fn acquire_models(&mut self) -> Result<Models, SensorError> {
        let timeout = self.config.load_timeout();
        let (hands, faces, objects) = tokio::join!(
            load_model("hand-landmarker", self.hand_loader.as_ref(), &self.config.hand_sources, timeout),
            load_model("face-detector", self.face_loader.as_ref(), &self.config.face_sources, timeout),
            load_model("object-detector", self.object_loader.as_ref(), &self.config.object_sources, timeout),
        );

        let mut first_error = None;
        match hands {
            Ok(m) => self.hands = Some(m),
            Err(e) => first_error = first_error.or(Some(e)),
        }
        match faces {
            Ok(m) => self.faces = Some(m),
            Err(e) => first_error = first_error.or(Some(e)),
        }
        match objects {
            Ok(m) => self.objects = Some(m),
            Err(e) => first_error = first_error.or(Some(e)),
        }

        match (&self.hands, &self.faces, &self.objects, first_error) {
            (Some(h), Some(f), Some(o), None) => Ok(Models {
                hands: Arc::clone(h),
                faces: Arc::clone(f),
                objects: Arc::clone(o),
            }),
            (_, _, _, Some(e)) => Err(e),
            _ => Err(SensorError::init("multi-model", "model set incomplete")),
        }
    }

    fn release_models(&mut self) {
        let mut released = 0;
        if let Some(m) = self.hands.take() {
            m.close();
            released += 1;
        }
        if let Some(m) = self.faces.take() {
            m.close();
            released += 1;
        }
        if let Some(m) = self.objects.take() {
            m.close();
            released += 1;
        }
        if released > 0 {
            debug!(instance = %self.instance, released, "multi-model handles released");
        }
    }
}

#[async_trait]
impl SensorBackend for MultiModelSensor {
    fn mode(&self) -> SensingMode {
        SensingMode::MultiModel
    }

    async fn initialize(
        &mut self,
        video: Arc<dyn VideoSource>,
        on_obstacles: ObstacleCallback,
        _on_depth: Option<DepthFrameCallback>,
    ) -> Result<(), SensorError> {
        if self.frame_loop.is_some() {
            warn!(instance = %self.instance, "multi-model sensor already initialised; ignoring");
            return Ok(());
        }

        let models = match self.acquire_models().await {
            Ok(models) => models,
            Err(e) => {
                self.release_models();
                return Err(e);
            }
        };

        let cursor = Arc::new(FrameCursor::new());
        let config = Arc::new(self.config.clone());
        let instance = self.instance;

        self.frame_loop = Some(FrameLoop::spawn("multi-model", self.config.frame_interval(), move |state| {
            let models = models.clone();
            let video = Arc::clone(&video);
            let cursor = Arc::clone(&cursor);
            let on_obstacles = Arc::clone(&on_obstacles);
            let config = Arc::clone(&config);
            async move {
                let Some(frame) = cursor.take_fresh(video.as_ref()) else {
                    return;
                };
                let (hands, faces, objects) = tokio::join!(
                    models.hands.detect(&frame),
                    models.faces.detect(&frame),
                    models.objects.detect(&frame),
                );
                let (hands, faces, objects) = match (hands, faces, objects) {
                    (Ok(h), Ok(f), Ok(o)) => (h, f, o),
                    (h, f, o) => {
                        let error = [h.err(), f.err(), o.err()].into_iter().flatten().next();
                        if let Some(e) = error {
                            warn!(%instance, error = %e, "multi-model inference failed; frame skipped");
                        }
                        return;
                    }
                };
                let zones = fuse_detections(&hands, &faces, &objects, frame.width, frame.height, &config);
                debug!(%instance, zones = zones.len(), "multi-model frame fused");
                state.emit(zones, |zones| on_obstacles(zones));
            }
            .boxed()
        }));

        info!(instance = %self.instance, "multi-model sensor started");
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.stop(self.grace).await;
            info!(instance = %self.instance, "multi-model sensor stopped");
        }
        self.release_models();
    }
}

/// Fuse one frame's detections into obstacle zones: hands, then faces, then
/// objects.
pub fn fuse_detections(
    hands: &[HandDetection],
    faces: &[FaceDetection],
    objects: &[ObjectDetection],
    frame_width: u32,
    frame_height: u32,
    config: &MultiModelConfig,
) -> Vec<ObstacleZone> {
    let (w, h) = (frame_width.max(1) as f32, frame_height.max(1) as f32);
    let mut zones = landmarks::hand_zones(hands, config.max_hands, config.padding);

    zones.extend(faces.iter().enumerate().filter_map(|(i, face)| {
        let b = face.bbox;
        ObstacleZone::from_bounds(
            format!("face-{i}"),
            ZoneKind::Person,
            b.x / w,
            b.y / h,
            (b.x + b.width) / w,
            (b.y + b.height) / h,
        )
        .map(|z| {
            z.with_label("face")
                .with_depth(Some(face_depth(b.width, config)))
                .with_confidence(Some(face.score))
        })
    }));

    let frame_area = w * h;
    zones.extend(objects.iter().enumerate().filter_map(|(i, object)| {
        let b = object.bbox;
        let kind = if object.class.eq_ignore_ascii_case("person") {
            ZoneKind::Person
        } else {
            ZoneKind::Object
        };
        ObstacleZone::from_bounds(
            format!("object-{i}"),
            kind,
            b.x / w,
            b.y / h,
            (b.x + b.width) / w,
            (b.y + b.height) / h,
        )
        .map(|z| {
            z.with_label(object.class.clone())
                .with_depth(Some(depth_from_relative_area(b.area() / frame_area)))
                .with_confidence(Some(object.score))
        })
    }));

    zones
}

/// Inverse-width face distance, clamped to the calibrated range.
fn face_depth(width_px: f32, config: &MultiModelConfig) -> f32 {
    if width_px <= 0.0 || !width_px.is_finite() {
        return config.face_max_depth_m;
    }
    (config.face_depth_constant / width_px).clamp(config.face_min_depth_m, config.face_max_depth_m)
}

/// Bigger on screen is closer.
fn depth_from_relative_area(fraction: f32) -> f32 {
    AREA_DEPTH_BANDS
        .iter()
        .find(|(min, _)| fraction > *min)
        .map_or(FAR_OBJECT_DEPTH, |(_, depth)| *depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetSource, PixelBox};
    use crate::sim::{SimFaceDetector, SimHandLandmarker, SimLoader, SimObjectDetector, SimVideoSource};
    use std::sync::Mutex;

    fn object(class: &str, x: f32, y: f32, w: f32, h: f32) -> ObjectDetection {
        ObjectDetection {
            bbox: PixelBox::new(x, y, w, h),
            class: class.into(),
            score: 0.6,
        }
    }

    #[test]
    fn area_bands() {
        assert_eq!(depth_from_relative_area(0.5), 0.5);
        assert_eq!(depth_from_relative_area(0.2), 1.0);
        assert_eq!(depth_from_relative_area(0.07), 1.5);
        assert_eq!(depth_from_relative_area(0.05), 2.5);
        assert_eq!(depth_from_relative_area(0.0), 2.5);
    }

    #[test]
    fn face_depth_is_inverse_width_and_clamped() {
        let cfg = MultiModelConfig::default();
        assert!((face_depth(90.0, &cfg) - 1.0).abs() < 1e-5);
        assert_eq!(face_depth(1000.0, &cfg), 0.3);
        assert_eq!(face_depth(5.0, &cfg), 3.0);
        assert_eq!(face_depth(0.0, &cfg), 3.0);
    }

    #[test]
    fn fuses_all_three_sources() {
        let cfg = MultiModelConfig::default();
        let hands = vec![SimHandLandmarker::hand_with_box(0.2, 0.3, 0.4, 0.5)];
        let faces = vec![FaceDetection {
            bbox: PixelBox::new(100.0, 50.0, 90.0, 110.0),
            score: 0.9,
        }];
        let objects = vec![
            object("cup", 0.0, 0.0, 400.0, 400.0),
            object("person", 400.0, 0.0, 100.0, 400.0),
        ];
        let zones = fuse_detections(&hands, &faces, &objects, 640, 480, &cfg);
        assert_eq!(zones.len(), 4);

        assert_eq!(zones[0].kind, ZoneKind::Hand);
        assert_eq!(zones[0].depth, None);

        assert_eq!(zones[1].kind, ZoneKind::Person);
        assert_eq!(zones[1].label, "face");
        assert!((zones[1].depth.unwrap() - 1.0).abs() < 1e-5);

        assert_eq!(zones[2].kind, ZoneKind::Object);
        assert_eq!(zones[2].label, "cup");
        assert_eq!(zones[2].depth, Some(0.5));
        assert!((zones[2].width - 0.625).abs() < 1e-5);

        assert_eq!(zones[3].kind, ZoneKind::Person);
        assert_eq!(zones[3].label, "person");
        assert_eq!(zones[3].depth, Some(1.0));
    }

    #[test]
    fn out_of_frame_boxes_are_clipped() {
        let objects = vec![object("chair", 600.0, 400.0, 200.0, 200.0)];
        let zones = fuse_detections(&[], &[], &objects, 640, 480, &MultiModelConfig::default());
        assert_eq!(zones.len(), 1);
        assert!(zones[0].x + zones[0].width <= 1.0 + 1e-6);
        assert!(zones[0].y + zones[0].height <= 1.0 + 1e-6);
    }

    struct Fixture {
        hands: Arc<SimHandLandmarker>,
        faces: Arc<SimFaceDetector>,
        objects: Arc<SimObjectDetector>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                hands: Arc::new(SimHandLandmarker::with_box(0.2, 0.3, 0.4, 0.5)),
                faces: Arc::new(SimFaceDetector::default()),
                objects: Arc::new(SimObjectDetector::default()),
            }
        }

        fn sensor(&self, face_unreachable: bool) -> MultiModelSensor {
            let src = vec![AssetSource::new("sim", "sim://model")];
            let config = MultiModelConfig {
                hand_sources: src.clone(),
                face_sources: src.clone(),
                object_sources: src,
                ..MultiModelConfig::default()
            };
            let unreachable: &[&str] = if face_unreachable { &["sim"] } else { &[] };
            MultiModelSensor::new(
                config,
                Arc::new(SimLoader::new(Arc::clone(&self.hands))),
                Arc::new(SimLoader::new(Arc::clone(&self.faces)).with_unreachable(unreachable)),
                Arc::new(SimLoader::new(Arc::clone(&self.objects))),
                Duration::from_secs(1),
            )
        }
    }

    #[tokio::test(start_paused = true)]
    async fn partial_initialization_releases_acquired_models() {
        let fx = Fixture::new();
        let mut sensor = fx.sensor(true);
        let cb: ObstacleCallback = Arc::new(|_: Vec<ObstacleZone>| {});
        let err = sensor
            .initialize(Arc::new(SimVideoSource::new("cam", 8, 8, 30)), cb, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SensorError::InitializationFailed { ref backend, .. } if backend == "face-detector"));
        assert!(fx.hands.is_closed());
        assert!(fx.objects.is_closed());
        assert!(!fx.faces.is_closed());
        sensor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn runs_and_releases_everything_on_stop() {
        let fx = Fixture::new();
        let mut sensor = fx.sensor(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: ObstacleCallback = Arc::new(move |zones: Vec<ObstacleZone>| sink.lock().unwrap().push(zones));

        sensor
            .initialize(Arc::new(SimVideoSource::new("cam", 64, 48, 30)), cb, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        sensor.stop().await;

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen[0].iter().any(|z| z.kind == ZoneKind::Hand));
        assert!(fx.hands.is_closed() && fx.faces.is_closed() && fx.objects.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_detector_skips_the_frame() {
        let fx = Fixture::new();
        fx.objects.fail_next(usize::MAX);
        let mut sensor = fx.sensor(false);
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let cb: ObstacleCallback = Arc::new(move |_: Vec<ObstacleZone>| *sink.lock().unwrap() += 1);

        sensor
            .initialize(Arc::new(SimVideoSource::new("cam", 8, 8, 30)), cb, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        sensor.stop().await;
        assert_eq!(*seen.lock().unwrap(), 0);
    }
}

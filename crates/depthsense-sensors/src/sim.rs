//! In-process simulated camera, models and AR runtime.
//!
//! Lets the whole sensing stack run headless (CLI demo, integration tests)
//! without inference runtimes or AR hardware.  Every stand-in is
//! deterministic and records enough state (reads, loads, closes) for tests
//! to assert on.
//!
//! # Example
//!
//! ```rust
//! use depthsense_sensors::sim::SimEnvironment;
//!
//! let env = SimEnvironment::new().with_unreachable_sources(&["gcs"]);
//! let providers = env.providers();
//! # let _ = providers;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use depthsense_types::{DepthFormat, DepthFrame, DepthSamples};
use tokio::time::Instant;

use crate::backends::Providers;
use crate::model::{
    AssetSource, DepthMap, DepthNetwork, DepthSession, DepthSessionProvider, FaceDetection, FaceDetector,
    HandDetection, HandLandmarker, InputTensor, Landmark, ModelError, ModelLoader, ObjectDetection, ObjectDetector,
    PixelBox, SessionRequest,
};
use crate::video::{VideoFrame, VideoSource};

// ────────────────────────────────────────────────────────────────────────────
// Camera
// ────────────────────────────────────────────────────────────────────────────

/// A camera producing a fixed gradient image at `fps`.
///
/// Timestamps advance with the Tokio clock, so paused-time tests see new
/// frames exactly as time is advanced.
pub struct SimVideoSource {
    id: String,
    width: u32,
    height: u32,
    period_ms: u64,
    started: Instant,
    data: Arc<[u8]>,
    reads: AtomicU64,
}

impl SimVideoSource {
    pub fn new(id: impl Into<String>, width: u32, height: u32, fps: u32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let r = (x * 255 / width.max(1)) as u8;
                let g = (y * 255 / height.max(1)) as u8;
                data.extend_from_slice(&[r, g, 128]);
            }
        }
        Self {
            id: id.into(),
            width,
            height,
            period_ms: (1_000 / fps.max(1)) as u64,
            started: Instant::now(),
            data: data.into(),
            reads: AtomicU64::new(0),
        }
    }

    /// Number of `latest_frame` calls so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl VideoSource for SimVideoSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_millis() as u64;
        Some(VideoFrame {
            width: self.width,
            height: self.height,
            timestamp_ms: elapsed / self.period_ms.max(1) * self.period_ms,
            data: Arc::clone(&self.data),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loader
// ────────────────────────────────────────────────────────────────────────────

/// A simulated model that can be handed out by a [`SimLoader`].
pub trait SimModel: Send + Sync + 'static {
    /// The model trait object backends consume.
    type Handle: ?Sized + Send + Sync;

    fn handle(self: Arc<Self>) -> Arc<Self::Handle>;

    /// Called on every successful load; clears a previous `close`.
    fn reopen(&self);
}

/// Serves one shared simulated model from any source not marked
/// unreachable.
pub struct SimLoader<T> {
    model: Arc<T>,
    unreachable: Vec<String>,
    attempts: AtomicU64,
}

impl<T: SimModel> SimLoader<T> {
    pub fn new(model: Arc<T>) -> Self {
        Self {
            model,
            unreachable: Vec::new(),
            attempts: AtomicU64::new(0),
        }
    }

    /// Make the named sources fail as unreachable.
    pub fn with_unreachable(mut self, names: &[&str]) -> Self {
        self.unreachable.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Load and probe attempts, including failed ones.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn check(&self, source: &AssetSource) -> Result<(), ModelError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if self.unreachable.iter().any(|n| *n == source.name) {
            return Err(ModelError::Unreachable(source.uri.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl<T: SimModel> ModelLoader<T::Handle> for SimLoader<T> {
    async fn load(&self, source: &AssetSource) -> Result<Arc<T::Handle>, ModelError> {
        self.check(source)?;
        self.model.reopen();
        Ok(Arc::clone(&self.model).handle())
    }

    async fn probe(&self, source: &AssetSource) -> Result<(), ModelError> {
        self.check(source)
    }
}

/// Open/closed bookkeeping shared by the simulated models.
#[derive(Debug, Default)]
struct Lifecycle {
    closed: AtomicBool,
    closes: AtomicU64,
}

impl Lifecycle {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    fn ensure_open(&self, what: &str) -> Result<(), ModelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ModelError::Rejected(format!("{what} used after close")));
        }
        Ok(())
    }
}

/// Scale a box given in frame fractions to pixels.
fn to_pixels(b: PixelBox, frame: &VideoFrame) -> PixelBox {
    let (w, h) = (frame.width as f32, frame.height as f32);
    PixelBox::new(b.x * w, b.y * h, b.width * w, b.height * h)
}

// ────────────────────────────────────────────────────────────────────────────
// Models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SimHandLandmarker {
    hands: Mutex<Vec<HandDetection>>,
    lifecycle: Lifecycle,
}

impl SimHandLandmarker {
    /// One hand whose landmarks span `(x0, y0)`–`(x1, y1)`.
    pub fn with_box(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let model = Self::default();
        model.set_hands(vec![Self::hand_with_box(x0, y0, x1, y1)]);
        model
    }

    /// 21 image landmarks spread across the box, no world landmarks.
    pub fn hand_with_box(x0: f32, y0: f32, x1: f32, y1: f32) -> HandDetection {
        let landmarks = (0..21)
            .map(|i| {
                let t = i as f32 / 20.0;
                Landmark::new(x0 + t * (x1 - x0), y0 + t * (y1 - y0), 0.0)
            })
            .collect();
        HandDetection {
            landmarks,
            world_landmarks: None,
            score: Some(0.9),
        }
    }

    pub fn set_hands(&self, hands: Vec<HandDetection>) {
        if let Ok(mut current) = self.hands.lock() {
            *current = hands;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandLandmarker for SimHandLandmarker {
    async fn detect(&self, _frame: &VideoFrame) -> Result<Vec<HandDetection>, ModelError> {
        self.lifecycle.ensure_open("hand landmarker")?;
        self.hands
            .lock()
            .map(|h| h.clone())
            .map_err(|_| ModelError::Inference("hand state poisoned".into()))
    }

    fn close(&self) {
        self.lifecycle.close();
    }
}

impl SimModel for SimHandLandmarker {
    type Handle = dyn HandLandmarker;

    fn handle(self: Arc<Self>) -> Arc<dyn HandLandmarker> {
        self
    }

    fn reopen(&self) {
        self.lifecycle.reopen();
    }
}

/// Reports faces at fixed positions given in frame fractions.
#[derive(Debug)]
pub struct SimFaceDetector {
    faces: Mutex<Vec<FaceDetection>>,
    lifecycle: Lifecycle,
}

impl Default for SimFaceDetector {
    /// One face about 90 px wide on a 640 px frame, i.e. roughly 1 m away.
    fn default() -> Self {
        Self::with_faces(vec![FaceDetection {
            bbox: PixelBox::new(0.43, 0.2, 0.14, 0.23),
            score: 0.92,
        }])
    }
}

impl SimFaceDetector {
    pub fn with_faces(faces: Vec<FaceDetection>) -> Self {
        Self {
            faces: Mutex::new(faces),
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for SimFaceDetector {
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<FaceDetection>, ModelError> {
        self.lifecycle.ensure_open("face detector")?;
        let faces = self
            .faces
            .lock()
            .map_err(|_| ModelError::Inference("face state poisoned".into()))?;
        Ok(faces
            .iter()
            .map(|f| FaceDetection {
                bbox: to_pixels(f.bbox, frame),
                score: f.score,
            })
            .collect())
    }

    fn close(&self) {
        self.lifecycle.close();
    }
}

impl SimModel for SimFaceDetector {
    type Handle = dyn FaceDetector;

    fn handle(self: Arc<Self>) -> Arc<dyn FaceDetector> {
        self
    }

    fn reopen(&self) {
        self.lifecycle.reopen();
    }
}

/// Reports objects at fixed positions given in frame fractions.
#[derive(Debug)]
pub struct SimObjectDetector {
    objects: Mutex<Vec<ObjectDetection>>,
    failures_left: AtomicUsize,
    lifecycle: Lifecycle,
}

impl Default for SimObjectDetector {
    fn default() -> Self {
        Self::with_objects(vec![
            ObjectDetection {
                bbox: PixelBox::new(0.6, 0.55, 0.25, 0.3),
                class: "cup".into(),
                score: 0.71,
            },
            ObjectDetection {
                bbox: PixelBox::new(0.05, 0.1, 0.3, 0.85),
                class: "person".into(),
                score: 0.83,
            },
        ])
    }
}

impl SimObjectDetector {
    pub fn with_objects(objects: Vec<ObjectDetection>) -> Self {
        Self {
            objects: Mutex::new(objects),
            failures_left: AtomicUsize::new(0),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Make the next `n` detections fail with an inference error.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectDetector for SimObjectDetector {
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<ObjectDetection>, ModelError> {
        self.lifecycle.ensure_open("object detector")?;
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ModelError::Inference("simulated detector fault".into()));
        }
        let objects = self
            .objects
            .lock()
            .map_err(|_| ModelError::Inference("object state poisoned".into()))?;
        Ok(objects
            .iter()
            .map(|o| ObjectDetection {
                bbox: to_pixels(o.bbox, frame),
                class: o.class.clone(),
                score: o.score,
            })
            .collect())
    }

    fn close(&self) {
        self.lifecycle.close();
    }
}

impl SimModel for SimObjectDetector {
    type Handle = dyn ObjectDetector;

    fn handle(self: Arc<Self>) -> Arc<dyn ObjectDetector> {
        self
    }

    fn reopen(&self) {
        self.lifecycle.reopen();
    }
}

/// Predicts a bright (near) square in the middle quarter of the view.
#[derive(Debug)]
pub struct SimDepthNetwork {
    width: u32,
    height: u32,
    lifecycle: Lifecycle,
}

impl SimDepthNetwork {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DepthNetwork for SimDepthNetwork {
    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn predict(&self, input: &InputTensor) -> Result<DepthMap, ModelError> {
        self.lifecycle.ensure_open("depth network")?;
        let expected = self.width as usize * self.height as usize * 3;
        if input.data.len() != expected {
            return Err(ModelError::Inference(format!(
                "input tensor holds {} values, expected {expected}",
                input.data.len()
            )));
        }
        let (w, h) = (self.width, self.height);
        let near = |v: u32, len: u32| v >= len * 3 / 8 && v < len * 5 / 8;
        let data = (0..h)
            .flat_map(|y| (0..w).map(move |x| if near(x, w) && near(y, h) { 10.0 } else { 1.0 }))
            .collect();
        Ok(DepthMap {
            width: w,
            height: h,
            data,
        })
    }

    fn close(&self) {
        self.lifecycle.close();
    }
}

impl SimModel for SimDepthNetwork {
    type Handle = dyn DepthNetwork;

    fn handle(self: Arc<Self>) -> Arc<dyn DepthNetwork> {
        self
    }

    fn reopen(&self) {
        self.lifecycle.reopen();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// AR runtime
// ────────────────────────────────────────────────────────────────────────────

/// 100×100 metric depth frame: a 3×3 block of 10×10 cells at 1 m in front
/// of a 3 m background.
pub fn scene_depth_frame() -> DepthFrame {
    let mut data = vec![3.0f32; 100 * 100];
    for y in 30..60 {
        for x in 40..70 {
            data[y * 100 + x] = 1.0;
        }
    }
    DepthFrame {
        width: 100,
        height: 100,
        format: DepthFormat::Float32 { raw_to_meters: 1.0 },
        samples: DepthSamples::F32(data),
    }
}

/// An AR runtime that replays one depth frame forever.
pub struct SimDepthSessionProvider {
    frame: DepthFrame,
    supported: bool,
    grant_depth: bool,
    ended: Arc<AtomicU64>,
    requests: Mutex<Vec<SessionRequest>>,
}

impl SimDepthSessionProvider {
    pub fn new(frame: DepthFrame) -> Self {
        Self {
            frame,
            supported: true,
            grant_depth: true,
            ended: Arc::new(AtomicU64::new(0)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Refuse depth streaming; baseline sessions still succeed.
    pub fn deny_depth(mut self) -> Self {
        self.grant_depth = false;
        self
    }

    /// No AR runtime at all.
    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    pub fn ended_sessions(&self) -> u64 {
        self.ended.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<SessionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DepthSessionProvider for SimDepthSessionProvider {
    async fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request_session(&self, request: &SessionRequest) -> Result<Arc<dyn DepthSession>, ModelError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        if !self.supported {
            return Err(ModelError::Unreachable("no immersive AR runtime".into()));
        }
        if request.wants_depth() && !self.grant_depth {
            return Err(ModelError::Rejected("depth-sensing feature not granted".into()));
        }
        Ok(Arc::new(SimDepthSession {
            depth_enabled: request.wants_depth(),
            frame: self.frame.clone(),
            ended: AtomicBool::new(false),
            ended_count: Arc::clone(&self.ended),
        }))
    }
}

struct SimDepthSession {
    depth_enabled: bool,
    frame: DepthFrame,
    ended: AtomicBool,
    ended_count: Arc<AtomicU64>,
}

#[async_trait]
impl DepthSession for SimDepthSession {
    fn depth_enabled(&self) -> bool {
        self.depth_enabled
    }

    async fn next_depth_frame(&self) -> Result<Option<DepthFrame>, ModelError> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(ModelError::Rejected("session ended".into()));
        }
        Ok(self.depth_enabled.then(|| self.frame.clone()))
    }

    async fn end(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.ended_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Environment
// ────────────────────────────────────────────────────────────────────────────

/// A complete simulated scene: one hand, one face, a cup and a person, and
/// an AR runtime seeing a box one metre away.
pub struct SimEnvironment {
    pub hands: Arc<SimHandLandmarker>,
    pub faces: Arc<SimFaceDetector>,
    pub objects: Arc<SimObjectDetector>,
    pub depth_network: Arc<SimDepthNetwork>,
    pub depth_session: Arc<SimDepthSessionProvider>,
    unreachable: Vec<String>,
}

impl SimEnvironment {
    pub fn new() -> Self {
        Self {
            hands: Arc::new(SimHandLandmarker::with_box(0.2, 0.3, 0.4, 0.5)),
            faces: Arc::new(SimFaceDetector::default()),
            objects: Arc::new(SimObjectDetector::default()),
            depth_network: Arc::new(SimDepthNetwork::new(256, 256)),
            depth_session: Arc::new(SimDepthSessionProvider::new(scene_depth_frame())),
            unreachable: Vec::new(),
        }
    }

    /// Replace the AR runtime, e.g. with one that denies depth.
    pub fn with_depth_session(mut self, provider: SimDepthSessionProvider) -> Self {
        self.depth_session = Arc::new(provider);
        self
    }

    /// Make the named asset sources unreachable for every model.
    pub fn with_unreachable_sources(mut self, names: &[&str]) -> Self {
        self.unreachable.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn providers(&self) -> Providers {
        let down: Vec<&str> = self.unreachable.iter().map(String::as_str).collect();
        Providers {
            hands: Arc::new(SimLoader::new(Arc::clone(&self.hands)).with_unreachable(&down)),
            faces: Arc::new(SimLoader::new(Arc::clone(&self.faces)).with_unreachable(&down)),
            objects: Arc::new(SimLoader::new(Arc::clone(&self.objects)).with_unreachable(&down)),
            depth_network: Arc::new(SimLoader::new(Arc::clone(&self.depth_network)).with_unreachable(&down)),
            depth_session: Arc::clone(&self.depth_session) as Arc<dyn DepthSessionProvider>,
        }
    }
}

impl Default for SimEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

/// Providers over a fresh default [`SimEnvironment`].
pub fn providers() -> Providers {
    SimEnvironment::new().providers()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn video_timestamps_follow_the_clock() {
        let cam = SimVideoSource::new("cam", 4, 4, 10);
        let a = cam.latest_frame().unwrap();
        assert_eq!(a.data.len(), 4 * 4 * 3);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let b = cam.latest_frame().unwrap();
        assert!(b.timestamp_ms > a.timestamp_ms);
        assert_eq!(cam.reads(), 2);
    }

    #[tokio::test]
    async fn loader_reopens_closed_model() {
        let model = Arc::new(SimHandLandmarker::with_box(0.1, 0.1, 0.2, 0.2));
        let loader = SimLoader::new(Arc::clone(&model));
        let frame = VideoFrame::new(2, 2, 0, vec![0; 12]).unwrap();

        let handle = loader.load(&AssetSource::new("a", "sim://a")).await.unwrap();
        handle.close();
        assert!(handle.detect(&frame).await.is_err());

        let handle = loader.load(&AssetSource::new("a", "sim://a")).await.unwrap();
        assert_eq!(handle.detect(&frame).await.unwrap().len(), 1);
        assert!(!model.is_closed());
    }

    #[tokio::test]
    async fn unreachable_sources_fail() {
        let loader = SimLoader::new(Arc::new(SimDepthNetwork::new(8, 8))).with_unreachable(&["cdn"]);
        let err = loader.probe(&AssetSource::new("cdn", "https://cdn/x")).await.unwrap_err();
        assert!(matches!(err, ModelError::Unreachable(_)));
        assert!(loader.probe(&AssetSource::new("local", "x")).await.is_ok());
        assert_eq!(loader.attempts(), 2);
    }

    #[tokio::test]
    async fn object_detector_failure_budget() {
        let det = SimObjectDetector::default();
        let frame = VideoFrame::new(10, 10, 0, vec![0; 300]).unwrap();
        det.fail_next(1);
        assert!(det.detect(&frame).await.is_err());
        let objects = det.detect(&frame).await.unwrap();
        assert_eq!(objects[0].class, "cup");
        assert!((objects[0].bbox.x - 6.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn provider_records_negotiation() {
        let provider = SimDepthSessionProvider::new(scene_depth_frame()).deny_depth();
        assert!(provider.request_session(&SessionRequest::full()).await.is_err());
        let session = provider.request_session(&SessionRequest::baseline()).await.unwrap();
        assert!(!session.depth_enabled());
        assert_eq!(session.next_depth_frame().await.unwrap(), None);
        session.end().await;
        session.end().await;
        assert_eq!(provider.ended_sessions(), 1);
        assert_eq!(provider.requests().len(), 2);
    }
}

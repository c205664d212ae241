//! [`SensingManager`] – owns the one active sensing backend.
//!
//! States are `Idle` or exactly one running backend; the only transitions
//! are [`SensingManager::set_mode`] and [`SensingManager::stop`].  Switching
//! always tears the current backend down completely before the next one is
//! constructed, so two backends never hold the camera at once.
//!
//! Initialisation failures are returned to the caller and leave the manager
//! `Idle`; choosing another mode is the caller's decision (see
//! [`CapabilityProber`][crate::CapabilityProber]).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use depthsense_sensors::{SensorBackend, VideoSource};
use depthsense_types::{DepthFrameCallback, ObstacleCallback, ObstacleZone, SensingMode, SensorError};
use tracing::{debug, info, instrument, warn};

use crate::factory::BackendFactory;
use crate::stream::{ObstacleReceiver, ObstacleStream};

/// Default bound on how long a backend gets to shut down.
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SensingManager {
    factory: Arc<dyn BackendFactory>,
    video: Arc<dyn VideoSource>,
    on_obstacles: ObstacleCallback,
    on_depth: Option<DepthFrameCallback>,
    stream: ObstacleStream,
    active: Option<Box<dyn SensorBackend>>,
    mode: SensingMode,
    /// Bumped on every transition; callbacks of older backends are dropped.
    generation: Arc<AtomicU64>,
    teardown_timeout: Duration,
}

impl SensingManager {
    /// Create an idle manager.  `on_obstacles` receives every processed
    /// frame's obstacle list.
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        video: Arc<dyn VideoSource>,
        on_obstacles: ObstacleCallback,
    ) -> Self {
        Self {
            factory,
            video,
            on_obstacles,
            on_depth: None,
            stream: ObstacleStream::default(),
            active: None,
            mode: SensingMode::None,
            generation: Arc::new(AtomicU64::new(0)),
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
        }
    }

    /// Also forward raw depth frames from backends that produce them.
    pub fn with_depth_callback(mut self, on_depth: DepthFrameCallback) -> Self {
        self.on_depth = Some(on_depth);
        self
    }

    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    pub fn with_stream(mut self, stream: ObstacleStream) -> Self {
        self.stream = stream;
        self
    }

    /// The running mode, [`SensingMode::None`] while idle.
    pub fn mode(&self) -> SensingMode {
        self.mode
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Subscribe to the broadcast copy of every obstacle list.
    pub fn subscribe(&self) -> ObstacleReceiver {
        self.stream.subscribe()
    }

    pub fn stream(&self) -> &ObstacleStream {
        &self.stream
    }

    /// Switch to `mode`.
    ///
    /// The current backend, if any, is stopped and fully torn down first.
    /// [`SensingMode::None`] then reports an empty obstacle list and stays
    /// idle; any other mode constructs and initialises a fresh backend.
    ///
    /// # Errors
    ///
    /// Whatever the new backend's `initialize` returned.  The manager is
    /// idle afterwards and the failed backend has been stopped.
    #[instrument(skip_all, fields(from = %self.mode, to = %mode))]
    pub async fn set_mode(&mut self, mode: SensingMode) -> Result<(), SensorError> {
        self.teardown().await;

        if mode == SensingMode::None {
            self.deliver(SensingMode::None, Vec::new());
            info!("sensing idle");
            return Ok(());
        }

        let mut backend = self
            .factory
            .create(mode)
            .ok_or_else(|| SensorError::init(mode.as_str(), "no backend available for this mode"))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let callback = self.forwarding_callback(mode, generation);

        match backend
            .initialize(Arc::clone(&self.video), callback, self.on_depth.clone())
            .await
        {
            Ok(()) => {
                self.active = Some(backend);
                self.mode = mode;
                info!(%mode, "sensing backend active");
                Ok(())
            }
            Err(e) => {
                warn!(%mode, error = %e, "backend failed to initialise; staying idle");
                self.generation.fetch_add(1, Ordering::SeqCst);
                self.stop_backend(backend).await;
                Err(e)
            }
        }
    }

    /// Stop the active backend, if any, and return to idle.
    pub async fn stop(&mut self) {
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        if let Some(backend) = self.active.take() {
            let mode = backend.mode();
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.stop_backend(backend).await;
            info!(%mode, "sensing backend stopped");
        }
        self.mode = SensingMode::None;
    }

    async fn stop_backend(&self, mut backend: Box<dyn SensorBackend>) {
        if tokio::time::timeout(self.teardown_timeout, backend.stop()).await.is_err() {
            warn!(
                mode = %backend.mode(),
                timeout_ms = self.teardown_timeout.as_millis() as u64,
                "backend teardown exceeded its deadline; abandoning it"
            );
        }
    }

    fn deliver(&self, mode: SensingMode, zones: Vec<ObstacleZone>) {
        self.stream.publish(mode, zones.clone());
        (self.on_obstacles)(zones);
    }

    /// Wraps the consumer callback so it also feeds the broadcast stream and
    /// ignores output from any backend but the current one.
    fn forwarding_callback(&self, mode: SensingMode, generation: u64) -> ObstacleCallback {
        let current = Arc::clone(&self.generation);
        let stream = self.stream.clone();
        let consumer = Arc::clone(&self.on_obstacles);
        Arc::new(move |zones: Vec<ObstacleZone>| {
            if current.load(Ordering::SeqCst) != generation {
                debug!(%mode, "dropping obstacles from a retired backend");
                return;
            }
            stream.publish(mode, zones.clone());
            consumer(zones);
        })
    }
}

impl Drop for SensingManager {
    fn drop(&mut self) {
        if self.active.is_some() {
            // Backends abort their own loops on drop; this only silences late
            // callbacks still in flight.
            self.generation.fetch_add(1, Ordering::SeqCst);
            debug!(mode = %self.mode, "sensing manager dropped while active");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::SensorFactory;
    use depthsense_sensors::SensorSettings;
    use depthsense_sensors::sim::{SimEnvironment, SimVideoSource};
    use std::sync::Mutex;

    fn manager(env: &SimEnvironment) -> (SensingManager, Arc<Mutex<Vec<Vec<ObstacleZone>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let factory = Arc::new(SensorFactory::new(env.providers(), SensorSettings::default()));
        let mgr = SensingManager::new(
            factory,
            Arc::new(SimVideoSource::new("cam", 64, 48, 30)),
            Arc::new(move |zones: Vec<ObstacleZone>| sink.lock().unwrap().push(zones)),
        );
        (mgr, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn starts_idle() {
        let env = SimEnvironment::new();
        let (mgr, seen) = manager(&env);
        assert_eq!(mgr.mode(), SensingMode::None);
        assert!(mgr.is_idle());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn switching_modes_releases_previous_models() {
        let env = SimEnvironment::new();
        let (mut mgr, _) = manager(&env);
        mgr.set_mode(SensingMode::Hands).await.unwrap();
        assert_eq!(mgr.mode(), SensingMode::Hands);
        assert!(!env.hands.is_closed());

        mgr.set_mode(SensingMode::Monocular).await.unwrap();
        assert_eq!(mgr.mode(), SensingMode::Monocular);
        assert!(env.hands.is_closed());

        mgr.stop().await;
        assert!(mgr.is_idle());
        assert!(env.depth_network.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_initialisation_leaves_manager_idle() {
        let env = SimEnvironment::new().with_unreachable_sources(&["gcs", "jsdelivr", "local"]);
        let (mut mgr, _) = manager(&env);
        let err = mgr.set_mode(SensingMode::Hands).await.unwrap_err();
        assert!(matches!(err, SensorError::InitializationFailed { .. }));
        assert!(mgr.is_idle());
        assert_eq!(mgr.mode(), SensingMode::None);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_mirrors_consumer_callback() {
        let env = SimEnvironment::new();
        let (mut mgr, seen) = manager(&env);
        let mut rx = mgr.subscribe();

        mgr.set_mode(SensingMode::DepthSession).await.unwrap();
        let batch = rx.next_batch().await.unwrap();
        assert_eq!(batch.mode, SensingMode::DepthSession);
        assert_eq!(batch.zones.len(), 1);
        mgr.stop().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], batch.zones);
    }
}

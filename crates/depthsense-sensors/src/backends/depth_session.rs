//! Platform Depth-Session Sensor.
//!
//! Opens an AR session that streams per-pixel depth and reduces every depth
//! frame to a handful of merged [`ZoneKind::Object`] zones:
//!
//! 1. sample the centre pixel of each cell of a `grid_size × grid_size` grid;
//! 2. keep cells whose depth lies strictly inside `(near_m, far_m)`;
//! 3. merge cells whose centres are closer than `merge_distance` into one
//!    zone (union box, averaged depth), repeating until nothing merges.
//!
//! If the platform refuses depth streaming the session is reopened with
//! baseline features only; the backend then keeps reporting empty lists.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use depthsense_types::{
    DepthFrame, DepthFrameCallback, ObstacleCallback, ObstacleZone, SensingMode, SensorError, ZoneKind,
};
use futures_util::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::SensorBackend;
use crate::config::DepthSessionConfig;
use crate::frame_loop::FrameLoop;
use crate::model::{DepthSession, DepthSessionProvider, ModelError, SessionRequest};
use crate::video::VideoSource;

pub struct DepthSessionSensor {
    config: DepthSessionConfig,
    provider: Arc<dyn DepthSessionProvider>,
    grace: Duration,
    instance: Uuid,
    session: Option<Arc<dyn DepthSession>>,
    frame_loop: Option<FrameLoop>,
}

impl DepthSessionSensor {
    pub fn new(config: DepthSessionConfig, provider: Arc<dyn DepthSessionProvider>, grace: Duration) -> Self {
        Self {
            config,
            provider,
            grace,
            instance: Uuid::new_v4(),
            session: None,
            frame_loop: None,
        }
    }

    /// Whether the running session streams depth.  `false` before
    /// initialisation and after a reduced-feature negotiation.
    pub fn depth_enabled(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.depth_enabled())
    }

    async fn request(&self, request: &SessionRequest) -> Result<Arc<dyn DepthSession>, ModelError> {
        let timeout = self.config.session_timeout();
        match tokio::time::timeout(timeout, self.provider.request_session(request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(timeout)),
        }
    }

    /// Full feature set first, then baseline AR without depth.
    async fn negotiate(&self) -> Result<Arc<dyn DepthSession>, SensorError> {
        match self.request(&SessionRequest::full()).await {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!(instance = %self.instance, error = %e, "depth session refused; retrying without depth sensing");
                self.request(&SessionRequest::baseline())
                    .await
                    .map_err(|e| SensorError::init("depth-session", e))
            }
        }
    }
}

#[async_trait]
impl SensorBackend for DepthSessionSensor {
    fn mode(&self) -> SensingMode {
        SensingMode::DepthSession
    }

    async fn initialize(
        &mut self,
        _video: Arc<dyn VideoSource>,
        on_obstacles: ObstacleCallback,
        on_depth: Option<DepthFrameCallback>,
    ) -> Result<(), SensorError> {
        if self.frame_loop.is_some() {
            warn!(instance = %self.instance, "depth-session sensor already initialised; ignoring");
            return Ok(());
        }

        let session = self.negotiate().await?;
        self.session = Some(Arc::clone(&session));
        let depth_enabled = session.depth_enabled();
        let config = self.config.clone();
        let instance = self.instance;

        self.frame_loop = Some(FrameLoop::spawn(
            "depth-session",
            self.config.frame_interval(),
            move |state| {
                let session = Arc::clone(&session);
                let on_obstacles = Arc::clone(&on_obstacles);
                let on_depth = on_depth.clone();
                let config = config.clone();
                async move {
                    if !depth_enabled {
                        state.emit(Vec::new(), |zones| on_obstacles(zones));
                        return;
                    }
                    match session.next_depth_frame().await {
                        Ok(Some(frame)) => {
                            if let Some(on_depth) = &on_depth {
                                state.emit(&frame, |f| on_depth(f));
                            }
                            let zones = reduce_depth_frame(&frame, &config);
                            debug!(%instance, zones = zones.len(), "depth frame reduced");
                            state.emit(zones, |zones| on_obstacles(zones));
                        }
                        Ok(None) => debug!(%instance, "session frame carried no depth"),
                        Err(e) => warn!(%instance, error = %e, "depth frame unavailable; skipped"),
                    }
                }
                .boxed()
            },
        ));

        info!(instance = %self.instance, depth_enabled, "depth-session sensor started");
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.stop(self.grace).await;
        }
        if let Some(session) = self.session.take() {
            session.end().await;
            info!(instance = %self.instance, "depth session ended");
        }
    }
}

/// Grid-sample `frame` and return merged obstacle zones, ids `depth-0`, …
///
/// Frames without a metric scale yield no zones.
pub fn reduce_depth_frame(frame: &DepthFrame, config: &DepthSessionConfig) -> Vec<ObstacleZone> {
    let n = config.grid_size.max(1);
    if frame.width == 0 || frame.height == 0 {
        return Vec::new();
    }
    let cell = 1.0 / n as f32;
    let mut cells = Vec::new();

    for row in 0..n {
        for col in 0..n {
            let px = (((col as f32 + 0.5) * cell * frame.width as f32) as u32).min(frame.width - 1);
            let py = (((row as f32 + 0.5) * cell * frame.height as f32) as u32).min(frame.height - 1);
            let Some(depth) = frame.meters_at(px, py) else {
                continue;
            };
            if depth > config.near_m && depth < config.far_m {
                let zone = ObstacleZone::new(
                    format!("cell-{row}-{col}"),
                    ZoneKind::Object,
                    col as f32 * cell,
                    row as f32 * cell,
                    cell,
                    cell,
                );
                cells.extend(zone.map(|z| z.with_depth(Some(depth))));
            }
        }
    }

    merge_nearby_zones(&cells, config.merge_distance)
        .into_iter()
        .enumerate()
        .map(|(i, mut zone)| {
            zone.id = format!("depth-{i}");
            zone.with_confidence(Some(config.confidence))
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Cluster {
    head: ObstacleZone,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    depth_sum: f32,
    depth_weight: f32,
    members: usize,
}

impl Cluster {
    fn from_zone(zone: &ObstacleZone) -> Self {
        let (depth_sum, depth_weight) = zone.depth.map_or((0.0, 0.0), |d| (d, 1.0));
        Self {
            head: zone.clone(),
            x0: zone.x,
            y0: zone.y,
            x1: zone.x + zone.width,
            y1: zone.y + zone.height,
            depth_sum,
            depth_weight,
            members: 1,
        }
    }

    fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    fn absorb(&mut self, other: &Cluster) {
        self.x0 = self.x0.min(other.x0);
        self.y0 = self.y0.min(other.y0);
        self.x1 = self.x1.max(other.x1);
        self.y1 = self.y1.max(other.y1);
        self.depth_sum += other.depth_sum;
        self.depth_weight += other.depth_weight;
        self.members += other.members;
    }

    fn into_zone(self) -> Option<ObstacleZone> {
        if self.members == 1 {
            return Some(self.head);
        }
        let depth = (self.depth_weight > 0.0).then(|| self.depth_sum / self.depth_weight);
        let head = self.head;
        ObstacleZone::from_bounds(head.id, head.kind, self.x0, self.y0, self.x1, self.y1).map(|z| {
            z.with_label(head.label)
                .with_confidence(head.confidence)
                .with_depth(depth)
        })
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// One single-linkage pass.  Returns `true` when anything merged.
fn merge_pass(clusters: &mut Vec<Cluster>, threshold: f32) -> bool {
    let n = clusters.len();
    let mut parent: Vec<usize> = (0..n).collect();
    let mut merged = false;

    for i in 0..n {
        let (ax, ay) = clusters[i].center();
        for j in (i + 1)..n {
            let (bx, by) = clusters[j].center();
            if ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt() < threshold {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    // Lowest index is the root so output keeps first-seen order.
                    let (root, child) = (ri.min(rj), ri.max(rj));
                    parent[child] = root;
                    merged = true;
                }
            }
        }
    }
    if !merged {
        return false;
    }

    let mut out: Vec<Cluster> = Vec::new();
    let mut slot = vec![usize::MAX; n];
    for i in 0..n {
        let root = find(&mut parent, i);
        if root == i {
            slot[i] = out.len();
            out.push(clusters[i].clone());
        } else {
            out[slot[root]].absorb(&clusters[i]);
        }
    }
    *clusters = out;
    true
}

/// Merge zones whose centres lie within `threshold` of each other.
///
/// Each merged zone is the union box of its members with their depth
/// averaged; it keeps the id, kind, label and confidence of its first member.
/// Merging repeats until no two centres are within `threshold`, so the
/// result is a fixed point: merging it again changes nothing.
pub fn merge_nearby_zones(zones: &[ObstacleZone], threshold: f32) -> Vec<ObstacleZone> {
    let mut clusters: Vec<Cluster> = zones.iter().map(Cluster::from_zone).collect();
    while merge_pass(&mut clusters, threshold) {}
    clusters.into_iter().filter_map(Cluster::into_zone).collect()
}

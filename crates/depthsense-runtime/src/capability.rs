//! [`CapabilityProber`] – can a backend run here, and which should run first?
//!
//! Probing is cheap: model sources are only checked for reachability and the
//! AR runtime is only asked whether sessions are supported.  Nothing is left
//! resident.  Call [`CapabilityProber::ensure_supported`] before
//! [`SensingManager::set_mode`][crate::SensingManager::set_mode] to surface
//! [`SensorError::UnsupportedPlatform`] up front.

use std::time::Duration;

use depthsense_sensors::assets::probe_sources;
use depthsense_sensors::{Providers, SensorSettings};
use depthsense_types::{SensingMode, SensorError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Coarse device family used to order recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// AR/VR headsets with a native depth-capable runtime.
    Headset,
    Mobile,
    Desktop,
}

const HEADSET_MARKERS: [&str; 6] = ["quest", "oculusbrowser", "visionos", "hololens", "magic leap", "pico"];
const MOBILE_MARKERS: [&str; 4] = ["android", "iphone", "ipad", "mobile"];

impl DeviceClass {
    /// Classify a platform/user-agent signature.
    pub fn from_signature(signature: &str) -> Self {
        let sig = signature.to_ascii_lowercase();
        if HEADSET_MARKERS.iter().any(|m| sig.contains(m)) {
            DeviceClass::Headset
        } else if MOBILE_MARKERS.iter().any(|m| sig.contains(m)) {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }

    /// Every backend mode, most preferred first.
    pub fn preference_order(self) -> [SensingMode; 4] {
        match self {
            DeviceClass::Headset => [
                SensingMode::DepthSession,
                SensingMode::Hands,
                SensingMode::MultiModel,
                SensingMode::Monocular,
            ],
            DeviceClass::Mobile | DeviceClass::Desktop => [
                SensingMode::Hands,
                SensingMode::MultiModel,
                SensingMode::Monocular,
                SensingMode::DepthSession,
            ],
        }
    }
}

/// What the prober knows about the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Free-form platform signature, e.g. a user-agent string.
    pub signature: String,
    /// Whether a GPU compute backend is available for dense networks.
    pub gpu_compute: bool,
}

impl PlatformInfo {
    pub fn new(signature: impl Into<String>, gpu_compute: bool) -> Self {
        Self {
            signature: signature.into(),
            gpu_compute,
        }
    }

    /// The OS/architecture this process runs on, without GPU compute.
    pub fn host() -> Self {
        Self::new(format!("{} {}", std::env::consts::OS, std::env::consts::ARCH), false)
    }

    pub fn device_class(&self) -> DeviceClass {
        DeviceClass::from_signature(&self.signature)
    }
}

/// Probe outcome for one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub mode: SensingMode,
    pub supported: bool,
    /// Why the mode is or is not usable.
    pub reason: String,
    /// What the caller should do about it.
    pub recommendation: String,
}

impl CapabilityReport {
    fn supported(mode: SensingMode, reason: impl Into<String>, recommendation: impl Into<String>) -> Self {
        Self {
            mode,
            supported: true,
            reason: reason.into(),
            recommendation: recommendation.into(),
        }
    }

    fn unsupported(mode: SensingMode, reason: impl Into<String>, recommendation: impl Into<String>) -> Self {
        Self {
            mode,
            supported: false,
            reason: reason.into(),
            recommendation: recommendation.into(),
        }
    }
}

pub struct CapabilityProber {
    providers: Providers,
    settings: SensorSettings,
    platform: PlatformInfo,
    probe_timeout: Duration,
}

impl CapabilityProber {
    pub fn new(providers: Providers, settings: SensorSettings, platform: PlatformInfo) -> Self {
        Self {
            providers,
            settings,
            platform,
            probe_timeout: Duration::from_secs(3),
        }
    }

    /// Bound every individual source probe.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    /// Check whether `mode` can run here.  [`SensingMode::None`] always can.
    pub async fn probe(&self, mode: SensingMode) -> CapabilityReport {
        let t = self.probe_timeout;
        let report = match mode {
            SensingMode::None => CapabilityReport::supported(mode, "no backend required", "always available"),
            SensingMode::Hands => {
                match probe_sources("hand-landmarker", self.providers.hands.as_ref(), &self.settings.hands.sources, t)
                    .await
                {
                    Ok(()) => CapabilityReport::supported(
                        mode,
                        "hand landmark model reachable",
                        "broadest compatibility; needs only a camera",
                    ),
                    Err(e) => CapabilityReport::unsupported(
                        mode,
                        e.to_string(),
                        "check network access to the model hosts or add a local model source",
                    ),
                }
            }
            SensingMode::DepthSession => {
                if self.providers.depth_session.is_supported().await {
                    CapabilityReport::supported(
                        mode,
                        "immersive AR runtime available",
                        "best on headsets; depth streaming is negotiated when the session starts",
                    )
                } else {
                    CapabilityReport::unsupported(
                        mode,
                        "no immersive AR runtime on this device",
                        "use hands or multi-model instead",
                    )
                }
            }
            SensingMode::MultiModel => match self.probe_multi_model().await {
                Ok(()) => CapabilityReport::supported(
                    mode,
                    "hand, face and object models reachable",
                    "richest 2D detection; heavier than hands alone",
                ),
                Err(e) => CapabilityReport::unsupported(mode, e.to_string(), "fall back to hands"),
            },
            SensingMode::Monocular => {
                if !self.platform.gpu_compute {
                    CapabilityReport::unsupported(
                        mode,
                        "no GPU compute backend for the depth network",
                        "use multi-model for approximate depth",
                    )
                } else {
                    let m = &self.settings.monocular;
                    match probe_sources("depth-network", self.providers.depth_network.as_ref(), &m.sources, t).await {
                        Ok(()) => CapabilityReport::supported(
                            mode,
                            "depth network reachable and GPU compute available",
                            "dense depth at a low frame rate",
                        ),
                        Err(e) => CapabilityReport::unsupported(mode, e.to_string(), "use multi-model instead"),
                    }
                }
            }
        };
        debug!(%mode, supported = report.supported, reason = %report.reason, "capability probed");
        report
    }

    async fn probe_multi_model(&self) -> Result<(), SensorError> {
        let t = self.probe_timeout;
        let mm = &self.settings.multi_model;
        let (hands, faces, objects) = tokio::join!(
            probe_sources("hand-landmarker", self.providers.hands.as_ref(), &mm.hand_sources, t),
            probe_sources("face-detector", self.providers.faces.as_ref(), &mm.face_sources, t),
            probe_sources("object-detector", self.providers.objects.as_ref(), &mm.object_sources, t),
        );
        hands.and(faces).and(objects)
    }

    /// Reports for every backend mode, in this device's preference order.
    pub async fn probe_all(&self) -> Vec<CapabilityReport> {
        let mut reports = Vec::with_capacity(4);
        for mode in self.platform.device_class().preference_order() {
            reports.push(self.probe(mode).await);
        }
        reports
    }

    /// Supported modes, most preferred first.
    pub async fn recommended_modes(&self) -> Vec<SensingMode> {
        self.probe_all()
            .await
            .into_iter()
            .filter(|r| r.supported)
            .map(|r| r.mode)
            .collect()
    }

    /// # Errors
    ///
    /// [`SensorError::UnsupportedPlatform`] when the probe for `mode` fails.
    pub async fn ensure_supported(&self, mode: SensingMode) -> Result<(), SensorError> {
        let report = self.probe(mode).await;
        if report.supported {
            Ok(())
        } else {
            Err(SensorError::UnsupportedPlatform {
                mode,
                reason: report.reason,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthsense_sensors::sim::{SimDepthSessionProvider, SimEnvironment, scene_depth_frame};

    fn prober(env: &SimEnvironment, platform: PlatformInfo) -> CapabilityProber {
        CapabilityProber::new(env.providers(), SensorSettings::default(), platform)
    }

    #[test]
    fn classifies_signatures() {
        assert_eq!(
            DeviceClass::from_signature("Mozilla/5.0 (X11; Linux x86_64; Quest 3) OculusBrowser/33.0"),
            DeviceClass::Headset
        );
        assert_eq!(DeviceClass::from_signature("Apple Vision Pro visionOS 2"), DeviceClass::Headset);
        assert_eq!(
            DeviceClass::from_signature("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)"),
            DeviceClass::Mobile
        );
        assert_eq!(DeviceClass::from_signature("linux x86_64"), DeviceClass::Desktop);
    }

    #[tokio::test]
    async fn headset_prefers_depth_session() {
        let env = SimEnvironment::new();
        let p = prober(&env, PlatformInfo::new("OculusBrowser Quest", true));
        let modes = p.recommended_modes().await;
        assert_eq!(modes.first(), Some(&SensingMode::DepthSession));
        assert_eq!(modes.len(), 4);
    }

    #[tokio::test]
    async fn desktop_prefers_hands_then_multi_model() {
        let env = SimEnvironment::new().with_depth_session(SimDepthSessionProvider::new(scene_depth_frame()).unsupported());
        let p = prober(&env, PlatformInfo::new("linux x86_64", false));
        assert_eq!(p.recommended_modes().await, vec![SensingMode::Hands, SensingMode::MultiModel]);
    }

    #[tokio::test]
    async fn monocular_needs_gpu_compute() {
        let env = SimEnvironment::new();
        let p = prober(&env, PlatformInfo::new("linux x86_64", false));
        let report = p.probe(SensingMode::Monocular).await;
        assert!(!report.supported);
        assert!(report.reason.contains("GPU"));
        assert!(matches!(
            p.ensure_supported(SensingMode::Monocular).await,
            Err(SensorError::UnsupportedPlatform { mode: SensingMode::Monocular, .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_models_are_reported_with_cause() {
        let env = SimEnvironment::new().with_unreachable_sources(&["gcs", "local"]);
        let p = prober(&env, PlatformInfo::new("Android 14", true));
        let mm = p.probe(SensingMode::MultiModel).await;
        assert!(!mm.supported);
        assert!(mm.reason.contains("unreachable"), "reason={}", mm.reason);
        // The hand model still has its jsdelivr mirror.
        assert!(p.probe(SensingMode::Hands).await.supported);
        assert!(p.ensure_supported(SensingMode::None).await.is_ok());
    }
}

//! The four backend implementations and the model providers they draw from.

pub mod depth_session;
pub mod hands;
pub mod monocular;
pub mod multi_model;

use std::sync::Arc;

use depthsense_types::SensingMode;

use crate::backend::SensorBackend;
use crate::config::SensorSettings;
use crate::model::{DepthNetwork, DepthSessionProvider, FaceDetector, HandLandmarker, ModelLoader, ObjectDetector};

pub use depth_session::DepthSessionSensor;
pub use hands::HandSensor;
pub use monocular::MonocularSensor;
pub use multi_model::MultiModelSensor;

/// Loaders for every model and session a backend may need.
#[derive(Clone)]
pub struct Providers {
    pub hands: Arc<dyn ModelLoader<dyn HandLandmarker>>,
    pub faces: Arc<dyn ModelLoader<dyn FaceDetector>>,
    pub objects: Arc<dyn ModelLoader<dyn ObjectDetector>>,
    pub depth_network: Arc<dyn ModelLoader<dyn DepthNetwork>>,
    pub depth_session: Arc<dyn DepthSessionProvider>,
}

/// Construct the (uninitialised) backend for `mode`.
///
/// Returns `None` for [`SensingMode::None`].
pub fn build_backend(
    mode: SensingMode,
    providers: &Providers,
    settings: &SensorSettings,
) -> Option<Box<dyn SensorBackend>> {
    let grace = settings.teardown_grace();
    let backend: Box<dyn SensorBackend> = match mode {
        SensingMode::None => return None,
        SensingMode::Hands => Box::new(HandSensor::new(
            settings.hands.clone(),
            Arc::clone(&providers.hands),
            grace,
        )),
        SensingMode::DepthSession => Box::new(DepthSessionSensor::new(
            settings.depth_session.clone(),
            Arc::clone(&providers.depth_session),
            grace,
        )),
        SensingMode::MultiModel => Box::new(MultiModelSensor::new(
            settings.multi_model.clone(),
            Arc::clone(&providers.hands),
            Arc::clone(&providers.faces),
            Arc::clone(&providers.objects),
            grace,
        )),
        SensingMode::Monocular => Box::new(MonocularSensor::new(
            settings.monocular.clone(),
            Arc::clone(&providers.depth_network),
            grace,
        )),
    };
    Some(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim;

    #[test]
    fn builds_one_backend_per_mode() {
        let providers = sim::providers();
        let settings = SensorSettings::default();
        assert!(build_backend(SensingMode::None, &providers, &settings).is_none());
        for mode in SensingMode::BACKENDS {
            let backend = build_backend(mode, &providers, &settings).unwrap();
            assert_eq!(backend.mode(), mode);
        }
    }
}

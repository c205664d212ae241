//! Backend construction seam for the [`SensingManager`][crate::SensingManager].

use depthsense_sensors::{Providers, SensorBackend, SensorSettings, build_backend};
use depthsense_types::SensingMode;

/// Builds a fresh, uninitialised backend for a mode.
///
/// The manager asks for a new instance on every activation, so backends
/// never carry state from a previous run.
pub trait BackendFactory: Send + Sync {
    /// `None` when no backend exists for `mode` (always the case for
    /// [`SensingMode::None`]).
    fn create(&self, mode: SensingMode) -> Option<Box<dyn SensorBackend>>;
}

/// The production factory: the four sensing backends over a set of model
/// providers.
#[derive(Clone)]
pub struct SensorFactory {
    providers: Providers,
    settings: SensorSettings,
}

impl SensorFactory {
    pub fn new(providers: Providers, settings: SensorSettings) -> Self {
        Self { providers, settings }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn settings(&self) -> &SensorSettings {
        &self.settings
    }
}

impl BackendFactory for SensorFactory {
    fn create(&self, mode: SensingMode) -> Option<Box<dyn SensorBackend>> {
        build_backend(mode, &self.providers, &self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthsense_sensors::sim;

    #[test]
    fn creates_requested_mode() {
        let factory = SensorFactory::new(sim::providers(), SensorSettings::default());
        assert!(factory.create(SensingMode::None).is_none());
        assert_eq!(factory.create(SensingMode::Monocular).unwrap().mode(), SensingMode::Monocular);
    }
}

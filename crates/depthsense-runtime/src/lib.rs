//! `depthsense-runtime` – Sensing orchestration
//!
//! Owns the single active obstacle-sensing backend and fans its output out
//! to consumers.
//!
//! # Modules
//!
//! - [`manager`] – [`SensingManager`][manager::SensingManager]: the
//!   `Idle`/`Active(mode)` state machine.  `set_mode` always stops and tears
//!   down the current backend before building the next, drops late output
//!   from retired backends, and stays idle when initialisation fails.
//! - [`factory`] – [`BackendFactory`][factory::BackendFactory]: the seam
//!   that builds a fresh backend per activation;
//!   [`SensorFactory`][factory::SensorFactory] is the production one.
//! - [`stream`] – [`ObstacleStream`][stream::ObstacleStream]: broadcast
//!   fan-out of sequenced [`ObstacleBatch`][depthsense_types::ObstacleBatch]es
//!   alongside the consumer callback.
//! - [`capability`] – [`CapabilityProber`][capability::CapabilityProber]:
//!   per-mode support checks and a device-specific recommendation order.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional JSON output and OTLP span export.

pub mod capability;
pub mod factory;
pub mod manager;
pub mod stream;
pub mod telemetry;

pub use capability::{CapabilityProber, CapabilityReport, DeviceClass, PlatformInfo};
pub use factory::{BackendFactory, SensorFactory};
pub use manager::{DEFAULT_TEARDOWN_TIMEOUT, SensingManager};
pub use stream::{ObstacleReceiver, ObstacleStream};
pub use telemetry::{TracerProviderGuard, init_tracing};

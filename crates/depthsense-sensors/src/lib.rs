//! `depthsense-sensors` – Obstacle sensing backends.
//!
//! Turns a live camera feed (or a platform AR session) into per-frame lists
//! of [`ObstacleZone`][depthsense_types::ObstacleZone]s.
//!
//! # Modules
//!
//! - [`backend`] – [`SensorBackend`][backend::SensorBackend]: the
//!   `initialize`/`stop` contract shared by every strategy.
//! - [`backends`] – the four strategies:
//!   [`HandSensor`][backends::HandSensor],
//!   [`DepthSessionSensor`][backends::DepthSessionSensor],
//!   [`MultiModelSensor`][backends::MultiModelSensor] and
//!   [`MonocularSensor`][backends::MonocularSensor], plus
//!   [`build_backend`][backends::build_backend].
//! - [`model`] – inference-model, loader and AR-session traits the backends
//!   drive.
//! - [`assets`] – ordered multi-source asset loading with per-attempt
//!   timeouts.
//! - [`frame_loop`] – [`FrameLoop`][frame_loop::FrameLoop]: fixed-cadence
//!   processing that skips ticks instead of queueing them.
//! - [`landmarks`] – hand-landmark → zone geometry.
//! - [`video`] – [`VideoSource`][video::VideoSource] and frame freshness.
//! - [`config`] – per-backend tuning with serde defaults.
//! - [`sim`] – simulated camera, models and AR runtime for headless runs.

pub mod assets;
pub mod backend;
pub mod backends;
pub mod config;
pub mod frame_loop;
pub mod landmarks;
pub mod model;
pub mod sim;
pub mod video;

pub use backend::SensorBackend;
pub use backends::{Providers, build_backend};
pub use config::SensorSettings;
pub use video::{VideoFrame, VideoSource};

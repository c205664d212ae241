//! `depthsense-geometry` – screen-space queries for the rendering layer.
//!
//! Pure functions, no state.  The rendering layer feeds in the AR creature's
//! world position and the current [`Camera`], together with the latest
//! obstacle list, and gets back screen coordinates, collision hits and
//! avoidance displacements.
//!
//! # Modules
//!
//! - [`transform`] – [`Vec3`], [`Quaternion`] and rigid-body
//!   [`Transform3D`] primitives.
//! - [`camera`] – [`Mat4`] projection matrices and the [`Camera`] pose +
//!   projection pair.
//! - [`screen`] – [`world_to_screen`], [`check_collision`] and
//!   [`calculate_avoidance_vector`].

pub mod camera;
pub mod screen;
pub mod transform;

pub use camera::{Camera, Mat4};
pub use screen::{
    AVOIDANCE_GAIN, ScreenPoint, calculate_avoidance_vector, calculate_avoidance_vector_with_rng,
    check_collision, world_to_screen,
};
pub use transform::{Quaternion, Transform3D, Vec3};

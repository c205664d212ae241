//! Screen-space projection, collision and avoidance.
//!
//! # Example
//!
//! ```rust
//! use depthsense_geometry::{Camera, Transform3D, Vec3, check_collision, world_to_screen};
//!
//! let camera = Camera::perspective(Transform3D::identity(), 60.0, 16.0 / 9.0, 0.1, 100.0);
//! let p = world_to_screen(Vec3::new(0.0, 0.0, -3.0), &camera);
//! assert!((p.x - 0.5).abs() < 1e-5 && (p.y - 0.5).abs() < 1e-5);
//!
//! assert!(check_collision(Vec3::new(0.0, 0.0, -3.0), &camera, &[], 0.05).is_none());
//! ```

use depthsense_types::ObstacleZone;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::transform::Vec3;

/// Gain applied to the screen-space offset on every axis of the avoidance
/// vector.
pub const AVOIDANCE_GAIN: f32 = 6.0;

/// Half-width of the random depth-axis perturbation, before the gain.
const DEPTH_JITTER: f32 = 0.05;

/// Clip-space `w` below which a point is treated as lying on the camera
/// plane.
const MIN_CLIP_W: f32 = 1e-6;

/// A projected point in normalised screen space (`[0, 1]`, Y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
    /// Distance in front of the camera along its forward axis; negative for
    /// points behind it.
    pub view_depth: f32,
}

impl ScreenPoint {
    pub fn is_in_front(&self) -> bool {
        self.view_depth > 0.0
    }
}

/// Project a world-space point to normalised screen coordinates.
///
/// NDC `[-1, 1]` is remapped to `[0, 1]` with Y flipped so that `y = 0` is
/// the top of the frame.  Points off-screen map outside `[0, 1]`.
pub fn world_to_screen(position: Vec3, camera: &Camera) -> ScreenPoint {
    let clip = camera.world_to_clip(position);
    let w = if clip[3].abs() < MIN_CLIP_W {
        MIN_CLIP_W.copysign(clip[3])
    } else {
        clip[3]
    };
    let ndc_x = clip[0] / w;
    let ndc_y = clip[1] / w;
    ScreenPoint {
        x: (ndc_x + 1.0) / 2.0,
        y: (1.0 - ndc_y) / 2.0,
        view_depth: clip[3],
    }
}

/// Return the first zone, in list order, whose rectangle grown by `padding`
/// contains the projected position.
///
/// Points behind the camera never collide.
pub fn check_collision<'a>(
    position: Vec3,
    camera: &Camera,
    zones: &'a [ObstacleZone],
    padding: f32,
) -> Option<&'a ObstacleZone> {
    if zones.is_empty() {
        return None;
    }
    let p = world_to_screen(position, camera);
    if !p.is_in_front() {
        return None;
    }
    zones.iter().find(|z| z.contains_padded(p.x, p.y, padding))
}

/// Displacement pushing `position` away from `obstacle`'s screen-space
/// centre.
///
/// The screen offset is expressed along the camera's right/up axes and scaled
/// by [`AVOIDANCE_GAIN`]; the forward component is a small random
/// perturbation.
pub fn calculate_avoidance_vector(position: Vec3, obstacle: &ObstacleZone, camera: &Camera) -> Vec3 {
    calculate_avoidance_vector_with_rng(position, obstacle, camera, &mut rand::thread_rng())
}

/// [`calculate_avoidance_vector`] with a caller-supplied random source.
pub fn calculate_avoidance_vector_with_rng<R: Rng + ?Sized>(
    position: Vec3,
    obstacle: &ObstacleZone,
    camera: &Camera,
    rng: &mut R,
) -> Vec3 {
    let p = world_to_screen(position, camera);
    let (cx, cy) = obstacle.center();
    let dx = (p.x - cx) * AVOIDANCE_GAIN;
    // Screen Y grows downwards, world up does not.
    let dy = -(p.y - cy) * AVOIDANCE_GAIN;
    let dz = rng.gen_range(-DEPTH_JITTER..DEPTH_JITTER) * AVOIDANCE_GAIN;

    camera
        .right()
        .scale(dx)
        .add(camera.up().scale(dy))
        .add(camera.forward().scale(dz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Quaternion, Transform3D};
    use depthsense_types::ZoneKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn camera() -> Camera {
        Camera::perspective(Transform3D::identity(), 60.0, 4.0 / 3.0, 0.1, 100.0)
    }

    fn zone(x: f32, y: f32, w: f32, h: f32) -> ObstacleZone {
        ObstacleZone::new("z", ZoneKind::Object, x, y, w, h).unwrap()
    }

    #[test]
    fn forward_axis_projects_to_center_at_any_distance() {
        let cam = camera();
        for d in [0.2_f32, 1.0, 3.5, 40.0] {
            let p = world_to_screen(Vec3::new(0.0, 0.0, -d), &cam);
            assert!((p.x - 0.5).abs() < 1e-5, "x={} at d={d}", p.x);
            assert!((p.y - 0.5).abs() < 1e-5, "y={} at d={d}", p.y);
        }
    }

    #[test]
    fn forward_axis_projects_to_center_for_moved_camera() {
        let pose = Transform3D::new(Vec3::new(0.0, 1.6, 2.0), Quaternion::from_yaw(0.4));
        let cam = Camera::perspective(pose, 70.0, 1.0, 0.1, 50.0);
        let target = pose.translation.add(cam.forward().scale(2.5));
        let p = world_to_screen(target, &cam);
        assert!((p.x - 0.5).abs() < 1e-4);
        assert!((p.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn up_and_right_map_to_screen_axes() {
        let cam = camera();
        let up = world_to_screen(Vec3::new(0.0, 0.5, -2.0), &cam);
        assert!(up.y < 0.5, "world up must map to screen top");
        let right = world_to_screen(Vec3::new(0.5, 0.0, -2.0), &cam);
        assert!(right.x > 0.5);
    }

    #[test]
    fn empty_zone_list_never_collides() {
        let cam = camera();
        for p in [Vec3::new(0.0, 0.0, -1.0), Vec3::new(3.0, -2.0, 5.0)] {
            assert!(check_collision(p, &cam, &[], 0.1).is_none());
        }
    }

    #[test]
    fn collision_returns_first_matching_zone() {
        let cam = camera();
        let zones = vec![
            zone(0.0, 0.0, 0.2, 0.2),
            zone(0.4, 0.4, 0.2, 0.2),
            zone(0.45, 0.45, 0.1, 0.1),
        ];
        let hit = check_collision(Vec3::new(0.0, 0.0, -2.0), &cam, &zones, 0.0).unwrap();
        assert!((hit.x - 0.4).abs() < 1e-6);
    }

    #[test]
    fn padding_extends_the_hit_box() {
        let cam = camera();
        let zones = vec![zone(0.55, 0.4, 0.2, 0.2)];
        let p = Vec3::new(0.0, 0.0, -2.0);
        assert!(check_collision(p, &cam, &zones, 0.0).is_none());
        assert!(check_collision(p, &cam, &zones, 0.06).is_some());
    }

    #[test]
    fn points_behind_camera_do_not_collide() {
        let cam = camera();
        let zones = vec![zone(0.0, 0.0, 1.0, 1.0)];
        assert!(check_collision(Vec3::new(0.0, 0.0, 2.0), &cam, &zones, 0.0).is_none());
    }

    #[test]
    fn avoidance_pushes_away_from_obstacle_center() {
        let cam = camera();
        let mut rng = StdRng::seed_from_u64(7);
        // Obstacle to the right and below the creature, which sits at centre.
        let obstacle = zone(0.6, 0.6, 0.2, 0.2);
        let v = calculate_avoidance_vector_with_rng(Vec3::new(0.0, 0.0, -2.0), &obstacle, &cam, &mut rng);
        assert!((v.x - (0.5 - 0.7) * AVOIDANCE_GAIN).abs() < 1e-4, "x={}", v.x);
        assert!((v.y - (0.7 - 0.5) * AVOIDANCE_GAIN).abs() < 1e-4, "y={}", v.y);
        assert!(v.z.abs() <= DEPTH_JITTER * AVOIDANCE_GAIN);
    }

    #[test]
    fn avoidance_depth_component_varies() {
        let cam = camera();
        let obstacle = zone(0.4, 0.4, 0.2, 0.2);
        let mut rng = StdRng::seed_from_u64(42);
        let zs: Vec<f32> = (0..8)
            .map(|_| {
                calculate_avoidance_vector_with_rng(Vec3::new(0.0, 0.0, -2.0), &obstacle, &cam, &mut rng).z
            })
            .collect();
        assert!(zs.iter().any(|z| (z - zs[0]).abs() > 1e-6));
    }
}

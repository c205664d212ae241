//! Camera model consumed by the screen-space queries.
//!
//! Conventions follow the usual right-handed GL setup: the camera looks down
//! its local −Z axis, +Y is up, and the projection maps view space into clip
//! space with `w = −z_view`.

use serde::{Deserialize, Serialize};

use crate::transform::{Transform3D, Vec3};

/// Row-major 4×4 matrix applied to column vectors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mat4(pub [[f32; 4]; 4]);

impl Mat4 {
    pub fn identity() -> Self {
        Mat4([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Standard perspective projection.
    ///
    /// `fov_y_rad` is the full vertical field of view, `aspect` is
    /// width / height.
    pub fn perspective(fov_y_rad: f32, aspect: f32, near: f32, far: f32) -> Self {
        let f = 1.0 / (fov_y_rad / 2.0).tan();
        let nf = 1.0 / (near - far);
        Mat4([
            [f / aspect, 0.0, 0.0, 0.0],
            [0.0, f, 0.0, 0.0],
            [0.0, 0.0, (far + near) * nf, 2.0 * far * near * nf],
            [0.0, 0.0, -1.0, 0.0],
        ])
    }

    /// Multiply `(p, 1)` by this matrix, returning homogeneous `[x, y, z, w]`.
    pub fn transform_point(&self, p: Vec3) -> [f32; 4] {
        let m = &self.0;
        let v = [p.x, p.y, p.z, 1.0];
        let mut out = [0.0; 4];
        for (row, slot) in out.iter_mut().enumerate() {
            *slot = m[row][0] * v[0] + m[row][1] * v[1] + m[row][2] * v[2] + m[row][3] * v[3];
        }
        out
    }
}

/// Camera pose (camera frame → world frame) and projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub pose: Transform3D,
    pub projection: Mat4,
}

impl Camera {
    pub fn new(pose: Transform3D, projection: Mat4) -> Self {
        Self { pose, projection }
    }

    /// Perspective camera at `pose` with the given vertical FOV (degrees).
    pub fn perspective(pose: Transform3D, fov_y_deg: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(
            pose,
            Mat4::perspective(fov_y_deg.to_radians(), aspect, near, far),
        )
    }

    /// World-space direction the camera looks along.
    pub fn forward(&self) -> Vec3 {
        self.pose.rotation.rotate(Vec3::new(0.0, 0.0, -1.0))
    }

    pub fn right(&self) -> Vec3 {
        self.pose.rotation.rotate(Vec3::new(1.0, 0.0, 0.0))
    }

    pub fn up(&self) -> Vec3 {
        self.pose.rotation.rotate(Vec3::new(0.0, 1.0, 0.0))
    }

    /// Project a world-space point into homogeneous clip space.
    pub fn world_to_clip(&self, p: Vec3) -> [f32; 4] {
        let view = self.pose.inverse().transform_point(p);
        self.projection.transform_point(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Quaternion;

    #[test]
    fn perspective_w_is_view_distance() {
        let cam = Camera::perspective(Transform3D::identity(), 60.0, 1.0, 0.1, 100.0);
        let clip = cam.world_to_clip(Vec3::new(0.0, 0.0, -4.0));
        assert!((clip[3] - 4.0).abs() < 1e-5);
    }

    #[test]
    fn basis_vectors_follow_pose_rotation() {
        let cam = Camera::perspective(
            Transform3D::new(Vec3::zero(), Quaternion::from_yaw(std::f32::consts::PI)),
            60.0,
            1.0,
            0.1,
            100.0,
        );
        let f = cam.forward();
        assert!((f.z - 1.0).abs() < 1e-5);
        let r = cam.right();
        assert!((r.x + 1.0).abs() < 1e-5);
        let u = cam.up();
        assert!((u.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn identity_matrix_passes_point_through() {
        let out = Mat4::identity().transform_point(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(out, [1.0, 2.0, 3.0, 1.0]);
    }
}

//! Pose and projection helpers.
//!
//! Matrices are column-major `glam::Mat4`. Projections follow Vulkan clip
//! conventions: Y points down and depth maps to `0..1`.

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::types::{Fov, Pose};

pub const NEAR_CLIP: f32 = 0.01;
pub const FAR_CLIP: f32 = 250.0;

/// Rigid transform placing an object at `pose`.
pub fn pose_to_matrix(pose: &Pose) -> Mat4 {
    Mat4::from_rotation_translation(pose.orientation.normalize(), pose.position)
}

/// World-to-eye transform for an eye located at `pose`.
pub fn view_matrix(pose: &Pose) -> Mat4 {
    pose_to_matrix(pose).inverse()
}

/// Asymmetric perspective projection built from the four FOV half-angles.
///
/// A `far` not greater than `near` yields an infinite far plane.
pub fn projection_matrix(fov: &Fov, near: f32, far: f32) -> Mat4 {
    let tan_left = fov.angle_left.tan();
    let tan_right = fov.angle_right.tan();
    let tan_down = fov.angle_down.tan();
    let tan_up = fov.angle_up.tan();

    let tan_width = tan_right - tan_left;
    // Vulkan flips Y relative to GL.
    let tan_height = tan_down - tan_up;

    let (z_scale, z_offset) = if far <= near {
        (-1.0, -near)
    } else {
        (-far / (far - near), -(far * near) / (far - near))
    };

    Mat4::from_cols(
        Vec4::new(2.0 / tan_width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 / tan_height, 0.0, 0.0),
        Vec4::new(
            (tan_right + tan_left) / tan_width,
            (tan_up + tan_down) / tan_height,
            z_scale,
            -1.0,
        ),
        Vec4::new(0.0, 0.0, z_offset, 0.0),
    )
}

/// Head pose derived from the eye poses: the mean eye position with the eye
/// orientations averaged in a common hemisphere.
pub fn head_pose(eyes: &[Pose]) -> Option<Pose> {
    let first = eyes.first()?;

    let mut position = Vec3::ZERO;
    let mut blended = Vec4::ZERO;
    let reference = Vec4::from(first.orientation);
    for eye in eyes {
        position += eye.position;
        let q = Vec4::from(eye.orientation);
        blended += if q.dot(reference) < 0.0 { -q } else { q };
    }

    let count = eyes.len() as f32;
    let orientation = if blended.length_squared() > f32::EPSILON {
        Quat::from_vec4(blended).normalize()
    } else {
        first.orientation
    };

    Some(Pose {
        position: position / count,
        orientation,
    })
}

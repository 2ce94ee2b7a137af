//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics plus the single shared
//! world-transform composition used by models, billboards, and debug shapes.

pub use nalgebra::{Matrix3, Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Compose a world transform from position, Euler rotation, and scale.
///
/// Rotation uses the Tait-Bryan Y-X-Z convention, composed as
/// `Translate * Ry * Rx * Rz * Scale`. Every renderer that needs a world
/// matrix goes through this one routine.
pub fn compose_transform(position: Vec3, rotation: Vec3, scale: Vec3) -> Mat4 {
    let (sy, cy) = rotation.y.sin_cos();
    let (sx, cx) = rotation.x.sin_cos();
    let (sz, cz) = rotation.z.sin_cos();

    // Expanded product of Ry * Rx * Rz with scale folded into the columns.
    Mat4::new(
        scale.x * (cy * cz + sy * sx * sz),
        scale.y * (cz * sy * sx - cy * sz),
        scale.z * (cx * sy),
        position.x,
        scale.x * (cx * sz),
        scale.y * (cx * cz),
        scale.z * -sx,
        position.y,
        scale.x * (cy * sx * sz - sy * cz),
        scale.y * (cy * cz * sx + sy * sz),
        scale.z * (cy * cx),
        position.z,
        0.0,
        0.0,
        0.0,
        1.0,
    )
}

/// Compose a 2D world transform (rotation about Z only) as a 4x4 matrix.
pub fn compose_transform_2d(position: Vec2, rotation: f32, scale: Vec2) -> Mat4 {
    let (s, c) = rotation.sin_cos();
    Mat4::new(
        scale.x * c,
        scale.y * -s,
        0.0,
        position.x,
        scale.x * s,
        scale.y * c,
        0.0,
        position.y,
        0.0,
        0.0,
        1.0,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
    )
}

/// Normal matrix for a transform: rotation with inverse scale.
///
/// Correct for non-uniform scale without a full matrix inversion, since the
/// rotation part is orthonormal.
pub fn normal_matrix(rotation: Vec3, scale: Vec3) -> Mat3 {
    let inv_scale = Vec3::new(1.0 / scale.x, 1.0 / scale.y, 1.0 / scale.z);
    compose_transform(Vec3::zeros(), rotation, inv_scale)
        .fixed_view::<3, 3>(0, 0)
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference_transform(position: Vec3, rotation: Vec3, scale: Vec3) -> Mat4 {
        let translate = Mat4::new_translation(&position);
        let ry = Mat4::from_axis_angle(&Vec3::y_axis(), rotation.y);
        let rx = Mat4::from_axis_angle(&Vec3::x_axis(), rotation.x);
        let rz = Mat4::from_axis_angle(&Vec3::z_axis(), rotation.z);
        let scaling = Mat4::new_nonuniform_scaling(&scale);
        translate * ry * rx * rz * scaling
    }

    #[test]
    fn compose_matches_naive_matrix_product() {
        let position = Vec3::new(1.5, -2.0, 3.25);
        let rotation = Vec3::new(0.3, 1.1, -0.7);
        let scale = Vec3::new(2.0, 0.5, 1.25);

        let composed = compose_transform(position, rotation, scale);
        let reference = reference_transform(position, rotation, scale);
        assert_relative_eq!(composed, reference, epsilon = 1e-5);
    }

    #[test]
    fn identity_inputs_give_identity() {
        let m = compose_transform(Vec3::zeros(), Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(m, Mat4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn translation_lands_in_last_column() {
        let m = compose_transform(
            Vec3::new(4.0, 5.0, 6.0),
            Vec3::zeros(),
            Vec3::new(1.0, 1.0, 1.0),
        );
        let translation = Vec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
        assert_relative_eq!(translation, Vec3::new(4.0, 5.0, 6.0), epsilon = 1e-6);
    }

    #[test]
    fn transform_2d_rotates_about_z() {
        let m = compose_transform_2d(
            Vec2::new(1.0, 2.0),
            std::f32::consts::FRAC_PI_2,
            Vec2::new(1.0, 1.0),
        );
        let p = m.transform_point(&nalgebra::Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn normal_matrix_undoes_nonuniform_scale() {
        let rotation = Vec3::new(0.2, -0.4, 0.9);
        let scale = Vec3::new(2.0, 3.0, 0.5);
        let n = normal_matrix(rotation, scale);
        let model: Mat3 = compose_transform(Vec3::zeros(), rotation, scale)
            .fixed_view::<3, 3>(0, 0)
            .into_owned();
        // N must equal transpose(inverse(M)) for the linear part.
        let expected = model.try_inverse().unwrap().transpose();
        assert_relative_eq!(n, expected, epsilon = 1e-4);
    }
}

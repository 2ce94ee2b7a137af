//! Cameras: view and projection matrices
//!
//! Projections are produced in Vulkan clip space (Y down, depth 0..1), so
//! shaders can consume them without a correction matrix.

use crate::foundation::math::{Mat4, Vec3};
use nalgebra::{Orthographic3, Perspective3, Point3};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

/// View/projection source for a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position in world space.
    pub position: Vec3,
    /// Point the camera looks at.
    pub target: Vec3,
    /// Up direction.
    pub up: Vec3,
    projection: Projection,
}

impl Camera {
    /// Perspective camera. `fov_y` is the vertical field of view in radians.
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::zeros(),
            up: Vec3::y(),
            projection: Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            },
        }
    }

    /// Orthographic camera over an explicit clip box.
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 1.0),
            target: Vec3::zeros(),
            up: Vec3::y(),
            projection: Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            },
        }
    }

    /// Update the aspect ratio after a resize. No-op for orthographic cameras.
    pub fn set_aspect(&mut self, new_aspect: f32) {
        if let Projection::Perspective { ref mut aspect, .. } = self.projection {
            *aspect = new_aspect;
        }
    }

    /// Right-handed look-at view matrix.
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(
            &Point3::from(self.position),
            &Point3::from(self.target),
            &self.up,
        )
    }

    /// Projection matrix in Vulkan clip space.
    pub fn projection(&self) -> Mat4 {
        let mut proj = match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Perspective3::new(aspect, fov_y, near, far).to_homogeneous(),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Orthographic3::new(left, right, bottom, top, near, far).to_homogeneous(),
        };
        // OpenGL-convention projection: flip Y for Vulkan's inverted clip
        // space and remap depth from [-1, 1] to [0, 1].
        proj[(1, 1)] *= -1.0;
        let depth_row = proj.row(2) * 0.5 + proj.row(3) * 0.5;
        proj.set_row(2, &depth_row);
        proj
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn view_places_eye_at_origin() {
        let mut camera = Camera::perspective(std::f32::consts::FRAC_PI_3, 16.0 / 9.0, 0.1, 100.0);
        camera.position = Vec3::new(3.0, 2.0, 1.0);
        let eye = camera.view() * Vector4::new(3.0, 2.0, 1.0, 1.0);
        assert_relative_eq!(eye.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(eye.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(eye.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let camera = Camera::perspective(std::f32::consts::FRAC_PI_3, 1.0, 0.1, 100.0);
        assert!(camera.projection()[(1, 1)] < 0.0);
    }

    #[test]
    fn perspective_depth_maps_near_to_zero_far_to_one() {
        let camera = Camera::perspective(std::f32::consts::FRAC_PI_3, 1.0, 0.1, 100.0);
        let proj = camera.projection();

        let near_clip = proj * Vector4::new(0.0, 0.0, -0.1, 1.0);
        assert_relative_eq!(near_clip.z / near_clip.w, 0.0, epsilon = 1e-5);

        let far_clip = proj * Vector4::new(0.0, 0.0, -100.0, 1.0);
        assert_relative_eq!(far_clip.z / far_clip.w, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn orthographic_depth_maps_near_to_zero_far_to_one() {
        let camera = Camera::orthographic(-1.0, 1.0, -1.0, 1.0, 0.0, 10.0);
        let proj = camera.projection();

        let near_clip = proj * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(near_clip.z, 0.0, epsilon = 1e-5);

        let far_clip = proj * Vector4::new(0.0, 0.0, -10.0, 1.0);
        assert_relative_eq!(far_clip.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn set_aspect_only_affects_perspective() {
        let mut perspective = Camera::perspective(1.0, 1.0, 0.1, 10.0);
        let before = perspective.projection();
        perspective.set_aspect(2.0);
        assert_ne!(before, perspective.projection());

        let mut ortho = Camera::orthographic(-1.0, 1.0, -1.0, 1.0, 0.0, 1.0);
        let before = ortho.projection();
        ortho.set_aspect(2.0);
        assert_eq!(before, ortho.projection());
    }
}

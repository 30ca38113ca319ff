//! Perspective camera used for views and for shadow-casting lights.

use cgmath::{Deg, EuclideanSpace, Matrix4, Point3, Vector3, perspective};

/// A look-at perspective camera.
///
/// Shadow-casting lights own one of these as their shadow camera; its
/// view-projection matrix becomes the depth pass transform.
#[derive(Clone, Debug)]
pub struct Camera {
    position: Vector3<f32>,
    view: Vector3<f32>,
    up: Vector3<f32>,

    fovy_deg: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    pub fn new() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 1.0),
            view: Vector3::new(0.0, 0.0, 0.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            fovy_deg: 45.0,
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn set_position(&mut self, position: Vector3<f32>) {
        self.position = position;
    }

    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    /// Point the camera at a world-space target.
    pub fn set_view(&mut self, view: Vector3<f32>) {
        self.view = view;
    }

    pub fn view(&self) -> Vector3<f32> {
        self.view
    }

    pub fn set_up(&mut self, up: Vector3<f32>) {
        self.up = up;
    }

    pub fn up(&self) -> Vector3<f32> {
        self.up
    }

    pub fn set_perspective(&mut self, fovy_deg: f32, aspect: f32, near: f32, far: f32) {
        self.fovy_deg = fovy_deg;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
    }

    pub fn near_far(&self) -> (f32, f32) {
        (self.near, self.far)
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(
            Point3::from_vec(self.position),
            Point3::from_vec(self.view),
            self.up,
        )
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        perspective(Deg(self.fovy_deg), self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Vector4};

    #[test]
    fn look_at_centers_the_target() {
        let mut cam = Camera::new();
        cam.set_position(Vector3::new(0.0, 0.0, 10.0));
        cam.set_view(Vector3::new(0.0, 0.0, 0.0));
        cam.set_perspective(60.0, 1.0, 0.1, 50.0);

        let clip = cam.view_projection_matrix() * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.truncate().magnitude() < 1e-5);
    }
}

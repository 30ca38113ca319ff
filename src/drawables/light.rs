//! Lights and their shadow-casting state.
//!
//! A shadow-casting light owns one shadow [`Camera`] and one backend depth
//! texture, both created exactly once on first load. The camera follows the
//! light: position and aim are the light's own, the field of view matches the
//! spot cone and the far plane scales with the light's power. Any light
//! transform change while shadows are live re-derives the camera.

use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector3};

use crate::{
    camera::Camera,
    error::SceneError,
    render::{RenderBackend, TextureHandle},
};

const SHADOW_MAP_SIZE: (u32, u32) = (1024, 1024);
const SHADOW_NEAR: f32 = 1.0;
/// Far plane distance per unit of light power.
const SHADOW_FAR_PER_POWER: f32 = 100.0;
const DEFAULT_SHADOW_BIAS: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Spot,
    Directional,
}

pub struct Light {
    kind: LightKind,
    position: Vector3<f32>,
    target: Vector3<f32>,
    color: Vector3<f32>,
    power: f32,
    spot_angle_deg: f32,

    use_shadow: bool,
    shadow_bias: f32,
    shadow_map_size: (u32, u32),
    shadow_camera: Option<Camera>,
    shadow_map: Option<TextureHandle>,
    depth_vp: Matrix4<f32>,
    loaded: bool,
}

impl Light {
    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            position: Vector3::new(0.0, 0.0, 0.0),
            target: Vector3::new(0.0, 0.0, -1.0),
            color: Vector3::new(1.0, 1.0, 1.0),
            power: 1.0,
            spot_angle_deg: 40.0,
            use_shadow: false,
            shadow_bias: DEFAULT_SHADOW_BIAS,
            shadow_map_size: SHADOW_MAP_SIZE,
            shadow_camera: None,
            shadow_map: None,
            depth_vp: Matrix4::identity(),
            loaded: false,
        }
    }

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    pub fn is_point(&self) -> bool {
        self.kind == LightKind::Point
    }

    pub fn set_position(&mut self, position: Vector3<f32>) {
        self.position = position;
        self.refresh_shadow_camera();
    }

    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    /// Aim the light at a world-space point.
    pub fn set_target(&mut self, target: Vector3<f32>) {
        self.target = target;
        self.refresh_shadow_camera();
    }

    pub fn target(&self) -> Vector3<f32> {
        self.target
    }

    pub fn direction(&self) -> Vector3<f32> {
        (self.target - self.position).normalize()
    }

    pub fn set_color(&mut self, color: Vector3<f32>) {
        self.color = color;
    }

    pub fn color(&self) -> Vector3<f32> {
        self.color
    }

    pub fn set_power(&mut self, power: f32) {
        self.power = power;
        self.refresh_shadow_camera();
    }

    pub fn power(&self) -> f32 {
        self.power
    }

    /// Full cone angle of a spot light, degrees. Doubles as the shadow
    /// camera's field of view.
    pub fn set_spot_angle(&mut self, degrees: f32) {
        self.spot_angle_deg = degrees;
        self.refresh_shadow_camera();
    }

    pub fn set_shadow_bias(&mut self, bias: f32) {
        self.shadow_bias = bias;
    }

    pub fn shadow_bias(&self) -> f32 {
        self.shadow_bias
    }

    pub fn set_shadow_map_size(&mut self, width: u32, height: u32) {
        self.shadow_map_size = (width, height);
    }

    pub fn uses_shadow(&self) -> bool {
        self.use_shadow
    }

    pub fn shadow_map(&self) -> Option<TextureHandle> {
        self.shadow_map
    }

    pub fn shadow_camera(&self) -> Option<&Camera> {
        self.shadow_camera.as_ref()
    }

    pub fn depth_vp_matrix(&self) -> Matrix4<f32> {
        self.depth_vp
    }

    pub fn shadow_near_far(&self) -> (f32, f32) {
        (SHADOW_NEAR, SHADOW_FAR_PER_POWER * self.power)
    }

    /// Toggle shadow casting. Turning shadows off releases the camera and the
    /// depth texture, so turning them back on recreates both from scratch.
    pub fn set_use_shadow(
        &mut self,
        use_shadow: bool,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), SceneError> {
        if self.use_shadow == use_shadow {
            return Ok(());
        }
        self.use_shadow = use_shadow;
        if use_shadow {
            if self.loaded {
                self.load_shadow(backend)?;
            }
        } else {
            if let Some(handle) = self.shadow_map.take() {
                backend.destroy_texture(handle);
            }
            self.shadow_camera = None;
        }
        Ok(())
    }

    /// Create the shadow camera and depth texture if this light casts
    /// shadows. Idempotent: repeated loads keep the same resources.
    pub fn load_shadow(&mut self, backend: &mut dyn RenderBackend) -> Result<(), SceneError> {
        if self.use_shadow {
            if self.shadow_camera.is_none() {
                self.shadow_camera = Some(Camera::new());
            }
            self.update_shadow_camera();
            if self.shadow_map.is_none() {
                let (width, height) = self.shadow_map_size;
                self.shadow_map = Some(backend.create_depth_texture(width, height)?);
            }
        }
        self.loaded = true;
        Ok(())
    }

    pub fn destroy(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(handle) = self.shadow_map.take() {
            backend.destroy_texture(handle);
        }
        self.shadow_camera = None;
        self.loaded = false;
    }

    fn refresh_shadow_camera(&mut self) {
        if self.use_shadow && self.loaded && self.shadow_camera.is_some() {
            self.update_shadow_camera();
        }
    }

    fn update_shadow_camera(&mut self) {
        let direction = self.target - self.position;
        let up = if direction.cross(Vector3::unit_y()).magnitude2() < 1e-8 {
            // Light looks straight along world-up; fall back to a stable up.
            Vector3::unit_z()
        } else {
            Vector3::unit_y()
        };

        let (width, height) = self.shadow_map_size;
        let (near, far) = self.shadow_near_far();
        let Some(camera) = self.shadow_camera.as_mut() else {
            return;
        };
        camera.set_position(self.position);
        camera.set_view(self.target);
        camera.set_up(up);
        camera.set_perspective(self.spot_angle_deg, width as f32 / height as f32, near, far);
        self.depth_vp = camera.view_projection_matrix();
    }
}

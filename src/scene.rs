//! Draw orchestration: frame state, passes and the transparency queue.
//!
//! A [`Scene`] owns drawables and lights and runs the per-frame protocol:
//! transform and camera updates first, then one shadow pass per shadow-casting
//! light, then the color pass. During the color pass transparent drawables
//! defer themselves into the [`TransparencyQueue`]; the queue is flushed
//! back-to-front once every opaque draw has been issued. Queue membership is
//! rebuilt every frame, never persisted.
//!
//! Instead of handing drawables a back-pointer to the scene, the scene passes
//! a read-only [`SceneEnvironment`] into `load` and a [`FrameState`] into
//! `draw`.

use crate::{
    camera::Camera,
    drawables::{light::Light, mesh::Mesh},
    error::SceneError,
    render::{
        ObjectRender, PropertyKind, PropertyValue, RenderBackend, SamplerKind, TextureHandle,
    },
};

/// User override for scene transparency handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransparencyMode {
    /// Transparency is used as soon as a transparent drawable shows up.
    #[default]
    Auto,
    ForceOff,
    ForceOn,
}

/// Linear fog parameters registered onto every main-pass render handle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fog {
    pub color: [f32; 3],
    pub near: f32,
    pub far: f32,
}

/// Which pass the current draw traversal belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Pass {
    Color,
    Shadow(ShadowPass),
}

/// Per-pass data of a depth-only render from one light's point of view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowPass {
    pub light_position: [f32; 3],
    /// The shadow camera's view-projection; drawables render with
    /// `depth_vp * model` instead of the viewer camera's MVP.
    pub depth_vp: [[f32; 4]; 4],
    pub camera_near_far: [f32; 2],
    pub point_light: bool,
}

/// Per-frame deferral structure for back-to-front alpha blending.
///
/// Entries are `(distance-to-camera, object key)` pairs; flushing yields keys
/// ordered by non-increasing distance. Drawables with unset distance never get
/// inserted (they draw immediately instead).
#[derive(Debug, Default)]
pub struct TransparencyQueue {
    entries: Vec<(f32, usize)>,
}

impl TransparencyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, distance: f32, key: usize) {
        self.entries.push((distance, key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empty the queue, yielding object keys farthest-first. Ties keep
    /// insertion order.
    pub fn drain_back_to_front(&mut self) -> Vec<usize> {
        self.entries.sort_by(|a, b| b.0.total_cmp(&a.0));
        self.entries.drain(..).map(|(_, key)| key).collect()
    }
}

/// Read-only state a drawable consults while drawing one frame.
#[derive(Debug)]
pub struct FrameState {
    pub pass: Pass,
    pub use_depth: bool,
    pub transparency_mode: TransparencyMode,
    /// Set by drawables that want a transparent pass next frame; honored
    /// unless the user forced transparency off.
    pub use_transparency: bool,
    pub queue: TransparencyQueue,
}

impl FrameState {
    pub fn new(pass: Pass, use_depth: bool, transparency_mode: TransparencyMode) -> Self {
        Self {
            pass,
            use_depth,
            transparency_mode,
            use_transparency: transparency_mode == TransparencyMode::ForceOn,
            queue: TransparencyQueue::new(),
        }
    }

    pub fn is_shadow_pass(&self) -> bool {
        matches!(self.pass, Pass::Shadow(_))
    }

    /// A transparent drawable announces itself. Ignored under `ForceOff`.
    pub fn request_transparency(&mut self) {
        if self.transparency_mode != TransparencyMode::ForceOff {
            self.use_transparency = true;
        }
    }
}

/// Scene-level light/fog/shadow data registered onto main-pass render handles
/// at load time and refreshed before every color pass.
#[derive(Debug, Default)]
pub struct SceneEnvironment {
    pub light_positions: Vec<[f32; 3]>,
    pub light_colors: Vec<[f32; 3]>,
    pub light_powers: Vec<f32>,
    pub fog: Option<Fog>,

    pub shadow_maps: Vec<TextureHandle>,
    pub shadow_vp_matrices: Vec<[[f32; 4]; 4]>,
    pub shadow_biases: Vec<f32>,
    pub shadow_near_fars: Vec<[f32; 2]>,
    pub shadow_cascades: Vec<i32>,
}

impl SceneEnvironment {
    /// Register the whole block onto one main-pass render handle.
    pub fn register_on(&self, render: &mut dyn ObjectRender) {
        render.set_property(
            PropertyKind::NumLights,
            PropertyValue::Int(self.light_positions.len() as i32),
        );
        render.set_property(
            PropertyKind::LightPositions,
            PropertyValue::Float3Vec(self.light_positions.clone()),
        );
        render.set_property(
            PropertyKind::LightColors,
            PropertyValue::Float3Vec(self.light_colors.clone()),
        );
        render.set_property(
            PropertyKind::LightPowers,
            PropertyValue::FloatVec(self.light_powers.clone()),
        );

        if let Some(fog) = self.fog {
            render.set_property(PropertyKind::FogColor, PropertyValue::Float3(fog.color));
            render.set_property(
                PropertyKind::FogRange,
                PropertyValue::Float2([fog.near, fog.far]),
            );
        }

        render.set_texture_array(SamplerKind::ShadowMap, self.shadow_maps.clone());
        render.set_property(
            PropertyKind::NumShadows,
            PropertyValue::Int(self.shadow_maps.len() as i32),
        );
        render.set_property(
            PropertyKind::DepthVpMatrix,
            PropertyValue::Matrix4Vec(self.shadow_vp_matrices.clone()),
        );
        render.set_property(
            PropertyKind::ShadowBias,
            PropertyValue::FloatVec(self.shadow_biases.clone()),
        );
        render.set_property(
            PropertyKind::ShadowCameraNearFar,
            PropertyValue::Float2Vec(self.shadow_near_fars.clone()),
        );
        render.set_property(
            PropertyKind::ShadowCascades,
            PropertyValue::IntVec(self.shadow_cascades.clone()),
        );
    }
}

/// Owns the drawables and lights of one renderable world and runs the
/// per-frame draw protocol against a backend.
pub struct Scene {
    objects: Vec<Mesh>,
    lights: Vec<Light>,
    camera: Camera,
    pub fog: Option<Fog>,
    pub transparency_mode: TransparencyMode,
    pub use_depth: bool,
    use_transparency: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            lights: Vec::new(),
            camera: Camera::new(),
            fog: None,
            transparency_mode: TransparencyMode::Auto,
            use_depth: true,
            use_transparency: false,
        }
    }

    pub fn add_object(&mut self, object: Mesh) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn object(&self, key: usize) -> Option<&Mesh> {
        self.objects.get(key)
    }

    pub fn object_mut(&mut self, key: usize) -> Option<&mut Mesh> {
        self.objects.get_mut(key)
    }

    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    pub fn light_mut(&mut self, key: usize) -> Option<&mut Light> {
        self.lights.get_mut(key)
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn uses_transparency(&self) -> bool {
        self.use_transparency
    }

    fn casts_shadows(&self) -> bool {
        self.lights.iter().any(Light::uses_shadow)
    }

    /// Assemble the light/fog/shadow property block from loaded lights.
    pub fn environment(&self) -> SceneEnvironment {
        let mut env = SceneEnvironment {
            fog: self.fog,
            ..Default::default()
        };
        for light in &self.lights {
            env.light_positions.push(light.position().into());
            env.light_colors.push(light.color().into());
            env.light_powers.push(light.power());

            if let Some(map) = light.shadow_map() {
                let (near, far) = light.shadow_near_far();
                env.shadow_maps.push(map);
                env.shadow_vp_matrices.push(light.depth_vp_matrix().into());
                env.shadow_biases.push(light.shadow_bias());
                env.shadow_near_fars.push([near, far]);
                env.shadow_cascades.push(1);
            }
        }
        env
    }

    /// Load every light's shadow resources, then every drawable's render
    /// handles. Shadow resources come first so the environment block can
    /// reference the shadow maps.
    pub fn load(&mut self, backend: &mut dyn RenderBackend) -> Result<(), SceneError> {
        for light in &mut self.lights {
            light.load_shadow(backend)?;
        }
        let env = self.environment();
        let shadows = self.casts_shadows();
        for object in &mut self.objects {
            object.load(backend, Some(&env))?;
            if shadows {
                object.load_shadow(backend, Some(&env))?;
            }
        }
        Ok(())
    }

    /// Re-derive view-dependent state: distances to camera and the
    /// transparent sub-unit order of every drawable. Must run after all
    /// transform mutations of the frame and before any draw.
    pub fn update_transforms(&mut self) {
        for object in &mut self.objects {
            object.update_view(&self.camera);
            object.sort_transparent_submeshes(self.use_depth, self.transparency_mode);
        }
    }

    /// Move one drawable and immediately restore ordering invariants, the
    /// same work [`update_transforms`](Self::update_transforms) does on a
    /// camera change.
    pub fn set_object_transform(
        &mut self,
        key: usize,
        position: cgmath::Vector3<f32>,
        rotation: cgmath::Quaternion<f32>,
        scale: cgmath::Vector3<f32>,
    ) {
        let (use_depth, mode) = (self.use_depth, self.transparency_mode);
        if let Some(object) = self.objects.get_mut(key) {
            object.set_transform(position, rotation, scale);
            object.sort_transparent_submeshes(use_depth, mode);
        }
    }

    /// Draw one frame: all shadow passes, then the color pass with the
    /// transparency queue flushed back-to-front at the end.
    pub fn render_frame(&mut self, backend: &mut dyn RenderBackend) {
        self.render_shadow_passes(backend);
        self.render_color_pass(backend);
    }

    fn render_shadow_passes(&mut self, backend: &mut dyn RenderBackend) {
        for light in &self.lights {
            if light.shadow_map().is_none() {
                continue;
            }
            let (near, far) = light.shadow_near_far();
            let mut frame = FrameState::new(
                Pass::Shadow(ShadowPass {
                    light_position: light.position().into(),
                    depth_vp: light.depth_vp_matrix().into(),
                    camera_near_far: [near, far],
                    point_light: light.is_point(),
                }),
                self.use_depth,
                self.transparency_mode,
            );
            for key in 0..self.objects.len() {
                self.objects[key].draw(key, &mut frame, backend);
            }
        }
    }

    fn render_color_pass(&mut self, backend: &mut dyn RenderBackend) {
        // Lights may have moved since load; push the current light/shadow
        // block before any color draw reads it.
        let env = self.environment();
        for object in &mut self.objects {
            object.refresh_environment(&env);
        }

        let mut frame = FrameState::new(Pass::Color, self.use_depth, self.transparency_mode);

        for key in 0..self.objects.len() {
            self.objects[key].draw(key, &mut frame, backend);
        }

        // All opaque draws are issued; flush deferred transparents.
        for key in frame.queue.drain_back_to_front() {
            self.objects[key].draw_deferred(&frame, backend);
        }

        self.use_transparency = frame.use_transparency;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_flushes_farthest_first() {
        let mut queue = TransparencyQueue::new();
        queue.insert(4.0, 0);
        queue.insert(9.5, 1);
        queue.insert(1.25, 2);
        queue.insert(9.5, 3);

        assert_eq!(queue.drain_back_to_front(), vec![1, 3, 0, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn force_off_suppresses_transparency_requests() {
        let mut frame = FrameState::new(Pass::Color, true, TransparencyMode::ForceOff);
        frame.request_transparency();
        assert!(!frame.use_transparency);

        let mut frame = FrameState::new(Pass::Color, true, TransparencyMode::Auto);
        frame.request_transparency();
        assert!(frame.use_transparency);
    }
}

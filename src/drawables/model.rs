//! Model payload: skeleton, morph targets and animation clips of an imported
//! mesh.
//!
//! Bone matrices live in a flat array indexed by joint order; poses are
//! written into slots, never restructure the skeleton. Lookups by name or
//! index report misses instead of panicking, so scripted animation against a
//! hot-swapped asset degrades to log noise.

use cgmath::Matrix4;
use log::error;

use crate::{
    drawables::mesh::{Mesh, MeshPayload},
    error::SceneError,
    resources::animation::AnimationClip,
    data_structures::bone::Bone,
};

/// Up to 8 morph position deltas fit the attribute budget, 4 when normal
/// deltas ride along.
pub const MAX_MORPH_TARGETS: usize = 8;
pub const MAX_MORPH_TARGETS_WITH_NORMALS: usize = 4;

pub struct ModelData {
    pub skeleton: Option<Bone>,
    /// Flat joint-order pose matrices uploaded as one property.
    pub bones_matrix: Vec<[[f32; 4]; 4]>,
    pub skinning: bool,

    pub morph_targets: bool,
    pub morph_weights: Vec<f32>,
    /// Author-given morph target names, when the asset carried them.
    pub morph_names: Vec<(String, usize)>,

    pub animations: Vec<AnimationClip>,
}

impl Default for ModelData {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelData {
    pub fn new() -> Self {
        Self {
            skeleton: None,
            bones_matrix: Vec::new(),
            skinning: false,
            morph_targets: false,
            morph_weights: Vec::new(),
            morph_names: Vec::new(),
            animations: Vec::new(),
        }
    }

    pub fn morph_index(&self, name: &str) -> Option<usize> {
        self.morph_names
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, i)| *i)
    }
}

impl Mesh {
    fn model_data(&self) -> Option<&ModelData> {
        match self.payload() {
            MeshPayload::Model(model) => Some(model),
            _ => None,
        }
    }

    fn model_data_mut(&mut self) -> Option<&mut ModelData> {
        match self.payload_mut() {
            MeshPayload::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn skeleton(&self) -> Option<&Bone> {
        self.model_data().and_then(|m| m.skeleton.as_ref())
    }

    pub fn bone_by_name(&self, name: &str) -> Option<&Bone> {
        self.skeleton().and_then(|root| root.find_by_name(name))
    }

    /// Write one joint's pose matrix into its slot of the flat array. The
    /// next draw uploads the array; nothing else about the skeleton changes.
    pub fn update_bone_matrix(&mut self, joint: usize, matrix: Matrix4<f32>) {
        let Some(model) = self.model_data_mut() else {
            return;
        };
        let Some(slot) = model.bones_matrix.get_mut(joint) else {
            error!("{}", SceneError::out_of_range("bone index"));
            return;
        };
        *slot = matrix.into();
    }

    pub fn morph_weight(&self, index: usize) -> Option<f32> {
        let weight = self
            .model_data()
            .and_then(|m| m.morph_weights.get(index).copied());
        if weight.is_none() {
            error!("{}", SceneError::out_of_range("morph target index"));
        }
        weight
    }

    pub fn morph_weight_by_name(&self, name: &str) -> Option<f32> {
        let Some(index) = self.model_data().and_then(|m| m.morph_index(name)) else {
            error!("{}", SceneError::out_of_range("morph target name"));
            return None;
        };
        self.morph_weight(index)
    }

    pub fn set_morph_weight(&mut self, index: usize, weight: f32) {
        let Some(model) = self.model_data_mut() else {
            return;
        };
        let Some(slot) = model.morph_weights.get_mut(index) else {
            error!("{}", SceneError::out_of_range("morph target index"));
            return;
        };
        *slot = weight;
    }

    pub fn set_morph_weight_by_name(&mut self, name: &str, weight: f32) {
        let Some(index) = self.model_data().and_then(|m| m.morph_index(name)) else {
            error!("{}", SceneError::out_of_range("morph target name"));
            return;
        };
        self.set_morph_weight(index, weight);
    }

    pub fn animations(&self) -> &[AnimationClip] {
        self.model_data().map_or(&[], |m| m.animations.as_slice())
    }

    pub fn animation(&self, index: usize) -> Option<&AnimationClip> {
        let clip = self.model_data().and_then(|m| m.animations.get(index));
        if clip.is_none() {
            error!("{}", SceneError::out_of_range("animation index"));
        }
        clip
    }

    pub fn find_animation(&self, name: &str) -> Option<&AnimationClip> {
        self.animations().iter().find(|clip| clip.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn model_mesh(joints: usize, morphs: usize) -> Mesh {
        let mut mesh = Mesh::new();
        let mut data = ModelData::new();
        data.skinning = joints > 0;
        data.bones_matrix = vec![Matrix4::identity().into(); joints];
        data.morph_targets = morphs > 0;
        data.morph_weights = vec![0.0; morphs];
        mesh.set_payload(MeshPayload::Model(data));
        mesh
    }

    #[test]
    fn bone_update_touches_only_its_slot() {
        let mut mesh = model_mesh(3, 0);
        mesh.update_bone_matrix(1, Matrix4::from_scale(2.0));

        let MeshPayload::Model(model) = mesh.payload() else {
            panic!("expected model payload");
        };
        let identity: [[f32; 4]; 4] = Matrix4::identity().into();
        let scaled: [[f32; 4]; 4] = Matrix4::from_scale(2.0).into();
        assert_eq!(model.bones_matrix[0], identity);
        assert_eq!(model.bones_matrix[1], scaled);
        assert_eq!(model.bones_matrix[2], identity);
    }

    #[test]
    fn out_of_range_bone_is_ignored() {
        let mut mesh = model_mesh(2, 0);
        mesh.update_bone_matrix(7, Matrix4::from_scale(2.0));
        let MeshPayload::Model(model) = mesh.payload() else {
            panic!("expected model payload");
        };
        let identity: [[f32; 4]; 4] = Matrix4::identity().into();
        assert!(model.bones_matrix.iter().all(|m| *m == identity));
    }

    #[test]
    fn morph_weights_by_index_and_name() {
        let mut mesh = model_mesh(0, 2);
        if let MeshPayload::Model(model) = mesh.payload_mut() {
            model.morph_names = vec![("smile".to_string(), 1)];
        }

        mesh.set_morph_weight(0, 0.25);
        mesh.set_morph_weight_by_name("smile", 0.75);

        assert_eq!(mesh.morph_weight(0), Some(0.25));
        assert_eq!(mesh.morph_weight_by_name("smile"), Some(0.75));
        assert_eq!(mesh.morph_weight(5), None);
    }
}

//! Model asset import.
//!
//! Loaders parse a file into a [`ModelAsset`] first and only then commit it
//! into a [`Mesh`], so a failed import never leaves a half-mutated drawable
//! behind. The format is picked by file extension.

pub mod animation;
mod gltf;
mod obj;

use std::path::Path;

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::{
        bone::Bone,
        buffer::{IndexData, VertexData},
        material::Material,
    },
    drawables::{
        mesh::{Mesh, MeshPayload, SubMesh},
        model::ModelData,
    },
    error::SceneError,
    resources::animation::AnimationClip,
};

/// One sub-unit of a parsed model before it becomes part of a mesh.
pub struct SubMeshDesc {
    pub material: Material,
    pub index_offset: usize,
    pub index_count: usize,
}

/// A fully parsed model file.
#[derive(Default)]
pub struct ModelAsset {
    pub vertices: VertexData,
    pub indices: IndexData,
    pub submeshes: Vec<SubMeshDesc>,

    pub skeleton: Option<Bone>,
    pub joint_count: usize,

    pub has_morph_targets: bool,
    pub morph_weights: Vec<f32>,
    pub morph_names: Vec<(String, usize)>,

    pub animations: Vec<AnimationClip>,
}

/// Load a model file (`.obj`, `.gltf` or `.glb`) into a drawable mesh.
pub fn load_model(path: &str) -> Result<Mesh, SceneError> {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let asset = match extension.as_str() {
        "obj" => obj::load(path)?,
        "gltf" | "glb" => gltf::load(path)?,
        other => {
            return Err(SceneError::UnsupportedEncoding {
                what: format!("model format {other:?}"),
            });
        }
    };
    Ok(mesh_from_asset(asset))
}

fn mesh_from_asset(asset: ModelAsset) -> Mesh {
    let submeshes = asset
        .submeshes
        .into_iter()
        .map(|d| SubMesh::new(Some(d.material), d.index_offset, d.index_count))
        .collect();

    let mut mesh = Mesh::with_geometry(asset.vertices, asset.indices, submeshes);
    let mut data = ModelData::new();
    data.skinning = asset.skeleton.is_some();
    data.bones_matrix = vec![Matrix4::identity().into(); asset.joint_count];
    data.skeleton = asset.skeleton;
    data.morph_targets = asset.has_morph_targets;
    data.morph_weights = asset.morph_weights;
    data.morph_names = asset.morph_names;
    data.animations = asset.animations;
    mesh.set_payload(MeshPayload::Model(data));
    mesh
}

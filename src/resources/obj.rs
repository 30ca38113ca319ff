//! Wavefront OBJ import.
//!
//! Indices are bucketed per material and written out bucket by bucket, so
//! each material's sub-unit covers one contiguous, gap-free index range. A
//! missing or broken material library degrades to untextured white, it never
//! fails the import.

use std::path::Path;

use cgmath::Vector4;
use log::warn;

use crate::{
    data_structures::{
        buffer::{AttributeKind, IndexData, VertexData},
        material::Material,
    },
    error::SceneError,
    resources::{ModelAsset, SubMeshDesc},
};

pub fn load(path: &str) -> Result<ModelAsset, SceneError> {
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| SceneError::parse(path, e))?;

    let materials = match materials {
        Ok(materials) => materials,
        Err(e) => {
            warn!("material library of {path} could not be loaded: {e}");
            Vec::new()
        }
    };
    let base_dir = Path::new(path).parent().unwrap_or_else(|| Path::new(""));

    let mut vertices = VertexData::new();
    vertices.add_attribute(AttributeKind::Position, 3);
    vertices.add_attribute(AttributeKind::TexCoord, 2);
    vertices.add_attribute(AttributeKind::Normal, 3);

    let bucket_count = materials.len().max(1);
    let mut buckets: Vec<Vec<u32>> = vec![Vec::new(); bucket_count];

    for model in &models {
        let mesh = &model.mesh;
        let base = vertices.count() as u32;
        let vertex_count = mesh.positions.len() / 3;
        for v in 0..vertex_count {
            let (tu, tv) = if mesh.texcoords.len() >= (v + 1) * 2 {
                // OBJ texcoords have their origin at the bottom-left.
                (mesh.texcoords[v * 2], 1.0 - mesh.texcoords[v * 2 + 1])
            } else {
                (0.0, 0.0)
            };
            let normal = if mesh.normals.len() >= (v + 1) * 3 {
                [
                    mesh.normals[v * 3],
                    mesh.normals[v * 3 + 1],
                    mesh.normals[v * 3 + 2],
                ]
            } else {
                [0.0, 0.0, 1.0]
            };
            vertices.push_vertex(&[
                mesh.positions[v * 3],
                mesh.positions[v * 3 + 1],
                mesh.positions[v * 3 + 2],
                tu,
                tv,
                normal[0],
                normal[1],
                normal[2],
            ]);
        }

        let bucket = mesh
            .material_id
            .filter(|id| *id < bucket_count)
            .unwrap_or(0);
        buckets[bucket].extend(mesh.indices.iter().map(|i| i + base));
    }

    let mut indices = IndexData::new();
    let mut submeshes = Vec::new();
    for (id, bucket) in buckets.into_iter().enumerate() {
        if bucket.is_empty() {
            continue;
        }
        let index_offset = indices.count();
        let index_count = bucket.len();
        indices.extend(bucket);
        submeshes.push(SubMeshDesc {
            material: convert_material(materials.get(id), base_dir),
            index_offset,
            index_count,
        });
    }

    Ok(ModelAsset {
        vertices,
        indices,
        submeshes,
        ..Default::default()
    })
}

fn convert_material(source: Option<&tobj::Material>, base_dir: &Path) -> Material {
    let mut material = Material::new();
    let Some(source) = source else {
        return material;
    };

    let diffuse = source.diffuse.unwrap_or([1.0, 1.0, 1.0]);
    // Dissolve below 1 marks the material transparent via the alpha channel.
    let dissolve = source.dissolve.unwrap_or(1.0);
    material.set_color(Vector4::new(diffuse[0], diffuse[1], diffuse[2], dissolve));

    if let Some(texture) = source.diffuse_texture.as_deref()
        && !texture.is_empty()
    {
        material.set_texture_path(&base_dir.join(texture).to_string_lossy());
    }
    material
}

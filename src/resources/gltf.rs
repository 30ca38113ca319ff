//! glTF 2.0 import: geometry, materials, skin, morph targets and animations.
//!
//! All primitives of the first mesh land in one shared interleaved vertex
//! buffer plus one shared index buffer; each primitive becomes a sub-unit
//! addressing its own contiguous index range. The attribute layout is fixed
//! up front from what the primitives declare; attributes a primitive lacks
//! are filled with zeros.
//!
//! Unsupported encodings are contained: a non-float animation channel or a
//! non-float inverse-bind accessor is reported and skipped, the rest of the
//! asset still loads.

use std::{
    collections::HashMap,
    fs,
    io::BufReader,
    path::Path,
};

use cgmath::{Matrix4, Quaternion, Vector3, Vector4};
use gltf::{
    Gltf, Semantic,
    accessor::{DataType, Dimensions},
    animation::util::ReadOutputs,
    buffer,
};
use log::{error, warn};
use serde_json::Value;

use crate::{
    data_structures::{
        bone::Bone,
        buffer::{AttributeKind, IndexData, VertexData},
        material::Material,
        texture::TextureData,
    },
    drawables::model::{MAX_MORPH_TARGETS, MAX_MORPH_TARGETS_WITH_NORMALS},
    error::SceneError,
    resources::{
        ModelAsset, SubMeshDesc,
        animation::{AnimationClip, AnimationTrack, Keyframes, TrackTarget},
    },
};

pub fn load(path: &str) -> Result<ModelAsset, SceneError> {
    let file = fs::File::open(path).map_err(|e| SceneError::parse(path, e))?;
    let doc = Gltf::from_reader(BufReader::new(file)).map_err(|e| SceneError::parse(path, e))?;
    let base_dir = Path::new(path).parent().unwrap_or_else(|| Path::new(""));

    let buffers = load_buffers(&doc, path, base_dir)?;
    let mesh = doc
        .meshes()
        .next()
        .ok_or_else(|| SceneError::parse(path, "file contains no mesh"))?;
    let first = mesh
        .primitives()
        .next()
        .ok_or_else(|| SceneError::parse(path, "mesh has no primitives"))?;

    // Fix the interleaved layout from what the primitives declare.
    let mut has_texcoords = false;
    let mut has_normals = false;
    let mut has_joints = false;
    for primitive in mesh.primitives() {
        has_texcoords |= primitive.get(&Semantic::TexCoords(0)).is_some();
        has_normals |= primitive.get(&Semantic::Normals).is_some();
        has_joints |= primitive.get(&Semantic::Joints(0)).is_some()
            && primitive.get(&Semantic::Weights(0)).is_some();
    }
    let morph_normals = first.morph_targets().any(|t| t.normals().is_some());
    let morph_budget = if morph_normals {
        MAX_MORPH_TARGETS_WITH_NORMALS
    } else {
        MAX_MORPH_TARGETS
    };
    let declared_targets = first.morph_targets().count();
    let morph_count = declared_targets.min(morph_budget);
    if declared_targets > morph_count {
        warn!(
            "{path}: only {morph_count} of {declared_targets} morph targets fit the attribute budget"
        );
    }

    let mut vertices = VertexData::new();
    vertices.add_attribute(AttributeKind::Position, 3);
    if has_texcoords {
        vertices.add_attribute(AttributeKind::TexCoord, 2);
    }
    if has_normals {
        vertices.add_attribute(AttributeKind::Normal, 3);
    }
    if has_joints {
        vertices.add_attribute(AttributeKind::BoneIds, 4);
        vertices.add_attribute(AttributeKind::BoneWeights, 4);
    }
    for target in 0..morph_count {
        vertices.add_attribute(AttributeKind::MorphTarget(target as u8), 3);
    }
    if morph_normals {
        for target in 0..morph_count {
            vertices.add_attribute(AttributeKind::MorphNormal(target as u8), 3);
        }
    }

    let mut indices = IndexData::new();
    let mut submeshes = Vec::new();
    for primitive in mesh.primitives() {
        let reader = primitive.reader(|b| buffers.get(b.index()).map(Vec::as_slice));
        let Some(read_positions) = reader.read_positions() else {
            warn!("{path}: primitive without positions skipped");
            continue;
        };
        let positions: Vec<[f32; 3]> = read_positions.collect();
        let texcoords: Option<Vec<[f32; 2]>> =
            reader.read_tex_coords(0).map(|t| t.into_f32().collect());
        let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
        let joints: Option<Vec<[u16; 4]>> = reader.read_joints(0).map(|j| j.into_u16().collect());
        let weights: Option<Vec<[f32; 4]>> =
            reader.read_weights(0).map(|w| w.into_f32().collect());
        let morphs: Vec<(Option<Vec<[f32; 3]>>, Option<Vec<[f32; 3]>>)> = reader
            .read_morph_targets()
            .take(morph_count)
            .map(|(p, n, _)| (p.map(Iterator::collect), n.map(Iterator::collect)))
            .collect();

        let base = vertices.count() as u32;
        let mut record = Vec::with_capacity(vertices.item_size());
        for v in 0..positions.len() {
            record.clear();
            record.extend_from_slice(&positions[v]);
            if has_texcoords {
                let uv = texcoords
                    .as_ref()
                    .and_then(|t| t.get(v).copied())
                    .unwrap_or([0.0; 2]);
                record.extend_from_slice(&uv);
            }
            if has_normals {
                let normal = normals
                    .as_ref()
                    .and_then(|n| n.get(v).copied())
                    .unwrap_or([0.0; 3]);
                record.extend_from_slice(&normal);
            }
            if has_joints {
                let ids = joints
                    .as_ref()
                    .and_then(|j| j.get(v).copied())
                    .unwrap_or([0; 4]);
                record.extend(ids.iter().map(|&id| id as f32));
                let weight = weights
                    .as_ref()
                    .and_then(|w| w.get(v).copied())
                    .unwrap_or([0.0; 4]);
                record.extend_from_slice(&weight);
            }
            for target in 0..morph_count {
                let delta = morphs
                    .get(target)
                    .and_then(|(p, _)| p.as_ref())
                    .and_then(|p| p.get(v).copied())
                    .unwrap_or([0.0; 3]);
                record.extend_from_slice(&delta);
            }
            if morph_normals {
                for target in 0..morph_count {
                    let delta = morphs
                        .get(target)
                        .and_then(|(_, n)| n.as_ref())
                        .and_then(|n| n.get(v).copied())
                        .unwrap_or([0.0; 3]);
                    record.extend_from_slice(&delta);
                }
            }
            vertices.push_vertex(&record);
        }

        let primitive_indices: Vec<u32> = match reader.read_indices() {
            Some(read) => read.into_u32().map(|i| i + base).collect(),
            None => (base..base + positions.len() as u32).collect(),
        };
        let index_offset = indices.count();
        let index_count = primitive_indices.len();
        indices.extend(primitive_indices);
        submeshes.push(SubMeshDesc {
            material: convert_material(&primitive.material(), path, base_dir, &buffers),
            index_offset,
            index_count,
        });
    }

    // Skeleton.
    let mut skeleton = None;
    let mut joint_count = 0;
    let mut joint_slots: HashMap<usize, usize> = HashMap::new();
    let skin = doc
        .nodes()
        .find_map(|node| {
            (node.mesh().map(|m| m.index()) == Some(mesh.index()))
                .then(|| node.skin())
                .flatten()
        })
        .or_else(|| doc.skins().next());
    if let Some(skin) = skin {
        let joint_nodes: Vec<gltf::Node> = skin.joints().collect();
        joint_slots = joint_nodes
            .iter()
            .enumerate()
            .map(|(slot, node)| (node.index(), slot))
            .collect();
        match inverse_bind_blob(&skin, &buffers) {
            Ok(blob) => {
                let root = skin
                    .skeleton()
                    .or_else(|| find_skeleton_root(&doc, &joint_nodes, &joint_slots));
                if let Some(root) = root {
                    joint_count = joint_nodes.len();
                    skeleton = Some(build_bone(&root, &joint_slots, blob));
                }
            }
            Err(e) => error!("{path}: skeleton skipped: {e}"),
        }
    }

    // Morph target weights and author-given names.
    let mut morph_weights = vec![0.0; morph_count];
    if let Some(defaults) = mesh.weights() {
        for (slot, weight) in defaults.iter().take(morph_count).enumerate() {
            morph_weights[slot] = *weight;
        }
    }
    let morph_names = morph_target_names(&mesh, morph_count);

    let animations = load_animations(&doc, &buffers, &joint_slots);

    Ok(ModelAsset {
        vertices,
        indices,
        submeshes,
        skeleton,
        joint_count,
        has_morph_targets: morph_count > 0,
        morph_weights,
        morph_names,
        animations,
    })
}

fn load_buffers(doc: &Gltf, path: &str, base_dir: &Path) -> Result<Vec<Vec<u8>>, SceneError> {
    let mut buffers = Vec::new();
    for buffer in doc.buffers() {
        let data = match buffer.source() {
            buffer::Source::Bin => doc
                .blob
                .clone()
                .ok_or_else(|| SceneError::parse(path, "missing binary chunk"))?,
            buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                return Err(SceneError::UnsupportedEncoding {
                    what: "base64 data URI buffer".to_string(),
                });
            }
            buffer::Source::Uri(uri) => {
                fs::read(base_dir.join(uri)).map_err(|e| SceneError::parse(path, e))?
            }
        };
        buffers.push(data);
    }
    Ok(buffers)
}

fn convert_material(
    material: &gltf::Material,
    path: &str,
    base_dir: &Path,
    buffers: &[Vec<u8>],
) -> Material {
    let mut out = Material::new();
    let pbr = material.pbr_metallic_roughness();
    out.set_color(Vector4::from(pbr.base_color_factor()));

    if let Some(info) = pbr.base_color_texture() {
        let image = info.texture().source();
        match image.source() {
            gltf::image::Source::Uri { uri, .. } => {
                out.set_texture_path(&base_dir.join(uri).to_string_lossy());
            }
            gltf::image::Source::View { view, mime_type } => {
                let bytes = buffers
                    .get(view.buffer().index())
                    .and_then(|b| b.get(view.offset()..view.offset() + view.length()));
                let Some(bytes) = bytes else {
                    warn!("{path}: embedded image view out of buffer bounds");
                    return out;
                };
                let name = format!("{path}#image{}", image.index());
                match TextureData::from_bytes(&name, bytes, mime_type.strip_prefix("image/")) {
                    Ok(data) => {
                        out.set_texture_data(data);
                    }
                    Err(e) => warn!("embedded texture skipped: {e}"),
                }
            }
        }
    }
    out
}

/// Raw inverse-bind matrix data of a skin. Anything but tightly packed
/// float mat4 data is an unsupported encoding.
fn inverse_bind_blob<'a>(
    skin: &gltf::Skin,
    buffers: &'a [Vec<u8>],
) -> Result<&'a [u8], SceneError> {
    let accessor = skin
        .inverse_bind_matrices()
        .ok_or_else(|| SceneError::UnsupportedEncoding {
            what: "skin without inverse bind matrices".to_string(),
        })?;
    if accessor.data_type() != DataType::F32 || accessor.dimensions() != Dimensions::Mat4 {
        return Err(SceneError::UnsupportedEncoding {
            what: format!(
                "inverse bind matrices encoded as {:?} {:?}",
                accessor.data_type(),
                accessor.dimensions()
            ),
        });
    }
    let view = accessor
        .view()
        .ok_or_else(|| SceneError::UnsupportedEncoding {
            what: "sparse inverse bind matrices".to_string(),
        })?;
    let start = view.offset() + accessor.offset();
    buffers
        .get(view.buffer().index())
        .and_then(|b| b.get(start..start + accessor.count() * 64))
        .ok_or_else(|| SceneError::UnsupportedEncoding {
            what: "inverse bind matrices out of buffer bounds".to_string(),
        })
}

/// Decode one column-major mat4 out of the inverse-bind blob.
fn inverse_bind_matrix(blob: &[u8], slot: usize) -> Matrix4<f32> {
    let start = slot * 64;
    if blob.len() < start + 64 {
        return Matrix4::from_scale(1.0);
    }
    let mut m = [0.0f32; 16];
    for (i, value) in m.iter_mut().enumerate() {
        let at = start + i * 4;
        *value = f32::from_le_bytes([blob[at], blob[at + 1], blob[at + 2], blob[at + 3]]);
    }
    Matrix4::new(
        m[0], m[1], m[2], m[3], m[4], m[5], m[6], m[7], m[8], m[9], m[10], m[11], m[12], m[13],
        m[14], m[15],
    )
}

/// A joint whose parent is not itself a joint roots the skeleton.
fn find_skeleton_root<'a>(
    doc: &'a Gltf,
    joints: &[gltf::Node<'a>],
    joint_slots: &HashMap<usize, usize>,
) -> Option<gltf::Node<'a>> {
    let mut parents = HashMap::new();
    for node in doc.nodes() {
        for child in node.children() {
            parents.insert(child.index(), node.index());
        }
    }
    joints
        .iter()
        .find(|joint| {
            parents
                .get(&joint.index())
                .is_none_or(|parent| !joint_slots.contains_key(parent))
        })
        .cloned()
}

fn build_bone(node: &gltf::Node, joint_slots: &HashMap<usize, usize>, blob: &[u8]) -> Bone {
    let mut bone = Bone::new(node.name().unwrap_or("unnamed"));
    let (translation, rotation, scale) = node.transform().decomposed();
    bone.set_bind_pose(
        Vector3::from(translation),
        Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
        Vector3::from(scale),
    );
    bone.move_to_bind();
    if let Some(&slot) = joint_slots.get(&node.index()) {
        bone.set_index(Some(slot));
        bone.set_offset_matrix(inverse_bind_matrix(blob, slot));
    }
    for child in node.children() {
        bone.add_child(build_bone(&child, joint_slots, blob));
    }
    bone
}

fn morph_target_names(mesh: &gltf::Mesh, morph_count: usize) -> Vec<(String, usize)> {
    let Some(raw) = mesh.extras().as_deref() else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<Value>(raw.get()) else {
        return Vec::new();
    };
    let Some(names) = value.get("targetNames").and_then(Value::as_array) else {
        return Vec::new();
    };
    names
        .iter()
        .take(morph_count)
        .enumerate()
        .filter_map(|(slot, name)| name.as_str().map(|n| (n.to_string(), slot)))
        .collect()
}

/// Import every animation. A channel with a non-float value encoding is
/// reported and skipped; the clip keeps its other channels.
fn load_animations(
    doc: &Gltf,
    buffers: &[Vec<u8>],
    joint_slots: &HashMap<usize, usize>,
) -> Vec<AnimationClip> {
    let mut animations = Vec::new();
    for (index, animation) in doc.animations().enumerate() {
        let name = animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("animation{index}"));
        let mut clip = AnimationClip::new(&name);

        for (channel_index, channel) in animation.channels().enumerate() {
            let output = channel.sampler().output();
            if output.data_type() != DataType::F32 {
                error!(
                    "animation {name:?} channel {channel_index}: {}",
                    SceneError::UnsupportedEncoding {
                        what: format!("keyframe values encoded as {:?}", output.data_type()),
                    }
                );
                continue;
            }
            let reader = channel.reader(|b| buffers.get(b.index()).map(Vec::as_slice));
            let Some(inputs) = reader.read_inputs() else {
                warn!("animation {name:?} channel {channel_index}: no keyframe times");
                continue;
            };
            let timestamps: Vec<f32> = inputs.collect();
            let Some(outputs) = reader.read_outputs() else {
                warn!("animation {name:?} channel {channel_index}: no keyframe values");
                continue;
            };

            let keyframes = match outputs {
                ReadOutputs::Translations(iter) => {
                    Keyframes::Translation(iter.map(Vector3::from).collect())
                }
                ReadOutputs::Rotations(rotations) => Keyframes::Rotation(
                    rotations
                        .into_f32()
                        .map(|q| Quaternion::new(q[3], q[0], q[1], q[2]))
                        .collect(),
                ),
                ReadOutputs::Scales(iter) => Keyframes::Scale(iter.map(Vector3::from).collect()),
                ReadOutputs::MorphTargetWeights(weights) => {
                    let flat: Vec<f32> = weights.into_f32().collect();
                    let per_frame = if timestamps.is_empty() {
                        flat.len()
                    } else {
                        flat.len() / timestamps.len()
                    };
                    Keyframes::MorphWeights(
                        flat.chunks(per_frame.max(1)).map(<[f32]>::to_vec).collect(),
                    )
                }
            };

            let target = joint_slots
                .get(&channel.target().node().index())
                .map_or(TrackTarget::Root, |&slot| TrackTarget::Bone(slot));
            clip.add_track(AnimationTrack::new(target, timestamps, keyframes));
        }
        animations.push(clip);
    }
    animations
}

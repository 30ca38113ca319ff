use std::fs;
use std::path::PathBuf;

use luma_ngin::{Mesh, MeshPayload, SceneError, SubMesh, load_model};

use crate::common::test_utils::{RecordingBackend, init_logger};

mod common;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("luma-ngin-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_two_material_obj(dir: &PathBuf) -> PathBuf {
    fs::write(
        dir.join("parts.mtl"),
        "newmtl red\nKd 1.0 0.0 0.0\nd 1.0\n\nnewmtl glass\nKd 0.0 0.0 1.0\nd 0.5\n",
    )
    .unwrap();
    let obj = dir.join("parts.obj");
    fs::write(
        &obj,
        concat!(
            "mtllib parts.mtl\n",
            "o solid\n",
            "v 0.0 0.0 0.0\nv 1.0 0.0 0.0\nv 0.0 1.0 0.0\n",
            "usemtl red\n",
            "f 1 2 3\n",
            "o window\n",
            "v 2.0 0.0 0.0\nv 3.0 0.0 0.0\nv 2.0 1.0 0.0\n",
            "usemtl glass\n",
            "f 4 5 6\n",
        ),
    )
    .unwrap();
    obj
}

/// Sub-unit ranges must tile the index buffer: contiguous, gap-free, in sum
/// covering every index.
fn assert_ranges_cover_index_buffer(mesh: &Mesh) {
    let mut ranges: Vec<(usize, usize)> = mesh
        .submeshes()
        .iter()
        .map(|s| (s.index_offset(), s.index_count()))
        .collect();
    ranges.sort();
    let mut cursor = 0;
    for (offset, count) in ranges {
        assert_eq!(offset, cursor);
        cursor += count;
    }
    assert_eq!(cursor, mesh.indices().count());
}

#[test]
fn obj_import_buckets_one_submesh_per_material() -> anyhow::Result<()> {
    init_logger();
    let dir = scratch_dir("obj");
    let path = write_two_material_obj(&dir);

    let mesh = load_model(&path.to_string_lossy())?;

    assert_eq!(mesh.submeshes().len(), 2);
    assert_eq!(mesh.vertices().count(), 6);
    assert_ranges_cover_index_buffer(&mesh);
    assert!(matches!(mesh.payload(), MeshPayload::Model(_)));

    let glass = mesh
        .submeshes()
        .iter()
        .filter_map(SubMesh::material)
        .find(|m| m.color().w < 1.0)
        .expect("dissolve < 1 material");
    assert!(glass.is_transparent());
    Ok(())
}

#[test]
fn imported_model_loads_and_flags_transparency() -> anyhow::Result<()> {
    init_logger();
    let dir = scratch_dir("obj-load");
    let path = write_two_material_obj(&dir);
    let mut mesh = load_model(&path.to_string_lossy())?;

    let (mut backend, _log) = RecordingBackend::new();
    mesh.load(&mut backend, None)?;

    assert!(mesh.is_loaded());
    // The glass sub-unit's dissolve makes the whole drawable transparent.
    assert!(mesh.is_transparent());
    Ok(())
}

#[test]
fn gltf_import_reads_geometry_and_material() -> anyhow::Result<()> {
    init_logger();
    let dir = scratch_dir("gltf");

    let mut bin = Vec::new();
    for v in [
        [0.0f32, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
    ] {
        for c in v {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    for i in [0u16, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    fs::write(dir.join("tri.bin"), &bin)?;

    let gltf = r#"{
      "asset": {"version": "2.0"},
      "scene": 0,
      "scenes": [{"nodes": [0]}],
      "nodes": [{"mesh": 0}],
      "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "indices": 1, "material": 0}]}],
      "materials": [{"pbrMetallicRoughness": {"baseColorFactor": [1.0, 0.0, 0.0, 0.5]}}],
      "buffers": [{"uri": "tri.bin", "byteLength": 42}],
      "bufferViews": [
        {"buffer": 0, "byteOffset": 0, "byteLength": 36},
        {"buffer": 0, "byteOffset": 36, "byteLength": 6}
      ],
      "accessors": [
        {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
         "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]},
        {"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}
      ]
    }"#;
    let path = dir.join("tri.gltf");
    fs::write(&path, gltf)?;

    let mesh = load_model(&path.to_string_lossy())?;

    assert_eq!(mesh.vertices().count(), 3);
    // Only positions were declared, so the record is three floats wide.
    assert_eq!(mesh.vertices().item_size(), 3);
    assert_eq!(mesh.submeshes().len(), 1);
    assert_ranges_cover_index_buffer(&mesh);

    let material = mesh.submeshes()[0].material().unwrap();
    assert_eq!(material.color().w, 0.5);
    assert!(material.is_transparent());
    Ok(())
}

#[test]
fn missing_file_is_a_parse_error() {
    let Err(err) = load_model("/nonexistent/model.obj") else {
        panic!("loading a missing file must fail");
    };
    assert!(matches!(err, SceneError::AssetParse { .. }));
}

#[test]
fn unknown_extension_is_an_unsupported_encoding() {
    let Err(err) = load_model("model.fbx") else {
        panic!("an unknown extension must be rejected");
    };
    assert!(matches!(err, SceneError::UnsupportedEncoding { .. }));
}

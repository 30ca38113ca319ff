use luma_ngin::{
    Camera, Mesh, One, Quaternion, Scene, SubMesh, TransparencyMode, Vector3, Vector4,
    data_structures::material::Material,
    scene::{FrameState, Pass},
};

use crate::common::test_utils::{RecordingBackend, draw_events, events, quad_mesh};

mod common;

fn transparent_material() -> Material {
    let mut material = Material::new();
    material.set_color(Vector4::new(1.0, 1.0, 1.0, 0.5));
    material
}

/// Three unit quads at x = 0, 10 and 20 with no sub-unit split yet.
fn three_quad_geometry() -> Mesh {
    let mut mesh = Mesh::new();
    for quad in 0..3 {
        let x = quad as f32 * 10.0;
        for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
            mesh.vertices_mut()
                .push_vertex(&[x + dx, dy, 0.0, dx, dy, 0.0, 0.0, 1.0]);
        }
        let base = quad as u32 * 4;
        mesh.indices_mut()
            .extend([base, base + 1, base + 2, base + 2, base + 1, base + 3]);
    }
    mesh
}

/// One sub-unit per quad, listed nearest-first so sorting has work to do.
/// Materials go through `set_submesh_material` so transparency folds into
/// the mesh flag the way it does on load.
fn three_quad_mesh(materials: [Material; 3]) -> Mesh {
    let mut mesh = three_quad_geometry();
    mesh.set_submeshes(vec![
        SubMesh::new(None, 12, 6),
        SubMesh::new(None, 6, 6),
        SubMesh::new(None, 0, 6),
    ]);
    let [far, mid, near] = materials;
    mesh.set_submesh_material(0, near);
    mesh.set_submesh_material(1, mid);
    mesh.set_submesh_material(2, far);
    mesh
}

fn side_camera() -> Camera {
    let mut camera = Camera::new();
    camera.set_position(Vector3::new(25.0, 0.0, 0.0));
    camera.set_view(Vector3::new(0.0, 0.0, 0.0));
    camera
}

fn submesh_offsets(mesh: &Mesh) -> Vec<usize> {
    mesh.submeshes().iter().map(SubMesh::index_offset).collect()
}

#[test]
fn transparent_submeshes_sort_back_to_front() {
    let mut mesh = three_quad_mesh([
        transparent_material(),
        transparent_material(),
        transparent_material(),
    ]);
    mesh.update_view(&side_camera());
    mesh.sort_transparent_submeshes(true, TransparencyMode::Auto);

    // Farthest first: x=0 (distance 25), x=10 (15), x=20 (5).
    assert_eq!(submesh_offsets(&mesh), vec![0, 6, 12]);
    let distances: Vec<f32> = mesh
        .submeshes()
        .iter()
        .map(|s| s.distance_to_camera().unwrap())
        .collect();
    assert!(distances.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn unmeasured_submeshes_draw_before_measured_ones() {
    // The middle quad stays opaque, so its distance is never computed.
    let mut mesh = three_quad_mesh([
        transparent_material(),
        Material::new(),
        transparent_material(),
    ]);
    mesh.update_view(&side_camera());
    mesh.sort_transparent_submeshes(true, TransparencyMode::Auto);

    assert_eq!(submesh_offsets(&mesh), vec![6, 0, 12]);
    assert!(mesh.submeshes()[0].distance_to_camera().is_none());
}

#[test]
fn sort_requires_depth_and_transparency() {
    let materials = || {
        [
            transparent_material(),
            transparent_material(),
            transparent_material(),
        ]
    };

    let mut mesh = three_quad_mesh(materials());
    mesh.update_view(&side_camera());
    mesh.sort_transparent_submeshes(false, TransparencyMode::Auto);
    assert_eq!(submesh_offsets(&mesh), vec![12, 6, 0]);

    let mut mesh = three_quad_mesh(materials());
    mesh.update_view(&side_camera());
    mesh.sort_transparent_submeshes(true, TransparencyMode::ForceOff);
    assert_eq!(submesh_offsets(&mesh), vec![12, 6, 0]);
}

#[test]
fn transparent_materials_alone_do_not_trigger_the_sort() {
    // Sub-unit materials attached without folding leave the mesh flag
    // opaque; the sort waits for the mesh itself to be transparent.
    let mut mesh = three_quad_geometry();
    mesh.set_submeshes(vec![
        SubMesh::new(Some(transparent_material()), 12, 6),
        SubMesh::new(Some(transparent_material()), 6, 6),
        SubMesh::new(Some(transparent_material()), 0, 6),
    ]);
    assert!(!mesh.is_transparent());

    mesh.update_view(&side_camera());
    mesh.sort_transparent_submeshes(true, TransparencyMode::Auto);
    assert_eq!(submesh_offsets(&mesh), vec![12, 6, 0]);
}

#[test]
fn transparency_is_sticky() {
    let mut mesh = quad_mesh();
    assert!(!mesh.is_transparent());
    mesh.set_color(Vector4::new(1.0, 0.0, 0.0, 0.5));
    assert!(mesh.is_transparent());
    mesh.set_color(Vector4::new(1.0, 0.0, 0.0, 1.0));
    assert!(mesh.is_transparent());
}

#[test]
fn transparent_mesh_defers_into_the_queue() {
    let (mut backend, log) = RecordingBackend::new();
    let mut mesh = quad_mesh();
    mesh.set_color(Vector4::new(1.0, 1.0, 1.0, 0.5));
    mesh.load(&mut backend, None).unwrap();
    mesh.update_view(&side_camera());

    let mut frame = FrameState::new(Pass::Color, true, TransparencyMode::Auto);
    assert!(mesh.draw(7, &mut frame, &mut backend));
    assert_eq!(frame.queue.len(), 1);
    assert!(frame.use_transparency);
    assert!(draw_events(&log).is_empty());

    assert!(mesh.draw_deferred(&frame, &mut backend));
    assert_eq!(draw_events(&log), vec![0]);
}

#[test]
fn unset_distance_draws_immediately() {
    let (mut backend, log) = RecordingBackend::new();
    let mut mesh = quad_mesh();
    mesh.set_color(Vector4::new(1.0, 1.0, 1.0, 0.5));
    mesh.load(&mut backend, None).unwrap();
    assert!(mesh.distance_to_camera().is_none());

    let mut frame = FrameState::new(Pass::Color, true, TransparencyMode::Auto);
    assert!(mesh.draw(0, &mut frame, &mut backend));
    assert!(frame.queue.is_empty());
    assert_eq!(draw_events(&log), vec![0]);
}

#[test]
fn scene_flushes_the_queue_farthest_first() {
    let (mut backend, log) = RecordingBackend::new();
    let mut scene = Scene::new();
    scene.camera_mut().set_position(Vector3::new(0.0, 0.0, 10.0));
    scene.camera_mut().set_view(Vector3::new(0.0, 0.0, 0.0));

    let mut far = quad_mesh();
    far.set_color(Vector4::new(1.0, 1.0, 1.0, 0.5));
    let far_key = scene.add_object(far);

    let mut near = quad_mesh();
    near.set_color(Vector4::new(1.0, 1.0, 1.0, 0.5));
    let near_key = scene.add_object(near);

    scene.load(&mut backend).unwrap();
    scene.set_object_transform(
        near_key,
        Vector3::new(0.0, 0.0, 5.0),
        Quaternion::one(),
        Vector3::new(1.0, 1.0, 1.0),
    );
    scene.update_transforms();
    scene.render_frame(&mut backend);

    // far sits at distance 10, near at 5; back-to-front flush draws far first.
    assert_eq!(draw_events(&log), vec![far_key as u64, near_key as u64]);
    assert!(scene.uses_transparency());
    assert!(
        !events(&log).is_empty(),
        "queue flush must issue real draws"
    );
}

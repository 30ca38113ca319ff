//! The mesh drawable: geometry, sub-unit materials and the draw protocol.
//!
//! A [`Mesh`] owns one interleaved vertex buffer, one shared index buffer and
//! a list of [`SubMesh`]es addressing contiguous index ranges of it. Imported
//! models and terrain patches are meshes too; what differs is carried in the
//! [`MeshPayload`] instead of a type hierarchy.
//!
//! Render handles follow an ownership rule: a single sub-unit shares the
//! mesh's own handle, multiple sub-units each own a dedicated one (their
//! materials differ, so their bindings must).

use cgmath::{InnerSpace, Matrix, Matrix4, One, Quaternion, SquareMatrix, Vector3, Vector4};
use log::warn;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::{
    camera::Camera,
    data_structures::{
        buffer::{AttributeKind, IndexData, VertexData},
        material::Material,
        rect::Rect,
        texture::TextureData,
    },
    drawables::{model::ModelData, terrain::TerrainData},
    error::SceneError,
    render::{
        BufferKind, DataType, ObjectRender, PrimitiveKind, ProgramFeatures, PropertyKind,
        PropertyValue, RenderBackend, SamplerKind, TextureUnit, VertexAttributeDesc,
    },
    scene::{FrameState, Pass, SceneEnvironment, TransparencyMode},
};

const VERTEX_BUFFER: &str = "vertices";
const INDEX_BUFFER: &str = "indices";

/// What kind of drawable this mesh is beyond its raw geometry.
pub enum MeshPayload {
    Simple,
    Model(ModelData),
    Terrain(TerrainData),
}

/// Who owns a sub-unit's render handle for one pass.
pub enum HandleOwnership {
    /// Not decided yet; resolved at load time.
    Unresolved,
    /// The sub-unit draws through the mesh's own handle.
    SharesParent,
    Owned(Box<dyn ObjectRender>),
}

impl HandleOwnership {
    fn as_owned_mut(&mut self) -> Option<&mut Box<dyn ObjectRender>> {
        match self {
            HandleOwnership::Owned(render) => Some(render),
            _ => None,
        }
    }
}

/// One contiguous index range of the mesh with an optional material override.
pub struct SubMesh {
    material: Option<Material>,
    index_offset: usize,
    index_count: usize,
    distance_to_camera: Option<f32>,
    render: HandleOwnership,
    shadow_render: HandleOwnership,
}

impl SubMesh {
    /// `index_offset` and `index_count` are in index elements, not bytes.
    pub fn new(material: Option<Material>, index_offset: usize, index_count: usize) -> Self {
        Self {
            material,
            index_offset,
            index_count,
            distance_to_camera: None,
            render: HandleOwnership::Unresolved,
            shadow_render: HandleOwnership::Unresolved,
        }
    }

    pub fn material(&self) -> Option<&Material> {
        self.material.as_ref()
    }

    pub fn index_offset(&self) -> usize {
        self.index_offset
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    /// Distance from the camera to this sub-unit's first indexed vertex in
    /// world space. `None` until a transparent sort computed it.
    pub fn distance_to_camera(&self) -> Option<f32> {
        self.distance_to_camera
    }
}

/// Draw order of transparent sub-units: farthest first, sub-units whose
/// distance was never computed ahead of all measured ones.
fn submesh_draw_order(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => b.total_cmp(&a),
    }
}

pub struct Mesh {
    visible: bool,
    transparent: bool,
    loaded: bool,
    shadow_loaded: bool,
    dynamic: bool,
    primitive: PrimitiveKind,
    scissor: Option<Rect>,

    material: Option<Material>,
    distance_to_camera: Option<f32>,

    position: Vector3<f32>,
    rotation: Quaternion<f32>,
    scale: Vector3<f32>,
    model_matrix: Matrix4<f32>,
    normal_matrix: Matrix4<f32>,
    mvp_matrix: Matrix4<f32>,
    view_projection: Matrix4<f32>,
    camera_position: Vector3<f32>,
    has_view: bool,

    vertices: VertexData,
    indices: IndexData,
    submeshes: Vec<SubMesh>,

    render: Option<Box<dyn ObjectRender>>,
    shadow_render: Option<Box<dyn ObjectRender>>,

    payload: MeshPayload,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Mesh {
    pub fn new() -> Self {
        let mut vertices = VertexData::new();
        vertices.add_attribute(AttributeKind::Position, 3);
        vertices.add_attribute(AttributeKind::TexCoord, 2);
        vertices.add_attribute(AttributeKind::Normal, 3);

        Self::with_geometry(vertices, IndexData::new(), vec![SubMesh::new(None, 0, 0)])
    }

    /// Build a mesh around pre-filled geometry. Sub-unit ranges must address
    /// the given index buffer.
    pub fn with_geometry(
        vertices: VertexData,
        indices: IndexData,
        submeshes: Vec<SubMesh>,
    ) -> Self {
        Self {
            visible: true,
            transparent: false,
            loaded: false,
            shadow_loaded: false,
            dynamic: false,
            primitive: PrimitiveKind::Triangles,
            scissor: None,
            material: None,
            distance_to_camera: None,
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            model_matrix: Matrix4::identity(),
            normal_matrix: Matrix4::identity(),
            mvp_matrix: Matrix4::identity(),
            view_projection: Matrix4::identity(),
            camera_position: Vector3::new(0.0, 0.0, 0.0),
            has_view: false,
            vertices,
            indices,
            submeshes,
            render: None,
            shadow_render: None,
            payload: MeshPayload::Simple,
        }
    }

    pub fn set_payload(&mut self, payload: MeshPayload) {
        self.payload = payload;
    }

    pub fn payload(&self) -> &MeshPayload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut MeshPayload {
        &mut self.payload
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn set_primitive(&mut self, primitive: PrimitiveKind) {
        self.primitive = primitive;
    }

    /// Mark the geometry as mutable after load; buffers get dynamic storage.
    pub fn set_dynamic(&mut self, dynamic: bool) {
        self.dynamic = dynamic;
    }

    pub fn set_scissor(&mut self, scissor: Option<Rect>) {
        self.scissor = scissor;
    }

    pub fn distance_to_camera(&self) -> Option<f32> {
        self.distance_to_camera
    }

    pub fn vertices(&self) -> &VertexData {
        &self.vertices
    }

    pub fn vertices_mut(&mut self) -> &mut VertexData {
        &mut self.vertices
    }

    pub fn indices(&self) -> &IndexData {
        &self.indices
    }

    pub fn indices_mut(&mut self) -> &mut IndexData {
        &mut self.indices
    }

    pub fn submeshes(&self) -> &[SubMesh] {
        &self.submeshes
    }

    /// Replace the sub-unit list. Ignored once loaded; handle ownership is
    /// resolved at load and cannot be re-wired afterwards.
    pub fn set_submeshes(&mut self, submeshes: Vec<SubMesh>) {
        if self.loaded {
            warn!("submeshes cannot change on a loaded mesh");
            return;
        }
        self.submeshes = submeshes;
    }

    pub fn model_matrix(&self) -> Matrix4<f32> {
        self.model_matrix
    }

    fn material_mut(&mut self) -> &mut Material {
        self.material.get_or_insert_with(Material::new)
    }

    /// Set the object-level color. Alpha below 1 marks the mesh transparent
    /// for the rest of the session.
    pub fn set_color(&mut self, color: Vector4<f32>) {
        self.material_mut().set_color(color);
        if color.w < 1.0 {
            self.transparent = true;
        }
        if self.loaded {
            let value = PropertyValue::Float4(color.into());
            if let Some(render) = &mut self.render {
                render.set_property(PropertyKind::Color, value.clone());
            }
            for sub in &mut self.submeshes {
                if sub.material.is_none()
                    && let Some(render) = sub.render.as_owned_mut()
                {
                    render.set_property(PropertyKind::Color, value.clone());
                }
            }
        }
    }

    pub fn color(&self) -> Vector4<f32> {
        self.material
            .as_ref()
            .map(Material::color)
            .unwrap_or(Vector4::new(1.0, 1.0, 1.0, 1.0))
    }

    /// Set the object-level texture by path. On a loaded mesh an identity
    /// change triggers an immediate re-upload.
    pub fn set_texture_path(&mut self, path: &str) {
        if self.material_mut().set_texture_path(path) && self.loaded {
            self.texture_reload();
        }
    }

    /// Attach decoded texture data at the object level.
    pub fn set_texture_data(&mut self, data: Arc<TextureData>) {
        if self.material_mut().set_texture_data(data) && self.loaded {
            self.texture_reload();
        }
    }

    /// Override the material of one sub-unit. Out-of-range indices are
    /// reported, not panicked on.
    pub fn set_submesh_material(&mut self, index: usize, material: Material) {
        let Some(sub) = self.submeshes.get_mut(index) else {
            log::error!("{}", SceneError::out_of_range("submesh"));
            return;
        };
        if material.is_transparent() {
            self.transparent = true;
        }
        sub.material = Some(material);
    }

    fn texture_reload(&mut self) {
        let Some(material) = &mut self.material else {
            return;
        };
        material.load_texture_lenient();
        let Some(texture) = material.texture().cloned() else {
            return;
        };
        if material.is_transparent() {
            self.transparent = true;
        }
        if let Some(render) = &mut self.render {
            render.set_texture(SamplerKind::Diffuse, TextureUnit::Data(texture.clone()));
        }
        for sub in &mut self.submeshes {
            if sub.material.is_none()
                && let Some(render) = sub.render.as_owned_mut()
            {
                render.set_texture(SamplerKind::Diffuse, TextureUnit::Data(texture.clone()));
            }
        }
    }

    /// Place the mesh in world space and re-derive every transform-dependent
    /// matrix plus (once a camera was seen) the distance to it.
    pub fn set_transform(
        &mut self,
        position: Vector3<f32>,
        rotation: Quaternion<f32>,
        scale: Vector3<f32>,
    ) {
        self.position = position;
        self.rotation = rotation;
        self.scale = scale;

        self.model_matrix = Matrix4::from_translation(position)
            * Matrix4::from(rotation)
            * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z);
        self.normal_matrix = self
            .model_matrix
            .invert()
            .map(|m| m.transpose())
            .unwrap_or_else(Matrix4::identity);

        if self.has_view {
            self.mvp_matrix = self.view_projection * self.model_matrix;
            self.update_distance();
        }
    }

    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    /// Pull the camera's view into the mesh: MVP, camera position and the
    /// distance used for transparency ordering.
    pub fn update_view(&mut self, camera: &Camera) {
        self.view_projection = camera.view_projection_matrix();
        self.camera_position = camera.position();
        self.mvp_matrix = self.view_projection * self.model_matrix;
        self.has_view = true;
        self.update_distance();
    }

    fn update_distance(&mut self) {
        let world = Vector3::new(
            self.model_matrix.w.x,
            self.model_matrix.w.y,
            self.model_matrix.w.z,
        );
        self.distance_to_camera = Some((self.camera_position - world).magnitude());
    }

    /// Recompute per-sub-unit camera distances and restore back-to-front
    /// order. Only transparent sub-units get a distance; the reference point
    /// is each sub-unit's first indexed vertex in world space. Runs on every
    /// transform or view change while the mesh is flagged transparent and
    /// depth-sorted transparency is active.
    pub fn sort_transparent_submeshes(&mut self, use_depth: bool, mode: TransparencyMode) {
        if !self.transparent
            || !use_depth
            || mode == TransparencyMode::ForceOff
            || !self.has_view
        {
            return;
        }
        let object_transparent = self
            .material
            .as_ref()
            .is_some_and(Material::is_transparent);

        let mut measured = false;
        for i in 0..self.submeshes.len() {
            let sub = &self.submeshes[i];
            let transparent = sub
                .material
                .as_ref()
                .map_or(object_transparent, Material::is_transparent);
            if !transparent || sub.index_count == 0 {
                continue;
            }
            if let Some(first) = self.indices.get(sub.index_offset)
                && let Some(world) = self
                    .vertices
                    .world_position(first as usize, &self.model_matrix)
            {
                self.submeshes[i].distance_to_camera =
                    Some((self.camera_position - world).magnitude());
                measured = true;
            }
        }
        if measured {
            self.submeshes
                .sort_by(|a, b| submesh_draw_order(a.distance_to_camera, b.distance_to_camera));
        }
    }

    fn payload_flags(&self) -> (bool, bool) {
        match &self.payload {
            MeshPayload::Model(model) => (model.skinning, model.morph_targets),
            _ => (false, false),
        }
    }

    fn payload_properties(&self) -> Vec<(PropertyKind, PropertyValue)> {
        let mut props = Vec::new();
        if let MeshPayload::Model(model) = &self.payload {
            if model.skinning {
                props.push((
                    PropertyKind::BonesMatrix,
                    PropertyValue::Matrix4Vec(model.bones_matrix.clone()),
                ));
            }
            if model.morph_targets {
                props.push((
                    PropertyKind::MorphWeights,
                    PropertyValue::FloatVec(model.morph_weights.clone()),
                ));
            }
        }
        props
    }

    fn effective_color(&self, sub: usize) -> Vector4<f32> {
        self.submeshes[sub]
            .material
            .as_ref()
            .or(self.material.as_ref())
            .map(Material::color)
            .unwrap_or(Vector4::new(1.0, 1.0, 1.0, 1.0))
    }

    fn effective_texture(&self, sub: usize) -> Option<Arc<TextureData>> {
        self.submeshes[sub]
            .material
            .as_ref()
            .or(self.material.as_ref())
            .and_then(|m| m.texture().cloned())
    }

    fn declare_geometry(
        render: &mut dyn ObjectRender,
        vertices: &VertexData,
        indices: &IndexData,
        primitive: PrimitiveKind,
        dynamic: bool,
        attribute_filter: impl Fn(AttributeKind) -> bool,
    ) {
        render.set_primitive(primitive);
        render.set_vertex_count(vertices.count());
        render.add_buffer(VERTEX_BUFFER, BufferKind::Vertex, vertices.as_bytes(), dynamic);
        for (kind, att) in vertices.attributes() {
            if !attribute_filter(kind) {
                continue;
            }
            render.add_attribute(
                kind,
                VertexAttributeDesc {
                    buffer: VERTEX_BUFFER.to_string(),
                    elements: att.elements,
                    data_type: DataType::Float,
                    stride: vertices.stride_bytes(),
                    offset: att.offset * std::mem::size_of::<f32>(),
                },
            );
        }
        if !indices.is_empty() {
            render.add_buffer(INDEX_BUFFER, BufferKind::Index, indices.as_bytes(), dynamic);
        }
    }

    fn standard_properties(&self) -> Vec<(PropertyKind, PropertyValue)> {
        vec![
            (
                PropertyKind::ModelMatrix,
                PropertyValue::Matrix4(self.model_matrix.into()),
            ),
            (
                PropertyKind::NormalMatrix,
                PropertyValue::Matrix4(self.normal_matrix.into()),
            ),
            (
                PropertyKind::MvpMatrix,
                PropertyValue::Matrix4(self.mvp_matrix.into()),
            ),
            (
                PropertyKind::CameraPosition,
                PropertyValue::Float3(self.camera_position.into()),
            ),
        ]
    }

    /// Resolve materials, instantiate render handles and declare all GPU
    /// state, then load. A failed load leaves the mesh unloaded; already
    /// created handles are kept so a later retry can reuse them.
    pub fn load(
        &mut self,
        backend: &mut dyn RenderBackend,
        environment: Option<&SceneEnvironment>,
    ) -> Result<(), SceneError> {
        self.loaded = false;

        // Default sub-unit covers the whole index buffer.
        if self.submeshes.len() == 1 && self.submeshes[0].index_count == 0 {
            self.submeshes[0].index_count = self.indices.count();
        }

        // Textures first: their alpha content feeds the transparency flags.
        if let Some(material) = &mut self.material {
            material.load_texture_lenient();
            if material.is_transparent() {
                self.transparent = true;
            }
        }
        let mut has_texture = false;
        for sub in &mut self.submeshes {
            if let Some(material) = &mut sub.material {
                material.load_texture_lenient();
                if material.is_transparent() {
                    self.transparent = true;
                }
                has_texture |= material.has_texture();
            }
        }
        has_texture |= self
            .material
            .as_ref()
            .is_some_and(Material::has_texture);

        if self.render.is_none() {
            self.render = Some(backend.create_object_render()?);
        }

        let (skinning, morphs) = self.payload_flags();
        let features = ProgramFeatures {
            has_texture_coords: has_texture
                && self.vertices.has_attribute(AttributeKind::TexCoord),
            has_skinning: skinning,
            has_morph_targets: morphs,
            ..Default::default()
        };
        let standard = self.standard_properties();
        let payload = self.payload_properties();

        let render = self.render.as_mut().expect("instantiated above");
        render.set_features(features);
        Self::declare_geometry(
            render.as_mut(),
            &self.vertices,
            &self.indices,
            self.primitive,
            self.dynamic,
            |_| true,
        );
        for (kind, value) in standard.iter().chain(payload.iter()) {
            render.set_property(*kind, value.clone());
        }
        if let Some(env) = environment {
            env.register_on(render.as_mut());
        }

        // Handle ownership: a lone sub-unit shares the mesh handle, so its
        // material binds there; several sub-units each get their own.
        if self.submeshes.len() == 1 {
            self.submeshes[0].render = HandleOwnership::SharesParent;
            let color = self.effective_color(0);
            let texture = self.effective_texture(0);
            let render = self.render.as_mut().expect("instantiated above");
            render.set_property(PropertyKind::Color, PropertyValue::Float4(color.into()));
            if let Some(texture) = texture {
                render.set_texture(SamplerKind::Diffuse, TextureUnit::Data(texture));
            }
        } else {
            for i in 0..self.submeshes.len() {
                if self.submeshes[i].render.as_owned_mut().is_none() {
                    self.submeshes[i].render = HandleOwnership::Owned(backend.create_object_render()?);
                }
                let color = self.effective_color(i);
                let texture = self.effective_texture(i);
                let (offset, count) =
                    (self.submeshes[i].index_offset, self.submeshes[i].index_count);
                let own = self.submeshes[i]
                    .render
                    .as_owned_mut()
                    .expect("owned above");
                own.set_features(features);
                Self::declare_geometry(
                    own.as_mut(),
                    &self.vertices,
                    &self.indices,
                    self.primitive,
                    self.dynamic,
                    |_| true,
                );
                for (kind, value) in standard.iter().chain(payload.iter()) {
                    own.set_property(*kind, value.clone());
                }
                if let Some(env) = environment {
                    env.register_on(own.as_mut());
                }
                own.set_property(PropertyKind::Color, PropertyValue::Float4(color.into()));
                if let Some(texture) = texture {
                    own.set_texture(SamplerKind::Diffuse, TextureUnit::Data(texture));
                }
                own.set_index_range(
                    INDEX_BUFFER,
                    count,
                    offset * std::mem::size_of::<u32>(),
                    DataType::UnsignedInt,
                );
            }
        }

        self.render.as_mut().expect("instantiated above").load()?;
        for sub in &mut self.submeshes {
            if let Some(own) = sub.render.as_owned_mut() {
                own.load()?;
            }
        }

        self.loaded = true;
        Ok(())
    }

    /// Load the depth-only shadow variant: position (plus skinning and morph
    /// deltas) and the reduced property set. Per-pass light data is refreshed
    /// at draw time from the frame state.
    pub fn load_shadow(
        &mut self,
        backend: &mut dyn RenderBackend,
        _environment: Option<&SceneEnvironment>,
    ) -> Result<(), SceneError> {
        self.shadow_loaded = false;

        if self.submeshes.len() == 1 && self.submeshes[0].index_count == 0 {
            self.submeshes[0].index_count = self.indices.count();
        }

        if self.shadow_render.is_none() {
            self.shadow_render = Some(backend.create_object_render()?);
        }

        let (skinning, morphs) = self.payload_flags();
        let features = ProgramFeatures {
            has_skinning: skinning,
            has_morph_targets: morphs,
            depth_only: true,
            ..Default::default()
        };
        let shadow_attributes = |kind: AttributeKind| {
            matches!(
                kind,
                AttributeKind::Position
                    | AttributeKind::BoneIds
                    | AttributeKind::BoneWeights
                    | AttributeKind::MorphTarget(_)
                    | AttributeKind::MorphNormal(_)
            )
        };
        let shadow_defaults = [
            (
                PropertyKind::ShadowLightPosition,
                PropertyValue::Float3([0.0; 3]),
            ),
            (
                PropertyKind::ShadowCameraNearFar,
                PropertyValue::Float2([0.0, 0.0]),
            ),
            (PropertyKind::IsPointShadow, PropertyValue::Int(0)),
        ];
        let standard = self.standard_properties();
        let payload = self.payload_properties();

        let render = self.shadow_render.as_mut().expect("instantiated above");
        render.set_features(features);
        Self::declare_geometry(
            render.as_mut(),
            &self.vertices,
            &self.indices,
            self.primitive,
            self.dynamic,
            shadow_attributes,
        );
        for (kind, value) in standard
            .iter()
            .chain(payload.iter())
            .chain(shadow_defaults.iter())
        {
            render.set_property(*kind, value.clone());
        }

        if self.submeshes.len() == 1 {
            self.submeshes[0].shadow_render = HandleOwnership::SharesParent;
        } else {
            for i in 0..self.submeshes.len() {
                if self.submeshes[i].shadow_render.as_owned_mut().is_none() {
                    self.submeshes[i].shadow_render =
                        HandleOwnership::Owned(backend.create_object_render()?);
                }
                let (offset, count) =
                    (self.submeshes[i].index_offset, self.submeshes[i].index_count);
                let own = self.submeshes[i]
                    .shadow_render
                    .as_owned_mut()
                    .expect("owned above");
                own.set_features(features);
                Self::declare_geometry(
                    own.as_mut(),
                    &self.vertices,
                    &self.indices,
                    self.primitive,
                    self.dynamic,
                    shadow_attributes,
                );
                for (kind, value) in standard
                    .iter()
                    .chain(payload.iter())
                    .chain(shadow_defaults.iter())
                {
                    own.set_property(*kind, value.clone());
                }
                own.set_index_range(
                    INDEX_BUFFER,
                    count,
                    offset * std::mem::size_of::<u32>(),
                    DataType::UnsignedInt,
                );
            }
        }

        self.shadow_render
            .as_mut()
            .expect("instantiated above")
            .load()?;
        for sub in &mut self.submeshes {
            if let Some(own) = sub.shadow_render.as_owned_mut() {
                own.load()?;
            }
        }

        self.shadow_loaded = true;
        Ok(())
    }

    /// Draw for the current pass. In the color pass a transparent mesh with a
    /// known camera distance defers itself into the frame's queue instead of
    /// drawing; an unset distance draws immediately. Returns whether a draw
    /// or a deferral happened.
    pub fn draw(
        &mut self,
        key: usize,
        frame: &mut FrameState,
        backend: &mut dyn RenderBackend,
    ) -> bool {
        match frame.pass {
            Pass::Shadow(_) => {
                if !self.shadow_loaded || !self.visible {
                    return false;
                }
                self.render_draw(frame)
            }
            Pass::Color => {
                if self.transparent {
                    frame.request_transparency();
                }
                if !self.loaded || !self.visible {
                    return false;
                }
                if self.transparent
                    && frame.use_depth
                    && frame.transparency_mode != TransparencyMode::ForceOff
                    && let Some(distance) = self.distance_to_camera
                {
                    frame.queue.insert(distance, key);
                    return true;
                }
                self.draw_with_scissor(frame, backend)
            }
        }
    }

    /// Issue the draw that was deferred into the transparency queue.
    pub fn draw_deferred(&mut self, frame: &FrameState, backend: &mut dyn RenderBackend) -> bool {
        if !self.loaded || !self.visible {
            return false;
        }
        self.draw_with_scissor(frame, backend)
    }

    fn draw_with_scissor(&mut self, frame: &FrameState, backend: &mut dyn RenderBackend) -> bool {
        let scissor = self.scissor.filter(|s| !s.is_zero());
        let saved = scissor.map(|rect| {
            let was_enabled = backend.scissor_enabled();
            let previous = backend.active_scissor();
            let fitted = if was_enabled { rect.fit_on(&previous) } else { rect };
            backend.enable_scissor(fitted);
            (was_enabled, previous)
        });

        let drawn = self.render_draw(frame);

        if let Some((was_enabled, previous)) = saved {
            if was_enabled {
                backend.enable_scissor(previous);
            } else {
                backend.disable_scissor();
            }
        }
        drawn
    }

    /// Refresh per-draw properties, then run the
    /// `prepare_draw`/`draw`/`finish_draw` protocol over the mesh handle and
    /// every sub-unit in their current (sorted) order.
    fn render_draw(&mut self, frame: &FrameState) -> bool {
        let shadow = frame.is_shadow_pass();

        let mut props = self.payload_properties();
        props.push((
            PropertyKind::ModelMatrix,
            PropertyValue::Matrix4(self.model_matrix.into()),
        ));
        match frame.pass {
            Pass::Shadow(pass) => {
                // Depth is rendered from the light, not the viewer camera.
                let depth_mvp = Matrix4::from(pass.depth_vp) * self.model_matrix;
                props.push((
                    PropertyKind::MvpMatrix,
                    PropertyValue::Matrix4(depth_mvp.into()),
                ));
                props.push((
                    PropertyKind::ShadowLightPosition,
                    PropertyValue::Float3(pass.light_position),
                ));
                props.push((
                    PropertyKind::ShadowCameraNearFar,
                    PropertyValue::Float2(pass.camera_near_far),
                ));
                props.push((
                    PropertyKind::IsPointShadow,
                    PropertyValue::Int(pass.point_light as i32),
                ));
            }
            Pass::Color => {
                props.push((
                    PropertyKind::MvpMatrix,
                    PropertyValue::Matrix4(self.mvp_matrix.into()),
                ));
                props.push((
                    PropertyKind::NormalMatrix,
                    PropertyValue::Matrix4(self.normal_matrix.into()),
                ));
                props.push((
                    PropertyKind::CameraPosition,
                    PropertyValue::Float3(self.camera_position.into()),
                ));
            }
        }

        let render = if shadow {
            self.shadow_render.as_mut()
        } else {
            self.render.as_mut()
        };
        let Some(render) = render else {
            return false;
        };

        for (kind, value) in &props {
            render.set_property(*kind, value.clone());
        }
        for sub in &mut self.submeshes {
            let ownership = if shadow { &mut sub.shadow_render } else { &mut sub.render };
            if let Some(own) = ownership.as_owned_mut() {
                for (kind, value) in &props {
                    own.set_property(*kind, value.clone());
                }
            }
        }

        render.prepare_draw();
        for sub in &mut self.submeshes {
            let ownership = if shadow { &mut sub.shadow_render } else { &mut sub.render };
            match ownership {
                HandleOwnership::Owned(own) => {
                    if sub.index_count > 0 {
                        own.prepare_draw();
                        own.draw();
                        own.finish_draw();
                    }
                }
                HandleOwnership::SharesParent => {
                    if sub.index_count > 0 {
                        render.set_index_range(
                            INDEX_BUFFER,
                            sub.index_count,
                            sub.index_offset * std::mem::size_of::<u32>(),
                            DataType::UnsignedInt,
                        );
                        render.draw();
                    } else if self.indices.is_empty() {
                        // Non-indexed geometry draws by vertex count.
                        render.draw();
                    }
                }
                HandleOwnership::Unresolved => {}
            }
        }
        render.finish_draw();
        true
    }

    /// Re-register the scene's light/fog/shadow block on the main-pass
    /// handles. The scene calls this before every color pass so moved lights
    /// shade with current positions and shadow matrices.
    pub fn refresh_environment(&mut self, environment: &SceneEnvironment) {
        if !self.loaded {
            return;
        }
        if let Some(render) = &mut self.render {
            environment.register_on(render.as_mut());
        }
        for sub in &mut self.submeshes {
            if let Some(own) = sub.render.as_owned_mut() {
                environment.register_on(own.as_mut());
            }
        }
    }

    /// Re-upload the vertex buffer of a dynamic mesh to every live handle.
    pub fn update_buffers(&mut self) {
        let count = self.vertices.count();
        let bytes = self.vertices.as_bytes();
        for render in self.render.iter_mut().chain(self.shadow_render.iter_mut()) {
            render.set_vertex_count(count);
            render.update_buffer(VERTEX_BUFFER, bytes);
        }
        for sub in &mut self.submeshes {
            for ownership in [&mut sub.render, &mut sub.shadow_render] {
                if let Some(own) = ownership.as_owned_mut() {
                    own.set_vertex_count(count);
                    own.update_buffer(VERTEX_BUFFER, bytes);
                }
            }
        }
    }

    /// Re-upload the shared index buffer as a whole; sub-unit ranges are
    /// re-selected against the new data.
    pub fn update_indices(&mut self) {
        let count = self.indices.count();
        let bytes = self.indices.as_bytes();
        for render in self.render.iter_mut().chain(self.shadow_render.iter_mut()) {
            render.update_index(count, bytes);
        }
        for sub in &mut self.submeshes {
            let (offset, sub_count) = (sub.index_offset, sub.index_count);
            for ownership in [&mut sub.render, &mut sub.shadow_render] {
                if let Some(own) = ownership.as_owned_mut() {
                    own.update_index(count, bytes);
                    own.set_index_range(
                        INDEX_BUFFER,
                        sub_count,
                        offset * std::mem::size_of::<u32>(),
                        DataType::UnsignedInt,
                    );
                }
            }
        }
    }

    /// Release all render handles. Safe to call repeatedly; the mesh itself
    /// stays usable and can be loaded again.
    pub fn destroy(&mut self) {
        if let Some(mut render) = self.render.take() {
            render.destroy();
        }
        if let Some(mut render) = self.shadow_render.take() {
            render.destroy();
        }
        for sub in &mut self.submeshes {
            for ownership in [&mut sub.render, &mut sub.shadow_render] {
                if let HandleOwnership::Owned(mut own) =
                    std::mem::replace(ownership, HandleOwnership::Unresolved)
                {
                    own.destroy();
                }
            }
        }
        self.loaded = false;
        self.shadow_loaded = false;
    }
}

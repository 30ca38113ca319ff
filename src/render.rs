//! The render-object contract consumed from the graphics backend.
//!
//! The core of this crate never issues GPU calls itself. Every drawable owns
//! up to two opaque [`ObjectRender`] handles (one for the main color pass,
//! one for the shadow pass) obtained from a [`RenderBackend`]. A drawable
//! declares named vertex buffers, typed attributes, typed properties and
//! texture samplers onto its handle, calls `load()` once, and from then on
//! drives `prepare_draw()`/`draw()`/`finish_draw()` each frame, refreshing
//! per-draw properties just before.
//!
//! Backends (wgpu, Vulkan, a recording mock in tests) implement these traits;
//! the core only depends on the contract.

use std::sync::Arc;

use crate::{
    data_structures::{buffer::AttributeKind, rect::Rect, texture::TextureData},
    error::SceneError,
};

/// Opaque handle to a backend-owned texture (shadow maps).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Component type of a vertex attribute or index element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    UnsignedInt,
    Float,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Primitive topology, fixed per render handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PrimitiveKind {
    #[default]
    Triangles,
    TriangleStrip,
    Lines,
    Points,
}

/// Shader-variant switches resolved once at load time, never per draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgramFeatures {
    pub has_texture_coords: bool,
    pub has_skinning: bool,
    pub has_morph_targets: bool,
    pub is_sky: bool,
    pub is_text: bool,
    /// Depth-only program used by the shadow pass.
    pub depth_only: bool,
}

/// Named per-draw properties understood by the backend programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    ModelMatrix,
    NormalMatrix,
    MvpMatrix,
    CameraPosition,
    Color,
    BonesMatrix,
    MorphWeights,
    NumLights,
    LightPositions,
    LightColors,
    LightPowers,
    FogColor,
    FogRange,
    NumShadows,
    DepthVpMatrix,
    ShadowBias,
    ShadowCameraNearFar,
    ShadowCascades,
    ShadowLightPosition,
    IsPointShadow,
}

/// Typed property payload, uploaded before each draw.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Int(i32),
    IntVec(Vec<i32>),
    Float(f32),
    FloatVec(Vec<f32>),
    Float2([f32; 2]),
    Float2Vec(Vec<[f32; 2]>),
    Float3([f32; 3]),
    Float3Vec(Vec<[f32; 3]>),
    Float4([f32; 4]),
    Matrix4([[f32; 4]; 4]),
    Matrix4Vec(Vec<[[f32; 4]; 4]>),
}

/// Texture sampler slots known to the backend programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    Diffuse,
    ShadowMap,
}

/// A texture bound to a sampler: either decoded pixel data the backend still
/// has to upload, or a handle to something the backend already owns.
#[derive(Clone, Debug)]
pub enum TextureUnit {
    Data(Arc<TextureData>),
    Handle(TextureHandle),
}

/// Placement of one attribute inside a named vertex buffer, in bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexAttributeDesc {
    pub buffer: String,
    pub elements: usize,
    pub data_type: DataType,
    pub stride: usize,
    pub offset: usize,
}

/// One pass's GPU resource bindings for one drawable.
///
/// Lifecycle: declare everything, `load()` once, then per frame
/// `prepare_draw()` / `draw()` / `finish_draw()`. `update_buffer` and
/// `update_index` re-upload data for dynamic geometry without re-declaring
/// the layout. `destroy()` releases GPU resources and must be idempotent.
pub trait ObjectRender {
    fn set_primitive(&mut self, primitive: PrimitiveKind);

    fn set_features(&mut self, features: ProgramFeatures);

    fn set_vertex_count(&mut self, count: usize);

    /// Declare a named buffer with its initial contents.
    fn add_buffer(&mut self, name: &str, kind: BufferKind, data: &[u8], dynamic: bool);

    /// Declare one typed attribute of a previously added vertex buffer.
    fn add_attribute(&mut self, kind: AttributeKind, desc: VertexAttributeDesc);

    /// Register or overwrite a typed property; the backend uploads the last
    /// value set before each draw.
    fn set_property(&mut self, kind: PropertyKind, value: PropertyValue);

    fn set_texture(&mut self, sampler: SamplerKind, texture: TextureUnit);

    fn set_texture_array(&mut self, sampler: SamplerKind, textures: Vec<TextureHandle>);

    /// Select the index range the next `draw()` call consumes, addressing the
    /// named index buffer. Offset is in bytes.
    fn set_index_range(&mut self, buffer: &str, count: usize, offset: usize, data_type: DataType);

    fn load(&mut self) -> Result<(), SceneError>;

    fn prepare_draw(&mut self);

    fn draw(&mut self);

    fn finish_draw(&mut self);

    fn destroy(&mut self);

    /// Re-upload the contents of a named buffer. Layout stays untouched.
    fn update_buffer(&mut self, name: &str, data: &[u8]);

    /// Re-upload index data.
    fn update_index(&mut self, count: usize, data: &[u8]);
}

/// Factory and shared pass state provided by the backend.
pub trait RenderBackend {
    /// Create a fresh render handle. Fails with
    /// [`SceneError::ResourceInstantiation`] when the backend is exhausted;
    /// the caller must be able to retry later.
    fn create_object_render(&mut self) -> Result<Box<dyn ObjectRender>, SceneError>;

    /// Create a depth-format texture for shadow mapping.
    fn create_depth_texture(&mut self, width: u32, height: u32)
    -> Result<TextureHandle, SceneError>;

    fn destroy_texture(&mut self, handle: TextureHandle);

    fn enable_scissor(&mut self, rect: Rect);

    fn disable_scissor(&mut self);

    fn scissor_enabled(&self) -> bool;

    fn active_scissor(&self) -> Rect;
}

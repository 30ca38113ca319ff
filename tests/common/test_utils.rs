//! A recording render backend: every contract call lands in a shared event
//! log the tests assert against. Failure switches simulate backend exhaustion
//! and GPU-side load errors.

use std::sync::{Arc, Mutex};

use luma_ngin::{
    Mesh, SceneError,
    data_structures::{buffer::AttributeKind, rect::Rect},
    render::{
        BufferKind, DataType, ObjectRender, PrimitiveKind, ProgramFeatures, PropertyKind,
        PropertyValue, RenderBackend, SamplerKind, TextureHandle, TextureUnit,
        VertexAttributeDesc,
    },
};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Created(u64),
    Features(u64, ProgramFeatures),
    VertexCount(u64, usize),
    Buffer {
        render: u64,
        name: String,
        kind: BufferKind,
        bytes: usize,
    },
    Attribute(u64, AttributeKind),
    Property(u64, PropertyKind),
    /// Matrix-valued properties also log their value for exact asserts.
    Matrix(u64, PropertyKind, [[f32; 4]; 4]),
    Texture(u64, SamplerKind),
    TextureArray(u64, usize),
    IndexRange {
        render: u64,
        count: usize,
        offset: usize,
    },
    Loaded(u64),
    PrepareDraw(u64),
    Draw(u64),
    FinishDraw(u64),
    Destroyed(u64),
    BufferUpdated {
        render: u64,
        name: String,
        bytes: usize,
    },
    IndexUpdated {
        render: u64,
        count: usize,
    },
    DepthTexture(u64),
    TextureDestroyed(u64),
    ScissorEnabled(Rect),
    ScissorDisabled,
}

#[derive(Default)]
pub struct BackendLog {
    pub events: Vec<Event>,
    pub fail_create: bool,
    pub fail_load: bool,
}

pub struct RecordingBackend {
    log: Arc<Mutex<BackendLog>>,
    next_render: u64,
    next_texture: u64,
    scissor: Option<Rect>,
}

impl RecordingBackend {
    pub fn new() -> (Self, Arc<Mutex<BackendLog>>) {
        let log = Arc::new(Mutex::new(BackendLog::default()));
        (
            Self {
                log: log.clone(),
                next_render: 0,
                next_texture: 0,
                scissor: None,
            },
            log,
        )
    }
}

impl RenderBackend for RecordingBackend {
    fn create_object_render(&mut self) -> Result<Box<dyn ObjectRender>, SceneError> {
        if self.log.lock().unwrap().fail_create {
            return Err(SceneError::ResourceInstantiation);
        }
        let id = self.next_render;
        self.next_render += 1;
        self.log.lock().unwrap().events.push(Event::Created(id));
        Ok(Box::new(RecordingRender {
            id,
            log: self.log.clone(),
        }))
    }

    fn create_depth_texture(
        &mut self,
        _width: u32,
        _height: u32,
    ) -> Result<TextureHandle, SceneError> {
        let id = self.next_texture;
        self.next_texture += 1;
        self.log.lock().unwrap().events.push(Event::DepthTexture(id));
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        self.log
            .lock()
            .unwrap()
            .events
            .push(Event::TextureDestroyed(handle.0));
    }

    fn enable_scissor(&mut self, rect: Rect) {
        self.scissor = Some(rect);
        self.log
            .lock()
            .unwrap()
            .events
            .push(Event::ScissorEnabled(rect));
    }

    fn disable_scissor(&mut self) {
        self.scissor = None;
        self.log.lock().unwrap().events.push(Event::ScissorDisabled);
    }

    fn scissor_enabled(&self) -> bool {
        self.scissor.is_some()
    }

    fn active_scissor(&self) -> Rect {
        self.scissor.unwrap_or_default()
    }
}

pub struct RecordingRender {
    id: u64,
    log: Arc<Mutex<BackendLog>>,
}

impl RecordingRender {
    fn push(&self, event: Event) {
        self.log.lock().unwrap().events.push(event);
    }
}

impl ObjectRender for RecordingRender {
    fn set_primitive(&mut self, _primitive: PrimitiveKind) {}

    fn set_features(&mut self, features: ProgramFeatures) {
        self.push(Event::Features(self.id, features));
    }

    fn set_vertex_count(&mut self, count: usize) {
        self.push(Event::VertexCount(self.id, count));
    }

    fn add_buffer(&mut self, name: &str, kind: BufferKind, data: &[u8], _dynamic: bool) {
        self.push(Event::Buffer {
            render: self.id,
            name: name.to_string(),
            kind,
            bytes: data.len(),
        });
    }

    fn add_attribute(&mut self, kind: AttributeKind, _desc: VertexAttributeDesc) {
        self.push(Event::Attribute(self.id, kind));
    }

    fn set_property(&mut self, kind: PropertyKind, value: PropertyValue) {
        self.push(Event::Property(self.id, kind));
        if let PropertyValue::Matrix4(matrix) = value {
            self.push(Event::Matrix(self.id, kind, matrix));
        }
    }

    fn set_texture(&mut self, sampler: SamplerKind, _texture: TextureUnit) {
        self.push(Event::Texture(self.id, sampler));
    }

    fn set_texture_array(&mut self, _sampler: SamplerKind, textures: Vec<TextureHandle>) {
        self.push(Event::TextureArray(self.id, textures.len()));
    }

    fn set_index_range(&mut self, _buffer: &str, count: usize, offset: usize, _ty: DataType) {
        self.push(Event::IndexRange {
            render: self.id,
            count,
            offset,
        });
    }

    fn load(&mut self) -> Result<(), SceneError> {
        if self.log.lock().unwrap().fail_load {
            return Err(SceneError::ResourceInstantiation);
        }
        self.push(Event::Loaded(self.id));
        Ok(())
    }

    fn prepare_draw(&mut self) {
        self.push(Event::PrepareDraw(self.id));
    }

    fn draw(&mut self) {
        self.push(Event::Draw(self.id));
    }

    fn finish_draw(&mut self) {
        self.push(Event::FinishDraw(self.id));
    }

    fn destroy(&mut self) {
        self.push(Event::Destroyed(self.id));
    }

    fn update_buffer(&mut self, name: &str, data: &[u8]) {
        self.push(Event::BufferUpdated {
            render: self.id,
            name: name.to_string(),
            bytes: data.len(),
        });
    }

    fn update_index(&mut self, count: usize, _data: &[u8]) {
        self.push(Event::IndexUpdated {
            render: self.id,
            count,
        });
    }
}

/// Route crate logs into the test harness output.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn events(log: &Arc<Mutex<BackendLog>>) -> Vec<Event> {
    log.lock().unwrap().events.clone()
}

pub fn draw_events(log: &Arc<Mutex<BackendLog>>) -> Vec<u64> {
    events(log)
        .into_iter()
        .filter_map(|e| match e {
            Event::Draw(id) => Some(id),
            _ => None,
        })
        .collect()
}

/// A unit quad at the origin in the default position/texcoord/normal layout.
pub fn quad_mesh() -> Mesh {
    quad_mesh_at(0.0)
}

/// A unit quad whose corner vertex sits at `(x, 0, 0)`.
pub fn quad_mesh_at(x: f32) -> Mesh {
    let mut mesh = Mesh::new();
    for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
        mesh.vertices_mut()
            .push_vertex(&[x + dx, dy, 0.0, dx, dy, 0.0, 0.0, 1.0]);
    }
    mesh.indices_mut().extend([0, 1, 2, 2, 1, 3]);
    mesh
}

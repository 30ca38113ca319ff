//! luma-ngin
//!
//! A scene-graph rendering core: drawable meshes with per-sub-unit materials,
//! depth-sorted transparency, model import (OBJ and glTF with skeletons,
//! morph targets and animation clips), heightmap terrain and shadow-casting
//! lights. The crate never talks to a GPU itself; drawables declare buffers,
//! attributes, properties and textures against the backend contract in
//! [`render`] and any backend (or a recording mock in tests) implements it.
//!
//! High-level modules
//! - `camera`: look-at perspective camera, also used as light shadow camera
//! - `data_structures`: geometry buffers, materials, textures, bones
//! - `drawables`: meshes with model/terrain payloads, and lights
//! - `resources`: model file import and animation clip data
//! - `render`: the backend contract drawables are loaded and drawn against
//! - `scene`: frame state, passes, transparency queue and orchestration
//!

pub mod camera;
pub mod data_structures;
pub mod drawables;
pub mod error;
pub mod render;
pub mod resources;
pub mod scene;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;

pub use crate::camera::Camera;
pub use crate::drawables::light::{Light, LightKind};
pub use crate::drawables::mesh::{Mesh, MeshPayload, SubMesh};
pub use crate::error::SceneError;
pub use crate::resources::load_model;
pub use crate::scene::{Scene, TransparencyMode};

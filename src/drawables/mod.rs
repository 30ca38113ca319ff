//! Drawable scene objects: meshes (with model and terrain payloads) and
//! lights.

pub mod light;
pub mod mesh;
pub mod model;
pub mod terrain;

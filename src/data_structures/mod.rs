//! Core data types drawables are built from:
//!
//! - `buffer` holds interleaved vertex data and shared index data
//! - `material` is the color/texture/transparency descriptor of a sub-unit
//! - `texture` contains decoded CPU-side image data
//! - `bone` is the skeleton tree of imported models
//! - `rect` is the scissor rectangle type

pub mod bone;
pub mod buffer;
pub mod material;
pub mod rect;
pub mod texture;

//! Material descriptors attached to drawable sub-units.

use std::sync::Arc;

use cgmath::Vector4;
use log::warn;

use crate::{data_structures::texture::TextureData, error::SceneError};

/// Color, optional texture and derived transparency of one drawable sub-unit.
///
/// Transparency is sticky: once the alpha channel of the color drops below 1
/// the material stays transparent for the rest of the session, even if the
/// alpha is later restored. This matches how scenes are authored in practice
/// (objects that fade keep their queue membership) and is intentional.
#[derive(Clone, Debug)]
pub struct Material {
    color: Vector4<f32>,
    texture_path: Option<String>,
    texture: Option<Arc<TextureData>>,
    transparent: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self::new()
    }
}

impl Material {
    pub fn new() -> Self {
        Self {
            color: Vector4::new(1.0, 1.0, 1.0, 1.0),
            texture_path: None,
            texture: None,
            transparent: false,
        }
    }

    pub fn set_color(&mut self, color: Vector4<f32>) {
        if color.w < 1.0 {
            self.transparent = true;
        }
        self.color = color;
    }

    pub fn color(&self) -> Vector4<f32> {
        self.color
    }

    /// Point the material at a texture file. Returns `true` when the identity
    /// actually changed, meaning already-instantiated render handles need a
    /// texture re-upload.
    pub fn set_texture_path(&mut self, path: &str) -> bool {
        if self.texture_path.as_deref() == Some(path) {
            return false;
        }
        self.texture_path = Some(path.to_string());
        true
    }

    /// Attach already-decoded texture data. Returns `true` on identity change.
    pub fn set_texture_data(&mut self, data: Arc<TextureData>) -> bool {
        if let Some(current) = &self.texture {
            if current.name == data.name {
                return false;
            }
        }
        self.texture = Some(data);
        true
    }

    pub fn texture_path(&self) -> Option<&str> {
        self.texture_path.as_deref()
    }

    pub fn texture(&self) -> Option<&Arc<TextureData>> {
        self.texture.as_ref()
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some() || self.texture_path.is_some()
    }

    /// Resolve the texture path into decoded data. The path wins over cached
    /// data when both are set and disagree. Also folds texture alpha content
    /// into the transparency flag, which is why this runs before any
    /// transparency decision at load time.
    pub fn load_texture(&mut self) -> Result<(), SceneError> {
        if let Some(path) = self.texture_path.clone() {
            let cached = self.texture.as_ref().map(|t| t.name.as_str());
            if cached != Some(path.as_str()) {
                self.texture = Some(TextureData::from_file(&path)?);
            }
        }
        if let Some(texture) = &self.texture {
            if texture.has_alpha() {
                self.transparent = true;
            }
        }
        Ok(())
    }

    /// Same as [`load_texture`](Self::load_texture) but a missing/broken
    /// texture file degrades to an untextured material with a warning instead
    /// of failing the whole load.
    pub fn load_texture_lenient(&mut self) {
        if let Err(e) = self.load_texture() {
            warn!("texture could not be loaded, material stays untextured: {e}");
            self.texture = None;
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }
}

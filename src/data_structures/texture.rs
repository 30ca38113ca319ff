//! CPU-side texture data.
//!
//! The core never talks to a GPU directly; decoded pixel data is handed to the
//! backend contract as-is. Decoding happens here so the material model can
//! inspect the alpha channel when deriving transparency.

use std::sync::Arc;

use image::{GenericImageView, ImageFormat, load_from_memory_with_format};

use crate::error::SceneError;

/// Decoded image data plus the identity it was loaded under.
///
/// Identity (`name`) is what drives texture-change detection on materials: a
/// differing name means a re-upload into every render handle that references
/// the material.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major.
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Decode an image file from disk.
    pub fn from_file(path: &str) -> Result<Arc<Self>, SceneError> {
        let img = image::open(path).map_err(|e| SceneError::parse(path, e))?;
        Ok(Arc::new(Self::from_image(path, &img)))
    }

    /// Decode raw image-file bytes.
    ///
    /// `format` is an optional file format hint (e.g., "png"). If None,
    /// auto-detect from the byte content.
    pub fn from_bytes(
        name: &str,
        bytes: &[u8],
        format: Option<&str>,
    ) -> Result<Arc<Self>, SceneError> {
        let img = match format.and_then(ImageFormat::from_extension) {
            None => image::load_from_memory(bytes).map_err(|e| SceneError::parse(name, e))?,
            Some(fmt) => {
                load_from_memory_with_format(bytes, fmt).map_err(|e| SceneError::parse(name, e))?
            }
        };
        Ok(Arc::new(Self::from_image(name, &img)))
    }

    fn from_image(name: &str, img: &image::DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8();
        Self {
            name: name.to_string(),
            width,
            height,
            pixels: rgba.into_raw(),
        }
    }

    /// Build from raw RGBA8 pixels (used by embedded glTF images and tests).
    pub fn from_rgba8(name: &str, width: u32, height: u32, pixels: Vec<u8>) -> Arc<Self> {
        debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
        Arc::new(Self {
            name: name.to_string(),
            width,
            height,
            pixels,
        })
    }

    /// True when any texel is not fully opaque.
    pub fn has_alpha(&self) -> bool {
        self.pixels.chunks_exact(4).any(|px| px[3] < 255)
    }
}

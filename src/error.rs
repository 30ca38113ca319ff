//! Error taxonomy for the rendering core.
//!
//! Four failure classes exist and they propagate differently: backend resource
//! exhaustion and asset parse failures are terminal for the whole `load` call,
//! while unsupported encodings are contained to the channel/attribute that hit
//! them and out-of-range user queries only fail the query itself.

use thiserror::Error;

/// Errors produced by the scene-graph rendering core.
#[derive(Debug, Error)]
pub enum SceneError {
    /// The backend could not allocate a render handle. The drawable stays
    /// unloaded and the caller may retry later.
    #[error("backend could not instantiate a render handle")]
    ResourceInstantiation,

    /// A source asset is missing or malformed. Terminal for the load call.
    #[error("failed to parse asset {path}: {reason}")]
    AssetParse { path: String, reason: String },

    /// A channel/attribute/component type was not recognized. The unit that
    /// hit it is skipped; the overall load continues.
    #[error("unsupported encoding: {what}")]
    UnsupportedEncoding { what: String },

    /// A user query (bone by name, morph by index, animation by index) missed.
    #[error("index out of range: {what}")]
    IndexOutOfRange { what: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SceneError {
    pub(crate) fn parse(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::AssetParse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn out_of_range(what: impl Into<String>) -> Self {
        Self::IndexOutOfRange { what: what.into() }
    }
}

//! Error types for scene descriptions.

use thiserror::Error;

/// Error type for invalid or unloadable scene data.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// An index in the model's index buffer points past its vertex buffer.
    #[error("Model '{model}': index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        model: String,
        index: u64,
        vertex_count: usize,
    },

    /// A primitive's index range exceeds the model's index buffer.
    #[error("Model '{model}': primitive indices {first}..{end} exceed {index_count} indices")]
    PrimitiveOutOfRange {
        model: String,
        first: u32,
        end: u64,
        index_count: usize,
    },

    /// A mesh, material or texture reference does not resolve.
    #[error("Model '{model}': {kind} {index} does not exist")]
    MissingReference {
        model: String,
        kind: &'static str,
        index: usize,
    },

    /// Texture dimensions disagree with its pixel buffer.
    #[error("Model '{model}': texture {index} is invalid: {reason}")]
    InvalidTexture {
        model: String,
        index: usize,
        reason: String,
    },

    /// A model has primitives but no geometry.
    #[error("Model '{0}' has primitives but no vertex or index data")]
    EmptyGeometry(String),

    /// The importer could not produce a scene graph.
    #[error("Import failed: {0}")]
    Import(String),

    /// IO error during import.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

use splat_source::SplatSourceError;
use thiserror::Error;

pub(crate) type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Not a ply file")]
    NotPly,

    #[error("Unsupported ply encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Malformed ply header: {0}")]
    Header(&'static str),

    #[error("Missing vertex property: {0}")]
    MissingProperty(String),

    #[error("Expected {expected} f_rest_* properties, found {found}")]
    RestCoeffCount { expected: usize, found: usize },

    #[error("Vertex data truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("Missing array in frame archive: {0}")]
    MissingArray(&'static str),

    #[error("Array {name} has shape {found:?}, expected {expected}")]
    ShapeMismatch {
        name: String,
        found: Vec<usize>,
        expected: String,
    },

    #[error("Attribute arrays disagree on point count")]
    InconsistentPointCount,

    #[error("Invalid npy entry {name}: {reason}")]
    Npy { name: String, reason: &'static str },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to decode format: {0}")]
    Format(#[from] FormatError),

    #[error("Rotation of point {index} has zero norm")]
    DegenerateRotation { index: usize },

    #[error("Splat source error")]
    Fetch(#[from] SplatSourceError),

    #[error("Sequence cache read before frame 0 was decoded")]
    CacheNotPopulated,

    #[error("Frame index {index} out of range ({frames} frames)")]
    FrameOutOfRange { index: usize, frames: usize },
}

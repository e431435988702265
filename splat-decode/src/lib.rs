pub mod activation;
mod cache;
mod error;
mod formats;
mod splats;

pub use cache::SequenceCache;
pub use error::{DecodeError, FormatError};
pub use formats::frame::{FrameSequence, load_frame};
pub use formats::{load_model, ply};
pub use splats::Splats;

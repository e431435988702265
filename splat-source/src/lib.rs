mod archive;
mod error;
mod source;

pub use archive::Archive;
pub use error::SplatSourceError;
pub use source::{FrameFetcher, FrameSource, Source};

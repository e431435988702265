pub mod frame;
mod npy;
pub mod ply;

use std::time::Duration;
use splat_source::Source;
use crate::Splats;
use crate::error::Result;

/// Read a static trained model from `source` and decode it.
pub async fn load_model(source: &Source, timeout: Duration) -> Result<Splats> {
    let bytes = source.read(timeout).await?;
    ply::decode(&bytes)
}

use crate::error::{DecodeError, Result};

/// Sequence-wide attributes captured from frame 0 of an animation sequence.
///
/// Later frame archives do not carry scale/opacity; decoding them reads the
/// arrays back from here. Stored values are the raw logit/log arrays as
/// parsed, so activations apply uniformly at assembly time. The cache owns
/// its copies: frame buffers may be dropped without invalidating it.
#[derive(Debug, Default)]
pub struct SequenceCache {
    shared: Option<Shared>,
}

#[derive(Debug)]
struct Shared {
    logit_opacities: Vec<f32>,
    log_scales: Vec<f32>,
}

impl SequenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the sequence-wide arrays. Calling this again starts a new
    /// sequence and discards the previous one.
    pub fn populate(&mut self, logit_opacities: Vec<f32>, log_scales: Vec<f32>) {
        self.shared = Some(Shared {
            logit_opacities,
            log_scales,
        });
    }

    /// The raw cached arrays, `(logit_opacities, log_scales)`.
    pub fn read(&self) -> Result<(&[f32], &[f32])> {
        match &self.shared {
            Some(shared) => Ok((&shared.logit_opacities, &shared.log_scales)),
            None => Err(DecodeError::CacheNotPopulated),
        }
    }

    pub fn is_populated(&self) -> bool {
        self.shared.is_some()
    }

    /// Forget the current sequence.
    pub fn reset(&mut self) {
        self.shared = None;
    }
}

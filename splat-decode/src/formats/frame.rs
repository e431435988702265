//! Decoder for animation-frame archives: npz containers of named arrays.
//!
//! Position, rotation and color are per-frame. Scale and opacity are defined
//! once for a whole sequence: stacked-sequence archives carry them unstacked,
//! and streamed sequences carry them only in frame 0, from where they are
//! captured into a [`SequenceCache`].

use std::path::Path;
use glam::Vec4;
use log::info;
use splat_source::{Archive, FrameFetcher};
use crate::Splats;
use crate::activation::{channel_to_sh, normalize_rotation};
use crate::cache::SequenceCache;
use crate::error::{DecodeError, FormatError, Result};
use crate::formats::npy::NpyArray;

const MEANS: &str = "means3D";
const ROTATIONS: &str = "unnorm_rotations";
const COLORS: &str = "rgb_colors";
const LOG_SCALES: &str = "log_scales";
const LOGIT_OPACITIES: &str = "logit_opacities";

/// One streamed frame archive, fields typed and shape-checked.
struct FrameArchive {
    means: NpyArray,
    rotations: NpyArray,
    colors: NpyArray,
    log_scales: Option<NpyArray>,
    logit_opacities: Option<NpyArray>,
}

impl FrameArchive {
    fn from_archive(archive: &Archive) -> Result<Self> {
        let means = require_array(archive, MEANS)?;
        let rotations = require_array(archive, ROTATIONS)?;
        let colors = require_array(archive, COLORS)?;
        let log_scales = optional_array(archive, LOG_SCALES)?;
        let logit_opacities = optional_array(archive, LOGIT_OPACITIES)?;

        let n = means.rows();
        check_shape(MEANS, &means, &[n, 3])?;
        check_shape(ROTATIONS, &rotations, &[n, 4])?;
        check_shape(COLORS, &colors, &[n, 3])?;
        if let Some(scales) = &log_scales {
            check_shape(LOG_SCALES, scales, &[n, 3])?;
        }
        if let Some(opacities) = &logit_opacities {
            check_opacities(opacities, n)?;
        }

        Ok(Self {
            means,
            rotations,
            colors,
            log_scales,
            logit_opacities,
        })
    }
}

/// A whole animation sequence parsed from one archive: per-frame stacks of
/// position/rotation/color plus the sequence-wide scale/opacity pair.
pub struct FrameSequence {
    means: NpyArray,
    rotations: NpyArray,
    colors: NpyArray,
    log_scales: NpyArray,
    logit_opacities: NpyArray,
    frames: usize,
    points: usize,
}

impl FrameSequence {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_archive(&Archive::open(path).await?)
    }

    pub fn from_archive(archive: &Archive) -> Result<Self> {
        let means = require_array(archive, MEANS)?;
        if means.shape.len() != 3 {
            return Err(FormatError::ShapeMismatch {
                name: MEANS.to_string(),
                found: means.shape.clone(),
                expected: "[frames, points, 3]".to_string(),
            }
            .into());
        }
        let (frames, points) = (means.shape[0], means.shape[1]);

        let rotations = require_array(archive, ROTATIONS)?;
        let colors = require_array(archive, COLORS)?;
        let log_scales = require_array(archive, LOG_SCALES)?;
        let logit_opacities = require_array(archive, LOGIT_OPACITIES)?;

        check_shape(MEANS, &means, &[frames, points, 3])?;
        check_shape(ROTATIONS, &rotations, &[frames, points, 4])?;
        check_shape(COLORS, &colors, &[frames, points, 3])?;
        check_shape(LOG_SCALES, &log_scales, &[points, 3])?;
        check_opacities(&logit_opacities, points)?;

        info!("Loaded sequence archive: {frames} frames of {points} splats");
        Ok(Self {
            means,
            rotations,
            colors,
            log_scales,
            logit_opacities,
            frames,
            points,
        })
    }

    pub fn num_frames(&self) -> usize {
        self.frames
    }

    pub fn num_splats(&self) -> usize {
        self.points
    }

    /// Decode one frame. Position/rotation/color are sliced at `index`;
    /// scale/opacity are the sequence-wide arrays.
    pub fn frame(&self, index: usize) -> Result<Splats> {
        if index >= self.frames {
            return Err(DecodeError::FrameOutOfRange {
                index,
                frames: self.frames,
            });
        }

        let n = self.points;
        assemble(
            &self.means.data[index * n * 3..(index + 1) * n * 3],
            &self.rotations.data[index * n * 4..(index + 1) * n * 4],
            &self.colors.data[index * n * 3..(index + 1) * n * 3],
            &self.log_scales.data,
            &self.logit_opacities.data,
        )
    }
}

/// Fetch and decode one frame of a streamed sequence.
///
/// Frame 0 must be decoded first: it carries the sequence-wide scale and
/// opacity arrays, which are captured into `cache` and reused for every
/// later frame. Decoding a later frame against an empty cache fails with
/// [`DecodeError::CacheNotPopulated`].
pub async fn load_frame(
    fetcher: &FrameFetcher,
    cache: &mut SequenceCache,
    index: u32,
) -> Result<Splats> {
    let bytes = fetcher.fetch_frame(index).await?;
    let archive = Archive::from_bytes(bytes)?;
    let frame = FrameArchive::from_archive(&archive)?;

    if index == 0 {
        let log_scales = frame
            .log_scales
            .as_ref()
            .ok_or(FormatError::MissingArray(LOG_SCALES))?;
        let logit_opacities = frame
            .logit_opacities
            .as_ref()
            .ok_or(FormatError::MissingArray(LOGIT_OPACITIES))?;
        cache.populate(logit_opacities.data.clone(), log_scales.data.clone());
        info!(
            "Cached sequence scale/opacity for {} splats",
            frame.means.rows()
        );
    }

    let (logit_opacities, log_scales) = cache.read()?;
    assemble(
        &frame.means.data,
        &frame.rotations.data,
        &frame.colors.data,
        log_scales,
        logit_opacities,
    )
}

/// Shared assembly: normalize rotations, exponentiate log-scales, shift
/// colors into SH space. Opacity is already the value the renderer
/// consumes in this format and passes through raw.
fn assemble(
    means: &[f32],
    rotations: &[f32],
    colors: &[f32],
    log_scales: &[f32],
    opacities: &[f32],
) -> Result<Splats> {
    let n = opacities.len();
    if means.len() != n * 3
        || rotations.len() != n * 4
        || colors.len() != n * 3
        || log_scales.len() != n * 3
    {
        return Err(FormatError::InconsistentPointCount.into());
    }

    let mut unit_rotations = Vec::with_capacity(n * 4);
    for (i, q) in rotations.chunks_exact(4).enumerate() {
        let q = normalize_rotation(Vec4::new(q[0], q[1], q[2], q[3]))
            .ok_or(DecodeError::DegenerateRotation { index: i })?;
        unit_rotations.extend_from_slice(&q.to_array());
    }

    let scales = log_scales.iter().map(|s| s.exp()).collect();
    let sh_coeffs = colors.iter().copied().map(channel_to_sh).collect();

    Ok(Splats::new(
        means.to_vec(),
        unit_rotations,
        scales,
        opacities.to_vec(),
        sh_coeffs,
        3,
    ))
}

fn require_array(archive: &Archive, name: &'static str) -> Result<NpyArray> {
    optional_array(archive, name)?.ok_or_else(|| FormatError::MissingArray(name).into())
}

fn optional_array(archive: &Archive, name: &str) -> Result<Option<NpyArray>> {
    match archive.entry(name)? {
        Some(bytes) => Ok(Some(NpyArray::parse(name, &bytes)?)),
        None => Ok(None),
    }
}

fn check_shape(name: &str, array: &NpyArray, expected: &[usize]) -> Result<()> {
    if array.shape != expected {
        return Err(FormatError::ShapeMismatch {
            name: name.to_string(),
            found: array.shape.clone(),
            expected: format!("{expected:?}"),
        }
        .into());
    }
    Ok(())
}

/// Opacities are stored as `(points, 1)` or flat `(points,)`.
fn check_opacities(array: &NpyArray, points: usize) -> Result<()> {
    let flat = array.shape == [points];
    if !flat && array.shape != [points, 1] {
        return Err(FormatError::ShapeMismatch {
            name: LOGIT_OPACITIES.to_string(),
            found: array.shape.clone(),
            expected: format!("[{points}, 1]"),
        }
        .into());
    }
    Ok(())
}

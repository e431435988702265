use serde::{Deserialize, Serialize};
use crate::activation::sh_degree_from_coeffs;

/// The canonical render-ready buffer: one entry per gaussian, all
/// activations already applied. Built once per decode, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Splats {
    means: Vec<f32>,
    rotations: Vec<f32>,
    scales: Vec<f32>,
    opacities: Vec<f32>,
    sh_coeffs: Vec<f32>,
    sh_dim: usize,
}

impl Splats {
    pub(crate) fn new(
        means: Vec<f32>,
        rotations: Vec<f32>,
        scales: Vec<f32>,
        opacities: Vec<f32>,
        sh_coeffs: Vec<f32>,
        sh_dim: usize,
    ) -> Self {
        let n = opacities.len();
        debug_assert_eq!(means.len(), n * 3);
        debug_assert_eq!(rotations.len(), n * 4);
        debug_assert_eq!(scales.len(), n * 3);
        debug_assert_eq!(sh_coeffs.len(), n * sh_dim);

        Self {
            means,
            rotations,
            scales,
            opacities,
            sh_coeffs,
            sh_dim,
        }
    }

    pub fn num_splats(&self) -> usize {
        self.opacities.len()
    }

    /// SH coefficients per point, all channels (3 for DC-only data).
    pub fn sh_dim(&self) -> usize {
        self.sh_dim
    }

    pub fn sh_degree(&self) -> Option<u32> {
        sh_degree_from_coeffs((self.sh_dim / 3) as u32)
    }

    /// World-space positions, `num_splats() * 3`.
    pub fn means(&self) -> &[f32] {
        &self.means
    }

    /// Unit quaternions in source storage order, `num_splats() * 4`.
    pub fn rotations(&self) -> &[f32] {
        &self.rotations
    }

    /// Linear (exponentiated) scales, `num_splats() * 3`.
    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    pub fn opacities(&self) -> &[f32] {
        &self.opacities
    }

    pub fn sh_coeffs(&self) -> &[f32] {
        &self.sh_coeffs
    }

    /// Floats per point in [`Self::flat`].
    pub fn flat_stride(&self) -> usize {
        3 + 4 + 3 + 1 + self.sh_dim
    }

    /// One contiguous buffer, per point:
    /// `position(3) | rotation(4) | scale(3) | opacity(1) | sh(sh_dim)`.
    /// The field order is part of the external contract.
    pub fn flat(&self) -> Vec<f32> {
        let n = self.num_splats();
        let mut out = Vec::with_capacity(n * self.flat_stride());
        for i in 0..n {
            out.extend_from_slice(&self.means[i * 3..i * 3 + 3]);
            out.extend_from_slice(&self.rotations[i * 4..i * 4 + 4]);
            out.extend_from_slice(&self.scales[i * 3..i * 3 + 3]);
            out.push(self.opacities[i]);
            out.extend_from_slice(&self.sh_coeffs[i * self.sh_dim..(i + 1) * self.sh_dim]);
        }
        out
    }

    /// Raw bytes of [`Self::flat`], for upload boundaries.
    pub fn flat_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice::<f32, u8>(&self.flat()).to_vec()
    }
}

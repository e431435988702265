//! Activations mapping stored attribute values into their physical range.

use glam::Vec4;

/// Degree-0 real spherical harmonic basis constant.
pub const SH_C0: f32 = 0.2820947917738781;

pub const fn sh_coeffs_for_degree(degree: u32) -> u32 {
    (degree + 1).pow(2)
}

pub fn sh_degree_from_coeffs(coeffs_per_channel: u32) -> Option<u32> {
    match coeffs_per_channel {
        1 => Some(0),
        4 => Some(1),
        9 => Some(2),
        16 => Some(3),
        25 => Some(4),
        _ => None,
    }
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn inverse_sigmoid(x: f32) -> f32 {
    (x / (1.0 - x)).ln()
}

/// Shift a stored color channel into SH space.
pub fn channel_to_sh(rgb: f32) -> f32 {
    (rgb - 0.5) / SH_C0
}

/// Unit-normalize a stored quaternion, keeping the source component order.
/// `None` when the stored rotation has zero norm.
pub fn normalize_rotation(q: Vec4) -> Option<Vec4> {
    let norm = q.length();
    (norm > 0.0).then(|| q / norm)
}

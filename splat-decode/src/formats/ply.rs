//! Decoder for static trained models: a binary little-endian ply whose
//! vertex element carries named per-point scalars (`x,y,z`, `opacity`,
//! `f_dc_*`, `f_rest_*`, `scale_*`, `rot_*`).

use std::collections::HashMap;
use glam::Vec4;
use log::info;
use crate::Splats;
use crate::activation::{normalize_rotation, sh_coeffs_for_degree, sigmoid};
use crate::error::{DecodeError, FormatError, Result};

/// The trained-model format is fixed at SH degree 3.
const MAX_SH_DEGREE: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(token: &str) -> Option<ScalarType> {
        match token {
            "char" | "int8" => Some(Self::I8),
            "uchar" | "uint8" => Some(Self::U8),
            "short" | "int16" => Some(Self::I16),
            "ushort" | "uint16" => Some(Self::U16),
            "int" | "int32" => Some(Self::I32),
            "uint" | "uint32" => Some(Self::U32),
            "float" | "float32" => Some(Self::F32),
            "double" | "float64" => Some(Self::F64),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// One vertex property resolved to its position inside a record.
#[derive(Debug, Clone, Copy)]
struct Field {
    offset: usize,
    kind: ScalarType,
}

impl Field {
    fn read(&self, record: &[u8]) -> f32 {
        let bytes = &record[self.offset..self.offset + self.kind.size()];
        match self.kind {
            ScalarType::I8 => bytes[0] as i8 as f32,
            ScalarType::U8 => bytes[0] as f32,
            ScalarType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            ScalarType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            ScalarType::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            ScalarType::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            ScalarType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            ScalarType::F64 => f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as f32,
        }
    }
}

/// Schema of the vertex element, recovered from the header. Property order
/// within a record is free; lookups go by name.
struct VertexLayout {
    fields: HashMap<String, Field>,
    stride: usize,
    count: usize,
}

impl VertexLayout {
    fn field(&self, name: &str) -> Result<Field> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| FormatError::MissingProperty(name.to_string()).into())
    }

    /// Resolve `prefix_0 .. prefix_{count-1}`: the explicit name list the
    /// format guarantees, in ascending coefficient order.
    fn indexed_fields(&self, prefix: &str, count: usize) -> Result<Vec<Field>> {
        (0..count)
            .map(|i| self.field(&format!("{prefix}{i}")))
            .collect()
    }

    fn count_with_prefix(&self, prefix: &str) -> usize {
        self.fields
            .keys()
            .filter(|name| name.starts_with(prefix))
            .count()
    }
}

fn read_line<'a>(bytes: &'a [u8], pos: &mut usize) -> Result<&'a str> {
    let start = *pos;
    let end = bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .ok_or(FormatError::Header("missing end_header"))?
        + start;
    *pos = end + 1;
    let line = std::str::from_utf8(&bytes[start..end])
        .map_err(|_| FormatError::Header("header is not ascii"))?;
    Ok(line.trim_end_matches('\r').trim())
}

/// Parse the ascii header; returns the vertex schema and the body offset.
fn parse_header(bytes: &[u8]) -> Result<(VertexLayout, usize)> {
    let mut pos = 0;
    if read_line(bytes, &mut pos)? != "ply" {
        return Err(FormatError::NotPly.into());
    }

    let mut fields = HashMap::new();
    let mut stride = 0;
    let mut count = None;
    let mut in_vertex_element = false;

    loop {
        let line = read_line(bytes, &mut pos)?;
        if line == "end_header" {
            break;
        }

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("format") => {
                let rest: Vec<_> = tokens.collect();
                if rest != ["binary_little_endian", "1.0"] {
                    return Err(FormatError::UnsupportedEncoding(line.to_string()).into());
                }
            }
            Some("element") => {
                let name = tokens
                    .next()
                    .ok_or(FormatError::Header("bad element line"))?;
                if name == "vertex" {
                    let n = tokens
                        .next()
                        .and_then(|n| n.parse().ok())
                        .ok_or(FormatError::Header("bad vertex count"))?;
                    count = Some(n);
                    in_vertex_element = true;
                } else {
                    // Trailing elements are never read; one before the
                    // vertex data would shift the body offset.
                    if count.is_none() {
                        return Err(FormatError::Header("vertex element must come first").into());
                    }
                    in_vertex_element = false;
                }
            }
            Some("property") if in_vertex_element => {
                let kind = tokens
                    .next()
                    .ok_or(FormatError::Header("bad property line"))?;
                if kind == "list" {
                    return Err(FormatError::Header("list properties are not supported").into());
                }
                let kind = ScalarType::parse(kind)
                    .ok_or(FormatError::Header("unknown property type"))?;
                let name = tokens
                    .next()
                    .ok_or(FormatError::Header("bad property line"))?;
                fields.insert(
                    name.to_string(),
                    Field {
                        offset: stride,
                        kind,
                    },
                );
                stride += kind.size();
            }
            // comment, obj_info, properties of other elements
            _ => {}
        }
    }

    let count = count.ok_or(FormatError::Header("no vertex element"))?;
    Ok((
        VertexLayout {
            fields,
            stride,
            count,
        },
        pos,
    ))
}

/// Decode a static trained model into the canonical buffer.
///
/// Activations: sigmoid on opacity, exp on scale, unit-normalization on
/// rotation. Color coefficients are already in SH space and pass through.
pub fn decode(bytes: &[u8]) -> Result<Splats> {
    let (layout, body_offset) = parse_header(bytes)?;
    let n = layout.count;

    let body = &bytes[body_offset..];
    let expected = n * layout.stride;
    if body.len() < expected {
        return Err(FormatError::Truncated {
            expected,
            found: body.len(),
        }
        .into());
    }

    let rest_len = (sh_coeffs_for_degree(MAX_SH_DEGREE) as usize - 1) * 3;
    let found_rest = layout.count_with_prefix("f_rest_");
    if found_rest != rest_len {
        return Err(FormatError::RestCoeffCount {
            expected: rest_len,
            found: found_rest,
        }
        .into());
    }

    let position = [
        layout.field("x")?,
        layout.field("y")?,
        layout.field("z")?,
    ];
    let opacity = layout.field("opacity")?;
    let dc = layout.indexed_fields("f_dc_", 3)?;
    let rest = layout.indexed_fields("f_rest_", rest_len)?;
    let scale = layout.indexed_fields("scale_", 3)?;
    let rot = layout.indexed_fields("rot_", 4)?;

    info!(
        "Decoding trained model: {n} splats, {} vertex properties",
        layout.fields.len()
    );

    let sh_dim = 3 + rest_len;
    let coeffs_per_channel = rest_len / 3;

    let mut means = Vec::with_capacity(n * 3);
    let mut rotations = Vec::with_capacity(n * 4);
    let mut scales = Vec::with_capacity(n * 3);
    let mut opacities = Vec::with_capacity(n);
    let mut sh_coeffs = Vec::with_capacity(n * sh_dim);

    for i in 0..n {
        let record = &body[i * layout.stride..(i + 1) * layout.stride];

        for field in &position {
            means.push(field.read(record));
        }

        let q = Vec4::new(
            rot[0].read(record),
            rot[1].read(record),
            rot[2].read(record),
            rot[3].read(record),
        );
        let q = normalize_rotation(q).ok_or(DecodeError::DegenerateRotation { index: i })?;
        rotations.extend_from_slice(&q.to_array());

        for field in &scale {
            scales.push(field.read(record).exp());
        }

        opacities.push(sigmoid(opacity.read(record)));

        for field in &dc {
            sh_coeffs.push(field.read(record));
        }
        // Rest coefficients are stored channel-major; the buffer interleaves
        // the 3 channels per coefficient index.
        for coeff in 0..coeffs_per_channel {
            for channel in 0..3 {
                sh_coeffs.push(rest[channel * coeffs_per_channel + coeff].read(record));
            }
        }
    }

    Ok(Splats::new(
        means, rotations, scales, opacities, sh_coeffs, sh_dim,
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::activation::inverse_sigmoid;
    use super::*;

    fn header(count: usize, rest_fields: usize, extras: bool) -> String {
        let mut header = String::from("ply\nformat binary_little_endian 1.0\ncomment generated\n");
        header.push_str(&format!("element vertex {count}\n"));
        for name in ["x", "y", "z"] {
            header.push_str(&format!("property float {name}\n"));
        }
        if extras {
            for name in ["nx", "ny", "nz"] {
                header.push_str(&format!("property float {name}\n"));
            }
        }
        for i in 0..3 {
            header.push_str(&format!("property float f_dc_{i}\n"));
        }
        for i in 0..rest_fields {
            header.push_str(&format!("property float f_rest_{i}\n"));
        }
        header.push_str("property float opacity\n");
        for i in 0..3 {
            header.push_str(&format!("property float scale_{i}\n"));
        }
        for i in 0..4 {
            header.push_str(&format!("property float rot_{i}\n"));
        }
        header.push_str("end_header\n");
        header
    }

    fn point_values(seed: f32) -> Vec<f32> {
        let mut values = vec![seed, seed + 1.0, seed + 2.0]; // x y z
        values.extend([0.0, 0.0, 1.0]); // nx ny nz
        values.extend([0.5, 0.6, 0.7]); // f_dc
        // f_rest, channel-major: channel*100 + coefficient index
        for channel in 0..3 {
            for coeff in 0..15 {
                values.push((channel * 100 + coeff) as f32);
            }
        }
        values.push(inverse_sigmoid(0.25)); // opacity
        values.extend([0.0, 1.0, -1.0]); // log scales
        values.extend([2.0, 0.0, 0.0, 0.0]); // rot, unnormalized
        values
    }

    /// Two-point model with normals mixed in, rest count 45.
    pub(crate) fn model_fixture() -> Vec<u8> {
        let mut bytes = header(2, 45, true).into_bytes();
        for seed in [1.0f32, 10.0] {
            for value in point_values(seed) {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        bytes
    }

    #[test]
    fn test_decode_applies_activations() {
        let splats = decode(&model_fixture()).unwrap();
        assert_eq!(splats.num_splats(), 2);
        assert_eq!(splats.sh_dim(), 48);
        assert_eq!(splats.sh_degree(), Some(3));

        // Positions pass through.
        assert_eq!(&splats.means()[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&splats.means()[3..6], &[10.0, 11.0, 12.0]);

        for i in 0..2 {
            let q = &splats.rotations()[i * 4..(i + 1) * 4];
            let norm = q.iter().map(|c| c * c).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
            // Storage order preserved: (2, 0, 0, 0) normalizes to w = 1.
            assert_eq!(q, [1.0, 0.0, 0.0, 0.0]);

            let s = &splats.scales()[i * 3..(i + 1) * 3];
            assert!(s.iter().all(|v| *v > 0.0));
            assert!((s[0] - 1.0).abs() < 1e-6);
            assert!((s[1] - 1.0f32.exp()).abs() < 1e-6);

            let opacity = splats.opacities()[i];
            assert!((0.0..=1.0).contains(&opacity));
            assert!((opacity - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_color_is_not_shifted_and_rest_is_transposed() {
        let splats = decode(&model_fixture()).unwrap();
        let sh = &splats.sh_coeffs()[0..48];

        // DC passes through raw, no SH shift.
        assert_eq!(&sh[0..3], &[0.5, 0.6, 0.7]);
        // Channel-major storage becomes per-coefficient interleaving.
        for coeff in 0..15 {
            let triple = &sh[3 + coeff * 3..6 + coeff * 3];
            assert_eq!(
                triple,
                [coeff as f32, (100 + coeff) as f32, (200 + coeff) as f32]
            );
        }
    }

    #[test]
    fn test_rest_count_is_enforced() {
        let mut bytes = header(1, 44, false).into_bytes();
        bytes.extend(std::iter::repeat_n(0u8, 4 * (3 + 3 + 44 + 1 + 3 + 4)));
        let result = decode(&bytes);
        assert!(matches!(
            result,
            Err(DecodeError::Format(FormatError::RestCoeffCount {
                expected: 45,
                found: 44
            }))
        ));
    }

    #[test]
    fn test_missing_property_is_named() {
        let header = header(1, 45, false).replace("property float opacity\n", "");
        let mut bytes = header.into_bytes();
        bytes.extend(std::iter::repeat_n(0u8, 4 * (3 + 3 + 45 + 3 + 4)));
        // The schema is validated before any record is read.
        let result = decode(&bytes);
        assert!(matches!(
            result,
            Err(DecodeError::Format(FormatError::MissingProperty(name))) if name == "opacity"
        ));
    }

    #[test]
    fn test_rejects_ascii_encoding() {
        let bytes = b"ply\nformat ascii 1.0\nelement vertex 0\nend_header\n";
        let result = decode(bytes);
        assert!(matches!(
            result,
            Err(DecodeError::Format(FormatError::UnsupportedEncoding(_)))
        ));
    }

    #[test]
    fn test_rejects_truncated_body() {
        let mut bytes = model_fixture();
        bytes.truncate(bytes.len() - 8);
        let result = decode(&bytes);
        assert!(matches!(
            result,
            Err(DecodeError::Format(FormatError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_zero_norm_rotation_is_an_integrity_error() {
        let mut bytes = header(1, 45, false).into_bytes();
        let mut values = point_values(0.0);
        // Drop the normals block the plain header does not declare.
        values.drain(3..6);
        let rot = values.len() - 4;
        values[rot..].copy_from_slice(&[0.0; 4]);
        for value in values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let result = decode(&bytes);
        assert!(matches!(
            result,
            Err(DecodeError::DegenerateRotation { index: 0 })
        ));
    }

    #[test]
    fn test_not_a_ply_file() {
        assert!(matches!(
            decode(b"PK\x03\x04whatever\n"),
            Err(DecodeError::Format(FormatError::NotPly))
        ));
    }
}

//! Minimal reader for the numpy `.npy` array payloads found inside frame
//! archives. Only little-endian float arrays in C order appear there.

use crate::error::FormatError;

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl NpyArray {
    pub fn parse(name: &str, bytes: &[u8]) -> Result<NpyArray, FormatError> {
        let err = |reason| FormatError::Npy {
            name: name.to_string(),
            reason,
        };

        if bytes.len() < 10 || !bytes.starts_with(MAGIC) {
            return Err(err("bad magic"));
        }

        // Version 1 stores the header length as u16, later versions as u32.
        let major = bytes[6];
        let (header_len, header_start) = match major {
            1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
            2 | 3 => {
                if bytes.len() < 12 {
                    return Err(err("truncated header"));
                }
                let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
                (len as usize, 12)
            }
            _ => return Err(err("unsupported version")),
        };

        let data_start = header_start + header_len;
        if bytes.len() < data_start {
            return Err(err("truncated header"));
        }
        let header = std::str::from_utf8(&bytes[header_start..data_start])
            .map_err(|_| err("header is not utf-8"))?;

        if dict_value(header, "fortran_order").is_some_and(|v| v.starts_with("True")) {
            return Err(err("fortran order is not supported"));
        }

        let descr = dict_str_value(header, "descr").ok_or(err("missing dtype"))?;
        let shape = parse_shape(dict_value(header, "shape").ok_or(err("missing shape"))?)
            .ok_or(err("bad shape"))?;

        let count: usize = shape.iter().product();
        let payload = &bytes[data_start..];
        let data = match descr.as_str() {
            "<f4" => {
                if payload.len() < count * 4 {
                    return Err(err("truncated data"));
                }
                payload[..count * 4]
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            }
            "<f8" => {
                if payload.len() < count * 8 {
                    return Err(err("truncated data"));
                }
                payload[..count * 8]
                    .chunks_exact(8)
                    .map(|c| {
                        f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                    })
                    .collect()
            }
            _ => return Err(err("unsupported dtype")),
        };

        Ok(NpyArray { shape, data })
    }

    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }
}

/// The raw text after `'key':`, up to the next top-level separator.
fn dict_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{key}':");
    let start = header.find(&needle)? + needle.len();
    Some(header[start..].trim_start())
}

fn dict_str_value(header: &str, key: &str) -> Option<String> {
    let value = dict_value(header, key)?;
    let value = value.strip_prefix('\'')?;
    Some(value[..value.find('\'')?].to_string())
}

fn parse_shape(value: &str) -> Option<Vec<usize>> {
    let value = value.strip_prefix('(')?;
    let inner = &value[..value.find(')')?];
    inner
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect()
}

#[cfg(test)]
pub(crate) fn npy_fixture(descr: &str, shape: &[usize], values: &[f32]) -> Vec<u8> {
    let shape_str = match shape {
        [single] => format!("({single},)"),
        _ => format!(
            "({})",
            shape
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header =
        format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape_str}, }}")
            .into_bytes();
    let pad = (64 - (10 + header.len() + 1) % 64) % 64;
    header.extend(std::iter::repeat_n(b' ', pad));
    header.push(b'\n');

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(&header);
    for v in values {
        match descr {
            "<f4" => out.extend_from_slice(&v.to_le_bytes()),
            "<f8" => out.extend_from_slice(&(*v as f64).to_le_bytes()),
            _ => unreachable!("fixtures only cover float dtypes"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_f4() {
        let bytes = npy_fixture("<f4", &[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let array = NpyArray::parse("means3D", &bytes).unwrap();
        assert_eq!(array.shape, [2, 3]);
        assert_eq!(array.rows(), 2);
        assert_eq!(array.data, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_parse_f8_narrows() {
        let bytes = npy_fixture("<f8", &[2], &[0.25, -1.5]);
        let array = NpyArray::parse("log_scales", &bytes).unwrap();
        assert_eq!(array.shape, [2]);
        assert_eq!(array.data, [0.25, -1.5]);
    }

    #[test]
    fn test_rejects_fortran_order() {
        let mut bytes = npy_fixture("<f4", &[1], &[1.0]);
        let header_end = 10 + u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let header = String::from_utf8(bytes[10..header_end].to_vec()).unwrap();
        let flipped = header.replace("False", "True ");
        bytes[10..header_end].copy_from_slice(flipped.as_bytes());

        let result = NpyArray::parse("rgb_colors", &bytes);
        assert!(matches!(
            result,
            Err(FormatError::Npy {
                reason: "fortran order is not supported",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let result = NpyArray::parse("means3D", b"NOTNUMPY....");
        assert!(matches!(
            result,
            Err(FormatError::Npy {
                reason: "bad magic",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let mut bytes = npy_fixture("<f4", &[4], &[1.0, 2.0, 3.0, 4.0]);
        bytes.truncate(bytes.len() - 4);
        let result = NpyArray::parse("unnorm_rotations", &bytes);
        assert!(matches!(
            result,
            Err(FormatError::Npy {
                reason: "truncated data",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_unknown_dtype() {
        let mut bytes = npy_fixture("<f4", &[1], &[1.0]);
        let pos = bytes.windows(3).position(|w| w == b"<f4").unwrap();
        bytes[pos..pos + 3].copy_from_slice(b"<i8");
        let result = NpyArray::parse("logit_opacities", &bytes);
        assert!(matches!(
            result,
            Err(FormatError::Npy {
                reason: "unsupported dtype",
                ..
            })
        ));
    }
}

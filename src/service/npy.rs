//! Decoding of the NumPy `.npy` payloads returned by `getPixels`.
//!
//! Only what the service produces for a single band is handled: a C-ordered
//! two-dimensional array of little-endian numbers, optionally wrapped in a
//! one-field structured dtype named after the band.

use crate::{
    error::{Error, Result},
    raster::Raster,
};

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, Clone, Copy, PartialEq)]
enum DType {
    F4,
    F8,
    I2,
    I4,
    U1,
    U2,
}

impl DType {
    fn from_descr(descr: &str) -> Option<Self> {
        match descr {
            "<f4" => Some(DType::F4),
            "<f8" => Some(DType::F8),
            "<i2" => Some(DType::I2),
            "<i4" => Some(DType::I4),
            "|u1" | "<u1" => Some(DType::U1),
            "<u2" => Some(DType::U2),
            _ => None,
        }
    }

    fn size(&self) -> usize {
        match self {
            DType::U1 => 1,
            DType::I2 | DType::U2 => 2,
            DType::F4 | DType::I4 => 4,
            DType::F8 => 8,
        }
    }

    fn read(&self, b: &[u8]) -> f32 {
        match self {
            DType::F4 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            DType::F8 => f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32,
            DType::I2 => i16::from_le_bytes([b[0], b[1]]) as f32,
            DType::I4 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
            DType::U1 => b[0] as f32,
            DType::U2 => u16::from_le_bytes([b[0], b[1]]) as f32,
        }
    }
}

/// Decodes a two-dimensional `.npy` array into a raster.
pub fn decode(bytes: &[u8]) -> Result<Raster> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(malformed("missing magic string"));
    }

    let major = bytes[6];
    let (header_len, offset) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(malformed("truncated header length"));
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        v => return Err(malformed(&format!("unsupported version {}", v))),
    };

    let header_end = offset + header_len;
    if bytes.len() < header_end {
        return Err(malformed("truncated header"));
    }
    let header = std::str::from_utf8(&bytes[offset..header_end])
        .map_err(|_| malformed("header is not text"))?;

    if header.contains("'fortran_order': True") {
        return Err(malformed("Fortran-ordered arrays are not supported"));
    }
    let dtype = parse_dtype(header)?;
    let shape = parse_shape(header)?;
    let (height, width) = match shape.as_slice() {
        [h, w] => (*h, *w),
        other => {
            return Err(malformed(&format!(
                "expected a two-dimensional array, got shape {:?}",
                other
            )))
        }
    };

    if u32::try_from(width).is_err() || u32::try_from(height).is_err() {
        return Err(malformed("shape too large"));
    }
    let (count, expected) = width
        .checked_mul(height)
        .and_then(|count| Some((count, count.checked_mul(dtype.size())?)))
        .ok_or_else(|| malformed("shape too large"))?;

    let data = &bytes[header_end..];
    if data.len() < expected {
        return Err(malformed(&format!(
            "expected {} bytes of data, got {}",
            expected,
            data.len()
        )));
    }

    let values = data
        .chunks_exact(dtype.size())
        .take(count)
        .map(|chunk| dtype.read(chunk))
        .collect();

    Raster::new(width as u32, height as u32, values)
        .ok_or_else(|| malformed("data does not match shape"))
}

fn parse_dtype(header: &str) -> Result<DType> {
    let descr = value_after(header, "'descr':").ok_or_else(|| malformed("no descr"))?;

    // Plain descr: '<f4'. Structured: [('band', '<f4')]
    let descr = if descr.trim_start().starts_with('[') {
        let end = descr.find(']').ok_or_else(|| malformed("unterminated descr"))?;
        let quoted: Vec<&str> = descr[..end].split('\'').skip(1).step_by(2).collect();
        match quoted.as_slice() {
            [_name, descr] => *descr,
            _ => return Err(malformed("expected exactly one band in structured descr")),
        }
    } else {
        descr
            .split('\'')
            .nth(1)
            .ok_or_else(|| malformed("empty descr"))?
    };

    DType::from_descr(descr).ok_or_else(|| malformed(&format!("unsupported dtype `{}`", descr)))
}

fn parse_shape(header: &str) -> Result<Vec<usize>> {
    let rest = value_after(header, "'shape':").ok_or_else(|| malformed("no shape"))?;
    let open = rest.find('(').ok_or_else(|| malformed("shape is not a tuple"))?;
    let close = rest.find(')').ok_or_else(|| malformed("shape is not a tuple"))?;

    rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| malformed(&format!("bad dimension `{}`", s))))
        .collect()
}

fn value_after<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    header.find(key).map(|i| &header[i + key.len()..])
}

fn malformed(reason: &str) -> Error {
    Error::RemoteQuery(format!("malformed pixel payload: {}", reason))
}

#[cfg(test)]
mod tests {

    use super::*;

    fn encode(descr: &str, shape: (usize, usize), data: &[u8]) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': {}, 'fortran_order': False, 'shape': ({}, {}), }}",
            descr, shape.0, shape.1
        );
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn should_decode_plain_float_array() {
        let bytes = encode("'<f4'", (2, 3), &f32_bytes(&[0.0, 1.5, 2.0, 3.0, 4.0, 5.25]));
        let raster = decode(&bytes).unwrap();

        assert_eq!((raster.width, raster.height), (3, 2));
        assert_eq!(raster.values[1], 1.5);
        assert_eq!(raster.values[5], 5.25);
    }

    #[test]
    fn should_decode_single_band_structured_array() {
        let bytes = encode(
            "[('precipitationCal', '<f4')]",
            (1, 2),
            &f32_bytes(&[0.25, 7.0]),
        );
        let raster = decode(&bytes).unwrap();

        assert_eq!(raster.values, vec![0.25, 7.0]);
    }

    #[test]
    fn should_widen_integers() {
        let data: Vec<u8> = [-3i16, 300].iter().flat_map(|v| v.to_le_bytes()).collect();
        let raster = decode(&encode("'<i2'", (1, 2), &data)).unwrap();

        assert_eq!(raster.values, vec![-3.0, 300.0]);
    }

    #[test]
    fn should_reject_truncated_data() {
        let bytes = encode("'<f4'", (2, 2), &f32_bytes(&[1.0, 2.0]));
        assert!(matches!(decode(&bytes), Err(Error::RemoteQuery(_))));
    }

    #[test]
    fn should_reject_oversized_shape() {
        let huge = encode("'<f4'", (usize::MAX, 2), &f32_bytes(&[1.0, 2.0]));
        assert!(matches!(decode(&huge), Err(Error::RemoteQuery(_))));

        let wide = encode("'<f8'", (1, 1 << 40), &[]);
        assert!(matches!(decode(&wide), Err(Error::RemoteQuery(_))));
    }

    #[test]
    fn should_reject_non_npy() {
        assert!(decode(b"<html>quota exceeded</html>").is_err());
    }

    #[test]
    fn should_reject_multi_band_payload() {
        let bytes = encode("[('a', '<f4'), ('b', '<f4')]", (1, 1), &f32_bytes(&[1.0, 2.0]));
        assert!(decode(&bytes).is_err());
    }
}

//! NAL unit helpers for H.264 and HEVC streams.
//!
//! Covers the two framings packets use: Annex B (start-code delimited) and
//! length-prefixed ("mp4" / avcC / hvcC).

use crate::error::{Error, Result};
use crate::format::CodecId;

/// Four-byte Annex B start code.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// H.264 NAL unit types used by stream filters.
pub mod h264 {
    /// Coded slice of an IDR picture.
    pub const IDR: u8 = 5;
    /// Supplemental enhancement information.
    pub const SEI: u8 = 6;
    /// Sequence parameter set.
    pub const SPS: u8 = 7;
    /// Picture parameter set.
    pub const PPS: u8 = 8;
    /// Access unit delimiter.
    pub const AUD: u8 = 9;
}

/// HEVC NAL unit types used by stream filters.
pub mod hevc {
    /// First IRAP type (BLA_W_LP).
    pub const IRAP_FIRST: u8 = 16;
    /// Last IRAP type (reserved IRAP 23).
    pub const IRAP_LAST: u8 = 23;
    /// Video parameter set.
    pub const VPS: u8 = 32;
    /// Sequence parameter set.
    pub const SPS: u8 = 33;
    /// Picture parameter set.
    pub const PPS: u8 = 34;
}

/// Find the next start code in a byte slice.
///
/// Returns the offset and length (3 or 4) of the first `00 00 01` or
/// `00 00 00 01` sequence.
pub fn find_start_code(data: &[u8]) -> Option<(usize, usize)> {
    let len = data.len();
    if len < 3 {
        return None;
    }
    for i in 0..len - 2 {
        if data[i] != 0 || data[i + 1] != 0 {
            continue;
        }
        if data[i + 2] == 1 {
            return Some((i, 3));
        }
        if i + 3 < len && data[i + 2] == 0 && data[i + 3] == 1 {
            return Some((i, 4));
        }
    }
    None
}

/// Iterator over the NAL payloads of an Annex B buffer.
///
/// Payloads exclude start codes and trailing zero bytes. Data before the
/// first start code is skipped.
#[derive(Debug, Clone)]
pub struct AnnexBUnits<'a> {
    rest: &'a [u8],
}

impl<'a> AnnexBUnits<'a> {
    /// Create an iterator over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        let rest = match find_start_code(data) {
            Some((pos, len)) => &data[pos + len..],
            None => &[],
        };
        Self { rest }
    }
}

impl<'a> Iterator for AnnexBUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.rest.is_empty() {
                return None;
            }
            let (unit, rest) = match find_start_code(self.rest) {
                Some((pos, len)) => (&self.rest[..pos], &self.rest[pos + len..]),
                None => (self.rest, &[][..]),
            };
            self.rest = rest;
            let end = unit.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
            if end > 0 {
                return Some(&unit[..end]);
            }
        }
    }
}

/// Check if `data` starts with an Annex B start code.
pub fn is_annexb(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 1]) || data.starts_with(&START_CODE)
}

/// Split a length-prefixed buffer into NAL payloads.
pub fn split_length_prefixed(data: &[u8], length_size: usize) -> Result<Vec<&[u8]>> {
    if !(1..=4).contains(&length_size) {
        return Err(Error::corrupt(format!("invalid NAL length size {length_size}")));
    }
    let mut units = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if pos + length_size > data.len() {
            return Err(Error::corrupt("truncated NAL length prefix"));
        }
        let size = data[pos..pos + length_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
        pos += length_size;
        if size > data.len() - pos {
            return Err(Error::corrupt(format!(
                "NAL unit of {size} bytes overruns packet ({} left)",
                data.len() - pos
            )));
        }
        units.push(&data[pos..pos + size]);
        pos += size;
    }
    Ok(units)
}

/// Append `nal` to `out` behind a four-byte start code.
pub fn write_annexb(out: &mut Vec<u8>, nal: &[u8]) {
    out.extend_from_slice(&START_CODE);
    out.extend_from_slice(nal);
}

/// Get the NAL unit type for `codec`, `None` for empty units or other codecs.
pub fn nal_type(codec: CodecId, nal: &[u8]) -> Option<u8> {
    let header = *nal.first()?;
    match codec {
        CodecId::H264 => Some(header & 0x1f),
        CodecId::Hevc => Some((header >> 1) & 0x3f),
        _ => None,
    }
}

/// Check if a NAL type carries parameter sets.
pub fn is_parameter_set(codec: CodecId, nal_type: u8) -> bool {
    match codec {
        CodecId::H264 => matches!(nal_type, h264::SPS | h264::PPS),
        CodecId::Hevc => matches!(nal_type, hevc::VPS | hevc::SPS | hevc::PPS),
        _ => false,
    }
}

/// Check if a NAL type starts a random access point.
pub fn is_random_access(codec: CodecId, nal_type: u8) -> bool {
    match codec {
        CodecId::H264 => nal_type == h264::IDR,
        CodecId::Hevc => (hevc::IRAP_FIRST..=hevc::IRAP_LAST).contains(&nal_type),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_start_code() {
        assert_eq!(find_start_code(&[0x00, 0x00, 0x01, 0x65]), Some((0, 3)));
        assert_eq!(find_start_code(&[0x00, 0x00, 0x00, 0x01, 0x65]), Some((0, 4)));
        assert_eq!(find_start_code(&[0xff, 0x00, 0x00, 0x01, 0x65]), Some((1, 3)));
        assert_eq!(find_start_code(&[0x00, 0x00]), None);
    }

    #[test]
    fn test_annexb_units() {
        let data = [0, 0, 0, 1, 0x67, 1, 2, 0, 0, 1, 0x68, 3, 0, 0, 0, 1, 0x65, 4, 0];
        let units: Vec<&[u8]> = AnnexBUnits::new(&data).collect();
        assert_eq!(units, vec![&[0x67, 1, 2][..], &[0x68, 3][..], &[0x65, 4][..]]);
    }

    #[test]
    fn test_split_length_prefixed() {
        let data = [0, 0, 0, 2, 0x65, 1, 0, 0, 0, 1, 0x41];
        let units = split_length_prefixed(&data, 4).unwrap();
        assert_eq!(units, vec![&[0x65, 1][..], &[0x41][..]]);
        assert!(split_length_prefixed(&data[..5], 4).is_err());
        assert!(split_length_prefixed(&data, 5).is_err());
    }

    #[test]
    fn test_nal_types() {
        assert_eq!(nal_type(CodecId::H264, &[0x67]), Some(h264::SPS));
        assert_eq!(nal_type(CodecId::Hevc, &[0x40, 0x01]), Some(hevc::VPS));
        assert!(is_parameter_set(CodecId::H264, h264::PPS));
        assert!(is_random_access(CodecId::Hevc, 19));
        assert_eq!(nal_type(CodecId::Vp9, &[0x67]), None);
    }
}

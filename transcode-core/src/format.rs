//! Codec identity and media type definitions.

use crate::error::{Error, Result};
use crate::sample::SampleFormat;
use std::fmt;
use std::str::FromStr;

/// Kind of media carried by a stream, pad or buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// Pictures.
    Video,
    /// Sample arrays.
    Audio,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Codec identifier attached to compressed units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    Hevc,
    /// VP9.
    Vp9,
    /// AV1.
    Av1,
    /// Uncompressed pictures, tightly packed planes.
    RawVideo,
    /// AAC.
    Aac,
    /// Opus.
    Opus,
    /// FLAC.
    Flac,
    /// PCM unsigned 8-bit.
    PcmU8,
    /// PCM signed 16-bit little-endian.
    PcmS16Le,
    /// PCM signed 16-bit big-endian.
    PcmS16Be,
    /// PCM signed 32-bit little-endian.
    PcmS32Le,
    /// PCM 32-bit float little-endian.
    PcmF32Le,
    /// PCM 64-bit float little-endian.
    PcmF64Le,
}

const ALL_CODECS: &[CodecId] = &[
    CodecId::H264,
    CodecId::Hevc,
    CodecId::Vp9,
    CodecId::Av1,
    CodecId::RawVideo,
    CodecId::Aac,
    CodecId::Opus,
    CodecId::Flac,
    CodecId::PcmU8,
    CodecId::PcmS16Le,
    CodecId::PcmS16Be,
    CodecId::PcmS32Le,
    CodecId::PcmF32Le,
    CodecId::PcmF64Le,
];

impl CodecId {
    /// Get the short codec name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::RawVideo => "rawvideo",
            Self::Aac => "aac",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::PcmU8 => "pcm_u8",
            Self::PcmS16Le => "pcm_s16le",
            Self::PcmS16Be => "pcm_s16be",
            Self::PcmS32Le => "pcm_s32le",
            Self::PcmF32Le => "pcm_f32le",
            Self::PcmF64Le => "pcm_f64le",
        }
    }

    /// Get the media type this codec carries.
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::H264 | Self::Hevc | Self::Vp9 | Self::Av1 | Self::RawVideo => MediaType::Video,
            _ => MediaType::Audio,
        }
    }

    /// Get the packed sample format of a PCM codec.
    pub fn pcm_sample_format(&self) -> Option<SampleFormat> {
        match self {
            Self::PcmU8 => Some(SampleFormat::U8),
            Self::PcmS16Le | Self::PcmS16Be => Some(SampleFormat::S16),
            Self::PcmS32Le => Some(SampleFormat::S32),
            Self::PcmF32Le => Some(SampleFormat::F32),
            Self::PcmF64Le => Some(SampleFormat::F64),
            _ => None,
        }
    }

    /// Check if this codec stores samples big-endian.
    pub fn is_big_endian(&self) -> bool {
        matches!(self, Self::PcmS16Be)
    }

    /// Iterate over every known codec identifier.
    pub fn all() -> impl Iterator<Item = CodecId> {
        ALL_CODECS.iter().copied()
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodecId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "avc" | "h.264" => return Ok(Self::H264),
            "h265" | "h.265" => return Ok(Self::Hevc),
            "raw" => return Ok(Self::RawVideo),
            _ => {}
        }
        Self::all()
            .find(|c| c.name() == lower)
            .ok_or_else(|| Error::unsupported(format!("unknown codec '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_names_round_trip() {
        for codec in CodecId::all() {
            assert_eq!(codec.name().parse::<CodecId>().unwrap(), codec);
        }
        assert_eq!("AVC".parse::<CodecId>().unwrap(), CodecId::H264);
        assert!(matches!("mpeg9".parse::<CodecId>(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_media_type() {
        assert_eq!(CodecId::RawVideo.media_type(), MediaType::Video);
        assert_eq!(CodecId::PcmS16Le.media_type(), MediaType::Audio);
        assert_eq!(CodecId::PcmS16Be.pcm_sample_format(), Some(SampleFormat::S16));
        assert!(CodecId::H264.pcm_sample_format().is_none());
    }
}

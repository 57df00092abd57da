//! Codec lookup.
//!
//! Every [`CodecId`] has an entry describing what this crate can do with it.
//! Compressed formats without an implementation are listed so lookups fail
//! with a precise `Unsupported` instead of an unknown-name error.

use crate::pcm::{PcmDecoder, PcmEncoder};
use crate::rawvideo::{RawVideoDecoder, RawVideoEncoder};
use transcode_core::{CodecId, Error, Logger, Result, Session, Stage};

/// Information about a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecInfo {
    /// Codec identity.
    pub id: CodecId,
    /// Long name/description.
    pub long_name: &'static str,
    /// Whether this codec supports encoding.
    pub can_encode: bool,
    /// Whether this codec supports decoding.
    pub can_decode: bool,
}

impl CodecInfo {
    const fn new(id: CodecId, long_name: &'static str, implemented: bool) -> Self {
        Self {
            id,
            long_name,
            can_encode: implemented,
            can_decode: implemented,
        }
    }

    /// Get the codec name.
    pub fn name(&self) -> &'static str {
        self.id.name()
    }
}

const CODECS: &[CodecInfo] = &[
    CodecInfo::new(CodecId::H264, "H.264 / AVC", false),
    CodecInfo::new(CodecId::Hevc, "H.265 / HEVC", false),
    CodecInfo::new(CodecId::Vp9, "VP9", false),
    CodecInfo::new(CodecId::Av1, "AV1", false),
    CodecInfo::new(CodecId::RawVideo, "raw video", true),
    CodecInfo::new(CodecId::Aac, "AAC", false),
    CodecInfo::new(CodecId::Opus, "Opus", false),
    CodecInfo::new(CodecId::Flac, "FLAC", false),
    CodecInfo::new(CodecId::PcmU8, "PCM unsigned 8-bit", true),
    CodecInfo::new(CodecId::PcmS16Le, "PCM signed 16-bit little-endian", true),
    CodecInfo::new(CodecId::PcmS16Be, "PCM signed 16-bit big-endian", true),
    CodecInfo::new(CodecId::PcmS32Le, "PCM signed 32-bit little-endian", true),
    CodecInfo::new(CodecId::PcmF32Le, "PCM 32-bit float little-endian", true),
    CodecInfo::new(CodecId::PcmF64Le, "PCM 64-bit float little-endian", true),
];

/// Get the registry entry for a codec.
pub fn codec_info(id: CodecId) -> CodecInfo {
    CODECS
        .iter()
        .copied()
        .find(|info| info.id == id)
        .unwrap_or(CodecInfo::new(id, "unknown", false))
}

/// Iterate over every registry entry.
pub fn codecs() -> impl Iterator<Item = CodecInfo> {
    CODECS.iter().copied()
}

/// Create a decoder stage for `id`.
pub fn find_decoder(id: CodecId) -> Result<Box<dyn Stage>> {
    create_decoder(id, Logger::disabled())
}

/// Create an encoder stage for `id`.
pub fn find_encoder(id: CodecId) -> Result<Box<dyn Stage>> {
    create_encoder(id, Logger::disabled())
}

/// Create a decoder stage for `id` logging through `logger`.
pub fn create_decoder(id: CodecId, logger: Logger) -> Result<Box<dyn Stage>> {
    let name = format!("{id}_dec");
    let stage: Box<dyn Stage> = match id {
        CodecId::RawVideo => Box::new(
            Session::new(RawVideoDecoder::new())
                .with_name(name)
                .with_logger(logger),
        ),
        _ if id.pcm_sample_format().is_some() => Box::new(
            Session::new(PcmDecoder::new(id))
                .with_name(name)
                .with_logger(logger),
        ),
        _ => {
            return Err(Error::unsupported(format!(
                "no decoder for {} ({})",
                id,
                codec_info(id).long_name
            )))
        }
    };
    Ok(stage)
}

/// Create an encoder stage for `id` logging through `logger`.
pub fn create_encoder(id: CodecId, logger: Logger) -> Result<Box<dyn Stage>> {
    let name = format!("{id}_enc");
    let stage: Box<dyn Stage> = match id {
        CodecId::RawVideo => Box::new(
            Session::new(RawVideoEncoder::new())
                .with_name(name)
                .with_logger(logger),
        ),
        _ if id.pcm_sample_format().is_some() => Box::new(
            Session::new(PcmEncoder::new(id))
                .with_name(name)
                .with_logger(logger),
        ),
        _ => {
            return Err(Error::unsupported(format!(
                "no encoder for {} ({})",
                id,
                codec_info(id).long_name
            )))
        }
    };
    Ok(stage)
}

/// Create a decoder stage by codec name.
pub fn decoder_by_name(name: &str) -> Result<Box<dyn Stage>> {
    find_decoder(name.parse()?)
}

/// Create an encoder stage by codec name.
pub fn encoder_by_name(name: &str) -> Result<Box<dyn Stage>> {
    find_encoder(name.parse()?)
}

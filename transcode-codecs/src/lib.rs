//! # Transcode Codecs
//!
//! Codec sessions and stream-rewriting filters for the Transcode pipeline.
//! Every codec and filter here is a [`Processor`](transcode_core::Processor)
//! wrapped in a [`Session`](transcode_core::Session), so all of them speak
//! the same submit/retrieve protocol.
//!
//! ## Codecs
//! - `rawvideo` decoder and encoder (optional output into device surfaces)
//! - `pcm_u8`, `pcm_s16le`, `pcm_s16be`, `pcm_s32le`, `pcm_f32le`,
//!   `pcm_f64le` decoders and encoders
//!
//! Compressed formats without an implementation are known to the
//! [`registry`] and report `Unsupported`.
//!
//! ## Bitstream Filters
//!
//! See [`bsf`]: `null`, `h264_mp4toannexb`, `extract_extradata`,
//! `dump_extra`, `remove_extra`, `setts`, `chomp`, and filter lists such as
//! `"setts=offset=10,chomp"`.
//!
//! ## Example
//!
//! ```ignore
//! use transcode_codecs::find_decoder;
//!
//! let mut decoder = find_decoder(CodecId::PcmS16Le)?;
//! decoder.configure(StageParams::new(stream))?;
//! decoder.open()?;
//! ```

pub mod bsf;
pub mod pcm;
pub mod rawvideo;
pub mod registry;

pub use bsf::{create_bsf, parse_bsf_list, BitstreamFilter, BsfProcessor};
pub use pcm::{PcmDecoder, PcmEncoder};
pub use rawvideo::{RawVideoDecoder, RawVideoEncoder};
pub use registry::{
    codec_info, codecs, create_decoder, create_encoder, decoder_by_name, encoder_by_name,
    find_decoder, find_encoder, CodecInfo,
};

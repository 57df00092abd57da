//! `h264_mp4toannexb`: length-prefixed H.264 to Annex B start codes.

use super::BitstreamFilter;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use tracing::{debug, trace};
use transcode_core::nal::{self, h264};
use transcode_core::{
    Buffer, CodecId, Error, OpenContext, Result, SideDataType, StreamParams,
};

/// AVC decoder configuration record (`avcC`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvcConfig {
    /// Profile indication.
    pub profile: u8,
    /// Level indication.
    pub level: u8,
    /// Size in bytes of each NAL length prefix (1, 2 or 4).
    pub length_size: usize,
    /// Sequence parameter sets.
    pub sps: Vec<Vec<u8>>,
    /// Picture parameter sets.
    pub pps: Vec<Vec<u8>>,
}

fn truncated(_: std::io::Error) -> Error {
    Error::invalid_config("avcC record is truncated")
}

impl AvcConfig {
    /// Parse an `avcC` record.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(data);
        let version = reader.read_u8().map_err(truncated)?;
        if version != 1 {
            return Err(Error::invalid_config(format!(
                "unexpected avcC version {version}"
            )));
        }
        let profile = reader.read_u8().map_err(truncated)?;
        let _compat = reader.read_u8().map_err(truncated)?;
        let level = reader.read_u8().map_err(truncated)?;
        let length_size = (reader.read_u8().map_err(truncated)? & 0x03) as usize + 1;
        if length_size == 3 {
            return Err(Error::invalid_config("avcC declares 3-byte NAL lengths"));
        }

        let sps_count = (reader.read_u8().map_err(truncated)? & 0x1f) as usize;
        let sps = read_sets(&mut reader, sps_count)?;
        let pps_count = reader.read_u8().map_err(truncated)? as usize;
        let pps = read_sets(&mut reader, pps_count)?;

        debug!(profile, level, length_size, sps = sps.len(), pps = pps.len(), "avcC");
        Ok(Self {
            profile,
            level,
            length_size,
            sps,
            pps,
        })
    }

    /// Parameter sets as one Annex B byte string.
    pub fn annexb_parameter_sets(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for set in self.sps.iter().chain(&self.pps) {
            nal::write_annexb(&mut out, set);
        }
        out
    }
}

fn read_sets(reader: &mut Cursor<&[u8]>, count: usize) -> Result<Vec<Vec<u8>>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_u16::<BigEndian>().map_err(truncated)? as usize;
        let mut set = vec![0u8; len];
        reader.read_exact(&mut set).map_err(truncated)?;
        sets.push(set);
    }
    Ok(sets)
}

/// Converts MP4-style length-prefixed H.264 to Annex B.
///
/// Parameter sets from the `avcC` extradata are inserted before the first
/// IDR slice of every unit that does not carry its own. A stream whose
/// extradata is already Annex B (or absent) passes through untouched.
#[derive(Debug, Default)]
pub struct H264Mp4ToAnnexB {
    config: Option<AvcConfig>,
    parameter_sets: Vec<u8>,
}

impl H264Mp4ToAnnexB {
    fn load(&mut self, extradata: &[u8]) -> Result<()> {
        if extradata.is_empty() || nal::is_annexb(extradata) {
            self.config = None;
            self.parameter_sets.clear();
            return Ok(());
        }
        let config = AvcConfig::parse(extradata)?;
        self.parameter_sets = config.annexb_parameter_sets();
        self.config = Some(config);
        Ok(())
    }

    /// Get the parsed decoder configuration.
    pub fn config(&self) -> Option<&AvcConfig> {
        self.config.as_ref()
    }
}

impl BitstreamFilter for H264Mp4ToAnnexB {
    fn name(&self) -> &'static str {
        "h264_mp4toannexb"
    }

    fn init(&mut self, ctx: &OpenContext<'_>) -> Result<StreamParams> {
        if ctx.stream.codec != Some(CodecId::H264) {
            return Err(Error::invalid_config(format!(
                "h264_mp4toannexb cannot filter {:?}",
                ctx.stream.codec
            )));
        }
        self.load(&ctx.stream.extradata)?;
        let mut params = ctx.stream.clone();
        if self.config.is_some() {
            params.extradata.clear();
        }
        Ok(params)
    }

    fn filter(&mut self, unit: &mut Buffer, _params: &mut StreamParams) -> Result<bool> {
        if let Some(side) = unit.side_data(SideDataType::NewExtradata) {
            let extradata = side.data.clone();
            self.load(&extradata)?;
            unit.remove_side_data(SideDataType::NewExtradata);
        }
        let Some(config) = &self.config else {
            return Ok(true);
        };

        let nals = nal::split_length_prefixed(unit.data(), config.length_size)?;
        let mut out = Vec::with_capacity(unit.size() + nals.len() * 4 + self.parameter_sets.len());
        let mut have_sps = false;
        let mut inserted = false;
        for payload in nals {
            match nal::nal_type(CodecId::H264, payload) {
                Some(h264::SPS) => have_sps = true,
                Some(h264::IDR) if !have_sps && !inserted => {
                    out.extend_from_slice(&self.parameter_sets);
                    inserted = true;
                }
                _ => {}
            }
            nal::write_annexb(&mut out, payload);
        }
        trace!(in_size = unit.size(), out_size = out.len(), inserted, "converted");
        unit.set_data(out);
        Ok(true)
    }
}

//! Filters moving parameter sets between extradata and the stream.

use super::BitstreamFilter;
use tracing::debug;
use transcode_core::nal::{self, AnnexBUnits};
use transcode_core::{
    Buffer, CodecId, Error, OpenContext, OptionSchema, Result, SideData, SideDataType,
    StreamParams,
};

fn nal_codec(filter: &str, stream: &StreamParams) -> Result<CodecId> {
    match stream.codec {
        Some(codec @ (CodecId::H264 | CodecId::Hevc)) => Ok(codec),
        other => Err(Error::unsupported(format!(
            "{filter} does not handle {other:?}"
        ))),
    }
}

/// Rebuild an Annex B unit keeping only the NALs `keep` accepts.
fn retain_nals(data: &[u8], mut keep: impl FnMut(&[u8]) -> bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for payload in AnnexBUnits::new(data) {
        if keep(payload) {
            nal::write_annexb(&mut out, payload);
        }
    }
    out
}

/// Collects in-band parameter sets into the output extradata.
#[derive(Debug, Default)]
pub struct ExtractExtradata {
    codec: Option<CodecId>,
    remove: bool,
}

impl BitstreamFilter for ExtractExtradata {
    fn name(&self) -> &'static str {
        "extract_extradata"
    }

    fn option_schema(&self) -> OptionSchema {
        OptionSchema::new().flag("remove", false, "strip parameter sets from the units")
    }

    fn init(&mut self, ctx: &OpenContext<'_>) -> Result<StreamParams> {
        self.codec = Some(nal_codec(self.name(), ctx.stream)?);
        self.remove = ctx.options.flag("remove")?;
        Ok(ctx.stream.clone())
    }

    fn filter(&mut self, unit: &mut Buffer, params: &mut StreamParams) -> Result<bool> {
        let Some(codec) = self.codec else {
            return Err(Error::invalid_state("filter is not open"));
        };
        if !nal::is_annexb(unit.data()) {
            return Ok(true);
        }
        let mut sets = Vec::new();
        for payload in AnnexBUnits::new(unit.data()) {
            if nal::nal_type(codec, payload).is_some_and(|t| nal::is_parameter_set(codec, t)) {
                nal::write_annexb(&mut sets, payload);
            }
        }
        if sets.is_empty() {
            return Ok(true);
        }
        if params.extradata != sets {
            debug!(codec = %codec, size = sets.len(), "extradata extracted");
            unit.add_side_data(SideData::new(SideDataType::NewExtradata, sets.clone()));
            params.extradata = sets;
        }
        if self.remove {
            let stripped = retain_nals(unit.data(), |payload| {
                !nal::nal_type(codec, payload).is_some_and(|t| nal::is_parameter_set(codec, t))
            });
            unit.set_data(stripped);
        }
        Ok(true)
    }
}

/// When [`DumpExtra`] prepends extradata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum DumpFreq {
    #[default]
    Keyframe,
    All,
}

/// Prepends the stream extradata to units.
#[derive(Debug, Default)]
pub struct DumpExtra {
    extradata: Vec<u8>,
    freq: DumpFreq,
}

impl BitstreamFilter for DumpExtra {
    fn name(&self) -> &'static str {
        "dump_extra"
    }

    fn option_schema(&self) -> OptionSchema {
        OptionSchema::new().choice(
            "freq",
            "keyframe",
            &["keyframe", "all"],
            "which units receive the extradata",
        )
    }

    fn init(&mut self, ctx: &OpenContext<'_>) -> Result<StreamParams> {
        self.extradata = ctx.stream.extradata.clone();
        self.freq = match ctx.options.string("freq")?.as_str() {
            "all" => DumpFreq::All,
            _ => DumpFreq::Keyframe,
        };
        Ok(ctx.stream.clone())
    }

    fn filter(&mut self, unit: &mut Buffer, _params: &mut StreamParams) -> Result<bool> {
        if self.extradata.is_empty() {
            return Ok(true);
        }
        let wanted = self.freq == DumpFreq::All || unit.is_keyframe();
        if wanted && !unit.data().starts_with(&self.extradata) {
            let mut data = Vec::with_capacity(self.extradata.len() + unit.size());
            data.extend_from_slice(&self.extradata);
            data.extend_from_slice(unit.data());
            unit.set_data(data);
        }
        Ok(true)
    }
}

/// Which units [`RemoveExtra`] strips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum RemoveFreq {
    #[default]
    NonKeyframe,
    Keyframe,
    All,
}

/// Strips in-band parameter sets.
#[derive(Debug, Default)]
pub struct RemoveExtra {
    codec: Option<CodecId>,
    freq: RemoveFreq,
}

impl BitstreamFilter for RemoveExtra {
    fn name(&self) -> &'static str {
        "remove_extra"
    }

    fn option_schema(&self) -> OptionSchema {
        OptionSchema::new().choice(
            "freq",
            "nonkeyframe",
            &["nonkeyframe", "keyframe", "all"],
            "which units lose their parameter sets",
        )
    }

    fn init(&mut self, ctx: &OpenContext<'_>) -> Result<StreamParams> {
        self.codec = Some(nal_codec(self.name(), ctx.stream)?);
        self.freq = match ctx.options.string("freq")?.as_str() {
            "keyframe" => RemoveFreq::Keyframe,
            "all" => RemoveFreq::All,
            _ => RemoveFreq::NonKeyframe,
        };
        Ok(ctx.stream.clone())
    }

    fn filter(&mut self, unit: &mut Buffer, _params: &mut StreamParams) -> Result<bool> {
        let Some(codec) = self.codec else {
            return Err(Error::invalid_state("filter is not open"));
        };
        let applies = match self.freq {
            RemoveFreq::All => true,
            RemoveFreq::Keyframe => unit.is_keyframe(),
            RemoveFreq::NonKeyframe => !unit.is_keyframe(),
        };
        if applies && nal::is_annexb(unit.data()) {
            let stripped = retain_nals(unit.data(), |payload| {
                !nal::nal_type(codec, payload).is_some_and(|t| nal::is_parameter_set(codec, t))
            });
            unit.set_data(stripped);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsf::BsfProcessor;
    use transcode_core::{RetrieveStatus, Session, Stage, StageParams, TimeBase};

    fn annexb(nals: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for n in nals {
            nal::write_annexb(&mut out, n);
        }
        out
    }

    const SPS: &[u8] = &[0x67, 0x42];
    const PPS: &[u8] = &[0x68, 0xce];
    const IDR: &[u8] = &[0x65, 0x88];
    const SLICE: &[u8] = &[0x41, 0x01];

    fn run<F: BitstreamFilter>(
        filter: F,
        stream: StreamParams,
        params: StageParams,
        mut unit: Buffer,
    ) -> (Buffer, StreamParams) {
        let mut stage = Session::new(BsfProcessor::new(filter));
        stage
            .configure(StageParams { stream, ..params })
            .unwrap();
        stage.open().unwrap();
        stage.submit(Some(&mut unit)).unwrap();
        let mut out = Buffer::new();
        assert_eq!(stage.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        let params = stage.output_params().cloned().unwrap();
        (out, params)
    }

    fn h264() -> StreamParams {
        StreamParams::compressed(CodecId::H264, TimeBase::MPEG)
    }

    #[test]
    fn test_extract_sets_extradata() {
        let unit = Buffer::from_packet(annexb(&[SPS, PPS, IDR]), CodecId::H264);
        let (out, params) = run(ExtractExtradata::default(), h264(), StageParams::default(), unit);
        assert_eq!(params.extradata, annexb(&[SPS, PPS]));
        assert_eq!(out.data(), annexb(&[SPS, PPS, IDR]).as_slice());
        assert!(out.side_data(SideDataType::NewExtradata).is_some());
    }

    #[test]
    fn test_extract_remove() {
        let unit = Buffer::from_packet(annexb(&[SPS, PPS, IDR]), CodecId::H264);
        let (out, _) = run(
            ExtractExtradata::default(),
            h264(),
            StageParams::default().with_option("remove", 1),
            unit,
        );
        assert_eq!(out.data(), annexb(&[IDR]).as_slice());
    }

    #[test]
    fn test_dump_extra_keyframes_only() {
        let stream = h264().with_extradata(annexb(&[SPS, PPS]));
        let mut key = Buffer::from_packet(annexb(&[IDR]), CodecId::H264);
        key.set_keyframe(true);
        let (out, _) = run(DumpExtra::default(), stream.clone(), StageParams::default(), key);
        assert_eq!(out.data(), annexb(&[SPS, PPS, IDR]).as_slice());

        let delta = Buffer::from_packet(annexb(&[SLICE]), CodecId::H264);
        let (out, _) = run(DumpExtra::default(), stream, StageParams::default(), delta);
        assert_eq!(out.data(), annexb(&[SLICE]).as_slice());
    }

    #[test]
    fn test_remove_extra_all() {
        let mut unit = Buffer::from_packet(annexb(&[SPS, PPS, IDR]), CodecId::H264);
        unit.set_keyframe(true);
        let (out, _) = run(
            RemoveExtra::default(),
            h264(),
            StageParams::default().with_option("freq", "all"),
            unit,
        );
        assert_eq!(out.data(), annexb(&[IDR]).as_slice());
    }

    #[test]
    fn test_remove_extra_keeps_keyframes_by_default() {
        let mut unit = Buffer::from_packet(annexb(&[SPS, PPS, IDR]), CodecId::H264);
        unit.set_keyframe(true);
        let (out, _) = run(RemoveExtra::default(), h264(), StageParams::default(), unit);
        assert_eq!(out.data(), annexb(&[SPS, PPS, IDR]).as_slice());
    }

    #[test]
    fn test_extract_rejects_other_codecs() {
        let mut stage = Session::new(BsfProcessor::new(ExtractExtradata::default()));
        stage
            .configure(StageParams::new(StreamParams::compressed(
                CodecId::Aac,
                TimeBase::MPEG,
            )))
            .unwrap();
        assert!(matches!(stage.open(), Err(Error::Unsupported(_))));
    }
}

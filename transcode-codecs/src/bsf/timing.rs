//! `setts`: timestamp offset and time base change.

use super::BitstreamFilter;
use tracing::debug;
use transcode_core::{
    Buffer, OpenContext, OptionSchema, Result, StreamParams, TimeBase, Timestamp,
};

/// Shifts timestamps and optionally moves them to another time base.
///
/// `offset` is applied in the input time base before rescaling.
#[derive(Debug, Default)]
pub struct Setts {
    offset: i64,
    time_base: TimeBase,
}

impl BitstreamFilter for Setts {
    fn name(&self) -> &'static str {
        "setts"
    }

    fn option_schema(&self) -> OptionSchema {
        OptionSchema::new()
            .int("offset", 0, i64::MIN / 2, i64::MAX / 2, "ticks added to pts and dts")
            .rational("time_base", None, "output time base")
    }

    fn init(&mut self, ctx: &OpenContext<'_>) -> Result<StreamParams> {
        self.offset = ctx.options.int("offset")?;
        self.time_base = if ctx.options.is_set("time_base") {
            TimeBase(ctx.options.rational("time_base")?)
        } else {
            ctx.stream.time_base
        };
        debug!(offset = self.offset, time_base = %self.time_base, "setts");
        Ok(StreamParams {
            time_base: self.time_base,
            ..ctx.stream.clone()
        })
    }

    fn filter(&mut self, unit: &mut Buffer, _params: &mut StreamParams) -> Result<bool> {
        if unit.pts != Timestamp::NONE {
            unit.pts += self.offset;
        }
        if unit.dts != Timestamp::NONE {
            unit.dts += self.offset;
        }
        unit.rescale_ts(self.time_base);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsf::BsfProcessor;
    use transcode_core::{CodecId, Error, RetrieveStatus, Session, Stage, StageParams};

    fn stage(params: StageParams) -> Session<BsfProcessor<Setts>> {
        let mut stage = Session::new(BsfProcessor::new(Setts::default()));
        let stream = StreamParams::compressed(CodecId::H264, TimeBase::MPEG);
        stage
            .configure(StageParams { stream, ..params })
            .unwrap();
        stage
    }

    #[test]
    fn test_offset_and_rescale() {
        let mut stage = stage(
            StageParams::default()
                .with_option("offset", 9000)
                .with_option("time_base", "1/1000"),
        );
        stage.open().unwrap();
        assert!(stage.output_params().is_none());

        let mut unit = Buffer::from_packet(vec![1], CodecId::H264);
        unit.time_base = TimeBase::MPEG;
        unit.pts = 90000;
        unit.dts = Timestamp::NONE;
        stage.submit(Some(&mut unit)).unwrap();
        let mut out = Buffer::new();
        assert_eq!(stage.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.pts, 1100);
        assert_eq!(out.dts, Timestamp::NONE);
        assert_eq!(out.time_base, TimeBase::MILLISECONDS);
        assert_eq!(
            stage.output_params().unwrap().time_base,
            TimeBase::MILLISECONDS
        );
    }

    #[test]
    fn test_bad_time_base() {
        let mut stage = stage(StageParams::default().with_option("time_base", "x"));
        assert!(matches!(stage.open(), Err(Error::InvalidOption { .. })));
    }
}

//! `null` and `chomp`.

use super::BitstreamFilter;
use transcode_core::{Buffer, OpenContext, Result, StreamParams};

/// Passes units through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFilter;

impl BitstreamFilter for NullFilter {
    fn name(&self) -> &'static str {
        "null"
    }

    fn init(&mut self, ctx: &OpenContext<'_>) -> Result<StreamParams> {
        Ok(ctx.stream.clone())
    }

    fn filter(&mut self, _unit: &mut Buffer, _params: &mut StreamParams) -> Result<bool> {
        Ok(true)
    }
}

/// Removes trailing zero padding.
#[derive(Debug, Default, Clone, Copy)]
pub struct Chomp;

impl BitstreamFilter for Chomp {
    fn name(&self) -> &'static str {
        "chomp"
    }

    fn init(&mut self, ctx: &OpenContext<'_>) -> Result<StreamParams> {
        Ok(ctx.stream.clone())
    }

    fn filter(&mut self, unit: &mut Buffer, _params: &mut StreamParams) -> Result<bool> {
        let data = unit.data();
        let len = data.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        if len < data.len() {
            unit.make_writable()?;
            unit.truncate(len)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsf::BsfProcessor;
    use transcode_core::{CodecId, Session, Stage, StageParams, TimeBase};

    #[test]
    fn test_chomp_leaves_shared_storage_alone() {
        let mut stage = Session::new(BsfProcessor::new(Chomp));
        stage
            .configure(StageParams::new(StreamParams::compressed(
                CodecId::Aac,
                TimeBase::MPEG,
            )))
            .unwrap();
        stage.open().unwrap();

        let original = Buffer::from_packet(vec![5, 0, 6, 0, 0], CodecId::Aac);
        let mut unit = original.share().unwrap();
        stage.submit(Some(&mut unit)).unwrap();
        let mut out = Buffer::new();
        stage.retrieve(&mut out).unwrap();
        assert_eq!(out.data(), &[5, 0, 6]);
        assert_eq!(original.data(), &[5, 0, 6, 0, 0]);
    }
}

//! `volume`: scales every sample by a constant gain.

use super::UnitSlot;
use crate::node::{FilterNode, NodeContext};
use crate::pad::{LinkFormat, PadDescriptor};
use tracing::debug;
use transcode_core::{AudioFormat, Buffer, Error, OptionSchema, Options, Result, RetrieveStatus};
use transcode_resample::convert::{read_channels, write_channels};

/// Multiplies samples by `volume`. Integer formats saturate.
#[derive(Debug)]
pub struct Volume {
    gain: f64,
    inputs: Vec<PadDescriptor>,
    outputs: Vec<PadDescriptor>,
    format: Option<AudioFormat>,
    slot: UnitSlot,
}

impl Volume {
    /// Create a gain stage.
    pub fn new(gain: f64) -> Self {
        Self {
            gain,
            inputs: vec![PadDescriptor::audio("default")],
            outputs: vec![PadDescriptor::audio("default")],
            format: None,
            slot: UnitSlot::default(),
        }
    }

    pub(crate) fn schema() -> OptionSchema {
        OptionSchema::new().float("volume", 1.0, 0.0, 100.0, "linear gain")
    }

    pub(crate) fn from_options(options: &Options) -> Result<Self> {
        Ok(Self::new(options.float("volume")?))
    }

    /// Get the gain.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    fn apply(&self, unit: Buffer) -> Result<Buffer> {
        if self.gain == 1.0 {
            return Ok(unit);
        }
        let format = self
            .format
            .ok_or_else(|| Error::invalid_state("volume is not initialised"))?;
        let mut channels = read_channels(&unit, format)?;
        for sample in channels.iter_mut().flatten() {
            *sample *= self.gain;
        }
        let mut scaled = Buffer::new();
        write_channels(&channels, format, &mut scaled)?;
        scaled.copy_props_from(&unit);
        Ok(scaled)
    }
}

impl FilterNode for Volume {
    fn kind(&self) -> &'static str {
        "volume"
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &self.outputs
    }

    fn init(&mut self, inputs: &[LinkFormat], ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        let link = inputs
            .first()
            .ok_or_else(|| Error::invalid_state("volume initialised without input"))?;
        self.format = Some(
            link.audio()
                .ok_or_else(|| Error::invalid_config("volume needs audio"))?,
        );
        debug!(parent: ctx.logger.span(), gain = self.gain, "volume ready");
        Ok(vec![link.clone()])
    }

    fn has_capacity(&self, _pad: usize) -> bool {
        self.slot.has_room()
    }

    fn push(&mut self, _pad: usize, input: Option<Buffer>) -> Result<()> {
        match input {
            Some(unit) => {
                let scaled = self.apply(unit)?;
                self.slot.put(scaled)
            }
            None => {
                self.slot.finish();
                Ok(())
            }
        }
    }

    fn pull(&mut self, _pad: usize, output: &mut Buffer) -> Result<RetrieveStatus> {
        Ok(self.slot.take(output))
    }

    fn reset(&mut self) {
        self.slot.clear();
    }

    fn uninit(&mut self) {
        self.slot.clear();
        self.format = None;
    }
}

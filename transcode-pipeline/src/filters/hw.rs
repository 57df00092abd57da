//! `hwupload` and `hwdownload`: move pictures between host and device memory.

use super::UnitSlot;
use crate::node::{FilterNode, NodeContext};
use crate::pad::{FormatConstraint, LinkFormat, MemoryKind, PadDescriptor, VideoConstraint};
use std::sync::Arc;
use tracing::debug;
use transcode_core::{
    transfer_data, Buffer, Error, OptionSchema, Options, Result, RetrieveStatus, SurfacePool,
};

/// Copies host pictures into surfaces of the graph's device.
///
/// Input is refused while every pool surface is held downstream.
#[derive(Debug)]
pub struct HwUpload {
    pool_size: usize,
    inputs: Vec<PadDescriptor>,
    outputs: Vec<PadDescriptor>,
    pool: Option<Arc<dyn SurfacePool>>,
    slot: UnitSlot,
}

impl HwUpload {
    /// Create an uploader with a pool of `pool_size` surfaces.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            inputs: vec![PadDescriptor::video("default")],
            outputs: vec![PadDescriptor::video("default")],
            pool: None,
            slot: UnitSlot::default(),
        }
    }

    pub(crate) fn schema() -> OptionSchema {
        OptionSchema::new().int("pool_size", 8, 1, 256, "device surfaces to allocate")
    }

    pub(crate) fn from_options(options: &Options) -> Result<Self> {
        Ok(Self::new(options.usize("pool_size")?))
    }
}

impl FilterNode for HwUpload {
    fn kind(&self) -> &'static str {
        "hwupload"
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &self.outputs
    }

    fn input_constraint(&self, _pad: usize, _negotiated: &[Option<LinkFormat>]) -> FormatConstraint {
        FormatConstraint::host_video(Vec::new())
    }

    fn init(&mut self, inputs: &[LinkFormat], ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        let device = ctx
            .device
            .ok_or_else(|| Error::invalid_config("hwupload needs a device; see Graph::set_device"))?;
        let link = inputs
            .first()
            .ok_or_else(|| Error::invalid_state("hwupload initialised without input"))?;
        let format = link
            .video()
            .ok_or_else(|| Error::invalid_config("hwupload needs pictures"))?;
        let pool = device.create_surface_pool(format, self.pool_size)?;
        debug!(parent: ctx.logger.span(), device = device.name(), %format, surfaces = self.pool_size, "surface pool ready");
        self.pool = Some(pool);
        Ok(vec![link.with_memory(MemoryKind::Device)])
    }

    fn has_capacity(&self, _pad: usize) -> bool {
        self.slot.has_room() && self.pool.as_ref().is_some_and(|p| p.available() > 0)
    }

    fn push(&mut self, _pad: usize, input: Option<Buffer>) -> Result<()> {
        let Some(unit) = input else {
            self.slot.finish();
            return Ok(());
        };
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| Error::invalid_state("hwupload is not initialised"))?;
        let mut surface = Buffer::new();
        surface.allocate_surface(pool)?;
        transfer_data(&mut surface, &unit)?;
        self.slot.put(surface)
    }

    fn pull(&mut self, _pad: usize, output: &mut Buffer) -> Result<RetrieveStatus> {
        Ok(self.slot.take(output))
    }

    fn reset(&mut self) {
        self.slot.clear();
    }

    fn uninit(&mut self) {
        self.slot.clear();
        self.pool = None;
    }
}

/// Copies device surfaces back into host pictures.
#[derive(Debug)]
pub struct HwDownload {
    inputs: Vec<PadDescriptor>,
    outputs: Vec<PadDescriptor>,
    slot: UnitSlot,
}

impl HwDownload {
    /// Create a downloader.
    pub fn new() -> Self {
        Self {
            inputs: vec![PadDescriptor::video("default")],
            outputs: vec![PadDescriptor::video("default")],
            slot: UnitSlot::default(),
        }
    }
}

impl Default for HwDownload {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterNode for HwDownload {
    fn kind(&self) -> &'static str {
        "hwdownload"
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &self.outputs
    }

    fn input_constraint(&self, _pad: usize, _negotiated: &[Option<LinkFormat>]) -> FormatConstraint {
        FormatConstraint::Video(VideoConstraint::new().with_memory(MemoryKind::Device))
    }

    fn init(&mut self, inputs: &[LinkFormat], _ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        let link = inputs
            .first()
            .ok_or_else(|| Error::invalid_state("hwdownload initialised without input"))?;
        Ok(vec![link.with_memory(MemoryKind::Host)])
    }

    fn has_capacity(&self, _pad: usize) -> bool {
        self.slot.has_room()
    }

    fn push(&mut self, _pad: usize, input: Option<Buffer>) -> Result<()> {
        let Some(surface) = input else {
            self.slot.finish();
            return Ok(());
        };
        let mut picture = Buffer::new();
        transfer_data(&mut picture, &surface)?;
        self.slot.put(picture)
    }

    fn pull(&mut self, _pad: usize, output: &mut Buffer) -> Result<RetrieveStatus> {
        Ok(self.slot.take(output))
    }

    fn reset(&mut self) {
        self.slot.clear();
    }
}

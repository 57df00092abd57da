//! Uncompressed picture codec.
//!
//! A `rawvideo` packet is a picture with every plane tightly packed (no row
//! padding), planes in order. Decoding copies the rows into aligned frame
//! storage; encoding packs them back.
//!
//! The decoder follows mid-stream dimension changes announced with a
//! [`SideDataType::ParamChange`] record on the first packet of the new size.

use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};
use transcode_core::buffer::{alloc_zeroed, MediaFormat};
use transcode_core::{
    transfer_data, Buffer, BufferPool, CodecId, DeviceRef, Error, Logger, OpenContext,
    OptionSchema, Processor, Rational, Result, SideData, SideDataType, StreamParams, SurfacePool,
    TimeBase, VideoFormat,
};

/// Largest `queue_size` accepted by the codecs in this crate.
pub const MAX_QUEUE_SIZE: i64 = 64;

pub(crate) fn queue_schema() -> OptionSchema {
    OptionSchema::new().int(
        "queue_size",
        4,
        1,
        MAX_QUEUE_SIZE,
        "units held before submit reports Busy",
    )
}

/// Copy tightly packed rows into a strided plane.
fn unpack_plane(dst: &mut [u8], stride: usize, src: &[u8], row_bytes: usize) {
    dst.par_chunks_mut(stride)
        .zip(src.par_chunks(row_bytes))
        .for_each(|(d, s)| d[..row_bytes].copy_from_slice(s));
}

/// Copy a strided plane into tightly packed rows.
fn pack_plane(dst: &mut [u8], src: &[u8], stride: usize, row_bytes: usize) {
    dst.par_chunks_mut(row_bytes)
        .zip(src.par_chunks(stride))
        .for_each(|(d, s)| d.copy_from_slice(&s[..row_bytes]));
}

/// Decoder turning packed pictures into frames.
pub struct RawVideoDecoder {
    format: Option<VideoFormat>,
    time_base: TimeBase,
    frame_rate: Option<Rational>,
    queue: VecDeque<Buffer>,
    queue_size: usize,
    pool: Option<BufferPool>,
    surfaces: Option<Arc<dyn SurfacePool>>,
    surface_count: usize,
    device: Option<DeviceRef>,
    logger: Logger,
}

impl RawVideoDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self {
            format: None,
            time_base: TimeBase::default(),
            frame_rate: None,
            queue: VecDeque::new(),
            queue_size: 4,
            pool: None,
            surfaces: None,
            surface_count: 0,
            device: None,
            logger: Logger::disabled(),
        }
    }

    /// Get the current picture format.
    pub fn format(&self) -> Option<VideoFormat> {
        self.format
    }

    fn set_format(&mut self, format: VideoFormat) -> Result<()> {
        format.validate()?;
        self.pool = Some(BufferPool::video(format, self.queue_size + 2)?);
        self.surfaces = match &self.device {
            Some(device) if self.surface_count > 0 => {
                Some(device.create_surface_pool(format, self.surface_count)?)
            }
            _ => None,
        };
        self.format = Some(format);
        Ok(())
    }

    fn renegotiate(&mut self, packet: &Buffer) -> Result<()> {
        let Some(change) = packet.side_data(SideDataType::ParamChange) else {
            return Ok(());
        };
        let (width, height) = change
            .as_dimensions_change()
            .ok_or_else(|| Error::corrupt("malformed parameter change record"))?;
        let current = self
            .format
            .ok_or_else(|| Error::invalid_state("decoder is not open"))?;
        if (current.width, current.height) != (width, height) {
            let next = VideoFormat::new(width, height, current.pixel_format);
            debug!(parent: self.logger.span(), from = %current, to = %next, "picture size changed");
            self.set_format(next)?;
        }
        Ok(())
    }
}

impl Default for RawVideoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for RawVideoDecoder {
    fn name(&self) -> &'static str {
        "rawvideo"
    }

    fn option_schema(&self) -> OptionSchema {
        queue_schema().int(
            "hw_pool_size",
            0,
            0,
            MAX_QUEUE_SIZE,
            "device surfaces for output when a device is configured (0: host frames)",
        )
    }

    fn open(&mut self, ctx: &OpenContext<'_>) -> Result<()> {
        if ctx.stream.codec != Some(CodecId::RawVideo) {
            return Err(Error::invalid_config(format!(
                "rawvideo decoder cannot read {:?}",
                ctx.stream.codec
            )));
        }
        let format = ctx.stream.video.ok_or_else(|| {
            Error::invalid_config("rawvideo needs the picture size and pixel format")
        })?;
        self.queue_size = ctx.options.usize("queue_size")?;
        self.surface_count = ctx.options.usize("hw_pool_size")?;
        self.device = ctx.device.cloned();
        if self.surface_count > 0 && self.device.is_none() {
            warn!(parent: ctx.logger.span(), "hw_pool_size set without a device, producing host frames");
        }
        self.time_base = ctx.stream.time_base;
        self.frame_rate = ctx.stream.frame_rate;
        self.logger = ctx.logger.clone();
        self.set_format(format)
    }

    fn has_capacity(&self) -> bool {
        if self.queue.len() >= self.queue_size {
            return false;
        }
        // surfaces still held by queued frames come back once they are pulled
        match &self.surfaces {
            Some(pool) if !self.queue.is_empty() => pool.available() > 0,
            _ => true,
        }
    }

    fn push(&mut self, input: Buffer) -> Result<()> {
        self.renegotiate(&input)?;
        let (format, pool) = match (self.format, &self.pool) {
            (Some(f), Some(p)) => (f, p),
            _ => return Err(Error::invalid_state("decoder is not open")),
        };
        let expected = format.packed_size();
        if input.size() != expected {
            return Err(Error::corrupt(format!(
                "rawvideo packet of {} bytes, {format} needs {expected}",
                input.size()
            )));
        }

        let mut frame = pool.acquire()?;
        let data = input.data();
        let mut offset = 0;
        for (p, plane) in frame.planes_mut()?.iter_mut().enumerate() {
            let row_bytes = format.row_bytes(p);
            let len = row_bytes * format.rows(p);
            let stride = plane.stride();
            unpack_plane(plane.data_mut(), stride, &data[offset..offset + len], row_bytes);
            offset += len;
        }
        frame.copy_props_from(&input);
        frame.remove_side_data(SideDataType::ParamChange);
        frame.set_keyframe(true);

        if let Some(surfaces) = &self.surfaces {
            let mut hw = Buffer::new();
            hw.allocate_surface(surfaces)?;
            transfer_data(&mut hw, &frame)?;
            frame = hw;
        }
        self.queue.push_back(frame);
        Ok(())
    }

    fn pull(&mut self, output: &mut Buffer) -> Result<bool> {
        match self.queue.pop_front() {
            Some(mut frame) => {
                output.move_ref(&mut frame);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn output_params(&self) -> Option<StreamParams> {
        let format = self.format?;
        let mut params = StreamParams::video(format, self.time_base);
        params.frame_rate = self.frame_rate;
        Some(params)
    }

    fn reset(&mut self) {
        self.queue.clear();
    }

    fn close(&mut self) {
        self.queue.clear();
        self.pool = None;
        self.surfaces = None;
    }
}

/// Encoder packing frames into packed pictures.
pub struct RawVideoEncoder {
    format: Option<VideoFormat>,
    time_base: TimeBase,
    frame_rate: Option<Rational>,
    queue: VecDeque<Buffer>,
    queue_size: usize,
}

impl RawVideoEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self {
            format: None,
            time_base: TimeBase::default(),
            frame_rate: None,
            queue: VecDeque::new(),
            queue_size: 4,
        }
    }
}

impl Default for RawVideoEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for RawVideoEncoder {
    fn name(&self) -> &'static str {
        "rawvideo"
    }

    fn option_schema(&self) -> OptionSchema {
        queue_schema()
    }

    fn open(&mut self, ctx: &OpenContext<'_>) -> Result<()> {
        let format = match ctx.stream.media_format() {
            MediaFormat::Video(v) => v,
            other => {
                return Err(Error::invalid_config(format!(
                    "rawvideo encoder needs decoded pictures, got '{other}'"
                )))
            }
        };
        format.validate()?;
        self.format = Some(format);
        self.time_base = ctx.stream.time_base;
        self.frame_rate = ctx.stream.frame_rate;
        self.queue_size = ctx.options.usize("queue_size")?;
        Ok(())
    }

    fn has_capacity(&self) -> bool {
        self.queue.len() < self.queue_size
    }

    fn push(&mut self, input: Buffer) -> Result<()> {
        let input = if input.is_hardware() {
            let mut host = Buffer::new();
            transfer_data(&mut host, &input)?;
            host
        } else {
            input
        };
        let format = input
            .video_format()
            .ok_or_else(|| Error::invalid_state("rawvideo encoder received a non-picture buffer"))?;
        let changed = self.format != Some(format);
        if changed {
            format.validate()?;
            self.format = Some(format);
        }

        let mut data = alloc_zeroed(format.packed_size())?;
        let mut offset = 0;
        for (p, plane) in input.planes().iter().enumerate() {
            let row_bytes = format.row_bytes(p);
            let len = row_bytes * format.rows(p);
            pack_plane(&mut data[offset..offset + len], plane.data(), plane.stride(), row_bytes);
            offset += len;
        }

        let mut packet = Buffer::from_packet(data, CodecId::RawVideo);
        packet.copy_props_from(&input);
        packet.dts = packet.pts;
        packet.set_keyframe(true);
        if changed {
            packet.add_side_data(SideData::dimensions_change(format.width, format.height));
        }
        self.queue.push_back(packet);
        Ok(())
    }

    fn pull(&mut self, output: &mut Buffer) -> Result<bool> {
        match self.queue.pop_front() {
            Some(mut packet) => {
                output.move_ref(&mut packet);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn output_params(&self) -> Option<StreamParams> {
        let format = self.format?;
        let mut params = StreamParams::compressed(CodecId::RawVideo, self.time_base).with_video(format);
        params.frame_rate = self.frame_rate;
        Some(params)
    }

    fn reset(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcode_core::{PixelFormat, RetrieveStatus, Session, Stage, StageParams, SubmitStatus};

    fn stream(format: VideoFormat) -> StreamParams {
        StreamParams::compressed(CodecId::RawVideo, TimeBase::MILLISECONDS).with_video(format)
    }

    fn packet(format: VideoFormat, fill: u8) -> Buffer {
        let mut p = Buffer::from_packet(vec![fill; format.packed_size()], CodecId::RawVideo);
        p.time_base = TimeBase::MILLISECONDS;
        p
    }

    fn decoder(format: VideoFormat, queue: usize) -> Session<RawVideoDecoder> {
        let mut stage = Session::new(RawVideoDecoder::new());
        stage
            .configure(StageParams::new(stream(format)).with_option("queue_size", queue))
            .unwrap();
        stage.open().unwrap();
        stage
    }

    #[test]
    fn test_decode_pads_rows() {
        let format = VideoFormat::new(6, 4, PixelFormat::Yuv420p);
        let mut stage = decoder(format, 2);
        let mut input = packet(format, 9);
        input.pts = 40;
        assert_eq!(stage.submit(Some(&mut input)).unwrap(), SubmitStatus::Accepted);

        let mut frame = Buffer::new();
        assert_eq!(stage.retrieve(&mut frame).unwrap(), RetrieveStatus::Produced);
        assert_eq!(frame.video_format(), Some(format));
        assert_eq!(frame.pts, 40);
        assert_eq!(frame.stride(0), 32);
        assert_eq!(&frame.plane(0).unwrap()[..6], &[9; 6]);
        assert_eq!(frame.plane(0).unwrap()[6], 0);
        assert_eq!(frame.plane(1).unwrap().len(), 32 * 2);
    }

    #[test]
    fn test_wrong_size_is_corrupt() {
        let format = VideoFormat::new(4, 4, PixelFormat::Gray8);
        let mut stage = decoder(format, 2);
        let mut input = Buffer::from_packet(vec![0; 15], CodecId::RawVideo);
        let err = stage.submit(Some(&mut input)).unwrap_err();
        assert!(err.is_recoverable());
        // the stage keeps working after a corrupt unit
        let mut good = packet(format, 1);
        assert_eq!(stage.submit(Some(&mut good)).unwrap(), SubmitStatus::Accepted);
    }

    #[test]
    fn test_queue_size_limits_buffering() {
        let format = VideoFormat::new(2, 2, PixelFormat::Gray8);
        let mut stage = decoder(format, 1);
        stage.submit(Some(&mut packet(format, 1))).unwrap();
        let mut second = packet(format, 2);
        assert_eq!(stage.submit(Some(&mut second)).unwrap(), SubmitStatus::Busy);
        assert!(second.has_storage());
    }

    #[test]
    fn test_param_change_renegotiates() {
        let small = VideoFormat::new(2, 2, PixelFormat::Gray8);
        let large = VideoFormat::new(4, 2, PixelFormat::Gray8);
        let mut stage = decoder(small, 2);
        let mut frame = Buffer::new();

        stage.submit(Some(&mut packet(small, 1))).unwrap();
        stage.retrieve(&mut frame).unwrap();
        assert_eq!(stage.output_params().unwrap().video, Some(small));

        let mut changed = packet(large, 2);
        changed.add_side_data(SideData::dimensions_change(4, 2));
        stage.submit(Some(&mut changed)).unwrap();
        stage.retrieve(&mut frame).unwrap();
        assert_eq!(frame.video_format(), Some(large));
        assert_eq!(stage.output_params().unwrap().video, Some(large));
    }

    #[test]
    fn test_encode_packs_rows() {
        let format = VideoFormat::new(6, 4, PixelFormat::Yuv420p);
        let mut encoder = Session::new(RawVideoEncoder::new());
        encoder
            .configure(StageParams::new(StreamParams::video(format, TimeBase::MILLISECONDS)))
            .unwrap();
        encoder.open().unwrap();

        let mut frame = Buffer::new();
        frame.allocate(format).unwrap();
        for plane in frame.planes_mut().unwrap() {
            plane.data_mut().fill(7);
        }
        frame.pts = 3;
        encoder.submit(Some(&mut frame)).unwrap();
        let mut out = Buffer::new();
        assert_eq!(encoder.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.size(), format.packed_size());
        assert!(out.data().iter().all(|&b| b == 7));
        assert!(out.is_keyframe());
        assert_eq!(out.pts, 3);
        assert_eq!(out.codec(), Some(CodecId::RawVideo));
    }
}

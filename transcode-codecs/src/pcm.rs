//! PCM codecs.
//!
//! A PCM packet is interleaved samples in the codec's byte order. Decoded
//! frames carry the matching packed [`SampleFormat`] in little-endian order,
//! so decoding is a byte-order fix-up and encoding additionally interleaves
//! planar input and re-chunks it to `frame_size` samples per packet.

use crate::rawvideo::queue_schema;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::VecDeque;
use tracing::trace;
use transcode_core::buffer::{alloc_zeroed, MediaFormat};
use transcode_core::{
    AudioFormat, Buffer, CodecId, Error, OpenContext, OptionSchema, Plane, Processor, Result,
    SampleFormat, StreamParams, TimeBase, Timestamp,
};

/// Swap 16-bit words between big- and little-endian.
fn swap_s16(src: &[u8], dst: &mut [u8], to_big: bool) {
    for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(2)) {
        if to_big {
            BigEndian::write_i16(d, LittleEndian::read_i16(s));
        } else {
            LittleEndian::write_i16(d, BigEndian::read_i16(s));
        }
    }
}

fn pcm_format(codec: CodecId) -> Result<SampleFormat> {
    codec
        .pcm_sample_format()
        .ok_or_else(|| Error::unsupported(format!("'{codec}' is not a PCM codec")))
}

/// Decoder for the `pcm_*` codecs.
pub struct PcmDecoder {
    codec: CodecId,
    format: Option<AudioFormat>,
    time_base: TimeBase,
    queue: VecDeque<Buffer>,
    queue_size: usize,
}

impl PcmDecoder {
    /// Create a decoder for `codec`.
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            format: None,
            time_base: TimeBase::default(),
            queue: VecDeque::new(),
            queue_size: 4,
        }
    }
}

impl Processor for PcmDecoder {
    fn name(&self) -> &'static str {
        self.codec.name()
    }

    fn option_schema(&self) -> OptionSchema {
        queue_schema()
    }

    fn open(&mut self, ctx: &OpenContext<'_>) -> Result<()> {
        let sample_format = pcm_format(self.codec)?;
        if ctx.stream.codec != Some(self.codec) {
            return Err(Error::invalid_config(format!(
                "{} decoder cannot read {:?}",
                self.codec, ctx.stream.codec
            )));
        }
        let audio = ctx
            .stream
            .audio
            .ok_or_else(|| Error::invalid_config("PCM needs the sample rate and channel layout"))?;
        let format = AudioFormat::new(sample_format, audio.channel_layout, audio.sample_rate);
        format.validate()?;
        self.format = Some(format);
        self.time_base = ctx.stream.time_base;
        self.queue_size = ctx.options.usize("queue_size")?;
        Ok(())
    }

    fn has_capacity(&self) -> bool {
        self.queue.len() < self.queue_size
    }

    fn push(&mut self, input: Buffer) -> Result<()> {
        let format = self
            .format
            .ok_or_else(|| Error::invalid_state("decoder is not open"))?;
        let frame_bytes = format.plane_size(1);
        let data = input.data();
        if data.len() % frame_bytes != 0 {
            return Err(Error::corrupt(format!(
                "{} packet of {} bytes is not a whole number of {frame_bytes}-byte sample frames",
                self.codec,
                data.len()
            )));
        }
        let nb_samples = data.len() / frame_bytes;

        let mut frame = Buffer::new();
        if self.codec.is_big_endian() {
            let mut swapped = alloc_zeroed(data.len())?;
            swap_s16(data, &mut swapped, false);
            let stride = swapped.len();
            frame.attach_planes(MediaFormat::Audio(format), vec![Plane::new(swapped, stride)], nb_samples);
            frame.copy_props_from(&input);
        } else {
            frame.reference(&input)?;
            frame.set_format(MediaFormat::Audio(format), nb_samples);
        }
        if frame.duration == 0 && frame.time_base.as_rational().is_positive() {
            frame.duration = TimeBase::for_sample_rate(format.sample_rate)
                .convert(nb_samples as i64, frame.time_base);
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
        Some(StreamParams {
            time_base: self.time_base,
            ..StreamParams::audio(format)
        })
    }

    fn reset(&mut self) {
        self.queue.clear();
    }
}

/// Encoder for the `pcm_*` codecs.
pub struct PcmEncoder {
    codec: CodecId,
    format: Option<AudioFormat>,
    time_base: TimeBase,
    frame_size: usize,
    queue_size: usize,
    /// Interleaved, codec byte order.
    fifo: Vec<u8>,
    /// Pts of the first sample in `fifo`, in 1/sample_rate.
    fifo_pts: i64,
    ready: VecDeque<Buffer>,
}

impl PcmEncoder {
    /// Create an encoder for `codec`.
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            format: None,
            time_base: TimeBase::default(),
            frame_size: 0,
            queue_size: 4,
            fifo: Vec::new(),
            fifo_pts: Timestamp::NONE,
            ready: VecDeque::new(),
        }
    }

    fn frame_bytes(&self) -> usize {
        self.format.map_or(1, |f| f.plane_size(1))
    }

    fn interleave(&self, input: &Buffer, format: AudioFormat) -> Result<Vec<u8>> {
        let nb_samples = input.nb_samples();
        let bps = format.sample_format.bytes_per_sample();
        let channels = format.channels();
        let mut out = alloc_zeroed(nb_samples * bps * channels)?;
        if format.sample_format.is_planar() {
            let planes = input.planes();
            if planes.len() != channels {
                return Err(Error::corrupt(format!(
                    "planar frame with {} planes for {channels} channels",
                    planes.len()
                )));
            }
            for (c, plane) in planes.iter().enumerate() {
                for s in 0..nb_samples {
                    let dst = (s * channels + c) * bps;
                    out[dst..dst + bps].copy_from_slice(&plane.data()[s * bps..(s + 1) * bps]);
                }
            }
        } else {
            let len = out.len();
            let data = input.data();
            if data.len() < len {
                return Err(Error::corrupt(format!(
                    "frame holds {} bytes, {nb_samples} samples need {len}",
                    data.len()
                )));
            }
            out.copy_from_slice(&data[..len]);
        }
        if self.codec.is_big_endian() {
            let little = out.clone();
            swap_s16(&little, &mut out, true);
        }
        Ok(out)
    }

    fn emit(&mut self, nb_samples: usize) {
        let Some(format) = self.format else {
            return;
        };
        let len = nb_samples * self.frame_bytes();
        let payload: Vec<u8> = self.fifo.drain(..len).collect();
        let mut packet = Buffer::from_packet(payload, self.codec);
        packet.time_base = self.time_base;
        packet.pts = self.fifo_pts;
        packet.dts = self.fifo_pts;
        packet.duration = nb_samples as i64;
        packet.set_keyframe(true);
        if self.fifo_pts != Timestamp::NONE {
            self.fifo_pts += nb_samples as i64;
        }
        trace!(codec = %self.codec, samples = nb_samples, rate = format.sample_rate, "packet");
        self.ready.push_back(packet);
    }
}

impl Processor for PcmEncoder {
    fn name(&self) -> &'static str {
        self.codec.name()
    }

    fn option_schema(&self) -> OptionSchema {
        queue_schema().int(
            "frame_size",
            0,
            0,
            1 << 20,
            "samples per packet (0: one packet per frame)",
        )
    }

    fn open(&mut self, ctx: &OpenContext<'_>) -> Result<()> {
        let sample_format = pcm_format(self.codec)?;
        let input = match ctx.stream.media_format() {
            MediaFormat::Audio(a) => a,
            other => {
                return Err(Error::invalid_config(format!(
                    "{} encoder needs decoded audio, got '{other}'",
                    self.codec
                )))
            }
        };
        if input.sample_format.to_packed() != sample_format {
            return Err(Error::invalid_config(format!(
                "{} encoder takes {} samples, got {}",
                self.codec, sample_format, input.sample_format
            )));
        }
        input.validate()?;
        self.format = Some(input);
        self.time_base = TimeBase::for_sample_rate(input.sample_rate);
        self.frame_size = ctx.options.usize("frame_size")?;
        self.queue_size = ctx.options.usize("queue_size")?;
        Ok(())
    }

    fn has_capacity(&self) -> bool {
        self.ready.len() < self.queue_size
    }

    fn push(&mut self, input: Buffer) -> Result<()> {
        let format = self
            .format
            .ok_or_else(|| Error::invalid_state("encoder is not open"))?;
        if input.audio_format() != Some(format) {
            return Err(Error::invalid_config(format!(
                "{} encoder opened for {format} received {}",
                self.codec,
                input.format()
            )));
        }
        let data = self.interleave(&input, format)?;
        if self.fifo.is_empty() {
            self.fifo_pts = input.time_base.convert(input.pts, self.time_base);
        }
        self.fifo.try_reserve(data.len()).map_err(|_| Error::OutOfMemory {
            requested: data.len(),
        })?;
        self.fifo.extend_from_slice(&data);

        let available = self.fifo.len() / self.frame_bytes();
        if self.frame_size == 0 {
            self.emit(available);
        } else {
            for _ in 0..available / self.frame_size {
                self.emit(self.frame_size);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let remaining = self.fifo.len() / self.frame_bytes();
        if remaining > 0 {
            self.emit(remaining);
        }
        Ok(())
    }

    fn pull(&mut self, output: &mut Buffer) -> Result<bool> {
        match self.ready.pop_front() {
            Some(mut packet) => {
                output.move_ref(&mut packet);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn output_params(&self) -> Option<StreamParams> {
        let format = self.format?;
        let coded = AudioFormat::new(
            format.sample_format.to_packed(),
            format.channel_layout,
            format.sample_rate,
        );
        Some(StreamParams::compressed(self.codec, self.time_base).with_audio(coded))
    }

    fn reset(&mut self) {
        self.fifo.clear();
        self.fifo_pts = Timestamp::NONE;
        self.ready.clear();
    }
}

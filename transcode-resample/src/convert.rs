//! Sample format conversion.
//!
//! Samples travel between stages in their storage format (little-endian,
//! packed or planar). Inside the adapter every channel is a `Vec<f64>` in
//! the nominal range `[-1.0, 1.0)`, wide enough to carry 32-bit integers
//! without loss.

use crate::error::{ResampleError, Result};
use byteorder::{ByteOrder, LittleEndian};
use transcode_core::buffer::{alloc_zeroed, MediaFormat};
use transcode_core::{AudioFormat, Buffer, Plane, SampleFormat};

const S16_SCALE: f64 = 32768.0;
const S32_SCALE: f64 = 2147483648.0;

/// Decode one sample.
#[inline]
fn read_sample(format: SampleFormat, b: &[u8]) -> f64 {
    match format.to_packed() {
        SampleFormat::U8 => (f64::from(b[0]) - 128.0) / 128.0,
        SampleFormat::S16 => f64::from(LittleEndian::read_i16(b)) / S16_SCALE,
        SampleFormat::S32 => f64::from(LittleEndian::read_i32(b)) / S32_SCALE,
        SampleFormat::F32 => f64::from(LittleEndian::read_f32(b)),
        _ => LittleEndian::read_f64(b),
    }
}

/// Encode one sample, saturating integer formats.
#[inline]
fn write_sample(format: SampleFormat, value: f64, b: &mut [u8]) {
    match format.to_packed() {
        SampleFormat::U8 => b[0] = (value * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8,
        SampleFormat::S16 => LittleEndian::write_i16(
            b,
            (value * S16_SCALE).round().clamp(-S16_SCALE, S16_SCALE - 1.0) as i16,
        ),
        SampleFormat::S32 => LittleEndian::write_i32(
            b,
            (value * S32_SCALE).round().clamp(-S32_SCALE, S32_SCALE - 1.0) as i32,
        ),
        SampleFormat::F32 => LittleEndian::write_f32(b, value as f32),
        _ => LittleEndian::write_f64(b, value),
    }
}

/// Decode every channel of `buffer` as described by `format`.
pub fn read_channels(buffer: &Buffer, format: AudioFormat) -> Result<Vec<Vec<f64>>> {
    let nb_samples = buffer.nb_samples();
    let channels = format.channels();
    let bps = format.sample_format.bytes_per_sample();
    let planes = buffer.planes();
    let needed = format.plane_size(nb_samples);
    if planes.len() < format.num_planes() {
        return Err(ResampleError::BufferSizeMismatch {
            actual: planes.len(),
            expected: format.num_planes(),
        });
    }
    if let Some(short) = planes.iter().find(|p| p.len() < needed) {
        return Err(ResampleError::BufferSizeMismatch {
            actual: short.len(),
            expected: needed,
        });
    }

    let mut out = vec![Vec::with_capacity(nb_samples); channels];
    if format.sample_format.is_planar() {
        for (c, samples) in out.iter_mut().enumerate() {
            let data = planes[c].data();
            samples.extend(
                data[..needed]
                    .chunks_exact(bps)
                    .map(|b| read_sample(format.sample_format, b)),
            );
        }
    } else {
        let data = &planes[0].data()[..needed];
        for frame in data.chunks_exact(bps * channels) {
            for (c, samples) in out.iter_mut().enumerate() {
                samples.push(read_sample(format.sample_format, &frame[c * bps..]));
            }
        }
    }
    Ok(out)
}

/// Encode `channels` into `output` as `format`, replacing its storage.
///
/// Every channel must hold the same number of samples.
pub fn write_channels(channels: &[Vec<f64>], format: AudioFormat, output: &mut Buffer) -> transcode_core::Result<()> {
    let nb_samples = channels.first().map_or(0, Vec::len);
    let count = format.channels();
    let bps = format.sample_format.bytes_per_sample();
    let size = format.plane_size(nb_samples);

    let planes = if format.sample_format.is_planar() {
        let mut planes = Vec::with_capacity(count);
        for samples in channels.iter().take(count) {
            let mut data = alloc_zeroed(size)?;
            for (b, &v) in data.chunks_exact_mut(bps).zip(samples) {
                write_sample(format.sample_format, v, b);
            }
            planes.push(Plane::new(data, size));
        }
        planes
    } else {
        let mut data = alloc_zeroed(size)?;
        for (s, frame) in data.chunks_exact_mut(bps * count).enumerate() {
            for (c, samples) in channels.iter().take(count).enumerate() {
                write_sample(format.sample_format, samples[s], &mut frame[c * bps..(c + 1) * bps]);
            }
        }
        vec![Plane::new(data, size)]
    };
    output.attach_planes(MediaFormat::Audio(format), planes, nb_samples);
    Ok(())
}

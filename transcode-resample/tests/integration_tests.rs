//! Integration tests for transcode-resample.

use byteorder::{ByteOrder, LittleEndian};
use proptest::prelude::*;
use std::f64::consts::PI;
use transcode_core::{
    AdapterStage, AudioFormat, Buffer, ChannelLayout, FormatAdapter, MediaFormat, Plane,
    RetrieveStatus, SampleFormat, Stage, StageParams, StreamParams, TimeBase,
};
use transcode_resample::{
    AudioAdapter, AudioAdapterConfig, Resampler, ResamplerConfig, ResamplerType, WindowFunction,
};

/// Generate a sine wave at a given frequency.
fn generate_sine(sample_rate: u32, frequency: f64, num_samples: usize) -> Vec<f64> {
    (0..num_samples)
        .map(|i| (2.0 * PI * frequency * i as f64 / sample_rate as f64).sin())
        .collect()
}

/// Calculate the RMS of a signal.
fn rms(samples: &[f64]) -> f64 {
    let sum: f64 = samples.iter().map(|&s| s * s).sum();
    (sum / samples.len() as f64).sqrt()
}

fn run(resampler: &mut Resampler, input: &[f64], block: usize) -> Vec<f64> {
    let mut out = Vec::new();
    for chunk in input.chunks(block) {
        out.extend(resampler.process(&[chunk.to_vec()]).unwrap().remove(0));
    }
    out.extend(resampler.flush().unwrap().remove(0));
    out
}

fn f32_buffer(format: AudioFormat, samples: &[f32], pts: i64) -> Buffer {
    let mut data = vec![0u8; samples.len() * 4];
    LittleEndian::write_f32_into(samples, &mut data);
    let len = data.len();
    let mut buffer = Buffer::from_planes(
        MediaFormat::Audio(format),
        vec![Plane::new(data, len)],
        samples.len() / format.channels(),
    );
    buffer.pts = pts;
    buffer.time_base = TimeBase::for_sample_rate(format.sample_rate);
    buffer
}

// ============================================================================
// Rate conversion
// ============================================================================

#[test]
fn test_sine_amplitude_preserved() {
    for kind in [ResamplerType::Linear, ResamplerType::Sinc { window_size: 64 }] {
        let mut resampler =
            Resampler::new(ResamplerConfig::new(44100, 48000).with_channels(1).with_type(kind))
                .unwrap();
        let input = generate_sine(44100, 440.0, 44100 / 5);
        let output = run(&mut resampler, &input, 1024);
        let body = &output[500..output.len() - 500];
        let expected = rms(&input);
        assert!(
            (rms(body) - expected).abs() < 0.02,
            "{kind:?}: rms {} vs {}",
            rms(body),
            expected
        );
    }
}

#[test]
fn test_sinc_downsample_attenuates_above_nyquist() {
    // 15 kHz cannot be represented at 16 kHz and must be filtered out.
    let config = ResamplerConfig::high_quality(48000, 16000).with_channels(1);
    let mut resampler = Resampler::new(config).unwrap();
    let input = generate_sine(48000, 15000.0, 48000 / 4);
    let output = run(&mut resampler, &input, 4096);
    let body = &output[400..output.len() - 400];
    assert!(rms(body) < 0.05, "alias energy {}", rms(body));
}

#[test]
fn test_block_size_does_not_change_output() {
    let input = generate_sine(32000, 1000.0, 5000);
    let config = ResamplerConfig::new(32000, 44100)
        .with_channels(1)
        .with_window(WindowFunction::Kaiser { beta: 8.0 });
    let whole = run(&mut Resampler::new(config.clone()).unwrap(), &input, input.len());
    let pieces = run(&mut Resampler::new(config).unwrap(), &input, 37);
    assert_eq!(whole.len(), pieces.len());
    for (a, b) in whole.iter().zip(&pieces) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn test_reset_restarts_stream() {
    let mut resampler = Resampler::new(ResamplerConfig::fast(8000, 12000).with_channels(1)).unwrap();
    let input = generate_sine(8000, 300.0, 800);
    let first = run(&mut resampler, &input, 100);
    resampler.reset();
    let second = run(&mut resampler, &input, 100);
    assert_eq!(first, second);
}

proptest! {
    #[test]
    fn prop_output_length_is_exact(
        from in prop::sample::select(vec![8000u32, 11025, 16000, 22050, 44100, 48000, 96000]),
        to in prop::sample::select(vec![8000u32, 11025, 16000, 22050, 44100, 48000, 96000]),
        blocks in prop::collection::vec(1usize..700, 1..6),
        linear in any::<bool>(),
    ) {
        let kind = if linear { ResamplerType::Linear } else { ResamplerType::Sinc { window_size: 16 } };
        let mut resampler = Resampler::new(
            ResamplerConfig::new(from, to).with_channels(2).with_type(kind),
        ).unwrap();
        let mut produced = 0usize;
        let mut consumed = 0usize;
        for len in blocks {
            let out = resampler.process(&[vec![0.1; len], vec![-0.1; len]]).unwrap();
            prop_assert_eq!(out[0].len(), out[1].len());
            produced += out[0].len();
            consumed += len;
            prop_assert_eq!(
                produced + resampler.delay(),
                ((consumed as u64 * to as u64).div_ceil(from as u64)) as usize
            );
        }
        produced += resampler.flush().unwrap()[0].len();
        prop_assert_eq!(produced, ((consumed as u64 * to as u64).div_ceil(from as u64)) as usize);
    }
}

// ============================================================================
// AudioAdapter behind the stage protocol
// ============================================================================

#[test]
fn test_adapter_stage_resamples_and_frames() {
    let input_fmt = AudioFormat::new(SampleFormat::F32, ChannelLayout::Surround51, 44100);
    let output_fmt = AudioFormat::new(SampleFormat::S16p, ChannelLayout::Stereo, 48000);
    let adapter = AudioAdapter::new(AudioAdapterConfig::new().with_frame_size(1024));
    let mut stage = AdapterStage::new(adapter, MediaFormat::Audio(output_fmt));
    stage
        .configure(StageParams::new(StreamParams::audio(input_fmt)))
        .unwrap();
    stage.open().unwrap();

    let mut out = Buffer::new();
    let mut frames = Vec::new();
    for block in 0..10 {
        let mut input = f32_buffer(input_fmt, &vec![0.25; 441 * 6], block * 441);
        stage.submit(Some(&mut input)).unwrap();
        while stage.retrieve(&mut out).unwrap() == RetrieveStatus::Produced {
            frames.push((out.nb_samples(), out.pts));
        }
    }
    stage.submit(None).unwrap();
    loop {
        match stage.retrieve(&mut out).unwrap() {
            RetrieveStatus::Produced => frames.push((out.nb_samples(), out.pts)),
            RetrieveStatus::EndOfStream => break,
            RetrieveStatus::NeedsInput => panic!("drained stage asked for input"),
        }
    }

    let total: usize = frames.iter().map(|f| f.0).sum();
    assert_eq!(total, 4800);
    assert!(frames[..frames.len() - 1].iter().all(|f| f.0 == 1024));
    for pair in frames.windows(2) {
        assert_eq!(pair[1].1, pair[0].1 + pair[0].0 as i64);
    }
    let params = stage.output_params().unwrap();
    assert_eq!(params.time_base, TimeBase::for_sample_rate(48000));
}

#[test]
fn test_adapter_downmix_levels() {
    let input_fmt = AudioFormat::new(SampleFormat::F32, ChannelLayout::Surround51, 48000);
    let output_fmt = AudioFormat::new(SampleFormat::F32, ChannelLayout::Stereo, 48000);
    let mut adapter = AudioAdapter::new(AudioAdapterConfig::new());
    adapter
        .configure(MediaFormat::Audio(input_fmt), MediaFormat::Audio(output_fmt))
        .unwrap();
    adapter.open().unwrap();

    // Centre only.
    let input = f32_buffer(input_fmt, &[0.0, 0.0, 0.5, 0.0, 0.0, 0.0], 0);
    let mut out = Buffer::new();
    assert_eq!(adapter.convert(&input, &mut out).unwrap(), RetrieveStatus::Produced);
    let left = LittleEndian::read_f32(&out.data()[0..4]);
    let right = LittleEndian::read_f32(&out.data()[4..8]);
    assert!((left - 0.5 * std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    assert_eq!(left, right);
}

//! End-to-end transcoding tests over memory and raw files.

use std::sync::{Arc, Mutex};
use transcode::{
    AudioConfig, CodecId, InputConfig, MemorySink, MemorySource, OutputConfig, PixelFormat,
    TranscodeOptions, Transcoder, Unit, VideoConfig,
};

/// Packed yuv420p pictures of a flat mid-gray.
fn gray_yuv420p(width: usize, height: usize, frames: usize) -> Vec<u8> {
    let size = width * height + 2 * (width / 2) * (height / 2);
    vec![128; size * frames]
}

fn video_input(width: u32, height: u32, format: PixelFormat) -> InputConfig {
    InputConfig::new("in.yuv", CodecId::RawVideo).video(width, height, format)
}

fn s16_stereo(frames: usize) -> Vec<u8> {
    vec![0; frames * 4]
}

fn run(options: TranscodeOptions, source: &mut MemorySource) -> (transcode::TranscodeStats, Vec<Unit>) {
    let mut transcoder = Transcoder::new(options).unwrap();
    let mut sink = MemorySink::new();
    let stats = transcoder.run_with(source, &mut sink).unwrap();
    (stats, sink.into_units())
}

#[test]
fn test_rawvideo_passthrough() {
    let options = TranscodeOptions::new()
        .input_config(video_input(8, 8, PixelFormat::Yuv420p))
        .output("out.yuv");
    let data = gray_yuv420p(8, 8, 3);
    let (stats, units) = run(options, &mut MemorySource::chunked(&data, 96, 1));

    assert_eq!(stats.units_read, 3);
    assert_eq!(stats.units_written, 3);
    assert_eq!(units.iter().map(|u| u.pts).collect::<Vec<_>>(), vec![0, 1, 2]);
    let bytes: Vec<u8> = units.iter().flat_map(|u| u.data.clone()).collect();
    assert_eq!(bytes, data);
}

#[test]
fn test_pixel_format_conversion() {
    let options = TranscodeOptions::new()
        .input_config(video_input(8, 8, PixelFormat::Yuv420p))
        .output("out.rgb")
        .video_pixel_format(PixelFormat::Rgb24);
    let (stats, units) = run(options, &mut MemorySource::chunked(&gray_yuv420p(8, 8, 2), 96, 1));

    assert_eq!(stats.units_written, 2);
    for unit in &units {
        assert_eq!(unit.data.len(), 8 * 8 * 3);
        assert!(unit.data.iter().all(|&v| (127..=129).contains(&v)));
    }
    assert!(stats.compression_ratio() < 1.0);
}

#[test]
fn test_filter_graph_resizes() {
    let options = TranscodeOptions::new()
        .input_config(video_input(8, 8, PixelFormat::Gray8))
        .output("out.gray")
        .filters("scale=w=4:h=4");
    let (_, units) = run(options, &mut MemorySource::chunked(&[200; 64 * 3], 64, 1));

    assert_eq!(units.len(), 3);
    for unit in &units {
        assert_eq!(unit.data, vec![200; 16]);
    }
}

#[test]
fn test_filters_then_conversion() {
    let options = TranscodeOptions::new()
        .input_config(video_input(16, 16, PixelFormat::Yuv420p))
        .output("out.rgb")
        .filters("scale=w=8:h=-1")
        .video_config(VideoConfig::new().pixel_format(PixelFormat::Rgb24));
    let (_, units) = run(options, &mut MemorySource::chunked(&gray_yuv420p(16, 16, 1), 384, 1));

    assert_eq!(units.len(), 1);
    assert_eq!(units[0].data.len(), 8 * 8 * 3);
}

#[test]
fn test_bitstream_filters_rewrite_timing() {
    let options = TranscodeOptions::new()
        .input_config(video_input(4, 4, PixelFormat::Gray8))
        .output("out.gray")
        .bitstream_filters("setts=offset=10,null");
    let (_, units) = run(options, &mut MemorySource::chunked(&[1; 16 * 3], 16, 1));

    assert_eq!(units.iter().map(|u| u.pts).collect::<Vec<_>>(), vec![10, 11, 12]);
}

#[test]
fn test_pcm_sample_format_conversion() {
    let options = TranscodeOptions::new()
        .input_config(InputConfig::new("in.pcm", CodecId::PcmS16Le).audio(48000, 2))
        .output_config(OutputConfig::new("out.pcm").codec(CodecId::PcmU8));
    let (stats, units) = run(options, &mut MemorySource::chunked(&s16_stereo(3 * 1024), 4096, 1024));

    let bytes: Vec<u8> = units.iter().flat_map(|u| u.data.clone()).collect();
    assert_eq!(bytes.len(), 3 * 1024 * 2);
    assert!(bytes.iter().all(|&v| v == 128));
    assert!((stats.compression_ratio() - 2.0).abs() < 1e-9);
}

#[test]
fn test_pcm_resample_halves_samples() {
    let options = TranscodeOptions::new()
        .input_config(InputConfig::new("in.pcm", CodecId::PcmS16Le).audio(48000, 2))
        .output("out.pcm")
        .audio_sample_rate(24000);
    let (_, units) = run(options, &mut MemorySource::chunked(&s16_stereo(4 * 1024), 4096, 1024));

    let samples: usize = units.iter().map(|u| u.data.len() / 4).sum();
    assert!((1900..=2150).contains(&samples), "got {samples} samples");
}

#[test]
fn test_encoder_frame_size_regroups_audio() {
    let options = TranscodeOptions::new()
        .input_config(InputConfig::new("in.pcm", CodecId::PcmS16Le).audio(8000, 1).frame_samples(100))
        .output_config(OutputConfig::new("out.pcm").frame_size(160));
    let (_, units) = run(options, &mut MemorySource::chunked(&vec![0; 2 * 480], 200, 100));

    let sizes: Vec<usize> = units.iter().map(|u| u.data.len()).collect();
    assert_eq!(sizes, vec![320, 320, 320]);
}

#[test]
fn test_corrupt_units_are_skipped() {
    let options = TranscodeOptions::new()
        .input_config(InputConfig::new("in.pcm", CodecId::PcmS16Le).audio(8000, 2))
        .output("out.pcm");
    let mut source = MemorySource::new(vec![
        Unit::new(vec![0; 40], 0, 10),
        Unit::new(vec![0; 3], 10, 10),
        Unit::new(vec![0; 40], 20, 10),
    ]);
    let (stats, units) = run(options, &mut source);

    assert_eq!(stats.units_read, 3);
    assert_eq!(stats.units_skipped, 1);
    assert_eq!(units.iter().map(|u| u.data.len()).sum::<usize>(), 80);
}

#[test]
fn test_hardware_decode_downloads_for_conversion() {
    let options = TranscodeOptions::new()
        .input_config(video_input(8, 8, PixelFormat::Yuv420p))
        .output("out.rgb")
        .hardware_acceleration(true)
        .video_pixel_format(PixelFormat::Rgb24);
    let (stats, units) = run(options, &mut MemorySource::chunked(&gray_yuv420p(8, 8, 12), 96, 1));

    assert_eq!(stats.units_written, 12);
    assert!(units.iter().all(|u| u.data.len() == 8 * 8 * 3));
}

#[test]
fn test_progress_reaches_completion() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let options = TranscodeOptions::new()
        .input_config(video_input(4, 4, PixelFormat::Gray8))
        .output("out.gray");
    let mut transcoder = Transcoder::new(options)
        .unwrap()
        .on_progress(move |percent, written| recorder.lock().unwrap().push((percent, written)));
    transcoder
        .run_with(&mut MemorySource::chunked(&[0; 16 * 4], 16, 1), &mut MemorySink::new())
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(seen.last().copied(), Some((100.0, 4)));
    assert!((transcoder.progress() - 100.0).abs() < 1e-9);
}

#[test]
fn test_invalid_jobs_are_rejected() {
    let mismatched = TranscodeOptions::new()
        .input_config(video_input(4, 4, PixelFormat::Gray8))
        .output_config(OutputConfig::new("out").codec(CodecId::PcmS16Le));
    assert!(Transcoder::new(mismatched).is_err());

    let audio_for_video = TranscodeOptions::new()
        .input_config(video_input(4, 4, PixelFormat::Gray8))
        .output("out")
        .audio_config(AudioConfig::new().sample_rate(8000));
    assert!(Transcoder::new(audio_for_video).is_err());

    let bad_graph = TranscodeOptions::new()
        .input_config(video_input(4, 4, PixelFormat::Gray8))
        .output("out")
        .filters("nosuchfilter");
    let mut transcoder = Transcoder::new(bad_graph).unwrap();
    let result = transcoder.run_with(&mut MemorySource::chunked(&[0; 16], 16, 1), &mut MemorySink::new());
    assert!(result.is_err());
}

#[test]
fn test_file_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.gray");
    let output = dir.path().join("out/out.gray");
    std::fs::write(&input, vec![50u8; 8 * 8 * 2]).unwrap();

    let options = TranscodeOptions::new()
        .input_config(InputConfig::new(&input, CodecId::RawVideo).video(8, 8, PixelFormat::Gray8))
        .output(&output)
        .filters("scale=w=4:h=4");
    let stats = Transcoder::new(options.clone()).unwrap().run().unwrap();
    assert_eq!(stats.units_written, 2);
    assert_eq!(stats.input_size, Some(128));
    assert_eq!(std::fs::read(&output).unwrap(), vec![50u8; 32]);

    // the output now exists
    assert!(Transcoder::new(options.clone()).unwrap().run().is_err());
    assert!(Transcoder::new(options.overwrite(true)).unwrap().run().is_ok());
}

#[test]
fn test_job_from_json() {
    let json = r#"{
        "input": { "path": "in.yuv", "codec": "rawvideo", "width": 8, "height": 8, "pixel_format": "yuv420p" },
        "output": { "path": "out.rgb" },
        "video": { "pixel_format": "rgb24" },
        "bitstream_filters": "null"
    }"#;
    let options: TranscodeOptions = serde_json::from_str(json).unwrap();
    assert_eq!(options.input.as_ref().unwrap().codec, CodecId::RawVideo);
    assert!(!options.overwrite);
    assert_eq!(options.output_codec().unwrap(), CodecId::RawVideo);

    let (_, units) = run(options, &mut MemorySource::chunked(&gray_yuv420p(8, 8, 1), 96, 1));
    assert_eq!(units[0].data.len(), 192);
}

#[test]
fn test_unknown_codec_in_json_is_rejected() {
    let json = r#"{ "input": { "path": "in", "codec": "nope" }, "output": { "path": "out" } }"#;
    assert!(serde_json::from_str::<TranscodeOptions>(json).is_err());
}

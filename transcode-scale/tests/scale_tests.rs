//! Integration tests for transcode-scale.

use proptest::prelude::*;
use transcode_core::{
    AdapterStage, Buffer, Error, FormatAdapter, MediaFormat, PixelFormat, RetrieveStatus, Stage,
    StageParams, StageState, StreamParams, SubmitStatus, TimeBase, VideoFormat,
};
use transcode_scale::{ScaleConfig, ScaleFilter, VideoAdapter};

const FORMATS: &[PixelFormat] = &[
    PixelFormat::Yuv420p,
    PixelFormat::Yuv422p,
    PixelFormat::Yuv444p,
    PixelFormat::Nv12,
    PixelFormat::Nv21,
    PixelFormat::Rgb24,
    PixelFormat::Bgr24,
    PixelFormat::Rgba,
    PixelFormat::Bgra,
    PixelFormat::Gray8,
];

/// A flat grey picture: identical in every colour model.
fn grey(format: VideoFormat, level: u8) -> Buffer {
    let mut buffer = Buffer::new();
    buffer.allocate(format).unwrap();
    let pix = format.pixel_format;
    for p in 0..format.num_planes() {
        let fill = if pix.is_rgb() || p == 0 { level } else { 128 };
        buffer.plane_mut(p).unwrap().fill(fill);
    }
    if pix.has_alpha() {
        let bpp = 4;
        let stride = buffer.stride(0);
        let data = buffer.plane_mut(0).unwrap();
        for y in 0..format.height as usize {
            for x in 0..format.width as usize {
                data[y * stride + x * bpp + 3] = 255;
            }
        }
    }
    buffer
}

fn convert(from: VideoFormat, to: VideoFormat, filter: ScaleFilter, input: &Buffer) -> Buffer {
    let mut adapter = VideoAdapter::new(ScaleConfig::new().with_filter(filter));
    adapter
        .configure(MediaFormat::Video(from), MediaFormat::Video(to))
        .unwrap();
    adapter.open().unwrap();
    let mut out = Buffer::new();
    assert_eq!(adapter.convert(input, &mut out).unwrap(), RetrieveStatus::Produced);
    out
}

// ============================================================================
// Format matrix
// ============================================================================

#[test]
fn test_every_pair_preserves_flat_grey() {
    for &src in FORMATS {
        for &dst in FORMATS {
            let from = VideoFormat::new(6, 4, src);
            let to = VideoFormat::new(3, 5, dst);
            let out = convert(from, to, ScaleFilter::Bilinear, &grey(from, 90));
            let expected = grey(to, 90);
            for p in 0..to.num_planes() {
                for y in 0..to.rows(p) {
                    let w = to.row_bytes(p);
                    assert_eq!(
                        &out.plane(p).unwrap()[y * out.stride(p)..y * out.stride(p) + w],
                        &expected.plane(p).unwrap()[y * expected.stride(p)..y * expected.stride(p) + w],
                        "{src} -> {dst}, plane {p} row {y}"
                    );
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_nearest_integer_scale_round_trips(
        w in 1u32..12,
        h in 1u32..12,
        factor in 2u32..4,
        seed in any::<u8>(),
    ) {
        let small = VideoFormat::new(w, h, PixelFormat::Gray8);
        let large = VideoFormat::new(w * factor, h * factor, PixelFormat::Gray8);
        let mut input = Buffer::new();
        input.allocate(small).unwrap();
        let stride = input.stride(0);
        {
            let data = input.plane_mut(0).unwrap();
            for y in 0..h as usize {
                for x in 0..w as usize {
                    data[y * stride + x] = seed.wrapping_add((x * 7 + y * 13) as u8);
                }
            }
        }
        let up = convert(small, large, ScaleFilter::Nearest, &input);
        let back = convert(large, small, ScaleFilter::Nearest, &up);
        for y in 0..h as usize {
            prop_assert_eq!(
                &back.plane(0).unwrap()[y * back.stride(0)..y * back.stride(0) + w as usize],
                &input.plane(0).unwrap()[y * stride..y * stride + w as usize]
            );
        }
    }
}

// ============================================================================
// Behind the stage protocol
// ============================================================================

#[test]
fn test_adapter_stage_rescales() {
    let from = VideoFormat::new(64, 48, PixelFormat::Yuv420p);
    let to = VideoFormat::new(32, 24, PixelFormat::Rgb24);
    let mut stage = AdapterStage::new(VideoAdapter::new(ScaleConfig::new()), MediaFormat::Video(to));
    stage
        .configure(StageParams::new(StreamParams::video(from, TimeBase::MILLISECONDS)))
        .unwrap();
    stage.open().unwrap();

    let mut out = Buffer::new();
    for i in 0..3 {
        let mut picture = grey(from, 40);
        picture.pts = i * 40;
        picture.time_base = TimeBase::MILLISECONDS;
        stage.submit(Some(&mut picture)).unwrap();
        assert_eq!(stage.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.pts, i * 40);
        assert_eq!(out.video_format(), Some(to));
    }
    stage.submit(None).unwrap();
    assert_eq!(stage.retrieve(&mut out).unwrap(), RetrieveStatus::EndOfStream);
    assert_eq!(stage.output_params().unwrap().video, Some(to));
    assert_eq!(stage.adapter().pending_delay(), 0);
}

fn open_stage(from: VideoFormat, to: VideoFormat) -> AdapterStage<VideoAdapter> {
    let mut stage = AdapterStage::new(VideoAdapter::new(ScaleConfig::new()), MediaFormat::Video(to));
    stage
        .configure(StageParams::new(StreamParams::video(from, TimeBase::MILLISECONDS)))
        .unwrap();
    stage.open().unwrap();
    stage
}

#[test]
fn test_adapter_stage_pushes_back_with_busy() {
    let from = VideoFormat::new(8, 8, PixelFormat::Gray8);
    let to = VideoFormat::new(4, 4, PixelFormat::Gray8);
    let mut stage = open_stage(from, to);

    let mut pending: Vec<Buffer> = (0..3)
        .map(|i| {
            let mut picture = grey(from, 60);
            picture.pts = i;
            picture
        })
        .collect();
    let mut produced = Vec::new();
    let mut out = Buffer::new();
    for picture in &mut pending {
        loop {
            match stage.submit(Some(picture)).unwrap() {
                SubmitStatus::Accepted => break,
                SubmitStatus::Busy => {
                    assert!(picture.has_storage());
                    while stage.retrieve(&mut out).unwrap() == RetrieveStatus::Produced {
                        produced.push(out.pts);
                    }
                }
            }
        }
    }
    stage.submit(None).unwrap();
    loop {
        match stage.retrieve(&mut out).unwrap() {
            RetrieveStatus::Produced => produced.push(out.pts),
            RetrieveStatus::EndOfStream => break,
            RetrieveStatus::NeedsInput => panic!("stage asked for input while draining"),
        }
    }
    assert_eq!(produced, vec![0, 1, 2]);
    assert_eq!(stage.state(), StageState::Closed);
}

#[test]
fn test_adapter_stage_flush_after_drain_fails() {
    let format = VideoFormat::new(8, 8, PixelFormat::Gray8);
    let mut stage = open_stage(format, VideoFormat::new(4, 4, PixelFormat::Gray8));
    let mut out = Buffer::new();
    stage.submit(Some(&mut grey(format, 10))).unwrap();
    stage.submit(None).unwrap();
    while stage.retrieve(&mut out).unwrap() != RetrieveStatus::EndOfStream {}
    assert_eq!(stage.state(), StageState::Closed);

    assert!(matches!(stage.flush(), Err(Error::InvalidState(_))));
    assert_eq!(stage.state(), StageState::Closed);
}

#[test]
fn test_wrong_input_format_rejected() {
    let from = VideoFormat::new(8, 8, PixelFormat::Yuv420p);
    let to = VideoFormat::new(8, 8, PixelFormat::Rgb24);
    let mut adapter = VideoAdapter::new(ScaleConfig::new());
    adapter
        .configure(MediaFormat::Video(from), MediaFormat::Video(to))
        .unwrap();
    adapter.open().unwrap();
    let other = grey(VideoFormat::new(4, 4, PixelFormat::Yuv420p), 0);
    assert!(adapter.push(Some(&other)).is_err());
}

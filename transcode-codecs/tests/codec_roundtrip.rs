//! Codec round trips through the registry.
//!
//! Decoding then re-encoding an uncompressed stream must reproduce the input
//! bytes, whatever the picture size or sample layout.

use proptest::prelude::*;
use transcode_codecs::{find_decoder, find_encoder};
use transcode_core::{
    AudioFormat, Buffer, Chain, ChannelLayout, CodecId, PixelFormat, RetrieveStatus, Stage,
    StageParams, StreamParams, SubmitStatus, TimeBase, VideoFormat,
    transfer_data,
};

/// Feed `units` through `stage` with the alternating caller loop.
fn run(stage: &mut dyn Stage, units: Vec<Buffer>) -> Vec<Buffer> {
    let mut out = Vec::new();
    let mut unit = Buffer::new();
    for mut input in units {
        while stage.submit(Some(&mut input)).unwrap() == SubmitStatus::Busy {
            while stage.retrieve(&mut unit).unwrap() == RetrieveStatus::Produced {
                out.push(std::mem::take(&mut unit));
            }
        }
    }
    stage.submit(None).unwrap();
    loop {
        match stage.retrieve(&mut unit).unwrap() {
            RetrieveStatus::Produced => out.push(std::mem::take(&mut unit)),
            RetrieveStatus::EndOfStream => break,
            RetrieveStatus::NeedsInput => panic!("NeedsInput while draining"),
        }
    }
    out
}

// =============================================================================
// Raw video
// =============================================================================

fn pixel_format() -> impl Strategy<Value = PixelFormat> {
    prop_oneof![
        Just(PixelFormat::Yuv420p),
        Just(PixelFormat::Yuv444p),
        Just(PixelFormat::Nv12),
        Just(PixelFormat::Rgb24),
        Just(PixelFormat::Gray8),
    ]
}

proptest! {
    #[test]
    fn rawvideo_round_trip(width in 1u32..40, height in 1u32..24, pix in pixel_format(),
                           frames in 1usize..6, seed in any::<u8>()) {
        let format = VideoFormat::new(width, height, pix);
        let size = format.packed_size();

        let packets: Vec<Buffer> = (0..frames)
            .map(|i| {
                let data = (0..size).map(|b| (b as u8).wrapping_mul(seed).wrapping_add(i as u8)).collect();
                let mut p = Buffer::from_packet(data, CodecId::RawVideo);
                p.pts = i as i64;
                p.time_base = TimeBase::new(1, 25);
                p.sequence = i as u64;
                p
            })
            .collect();
        let expected: Vec<Vec<u8>> = packets.iter().map(|p| p.data().to_vec()).collect();

        let mut chain = Chain::new("rawvideo")
            .with(find_decoder(CodecId::RawVideo).unwrap())
            .with(find_encoder(CodecId::RawVideo).unwrap());
        let stream = StreamParams::compressed(CodecId::RawVideo, TimeBase::new(1, 25)).with_video(format);
        chain.configure(StageParams::new(stream)).unwrap();
        chain.open().unwrap();

        let out = run(&mut chain, packets);
        prop_assert_eq!(out.len(), frames);
        for (i, packet) in out.iter().enumerate() {
            prop_assert_eq!(packet.data(), expected[i].as_slice());
            prop_assert_eq!(packet.pts, i as i64);
            prop_assert!(packet.is_keyframe());
        }
    }
}

// =============================================================================
// PCM
// =============================================================================

fn pcm_codec() -> impl Strategy<Value = CodecId> {
    prop_oneof![
        Just(CodecId::PcmU8),
        Just(CodecId::PcmS16Le),
        Just(CodecId::PcmS16Be),
        Just(CodecId::PcmS32Le),
        Just(CodecId::PcmF32Le),
        Just(CodecId::PcmF64Le),
    ]
}

proptest! {
    #[test]
    fn pcm_round_trip(codec in pcm_codec(), channels in 1u32..4,
                      sizes in prop::collection::vec(1usize..50, 1..6)) {
        let format = AudioFormat::new(
            codec.pcm_sample_format().unwrap(),
            ChannelLayout::from_channels(channels),
            8000,
        );
        let frame_bytes = format.plane_size(1);
        let mut pts = 0;
        let packets: Vec<Buffer> = sizes
            .iter()
            .map(|&n| {
                let data = (0..n * frame_bytes).map(|b| (b * 7 + n) as u8).collect();
                let mut p = Buffer::from_packet(data, codec);
                p.pts = pts;
                p.time_base = TimeBase::for_sample_rate(8000);
                pts += n as i64;
                p
            })
            .collect();
        let expected: Vec<u8> = packets.iter().flat_map(|p| p.data().to_vec()).collect();

        let mut chain = Chain::new("pcm")
            .with(find_decoder(codec).unwrap())
            .with(find_encoder(codec).unwrap());
        let stream = StreamParams::compressed(codec, TimeBase::for_sample_rate(8000)).with_audio(format);
        chain.configure(StageParams::new(stream)).unwrap();
        chain.open().unwrap();

        let out = run(&mut chain, packets);
        let joined: Vec<u8> = out.iter().flat_map(|p| p.data().to_vec()).collect();
        prop_assert_eq!(joined, expected);
        prop_assert_eq!(out[0].pts, 0);
    }
}

#[test]
fn test_pcm_frame_size_rechunks_through_chain() {
    let format = AudioFormat::new(
        CodecId::PcmS16Le.pcm_sample_format().unwrap(),
        ChannelLayout::Mono,
        8000,
    );
    let mut chain = Chain::new("pcm")
        .with(find_decoder(CodecId::PcmS16Le).unwrap())
        .with_params(
            find_encoder(CodecId::PcmS16Le).unwrap(),
            StageParams::default().with_option("frame_size", 4),
        );
    let stream = StreamParams::compressed(CodecId::PcmS16Le, TimeBase::for_sample_rate(8000))
        .with_audio(format);
    chain.configure(StageParams::new(stream)).unwrap();
    chain.open().unwrap();

    let packets = (0..3)
        .map(|i| {
            let mut p = Buffer::from_packet(vec![i as u8; 6], CodecId::PcmS16Le);
            p.pts = i * 3;
            p.time_base = TimeBase::for_sample_rate(8000);
            p
        })
        .collect();
    let out = run(&mut chain, packets);
    let sizes: Vec<usize> = out.iter().map(Buffer::size).collect();
    assert_eq!(sizes, vec![8, 8, 2]);
    let pts: Vec<i64> = out.iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![0, 4, 8]);
}

// =============================================================================
// Device surfaces
// =============================================================================

#[test]
fn test_rawvideo_decodes_into_device_surfaces() {
    let format = VideoFormat::new(6, 4, PixelFormat::Yuv420p);
    let size = format.packed_size();
    let packets: Vec<Buffer> = (0..3)
        .map(|i| {
            let mut p = Buffer::from_packet(vec![i as u8 * 40 + 1; size], CodecId::RawVideo);
            p.pts = i;
            p.time_base = TimeBase::new(1, 25);
            p
        })
        .collect();

    let device = transcode_hwaccel::HwDeviceContext::software().unwrap();
    let mut decoder = find_decoder(CodecId::RawVideo).unwrap();
    let stream =
        StreamParams::compressed(CodecId::RawVideo, TimeBase::new(1, 25)).with_video(format);
    decoder
        .configure(
            StageParams::new(stream)
                .with_device(device)
                .with_option("hw_pool_size", 4),
        )
        .unwrap();
    decoder.open().unwrap();

    let frames = run(decoder.as_mut(), packets);
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        assert!(frame.is_hardware());
        assert_eq!(frame.video_format(), Some(format));
        assert_eq!(frame.pts, i as i64);

        let mut host = Buffer::new();
        transfer_data(&mut host, frame).unwrap();
        assert!(!host.is_hardware());
        for p in 0..format.num_planes() {
            let row_bytes = format.row_bytes(p);
            for y in 0..format.rows(p) {
                let row = &host.plane(p).unwrap()[y * host.stride(p)..][..row_bytes];
                assert!(row.iter().all(|&b| b == i as u8 * 40 + 1));
            }
        }
    }
}

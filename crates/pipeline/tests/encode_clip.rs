//! End-to-end encoding through the real `ffmpeg` binary.
//!
//! Ignored by default; run with `cargo test -- --ignored` on a machine with
//! `ffmpeg` and `ffprobe` on `PATH`.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use image::RgbImage;
use reelgen_core::clip::ClipTiming;
use reelgen_core::frame::{placeholder_image, Frame};
use reelgen_pipeline::assembler::{ClipEncoder, FfmpegAssembler};
use reelgen_pipeline::ffmpeg::{self, first_video_stream, parse_duration};

/// Per-channel slack for colours that went through yuv420p and back.
const COLOR_TOLERANCE: i32 = 16;

async fn require_tools() {
    assert!(
        ffmpeg::is_available(Path::new("ffmpeg")).await
            && ffmpeg::is_available(Path::new("ffprobe")).await,
        "ffmpeg and ffprobe must be on PATH for these tests",
    );
}

fn palette(i: u32) -> [u8; 3] {
    const COLORS: [[u8; 3]; 4] = [[200, 40, 40], [40, 200, 40], [40, 40, 200], [200, 200, 40]];
    COLORS[i as usize % COLORS.len()]
}

fn frames(n: u32) -> Vec<Frame> {
    (0..n)
        .map(|i| Frame::fetched(i, placeholder_image(64, 36, palette(i))))
        .collect()
}

async fn encoded_duration(bytes: &[u8]) -> (f64, Option<String>, Option<String>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    tokio::fs::write(&path, bytes).await.unwrap();

    let probe = ffmpeg::probe_video(Path::new("ffprobe"), &path).await.unwrap();
    let stream = first_video_stream(&probe);
    (
        parse_duration(&probe),
        stream.and_then(|s| s.codec_name.clone()),
        stream.and_then(|s| s.pix_fmt.clone()),
    )
}

/// Decode encoder frame `index` of an mp4 to RGB.
async fn extract_frame(bytes: &[u8], index: u64) -> RgbImage {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("clip.mp4");
    let still = dir.path().join("still.png");
    tokio::fs::write(&clip, bytes).await.unwrap();

    let select = format!("select=eq(n\\,{index})");
    let args = [
        OsStr::new("-v"),
        OsStr::new("error"),
        OsStr::new("-i"),
        clip.as_os_str(),
        OsStr::new("-vf"),
        OsStr::new(&select),
        OsStr::new("-vsync"),
        OsStr::new("0"),
        OsStr::new("-frames:v"),
        OsStr::new("1"),
        OsStr::new("-y"),
        still.as_os_str(),
    ];
    ffmpeg::run_ffmpeg(Path::new("ffmpeg"), args).await.unwrap();

    image::open(&still).unwrap().to_rgb8()
}

fn mean_color(image: &RgbImage) -> [i32; 3] {
    let mut sum = [0u64; 3];
    for pixel in image.pixels() {
        for (acc, channel) in sum.iter_mut().zip(pixel.0) {
            *acc += u64::from(channel);
        }
    }
    let n = u64::from(image.width()) * u64::from(image.height());
    sum.map(|s| (s / n) as i32)
}

fn assert_close(got: [i32; 3], want: [u8; 3], what: &str) {
    for (g, w) in got.iter().zip(want) {
        assert!(
            (g - i32::from(w)).abs() <= COLOR_TOLERANCE,
            "{what}: got {got:?}, want {want:?}"
        );
    }
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe on PATH"]
async fn six_frames_over_three_seconds_is_three_seconds() {
    require_tools().await;

    let bytes = FfmpegAssembler::new(24)
        .assemble(&frames(6), Duration::from_secs(3))
        .await
        .unwrap();

    let (duration, codec, pix_fmt) = encoded_duration(&bytes).await;
    assert!((duration - 3.0).abs() <= 1.0 / 24.0 + 1e-3, "duration {duration}");
    assert_eq!(codec.as_deref(), Some("h264"));
    assert_eq!(pix_fmt.as_deref(), Some("yuv420p"));
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe on PATH"]
async fn duration_holds_for_uneven_frame_counts() {
    require_tools().await;

    for (n, total_ms) in [(1u32, 2000u64), (7, 3000), (5, 1300)] {
        let total = Duration::from_millis(total_ms);
        let bytes = FfmpegAssembler::new(24)
            .assemble(&frames(n), total)
            .await
            .unwrap();

        let (duration, _, _) = encoded_duration(&bytes).await;
        assert!(
            (duration - total.as_secs_f64()).abs() <= 1.0 / 24.0 + 1e-3,
            "n={n} total={total_ms}ms encoded={duration}"
        );
    }
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe on PATH"]
async fn only_the_opening_frame_fades() {
    require_tools().await;

    let total = Duration::from_secs(3);
    let timing = ClipTiming::plan(6, total, 24).unwrap();
    let bytes = FfmpegAssembler::new(24)
        .assemble(&frames(6), total)
        .await
        .unwrap();

    let first = mean_color(&extract_frame(&bytes, 0).await);
    assert!(first.iter().all(|&c| c <= COLOR_TOLERANCE), "frame 0 not dark: {first:?}");

    // Start of the second still, one full per-frame share in: past the fade.
    let second_start = u64::from(timing.spans[0]);
    assert_close(
        mean_color(&extract_frame(&bytes, second_start).await),
        palette(1),
        "second still",
    );

    // Middle of the fourth still: no fade between stills.
    let fourth_mid = timing.spans[..3].iter().map(|&s| u64::from(s)).sum::<u64>()
        + u64::from(timing.spans[3] / 2);
    assert_close(
        mean_color(&extract_frame(&bytes, fourth_mid).await),
        palette(3),
        "fourth still",
    );
}

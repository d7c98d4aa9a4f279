mod common;

use common::{frame_color, invert_colors, write_frames, EchoPipeline};
use image::RgbImage;
use video_veil::config::{GenerationSettings, SourceSettings, VeilConfig};
use video_veil::state::RunContext;
use video_veil::veil::frame_store::SourceVideo;
use video_veil::veil::request::ProcessingRequest;
use video_veil::veil::{ffmpeg, RunState, VideoAssembler, VideoVeil};

fn mean_abs_diff(a: &RgbImage, b: &RgbImage) -> f64 {
    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| (*x as i64 - *y as i64).unsigned_abs())
        .sum();
    total as f64 / a.as_raw().len() as f64
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_three_frame_round_trip() {
    if !common::ffmpeg_available() {
        eprintln!("ffmpeg not found, skipping");
        return;
    }

    let frames = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_frames(frames.path(), 3, 64, 48);

    let config = VeilConfig {
        source: SourceSettings {
            use_images_directory: true,
            directory_path: Some(frames.path().to_path_buf()),
            ..Default::default()
        },
        ..Default::default()
    };
    let base = ProcessingRequest::new(GenerationSettings {
        steps: 2,
        ..Default::default()
    });
    let mut veil = VideoVeil::new(
        EchoPipeline::new(),
        RunContext::shared(),
        VideoAssembler::new(out.path(), "mpeg4"),
    );

    let outcome = veil.run(&config, base).await.unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.images.len(), 3);

    let path = outcome.output_path.expect("video should be written");
    assert!(path.exists());
    assert!(path.starts_with(out.path().join("video-veil-output")));
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    let dir_name = frames.path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with(&format!("-1234-{}.mp4", dir_name)), "{}", name);

    // read it back through the video path of the frame store
    let decoded = SourceVideo::load(&SourceSettings {
        video_path: Some(path),
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded.dimensions(), (64, 48));
    assert!((decoded.frame_rate() - 30.0).abs() < 0.01);
    for (i, frame) in decoded.frames().iter().enumerate() {
        let expected = invert_colors(&RgbImage::from_pixel(64, 48, frame_color(i)));
        let diff = mean_abs_diff(frame.image(), &expected);
        assert!(diff < 12.0, "frame {} differs by {}", i, diff);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_video_test_run_stops_at_cap() {
    if !common::ffmpeg_available() {
        eprintln!("ffmpeg not found, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("clip.mp4");
    let status = std::process::Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=duration=1:size=64x48:rate=10"])
        .args(["-c:v", "mpeg4", "-pix_fmt", "yuv420p"])
        .arg(&clip)
        .status()
        .unwrap();
    assert!(status.success());

    let full = SourceVideo::load(&SourceSettings {
        video_path: Some(clip.clone()),
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(full.len(), 10);
    assert!((full.frame_rate() - 10.0).abs() < 0.01);
    assert_eq!(full.original_file_name(), "clip.mp4");

    let capped = SourceVideo::load(&SourceSettings {
        video_path: Some(clip),
        test_run: true,
        test_run_frames_count: 3,
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(capped.len(), 3);
    assert_eq!(capped.dimensions(), (64, 48));
}

#[tokio::test]
async fn test_failed_decode_is_reported() {
    if !common::ffmpeg_available() {
        eprintln!("ffmpeg not found, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let info = ffmpeg::StreamInfo {
        width: 16,
        height: 16,
        fps: Some(25.0),
    };
    let mut decoder = ffmpeg::FrameDecoder::spawn(&dir.path().join("gone.mp4"), &info).unwrap();
    assert!(decoder.next_frame().await.unwrap().is_none());
    let err = decoder.finish(false).await.unwrap_err();
    assert!(err.to_string().contains("gone.mp4"), "{:#}", err);
}

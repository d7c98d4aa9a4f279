mod common;

use std::path::PathBuf;

use image::{Rgb, RgbImage};
use video_veil::config::SourceSettings;
use video_veil::error::VeilError;
use video_veil::veil::frame_store::{SourceKind, SourceVideo};

fn directory_source(dir: PathBuf) -> SourceSettings {
    SourceSettings {
        use_images_directory: true,
        directory_path: Some(dir),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_directory_frames_sorted_by_name() {
    let dir = tempfile::tempdir().unwrap();
    // written out of order on purpose
    for (name, index) in [("c.png", 2), ("a.png", 0), ("b.jpg", 1)] {
        RgbImage::from_pixel(64, 64, common::frame_color(index))
            .save(dir.path().join(name))
            .unwrap();
    }

    let video = SourceVideo::load(&directory_source(dir.path().to_path_buf()))
        .await
        .unwrap();

    assert_eq!(video.len(), 3);
    assert_eq!(video.kind(), SourceKind::ImageDirectory);
    assert_eq!(video.dimensions(), (64, 64));
    assert_eq!(video.frame_rate(), 30.0);
    assert!(!video.is_test_run());
    assert_eq!(video.frames()[0].pixels().len(), 64 * 64 * 3);
    // png frames are lossless; the jpg one only roughly keeps its color
    assert_eq!(video.frames()[0].image().get_pixel(5, 5), &common::frame_color(0));
    assert_eq!(video.frames()[2].image().get_pixel(5, 5), &common::frame_color(2));
    assert!(video.frames().iter().all(|f| f.transformed().is_none()));
}

#[tokio::test]
async fn test_test_run_caps_frames() {
    let dir = tempfile::tempdir().unwrap();
    common::write_frames(dir.path(), 5, 32, 16);

    let mut settings = directory_source(dir.path().to_path_buf());
    settings.test_run = true;
    settings.test_run_frames_count = 2;
    let video = SourceVideo::load(&settings).await.unwrap();

    assert_eq!(video.len(), 2);
    assert!(video.is_test_run());
    assert_eq!(video.dimensions(), (32, 16));
}

#[tokio::test]
async fn test_non_image_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    common::write_frames(dir.path(), 2, 16, 16);
    std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();
    std::fs::create_dir(dir.path().join("nested.png")).unwrap();
    RgbImage::from_pixel(16, 16, Rgb([1, 2, 3]))
        .save(dir.path().join("UPPER.PNG"))
        .unwrap();

    let video = SourceVideo::load(&directory_source(dir.path().to_path_buf()))
        .await
        .unwrap();
    assert_eq!(video.len(), 3);
}

#[tokio::test]
async fn test_empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.md"), "# nothing").unwrap();

    let err = SourceVideo::load(&directory_source(dir.path().to_path_buf()))
        .await
        .err()
        .expect("empty directory should fail");
    assert!(matches!(
        err.downcast_ref::<VeilError>(),
        Some(VeilError::EmptySource { kind: SourceKind::ImageDirectory, .. })
    ));
}

#[tokio::test]
async fn test_missing_source_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    let err = SourceVideo::load(&directory_source(missing.clone()))
        .await
        .err()
        .expect("missing directory should fail");
    assert!(matches!(
        err.downcast_ref::<VeilError>(),
        Some(VeilError::SourceNotFound { kind: SourceKind::ImageDirectory, .. })
    ));
    assert!(err.to_string().starts_with("Directory not found"));

    let video_settings = SourceSettings {
        video_path: Some(missing),
        ..Default::default()
    };
    let err = SourceVideo::load(&video_settings).await.err().unwrap();
    assert!(err.to_string().starts_with("Video not found"));
}

#[tokio::test]
async fn test_lenient_open_yields_empty_source() {
    let dir = tempfile::tempdir().unwrap();
    let video = SourceVideo::open(&directory_source(dir.path().join("nope")), false)
        .await
        .unwrap();
    assert!(video.is_empty());
    assert_eq!(video.dimensions(), (0, 0));
}

#[tokio::test]
async fn test_probe_reports_frame_size() {
    let dir = tempfile::tempdir().unwrap();
    common::write_frames(dir.path(), 3, 48, 32);

    let probe = video_veil::veil::probe(&directory_source(dir.path().to_path_buf()))
        .await
        .unwrap();
    assert!(probe.is_valid());
    assert_eq!(probe.message, "Video Frames found: 48x32px");

    let bad = video_veil::veil::probe(&directory_source(dir.path().join("missing")))
        .await
        .unwrap();
    assert!(!bad.is_valid());
    assert_eq!(bad.message, "Invalid source, unable to parse video frames from input.");
}

// SYNOID Video Veil Video Assembler
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Muxes transformed frames back into an H.264 mp4 next to the other img2img
// outputs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::veil::ffmpeg::{EncodeSettings, FrameEncoder};
use crate::veil::frame_store::SourceVideo;

pub const OUTPUT_SUBDIR: &str = "video-veil-output";

pub struct VideoAssembler {
    output_dir: PathBuf,
    encoder: String,
}

/// `<UTC timestamp>-<seed>-<name>`
pub fn output_file_name(timestamp: DateTime<Utc>, seed: u64, name: &str) -> String {
    format!("{}-{}-{}", timestamp.format("%Y-%m-%dT%H-%M-%S"), seed, name)
}

/// Lanczos3-resize a frame onto the `width`x`height` canvas. Frames that
/// already match are passed through untouched.
pub fn fit_to_canvas(image: &RgbImage, width: u32, height: u32) -> Cow<'_, RgbImage> {
    if image.dimensions() == (width, height) {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(imageops::resize(image, width, height, FilterType::Lanczos3))
    }
}

impl VideoAssembler {
    pub fn new(output_dir: impl Into<PathBuf>, encoder: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            encoder: encoder.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the video. Test runs produce nothing and return `None`.
    pub async fn assemble(&self, video: &mut SourceVideo, seed: u64) -> Result<Option<PathBuf>> {
        if video.is_test_run() {
            info!("[ASSEMBLE] Test run, skipping video output");
            return Ok(None);
        }

        let images = video.transformed_images();
        if images.is_empty() {
            warn!("[ASSEMBLE] No transformed frames to write");
            return Ok(None);
        }

        let dir = self.output_dir.join(OUTPUT_SUBDIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Creating output directory {:?}", dir))?;
        let output = dir.join(output_file_name(Utc::now(), seed, &video.original_file_name()));

        let (width, height) = video.dimensions();
        let settings = EncodeSettings {
            width,
            height,
            fps: video.frame_rate(),
            encoder: self.encoder.clone(),
        };
        info!(
            "[ASSEMBLE] Writing {} frames at {:.3} fps ({}x{}, {}) to {:?}",
            images.len(),
            settings.fps,
            width,
            height,
            settings.encoder,
            output
        );

        let mut encoder = FrameEncoder::spawn(&output, &settings)?;
        for image in &images {
            encoder.write_frame(&fit_to_canvas(image, width, height)).await?;
        }
        let path = encoder.finish().await?;

        info!("[ASSEMBLE] Video saved: {:?}", path);
        video.set_output_path(path.clone());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_output_file_name() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            output_file_name(ts, 1234, "clip.mp4"),
            "2024-03-09T07-05-01-1234-clip.mp4"
        );
    }

    #[test]
    fn test_fit_to_canvas_passes_matching_frames_through() {
        let image = RgbImage::from_fn(6, 4, |x, y| image::Rgb([x as u8 * 40, y as u8 * 60, 7]));
        let fitted = fit_to_canvas(&image, 6, 4);
        assert!(matches!(fitted, Cow::Borrowed(_)));
        assert_eq!(*fitted, image);
    }

    #[test]
    fn test_fit_to_canvas_resizes_other_sizes() {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([200, 100, 50]));
        let fitted = fit_to_canvas(&image, 4, 6);
        assert!(matches!(fitted, Cow::Owned(_)));
        assert_eq!(fitted.dimensions(), (4, 6));
        // a flat frame stays flat through Lanczos3
        for pixel in fitted.pixels() {
            for (got, want) in pixel.0.iter().zip([200u8, 100, 50]) {
                assert!((*got as i16 - want as i16).abs() <= 1, "{:?}", pixel);
            }
        }
    }
}

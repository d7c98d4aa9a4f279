// SYNOID Video Veil Frame Store
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Decodes a source video (through ffmpeg) or a directory of stills into an
// ordered list of RGB frames. Frames live here until the assembler has
// written the output video.

use anyhow::{Context, Result};
use image::RgbImage;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::SourceSettings;
use crate::error::VeilError;
use crate::veil::ffmpeg::{self, FrameDecoder};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    VideoFile,
    ImageDirectory,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::VideoFile => f.write_str("Video"),
            SourceKind::ImageDirectory => f.write_str("Directory"),
        }
    }
}

/// One frame of source footage and, once processed, its transformed image.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    transformed: Option<RgbImage>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            transformed: None,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Packed H x W x 3 pixel buffer.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn transformed(&self) -> Option<&RgbImage> {
        self.transformed.as_ref()
    }

    /// Attach the generated image. Each frame is written at most once per run.
    pub fn set_transformed(&mut self, index: usize, image: RgbImage) -> Result<(), VeilError> {
        if self.transformed.is_some() {
            return Err(VeilError::FrameAlreadyTransformed(index));
        }
        self.transformed = Some(image);
        Ok(())
    }
}

pub struct SourceVideo {
    frames: Vec<Frame>,
    kind: SourceKind,
    path: PathBuf,
    frame_cap: Option<usize>,
    width: u32,
    height: u32,
    fps: Option<f64>,
    output_path: Option<PathBuf>,
}

impl SourceVideo {
    /// Load every frame, failing on a missing or empty source.
    pub async fn load(settings: &SourceSettings) -> Result<Self> {
        Self::open(settings, true).await
    }

    /// With `strict = false` an unusable source yields an empty `SourceVideo`
    /// instead of an error (used for previews).
    pub async fn open(settings: &SourceSettings, strict: bool) -> Result<Self> {
        let kind = settings.kind();
        let mut source = Self {
            frames: Vec::new(),
            kind,
            path: settings.path().map(Path::to_path_buf).unwrap_or_default(),
            frame_cap: settings.frame_cap(),
            width: 0,
            height: 0,
            fps: None,
            output_path: None,
        };
        info!("[FRAMES] {} source: {:?}", kind, source.path);

        let loaded = match settings.path().filter(|p| p.exists()) {
            None => Err(VeilError::SourceNotFound {
                kind,
                path: source.path.clone(),
            }
            .into()),
            Some(_) => match kind {
                SourceKind::ImageDirectory => source.load_frames_from_folder(),
                SourceKind::VideoFile => source.load_frames_from_video().await,
            },
        };

        match loaded {
            Ok(()) => {}
            Err(e) if strict => return Err(e),
            Err(e) => {
                warn!("[FRAMES] Ignoring unusable source: {:#}", e);
                source.frames.clear();
            }
        }

        source.set_video_dimensions();
        info!(
            "[FRAMES] Loaded {} frames ({}x{})",
            source.frames.len(),
            source.width,
            source.height
        );
        Ok(source)
    }

    fn cap_reached(&self) -> bool {
        self.frame_cap.map_or(false, |cap| self.frames.len() >= cap)
    }

    /// Image files directly inside `dir`, sorted by file name.
    pub fn list_image_files(dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| {
                        IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                    })
            })
            .collect()
    }

    fn load_frames_from_folder(&mut self) -> Result<()> {
        let image_paths = Self::list_image_files(&self.path);
        if image_paths.is_empty() {
            return Err(VeilError::EmptySource {
                kind: self.kind,
                path: self.path.clone(),
            }
            .into());
        }

        for image_path in image_paths {
            if self.cap_reached() {
                break;
            }
            let image = image::open(&image_path)
                .with_context(|| format!("Opening frame {:?}", image_path))?
                .to_rgb8();
            self.frames.push(Frame::new(image));
        }
        Ok(())
    }

    async fn load_frames_from_video(&mut self) -> Result<()> {
        let info = ffmpeg::probe_stream(&self.path).await?;
        if let Some(info) = info {
            self.fps = info.fps;
            if !self.cap_reached() {
                let mut decoder = FrameDecoder::spawn(&self.path, &info)?;
                let mut early = false;
                while let Some(image) = decoder.next_frame().await? {
                    self.frames.push(Frame::new(image));
                    if self.cap_reached() {
                        early = true;
                        break;
                    }
                }
                decoder.finish(early).await?;
            }
        }

        if self.frames.is_empty() && !self.cap_reached() {
            return Err(VeilError::EmptySource {
                kind: self.kind,
                path: self.path.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn set_video_dimensions(&mut self) {
        let (width, height) = self
            .frames
            .first()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0));
        self.width = width;
        self.height = height;
    }

    /// Build directly from decoded images (no provenance on disk).
    pub fn from_frames(kind: SourceKind, path: PathBuf, images: Vec<RgbImage>, fps: Option<f64>) -> Self {
        let mut source = Self {
            frames: images.into_iter().map(Frame::new).collect(),
            kind,
            path,
            frame_cap: None,
            width: 0,
            height: 0,
            fps,
            output_path: None,
        };
        source.set_video_dimensions();
        source
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Container frame rate, or 30 for directories and unknown rates.
    pub fn frame_rate(&self) -> f64 {
        self.fps.unwrap_or(DEFAULT_FPS)
    }

    /// Test runs are frame-capped previews that never produce a video.
    pub fn is_test_run(&self) -> bool {
        self.frame_cap.is_some()
    }

    /// Name the output video is derived from.
    pub fn original_file_name(&self) -> String {
        let base = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        match self.kind {
            SourceKind::VideoFile => base,
            SourceKind::ImageDirectory => format!("{}.mp4", base),
        }
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn set_output_path(&mut self, path: PathBuf) {
        self.output_path = Some(path);
    }

    /// Transformed images of the frames processed so far, in order.
    pub fn transformed_images(&self) -> Vec<RgbImage> {
        self.frames
            .iter()
            .filter_map(|f| f.transformed().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_frame_is_write_once() {
        let mut frame = Frame::new(RgbImage::new(4, 2));
        assert_eq!(frame.pixels().len(), 4 * 2 * 3);
        frame.set_transformed(0, RgbImage::new(4, 2)).unwrap();
        let err = frame.set_transformed(0, RgbImage::new(4, 2)).unwrap_err();
        assert!(matches!(err, VeilError::FrameAlreadyTransformed(0)));
    }

    #[test]
    fn test_original_file_name() {
        let video = SourceVideo::from_frames(SourceKind::VideoFile, PathBuf::from("/in/clip.mp4"), vec![], None);
        assert_eq!(video.original_file_name(), "clip.mp4");
        assert_eq!(video.dimensions(), (0, 0));
        assert_eq!(video.frame_rate(), DEFAULT_FPS);

        let dir = SourceVideo::from_frames(
            SourceKind::ImageDirectory,
            PathBuf::from("/in/frames"),
            vec![RgbImage::from_pixel(8, 6, Rgb([1, 2, 3]))],
            Some(24.0),
        );
        assert_eq!(dir.original_file_name(), "frames.mp4");
        assert_eq!(dir.dimensions(), (8, 6));
        assert_eq!(dir.frame_rate(), 24.0);
    }
}

// SYNOID Video Veil Errors
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use std::path::PathBuf;

use crate::veil::frame_store::SourceKind;

/// Domain errors surfaced by the frame pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VeilError {
    #[error("{} not found: '{}'", .kind, .path.display())]
    SourceNotFound { kind: SourceKind, path: PathBuf },
    #[error("No usable frames (*.png, *.jpg, *.jpeg) found in {} '{}'", .kind, .path.display())]
    EmptySource { kind: SourceKind, path: PathBuf },
    #[error("Frame {0} already has a transformed image")]
    FrameAlreadyTransformed(usize),
    #[error("Pipeline returned no image for frame {0}")]
    EmptyResult(usize),
    #[error("FFmpeg failed: {0}")]
    Ffmpeg(String),
}

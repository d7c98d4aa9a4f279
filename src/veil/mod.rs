// SYNOID Video Veil
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Frame-consistent video-to-video pipeline: frames in, noise-inverted img2img
// per frame, video out.

pub mod color_correction;
pub mod ffmpeg;
pub mod frame_store;
pub mod job_runner;
pub mod noise_inverter;
pub mod request;
pub mod sampling;
pub mod script;
pub mod video_assembler;

pub use frame_store::{Frame, SourceKind, SourceVideo};
pub use job_runner::{FrameJobRunner, RunOutcome, RunState};
pub use noise_inverter::NoiseInverter;
pub use request::{ImagePipeline, Processed, ProcessingRequest};
pub use sampling::{InversionPrompts, SamplingStrategy};
pub use script::{probe, SourceProbe, VeilOutcome, VideoVeil};
pub use video_assembler::VideoAssembler;

// SYNOID Video Veil Script Driver
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Top-level entry: load the source, run every frame through the pipeline,
// assemble the result. Without a source it behaves like plain img2img.

use anyhow::Result;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::info;

use crate::config::{SourceSettings, VeilConfig};
use crate::state::RunContext;
use crate::veil::frame_store::SourceVideo;
use crate::veil::job_runner::{FrameJobRunner, RunOutcome, RunState};
use crate::veil::request::{ImagePipeline, ProcessingRequest};
use crate::veil::sampling::{InversionPrompts, SamplingStrategy};
use crate::veil::video_assembler::VideoAssembler;

pub const INVALID_SOURCE_MESSAGE: &str = "Invalid source, unable to parse video frames from input.";

#[derive(Debug)]
pub struct VeilOutcome {
    pub images: Vec<RgbImage>,
    pub seed: u64,
    pub output_path: Option<PathBuf>,
    pub state: RunState,
}

/// Result of previewing a source without running anything.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProbe {
    pub width: u32,
    pub height: u32,
    pub message: String,
}

impl SourceProbe {
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Load the first frame leniently and report its size.
pub async fn probe(source: &SourceSettings) -> Result<SourceProbe> {
    let mut preview = source.clone();
    preview.test_run = true;
    preview.test_run_frames_count = 1;
    let video = SourceVideo::open(&preview, false).await?;
    let (width, height) = video.dimensions();
    let message = if video.is_empty() {
        INVALID_SOURCE_MESSAGE.to_string()
    } else {
        format!("Video Frames found: {}x{}px", width, height)
    };
    Ok(SourceProbe {
        width,
        height,
        message,
    })
}

/// Run synchronous frame work without stalling the runtime's other tasks.
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

pub struct VideoVeil<P: ImagePipeline> {
    pipeline: P,
    ctx: Arc<RunContext>,
    assembler: VideoAssembler,
}

impl<P: ImagePipeline> VideoVeil<P> {
    pub fn new(pipeline: P, ctx: Arc<RunContext>, assembler: VideoAssembler) -> Self {
        Self {
            pipeline,
            ctx,
            assembler,
        }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&mut self, config: &VeilConfig, base: ProcessingRequest) -> Result<VeilOutcome> {
        let mut base = base;
        let seed = base.settings.fix_seed();

        if !config.source.is_enabled() {
            info!("[VEIL] No source given, processing a single image");
            base.sampling = SamplingStrategy::Default;
            self.ctx.begin(base.settings.n_iter.max(1));
            let ctx = Arc::clone(&self.ctx);
            let pipeline = &mut self.pipeline;
            let processed = run_blocking(|| pipeline.process(&base, &ctx))?;
            return Ok(VeilOutcome {
                images: processed.images,
                seed: processed.seed,
                output_path: None,
                state: RunState::Completed,
            });
        }

        info!("[VEIL] use_images_directory: {}", config.source.use_images_directory);
        let mut video = SourceVideo::load(&config.source).await?;
        info!("[VEIL] color_correction: {}", config.color_correction);
        info!("[VEIL] test_run: {}", config.source.test_run);
        info!("[VEIL] test_run_frames_count: {}", config.source.test_run_frames_count);
        info!("[VEIL] # of frames: {}", video.len());

        if video.is_empty() {
            return Ok(VeilOutcome {
                images: Vec::new(),
                seed,
                output_path: None,
                state: RunState::Idle,
            });
        }

        self.ctx.begin(video.len() * base.settings.n_iter.max(1));

        let prompts = InversionPrompts {
            prompt: config.inversion.original_prompt.clone(),
            negative_prompt: config.inversion.original_negative_prompt.clone(),
            cfg_scale: config.inversion.decode_cfg_scale,
        };
        let ctx = Arc::clone(&self.ctx);
        let pipeline = &mut self.pipeline;
        let outcome: RunOutcome = run_blocking(|| {
            FrameJobRunner::new(pipeline, &ctx, prompts).run(&mut video, &base, config.color_correction)
        })?;

        let output_path = self.assembler.assemble(&mut video, outcome.seed).await?;
        Ok(VeilOutcome {
            images: outcome.images,
            seed: outcome.seed,
            output_path,
            state: outcome.state,
        })
    }
}

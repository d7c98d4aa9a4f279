// SYNOID Video Veil Frame Job Runner
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Drives the img2img pipeline over every frame in order. Each frame gets a
// fresh copy of the base request with noise inversion installed, its own
// init/control image and a color-correction reference.

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::config::ColorCorrectionMode;
use crate::diffusion::euler::SAMPLER_NAME;
use crate::error::VeilError;
use crate::state::RunContext;
use crate::veil::color_correction::ColorCorrection;
use crate::veil::frame_store::SourceVideo;
use crate::veil::request::{ImagePipeline, ProcessingRequest};
use crate::veil::sampling::{InversionPrompts, SamplingStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug)]
pub struct RunOutcome {
    /// Transformed frames in source order.
    pub images: Vec<RgbImage>,
    pub seed: u64,
    pub state: RunState,
    pub processed: usize,
}

pub struct FrameJobRunner<'a, P: ImagePipeline + ?Sized> {
    pipeline: &'a mut P,
    ctx: &'a RunContext,
    prompts: InversionPrompts,
    state: RunState,
}

/// Reference image for a frame under the given policy.
pub fn color_reference<'f>(
    mode: ColorCorrectionMode,
    current: &'f RgbImage,
    previous_transformed: Option<&'f RgbImage>,
) -> Option<&'f RgbImage> {
    match mode {
        ColorCorrectionMode::None => None,
        ColorCorrectionMode::FromSourceVideo => Some(current),
        ColorCorrectionMode::FromGeneratedImage => previous_transformed,
    }
}

impl<'a, P: ImagePipeline + ?Sized> FrameJobRunner<'a, P> {
    pub fn new(pipeline: &'a mut P, ctx: &'a RunContext, prompts: InversionPrompts) -> Self {
        Self {
            pipeline,
            ctx,
            prompts,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Per-frame request: base settings with noise inversion installed.
    fn frame_request(
        &self,
        base: &ProcessingRequest,
        frame: &RgbImage,
        reference: Option<&RgbImage>,
    ) -> ProcessingRequest {
        let mut request = base.clone();
        request.settings.batch_size = 1;
        request.settings.sampler_name = SAMPLER_NAME.to_string();
        request.sampling = SamplingStrategy::NoiseInverted(self.prompts.clone());
        request.control_image = Some(frame.clone());
        request.init_images = vec![frame.clone()];
        request.color_corrections = reference.map(ColorCorrection::from_image);
        request
    }

    pub fn run(
        &mut self,
        video: &mut SourceVideo,
        base: &ProcessingRequest,
        color_correction: ColorCorrectionMode,
    ) -> Result<RunOutcome> {
        self.state = RunState::Running;
        let total = video.len();
        let mut seed = base.settings.seed.max(0) as u64;
        let mut processed = 0;
        info!(
            "[RUNNER] {} frames, color correction: {}",
            total, color_correction
        );

        for index in 0..total {
            self.ctx.take_skipped();
            if self.ctx.is_interrupted() {
                warn!("[RUNNER] Interrupted after {} of {} frames", processed, total);
                self.state = RunState::Cancelled;
                break;
            }

            let label = format!("{} out of {}", self.ctx.job_no() + 1, self.ctx.job_count());
            self.ctx.set_job_label(label.clone());
            debug!("[RUNNER] Frame {}: {}", index, label);

            let request = {
                let frames = video.frames();
                let previous = index
                    .checked_sub(1)
                    .and_then(|i| frames[i].transformed());
                let current = frames[index].image();
                let reference = color_reference(color_correction, current, previous);
                self.frame_request(base, current, reference)
            };

            let result = self
                .pipeline
                .process(&request, self.ctx)
                .with_context(|| format!("Processing frame {}", index))?;
            drop(request);

            let image = result
                .images
                .into_iter()
                .next()
                .ok_or(VeilError::EmptyResult(index))?;
            video.frames_mut()[index].set_transformed(index, image)?;
            seed = result.seed;
            processed += 1;
        }

        if self.state == RunState::Running {
            self.state = RunState::Completed;
        }
        info!("[RUNNER] {:?}: {} frames processed", self.state, processed);

        Ok(RunOutcome {
            images: video.transformed_images(),
            seed,
            state: self.state,
            processed,
        })
    }
}

// SYNOID Video Veil Processing Request
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use image::RgbImage;

use crate::config::GenerationSettings;
use crate::state::RunContext;
use crate::veil::color_correction::ColorCorrection;
use crate::veil::sampling::SamplingStrategy;

/// One img2img job: the base settings plus per-frame inputs.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub settings: GenerationSettings,
    pub init_images: Vec<RgbImage>,
    /// Auxiliary image for control-style extensions.
    pub control_image: Option<RgbImage>,
    pub color_corrections: Option<ColorCorrection>,
    pub sampling: SamplingStrategy,
}

impl ProcessingRequest {
    pub fn new(settings: GenerationSettings) -> Self {
        Self {
            settings,
            init_images: Vec::new(),
            control_image: None,
            color_corrections: None,
            sampling: SamplingStrategy::Default,
        }
    }
}

/// Result of a pipeline invocation.
#[derive(Debug, Clone)]
pub struct Processed {
    pub images: Vec<RgbImage>,
    pub seed: u64,
}

/// Host image-to-image pipeline.
pub trait ImagePipeline {
    fn process(&mut self, request: &ProcessingRequest, ctx: &RunContext) -> anyhow::Result<Processed>;
}

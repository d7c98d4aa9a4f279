// SYNOID Video Veil Sampling Strategy
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// How a request seeds its sampler. Hosts ask the strategy for an initial
// noise override before sampling; `Default` leaves their own seeded noise.

use candle_core::{DType, Result, Tensor};

use crate::diffusion::model::DiffusionModel;
use crate::state::RunContext;
use crate::veil::noise_inverter::NoiseInverter;

/// Prompts describing the source footage, used only for inversion.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionPrompts {
    pub prompt: String,
    pub negative_prompt: String,
    pub cfg_scale: f64,
}

impl Default for InversionPrompts {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            cfg_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SamplingStrategy {
    #[default]
    Default,
    NoiseInverted(InversionPrompts),
}

/// Latent-space inputs the host has prepared for one sample.
pub struct SampleInputs<'a> {
    pub init_latent: &'a Tensor,
    pub image_conditioning: Option<&'a Tensor>,
    pub steps: usize,
}

impl SamplingStrategy {
    /// Noise to start sampling from, scaled so that the host's
    /// `init_latent + noise * sigma_max` reproduces the inverted latent.
    pub fn initial_noise<M: DiffusionModel + ?Sized>(
        &self,
        model: &M,
        inputs: &SampleInputs<'_>,
        ctx: &RunContext,
    ) -> Result<Option<Tensor>> {
        let prompts = match self {
            SamplingStrategy::Default => return Ok(None),
            SamplingStrategy::NoiseInverted(prompts) => prompts,
        };

        ctx.add_jobs(1);

        let cond = model.learned_conditioning(&prompts.prompt)?;
        let uncond = model.learned_conditioning(&prompts.negative_prompt)?;
        let batch = inputs.init_latent.dim(0)?;
        let (cond, uncond) = if batch > 1 {
            (cond.repeat((batch, 1, 1))?, uncond.repeat((batch, 1, 1))?)
        } else {
            (cond, uncond)
        };

        let rec_noise = NoiseInverter::new(prompts.cfg_scale, inputs.steps).invert(
            model,
            inputs.init_latent,
            &cond,
            &uncond,
            inputs.image_conditioning,
            ctx,
        )?;

        let sigma_max: f64 = model
            .get_sigmas(inputs.steps)?
            .to_dtype(DType::F64)?
            .get(0)?
            .to_scalar()?;
        let noise = rec_noise.sub(&inputs.init_latent.affine(1.0 / sigma_max, 0.0)?)?;
        Ok(Some(noise))
    }
}

// SYNOID Video Veil Euler Sampler
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// First-order Euler img2img sampling over any `DiffusionModel`, with
// classifier-free guidance. Used by the bundled Stable Diffusion host.

use candle_core::{Result, Tensor};
use tracing::debug;

use crate::diffusion::model::{append_dims, full_like_batch, Conditioning, DiffusionModel, Parameterization};
use crate::state::RunContext;

pub const SAMPLER_NAME: &str = "Euler";

pub struct EulerSampler {
    pub steps: usize,
    pub cfg_scale: f64,
    pub denoising_strength: f64,
}

impl EulerSampler {
    pub fn new(steps: usize, cfg_scale: f64, denoising_strength: f64) -> Self {
        Self {
            steps,
            cfg_scale,
            denoising_strength,
        }
    }

    /// Number of schedule steps actually run for the configured strength.
    pub fn encode_steps(&self) -> usize {
        (self.denoising_strength.min(0.999) * self.steps as f64) as usize
    }

    /// Tail of the full schedule that img2img runs over.
    pub fn img2img_sigmas(&self, sigmas: &[f64]) -> Vec<f64> {
        let t_enc = self.encode_steps();
        let start = self.steps.saturating_sub(t_enc + 1).min(sigmas.len().saturating_sub(1));
        sigmas[start..].to_vec()
    }

    /// Noise `init_latent` to the first sigma of the img2img tail and run Euler
    /// steps down to zero.
    #[allow(clippy::too_many_arguments)]
    pub fn sample_img2img<M: DiffusionModel + ?Sized>(
        &self,
        model: &M,
        init_latent: &Tensor,
        noise: &Tensor,
        cond: &Tensor,
        uncond: &Tensor,
        image_conditioning: Option<&Tensor>,
        ctx: &RunContext,
    ) -> Result<Tensor> {
        let sigmas: Vec<f64> = model.get_sigmas(self.steps)?.to_dtype(candle_core::DType::F64)?.to_vec1()?;
        let sched = self.img2img_sigmas(&sigmas);
        if sched.len() < 2 {
            return Ok(init_latent.clone());
        }

        let mut x = init_latent.add(&noise.affine(sched[0], 0.0)?)?;
        let cond_in = Conditioning {
            crossattn: Tensor::cat(&[cond, uncond], 0)?,
            concat: image_conditioning
                .map(|c| Tensor::cat(&[c, c], 0))
                .transpose()?,
        };

        ctx.set_sampling_steps(sched.len() - 1);
        for i in 0..sched.len() - 1 {
            let denoised = self.denoise(model, &x, sched[i], &cond_in)?;
            let d = x.sub(&denoised)?.affine(1.0 / sched[i], 0.0)?;
            x = x.add(&d.affine(sched[i + 1] - sched[i], 0.0)?)?;
            ctx.advance_sampling_step();
            ctx.store_latent(&x);
            debug!("[EULER] step {}/{} sigma={:.4}", i + 1, sched.len() - 1, sched[i]);
        }
        Ok(x)
    }

    /// CFG-combined denoised estimate at `sigma`. `cond_in` holds the
    /// conditional half first.
    fn denoise<M: DiffusionModel + ?Sized>(
        &self,
        model: &M,
        x: &Tensor,
        sigma: f64,
        cond_in: &Conditioning,
    ) -> Result<Tensor> {
        let batch = x.dim(0)?;
        let x_in = Tensor::cat(&[x, x], 0)?;
        let sigma_in = full_like_batch(sigma, 2 * batch, x)?;
        let skip = model.parameterization().scaling_skip();
        let scalings = model.get_scalings(&sigma_in)?;
        let c_out = append_dims(&scalings[skip], x_in.rank())?;
        let c_in = append_dims(&scalings[skip + 1], x_in.rank())?;
        let t = model.sigma_to_t(&sigma_in)?;

        let out = model.apply_model(&x_in.broadcast_mul(&c_in)?, &t, cond_in)?;
        let denoised = match model.parameterization() {
            Parameterization::Epsilon => x_in.add(&out.broadcast_mul(&c_out)?)?,
            Parameterization::Velocity => {
                let c_skip = append_dims(&scalings[0], x_in.rank())?;
                x_in.broadcast_mul(&c_skip)?.add(&out.broadcast_mul(&c_out)?)?
            }
        };

        let halves = denoised.chunk(2, 0)?;
        let (cond_half, uncond_half) = (&halves[0], &halves[1]);
        uncond_half.add(&cond_half.sub(uncond_half)?.affine(self.cfg_scale, 0.0)?)
    }
}

// SYNOID Video Veil Noise Inverter
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Runs the sampler backwards over a source latent, walking sigmas up from
// zero to sigma_max, and returns the unit-variance noise that would have
// produced it. Deterministic: no random draws anywhere.

use candle_core::{bail, DType, Result, Tensor};
use tracing::{debug, info};

use crate::diffusion::model::{append_dims, full_like_batch, Conditioning, DiffusionModel};
use crate::state::RunContext;

pub struct NoiseInverter {
    pub guidance_scale: f64,
    pub steps: usize,
}

impl NoiseInverter {
    pub fn new(guidance_scale: f64, steps: usize) -> Self {
        Self {
            guidance_scale,
            steps,
        }
    }

    /// Invert `init_latent` under the given conditioning. `cond` and `uncond`
    /// are batch-aligned with `init_latent`.
    pub fn invert<M: DiffusionModel + ?Sized>(
        &self,
        model: &M,
        init_latent: &Tensor,
        cond: &Tensor,
        uncond: &Tensor,
        image_conditioning: Option<&Tensor>,
        ctx: &RunContext,
    ) -> Result<Tensor> {
        if self.steps == 0 {
            bail!("noise inversion needs at least one step");
        }

        let mut sigmas: Vec<f64> = model
            .get_sigmas(self.steps)?
            .to_dtype(DType::F64)?
            .to_vec1()?;
        sigmas.reverse();
        if sigmas.len() != self.steps + 1 {
            bail!(
                "schedule for {} steps has {} sigmas",
                self.steps,
                sigmas.len()
            );
        }
        let skip = model.parameterization().scaling_skip();
        ctx.set_sampling_steps(self.steps);
        info!(
            "[INVERT] {} steps, guidance {:.2}, sigma_max {:.4}",
            self.steps, self.guidance_scale, sigmas[self.steps]
        );

        let cond_in = Conditioning {
            crossattn: Tensor::cat(&[uncond, cond], 0)?,
            concat: image_conditioning
                .map(|c| Tensor::cat(&[c, c], 0))
                .transpose()?,
        };

        let mut x = init_latent.clone();
        for i in 1..=self.steps {
            let batch = x.dim(0)?;
            let x_in = Tensor::cat(&[&x, &x], 0)?;
            let sigma_in = full_like_batch(sigmas[i - 1], 2 * batch, &x)?;

            let scalings = model.get_scalings(&sigma_in)?;
            let c_out = append_dims(&scalings[skip], x_in.rank())?;
            let c_in = append_dims(&scalings[skip + 1], x_in.rank())?;

            // sigma is 0 on the first step; query the model at the next one
            let t = if i == 1 {
                model.sigma_to_t(&full_like_batch(sigmas[1], 2 * batch, &x)?)?
            } else {
                model.sigma_to_t(&sigma_in)?
            };

            let eps = model.apply_model(&x_in.broadcast_mul(&c_in)?, &t, &cond_in)?;
            let halves = x_in.add(&eps.broadcast_mul(&c_out)?)?.chunk(2, 0)?;
            let (denoised_uncond, denoised_cond) = (&halves[0], &halves[1]);
            let denoised = denoised_uncond.add(
                &denoised_cond
                    .sub(denoised_uncond)?
                    .affine(self.guidance_scale, 0.0)?,
            )?;

            let divisor = if i == 1 { 2.0 * sigmas[1] } else { sigmas[i - 1] };
            let d = x.sub(&denoised)?.affine(1.0 / divisor, 0.0)?;
            x = x.add(&d.affine(sigmas[i] - sigmas[i - 1], 0.0)?)?;

            ctx.advance_sampling_step();
            ctx.store_latent(&x);
            debug!("[INVERT] step {}/{} sigma={:.4}", i, self.steps, sigmas[i]);
        }

        ctx.next_job();
        x.affine(1.0 / sigmas[self.steps], 0.0)
    }
}

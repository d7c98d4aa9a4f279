// SYNOID Video Veil Discrete Sigma Schedule
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Karras-style sigma view of a DDPM training schedule. Supplies the
// `get_sigmas` / `sigma_to_t` / `get_scalings` half of `DiffusionModel`
// for hosts wrapping a CompVis-style UNet.

use candle_core::{DType, Device, Result, Tensor};

use crate::diffusion::model::Parameterization;

/// Stable Diffusion 1.x / 2.x training schedule.
pub const SD_BETA_START: f64 = 0.00085;
pub const SD_BETA_END: f64 = 0.012;
pub const SD_TRAIN_STEPS: usize = 1000;

#[derive(Debug, Clone)]
pub struct DiscreteSchedule {
    sigmas: Vec<f64>,
    log_sigmas: Vec<f64>,
    parameterization: Parameterization,
    sigma_data: f64,
    device: Device,
}

impl DiscreteSchedule {
    /// Scaled-linear betas: `linspace(sqrt(start), sqrt(end), steps)^2`.
    pub fn scaled_linear(
        beta_start: f64,
        beta_end: f64,
        train_steps: usize,
        parameterization: Parameterization,
        device: &Device,
    ) -> Self {
        let (lo, hi) = (beta_start.sqrt(), beta_end.sqrt());
        let denom = (train_steps.max(2) - 1) as f64;
        let mut alpha_cumprod = 1.0;
        let alphas_cumprod: Vec<f64> = (0..train_steps)
            .map(|i| {
                let beta = (lo + (hi - lo) * i as f64 / denom).powi(2);
                alpha_cumprod *= 1.0 - beta;
                alpha_cumprod
            })
            .collect();
        Self::from_alphas_cumprod(&alphas_cumprod, parameterization, device)
    }

    pub fn stable_diffusion(parameterization: Parameterization, device: &Device) -> Self {
        Self::scaled_linear(SD_BETA_START, SD_BETA_END, SD_TRAIN_STEPS, parameterization, device)
    }

    pub fn from_alphas_cumprod(
        alphas_cumprod: &[f64],
        parameterization: Parameterization,
        device: &Device,
    ) -> Self {
        let sigmas: Vec<f64> = alphas_cumprod
            .iter()
            .map(|a| ((1.0 - a) / a).sqrt())
            .collect();
        let log_sigmas = sigmas.iter().map(|s| s.ln()).collect();
        Self {
            sigmas,
            log_sigmas,
            parameterization,
            sigma_data: 1.0,
            device: device.clone(),
        }
    }

    pub fn parameterization(&self) -> Parameterization {
        self.parameterization
    }

    pub fn sigma_min(&self) -> f64 {
        self.sigmas.first().copied().unwrap_or(0.0)
    }

    pub fn sigma_max(&self) -> f64 {
        self.sigmas.last().copied().unwrap_or(0.0)
    }

    /// Interpolate log-sigma at a fractional training timestep.
    pub fn t_to_sigma_scalar(&self, t: f64) -> f64 {
        let last = self.log_sigmas.len().saturating_sub(1);
        let t = t.clamp(0.0, last as f64);
        let low = t.floor() as usize;
        let high = (t.ceil() as usize).min(last);
        let w = t - low as f64;
        ((1.0 - w) * self.log_sigmas[low] + w * self.log_sigmas[high]).exp()
    }

    /// Inverse of `t_to_sigma_scalar`; sigma 0 maps to t 0.
    pub fn sigma_to_t_scalar(&self, sigma: f64) -> f64 {
        let n = self.log_sigmas.len();
        if n < 2 {
            return 0.0;
        }
        let log_sigma = sigma.ln();
        let low_idx = self
            .log_sigmas
            .iter()
            .rposition(|ls| log_sigma >= *ls)
            .unwrap_or(0)
            .min(n - 2);
        let high_idx = low_idx + 1;
        let (low, high) = (self.log_sigmas[low_idx], self.log_sigmas[high_idx]);
        let w = ((low - log_sigma) / (low - high)).clamp(0.0, 1.0);
        (1.0 - w) * low_idx as f64 + w * high_idx as f64
    }

    /// `steps + 1` sigmas, evenly spaced in timestep, ending in zero.
    pub fn sigmas_vec(&self, steps: usize) -> Vec<f64> {
        let t_max = (self.sigmas.len().saturating_sub(1)) as f64;
        let mut out: Vec<f64> = match steps {
            0 => Vec::new(),
            1 => vec![self.t_to_sigma_scalar(t_max)],
            _ => (0..steps)
                .map(|i| {
                    let t = t_max - t_max * i as f64 / (steps - 1) as f64;
                    self.t_to_sigma_scalar(t)
                })
                .collect(),
        };
        out.push(0.0);
        out
    }

    pub fn get_sigmas(&self, steps: usize) -> Result<Tensor> {
        let sigmas = self.sigmas_vec(steps);
        let len = sigmas.len();
        Tensor::from_vec(sigmas, len, &self.device)?.to_dtype(DType::F32)
    }

    pub fn sigma_to_t(&self, sigma: &Tensor) -> Result<Tensor> {
        let values: Vec<f64> = sigma.to_dtype(DType::F64)?.flatten_all()?.to_vec1()?;
        let ts: Vec<f64> = values.iter().map(|s| self.sigma_to_t_scalar(*s)).collect();
        Tensor::from_vec(ts, sigma.dims(), sigma.device())?.to_dtype(sigma.dtype())
    }

    pub fn get_scalings(&self, sigma: &Tensor) -> Result<Vec<Tensor>> {
        let sd2 = self.sigma_data * self.sigma_data;
        // 1 / sqrt(sigma^2 + sigma_data^2)
        let c_in = sigma.sqr()?.affine(1.0, sd2)?.sqrt()?.recip()?;
        match self.parameterization {
            Parameterization::Epsilon => {
                let c_out = sigma.neg()?;
                Ok(vec![c_out, c_in])
            }
            Parameterization::Velocity => {
                let c_skip = sigma.sqr()?.affine(1.0, sd2)?.recip()?.affine(sd2, 0.0)?;
                let c_out = sigma.neg()?.mul(&c_in)?.affine(self.sigma_data, 0.0)?;
                Ok(vec![c_skip, c_out, c_in])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(p: Parameterization) -> DiscreteSchedule {
        DiscreteSchedule::stable_diffusion(p, &Device::Cpu)
    }

    #[test]
    fn test_sigmas_decreasing_and_terminated() {
        let s = schedule(Parameterization::Epsilon);
        let sigmas = s.sigmas_vec(20);
        assert_eq!(sigmas.len(), 21);
        assert_eq!(*sigmas.last().unwrap(), 0.0);
        for pair in sigmas.windows(2) {
            assert!(pair[0] > pair[1], "not decreasing: {:?}", pair);
        }
        assert!((sigmas[0] - s.sigma_max()).abs() < 1e-9);
        // SD 1.x sigma_max is ~14.6
        assert!(s.sigma_max() > 14.0 && s.sigma_max() < 15.0);
    }

    #[test]
    fn test_sigma_to_t_inverts_t_to_sigma() {
        let s = schedule(Parameterization::Epsilon);
        for t in [0.0, 1.5, 250.25, 999.0] {
            let back = s.sigma_to_t_scalar(s.t_to_sigma_scalar(t));
            assert!((back - t).abs() < 1e-6, "t={} back={}", t, back);
        }
        assert_eq!(s.sigma_to_t_scalar(0.0), 0.0);
    }

    #[test]
    fn test_scalings_shapes() {
        let sigma = Tensor::new(&[1.0f32, 2.0], &Device::Cpu).unwrap();

        let eps = schedule(Parameterization::Epsilon).get_scalings(&sigma).unwrap();
        assert_eq!(eps.len(), 2);
        let c_out = eps[0].to_vec1::<f32>().unwrap();
        assert_eq!(c_out, vec![-1.0, -2.0]);
        let c_in = eps[1].to_vec1::<f32>().unwrap();
        assert!((c_in[0] - 1.0 / 2f32.sqrt()).abs() < 1e-6);

        let v = schedule(Parameterization::Velocity).get_scalings(&sigma).unwrap();
        assert_eq!(v.len(), 3);
        let c_skip = v[0].to_vec1::<f32>().unwrap();
        assert!((c_skip[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sigma_to_t_tensor_keeps_shape() {
        let s = schedule(Parameterization::Epsilon);
        let sigma = Tensor::new(&[s.sigma_max() as f32, 0.0], &Device::Cpu).unwrap();
        let t = s.sigma_to_t(&sigma).unwrap().to_vec1::<f32>().unwrap();
        assert!((t[0] - 999.0).abs() < 1e-2);
        assert_eq!(t[1], 0.0);
    }
}

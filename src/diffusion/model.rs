// SYNOID Video Veil Diffusion Model Interface
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// The narrow capability surface the frame pipeline needs from a pretrained
// latent diffusion model. Hosts adapt their network to this; tests inject
// deterministic stubs.

use candle_core::{Result, Tensor};

/// What the network's output represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameterization {
    /// Predicts the added noise.
    Epsilon,
    /// Predicts velocity; scalings carry an extra leading `c_skip`.
    Velocity,
}

impl Parameterization {
    /// Number of leading entries in `get_scalings` before `(c_out, c_in)`.
    pub fn scaling_skip(self) -> usize {
        match self {
            Parameterization::Epsilon => 0,
            Parameterization::Velocity => 1,
        }
    }
}

/// Conditioning handed to `apply_model`.
#[derive(Debug, Clone)]
pub struct Conditioning {
    /// Cross-attention context, batch-aligned with the latent.
    pub crossattn: Tensor,
    /// Optional channel-concatenated image conditioning (inpainting-style models).
    pub concat: Option<Tensor>,
}

pub trait DiffusionModel {
    fn parameterization(&self) -> Parameterization;

    /// Decreasing sigma schedule of length `steps + 1`, ending in zero.
    fn get_sigmas(&self, steps: usize) -> Result<Tensor>;

    /// Map sigmas to the network's native timestep, elementwise.
    fn sigma_to_t(&self, sigma: &Tensor) -> Result<Tensor>;

    /// `[c_out, c_in]` for epsilon models, `[c_skip, c_out, c_in]` for velocity
    /// models, each with the same shape as `sigma`.
    fn get_scalings(&self, sigma: &Tensor) -> Result<Vec<Tensor>>;

    /// Raw network output for a scaled latent batch.
    fn apply_model(&self, x: &Tensor, t: &Tensor, cond: &Conditioning) -> Result<Tensor>;

    /// Encode a prompt into cross-attention conditioning with batch size 1.
    fn learned_conditioning(&self, prompt: &str) -> Result<Tensor>;
}

/// Reshape a per-sample `[n]` tensor to `[n, 1, 1, ...]` of the given rank.
pub fn append_dims(t: &Tensor, rank: usize) -> Result<Tensor> {
    let n = t.elem_count();
    let mut dims = vec![1usize; rank.max(1)];
    dims[0] = n;
    t.reshape(dims)
}

/// A `[n]` tensor filled with `value`, in the dtype and device of `like`.
pub fn full_like_batch(value: f64, n: usize, like: &Tensor) -> Result<Tensor> {
    Tensor::full(value, n, like.device())?.to_dtype(like.dtype())
}

// SYNOID Video Veil Stable Diffusion Host
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// img2img on Stable Diffusion 1.5 / 2.1 with candle. Weights come from the
// HuggingFace hub; sampling is Euler with classifier-free guidance over the
// k-diffusion discrete schedule.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL,
    StableDiffusionConfig,
};
use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::config::{ModelSettings, SdVersion};
use crate::diffusion::euler::EulerSampler;
use crate::diffusion::model::{Conditioning, DiffusionModel, Parameterization};
use crate::diffusion::schedule::DiscreteSchedule;
use crate::state::RunContext;
use crate::veil::request::{ImagePipeline, Processed, ProcessingRequest};
use crate::veil::sampling::SampleInputs;

const VAE_SCALE: f64 = 0.18215;
const LATENT_CHANNELS: usize = 4;
const LATENT_DOWNSCALE: u32 = 8;

fn tokenizer_error(e: impl std::fmt::Display) -> candle_core::Error {
    candle_core::Error::Msg(format!("tokenizer: {}", e))
}

/// Standard normal noise from a seeded generator (Box-Muller pairs).
pub fn seeded_noise(seed: u64, dims: &[usize], device: &Device) -> candle_core::Result<Tensor> {
    let n: usize = dims.iter().product();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(n + 1);
    while values.len() < n {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        values.push((r * theta.cos()) as f32);
        values.push((r * theta.sin()) as f32);
    }
    values.truncate(n);
    Tensor::from_vec(values, dims, device)
}

/// Largest multiple of 8 not above `v`, and at least 8.
fn latent_aligned(v: u32) -> u32 {
    (v / LATENT_DOWNSCALE * LATENT_DOWNSCALE).max(LATENT_DOWNSCALE)
}

pub struct StableDiffusionHost {
    device: Device,
    dtype: DType,
    schedule: DiscreteSchedule,
    tokenizer: Tokenizer,
    pad_id: u32,
    max_tokens: usize,
    clip: ClipTextTransformer,
    vae: AutoEncoderKL,
    unet: UNet2DConditionModel,
}

impl StableDiffusionHost {
    pub fn load(settings: &ModelSettings, device: Device) -> Result<Self> {
        let (config, parameterization) = match settings.version {
            SdVersion::V1_5 => (StableDiffusionConfig::v1_5(None, None, None), Parameterization::Epsilon),
            SdVersion::V2_1 => (StableDiffusionConfig::v2_1(None, None, None), Parameterization::Velocity),
        };
        let dtype = DType::F32;

        let api = hf_hub::api::sync::Api::new().context("Initialising HuggingFace hub")?;
        let repo = api.model(settings.repo().to_string());
        info!("[SD] Fetching weights from {}", settings.repo());
        let unet_path = repo
            .get("unet/diffusion_pytorch_model.safetensors")
            .context("Downloading UNet weights")?;
        let vae_path = repo
            .get("vae/diffusion_pytorch_model.safetensors")
            .context("Downloading VAE weights")?;
        let clip_path = repo
            .get("text_encoder/model.safetensors")
            .context("Downloading text encoder weights")?;
        let tokenizer_path = api
            .model(settings.tokenizer_repo.clone())
            .get("tokenizer.json")
            .context("Downloading tokenizer")?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(anyhow::Error::msg)?;
        let pad_token = config.clip.pad_with.as_deref().unwrap_or("<|endoftext|>");
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(pad_token)
            .with_context(|| format!("Tokenizer has no '{}' token", pad_token))?;

        info!("[SD] Building models on {:?}", device);
        let clip = stable_diffusion::build_clip_transformer(&config.clip, clip_path, &device, DType::F32)?;
        let vae = config.build_vae(vae_path, &device, dtype)?;
        let unet = config.build_unet(unet_path, &device, LATENT_CHANNELS, false, dtype)?;

        Ok(Self {
            schedule: DiscreteSchedule::stable_diffusion(parameterization, &device),
            max_tokens: config.clip.max_position_embeddings,
            device,
            dtype,
            tokenizer,
            pad_id,
            clip,
            vae,
            unet,
        })
    }

    fn image_to_tensor(&self, image: &RgbImage) -> candle_core::Result<Tensor> {
        let (w, h) = image.dimensions();
        Tensor::from_vec(image.as_raw().clone(), (h as usize, w as usize, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(self.dtype)?
            .affine(2.0 / 255.0, -1.0)?
            .unsqueeze(0)
    }

    fn tensor_to_images(&self, decoded: &Tensor) -> candle_core::Result<Vec<RgbImage>> {
        let decoded = ((decoded / 2.0)? + 0.5)?
            .clamp(0f32, 1f32)?
            .affine(255.0, 0.0)?
            .to_dtype(DType::U8)?;
        let (batch, _c, h, w) = decoded.dims4()?;
        let mut images = Vec::with_capacity(batch);
        for i in 0..batch {
            let raw: Vec<u8> = decoded.get(i)?.permute((1, 2, 0))?.flatten_all()?.to_vec1()?;
            if let Some(img) = RgbImage::from_raw(w as u32, h as u32, raw) {
                images.push(img);
            }
        }
        Ok(images)
    }

    fn encode_latent(&self, image: &RgbImage) -> candle_core::Result<Tensor> {
        let pixels = self.image_to_tensor(image)?;
        self.vae.encode(&pixels)?.sample()?.affine(VAE_SCALE, 0.0)
    }

    fn decode_latent(&self, latent: &Tensor) -> candle_core::Result<Vec<RgbImage>> {
        let decoded = self.vae.decode(&latent.affine(1.0 / VAE_SCALE, 0.0)?)?;
        self.tensor_to_images(&decoded)
    }

    fn target_size(&self, request: &ProcessingRequest) -> (u32, u32) {
        let (iw, ih) = request
            .init_images
            .first()
            .map(|i| i.dimensions())
            .unwrap_or((512, 512));
        (
            latent_aligned(request.settings.width.unwrap_or(iw)),
            latent_aligned(request.settings.height.unwrap_or(ih)),
        )
    }
}

impl DiffusionModel for StableDiffusionHost {
    fn parameterization(&self) -> Parameterization {
        self.schedule.parameterization()
    }

    fn get_sigmas(&self, steps: usize) -> candle_core::Result<Tensor> {
        self.schedule.get_sigmas(steps)
    }

    fn sigma_to_t(&self, sigma: &Tensor) -> candle_core::Result<Tensor> {
        self.schedule.sigma_to_t(sigma)
    }

    fn get_scalings(&self, sigma: &Tensor) -> candle_core::Result<Vec<Tensor>> {
        self.schedule.get_scalings(sigma)
    }

    fn apply_model(&self, x: &Tensor, t: &Tensor, cond: &Conditioning) -> candle_core::Result<Tensor> {
        // the UNet takes one timestep for the whole batch
        let timestep: f64 = t.to_dtype(DType::F64)?.flatten_all()?.get(0)?.to_scalar()?;
        let input = match &cond.concat {
            Some(concat) => Tensor::cat(&[x, concat], 1)?,
            None => x.clone(),
        };
        self.unet.forward(&input.to_dtype(self.dtype)?, timestep, &cond.crossattn)?
            .to_dtype(x.dtype())
    }

    fn learned_conditioning(&self, prompt: &str) -> candle_core::Result<Tensor> {
        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(tokenizer_error)?
            .get_ids()
            .to_vec();
        tokens.truncate(self.max_tokens);
        tokens.resize(self.max_tokens, self.pad_id);
        let tokens = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        self.clip.forward(&tokens)?.to_dtype(self.dtype)
    }
}

impl ImagePipeline for StableDiffusionHost {
    fn process(&mut self, request: &ProcessingRequest, ctx: &RunContext) -> Result<Processed> {
        let settings = &request.settings;
        let seed = settings.seed.max(0) as u64;
        let (width, height) = self.target_size(request);
        let batch = settings.batch_size.max(1);
        let latent_dims = [
            batch,
            LATENT_CHANNELS,
            (height / LATENT_DOWNSCALE) as usize,
            (width / LATENT_DOWNSCALE) as usize,
        ];

        let (init_latent, strength) = match request.init_images.first() {
            Some(image) => {
                let resized = if image.dimensions() == (width, height) {
                    image.clone()
                } else {
                    imageops::resize(image, width, height, FilterType::Lanczos3)
                };
                let latent = self.encode_latent(&resized)?;
                let latent = if batch > 1 { latent.repeat((batch, 1, 1, 1))? } else { latent };
                (latent, settings.denoising_strength)
            }
            // txt2img: a full-strength pass from zeros
            None => (Tensor::zeros(&latent_dims[..], self.dtype, &self.device)?, 1.0),
        };

        let cond = self.learned_conditioning(&settings.prompt)?;
        let uncond = self.learned_conditioning(&settings.negative_prompt)?;
        let (cond, uncond) = if batch > 1 {
            (cond.repeat((batch, 1, 1))?, uncond.repeat((batch, 1, 1))?)
        } else {
            (cond, uncond)
        };
        let sampler = EulerSampler::new(settings.steps, settings.cfg_scale, strength);
        info!(
            "[SD] {}x{} seed {} steps {} cfg {} strength {:.2} sampler {}",
            width, height, seed, settings.steps, settings.cfg_scale, strength, settings.sampler_name
        );

        let mut images = Vec::with_capacity(batch * settings.n_iter.max(1));
        for iteration in 0..settings.n_iter.max(1) {
            let iteration_seed = seed + (iteration * batch) as u64;
            let inputs = SampleInputs {
                init_latent: &init_latent,
                image_conditioning: None,
                steps: settings.steps,
            };
            let noise = match request.sampling.initial_noise(&*self, &inputs, ctx)? {
                Some(noise) => noise,
                None => seeded_noise(iteration_seed, init_latent.dims(), &self.device)?
                    .to_dtype(self.dtype)?,
            };

            let latent = sampler.sample_img2img(&*self, &init_latent, &noise, &cond, &uncond, None, ctx)?;
            let decoded = self.decode_latent(&latent)?;
            debug!("[SD] iteration {} decoded {} images", iteration, decoded.len());

            images.extend(decoded.into_iter().map(|img| match &request.color_corrections {
                Some(cc) => cc.apply(&img),
                None => img,
            }));
            ctx.next_job();
        }

        Ok(Processed { images, seed })
    }
}

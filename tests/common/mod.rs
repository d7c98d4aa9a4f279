#![allow(dead_code)]

use std::cell::Cell;
use std::path::Path;

use candle_core::{DType, Device, Result, Tensor};
use image::{Rgb, RgbImage};

use video_veil::diffusion::{Conditioning, DiffusionModel, DiscreteSchedule, Parameterization};
use video_veil::state::RunContext;
use video_veil::veil::color_correction::ColorCorrection;
use video_veil::veil::request::{ImagePipeline, Processed, ProcessingRequest};
use video_veil::veil::sampling::{SampleInputs, SamplingStrategy};

/// Deterministic model: the discrete SD schedule with a network that halves its input.
pub struct StubModel {
    pub schedule: DiscreteSchedule,
    pub calls: Cell<usize>,
}

impl StubModel {
    pub fn new(parameterization: Parameterization) -> Self {
        Self {
            schedule: DiscreteSchedule::stable_diffusion(parameterization, &Device::Cpu),
            calls: Cell::new(0),
        }
    }
}

impl DiffusionModel for StubModel {
    fn parameterization(&self) -> Parameterization {
        self.schedule.parameterization()
    }

    fn get_sigmas(&self, steps: usize) -> Result<Tensor> {
        self.schedule.get_sigmas(steps)
    }

    fn sigma_to_t(&self, sigma: &Tensor) -> Result<Tensor> {
        self.schedule.sigma_to_t(sigma)
    }

    fn get_scalings(&self, sigma: &Tensor) -> Result<Vec<Tensor>> {
        self.schedule.get_scalings(sigma)
    }

    fn apply_model(&self, x: &Tensor, _t: &Tensor, _cond: &Conditioning) -> Result<Tensor> {
        self.calls.set(self.calls.get() + 1);
        x.affine(0.5, 0.0)
    }

    fn learned_conditioning(&self, prompt: &str) -> Result<Tensor> {
        Tensor::full(prompt.len() as f32, (1, 1, 4), &Device::Cpu)
    }
}

pub fn test_latent() -> Tensor {
    Tensor::arange(0f32, 32.0, &Device::Cpu)
        .unwrap()
        .affine(0.05, -0.8)
        .unwrap()
        .reshape((1, 2, 4, 4))
        .unwrap()
}

/// What the pipeline saw for one call.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub sampler_name: String,
    pub batch_size: usize,
    pub noise_inverted: bool,
    pub init_image: Option<RgbImage>,
    pub control_image: Option<RgbImage>,
    pub color_corrections: Option<ColorCorrection>,
}

/// Returns the color-inverted init image and records every request.
pub struct EchoPipeline {
    pub model: StubModel,
    pub seen: Vec<SeenRequest>,
    /// Interrupt the run once this many frames have been processed.
    pub interrupt_after: Option<usize>,
    pub seed: u64,
}

impl EchoPipeline {
    pub fn new() -> Self {
        Self {
            model: StubModel::new(Parameterization::Epsilon),
            seen: Vec::new(),
            interrupt_after: None,
            seed: 1234,
        }
    }
}

pub fn invert_colors(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        *px = Rgb([255 - px[0], 255 - px[1], 255 - px[2]]);
    }
    out
}

impl ImagePipeline for EchoPipeline {
    fn process(&mut self, request: &ProcessingRequest, ctx: &RunContext) -> anyhow::Result<Processed> {
        let latent = Tensor::zeros((1, 2, 4, 4), DType::F32, &Device::Cpu)?;
        let inputs = SampleInputs {
            init_latent: &latent,
            image_conditioning: None,
            steps: request.settings.steps,
        };
        let noise = request.sampling.initial_noise(&self.model, &inputs, ctx)?;
        assert_eq!(noise.is_some(), request.sampling != SamplingStrategy::Default);

        self.seen.push(SeenRequest {
            sampler_name: request.settings.sampler_name.clone(),
            batch_size: request.settings.batch_size,
            noise_inverted: noise.is_some(),
            init_image: request.init_images.first().cloned(),
            control_image: request.control_image.clone(),
            color_corrections: request.color_corrections.clone(),
        });
        if Some(self.seen.len()) == self.interrupt_after {
            ctx.interrupt();
        }

        let images = match request.init_images.first() {
            Some(image) => vec![invert_colors(image)],
            None => vec![RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]))],
        };
        Ok(Processed {
            images,
            seed: self.seed,
        })
    }
}

/// Solid-color frame whose color encodes its index.
pub fn frame_color(index: usize) -> Rgb<u8> {
    Rgb([(index * 40 % 256) as u8, 100, (255 - index * 30 % 256) as u8])
}

/// Write `count` PNG frames named frame_000.png.. into `dir`.
pub fn write_frames(dir: &Path, count: usize, width: u32, height: u32) {
    for i in 0..count {
        let image = RgbImage::from_pixel(width, height, frame_color(i));
        image.save(dir.join(format!("frame_{:03}.png", i))).unwrap();
    }
}

pub fn ffmpeg_available() -> bool {
    video_veil::veil::ffmpeg::check_dependencies().is_empty()
}

// SYNOID Video Veil Configuration
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Settings come from three layers, later ones winning:
//   1. a JSON settings file (every field optional)
//   2. environment / .env (VIDEO_VEIL_OUTPUT_DIR, VIDEO_VEIL_MODEL_REPO)
//   3. CLI flags (applied in main.rs)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::veil::frame_store::SourceKind;

pub const ENV_OUTPUT_DIR: &str = "VIDEO_VEIL_OUTPUT_DIR";
pub const ENV_MODEL_REPO: &str = "VIDEO_VEIL_MODEL_REPO";

/// Where frames come from and how many to take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub use_images_directory: bool,
    pub video_path: Option<PathBuf>,
    pub directory_path: Option<PathBuf>,
    pub test_run: bool,
    pub test_run_frames_count: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            use_images_directory: false,
            video_path: None,
            directory_path: None,
            test_run: false,
            test_run_frames_count: 1,
        }
    }
}

impl SourceSettings {
    pub fn kind(&self) -> SourceKind {
        if self.use_images_directory {
            SourceKind::ImageDirectory
        } else {
            SourceKind::VideoFile
        }
    }

    /// Path for the selected kind; blank paths count as missing.
    pub fn path(&self) -> Option<&Path> {
        let path = if self.use_images_directory {
            self.directory_path.as_deref()
        } else {
            self.video_path.as_deref()
        };
        path.filter(|p| !p.as_os_str().is_empty())
    }

    /// Frame cap, only honoured for test runs.
    pub fn frame_cap(&self) -> Option<usize> {
        self.test_run.then_some(self.test_run_frames_count)
    }

    /// The frame pipeline runs only when some source path was supplied.
    pub fn is_enabled(&self) -> bool {
        let given = |p: &Option<PathBuf>| p.as_ref().map_or(false, |p| !p.as_os_str().is_empty());
        given(&self.video_path) || given(&self.directory_path)
    }
}

/// How each generated frame's colors are anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorCorrectionMode {
    #[default]
    None,
    #[serde(alias = "From Source Video")]
    FromSourceVideo,
    #[serde(alias = "From Stable Diffusion Generated Image")]
    FromGeneratedImage,
}

impl ColorCorrectionMode {
    pub fn label(&self) -> &'static str {
        match self {
            ColorCorrectionMode::None => "None",
            ColorCorrectionMode::FromSourceVideo => "From Source Video",
            ColorCorrectionMode::FromGeneratedImage => "From Stable Diffusion Generated Image",
        }
    }
}

impl fmt::Display for ColorCorrectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ColorCorrectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(ColorCorrectionMode::None),
            "source" | "video" | "from source video" => Ok(ColorCorrectionMode::FromSourceVideo),
            "generated" | "from stable diffusion generated image" => {
                Ok(ColorCorrectionMode::FromGeneratedImage)
            }
            other => Err(format!(
                "Unknown color correction '{}'. Expected none, source or generated",
                other
            )),
        }
    }
}

/// The base img2img configuration cloned for every frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: usize,
    pub cfg_scale: f64,
    pub denoising_strength: f64,
    /// -1 picks a random seed once per run.
    pub seed: i64,
    /// Output size; defaults to the first frame's size rounded down to a multiple of 8.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub batch_size: usize,
    pub n_iter: usize,
    pub sampler_name: String,
    pub outpath_samples: PathBuf,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            steps: 20,
            cfg_scale: 7.0,
            denoising_strength: 0.75,
            seed: -1,
            width: None,
            height: None,
            batch_size: 1,
            n_iter: 1,
            sampler_name: "Euler a".to_string(),
            outpath_samples: PathBuf::from("outputs/img2img-images"),
        }
    }
}

impl GenerationSettings {
    /// Replace a -1 seed with a concrete one.
    pub fn fix_seed(&mut self) -> u64 {
        if self.seed < 0 {
            self.seed = (rand::random::<u32>() & 0x7fff_ffff) as i64;
        }
        self.seed as u64
    }
}

/// Prompts describing the ORIGINAL footage, used to invert it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionSettings {
    pub original_prompt: String,
    pub original_negative_prompt: String,
    pub decode_cfg_scale: f64,
}

impl Default for InversionSettings {
    fn default() -> Self {
        Self {
            original_prompt: "This prompt should describe your input video".to_string(),
            original_negative_prompt: "This is your negative prompt describing your input video"
                .to_string(),
            decode_cfg_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SdVersion {
    #[default]
    #[serde(alias = "v1-5")]
    V1_5,
    #[serde(alias = "v2-1")]
    V2_1,
}

impl FromStr for SdVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1-5" | "1.5" => Ok(SdVersion::V1_5),
            "v2-1" | "2.1" => Ok(SdVersion::V2_1),
            other => Err(format!("Unknown Stable Diffusion version '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub version: SdVersion,
    /// HuggingFace repo holding unet/, vae/ and text_encoder/ weights.
    pub repo: Option<String>,
    pub tokenizer_repo: String,
    /// GPU ordinal, or "cpu".
    pub device: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            version: SdVersion::V1_5,
            repo: None,
            tokenizer_repo: "openai/clip-vit-base-patch32".to_string(),
            device: "0".to_string(),
        }
    }
}

impl ModelSettings {
    pub fn repo(&self) -> &str {
        match (&self.repo, self.version) {
            (Some(repo), _) => repo,
            (None, SdVersion::V1_5) => "stable-diffusion-v1-5/stable-diffusion-v1-5",
            (None, SdVersion::V2_1) => "stabilityai/stable-diffusion-2-1",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VeilConfig {
    pub source: SourceSettings,
    pub color_correction: ColorCorrectionMode,
    pub generation: GenerationSettings,
    pub inversion: InversionSettings,
    pub model: ModelSettings,
}

impl VeilConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Reading settings {:?}", path))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("Parsing settings {:?}", path))?;
        Ok(config)
    }

    /// Overlay environment variables (after `dotenv` has populated them).
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(ENV_OUTPUT_DIR) {
            if !dir.is_empty() {
                self.generation.outpath_samples = PathBuf::from(dir);
            }
        }
        if let Ok(repo) = std::env::var(ENV_MODEL_REPO) {
            if !repo.is_empty() {
                self.model.repo = Some(repo);
            }
        }
    }
}

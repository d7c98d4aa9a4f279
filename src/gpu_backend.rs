// SYNOID GPU Backend - Compute & Encoder Selection
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Picks the candle device the diffusion host runs on and the FFmpeg H.264
// encoder the assembler uses. NVIDIA GPUs are found via nvidia-smi; NVENC is
// only chosen when the local ffmpeg build actually ships it.

use anyhow::{Context, Result};
use candle_core::Device;
use std::process::Command;
use tracing::{info, warn};

pub const SOFTWARE_ENCODER: &str = "libx264";
pub const NVENC_ENCODER: &str = "h264_nvenc";

#[derive(Debug, Clone, PartialEq)]
pub enum ComputeBackend {
    /// NVIDIA GPU reported by nvidia-smi
    Nvidia { name: String, driver_version: String },
    /// CPU fallback
    Cpu { threads: usize },
}

impl std::fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeBackend::Nvidia { name, driver_version } => {
                write!(f, "NVIDIA: {} (Driver {})", name, driver_version)
            }
            ComputeBackend::Cpu { threads } => write!(f, "CPU ({} threads)", threads),
        }
    }
}

/// Parse `name, driver_version` csv from nvidia-smi (first GPU only).
pub fn parse_nvidia_smi(stdout: &str) -> Option<ComputeBackend> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (name, driver_version) = line.split_once(',')?;
    let (name, driver_version) = (name.trim(), driver_version.trim());
    if name.is_empty() || driver_version.is_empty() {
        return None;
    }
    Some(ComputeBackend::Nvidia {
        name: name.to_string(),
        driver_version: driver_version.to_string(),
    })
}

pub struct GpuContext {
    pub backend: ComputeBackend,
    nvenc: bool,
}

impl GpuContext {
    /// Detect the best available backend. Never fails; falls back to CPU.
    pub fn auto_detect() -> Self {
        if let Some(backend) = Self::try_nvidia() {
            let nvenc = Self::ffmpeg_has_encoder(NVENC_ENCODER);
            info!("[GPU] ✓ {} (NVENC: {})", backend, nvenc);
            return Self { backend, nvenc };
        }

        let threads = num_cpus::get();
        warn!("[GPU] No NVIDIA GPU detected. Falling back to CPU ({} threads)", threads);
        Self {
            backend: ComputeBackend::Cpu { threads },
            nvenc: false,
        }
    }

    fn try_nvidia() -> Option<ComputeBackend> {
        let output = Command::new("nvidia-smi")
            .args(["--query-gpu=name,driver_version", "--format=csv,noheader"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
    }

    fn ffmpeg_has_encoder(encoder: &str) -> bool {
        Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).contains(encoder))
            .unwrap_or(false)
    }

    pub fn has_gpu(&self) -> bool {
        matches!(self.backend, ComputeBackend::Nvidia { .. })
    }

    pub fn has_nvenc(&self) -> bool {
        self.nvenc
    }

    pub fn ffmpeg_encoder(&self) -> &'static str {
        if self.nvenc {
            NVENC_ENCODER
        } else {
            SOFTWARE_ENCODER
        }
    }

    /// Candle device for a `--gpu` value: "cpu" or a CUDA ordinal.
    pub fn candle_device(&self, preference: &str) -> Result<Device> {
        let preference = preference.trim();
        if preference.eq_ignore_ascii_case("cpu") || !self.has_gpu() {
            return Ok(Device::Cpu);
        }
        let ordinal: usize = preference
            .parse()
            .with_context(|| format!("Invalid GPU ordinal '{}'", preference))?;
        let device = Device::cuda_if_available(ordinal)?;
        if device.is_cpu() {
            warn!("[GPU] Built without CUDA support, running diffusion on CPU");
        }
        Ok(device)
    }
}

static GPU_CONTEXT: std::sync::OnceLock<GpuContext> = std::sync::OnceLock::new();

/// Get or initialize the global GPU context
pub fn get_gpu_context() -> &'static GpuContext {
    GPU_CONTEXT.get_or_init(GpuContext::auto_detect)
}

/// Print GPU status (for CLI `gpu` command)
pub fn print_gpu_status() {
    let ctx = get_gpu_context();

    println!("=== Video Veil GPU Status ===");
    println!("Backend: {}", ctx.backend);
    println!("CUDA Device: {}", if ctx.has_gpu() { "✓ AVAILABLE" } else { "✗ NONE" });
    println!("NVENC Available: {}", if ctx.has_nvenc() { "✓ YES" } else { "✗ NO" });
    println!("FFmpeg Encoder: {}", ctx.ffmpeg_encoder());
    println!("CPU Threads: {}", num_cpus::get());
}

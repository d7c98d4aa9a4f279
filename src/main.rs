// SYNOID Video Veil Entry Point
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use video_veil::config::{ColorCorrectionMode, SdVersion, VeilConfig};
use video_veil::diffusion::stable_diffusion::StableDiffusionHost;
use video_veil::gpu_backend;
use video_veil::state::RunContext;
use video_veil::veil::{self, ffmpeg, ProcessingRequest, VideoAssembler, VideoVeil};

use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "video-veil")]
#[command(about = "Frame-consistent video-to-video Stable Diffusion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct SourceArgs {
    /// Source video file
    #[arg(long, conflicts_with = "directory")]
    video: Option<PathBuf>,

    /// Directory of .png/.jpg/.jpeg frames
    #[arg(long)]
    directory: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform a video (or frame directory) frame by frame
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// JSON settings file; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        prompt: Option<String>,

        #[arg(long)]
        negative_prompt: Option<String>,

        #[arg(long)]
        steps: Option<usize>,

        #[arg(long)]
        cfg_scale: Option<f64>,

        #[arg(long)]
        denoising_strength: Option<f64>,

        /// -1 for a random seed shared by every frame
        #[arg(long, allow_hyphen_values = true)]
        seed: Option<i64>,

        /// none | source | generated
        #[arg(long)]
        color_correction: Option<ColorCorrectionMode>,

        /// Only process the first few frames; no video is written
        #[arg(long)]
        test_run: bool,

        #[arg(long, default_value = "1")]
        test_frames: usize,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Prompt describing the input footage
        #[arg(long)]
        original_prompt: Option<String>,

        #[arg(long)]
        original_negative_prompt: Option<String>,

        /// v1-5 | v2-1
        #[arg(long)]
        sd_version: Option<SdVersion>,

        /// CUDA ordinal or "cpu"
        #[arg(long)]
        gpu: Option<String>,
    },

    /// Check that a source can be decoded and report its frame size
    Probe {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Show compute device and encoder selection
    Gpu,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Keep model-loading crates quiet unless asked
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,hf_hub=warn,tokenizers=warn");
    }
    tracing_subscriber::fmt::init();

    info!("--- VIDEO VEIL v{} ---", env!("CARGO_PKG_VERSION"));

    let missing_deps = ffmpeg::check_dependencies();
    if !missing_deps.is_empty() {
        warn!("Missing dependencies: {:?}. Video sources will not work.", missing_deps);
    }

    let args = Cli::parse();

    match args.command {
        Commands::Gpu => {
            gpu_backend::print_gpu_status();
        }
        Commands::Probe { source } => {
            let mut config = VeilConfig::default();
            apply_source(&mut config, &source);
            let probe = veil::probe(&config.source).await?;
            println!("{}", probe.message);
            if !probe.is_valid() {
                std::process::exit(1);
            }
        }
        Commands::Run {
            source,
            config,
            prompt,
            negative_prompt,
            steps,
            cfg_scale,
            denoising_strength,
            seed,
            color_correction,
            test_run,
            test_frames,
            output_dir,
            original_prompt,
            original_negative_prompt,
            sd_version,
            gpu,
        } => {
            let mut settings = match &config {
                Some(path) => VeilConfig::load(path)?,
                None => VeilConfig::default(),
            };
            settings.apply_env();

            apply_source(&mut settings, &source);
            if test_run {
                settings.source.test_run = true;
                settings.source.test_run_frames_count = test_frames;
            }
            let generation = &mut settings.generation;
            if let Some(v) = prompt { generation.prompt = v; }
            if let Some(v) = negative_prompt { generation.negative_prompt = v; }
            if let Some(v) = steps { generation.steps = v; }
            if let Some(v) = cfg_scale { generation.cfg_scale = v; }
            if let Some(v) = denoising_strength { generation.denoising_strength = v; }
            if let Some(v) = seed { generation.seed = v; }
            if let Some(v) = output_dir { generation.outpath_samples = v; }
            if let Some(v) = color_correction { settings.color_correction = v; }
            if let Some(v) = original_prompt { settings.inversion.original_prompt = v; }
            if let Some(v) = original_negative_prompt { settings.inversion.original_negative_prompt = v; }
            if let Some(v) = sd_version { settings.model.version = v; }
            if let Some(v) = gpu { settings.model.device = v; }

            let gpu_ctx = gpu_backend::get_gpu_context();
            let device = gpu_ctx.candle_device(&settings.model.device)?;
            let model_settings = settings.model.clone();
            let host = tokio::task::block_in_place(|| StableDiffusionHost::load(&model_settings, device))?;

            let ctx = RunContext::shared();
            let interrupt_ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if interrupt_ctx.interrupt() {
                        warn!("Second Ctrl+C, exiting now");
                        std::process::exit(130);
                    }
                    warn!("Ctrl+C received, stopping after the current frame (press again to quit)");
                }
            });

            let assembler = VideoAssembler::new(
                settings.generation.outpath_samples.clone(),
                gpu_ctx.ffmpeg_encoder(),
            );
            let base = ProcessingRequest::new(settings.generation.clone());
            let mut video_veil = VideoVeil::new(host, ctx, assembler);

            match video_veil.run(&settings, base).await {
                Ok(outcome) => {
                    info!(
                        "{:?}: {} images, seed {}",
                        outcome.state,
                        outcome.images.len(),
                        outcome.seed
                    );
                    match outcome.output_path {
                        Some(path) => println!("Saved video: {}", path.display()),
                        None => println!("No video written ({} images generated)", outcome.images.len()),
                    }
                }
                Err(e) => {
                    error!("Video Veil failed: {:#}", e);
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}

fn apply_source(config: &mut VeilConfig, source: &SourceArgs) {
    if let Some(dir) = &source.directory {
        config.source.use_images_directory = true;
        config.source.directory_path = Some(dir.clone());
    }
    if let Some(video) = &source.video {
        config.source.use_images_directory = false;
        config.source.video_path = Some(video.clone());
    }
}

// SYNOID Video Veil Library
// Copyright (c) 2026 Xing_The_Creator | SYNOID

pub mod config;
pub mod diffusion;
pub mod error;
pub mod gpu_backend;
pub mod state;
pub mod veil;

pub use config::VeilConfig;
pub use error::VeilError;
pub use state::RunContext;

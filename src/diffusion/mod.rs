// SYNOID Video Veil Diffusion
// Copyright (c) 2026 Xing_The_Creator | SYNOID

pub mod euler;
pub mod model;
pub mod schedule;
pub mod stable_diffusion;

pub use model::{Conditioning, DiffusionModel, Parameterization};
pub use schedule::DiscreteSchedule;

// SYNOID Video Veil Run State
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Job counters, cooperative cancellation and the live preview latent for a
// single run. Threaded explicitly through the runner, the sampler and the
// inverter instead of living in a global.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use candle_core::Tensor;

#[derive(Default)]
pub struct RunContext {
    job_count: AtomicUsize,
    job_no: AtomicUsize,
    sampling_steps: AtomicUsize,
    sampling_step: AtomicUsize,
    interrupted: AtomicBool,
    skipped: AtomicBool,
    job: Mutex<String>,
    preview: Mutex<Option<Tensor>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, e.g. for a Ctrl-C handler.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Reset counters for a new batch of `job_count` jobs. A pending
    /// interrupt survives so a Ctrl-C during source loading still cancels.
    pub fn begin(&self, job_count: usize) {
        self.job_count.store(job_count, Ordering::SeqCst);
        self.job_no.store(0, Ordering::SeqCst);
        self.sampling_steps.store(0, Ordering::SeqCst);
        self.sampling_step.store(0, Ordering::SeqCst);
        self.skipped.store(false, Ordering::SeqCst);
        self.set_job_label(String::new());
        if let Ok(mut preview) = self.preview.lock() {
            *preview = None;
        }
    }

    pub fn job_count(&self) -> usize {
        self.job_count.load(Ordering::SeqCst)
    }

    pub fn add_jobs(&self, n: usize) {
        self.job_count.fetch_add(n, Ordering::SeqCst);
    }

    pub fn job_no(&self) -> usize {
        self.job_no.load(Ordering::SeqCst)
    }

    /// Marks one unit of work as done and rewinds the step counter.
    pub fn next_job(&self) {
        self.job_no.fetch_add(1, Ordering::SeqCst);
        self.sampling_step.store(0, Ordering::SeqCst);
    }

    pub fn set_job_label(&self, label: String) {
        if let Ok(mut job) = self.job.lock() {
            *job = label;
        }
    }

    pub fn job_label(&self) -> String {
        self.job.lock().map(|j| j.clone()).unwrap_or_default()
    }

    pub fn set_sampling_steps(&self, steps: usize) {
        self.sampling_steps.store(steps, Ordering::SeqCst);
        self.sampling_step.store(0, Ordering::SeqCst);
    }

    pub fn sampling_steps(&self) -> usize {
        self.sampling_steps.load(Ordering::SeqCst)
    }

    pub fn advance_sampling_step(&self) {
        self.sampling_step.fetch_add(1, Ordering::SeqCst);
    }

    pub fn sampling_step(&self) -> usize {
        self.sampling_step.load(Ordering::SeqCst)
    }

    /// Request cancellation. Takes effect at the next frame boundary.
    /// Returns whether cancellation had already been requested.
    pub fn interrupt(&self) -> bool {
        self.interrupted.swap(true, Ordering::SeqCst)
    }

    /// Drop a pending interrupt before reusing the context for another run.
    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn skip(&self) {
        self.skipped.store(true, Ordering::SeqCst);
    }

    /// Clears a pending skip request, returning whether one was set.
    pub fn take_skipped(&self) -> bool {
        self.skipped.swap(false, Ordering::SeqCst)
    }

    /// Publish the latest intermediate latent for live preview.
    pub fn store_latent(&self, latent: &Tensor) {
        if let Ok(mut preview) = self.preview.lock() {
            *preview = Some(latent.clone());
        }
    }

    pub fn latest_preview(&self) -> Option<Tensor> {
        self.preview.lock().ok().and_then(|p| p.clone())
    }

    /// Progress over all jobs (0.0 - 1.0)
    pub fn progress(&self) -> f32 {
        let total = self.job_count();
        if total == 0 {
            return 0.0;
        }
        (self.job_no() as f32 / total as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_begin_resets_counters_but_keeps_interrupt() {
        let ctx = RunContext::new();
        ctx.interrupt();
        ctx.skip();
        ctx.add_jobs(3);
        ctx.next_job();

        ctx.begin(10);
        assert!(ctx.is_interrupted());
        assert!(!ctx.take_skipped());
        assert_eq!(ctx.job_count(), 10);
        assert_eq!(ctx.job_no(), 0);

        ctx.clear_interrupt();
        assert!(!ctx.is_interrupted());
    }

    #[test]
    fn test_interrupt_reports_repeat_requests() {
        let ctx = RunContext::new();
        assert!(!ctx.interrupt());
        assert!(ctx.interrupt());
        assert!(ctx.is_interrupted());
    }

    #[test]
    fn test_progress_and_preview() {
        let ctx = RunContext::new();
        assert_eq!(ctx.progress(), 0.0);
        ctx.begin(4);
        ctx.next_job();
        assert!((ctx.progress() - 0.25).abs() < 1e-6);

        assert!(ctx.latest_preview().is_none());
        let latent = Tensor::zeros((1, 4, 2, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        ctx.store_latent(&latent);
        assert_eq!(ctx.latest_preview().unwrap().dims(), &[1, 4, 2, 2]);
    }
}

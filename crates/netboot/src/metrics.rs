//! Prometheus metrics for job handling.
//!
//! Every handled request is a job, labelled with where it came from
//! (`http`, `dhcp`) and the operation (`file`, `phone-home`, `kickstart`...).

use crate::error::BootError;
use prometheus::{
    Encoder, HistogramOpts, HistogramTimer, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

const LABELS: &[&str] = &["from", "op"];

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    jobs_total: IntCounterVec,
    jobs_in_progress: IntGaugeVec,
    job_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, BootError> {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("netboot_jobs_total", "Number of jobs handled"),
            LABELS,
        )?;
        let jobs_in_progress = IntGaugeVec::new(
            Opts::new("netboot_jobs_in_progress", "Number of jobs being handled"),
            LABELS,
        )?;
        let job_duration = HistogramVec::new(
            HistogramOpts::new("netboot_job_duration_seconds", "Time taken to handle a job"),
            LABELS,
        )?;

        registry.register(Box::new(jobs_total.clone()))?;
        registry.register(Box::new(jobs_in_progress.clone()))?;
        registry.register(Box::new(job_duration.clone()))?;

        Ok(Self {
            registry,
            jobs_total,
            jobs_in_progress,
            job_duration,
        })
    }

    /// Count a job and time it until the returned guard is dropped.
    pub fn track(&self, from: &str, op: &str) -> JobGuard {
        let labels = [from, op];
        self.jobs_total.with_label_values(&labels).inc();
        let in_progress = self.jobs_in_progress.with_label_values(&labels);
        in_progress.inc();
        JobGuard {
            in_progress,
            _timer: self.job_duration.with_label_values(&labels).start_timer(),
        }
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, BootError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| BootError::Render(format!("metrics are not UTF-8: {}", e)))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

/// Marks a tracked job as finished when dropped
pub struct JobGuard {
    in_progress: IntGauge,
    _timer: HistogramTimer,
}

impl std::fmt::Debug for JobGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobGuard").field("in_progress", &self.in_progress.get()).finish()
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.in_progress.dec();
    }
}

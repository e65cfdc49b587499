//! Fence-delimited benchmark loop.
//!
//! Warmup signals fence value 1. The timed loop continues at 2 and signals
//! `2..=iterations + 1`, waiting on each value before the next submission,
//! so the host clock only advances past an iteration once the device has
//! actually finished it. Only the span of the whole loop is measured.

use std::sync::Arc;
use std::time::{Duration, Instant};

use accelbench_backend::CommandQueue;
use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::error::BenchError;
use crate::fence::{FenceSynchronizer, WaitTimeout};
use crate::session::Workload;

/// Fence value signaled after the warmup run.
pub const WARMUP_FENCE_VALUE: u64 = 1;
/// First fence value of the timed loop.
pub const FIRST_TIMED_FENCE_VALUE: u64 = WARMUP_FENCE_VALUE + 1;

/// Warmup duration and steady-state mean latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BenchmarkReport {
    /// Warmup submission plus its fence wait.
    pub warmup: Duration,
    /// From the first timed submission to the last wait returning.
    pub total: Duration,
    pub iterations: u32,
    /// `total / iterations`.
    pub average: Duration,
}

impl BenchmarkReport {
    /// # Panics
    ///
    /// Panics if `iterations` is zero.
    pub fn from_spans(warmup: Duration, total: Duration, iterations: u32) -> Self {
        Self { warmup, total, iterations, average: total / iterations }
    }

    pub fn warmup_ms(&self) -> f64 {
        self.warmup.as_secs_f64() * 1000.0
    }

    pub fn total_ms(&self) -> f64 {
        self.total.as_secs_f64() * 1000.0
    }

    /// Mean latency in milliseconds, divided from the unrounded total.
    pub fn average_ms(&self) -> f64 {
        self.total_ms() / f64::from(self.iterations)
    }
}

/// Drives warmup and the timed loop on one queue.
#[derive(Debug)]
pub struct BenchmarkRunner {
    queue: Arc<dyn CommandQueue>,
    sync: FenceSynchronizer,
    timeout: WaitTimeout,
}

impl BenchmarkRunner {
    /// `sync` must wrap a fence that has not been signaled past 0.
    pub fn new(
        queue: Arc<dyn CommandQueue>,
        sync: FenceSynchronizer,
        timeout: WaitTimeout,
    ) -> Self {
        Self { queue, sync, timeout }
    }

    pub fn synchronizer(&self) -> &FenceSynchronizer {
        &self.sync
    }

    /// Run warmup plus `iterations` timed submissions.
    ///
    /// Any error aborts the run; no partial report is produced.
    pub fn run(
        &mut self,
        workload: &mut dyn Workload,
        iterations: u32,
    ) -> Result<BenchmarkReport, BenchError> {
        if iterations == 0 {
            return Err(BenchError::Config(crate::config::ConfigError::Validation(
                "iterations must be > 0".into(),
            )));
        }
        let _span = info_span!("benchmark", iterations, timeout = %self.timeout).entered();

        let warm_start = Instant::now();
        self.step(workload, WARMUP_FENCE_VALUE)?;
        let warmup = warm_start.elapsed();
        debug!(warmup_us = warmup.as_micros() as u64, "warmup complete");

        let last = u64::from(iterations) + WARMUP_FENCE_VALUE;
        let start = Instant::now();
        for value in FIRST_TIMED_FENCE_VALUE..=last {
            self.step(workload, value)?;
        }
        let total = start.elapsed();

        let report = BenchmarkReport::from_spans(warmup, total, iterations);
        info!(
            warmup_ms = report.warmup_ms(),
            average_ms = report.average_ms(),
            iterations,
            "benchmark complete"
        );
        Ok(report)
    }

    fn step(&mut self, workload: &mut dyn Workload, value: u64) -> Result<(), BenchError> {
        workload
            .submit()
            .map_err(|source| BenchError::Submission { fence_value: value, source })?;
        self.sync.signal(self.queue.as_ref(), value)?;
        self.sync.wait_until(value, self.timeout)?;
        Ok(())
    }
}

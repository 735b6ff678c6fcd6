//! Stage timing
//!
//! [`StageTimer`] wraps a closure or future, measures its wall-clock duration,
//! emits one `info!` event per stage and keeps the measurement so callers can
//! put it in a report.

use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::info;

/// Duration of one named stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: String,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

/// Collects [`StageTiming`]s in the order stages finished
#[derive(Debug, Default, Clone)]
pub struct StageTimer {
    timings: Vec<StageTiming>,
}

impl StageTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f`, record how long it took under `stage` and return its output
    pub fn time<T>(&mut self, stage: impl Into<String>, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let output = f();
        self.record(stage, started.elapsed());
        output
    }

    /// Async counterpart of [`StageTimer::time`]
    pub async fn time_async<T, F>(&mut self, stage: impl Into<String>, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = fut.await;
        self.record(stage, started.elapsed());
        output
    }

    /// Record an externally measured duration
    pub fn record(&mut self, stage: impl Into<String>, elapsed: Duration) {
        let stage = stage.into();
        info!(
            stage = %stage,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "{} took {:.3} seconds",
            stage,
            elapsed.as_secs_f64()
        );
        self.timings.push(StageTiming { stage, elapsed });
    }

    /// Append timings measured by another timer, without logging them again
    pub fn absorb(&mut self, other: impl IntoIterator<Item = StageTiming>) {
        self.timings.extend(other);
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    pub fn get(&self, stage: &str) -> Option<Duration> {
        self.timings
            .iter()
            .find(|t| t.stage == stage)
            .map(|t| t.elapsed)
    }

    pub fn into_timings(self) -> Vec<StageTiming> {
        self.timings
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

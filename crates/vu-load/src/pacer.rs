//! Think-time pacing between iterations.

use crate::config::ThinkTime;
use rand::prelude::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-VU think-time delay.
#[derive(Debug)]
pub struct Pacer {
    think_time: ThinkTime,
    rng: StdRng,
}

impl Pacer {
    pub fn new(think_time: ThinkTime, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { think_time, rng }
    }

    /// Next delay drawn from the configured think time.
    pub fn next_delay(&mut self) -> Duration {
        match self.think_time {
            ThinkTime::None => Duration::ZERO,
            ThinkTime::Fixed { secs } => secs_to_duration(secs),
            ThinkTime::Uniform { min_secs, max_secs } => {
                if !(max_secs > min_secs && (max_secs - min_secs).is_finite()) {
                    secs_to_duration(min_secs)
                } else {
                    secs_to_duration(self.rng.gen_range(min_secs..=max_secs))
                }
            }
        }
    }

    /// Sleep for the next think time. Returns early if `stop` fires.
    pub async fn pace(&mut self, stop: &CancellationToken) {
        let delay = self.next_delay();
        self.wait(delay, stop).await;
    }

    /// Suspend only the calling task for `delay`.
    pub async fn wait(&self, delay: Duration, stop: &CancellationToken) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.cancelled() => {}
        }
    }
}

/// Negative and NaN clamp to zero, values past `Duration::MAX` saturate.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

//! Test orchestration: spawn VUs, enforce the duration, drain, report.

use crate::check::{Check, Checker};
use crate::client::HttpClient;
use crate::config::TestConfig;
use crate::dataset::{DatasetSource, DatasetStore};
use crate::error::{HarnessError, HarnessResult};
use crate::metrics::{MetricsCollector, TestReport};
use crate::pacer::Pacer;
use crate::request::RequestBuilder;
use crate::sampler::Sampler;
use crate::vu::{VirtualUser, VuContext, VuState, VuStats};

use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs one load test.
pub struct TestRunner {
    config: TestConfig,
    client: Arc<dyn HttpClient>,
    stop: CancellationToken,
    progress: Option<ProgressBar>,
}

impl TestRunner {
    /// Create a new runner. The configuration is validated by [`TestRunner::run`].
    pub fn new(config: TestConfig, client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            client,
            stop: CancellationToken::new(),
            progress: None,
        }
    }

    /// Advance `progress` by one per elapsed second of the test.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Token that stops every VU at its next iteration boundary.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Run the load test against `source`.
    pub async fn run(&self, source: &dyn DatasetSource) -> HarnessResult<TestReport> {
        self.config.validate()?;

        let store = Arc::new(DatasetStore::load(source)?);
        tracing::info!(
            dataset = %store.name(),
            source = %source.describe(),
            records = store.len(),
            "Dataset ready"
        );

        let checker = Checker::new();
        let checks: Vec<Check> = self.config.checks.iter().map(Check::from_spec).collect();
        for check in &checks {
            checker.register(&check.name);
        }

        let ctx = Arc::new(VuContext {
            store,
            builder: RequestBuilder::new(&self.config),
            client: Arc::clone(&self.client),
            checks,
            checker: checker.clone(),
            metrics: Arc::new(Mutex::new(MetricsCollector::new())),
        });

        tracing::info!(
            scenario = %self.config.name,
            vus = self.config.vus,
            duration_secs = self.config.duration_secs,
            iterations = ?self.config.iterations,
            think_time = ?self.config.think_time,
            "Starting load test"
        );

        let start = Instant::now();
        let vus = self.config.vus as usize;
        // Each VU runs in its own task; the outer task pairs its id with the
        // outcome so the drain below sees failures in completion order.
        let mut tasks = JoinSet::new();
        for vu_id in 0..vus {
            let pacer_seed = self
                .config
                .seed
                .map(|seed| seed.wrapping_add(vus as u64).wrapping_add(vu_id as u64));
            let vu = VirtualUser::new(
                vu_id,
                Arc::clone(&ctx),
                Sampler::for_vu(self.config.seed, vu_id),
                Pacer::new(self.config.think_time.clone(), pacer_seed),
                self.config.iterations,
            );
            let handle = tokio::spawn(vu.run(self.stop.clone()));
            tasks.spawn(async move { (vu_id, handle.await) });
        }

        let timer = tokio::spawn(Self::stop_after(
            self.config.duration(),
            self.stop.clone(),
            self.progress.clone(),
        ));

        let mut stopped = Vec::with_capacity(vus);
        let mut aborted = None;
        while let Some(joined) = tasks.join_next().await {
            let (vu_id, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    // The wrapper only awaits a handle; this is a runtime shutdown.
                    tracing::error!(error = %e, "VU join task failed");
                    self.stop.cancel();
                    continue;
                }
            };
            match outcome {
                Ok(stats) => stopped.push(stats),
                Err(e) => {
                    tracing::error!(vu_id, error = %e, "VU task failed");
                    // Stop the rest now; the run is already invalid.
                    self.stop.cancel();
                    aborted.get_or_insert(HarnessError::VuAborted {
                        vu_id,
                        message: e.to_string(),
                    });
                }
            }
        }
        timer.abort();
        let elapsed = start.elapsed();

        if let Some(pb) = &self.progress {
            pb.finish_with_message("Complete!");
        }
        if let Some(err) = aborted {
            return Err(err);
        }

        let report = ctx.metrics.lock().await.report(
            self.config.name.clone(),
            self.config.vus,
            count_stopped(&stopped),
            elapsed,
            checker.snapshot(),
        );

        tracing::info!(
            elapsed_secs = report.elapsed_secs,
            iterations = report.total_iterations,
            call_failures = report.total_call_failures,
            check_failures = report.check_failures(),
            "Load test completed"
        );

        Ok(report)
    }

    async fn stop_after(duration: Duration, stop: CancellationToken, progress: Option<ProgressBar>) {
        let now = tokio::time::Instant::now();
        let Some(deadline) = now.checked_add(duration) else {
            tracing::warn!(?duration, "Test duration out of range, waiting for stop signal");
            stop.cancelled().await;
            return;
        };
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = stop.cancelled() => return,
                _ = ticker.tick() => {
                    if let Some(pb) = &progress {
                        pb.set_position(
                            now.elapsed().as_secs().min(duration.as_secs()),
                        );
                    }
                }
            }
        }
        tracing::info!("Test duration elapsed, stopping VUs");
        if let Some(pb) = &progress {
            pb.set_message("Waiting for in-flight requests...");
        }
        stop.cancel();
    }
}

fn count_stopped(stats: &[VuStats]) -> usize {
    stats.iter().filter(|s| s.state == VuState::Stopped).count()
}

impl std::fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRunner")
            .field("config", &self.config)
            .field("stopped", &self.stop.is_cancelled())
            .finish()
    }
}

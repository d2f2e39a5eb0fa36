//! Virtual user execution loop.
//!
//! Each VU is one tokio task running iterations back to back:
//! **sample -> build request -> call -> check -> pace**. The stop signal is
//! observed only at the top of an iteration, so an in-flight call always
//! completes and its checks are always counted.

use crate::check::{Check, Checker};
use crate::client::HttpClient;
use crate::dataset::DatasetStore;
use crate::metrics::MetricsCollector;
use crate::pacer::Pacer;
use crate::request::RequestBuilder;
use crate::sampler::Sampler;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VuState {
    Idle,
    Running,
    Stopped,
}

/// Everything VUs share for the duration of a run.
pub struct VuContext {
    pub store: Arc<DatasetStore>,
    pub builder: RequestBuilder,
    pub client: Arc<dyn HttpClient>,
    pub checks: Vec<Check>,
    pub checker: Checker,
    pub metrics: Arc<Mutex<MetricsCollector>>,
}

/// Per-VU totals returned when the VU stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VuStats {
    pub vu_id: usize,
    pub iterations: u64,
    pub call_failures: u64,
    pub state: VuState,
}

/// One simulated client.
pub struct VirtualUser {
    id: usize,
    ctx: Arc<VuContext>,
    sampler: Sampler,
    pacer: Pacer,
    max_iterations: Option<u64>,
    state: VuState,
}

impl VirtualUser {
    pub fn new(
        id: usize,
        ctx: Arc<VuContext>,
        sampler: Sampler,
        pacer: Pacer,
        max_iterations: Option<u64>,
    ) -> Self {
        Self {
            id,
            ctx,
            sampler,
            pacer,
            max_iterations,
            state: VuState::Idle,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> VuState {
        self.state
    }

    /// Run iterations until `stop` fires or the iteration cap is reached.
    pub async fn run(mut self, stop: CancellationToken) -> VuStats {
        let mut stats = VuStats {
            vu_id: self.id,
            iterations: 0,
            call_failures: 0,
            state: VuState::Running,
        };
        self.state = VuState::Running;
        tracing::debug!(vu_id = self.id, "VU started");

        loop {
            if stop.is_cancelled() {
                tracing::debug!(vu_id = self.id, "VU received stop signal");
                break;
            }
            if let Some(max) = self.max_iterations {
                if stats.iterations >= max {
                    tracing::debug!(vu_id = self.id, iterations = max, "VU reached iteration cap");
                    break;
                }
            }

            if !self.iterate().await {
                stats.call_failures += 1;
            }
            stats.iterations += 1;

            self.pacer.pace(&stop).await;
        }

        self.state = VuState::Stopped;
        stats.state = self.state;
        tracing::debug!(
            vu_id = self.id,
            iterations = stats.iterations,
            call_failures = stats.call_failures,
            "VU stopped"
        );
        stats
    }

    /// One iteration. Returns `false` if the call failed at the transport level.
    async fn iterate(&mut self) -> bool {
        let ctx = Arc::clone(&self.ctx);
        let record = self.sampler.sample(&ctx.store);
        let request = ctx.builder.build(record);

        match ctx.client.send(&request).await {
            Ok(response) => {
                for check in &ctx.checks {
                    ctx.checker.run(check, &response);
                }
                let mut metrics = ctx.metrics.lock().await;
                metrics.record_response(response.latency, response.body.len());
                metrics.record_iteration();
                true
            }
            Err(e) => {
                tracing::warn!(
                    vu_id = self.id,
                    url = %request.url,
                    kind = e.kind(),
                    error = %e,
                    "Request failed"
                );
                let mut metrics = ctx.metrics.lock().await;
                metrics.record_call_failure(e.kind());
                metrics.record_iteration();
                false
            }
        }
    }
}

impl std::fmt::Debug for VirtualUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualUser")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Response;
    use crate::config::{TestConfig, ThinkTime};
    use crate::dataset::InlineSource;
    use crate::error::NetworkError;
    use crate::request::RequestSpec;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpClient for CountingClient {
        async fn send(&self, _request: &RequestSpec) -> Result<Response, NetworkError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                Err(NetworkError::Connect("connection refused".to_string()))
            } else {
                Ok(Response::new(200))
            }
        }
    }

    fn context(client: Arc<dyn HttpClient>) -> Arc<VuContext> {
        let config = TestConfig::quick("http://localhost:8282", 1, 1.0);
        let store =
            DatasetStore::load(&InlineSource::new("users", "name,message\nadmin,hi\n")).unwrap();
        Arc::new(VuContext {
            store: Arc::new(store),
            builder: RequestBuilder::new(&config),
            client,
            checks: config.checks.iter().map(Check::from_spec).collect(),
            checker: Checker::new(),
            metrics: Arc::new(Mutex::new(MetricsCollector::new())),
        })
    }

    #[tokio::test]
    async fn test_vu_runs_to_iteration_cap() {
        let client = Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
        });
        let ctx = context(client.clone());
        let vu = VirtualUser::new(
            0,
            Arc::clone(&ctx),
            Sampler::new(Some(1)),
            Pacer::new(ThinkTime::None, None),
            Some(3),
        );
        assert_eq!(vu.state(), VuState::Idle);

        let stats = vu.run(CancellationToken::new()).await;
        assert_eq!(stats.state, VuState::Stopped);
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.call_failures, 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);

        let checks = ctx.checker.snapshot();
        assert_eq!(checks["login succeeded"].pass, 2);
        assert_eq!(checks["login succeeded"].fail, 0);
        assert_eq!(ctx.metrics.lock().await.call_failures(), 1);
        assert_eq!(ctx.metrics.lock().await.iterations(), 3);
    }

    #[tokio::test]
    async fn test_stopped_vu_runs_no_iterations() {
        let ctx = context(Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
        }));
        let stop = CancellationToken::new();
        stop.cancel();
        let stats = VirtualUser::new(
            7,
            ctx,
            Sampler::new(None),
            Pacer::new(ThinkTime::None, None),
            None,
        )
        .run(stop)
        .await;
        assert_eq!(stats.vu_id, 7);
        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.state, VuState::Stopped);
    }
}

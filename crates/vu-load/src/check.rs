//! Named response assertions and their process-wide pass/fail counters.

use crate::client::Response;
use crate::config::CheckSpec;
use crate::error::CheckEvaluationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Predicate evaluated against a response.
pub type Predicate =
    Arc<dyn Fn(&Response) -> Result<bool, CheckEvaluationError> + Send + Sync + 'static>;

/// A named check.
#[derive(Clone)]
pub struct Check {
    pub name: String,
    pub predicate: Predicate,
}

impl Check {
    /// `predicate` should report an unreadable response as
    /// `Err(CheckEvaluationError)`, not by panicking. See [`Checker::check`].
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Response) -> Result<bool, CheckEvaluationError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Compile a declarative check from the scenario file.
    pub fn from_spec(spec: &CheckSpec) -> Self {
        match spec.clone() {
            CheckSpec::Status { name, status } => Check::new(name, move |r| Ok(r.status == status)),
            CheckSpec::StatusIn { name, statuses } => {
                Check::new(name, move |r| Ok(statuses.contains(&r.status)))
            }
            CheckSpec::BodyContains { name, text } => {
                Check::new(name, move |r| Ok(r.text().contains(text.as_str())))
            }
            CheckSpec::HeaderPresent { name, header } => {
                Check::new(name, move |r| Ok(r.header(&header).is_some()))
            }
            CheckSpec::JsonField {
                name,
                pointer,
                equals,
            } => Check::new(name, move |r| {
                let body: serde_json::Value = serde_json::from_slice(&r.body)
                    .map_err(|e| CheckEvaluationError::new(format!("body is not JSON: {}", e)))?;
                let value = body.pointer(&pointer).ok_or_else(|| {
                    CheckEvaluationError::new(format!("no field at '{}'", pointer))
                })?;
                Ok(*value == equals)
            }),
        }
    }
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

/// Outcome of one check in one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
    /// Set when the predicate could not be evaluated.
    pub diagnostic: Option<String>,
}

/// Aggregated outcome of one check name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounts {
    pub pass: u64,
    pub fail: u64,
}

impl CheckCounts {
    pub fn total(&self) -> u64 {
        self.pass + self.fail
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.pass as f64 / self.total() as f64 * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct Counter {
    pass: AtomicU64,
    fail: AtomicU64,
}

/// Evaluates checks and keeps the shared counters. Clone to share between VUs.
#[derive(Debug, Clone, Default)]
pub struct Checker {
    counters: Arc<RwLock<HashMap<String, Arc<Counter>>>>,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `predicate` and record the outcome under `name`.
    ///
    /// Errors and panics inside the predicate count as failures.
    ///
    /// A caught panic still goes through the process panic hook, which by
    /// default prints a message to stderr on every evaluation, once per
    /// iteration per VU. Predicates should return `CheckEvaluationError`
    /// instead; the panic path only keeps a buggy predicate from killing a VU.
    pub fn check<F>(&self, name: &str, response: &Response, predicate: F) -> CheckResult
    where
        F: Fn(&Response) -> Result<bool, CheckEvaluationError>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| predicate(response)));
        let (passed, diagnostic) = match outcome {
            Ok(Ok(passed)) => (passed, None),
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(payload) => (false, Some(panic_message(payload.as_ref()))),
        };

        self.record(name, passed);
        if let Some(ref diagnostic) = diagnostic {
            tracing::debug!(check = name, diagnostic = %diagnostic, "Check could not be evaluated");
        } else {
            tracing::trace!(check = name, passed, "Check evaluated");
        }

        CheckResult {
            name: name.to_string(),
            passed,
            timestamp: Utc::now(),
            diagnostic,
        }
    }

    /// Run a compiled check.
    pub fn run(&self, check: &Check, response: &Response) -> CheckResult {
        self.check(&check.name, response, |r| (check.predicate)(r))
    }

    /// Increment the pass or fail counter of `name`.
    pub fn record(&self, name: &str, passed: bool) {
        let counter = self.counter(name);
        if passed {
            counter.pass.fetch_add(1, Ordering::Relaxed);
        } else {
            counter.fail.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Make `name` appear in the report even if it is never evaluated.
    pub fn register(&self, name: &str) {
        self.counter(name);
    }

    fn counter(&self, name: &str) -> Arc<Counter> {
        // Poisoning is harmless: the map is only ever extended.
        if let Some(counter) = self
            .counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Arc::clone(counter);
        }
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(counters.entry(name.to_string()).or_default())
    }

    /// Current counts per check name.
    pub fn snapshot(&self) -> BTreeMap<String, CheckCounts> {
        self.counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, counter)| {
                (
                    name.clone(),
                    CheckCounts {
                        pass: counter.pass.load(Ordering::Relaxed),
                        fail: counter.fail.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("check panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("check panicked: {}", s)
    } else {
        "check panicked".to_string()
    }
}

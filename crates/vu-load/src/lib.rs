//! Virtual-user load testing harness.
//!
//! This crate provides tools to:
//! - Load a delimited-text dataset once and share it read-only across VUs
//! - Turn sampled records into parameterized HTTP requests
//! - Run concurrent virtual users with think-time pacing and cooperative stop
//! - Aggregate named response checks and call failures into a report

pub mod check;
pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod pacer;
pub mod report;
pub mod request;
pub mod runner;
pub mod sampler;
pub mod vu;

pub use check::{Check, CheckCounts, CheckResult, Checker};
pub use client::{HttpClient, ReqwestClient, Response};
pub use config::{CheckSpec, DatasetConfig, RequestTemplate, TestConfig, ThinkTime};
pub use dataset::{DatasetSource, DatasetStore, FileSource, InlineSource, Record};
pub use error::{
    CheckEvaluationError, ConfigError, DataLoadError, HarnessError, HarnessResult, NetworkError,
};
pub use metrics::{MetricsCollector, TestReport};
pub use pacer::Pacer;
pub use report::ResultsReport;
pub use request::{RequestBuilder, RequestSpec};
pub use runner::TestRunner;
pub use sampler::Sampler;
pub use vu::{VirtualUser, VuContext, VuState, VuStats};

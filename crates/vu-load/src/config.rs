//! Configuration loading and management.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main test configuration loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_url: String,
    pub vus: u32,
    pub duration_secs: f64,
    /// Per-VU iteration cap; the duration still applies.
    #[serde(default)]
    pub iterations: Option<u64>,
    #[serde(default)]
    pub think_time: ThinkTime,
    #[serde(default)]
    pub seed: Option<u64>, // Optional RNG seed for reproducible sampling
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default)]
    pub dataset: Option<DatasetConfig>,
    #[serde(default)]
    pub request: RequestTemplate,
    #[serde(default = "default_checks")]
    pub checks: Vec<CheckSpec>,
}

/// Upper bound for every time value: one year.
///
/// Keeps `Duration::from_secs_f64` and `Instant + Duration` in range.
pub const MAX_SECS: f64 = 365.0 * 24.0 * 3600.0;

fn within_range(secs: f64) -> bool {
    secs.is_finite() && secs <= MAX_SECS
}

fn default_timeout_secs() -> f64 {
    30.0
}

fn default_checks() -> Vec<CheckSpec> {
    vec![CheckSpec::Status {
        name: "login succeeded".to_string(),
        status: 200,
    }]
}

/// Where the shared dataset comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Label used in logs.
    #[serde(default = "default_dataset_name")]
    pub name: String,
    pub path: PathBuf,
}

fn default_dataset_name() -> String {
    "dataset".to_string()
}

/// Pause between two iterations of the same VU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkTime {
    None,
    Fixed { secs: f64 },
    /// Uniformly distributed jitter in `[min_secs, max_secs]`.
    Uniform { min_secs: f64, max_secs: f64 },
}

impl Default for ThinkTime {
    fn default() -> Self {
        ThinkTime::Fixed { secs: 1.0 }
    }
}

/// How a sampled record becomes an HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTemplate {
    #[serde(default = "default_method")]
    pub method: String,
    /// Appended to `base_url`; may contain `{{field}}` placeholders.
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
    /// Record fields serialized into the JSON body. Empty means no body.
    #[serde(default = "default_body_fields")]
    pub body_fields: Vec<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_path() -> String {
    "/api/says".to_string()
}

fn default_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers
}

fn default_body_fields() -> Vec<String> {
    vec!["name".to_string(), "message".to_string()]
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            method: default_method(),
            path: default_path(),
            headers: default_headers(),
            body_fields: default_body_fields(),
        }
    }
}

/// Declarative response assertion, compiled into a check predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckSpec {
    Status {
        name: String,
        status: u16,
    },
    StatusIn {
        name: String,
        statuses: Vec<u16>,
    },
    BodyContains {
        name: String,
        text: String,
    },
    HeaderPresent {
        name: String,
        header: String,
    },
    /// Value at a JSON pointer (RFC 6901) must equal `equals`.
    JsonField {
        name: String,
        pointer: String,
        equals: serde_json::Value,
    },
}

impl CheckSpec {
    pub fn name(&self) -> &str {
        match self {
            CheckSpec::Status { name, .. }
            | CheckSpec::StatusIn { name, .. }
            | CheckSpec::BodyContains { name, .. }
            | CheckSpec::HeaderPresent { name, .. }
            | CheckSpec::JsonField { name, .. } => name,
        }
    }
}

impl TestConfig {
    /// Configuration equivalent to the built-in `quick` scenario.
    pub fn quick(base_url: impl Into<String>, vus: u32, duration_secs: f64) -> Self {
        Self {
            name: "quick".to_string(),
            description: "POST name/message pairs and expect 200".to_string(),
            base_url: base_url.into(),
            vus,
            duration_secs,
            iterations: None,
            think_time: ThinkTime::default(),
            seed: None,
            timeout_secs: default_timeout_secs(),
            dataset: None,
            request: RequestTemplate::default(),
            checks: default_checks(),
        }
    }

    /// Load configuration from YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        let mut config: TestConfig =
            serde_yaml::from_str(&content).map_err(|error| ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            })?;

        // Dataset paths are relative to the scenario file.
        if let (Some(dataset), Some(dir)) = (config.dataset.as_mut(), path.parent()) {
            if dataset.path.is_relative() {
                dataset.path = dir.join(&dataset.path);
            }
        }
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vus < 1 {
            return Err(ConfigError::InvalidVus(self.vus));
        }
        if !(self.duration_secs > 0.0 && within_range(self.duration_secs)) {
            return Err(ConfigError::InvalidDuration(self.duration_secs));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("base_url", "must not be empty"));
        }
        if !(self.timeout_secs > 0.0 && within_range(self.timeout_secs)) {
            return Err(ConfigError::invalid(
                "timeout_secs",
                format!("must be in (0, {}]", MAX_SECS),
            ));
        }
        if self.iterations == Some(0) {
            return Err(ConfigError::invalid("iterations", "must be >= 1 when set"));
        }
        if self.request.method.parse::<reqwest::Method>().is_err() {
            return Err(ConfigError::invalid(
                "request.method",
                format!("'{}' is not an HTTP method", self.request.method),
            ));
        }
        match self.think_time {
            ThinkTime::None => {}
            ThinkTime::Fixed { secs } => {
                if !(secs >= 0.0 && within_range(secs)) {
                    return Err(ConfigError::invalid(
                        "think_time.secs",
                        format!("must be in [0, {}]", MAX_SECS),
                    ));
                }
            }
            ThinkTime::Uniform { min_secs, max_secs } => {
                if !(within_range(min_secs) && within_range(max_secs))
                    || min_secs < 0.0
                    || min_secs > max_secs
                {
                    return Err(ConfigError::invalid(
                        "think_time",
                        format!("requires 0 <= min_secs <= max_secs <= {}", MAX_SECS),
                    ));
                }
            }
        }
        for check in &self.checks {
            if check.name().is_empty() {
                return Err(ConfigError::invalid("checks", "check name must not be empty"));
            }
            if let CheckSpec::JsonField { pointer, .. } = check {
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    return Err(ConfigError::invalid(
                        "checks",
                        format!("json pointer '{}' must start with '/'", pointer),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCENARIO: &str = r#"
name: says
description: Post greetings
base_url: http://localhost:8282
vus: 20
duration_secs: 10
dataset:
  name: users
  path: data/users.csv
"#;

    #[test]
    fn test_defaults_match_builtin_scenario() {
        let config: TestConfig = serde_yaml::from_str(SCENARIO).unwrap();
        assert_eq!(config.vus, 20);
        assert_eq!(config.think_time, ThinkTime::Fixed { secs: 1.0 });
        assert_eq!(config.request.method, "POST");
        assert_eq!(config.request.path, "/api/says");
        assert_eq!(
            config.request.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(config.request.body_fields, vec!["name", "message"]);
        assert_eq!(config.checks.len(), 1);
        assert_eq!(config.checks[0].name(), "login succeeded");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file_resolves_dataset_relative_to_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("says.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();

        let config = TestConfig::from_file(&path).unwrap();
        let dataset = config.dataset.unwrap();
        assert_eq!(dataset.name, "users");
        assert_eq!(dataset.path, dir.path().join("data/users.csv"));
    }

    #[test]
    fn test_bundled_scenarios_validate() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
        for file in ["says.yaml", "says_jitter.yaml"] {
            let config = TestConfig::from_file(dir.join(file)).unwrap();
            config.validate().unwrap();
            assert!(config.dataset.unwrap().path.exists());
        }
    }

    #[test]
    fn test_from_file_missing() {
        let err = TestConfig::from_file("/nonexistent/scenario.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_vus() {
        let mut config = TestConfig::quick("http://localhost", 1, 1.0);
        config.vus = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidVus(0))));
    }

    #[test]
    fn test_validate_rejects_non_positive_duration() {
        let mut config = TestConfig::quick("http://localhost", 1, 0.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration(_))
        ));
        config.duration_secs = -3.0;
        assert!(config.validate().is_err());
        config.duration_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_times() {
        let config = TestConfig::quick("http://x", 1, 1e20);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration(_))
        ));

        let mut config = TestConfig::quick("http://x", 1, MAX_SECS);
        config.validate().unwrap();
        assert_eq!(config.duration(), Duration::from_secs(365 * 24 * 3600));

        config.timeout_secs = 1e20;
        assert!(config.validate().is_err());

        let mut config = TestConfig::quick("http://x", 1, 1.0);
        config.think_time = ThinkTime::Fixed { secs: 1e20 };
        assert!(config.validate().is_err());
        config.think_time = ThinkTime::Uniform {
            min_secs: 0.0,
            max_secs: f64::MAX,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_jitter() {
        let mut config = TestConfig::quick("http://localhost", 1, 1.0);
        config.think_time = ThinkTime::Uniform {
            min_secs: 2.0,
            max_secs: 1.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_method() {
        let mut config = TestConfig::quick("http://localhost", 1, 1.0);
        config.request.method = "NOT A METHOD".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_check_specs_parse() {
        let yaml = r#"
- type: status_in
  name: ok-ish
  statuses: [200, 201]
- type: json_field
  name: accepted
  pointer: /status
  equals: accepted
"#;
        let checks: Vec<CheckSpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            checks[0],
            CheckSpec::StatusIn {
                name: "ok-ish".to_string(),
                statuses: vec![200, 201],
            }
        );
        assert_eq!(checks[1].name(), "accepted");
    }
}

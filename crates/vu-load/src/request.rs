//! Per-iteration request construction.

use crate::config::{RequestTemplate, TestConfig};
use crate::dataset::Record;
use std::collections::BTreeMap;

/// A concrete HTTP request, owned by the VU that built it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// Maps a sampled record onto the configured request template.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: String,
    template: RequestTemplate,
}

impl RequestBuilder {
    pub fn new(config: &TestConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            template: config.request.clone(),
        }
    }

    /// Build the request for `record`. Missing fields become empty strings.
    pub fn build(&self, record: &Record) -> RequestSpec {
        let path = render(&self.template.path, record);
        let url = if path.is_empty() || path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };

        let headers = self
            .template
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), render(value, record)))
            .collect();

        let body = if self.template.body_fields.is_empty() {
            None
        } else {
            let payload: serde_json::Map<String, serde_json::Value> = self
                .template
                .body_fields
                .iter()
                .map(|field| (field.clone(), serde_json::Value::from(record.get(field))))
                .collect();
            Some(serde_json::Value::Object(payload).to_string())
        };

        RequestSpec {
            method: self.template.method.clone(),
            url,
            headers,
            body,
        }
    }
}

/// Substitute `{{field}}` placeholders from the record.
fn render(template: &str, record: &Record) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let field = rest[start + 2..start + 2 + len].trim();
        out.push_str(record.get(field));
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    out
}

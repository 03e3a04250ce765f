//! Architecture oracle: the external decision service that maps an intent to
//! resource kinds.
//!
//! Oracle output is untrusted. The pipeline checks every returned kind against
//! the catalog and never assumes two calls agree.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{OracleError, SchemaError};
use crate::loader::read_document;
use crate::types::Intent;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for one oracle round trip.
#[cfg(feature = "remote")]
pub const ORACLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Suggests the resource kinds an intent needs.
///
/// Implementations must be shareable across the batch worker pool.
pub trait ArchitectureOracle: Send + Sync {
    /// Ordered resource kind identifiers for `intent`.
    fn suggest_kinds(&self, intent: &Intent) -> Result<Vec<String>, OracleError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "oracle"
    }
}

/// Oracle backed by a fixed intent-name to kinds table.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    suggestions: BTreeMap<String, Vec<String>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `intent` with `kinds`.
    pub fn with_suggestion<I, S>(mut self, intent: impl Into<String>, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions
            .insert(intent.into(), kinds.into_iter().map(Into::into).collect());
        self
    }

    /// Build from a JSON object of `{ "<intent name>": ["<kind>", ...] }`.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let suggestions = serde_json::from_value(value.clone())
            .map_err(|source| SchemaError::InvalidJson { source })?;
        Ok(Self { suggestions })
    }

    /// Load a fixture file. See [`StaticOracle::from_value`].
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        Self::from_value(&read_document(path)?)
    }

    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }
}

impl ArchitectureOracle for StaticOracle {
    fn suggest_kinds(&self, intent: &Intent) -> Result<Vec<String>, OracleError> {
        self.suggestions
            .get(&intent.name)
            .cloned()
            .ok_or_else(|| OracleError::NoSuggestion {
                intent: intent.name.clone(),
            })
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Oracle reached over HTTP.
///
/// Sends `POST <endpoint>` with `{ "intent", "description", "provider" }` and
/// accepts either a JSON array of kinds or `{ "resource_types": [...] }`.
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpOracle {
    endpoint: String,
    provider: String,
    timeout: Duration,
}

#[cfg(feature = "remote")]
impl HttpOracle {
    pub fn new(endpoint: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            provider: provider.into(),
            timeout: ORACLE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(feature = "remote")]
impl ArchitectureOracle for HttpOracle {
    fn suggest_kinds(&self, intent: &Intent) -> Result<Vec<String>, OracleError> {
        let request_error = |source| OracleError::Request {
            intent: intent.name.clone(),
            source,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(request_error)?;

        let response = client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "intent": intent.name,
                "description": intent.description,
                "provider": self.provider,
            }))
            .send()
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status {
                intent: intent.name.clone(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().map_err(request_error)?;
        parse_suggestions(&intent.name, &body)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Extract kind identifiers from an oracle response body.
pub fn parse_suggestions(intent: &str, body: &Value) -> Result<Vec<String>, OracleError> {
    let malformed = |message: &str| OracleError::MalformedResponse {
        intent: intent.to_string(),
        message: message.to_string(),
    };

    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("resource_types") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(malformed("resource_types is not an array")),
            None => return Err(malformed("missing resource_types")),
        },
        _ => return Err(malformed("expected an array or an object")),
    };

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| malformed("resource kind is not a string"))
        })
        .filter(|kind| !matches!(kind, Ok(k) if k.is_empty()))
        .collect()
}

//! Core types shared across the compilation pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute suffix that marks a reference to another resource instance.
pub const REFERENCE_SUFFIX: &str = "_id";

/// Label of the read-only scope lookup emitted in the preamble.
pub const SCOPE_LABEL: &str = "main";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Options for loading a capability schema document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Provider entry to load (e.g. "registry.terraform.io/hashicorp/azurerm").
    pub provider_key: String,
    /// Version pin. Overrides the document's `provider_versions` entry.
    pub provider_version: Option<String>,
}

impl LoadOptions {
    pub fn new(provider_key: impl Into<String>) -> Self {
        Self {
            provider_key: provider_key.into(),
            provider_version: None,
        }
    }

    /// Pin the provider version explicitly.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.provider_version = Some(version.into());
        self
    }
}

/// Naming conventions of a provider catalog, derived from its registry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConventions {
    /// Short provider name used in configuration blocks (e.g. "azurerm").
    pub name: String,
    /// Registry source address (e.g. "hashicorp/azurerm").
    pub source: String,
    /// Prefix shared by every resource kind (e.g. "azurerm_").
    pub kind_prefix: String,
    /// Base token of the externally provisioned scope (e.g. "resource_group").
    pub scope_token: String,
    /// Base token of the billing/account scope (e.g. "subscription").
    pub account_token: String,
    /// Whether the provider block needs an empty `features {}` block.
    pub requires_features_block: bool,
}

impl ProviderConventions {
    /// Derive conventions from a provider key such as
    /// `registry.terraform.io/hashicorp/azurerm` or a bare `azurerm`.
    pub fn from_provider_key(key: &str) -> Self {
        let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        let name = segments.last().copied().unwrap_or(key).to_string();
        let source = if segments.len() >= 2 {
            segments[segments.len() - 2..].join("/")
        } else {
            name.clone()
        };

        Self {
            kind_prefix: format!("{}_", name),
            requires_features_block: name == "azurerm",
            name,
            source,
            scope_token: "resource_group".to_string(),
            account_token: "subscription".to_string(),
        }
    }

    /// Kind of the data source used for the read-only scope lookup.
    pub fn scope_data_kind(&self) -> String {
        format!("{}{}", self.kind_prefix, self.scope_token)
    }

    /// Reference to an attribute of the scope lookup, e.g.
    /// `data.azurerm_resource_group.main.name`.
    pub fn scope_reference(&self, attribute: &str) -> AttributeValue {
        AttributeValue::Reference(format!(
            "data.{}.{}.{}",
            self.scope_data_kind(),
            SCOPE_LABEL,
            attribute
        ))
    }

    /// Strip the provider prefix from a kind, if present.
    pub fn short_kind<'a>(&self, kind: &'a str) -> &'a str {
        kind.strip_prefix(self.kind_prefix.as_str()).unwrap_or(kind)
    }
}

/// Where and for whom the generated configuration is deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentContext {
    /// Externally provisioned container to deploy into (e.g. a resource group name).
    pub scope_identifier: String,
    /// Target geography.
    pub region: String,
    /// Target billing/account scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_account_identifier: Option<String>,
}

impl DeploymentContext {
    pub fn new(scope_identifier: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            scope_identifier: scope_identifier.into(),
            region: region.into(),
            provider_account_identifier: None,
        }
    }

    /// Set the provider account identifier.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.provider_account_identifier = Some(account.into());
        self
    }
}

/// A user-selected service intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Short human name, e.g. "simple website".
    pub name: String,
    /// Free-text description handed to the oracle.
    #[serde(default)]
    pub description: String,
    /// Explicit attribute values, keyed by resource kind then attribute name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Intent {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Supply an explicit value for one attribute of one resource kind.
    pub fn with_attribute(
        mut self,
        kind: impl Into<String>,
        attribute: impl Into<String>,
        value: Value,
    ) -> Self {
        self.attributes
            .entry(kind.into())
            .or_default()
            .insert(attribute.into(), value);
        self
    }
}

/// Options for a compilation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Upper bound on concurrent oracle calls in batch mode.
    pub max_parallel_oracle_calls: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_parallel_oracle_calls: 4,
        }
    }
}

impl CompileOptions {
    /// Set the oracle concurrency bound. Zero is treated as one.
    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.max_parallel_oracle_calls = n.max(1);
        self
    }
}

/// Pipeline phase of a compilation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initial,
    OracleConsulted,
    SchemaValidated,
    DependenciesClosed,
    AttributesFilled,
    Emitted,
    Failed,
}

impl Phase {
    /// The phase that follows this one on success. Terminal phases return themselves.
    pub fn next(self) -> Phase {
        match self {
            Phase::Initial => Phase::OracleConsulted,
            Phase::OracleConsulted => Phase::SchemaValidated,
            Phase::SchemaValidated => Phase::DependenciesClosed,
            Phase::DependenciesClosed => Phase::AttributesFilled,
            Phase::AttributesFilled => Phase::Emitted,
            Phase::Emitted => Phase::Emitted,
            Phase::Failed => Phase::Failed,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Initial => "initialization",
            Phase::OracleConsulted => "oracle consultation",
            Phase::SchemaValidated => "schema validation",
            Phase::DependenciesClosed => "dependency closure",
            Phase::AttributesFilled => "attribute fill",
            Phase::Emitted => "emission",
            Phase::Failed => "failure",
        };
        f.write_str(s)
    }
}

/// Address of a resource block: `<kind>.<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceAddress {
    pub kind: String,
    pub name: String,
}

impl ResourceAddress {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Cross-reference expression to one attribute of this resource.
    pub fn reference(&self, attribute: &str) -> AttributeValue {
        AttributeValue::Reference(format!("{}.{}", self, attribute))
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

/// A resolved attribute value.
///
/// References are kept apart from string literals so the generator never has
/// to guess whether to quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Number(serde_json::Number),
    Bool(bool),
    /// Cross-reference expression emitted bare, e.g. `azurerm_service_plan.shared.id`.
    Reference(String),
    List(Vec<AttributeValue>),
    Object(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn string(s: impl Into<String>) -> Self {
        AttributeValue::String(s.into())
    }

    pub fn number(n: i64) -> Self {
        AttributeValue::Number(n.into())
    }

    /// Convert an externally supplied JSON value.
    ///
    /// Strings shaped like a dotted reference expression become references;
    /// `null` yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(AttributeValue::Bool(*b)),
            Value::Number(n) => Some(AttributeValue::Number(n.clone())),
            Value::String(s) if is_reference_expression(s) => {
                Some(AttributeValue::Reference(s.clone()))
            }
            Value::String(s) => Some(AttributeValue::String(s.clone())),
            Value::Array(items) => Some(AttributeValue::List(
                items.iter().filter_map(AttributeValue::from_json).collect(),
            )),
            Value::Object(map) => Some(AttributeValue::Object(
                map.iter()
                    .filter_map(|(k, v)| AttributeValue::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, AttributeValue::Reference(_))
    }
}

/// Whether a raw string is a cross-reference expression rather than a literal.
///
/// The string must not start with a quote, must contain a `.`, and must be a
/// dotted path of identifiers whose head is a resource kind (contains `_`) or
/// one of `data`, `var`, `local`, `module`. This keeps literals such as
/// `"1.2"` or `"www.example.com"` quoted.
pub fn is_reference_expression(s: &str) -> bool {
    if s.starts_with('"') || !s.contains('.') {
        return false;
    }

    let segments: Vec<&str> = s.split('.').collect();
    let identifier_shaped = segments.iter().all(|seg| {
        let mut chars = seg.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            }
            _ => false,
        }
    });

    identifier_shaped
        && (matches!(segments[0], "data" | "var" | "local" | "module") || segments[0].contains('_'))
}

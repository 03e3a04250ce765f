//! Archy: schema-driven intent compiler
//!
//! Compiles abstract service intents ("simple website", "message queue") into
//! a complete, provider-valid declarative configuration. A provider capability
//! schema is the only source of truth; an external architecture oracle only
//! answers "which resource kinds does this intent need", and its answers are
//! checked against the schema before use.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use archy::{load_schema_str, Compiler, DeploymentContext, Intent, LoadOptions, StaticOracle};
//!
//! let catalog = r#"{
//!   "provider_versions": { "hashicorp/azurerm": "3.85.0" },
//!   "provider_schemas": { "hashicorp/azurerm": { "resource_schemas": {
//!     "azurerm_linux_web_app": { "block": { "attributes": {
//!       "name": { "type": "string", "required": true },
//!       "service_plan_id": { "type": "string", "required": true }
//!     } } },
//!     "azurerm_service_plan": { "block": { "attributes": {
//!       "name": { "type": "string", "required": true },
//!       "sku_name": { "type": "string", "required": true }
//!     } } }
//!   } } }
//! }"#;
//!
//! let repo = load_schema_str(catalog, &LoadOptions::new("hashicorp/azurerm")).unwrap();
//! let oracle = StaticOracle::new().with_suggestion("simple website", ["azurerm_linux_web_app"]);
//! let compiler = Compiler::new(Arc::new(repo), Arc::new(oracle));
//!
//! let context = DeploymentContext::new("rg-demo", "westeurope");
//! let result = compiler
//!     .compile_one(&Intent::new("simple website", "a small static site"), &context)
//!     .unwrap();
//!
//! // The hosting plan was created to satisfy the web app's required reference.
//! assert!(result.configuration.contains("service_plan_id = azurerm_service_plan.shared.id"));
//! ```
//!
//! # Pipeline
//!
//! | Phase | Work |
//! |-------|------|
//! | `OracleConsulted` | One oracle call per intent (bounded parallel in batches) |
//! | `SchemaValidated` | Unknown kinds dropped, explicit values checked |
//! | `DependenciesClosed` | Required references linked, shared nodes created once per run |
//! | `AttributesFilled` | Required attributes inferred, full maps validated |
//! | `Emitted` | Preamble plus one block per node in dependency order |

mod codegen;
mod dependency;
mod error;
mod graph;
mod inference;
mod linter;
mod loader;
mod oracle;
mod pipeline;
mod schema;
mod types;
mod validator;

pub use codegen::{render_value, CodeGenerator};
pub use dependency::{
    is_platform_attribute, is_reference_attribute, reference_base, reference_candidates,
    resolve_reference, DependencyBranch, DependencyResolver, DependencyTree, ReferenceResolution,
    ResourceDependency, AMBIGUOUS_TOKENS,
};
pub use error::{AttributeViolation, CompileError, CompileFailure, OracleError, SchemaError};
pub use graph::{DependencyEdge, GraphLookup, NodeOrigin, ResourceGraph, ResourceNode};
pub use inference::{
    default_rules, generated_name, sanitize_label, DependencyLookup, InferenceEngine,
    InferenceInput, InferenceRule,
};
pub use linter::{lint_catalog, lint_kind, Diagnostic, KindResult, KindStatus, LintResult, Severity};
pub use loader::{
    is_url, load_schema, load_schema_auto, load_schema_str, parse_document, read_document,
    simplify_type,
};
pub use oracle::{parse_suggestions, ArchitectureOracle, StaticOracle};
pub use pipeline::{Compilation, Compiler, IntentReport, IntentStatus, SHARED_LABEL};
pub use schema::{
    AttributeSpec, BlockSpec, ElementType, NestedBlockSpec, NestingMode, ResourceModel,
    SchemaRepository, TypeTag,
};
pub use types::{
    is_reference_expression, AttributeValue, CompileOptions, DeploymentContext, Intent,
    LoadOptions, Phase, ProviderConventions, ResourceAddress,
};
pub use validator::{check_settable, validate_attributes, AttributeValidation};

#[cfg(feature = "remote")]
pub use loader::load_schema_url;
#[cfg(feature = "remote")]
pub use oracle::HttpOracle;

//! Catalog linting - static analysis of a loaded provider catalog.
//!
//! Checks every resource kind for:
//! - Required dependencies that lead back to the kind itself (`required-cycle`)
//! - Required reference attributes that match no kind (`unresolved-reference`)
//! - Generic reference tokens picked from several catalog-wide matches (`ambiguous-reference`)

use std::collections::HashSet;

use serde::Serialize;

use crate::dependency::{is_reference_attribute, resolve_reference, DependencyResolver};

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    pub message: String,
}

/// Status of a linted kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KindStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a single resource kind.
#[derive(Debug, Clone, Serialize)]
pub struct KindResult {
    pub kind: String,
    pub status: KindStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of linting a whole catalog.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub provider: String,
    pub kinds_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    /// Only kinds with at least one diagnostic.
    pub results: Vec<KindResult>,
}

impl LintResult {
    /// Returns true if no kind has errors.
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint every kind in the resolver's catalog.
///
/// If `strict` is true, kinds with warnings count as failed.
pub fn lint_catalog(resolver: &DependencyResolver, strict: bool) -> LintResult {
    let repo = resolver.repository();
    let kinds = repo.get_all_resource_kinds();

    let mut results = Vec::new();
    let mut errors = 0;
    let mut warnings = 0;
    let mut failed = 0;

    for kind in &kinds {
        let result = lint_kind(resolver, kind);
        errors += count(&result, Severity::Error);
        warnings += count(&result, Severity::Warning);

        let fails = match result.status {
            KindStatus::Ok => false,
            KindStatus::Warning => strict,
            KindStatus::Error => true,
        };
        if fails {
            failed += 1;
        }
        if result.status != KindStatus::Ok {
            results.push(result);
        }
    }

    tracing::debug!(kinds = kinds.len(), errors, warnings, "catalog lint finished");

    LintResult {
        provider: repo.provider_key().to_string(),
        kinds_checked: kinds.len(),
        passed: kinds.len() - failed,
        failed,
        errors,
        warnings,
        results,
    }
}

/// Lint a single resource kind.
pub fn lint_kind(resolver: &DependencyResolver, kind: &str) -> KindResult {
    let repo = resolver.repository();
    let mut diagnostics = Vec::new();

    if let Some(cycle) = required_cycle(resolver, kind) {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            code: "required-cycle".to_string(),
            kind: kind.to_string(),
            attribute: None,
            message: format!("required dependencies form a cycle: {}", cycle.join(" -> ")),
        });
    }

    if let Some(model) = repo.get_resource_model(kind) {
        let conventions = repo.conventions();
        for attr in model.required_attributes() {
            if !is_reference_attribute(conventions, &attr.name, &attr.type_tag) {
                continue;
            }
            match resolve_reference(repo, kind, &attr.name) {
                None => diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    code: "unresolved-reference".to_string(),
                    kind: kind.to_string(),
                    attribute: Some(attr.name.clone()),
                    message: "required reference matches no kind in the catalog; it must be supplied explicitly".to_string(),
                }),
                Some(resolution) => {
                    if resolution.scanned && !resolution.alternatives.is_empty() {
                        diagnostics.push(Diagnostic {
                            severity: Severity::Warning,
                            code: "ambiguous-reference".to_string(),
                            kind: kind.to_string(),
                            attribute: Some(attr.name.clone()),
                            message: format!(
                                "resolves to {}; also matches {}",
                                resolution.target,
                                resolution.alternatives.join(", ")
                            ),
                        });
                    }
                }
            }
        }
    }

    let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
    let status = if has_errors {
        KindStatus::Error
    } else if diagnostics.is_empty() {
        KindStatus::Ok
    } else {
        KindStatus::Warning
    };

    KindResult {
        kind: kind.to_string(),
        status,
        diagnostics,
    }
}

fn count(result: &KindResult, severity: Severity) -> usize {
    result
        .diagnostics
        .iter()
        .filter(|d| d.severity == severity)
        .count()
}

/// Path from `start` back to itself through required dependencies, if any.
fn required_cycle(resolver: &DependencyResolver, start: &str) -> Option<Vec<String>> {
    let mut path = vec![start.to_string()];
    let mut visited = HashSet::new();
    if walk(resolver, start, start, &mut path, &mut visited) {
        Some(path)
    } else {
        None
    }
}

fn walk(
    resolver: &DependencyResolver,
    start: &str,
    current: &str,
    path: &mut Vec<String>,
    visited: &mut HashSet<String>,
) -> bool {
    for dep in resolver.get_required_dependencies(current) {
        if dep.resource_type == start {
            path.push(dep.resource_type);
            return true;
        }
        if !visited.insert(dep.resource_type.clone()) {
            continue;
        }
        path.push(dep.resource_type.clone());
        if walk(resolver, start, &dep.resource_type, path, visited) {
            return true;
        }
        path.pop();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_document;
    use crate::types::LoadOptions;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn resolver(kinds: Value) -> DependencyResolver {
        let doc = json!({
            "provider_versions": { "acme/acme": "1.0.0" },
            "provider_schemas": { "acme/acme": { "resource_schemas": kinds } }
        });
        DependencyResolver::new(Arc::new(
            parse_document(&doc, &LoadOptions::new("acme/acme")).unwrap(),
        ))
    }

    fn kind(attrs: Value) -> Value {
        json!({ "block": { "attributes": attrs } })
    }

    #[test]
    fn lint_clean_catalog() {
        let resolver = resolver(json!({
            "acme_plan": kind(json!({ "name": { "type": "string", "required": true } })),
            "acme_app": kind(json!({ "plan_id": { "type": "string", "required": true } }))
        }));

        let result = lint_catalog(&resolver, false);
        assert_eq!(result.kinds_checked, 2);
        assert_eq!(result.passed, 2);
        assert!(result.results.is_empty());
        assert!(result.is_ok());
    }

    #[test]
    fn lint_required_cycle() {
        let resolver = resolver(json!({
            "acme_x": kind(json!({ "y_id": { "type": "string", "required": true } })),
            "acme_y": kind(json!({ "x_id": { "type": "string", "required": true } }))
        }));

        let result = lint_kind(&resolver, "acme_x");
        assert_eq!(result.status, KindStatus::Error);
        assert_eq!(result.diagnostics[0].code, "required-cycle");
        assert!(result.diagnostics[0].message.ends_with("acme_x -> acme_y -> acme_x"));

        let result = lint_catalog(&resolver, false);
        assert_eq!(result.errors, 2);
        assert_eq!(result.failed, 2);
        assert!(!result.is_ok());
    }

    #[test]
    fn lint_unresolved_reference() {
        let resolver = resolver(json!({
            "acme_app": kind(json!({
                "vault_id": { "type": "string", "required": true },
                "subscription_id": { "type": "string", "required": true },
                "backup_id": { "type": "string", "optional": true }
            }))
        }));

        let result = lint_kind(&resolver, "acme_app");
        assert_eq!(result.status, KindStatus::Warning);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, "unresolved-reference");
        assert_eq!(result.diagnostics[0].attribute.as_deref(), Some("vault_id"));
    }

    #[test]
    fn lint_ambiguous_reference() {
        let resolver = resolver(json!({
            "acme_mssql_server": kind(json!({})),
            "acme_postgresql_server": kind(json!({})),
            "acme_firewall_rule": kind(json!({ "server_id": { "type": "string", "required": true } }))
        }));

        let result = lint_kind(&resolver, "acme_firewall_rule");
        assert_eq!(result.status, KindStatus::Warning);
        assert_eq!(result.diagnostics[0].code, "ambiguous-reference");
        assert_eq!(
            result.diagnostics[0].message,
            "resolves to acme_mssql_server; also matches acme_postgresql_server"
        );
    }

    #[test]
    fn own_namespace_match_is_not_ambiguous() {
        let resolver = resolver(json!({
            "acme_mssql_server": kind(json!({})),
            "acme_postgresql_server": kind(json!({})),
            "acme_mssql_database": kind(json!({ "server_id": { "type": "string", "required": true } }))
        }));

        let result = lint_kind(&resolver, "acme_mssql_database");
        assert_eq!(result.status, KindStatus::Ok);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn lint_strict_mode() {
        let resolver = resolver(json!({
            "acme_app": kind(json!({ "vault_id": { "type": "string", "required": true } }))
        }));

        // Non-strict: warnings don't cause failure
        let result = lint_catalog(&resolver, false);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.warnings, 1);

        // Strict: warnings cause failure
        let result = lint_catalog(&resolver, true);
        assert_eq!(result.passed, 0);
        assert_eq!(result.failed, 1);
    }
}

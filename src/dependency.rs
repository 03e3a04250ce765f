//! Dependency inference from schema shape.
//!
//! A resource kind depends on another kind when one of its string attributes
//! ends in `_id` and the stripped base token names an existing kind. There is
//! no kind-to-kind table: every link is found by generating an ordered list of
//! candidate kind names and taking the first one the catalog contains.
//!
//! Candidate order (most specific first):
//!
//! 1. The base token under the kind's own namespace, longest namespace first
//!    (`azurerm_servicebus_queue` + `namespace` -> `azurerm_servicebus_namespace`).
//! 2. The bare base token under the provider prefix (`azurerm_service_plan`).
//! 3. For ambiguous generic tokens (`server`, `database`, ...), every catalog
//!    kind ending in `_<token>`, in catalog order.
//! 4. The underscore-stripped compact token (`azurerm_serviceplan`).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::schema::{AttributeSpec, BlockSpec, SchemaRepository, TypeTag};
use crate::types::{ProviderConventions, REFERENCE_SUFFIX};

/// Generic tokens that may name several concrete kinds.
pub const AMBIGUOUS_TOKENS: &[&str] = &[
    "server",
    "database",
    "namespace",
    "workspace",
    "cluster",
    "gateway",
];

/// One inferred structural dependency of a resource kind on another kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceDependency {
    /// Kind depended upon.
    pub resource_type: String,
    /// Attribute on the dependent kind that carries the reference.
    pub attribute_name: String,
    pub required: bool,
}

/// How a reference attribute resolved, with the other existing candidates that lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceResolution {
    pub target: String,
    /// The target was picked from the catalog-wide scan for an ambiguous
    /// token, not from the kind's own namespace or the bare token.
    pub scanned: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
}

/// Bounded-depth transitive dependency tree of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyTree {
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyBranch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyBranch {
    pub attribute: String,
    pub required: bool,
    pub tree: DependencyTree,
}

/// Strip the reference suffix from an attribute name.
pub fn reference_base(attribute: &str) -> Option<&str> {
    attribute
        .strip_suffix(REFERENCE_SUFFIX)
        .filter(|base| !base.is_empty())
}

/// Scope- and account-shaped attributes are filled from the deployment
/// context, never treated as links to other resources.
pub fn is_platform_attribute(conventions: &ProviderConventions, attribute: &str) -> bool {
    attribute == conventions.scope_token
        || attribute.starts_with(&format!("{}_", conventions.scope_token))
        || reference_base(attribute) == Some(conventions.account_token.as_str())
}

/// Whether an attribute can carry a cross-resource reference.
pub fn is_reference_attribute(
    conventions: &ProviderConventions,
    attribute: &str,
    type_tag: &TypeTag,
) -> bool {
    type_tag.is_string()
        && reference_base(attribute).is_some()
        && !is_platform_attribute(conventions, attribute)
}

/// Ordered candidate kinds for a reference base token found on `kind`.
///
/// Candidates need not exist; callers take the first one that does. The
/// owning kind itself is never a candidate.
pub fn reference_candidates(repo: &SchemaRepository, kind: &str, base: &str) -> Vec<String> {
    ranked_candidates(repo, kind, base)
        .into_iter()
        .map(|(candidate, _)| candidate)
        .collect()
}

/// Candidates paired with whether they came only from the catalog-wide scan
/// for an ambiguous token.
fn ranked_candidates(repo: &SchemaRepository, kind: &str, base: &str) -> Vec<(String, bool)> {
    let conventions = repo.conventions();
    let prefix = conventions.kind_prefix.as_str();
    let segments: Vec<&str> = conventions.short_kind(kind).split('_').collect();

    let mut candidates = Vec::new();

    for n in (1..segments.len()).rev() {
        candidates.push((format!("{}{}_{}", prefix, segments[..n].join("_"), base), false));
    }

    candidates.push((format!("{}{}", prefix, base), false));

    if AMBIGUOUS_TOKENS.contains(&base) {
        let suffix = format!("_{}", base);
        candidates.extend(
            repo.get_all_resource_kinds()
                .into_iter()
                .filter(|k| k.ends_with(&suffix))
                .map(|k| (k.to_string(), true)),
        );
    }

    let compact = base.replace('_', "");
    if compact != base {
        candidates.push((format!("{}{}", prefix, compact), false));
    }

    let mut seen = HashSet::new();
    candidates.retain(|(c, _)| c != kind && seen.insert(c.clone()));
    candidates
}

/// First existing candidate for a reference attribute, plus the losers.
pub fn resolve_reference(
    repo: &SchemaRepository,
    kind: &str,
    attribute: &str,
) -> Option<ReferenceResolution> {
    let base = reference_base(attribute)?;
    let mut existing = ranked_candidates(repo, kind, base)
        .into_iter()
        .filter(|(c, _)| repo.contains_kind(c));

    let (target, scanned) = existing.next()?;
    Some(ReferenceResolution {
        target,
        scanned,
        alternatives: existing.map(|(c, _)| c).collect(),
    })
}

/// Infers and caches dependencies per resource kind.
///
/// The cache lives as long as the resolver, which is tied to one repository.
/// Concurrent first access may compute a kind twice; both results are equal.
#[derive(Debug)]
pub struct DependencyResolver {
    repo: Arc<SchemaRepository>,
    cache: DashMap<String, Arc<Vec<ResourceDependency>>>,
}

impl DependencyResolver {
    pub fn new(repo: Arc<SchemaRepository>) -> Self {
        Self {
            repo,
            cache: DashMap::new(),
        }
    }

    pub fn repository(&self) -> &Arc<SchemaRepository> {
        &self.repo
    }

    /// Every inferred dependency of `kind`: required attributes (top level,
    /// then inside required nested blocks), then optional ones.
    /// Unknown kinds have none.
    pub fn get_dependencies(&self, kind: &str) -> Arc<Vec<ResourceDependency>> {
        if let Some(hit) = self.cache.get(kind) {
            return Arc::clone(hit.value());
        }

        let computed = Arc::new(self.compute(kind));
        Arc::clone(
            self.cache
                .entry(kind.to_string())
                .or_insert(computed)
                .value(),
        )
    }

    pub fn get_required_dependencies(&self, kind: &str) -> Vec<ResourceDependency> {
        self.get_dependencies(kind)
            .iter()
            .filter(|d| d.required)
            .cloned()
            .collect()
    }

    #[cfg(test)]
    fn cached_kinds(&self) -> usize {
        self.cache.len()
    }

    /// Transitive dependencies of `kind` up to `max_depth` levels.
    ///
    /// A kind already expanded elsewhere in the tree appears again as a leaf.
    pub fn build_dependency_tree(&self, kind: &str, max_depth: usize) -> Option<DependencyTree> {
        if !self.repo.contains_kind(kind) {
            return None;
        }
        let mut visited = HashSet::new();
        Some(self.tree(kind, 0, max_depth, &mut visited))
    }

    /// Dependency map for every kind in the catalog that has at least one dependency.
    pub fn build_provider_dependency_graph(&self) -> BTreeMap<String, Vec<ResourceDependency>> {
        self.repo
            .get_all_resource_kinds()
            .into_iter()
            .filter_map(|kind| {
                let deps = self.get_dependencies(kind);
                (!deps.is_empty()).then(|| (kind.to_string(), deps.as_ref().clone()))
            })
            .collect()
    }

    fn compute(&self, kind: &str) -> Vec<ResourceDependency> {
        let Some(model) = self.repo.get_resource_model(kind) else {
            return Vec::new();
        };
        let conventions = self.repo.conventions();

        let mut nested = Vec::new();
        collect_nested_required(&model.block, &mut nested);
        let mut seen = HashSet::new();

        let required = model.required_attributes().iter().map(|a| (a, true));
        let optional = model.optional_attributes().iter().map(|a| (a, false));
        let nested = nested.into_iter().map(|a| (a, true));

        required
            .chain(nested)
            .chain(optional)
            .filter(|(attr, _)| is_reference_attribute(conventions, &attr.name, &attr.type_tag))
            .filter(|(attr, _)| seen.insert(attr.name.clone()))
            .filter_map(|(attr, required)| {
                let resolution = resolve_reference(&self.repo, kind, &attr.name)?;
                tracing::debug!(
                    kind,
                    attribute = %attr.name,
                    target = %resolution.target,
                    "inferred dependency"
                );
                Some(ResourceDependency {
                    resource_type: resolution.target,
                    attribute_name: attr.name.clone(),
                    required,
                })
            })
            .collect()
    }

    fn tree(
        &self,
        kind: &str,
        depth: usize,
        max_depth: usize,
        visited: &mut HashSet<String>,
    ) -> DependencyTree {
        visited.insert(kind.to_string());

        let mut dependencies = Vec::new();
        if depth < max_depth {
            for dep in self.get_dependencies(kind).iter() {
                let tree = if visited.contains(&dep.resource_type) {
                    DependencyTree {
                        kind: dep.resource_type.clone(),
                        dependencies: Vec::new(),
                    }
                } else {
                    self.tree(&dep.resource_type, depth + 1, max_depth, visited)
                };
                dependencies.push(DependencyBranch {
                    attribute: dep.attribute_name.clone(),
                    required: dep.required,
                    tree,
                });
            }
        }

        DependencyTree {
            kind: kind.to_string(),
            dependencies,
        }
    }
}

/// Required attributes of every required nested block, depth first. These
/// are emitted for every node of the kind, so their references are required
/// dependencies like top-level ones.
fn collect_nested_required<'a>(block: &'a BlockSpec, out: &mut Vec<&'a AttributeSpec>) {
    for nested in block.required_blocks() {
        out.extend(&nested.block.required_attributes);
        collect_nested_required(&nested.block, out);
    }
}

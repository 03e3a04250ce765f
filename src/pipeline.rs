//! Compilation pipeline.
//!
//! One run moves through `Initial -> OracleConsulted -> SchemaValidated ->
//! DependenciesClosed -> AttributesFilled -> Emitted`; any unrecoverable error
//! ends it in `Failed`, reported as a [`CompileFailure`] naming the phase.
//!
//! In a batch, oracle calls run concurrently on a bounded pool. Everything
//! after that is a single-threaded merge over the results in intent order, so
//! output does not depend on which call finished first. A failing intent is
//! reported and skipped; the run fails only when no intent survives.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::codegen::CodeGenerator;
use crate::dependency::DependencyResolver;
use crate::error::{CompileError, CompileFailure, OracleError};
use crate::graph::{NodeOrigin, ResourceGraph, ResourceNode};
use crate::inference::{sanitize_label, InferenceEngine};
use crate::oracle::ArchitectureOracle;
use crate::schema::SchemaRepository;
use crate::types::{AttributeValue, CompileOptions, DeploymentContext, Intent, Phase};
use crate::validator::{check_settable, validate_attributes};

/// Label given to nodes created only to satisfy a dependency.
pub const SHARED_LABEL: &str = "shared";

/// Outcome of one intent within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Compiled,
    Failed,
}

/// Per-intent record of what the oracle said and what was kept.
#[derive(Debug, Clone, Serialize)]
pub struct IntentReport {
    pub intent: String,
    pub status: IntentStatus,
    /// Kinds as returned by the oracle.
    pub suggested: Vec<String>,
    /// Kinds found in the catalog, deduplicated.
    pub accepted: Vec<String>,
    /// Kinds the catalog does not have.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<String>,
    /// Ids of nodes created for this intent.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntentReport {
    fn new(intent: &Intent) -> Self {
        Self {
            intent: intent.name.clone(),
            status: IntentStatus::Compiled,
            suggested: Vec::new(),
            accepted: Vec::new(),
            dropped: Vec::new(),
            nodes: Vec::new(),
            error: None,
        }
    }

    fn fail(&mut self, error: &impl std::fmt::Display) {
        self.status = IntentStatus::Failed;
        self.error = Some(error.to_string());
    }

    pub fn is_compiled(&self) -> bool {
        self.status == IntentStatus::Compiled
    }
}

/// A successful run.
#[derive(Debug, Clone, Serialize)]
pub struct Compilation {
    /// Generated configuration text.
    #[serde(skip)]
    pub configuration: String,
    pub graph: ResourceGraph,
    pub intents: Vec<IntentReport>,
}

impl Compilation {
    /// Oracle suggestions dropped across all intents, in intent order.
    pub fn dropped_kinds(&self) -> Vec<&str> {
        self.intents
            .iter()
            .flat_map(|r| r.dropped.iter().map(String::as_str))
            .collect()
    }

    pub fn failed_intents(&self) -> impl Iterator<Item = &IntentReport> {
        self.intents.iter().filter(|r| !r.is_compiled())
    }
}

/// Drives intents through the pipeline against one catalog and one oracle.
pub struct Compiler {
    repo: Arc<SchemaRepository>,
    oracle: Arc<dyn ArchitectureOracle>,
    resolver: DependencyResolver,
    inference: InferenceEngine,
    options: CompileOptions,
}

impl Compiler {
    pub fn new(repo: Arc<SchemaRepository>, oracle: Arc<dyn ArchitectureOracle>) -> Self {
        Self {
            resolver: DependencyResolver::new(Arc::clone(&repo)),
            inference: InferenceEngine::new(repo.conventions().clone()),
            repo,
            oracle,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the attribute inference rules.
    pub fn with_inference(mut self, inference: InferenceEngine) -> Self {
        self.inference = inference;
        self
    }

    pub fn repository(&self) -> &Arc<SchemaRepository> {
        &self.repo
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Compile a single intent.
    pub fn compile_one(
        &self,
        intent: &Intent,
        context: &DeploymentContext,
    ) -> Result<Compilation, CompileFailure> {
        self.compile(std::slice::from_ref(intent), context)
    }

    /// Compile a batch of intents into one configuration.
    ///
    /// # Errors
    ///
    /// A [`CompileFailure`] naming the phase that failed. Oracle failures and
    /// intents whose suggestions are all unknown only fail the run when no
    /// intent survives; with a single intent its own error is returned.
    pub fn compile(
        &self,
        intents: &[Intent],
        context: &DeploymentContext,
    ) -> Result<Compilation, CompileFailure> {
        let mut phase = Phase::Initial;
        tracing::debug!(intents = intents.len(), provider = %self.repo.provider_key(), "compilation started");

        let mut reports: Vec<IntentReport> = intents.iter().map(IntentReport::new).collect();
        let mut errors: Vec<Option<CompileError>> = intents.iter().map(|_| None).collect();

        // Oracle consultation.
        phase = self.advance(phase);
        let suggestions = self.consult(intents).map_err(|e| CompileFailure::new(phase, e))?;

        let mut accepted: Vec<Option<Vec<String>>> = Vec::with_capacity(intents.len());
        for (i, result) in suggestions.into_iter().enumerate() {
            match result {
                Ok(kinds) => {
                    reports[i].suggested = kinds.clone();
                    accepted.push(Some(kinds));
                }
                Err(err) => {
                    tracing::warn!(intent = %err.intent(), error = %err, "oracle call failed");
                    reports[i].fail(&err);
                    errors[i] = Some(err.into());
                    accepted.push(None);
                }
            }
        }
        survivors(&accepted, &mut errors, phase)?;

        // Schema validation of suggestions and explicit values.
        phase = self.advance(phase);
        for (i, slot) in accepted.iter_mut().enumerate() {
            let Some(kinds) = slot.take() else { continue };
            let (known, dropped) = self.filter_kinds(&intents[i], kinds);
            reports[i].accepted = known.clone();
            reports[i].dropped = dropped;

            if known.is_empty() {
                let err = CompileError::NoValidKinds {
                    intent: intents[i].name.clone(),
                };
                tracing::warn!(intent = %intents[i].name, "no suggested kind is in the catalog");
                reports[i].fail(&err);
                errors[i] = Some(err);
                continue;
            }

            self.check_overrides(&intents[i])
                .map_err(|e| CompileFailure::new(phase, e))?;
            *slot = Some(known);
        }
        survivors(&accepted, &mut errors, phase)?;

        // Node creation and dependency closure.
        phase = self.advance(phase);
        let mut graph = ResourceGraph::new();
        let mut owners: HashMap<String, usize> = HashMap::new();
        for (i, kinds) in accepted.iter().enumerate() {
            let Some(kinds) = kinds else { continue };
            let label = sanitize_label(&intents[i].name);
            for kind in kinds {
                let mut node = ResourceNode::new(
                    kind.clone(),
                    unique_label(&graph, kind, &label),
                    NodeOrigin::Intent {
                        intent: intents[i].name.clone(),
                    },
                );
                apply_overrides(&mut node, intents[i].attributes.get(kind));
                let id = graph
                    .add_node(node)
                    .map_err(|e| CompileFailure::new(phase, e))?;
                owners.insert(id.clone(), i);
                reports[i].nodes.push(id);
            }
        }
        self.close_dependencies(&mut graph, &mut owners, intents, &accepted)
            .map_err(|e| CompileFailure::new(phase, e))?;
        graph
            .topological_order()
            .map_err(|e| CompileFailure::new(phase, e))?;

        // Attribute fill.
        phase = self.advance(phase);
        self.fill_attributes(&mut graph, context)
            .map_err(|e| CompileFailure::new(phase, e))?;

        // Emission.
        phase = self.advance(phase);
        let configuration = CodeGenerator::new(&self.repo)
            .with_inference(self.inference.clone())
            .generate(&graph, context)
            .map_err(|e| CompileFailure::new(phase, e))?;

        tracing::info!(
            nodes = graph.len(),
            edges = graph.edges().len(),
            failed_intents = reports.iter().filter(|r| !r.is_compiled()).count(),
            "compilation finished"
        );

        Ok(Compilation {
            configuration,
            graph,
            intents: reports,
        })
    }

    fn advance(&self, phase: Phase) -> Phase {
        let next = phase.next();
        tracing::debug!(from = %phase, to = %next, "phase transition");
        next
    }

    /// One oracle call per intent; concurrent on a bounded pool for batches.
    fn consult(
        &self,
        intents: &[Intent],
    ) -> Result<Vec<Result<Vec<String>, OracleError>>, CompileError> {
        let oracle = &self.oracle;
        if intents.len() <= 1 || self.options.max_parallel_oracle_calls <= 1 {
            return Ok(intents.iter().map(|i| oracle.suggest_kinds(i)).collect());
        }

        let threads = self.options.max_parallel_oracle_calls.min(intents.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("archy-oracle-{}", i))
            .build()
            .map_err(|e| CompileError::WorkerPool {
                message: e.to_string(),
            })?;

        tracing::debug!(threads, oracle = oracle.name(), "consulting oracle in parallel");
        Ok(pool.install(|| {
            intents
                .par_iter()
                .map(|intent| oracle.suggest_kinds(intent))
                .collect()
        }))
    }

    /// Split oracle output into catalog kinds (deduplicated, in order) and unknown kinds.
    fn filter_kinds(&self, intent: &Intent, kinds: Vec<String>) -> (Vec<String>, Vec<String>) {
        let mut known: Vec<String> = Vec::new();
        let mut dropped = Vec::new();
        for kind in kinds {
            if !self.repo.contains_kind(&kind) {
                tracing::warn!(intent = %intent.name, kind = %kind, "dropping unknown kind suggested by oracle");
                dropped.push(kind);
            } else if !known.contains(&kind) {
                known.push(kind);
            }
        }
        (known, dropped)
    }

    fn check_overrides(&self, intent: &Intent) -> Result<(), CompileError> {
        for (kind, values) in &intent.attributes {
            let result = check_settable(&self.repo, kind, values.keys());
            if !result.valid {
                return Err(CompileError::InvalidAttributes {
                    kind: kind.clone(),
                    errors: result.errors,
                });
            }
        }
        Ok(())
    }

    /// Link every node to a node of each kind it requires, creating one
    /// shared node per missing kind for the whole run.
    fn close_dependencies(
        &self,
        graph: &mut ResourceGraph,
        owners: &mut HashMap<String, usize>,
        intents: &[Intent],
        accepted: &[Option<Vec<String>>],
    ) -> Result<(), CompileError> {
        let mut worklist: VecDeque<String> = graph.nodes().iter().map(|n| n.id.clone()).collect();

        while let Some(id) = worklist.pop_front() {
            let Some(node) = graph.node(&id) else { continue };
            let kind = node.kind.clone();
            let owner = owners.get(&id).copied();

            for dep in self.resolver.get_required_dependencies(&kind) {
                let explicit = graph
                    .node(&id)
                    .is_some_and(|n| n.attributes.contains_key(&dep.attribute_name));
                if explicit {
                    continue;
                }

                let target = match find_provider(graph, owners, &dep.resource_type, owner) {
                    Some(existing) => existing,
                    None => {
                        let mut shared = ResourceNode::new(
                            dep.resource_type.clone(),
                            unique_label(graph, &dep.resource_type, SHARED_LABEL),
                            NodeOrigin::Dependency,
                        );
                        for (i, intent) in intents.iter().enumerate() {
                            if accepted[i].is_some() {
                                apply_overrides(&mut shared, intent.attributes.get(&dep.resource_type));
                            }
                        }
                        let new_id = graph.add_node(shared)?;
                        tracing::info!(
                            kind = %dep.resource_type,
                            required_by = %kind,
                            attribute = %dep.attribute_name,
                            "created shared dependency"
                        );
                        if let Some(owner) = owner {
                            owners.insert(new_id.clone(), owner);
                        }
                        worklist.push_back(new_id.clone());
                        new_id
                    }
                };

                graph.add_edge(&id, &target, &dep.attribute_name)?;
            }
        }
        Ok(())
    }

    fn fill_attributes(
        &self,
        graph: &mut ResourceGraph,
        context: &DeploymentContext,
    ) -> Result<(), CompileError> {
        let ids: Vec<String> = graph.nodes().iter().map(|n| n.id.clone()).collect();

        for id in ids {
            let Some(node) = graph.node(&id) else { continue };
            let model = self.repo.get_resource_model(&node.kind).ok_or_else(|| {
                crate::error::SchemaError::UnknownKind {
                    kind: node.kind.clone(),
                }
            })?;

            let lookup = graph.lookup_for(&id);
            let mut inferred: BTreeMap<String, AttributeValue> = BTreeMap::new();
            for attr in model.required_attributes() {
                if node.attributes.contains_key(&attr.name) {
                    continue;
                }
                match self
                    .inference
                    .infer_default_value(&attr.name, &attr.type_tag, node, context, &lookup)
                {
                    Some(value) => {
                        inferred.insert(attr.name.clone(), value);
                    }
                    None => {
                        let rule = self.inference.matching_rule(
                            &attr.name,
                            &attr.type_tag,
                            node,
                            context,
                            &lookup,
                        );
                        tracing::error!(
                            kind = %node.kind,
                            attribute = %attr.name,
                            rule = rule.unwrap_or("none"),
                            "cannot infer required attribute"
                        );
                        return Err(CompileError::UnresolvableAttribute {
                            kind: node.kind.clone(),
                            attribute: attr.name.clone(),
                        });
                    }
                }
            }

            let kind = node.kind.clone();
            if let Some(node) = graph.node_mut(&id) {
                node.attributes.extend(inferred);

                let result = validate_attributes(&self.repo, &kind, node.attributes.keys());
                if !result.valid {
                    return Err(CompileError::InvalidAttributes {
                        kind,
                        errors: result.errors,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Fail the run if no intent is left; a single intent keeps its own error.
fn survivors(
    accepted: &[Option<Vec<String>>],
    errors: &mut [Option<CompileError>],
    phase: Phase,
) -> Result<(), CompileFailure> {
    if accepted.iter().any(Option::is_some) {
        return Ok(());
    }
    let error = match errors {
        [only] => only.take().unwrap_or(CompileError::NoResources),
        _ => CompileError::NoResources,
    };
    Err(CompileFailure::new(phase, error))
}

/// Existing node of `kind`, preferring one owned by the same intent.
fn find_provider(
    graph: &ResourceGraph,
    owners: &HashMap<String, usize>,
    kind: &str,
    owner: Option<usize>,
) -> Option<String> {
    let same_owner = graph
        .nodes()
        .iter()
        .find(|n| n.kind == kind && owner.is_some() && owners.get(&n.id).copied() == owner);
    same_owner
        .or_else(|| graph.find_by_kind(kind))
        .map(|n| n.id.clone())
}

/// `base`, or `base_2`, `base_3`, ... if that address is taken.
fn unique_label(graph: &ResourceGraph, kind: &str, base: &str) -> String {
    if graph.node(&format!("{}.{}", kind, base)).is_none() {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|label| graph.node(&format!("{}.{}", kind, label)).is_none())
        .unwrap_or_else(|| base.to_string())
}

/// Copy explicit values onto a node without replacing values already set.
fn apply_overrides(node: &mut ResourceNode, values: Option<&BTreeMap<String, serde_json::Value>>) {
    let Some(values) = values else { return };
    for (name, raw) in values {
        if let Some(value) = AttributeValue::from_json(raw) {
            node.attributes.entry(name.clone()).or_insert(value);
        }
    }
}

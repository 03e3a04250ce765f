//! Configuration text emission.
//!
//! Output is a fixed preamble (provider pin, provider block, read-only scope
//! lookup) followed by one `resource` block per node in dependency order.
//! The same graph and context always render to the same bytes.

use std::collections::BTreeMap;

use crate::error::{CompileError, SchemaError};
use crate::graph::{ResourceGraph, ResourceNode};
use crate::inference::{DependencyLookup, InferenceEngine};
use crate::schema::{BlockSpec, SchemaRepository};
use crate::types::{AttributeValue, DeploymentContext, SCOPE_LABEL};

const INDENT: &str = "  ";

/// Renders a resolved resource graph for one provider catalog.
#[derive(Debug)]
pub struct CodeGenerator<'a> {
    repo: &'a SchemaRepository,
    inference: InferenceEngine,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(repo: &'a SchemaRepository) -> Self {
        Self {
            repo,
            inference: InferenceEngine::new(repo.conventions().clone()),
        }
    }

    /// Use a custom inference engine for nested block contents.
    pub fn with_inference(mut self, inference: InferenceEngine) -> Self {
        self.inference = inference;
        self
    }

    /// Render `graph` as configuration text.
    ///
    /// # Errors
    ///
    /// - `DependencyCycle` if the graph's edges form a cycle; nothing is rendered.
    /// - `Schema(UnknownKind)` if a node's kind is not in the catalog.
    pub fn generate(
        &self,
        graph: &ResourceGraph,
        context: &DeploymentContext,
    ) -> Result<String, CompileError> {
        let order = graph.topological_order()?;

        let mut blocks = self.preamble(context);
        for node in order {
            blocks.push(self.resource_block(graph, node, context)?);
        }

        let mut out = String::new();
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            block.render(0, &mut out);
        }
        Ok(out)
    }

    fn preamble(&self, context: &DeploymentContext) -> Vec<Block> {
        let conventions = self.repo.conventions();

        let pin = AttributeValue::Object(BTreeMap::from([
            ("source".to_string(), AttributeValue::string(conventions.source.clone())),
            (
                "version".to_string(),
                AttributeValue::string(format!("= {}", self.repo.provider_version())),
            ),
        ]));
        let mut required_providers = Block::new("required_providers");
        required_providers.attribute(conventions.name.clone(), pin);
        let mut terraform = Block::new("terraform");
        terraform.blocks.push(required_providers);

        let mut provider = Block::new(format!("provider \"{}\"", conventions.name));
        if let Some(account) = &context.provider_account_identifier {
            provider.attribute("subscription_id", AttributeValue::string(account.clone()));
        }
        if conventions.requires_features_block {
            provider.blocks.push(Block::new("features"));
        }

        let mut scope = Block::new(format!(
            "data \"{}\" \"{}\"",
            conventions.scope_data_kind(),
            SCOPE_LABEL
        ));
        scope.attribute("name", AttributeValue::string(context.scope_identifier.clone()));

        vec![terraform, provider, scope]
    }

    fn resource_block(
        &self,
        graph: &ResourceGraph,
        node: &ResourceNode,
        context: &DeploymentContext,
    ) -> Result<Block, CompileError> {
        let model = self
            .repo
            .get_resource_model(&node.kind)
            .ok_or_else(|| SchemaError::UnknownKind {
                kind: node.kind.clone(),
            })?;
        let allowlist = model.block.allowlist();

        let mut block = Block::new(format!("resource \"{}\" \"{}\"", node.kind, node.name));
        for (name, value) in &node.attributes {
            if allowlist.binary_search(&name.as_str()).is_ok() {
                block.attribute(name.clone(), value.clone());
            } else {
                tracing::warn!(
                    kind = %node.kind,
                    attribute = %name,
                    "dropping attribute not in schema"
                );
            }
        }

        let lookup = graph.lookup_for(&node.id);
        block.blocks = self.required_nested(&model.block, node, context, &lookup)?;

        tracing::debug!(node = %node.id, attributes = block.attributes.len(), "emitted resource");
        Ok(block)
    }

    /// Required nested blocks of `spec`, repeated `max(min_items, 1)` times,
    /// each filled with whatever its required attributes infer to.
    ///
    /// A required reference that does not resolve through the node's edges is
    /// an error; other attributes without an inferable value are left out.
    fn required_nested(
        &self,
        spec: &BlockSpec,
        node: &ResourceNode,
        context: &DeploymentContext,
        lookup: &dyn DependencyLookup,
    ) -> Result<Vec<Block>, CompileError> {
        let mut blocks = Vec::new();
        for nested in spec.required_blocks() {
            let mut block = Block::new(nested.name.clone());
            for attr in &nested.block.required_attributes {
                if let Some(value) = self.inference.infer_default_value(
                    &attr.name,
                    &attr.type_tag,
                    node,
                    context,
                    lookup,
                ) {
                    block.attribute(attr.name.clone(), value);
                    continue;
                }

                let rule = self.inference.matching_rule(
                    &attr.name,
                    &attr.type_tag,
                    node,
                    context,
                    lookup,
                );
                if rule == Some("reference") {
                    tracing::error!(
                        kind = %node.kind,
                        block = %nested.name,
                        attribute = %attr.name,
                        "nested reference has no target"
                    );
                    return Err(CompileError::UnresolvableAttribute {
                        kind: node.kind.clone(),
                        attribute: format!("{}.{}", nested.name, attr.name),
                    });
                }
                tracing::debug!(
                    kind = %node.kind,
                    block = %nested.name,
                    attribute = %attr.name,
                    rule = rule.unwrap_or("none"),
                    "nested attribute left empty"
                );
            }
            block.blocks = self.required_nested(&nested.block, node, context, lookup)?;

            let count = nested.min_items.max(1);
            for _ in 1..count {
                blocks.push(block.clone());
            }
            blocks.push(block);
        }
        Ok(blocks)
    }
}

/// One configuration block: a header, aligned attributes, then child blocks.
#[derive(Debug, Clone)]
struct Block {
    header: String,
    attributes: Vec<(String, AttributeValue)>,
    blocks: Vec<Block>,
}

impl Block {
    fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            attributes: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.push((name.into(), value));
    }

    fn render(&self, depth: usize, out: &mut String) {
        let pad = INDENT.repeat(depth);
        if self.attributes.is_empty() && self.blocks.is_empty() {
            out.push_str(&format!("{}{} {{}}\n", pad, self.header));
            return;
        }

        out.push_str(&format!("{}{} {{\n", pad, self.header));
        let width = self.attributes.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in &self.attributes {
            out.push_str(&format!(
                "{}{}{:<width$} = {}\n",
                pad,
                INDENT,
                key,
                render_value(value, depth + 1),
                width = width
            ));
        }
        for (i, child) in self.blocks.iter().enumerate() {
            if i > 0 || !self.attributes.is_empty() {
                out.push('\n');
            }
            child.render(depth + 1, out);
        }
        out.push_str(&format!("{}}}\n", pad));
    }
}

/// Render a value as an expression at nesting `depth`.
pub fn render_value(value: &AttributeValue, depth: usize) -> String {
    match value {
        AttributeValue::String(s) => quote(s),
        AttributeValue::Number(n) => n.to_string(),
        AttributeValue::Bool(b) => b.to_string(),
        AttributeValue::Reference(r) => r.clone(),
        AttributeValue::List(items) if items.is_empty() => "[]".to_string(),
        AttributeValue::List(items) if items.iter().all(is_scalar) => {
            let rendered: Vec<String> = items.iter().map(|v| render_value(v, depth)).collect();
            format!("[{}]", rendered.join(", "))
        }
        AttributeValue::List(items) => {
            let pad = INDENT.repeat(depth);
            let mut out = String::from("[\n");
            for item in items {
                out.push_str(&format!(
                    "{}{}{},\n",
                    pad,
                    INDENT,
                    render_value(item, depth + 1)
                ));
            }
            out.push_str(&format!("{}]", pad));
            out
        }
        AttributeValue::Object(map) if map.is_empty() => "{}".to_string(),
        AttributeValue::Object(map) => {
            let pad = INDENT.repeat(depth);
            let keys: Vec<String> = map.keys().map(|k| object_key(k)).collect();
            let width = keys.iter().map(String::len).max().unwrap_or(0);
            let mut out = String::from("{\n");
            for (key, value) in keys.iter().zip(map.values()) {
                out.push_str(&format!(
                    "{}{}{:<width$} = {}\n",
                    pad,
                    INDENT,
                    key,
                    render_value(value, depth + 1),
                    width = width
                ));
            }
            out.push_str(&format!("{}}}", pad));
            out
        }
    }
}

fn is_scalar(value: &AttributeValue) -> bool {
    !matches!(value, AttributeValue::List(_) | AttributeValue::Object(_))
}

/// Quoted string literal with template sequences escaped.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn object_key(key: &str) -> String {
    let mut chars = key.chars();
    let bare = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    };
    if bare {
        key.to_string()
    } else {
        quote(key)
    }
}

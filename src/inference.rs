//! Attribute value inference.
//!
//! Values come from an ordered list of [`InferenceRule`]s; the first rule whose
//! predicate matches decides the outcome, even when its producer yields
//! nothing. Inference is pure: identical inputs give identical outputs.

use crate::dependency::{is_reference_attribute, reference_base};
use crate::graph::ResourceNode;
use crate::schema::TypeTag;
use crate::types::{AttributeValue, DeploymentContext, ProviderConventions, ResourceAddress};

/// Placeholder for secret-shaped attributes. Meant to be replaced before apply.
pub const SECRET_PLACEHOLDER: &str = "ChangeMe-Placeholder-1!";

/// Placeholder for user-name-shaped attributes.
pub const USERNAME_PLACEHOLDER: &str = "archyadmin";

/// Fallback for version-shaped attributes. Schemas carry no enum of valid
/// versions, so providers may reject this for some kinds.
pub const CONSERVATIVE_VERSION: &str = "1.2";

pub const DEFAULT_OS: &str = "Linux";

/// Lowest code-style tier (hosting plans).
pub const LOWEST_CODE_TIER: &str = "B1";

/// Lowest word-style tier.
pub const LOWEST_WORD_TIER: &str = "Basic";

const GENERIC_PLACEHOLDER: &str = "default";

const MAX_NAME_LEN: usize = 60;
const MAX_COMPACT_NAME_LEN: usize = 24;
const NAME_TAIL_LEN: usize = 4;

/// Kinds whose names must be lowercase alphanumerics only.
const COMPACT_NAME_KINDS: &[&str] = &["storage_account", "container_registry"];

/// Finds the node that satisfies a reference attribute.
pub trait DependencyLookup {
    fn resolve(&self, attribute: &str) -> Option<ResourceAddress>;
}

impl<F> DependencyLookup for F
where
    F: Fn(&str) -> Option<ResourceAddress>,
{
    fn resolve(&self, attribute: &str) -> Option<ResourceAddress> {
        self(attribute)
    }
}

/// Everything a rule may look at.
pub struct InferenceInput<'a> {
    pub attribute: &'a str,
    pub type_tag: &'a TypeTag,
    pub node: &'a ResourceNode,
    pub context: &'a DeploymentContext,
    pub conventions: &'a ProviderConventions,
    pub lookup: &'a dyn DependencyLookup,
}

/// A predicate and the producer that runs when it matches.
#[derive(Clone, Copy)]
pub struct InferenceRule {
    pub name: &'static str,
    pub applies: fn(&InferenceInput<'_>) -> bool,
    pub produce: fn(&InferenceInput<'_>) -> Option<AttributeValue>,
}

impl std::fmt::Debug for InferenceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceRule").field("name", &self.name).finish()
    }
}

/// The default rule list, in precedence order.
pub fn default_rules() -> Vec<InferenceRule> {
    vec![
        InferenceRule {
            name: "reference",
            applies: |i| is_reference_attribute(i.conventions, i.attribute, i.type_tag),
            produce: |i| i.lookup.resolve(i.attribute).map(|addr| addr.reference("id")),
        },
        InferenceRule {
            name: "name",
            applies: |i| i.attribute == "name" && i.type_tag.is_string(),
            produce: |i| Some(AttributeValue::string(generated_name(i.node, i.context))),
        },
        InferenceRule {
            name: "location",
            applies: |i| matches!(i.attribute, "location" | "region"),
            produce: |i| Some(AttributeValue::string(i.context.region.clone())),
        },
        InferenceRule {
            name: "scope",
            applies: |i| scope_attribute(i.conventions, i.attribute).is_some(),
            produce: |i| {
                scope_attribute(i.conventions, i.attribute)
                    .map(|target| i.conventions.scope_reference(target))
            },
        },
        InferenceRule {
            name: "account",
            applies: |i| reference_base(i.attribute) == Some(i.conventions.account_token.as_str()),
            produce: |i| {
                i.context
                    .provider_account_identifier
                    .clone()
                    .map(AttributeValue::String)
            },
        },
        InferenceRule {
            name: "tier",
            applies: |i| {
                i.type_tag.is_string()
                    && (matches!(i.attribute, "sku" | "sku_name" | "tier")
                        || i.attribute.ends_with("_tier"))
            },
            produce: |i| Some(AttributeValue::string(lowest_tier(i.conventions, &i.node.kind, i.attribute))),
        },
        InferenceRule {
            name: "platform",
            applies: |i| {
                i.type_tag.is_string()
                    && (matches!(i.attribute, "os_type" | "platform" | "os")
                        || i.attribute.ends_with("_os_type"))
            },
            produce: |_| Some(AttributeValue::string(DEFAULT_OS)),
        },
        InferenceRule {
            name: "version",
            applies: |i| i.type_tag.is_string() && i.attribute.contains("version"),
            produce: |_| Some(AttributeValue::string(CONSERVATIVE_VERSION)),
        },
        InferenceRule {
            name: "credential",
            applies: |i| {
                i.type_tag.is_string()
                    && ["password", "secret", "key", "admin", "login", "username"]
                        .iter()
                        .any(|t| i.attribute.contains(t))
            },
            produce: |i| {
                let secret = ["password", "secret", "key"]
                    .iter()
                    .any(|t| i.attribute.contains(t));
                Some(AttributeValue::string(if secret {
                    SECRET_PLACEHOLDER
                } else {
                    USERNAME_PLACEHOLDER
                }))
            },
        },
        InferenceRule {
            name: "capacity",
            applies: |i| {
                matches!(i.type_tag, TypeTag::Number)
                    && [
                        "capacity", "size", "count", "instances", "replicas", "throughput", "_gb",
                        "_mb",
                    ]
                    .iter()
                    .any(|t| i.attribute.contains(t))
            },
            produce: |_| Some(AttributeValue::number(1)),
        },
        InferenceRule {
            name: "boolean",
            applies: |i| matches!(i.type_tag, TypeTag::Bool),
            produce: |_| Some(AttributeValue::Bool(false)),
        },
        InferenceRule {
            name: "fallback",
            applies: |_| true,
            produce: |i| match i.type_tag {
                TypeTag::String => Some(AttributeValue::string(fallback_string(i))),
                TypeTag::Number => Some(AttributeValue::number(0)),
                _ => None,
            },
        },
    ]
}

/// Applies the rule list to one attribute at a time.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    conventions: ProviderConventions,
    rules: Vec<InferenceRule>,
}

impl InferenceEngine {
    pub fn new(conventions: ProviderConventions) -> Self {
        Self::with_rules(conventions, default_rules())
    }

    pub fn with_rules(conventions: ProviderConventions, rules: Vec<InferenceRule>) -> Self {
        Self { conventions, rules }
    }

    /// Add a rule ahead of every existing rule.
    pub fn prepend(mut self, rule: InferenceRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn rules(&self) -> &[InferenceRule] {
        &self.rules
    }

    /// Value for one attribute, or `None` when no value can be inferred.
    pub fn infer_default_value(
        &self,
        attribute: &str,
        type_tag: &TypeTag,
        node: &ResourceNode,
        context: &DeploymentContext,
        lookup: &dyn DependencyLookup,
    ) -> Option<AttributeValue> {
        let input = InferenceInput {
            attribute,
            type_tag,
            node,
            context,
            conventions: &self.conventions,
            lookup,
        };

        let rule = self.rules.iter().find(|r| (r.applies)(&input))?;
        let value = (rule.produce)(&input);
        tracing::trace!(
            kind = %node.kind,
            attribute,
            rule = rule.name,
            inferred = value.is_some(),
            "attribute inference"
        );
        value
    }

    /// Name of the first rule that matches, for diagnostics.
    pub fn matching_rule(
        &self,
        attribute: &str,
        type_tag: &TypeTag,
        node: &ResourceNode,
        context: &DeploymentContext,
        lookup: &dyn DependencyLookup,
    ) -> Option<&'static str> {
        let input = InferenceInput {
            attribute,
            type_tag,
            node,
            context,
            conventions: &self.conventions,
            lookup,
        };
        self.rules.iter().find(|r| (r.applies)(&input)).map(|r| r.name)
    }
}

/// Resource name derived from the scope and the node's label.
///
/// Lowercase, `[a-z0-9-]`, at most 60 characters; kinds that forbid hyphens
/// get alphanumerics only, at most 24 characters. The label is kept whole
/// when it fits and the scope is shortened to make room, so distinct labels
/// give distinct names.
pub fn generated_name(node: &ResourceNode, context: &DeploymentContext) -> String {
    let compact = COMPACT_NAME_KINDS.iter().any(|k| node.kind.ends_with(k));
    let (max_len, separator) = if compact {
        (MAX_COMPACT_NAME_LEN, "")
    } else {
        (MAX_NAME_LEN, "-")
    };

    let label = fit_label(name_part(&node.name, compact), max_len);
    let mut scope = name_part(&context.scope_identifier, compact);
    scope.truncate(max_len.saturating_sub(label.len() + separator.len()));
    while scope.ends_with('-') {
        scope.pop();
    }

    let name = match (scope.is_empty(), label.is_empty()) {
        (_, true) => scope,
        (true, false) => label,
        (false, false) => format!("{}{}{}", scope, separator, label),
    };

    if name.is_empty() {
        "archy".to_string()
    } else {
        name
    }
}

/// Lowercase ASCII alphanumerics, other runs collapsed to one `-` (or
/// dropped when `compact`), no leading or trailing `-`.
fn name_part(raw: &str, compact: bool) -> String {
    let mut part = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            part.push(c);
        } else if !compact && !part.is_empty() && !part.ends_with('-') {
            part.push('-');
        }
    }
    while part.ends_with('-') {
        part.pop();
    }
    part
}

/// Shorten an over-long label, keeping its tail where collision suffixes
/// (`_2`, `_3`) live.
fn fit_label(label: String, max_len: usize) -> String {
    if label.len() <= max_len {
        return label;
    }
    let tail = &label[label.len() - NAME_TAIL_LEN..];
    let head = label[..max_len - NAME_TAIL_LEN].trim_end_matches('-');
    format!("{}{}", head, tail)
}

/// Block label: lowercase `[a-z0-9_]`, never starting with a digit.
pub fn sanitize_label(raw: &str) -> String {
    let mut label = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            label.push(c);
        } else if !label.ends_with('_') && !label.is_empty() {
            label.push('_');
        }
    }
    while label.ends_with('_') {
        label.pop();
    }

    match label.chars().next() {
        None => "resource".to_string(),
        Some(c) if c.is_ascii_digit() => format!("r_{}", label),
        Some(_) => label,
    }
}

/// Attribute of the scope lookup that a scope-shaped attribute refers to.
fn scope_attribute<'a>(conventions: &ProviderConventions, attribute: &'a str) -> Option<&'a str> {
    if attribute == conventions.scope_token {
        return Some("name");
    }
    attribute
        .strip_prefix(conventions.scope_token.as_str())
        .and_then(|rest| rest.strip_prefix('_'))
        .filter(|rest| !rest.is_empty())
}

/// Cheapest tier literal. Hosting plans use code-style tiers (`B1`); other
/// kinds use word-style tiers (`Basic`).
fn lowest_tier(conventions: &ProviderConventions, kind: &str, attribute: &str) -> &'static str {
    if attribute == "sku_name" && conventions.short_kind(kind).ends_with("plan") {
        LOWEST_CODE_TIER
    } else {
        LOWEST_WORD_TIER
    }
}

fn fallback_string(input: &InferenceInput<'_>) -> String {
    let name_like = input
        .attribute
        .strip_suffix("_name")
        .or_else(|| matches!(input.attribute, "label" | "title").then_some(input.attribute));

    match name_like {
        Some(role) => {
            let label = sanitize_label(&format!("{}_{}", input.node.name, role));
            label.replace('_', "-")
        }
        None => GENERIC_PLACEHOLDER.to_string(),
    }
}

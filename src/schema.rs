//! Normalized capability schema: resource models and the repository that owns them.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::types::ProviderConventions;

/// Element type of a collection tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    String,
    Bool,
    Number,
    Object,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementType::String => "string",
            ElementType::Bool => "bool",
            ElementType::Number => "number",
            ElementType::Object => "object",
        })
    }
}

/// Simplified attribute type. Nested type trees collapse to one of these tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    String,
    Bool,
    Number,
    List(ElementType),
    Set(ElementType),
    Map(ElementType),
    Object,
}

impl TypeTag {
    pub fn is_string(&self) -> bool {
        matches!(self, TypeTag::String)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::String => f.write_str("string"),
            TypeTag::Bool => f.write_str("bool"),
            TypeTag::Number => f.write_str("number"),
            TypeTag::List(e) => write!(f, "list({})", e),
            TypeTag::Set(e) => write!(f, "set({})", e),
            TypeTag::Map(e) => write!(f, "map({})", e),
            TypeTag::Object => f.write_str("object"),
        }
    }
}

impl Serialize for TypeTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One attribute of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: TypeTag,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AttributeSpec {
    /// Set only by the provider; never writable from configuration.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.required && !self.optional
    }
}

/// How a nested block may repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NestingMode {
    Single,
    Group,
    List,
    Set,
    Map,
}

impl NestingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(NestingMode::Single),
            "group" => Some(NestingMode::Group),
            "list" => Some(NestingMode::List),
            "set" => Some(NestingMode::Set),
            "map" => Some(NestingMode::Map),
            _ => None,
        }
    }
}

/// Attributes and nested blocks of one block, split by role and sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockSpec {
    pub required_attributes: Vec<AttributeSpec>,
    pub optional_attributes: Vec<AttributeSpec>,
    pub computed_attributes: Vec<AttributeSpec>,
    pub nested_blocks: Vec<NestedBlockSpec>,
}

impl BlockSpec {
    /// Look up an attribute by name in any role.
    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.required_attributes
            .iter()
            .chain(&self.optional_attributes)
            .chain(&self.computed_attributes)
            .find(|a| a.name == name)
    }

    /// Names that configuration may set: required plus settable optional.
    pub fn allowlist(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .required_attributes
            .iter()
            .chain(&self.optional_attributes)
            .map(|a| a.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn required_blocks(&self) -> impl Iterator<Item = &NestedBlockSpec> {
        self.nested_blocks.iter().filter(|b| b.required)
    }
}

/// A nested configuration block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedBlockSpec {
    pub name: String,
    pub nesting_mode: NestingMode,
    pub min_items: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    /// `min_items > 0`.
    pub required: bool,
    pub block: BlockSpec,
}

/// Normalized description of one resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceModel {
    pub kind: String,
    pub schema_version: i64,
    pub block: BlockSpec,
}

impl ResourceModel {
    pub fn required_attributes(&self) -> &[AttributeSpec] {
        &self.block.required_attributes
    }

    pub fn optional_attributes(&self) -> &[AttributeSpec] {
        &self.block.optional_attributes
    }

    pub fn computed_attributes(&self) -> &[AttributeSpec] {
        &self.block.computed_attributes
    }

    pub fn nested_blocks(&self) -> &[NestedBlockSpec] {
        &self.block.nested_blocks
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.block.attribute(name)
    }
}

/// The loaded provider catalog. Immutable after load; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SchemaRepository {
    provider_key: String,
    provider_version: String,
    conventions: ProviderConventions,
    models: BTreeMap<String, ResourceModel>,
}

impl SchemaRepository {
    /// Build a repository from already-normalized models.
    pub fn new(
        provider_key: impl Into<String>,
        provider_version: impl Into<String>,
        models: impl IntoIterator<Item = ResourceModel>,
    ) -> Self {
        let provider_key = provider_key.into();
        Self {
            conventions: ProviderConventions::from_provider_key(&provider_key),
            provider_key,
            provider_version: provider_version.into(),
            models: models.into_iter().map(|m| (m.kind.clone(), m)).collect(),
        }
    }

    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    /// Exact provider version this catalog was loaded for.
    pub fn provider_version(&self) -> &str {
        &self.provider_version
    }

    pub fn conventions(&self) -> &ProviderConventions {
        &self.conventions
    }

    /// Returns `None` for kinds this provider does not have.
    pub fn get_resource_model(&self, kind: &str) -> Option<&ResourceModel> {
        self.models.get(kind)
    }

    pub fn contains_kind(&self, kind: &str) -> bool {
        self.models.contains_key(kind)
    }

    /// All resource kinds, sorted.
    pub fn get_all_resource_kinds(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    /// Attribute names any value-producing step may set on `kind`.
    /// Empty for unknown kinds.
    pub fn get_attribute_allowlist(&self, kind: &str) -> Vec<&str> {
        self.models
            .get(kind)
            .map(|m| m.block.allowlist())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, type_tag: TypeTag, required: bool, optional: bool, computed: bool) -> AttributeSpec {
        AttributeSpec {
            name: name.into(),
            type_tag,
            required,
            optional,
            computed,
            sensitive: false,
            description: None,
        }
    }

    fn web_app() -> ResourceModel {
        ResourceModel {
            kind: "azurerm_linux_web_app".into(),
            schema_version: 0,
            block: BlockSpec {
                required_attributes: vec![
                    attr("location", TypeTag::String, true, false, false),
                    attr("name", TypeTag::String, true, false, false),
                ],
                optional_attributes: vec![
                    attr("https_only", TypeTag::Bool, false, true, false),
                    attr("tags", TypeTag::Map(ElementType::String), false, true, true),
                ],
                computed_attributes: vec![attr("id", TypeTag::String, false, false, true)],
                nested_blocks: vec![],
            },
        }
    }

    #[test]
    fn type_tag_display() {
        assert_eq!(TypeTag::List(ElementType::String).to_string(), "list(string)");
        assert_eq!(TypeTag::Map(ElementType::Object).to_string(), "map(object)");
        assert_eq!(TypeTag::Bool.to_string(), "bool");
    }

    #[test]
    fn allowlist_excludes_computed_only() {
        let repo = SchemaRepository::new("hashicorp/azurerm", "3.85.0", [web_app()]);
        assert_eq!(
            repo.get_attribute_allowlist("azurerm_linux_web_app"),
            vec!["https_only", "location", "name", "tags"]
        );
    }

    #[test]
    fn unknown_kind_is_absent() {
        let repo = SchemaRepository::new("hashicorp/azurerm", "3.85.0", [web_app()]);
        assert!(repo.get_resource_model("azurerm_nothing").is_none());
        assert!(repo.get_attribute_allowlist("azurerm_nothing").is_empty());
    }

    #[test]
    fn computed_only_detection() {
        let model = web_app();
        assert!(model.attribute("id").unwrap().is_computed_only());
        assert!(!model.attribute("tags").unwrap().is_computed_only());
    }

    #[test]
    fn kinds_sorted() {
        let mut plan = web_app();
        plan.kind = "azurerm_service_plan".into();
        let repo = SchemaRepository::new("hashicorp/azurerm", "3.85.0", [web_app(), plan]);
        assert_eq!(
            repo.get_all_resource_kinds(),
            vec!["azurerm_linux_web_app", "azurerm_service_plan"]
        );
        assert_eq!(repo.len(), 2);
    }
}

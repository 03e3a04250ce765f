//! Capability schema loading from files, strings, and HTTP URLs.
//!
//! The document is checked against a structural meta-schema first, so a
//! malformed document fails as a whole instead of producing a partial catalog.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::SchemaError;
use crate::schema::{
    AttributeSpec, BlockSpec, ElementType, NestedBlockSpec, NestingMode, ResourceModel,
    SchemaRepository, TypeTag,
};
use crate::types::LoadOptions;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (30 seconds). Provider catalogs are large.
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Read a JSON document from a file path.
///
/// # Errors
///
/// Returns `SchemaError::FileNotFound` if the file doesn't exist,
/// or `SchemaError::InvalidJson` if the file isn't valid JSON.
pub fn read_document(path: &Path) -> Result<Value, SchemaError> {
    if !path.exists() {
        return Err(SchemaError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| SchemaError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| SchemaError::InvalidJson { source })
}

/// Load a capability schema from a file path.
pub fn load_schema(path: &Path, options: &LoadOptions) -> Result<SchemaRepository, SchemaError> {
    let document = read_document(path)?;
    parse_document(&document, options)
}

/// Load a capability schema from a JSON string.
pub fn load_schema_str(
    content: &str,
    options: &LoadOptions,
) -> Result<SchemaRepository, SchemaError> {
    let document: Value =
        serde_json::from_str(content).map_err(|source| SchemaError::InvalidJson { source })?;
    parse_document(&document, options)
}

/// Load a capability schema from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
pub fn load_schema_url(url: &str, options: &LoadOptions) -> Result<SchemaRepository, SchemaError> {
    let network_error = |source| SchemaError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network_error)?;

    let document: Value = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.json())
        .map_err(network_error)?;

    parse_document(&document, options)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a capability schema from a file path or URL.
///
/// URL loading requires the `remote` feature.
pub fn load_schema_auto(
    source: &str,
    options: &LoadOptions,
) -> Result<SchemaRepository, SchemaError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_schema_url(source, options)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(SchemaError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_schema(Path::new(source), options)
    }
}

/// Normalize a parsed capability document into a repository.
///
/// # Errors
///
/// Fails without returning a partial catalog if the document violates the
/// meta-schema, the provider is missing, no version pin is available, or any
/// attribute carries an unrecognized type expression.
pub fn parse_document(
    document: &Value,
    options: &LoadOptions,
) -> Result<SchemaRepository, SchemaError> {
    check_structure(document)?;

    let raw: RawDocument = serde_json::from_value(document.clone())
        .map_err(|source| SchemaError::InvalidJson { source })?;

    let provider_key = select_provider(&raw, &options.provider_key)?;
    let version = options
        .provider_version
        .clone()
        .or_else(|| raw.provider_versions.get(&provider_key).cloned())
        .ok_or_else(|| SchemaError::MissingProviderVersion {
            provider: provider_key.clone(),
        })?;

    let provider = &raw.provider_schemas[&provider_key];
    let mut models = Vec::with_capacity(provider.resource_schemas.len());
    for (kind, resource) in &provider.resource_schemas {
        models.push(ResourceModel {
            kind: kind.clone(),
            schema_version: resource.version,
            block: normalize_block(kind, &resource.block)?,
        });
    }

    Ok(SchemaRepository::new(provider_key, version, models))
}

/// Simplify a raw type expression to a `TypeTag`.
///
/// Accepts `"string"`, `"bool"`, `"number"`, `"dynamic"`, and the array forms
/// `["list", T]`, `["set", T]`, `["map", T]`, `["object", {..}]`, `["tuple", [..]]`.
pub fn simplify_type(expr: &Value) -> Result<TypeTag, String> {
    match expr {
        Value::String(s) => match s.as_str() {
            "string" => Ok(TypeTag::String),
            "bool" => Ok(TypeTag::Bool),
            "number" => Ok(TypeTag::Number),
            "dynamic" => Ok(TypeTag::Object),
            other => Err(format!("unknown primitive type \"{}\"", other)),
        },
        Value::Array(parts) => {
            let (Some(Value::String(head)), Some(inner), 2) =
                (parts.first(), parts.get(1), parts.len())
            else {
                return Err("expected [constructor, argument]".to_string());
            };
            match head.as_str() {
                "list" => Ok(TypeTag::List(simplify_element(inner)?)),
                "set" => Ok(TypeTag::Set(simplify_element(inner)?)),
                "map" => Ok(TypeTag::Map(simplify_element(inner)?)),
                "object" => Ok(TypeTag::Object),
                "tuple" => Ok(TypeTag::List(ElementType::Object)),
                other => Err(format!("unknown type constructor \"{}\"", other)),
            }
        }
        other => Err(format!(
            "expected string or array, got {}",
            crate::types::json_type_name(other)
        )),
    }
}

fn simplify_element(expr: &Value) -> Result<ElementType, String> {
    match simplify_type(expr)? {
        TypeTag::String => Ok(ElementType::String),
        TypeTag::Bool => Ok(ElementType::Bool),
        TypeTag::Number => Ok(ElementType::Number),
        _ => Ok(ElementType::Object),
    }
}

// --- Internal implementation ---

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default, alias = "provider_selections")]
    provider_versions: BTreeMap<String, String>,
    provider_schemas: BTreeMap<String, RawProvider>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    #[serde(default)]
    resource_schemas: BTreeMap<String, RawResource>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    #[serde(default)]
    version: i64,
    block: RawBlock,
}

#[derive(Debug, Default, Deserialize)]
struct RawBlock {
    #[serde(default)]
    attributes: BTreeMap<String, RawAttribute>,
    #[serde(default)]
    block_types: BTreeMap<String, RawBlockType>,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    #[serde(rename = "type")]
    type_expr: Option<Value>,
    nested_type: Option<RawNestedType>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    computed: bool,
    #[serde(default)]
    sensitive: bool,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNestedType {
    nesting_mode: String,
}

#[derive(Debug, Deserialize)]
struct RawBlockType {
    nesting_mode: String,
    block: RawBlock,
    #[serde(default)]
    min_items: u64,
    max_items: Option<u64>,
}

fn select_provider(raw: &RawDocument, requested: &str) -> Result<String, SchemaError> {
    if raw.provider_schemas.contains_key(requested) {
        return Ok(requested.to_string());
    }

    // Accept a short form ("azurerm", "hashicorp/azurerm") when it is unambiguous.
    let suffix = format!("/{}", requested);
    let matches: Vec<&String> = raw
        .provider_schemas
        .keys()
        .filter(|k| k.ends_with(&suffix))
        .collect();

    match matches.as_slice() {
        [only] => Ok((*only).clone()),
        _ => Err(SchemaError::UnknownProvider {
            provider: requested.to_string(),
            available: raw.provider_schemas.keys().cloned().collect(),
        }),
    }
}

fn normalize_block(kind: &str, raw: &RawBlock) -> Result<BlockSpec, SchemaError> {
    let mut block = BlockSpec::default();

    for (name, attr) in &raw.attributes {
        let type_tag = attribute_type(attr).map_err(|message| SchemaError::InvalidType {
            kind: kind.to_string(),
            attribute: name.clone(),
            message,
        })?;

        let spec = AttributeSpec {
            name: name.clone(),
            type_tag,
            required: attr.required,
            optional: attr.optional,
            computed: attr.computed,
            sensitive: attr.sensitive,
            description: attr.description.clone(),
        };

        if attr.required {
            block.required_attributes.push(spec);
        } else if attr.optional {
            block.optional_attributes.push(spec);
        } else if attr.computed {
            block.computed_attributes.push(spec);
        } else {
            return Err(SchemaError::InvalidDocument {
                errors: vec![format!(
                    "{}.{}: attribute is neither required, optional, nor computed",
                    kind, name
                )],
            });
        }
    }

    for (name, raw_type) in &raw.block_types {
        let nesting_mode = NestingMode::parse(&raw_type.nesting_mode).ok_or_else(|| {
            SchemaError::InvalidDocument {
                errors: vec![format!(
                    "{}.{}: unknown nesting mode \"{}\"",
                    kind, name, raw_type.nesting_mode
                )],
            }
        })?;

        block.nested_blocks.push(NestedBlockSpec {
            name: name.clone(),
            nesting_mode,
            min_items: raw_type.min_items,
            max_items: raw_type.max_items,
            required: raw_type.min_items > 0,
            block: normalize_block(kind, &raw_type.block)?,
        });
    }

    Ok(block)
}

fn attribute_type(attr: &RawAttribute) -> Result<TypeTag, String> {
    match (&attr.type_expr, &attr.nested_type) {
        (Some(expr), _) => simplify_type(expr),
        (None, Some(nested)) => match nested.nesting_mode.as_str() {
            "list" => Ok(TypeTag::List(ElementType::Object)),
            "set" => Ok(TypeTag::Set(ElementType::Object)),
            "map" => Ok(TypeTag::Map(ElementType::Object)),
            _ => Ok(TypeTag::Object),
        },
        (None, None) => Err("missing type".to_string()),
    }
}

fn check_structure(document: &Value) -> Result<(), SchemaError> {
    let validator =
        jsonschema::validator_for(&meta_schema()).map_err(|e| SchemaError::InvalidDocument {
            errors: vec![format!("meta-schema: {}", e)],
        })?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::InvalidDocument { errors })
    }
}

/// Structural shape every capability document must satisfy.
fn meta_schema() -> Value {
    json!({
        "type": "object",
        "required": ["provider_schemas"],
        "properties": {
            "format_version": { "type": "string" },
            "provider_versions": {
                "type": "object",
                "additionalProperties": { "type": "string" }
            },
            "provider_selections": {
                "type": "object",
                "additionalProperties": { "type": "string" }
            },
            "provider_schemas": {
                "type": "object",
                "additionalProperties": { "$ref": "#/$defs/provider" }
            }
        },
        "$defs": {
            "provider": {
                "type": "object",
                "properties": {
                    "resource_schemas": {
                        "type": "object",
                        "additionalProperties": { "$ref": "#/$defs/resource" }
                    }
                }
            },
            "resource": {
                "type": "object",
                "required": ["block"],
                "properties": {
                    "version": { "type": "integer" },
                    "block": { "$ref": "#/$defs/block" }
                }
            },
            "block": {
                "type": "object",
                "properties": {
                    "attributes": {
                        "type": "object",
                        "additionalProperties": { "$ref": "#/$defs/attribute" }
                    },
                    "block_types": {
                        "type": "object",
                        "additionalProperties": { "$ref": "#/$defs/block_type" }
                    }
                }
            },
            "attribute": {
                "type": "object",
                "anyOf": [
                    { "required": ["type"] },
                    { "required": ["nested_type"] }
                ],
                "properties": {
                    "type": { "type": ["string", "array"] },
                    "required": { "type": "boolean" },
                    "optional": { "type": "boolean" },
                    "computed": { "type": "boolean" },
                    "sensitive": { "type": "boolean" },
                    "description": { "type": "string" }
                }
            },
            "block_type": {
                "type": "object",
                "required": ["nesting_mode", "block"],
                "properties": {
                    "nesting_mode": { "enum": ["single", "group", "list", "set", "map"] },
                    "block": { "$ref": "#/$defs/block" },
                    "min_items": { "type": "integer", "minimum": 0 },
                    "max_items": { "type": "integer", "minimum": 0 }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const KEY: &str = "registry.terraform.io/hashicorp/azurerm";

    fn document() -> Value {
        json!({
            "format_version": "1.0",
            "provider_versions": { KEY: "3.85.0" },
            "provider_schemas": {
                KEY: {
                    "resource_schemas": {
                        "azurerm_linux_web_app": {
                            "version": 1,
                            "block": {
                                "attributes": {
                                    "id": { "type": "string", "computed": true },
                                    "name": { "type": "string", "required": true },
                                    "service_plan_id": { "type": "string", "required": true },
                                    "tags": { "type": ["map", "string"], "optional": true },
                                    "app_settings": { "type": ["map", "string"], "optional": true, "computed": true },
                                    "outbound_ip_addresses": { "type": ["list", "string"], "computed": true }
                                },
                                "block_types": {
                                    "site_config": {
                                        "nesting_mode": "list",
                                        "min_items": 1,
                                        "max_items": 1,
                                        "block": {
                                            "attributes": {
                                                "always_on": { "type": "bool", "required": true }
                                            }
                                        }
                                    },
                                    "logs": {
                                        "nesting_mode": "list",
                                        "max_items": 1,
                                        "block": {}
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    fn options() -> LoadOptions {
        LoadOptions::new(KEY)
    }

    #[test]
    fn parse_document_normalizes_roles() {
        let repo = parse_document(&document(), &options()).unwrap();
        assert_eq!(repo.provider_version(), "3.85.0");

        let model = repo.get_resource_model("azurerm_linux_web_app").unwrap();
        assert_eq!(model.schema_version, 1);

        let required: Vec<&str> = model.required_attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(required, vec!["name", "service_plan_id"]);

        let optional: Vec<&str> = model.optional_attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(optional, vec!["app_settings", "tags"]);

        let computed: Vec<&str> = model.computed_attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(computed, vec!["id", "outbound_ip_addresses"]);
    }

    #[test]
    fn parse_document_nested_blocks() {
        let repo = parse_document(&document(), &options()).unwrap();
        let model = repo.get_resource_model("azurerm_linux_web_app").unwrap();

        let site_config = model.nested_blocks().iter().find(|b| b.name == "site_config").unwrap();
        assert!(site_config.required);
        assert_eq!(site_config.min_items, 1);
        assert_eq!(site_config.max_items, Some(1));
        assert_eq!(site_config.block.required_attributes[0].name, "always_on");

        let logs = model.nested_blocks().iter().find(|b| b.name == "logs").unwrap();
        assert!(!logs.required);
    }

    #[test]
    fn version_override_wins() {
        let repo = parse_document(&document(), &options().with_version("3.90.0")).unwrap();
        assert_eq!(repo.provider_version(), "3.90.0");
    }

    #[test]
    fn missing_version_fails() {
        let mut doc = document();
        doc.as_object_mut().unwrap().remove("provider_versions");
        let result = parse_document(&doc, &options());
        assert!(matches!(result, Err(SchemaError::MissingProviderVersion { .. })));
    }

    #[test]
    fn short_provider_key_accepted() {
        let repo = parse_document(&document(), &LoadOptions::new("azurerm")).unwrap();
        assert_eq!(repo.provider_key(), KEY);
        assert_eq!(repo.conventions().name, "azurerm");
    }

    #[test]
    fn unknown_provider_fails() {
        let result = parse_document(&document(), &LoadOptions::new("google"));
        assert!(matches!(result, Err(SchemaError::UnknownProvider { .. })));
    }

    #[test]
    fn structural_violation_fails_whole_load() {
        let doc = json!({
            "provider_versions": { KEY: "3.85.0" },
            "provider_schemas": {
                KEY: {
                    "resource_schemas": {
                        "azurerm_ok": { "block": {} },
                        "azurerm_bad": { "block": { "attributes": { "name": { "required": true } } } }
                    }
                }
            }
        });
        let result = parse_document(&doc, &options());
        assert!(matches!(result, Err(SchemaError::InvalidDocument { .. })));
    }

    #[test]
    fn bad_type_expression_fails() {
        let doc = json!({
            "provider_versions": { KEY: "3.85.0" },
            "provider_schemas": {
                KEY: {
                    "resource_schemas": {
                        "azurerm_bad": {
                            "block": { "attributes": { "size": { "type": "float", "required": true } } }
                        }
                    }
                }
            }
        });
        let result = parse_document(&doc, &options());
        assert!(matches!(
            result,
            Err(SchemaError::InvalidType { attribute, .. }) if attribute == "size"
        ));
    }

    #[test]
    fn simplify_type_collapses_nesting() {
        assert_eq!(simplify_type(&json!("string")).unwrap(), TypeTag::String);
        assert_eq!(simplify_type(&json!("dynamic")).unwrap(), TypeTag::Object);
        assert_eq!(
            simplify_type(&json!(["list", "string"])).unwrap(),
            TypeTag::List(ElementType::String)
        );
        assert_eq!(
            simplify_type(&json!(["set", ["object", { "a": "string" }]])).unwrap(),
            TypeTag::Set(ElementType::Object)
        );
        assert_eq!(
            simplify_type(&json!(["map", ["list", "number"]])).unwrap(),
            TypeTag::Map(ElementType::Object)
        );
        assert_eq!(
            simplify_type(&json!(["object", { "a": "string" }])).unwrap(),
            TypeTag::Object
        );
        assert!(simplify_type(&json!(["list"])).is_err());
        assert!(simplify_type(&json!(42)).is_err());
    }

    #[test]
    fn load_schema_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", document()).unwrap();

        let repo = load_schema(file.path(), &options()).unwrap();
        assert!(repo.contains_kind("azurerm_linux_web_app"));
    }

    #[test]
    fn load_schema_file_not_found() {
        let result = load_schema(Path::new("/nonexistent/path.json"), &options());
        assert!(matches!(result, Err(SchemaError::FileNotFound { .. })));
    }

    #[test]
    fn load_schema_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let result = load_schema(file.path(), &options());
        assert!(matches!(result, Err(SchemaError::InvalidJson { .. })));
    }

    #[test]
    fn load_schema_str_invalid() {
        let result = load_schema_str("not json", &options());
        assert!(matches!(result, Err(SchemaError::InvalidJson { .. })));
    }

    #[test]
    fn is_url_detection() {
        assert!(is_url("https://example.com/schema.json"));
        assert!(is_url("http://example.com/schema.json"));
        assert!(!is_url("/path/to/schema.json"));
        assert!(!is_url("schema.json"));
    }

    #[test]
    fn load_schema_auto_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", document()).unwrap();

        let repo = load_schema_auto(file.path().to_str().unwrap(), &options()).unwrap();
        assert_eq!(repo.len(), 1);
    }

    #[cfg(feature = "remote")]
    mod remote {
        use super::*;

        #[test]
        fn load_schema_url_valid() {
            let mut server = mockito::Server::new();
            let mock = server
                .mock("GET", "/schema.json")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(document().to_string())
                .create();

            let url = format!("{}/schema.json", server.url());
            let repo = load_schema_url(&url, &options()).unwrap();
            assert!(repo.contains_kind("azurerm_linux_web_app"));
            mock.assert();
        }

        #[test]
        fn load_schema_url_404() {
            let mut server = mockito::Server::new();
            let _mock = server.mock("GET", "/missing.json").with_status(404).create();

            let url = format!("{}/missing.json", server.url());
            let result = load_schema_url(&url, &options());
            assert!(matches!(result, Err(SchemaError::NetworkError { .. })));
        }
    }
}

//! Attribute-map validation against a resource model.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::AttributeViolation;
use crate::schema::SchemaRepository;

/// Outcome of checking a set of attribute names against a resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<AttributeViolation>,
}

impl AttributeValidation {
    fn from_errors(errors: Vec<AttributeViolation>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate the attribute names a caller intends to set on `kind`.
///
/// Reports, in this order: missing required attributes, names unknown to the
/// schema, and attempts to set computed-only attributes. An unknown kind
/// yields a single `UnknownKind` violation.
pub fn validate_attributes<I, K>(repo: &SchemaRepository, kind: &str, provided: I) -> AttributeValidation
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    let Some(model) = repo.get_resource_model(kind) else {
        return AttributeValidation::from_errors(vec![AttributeViolation::UnknownKind {
            kind: kind.to_string(),
        }]);
    };

    let provided: BTreeSet<String> = provided
        .into_iter()
        .map(|k| k.as_ref().to_string())
        .collect();

    let mut errors = Vec::new();

    for attr in model.required_attributes() {
        if !provided.contains(&attr.name) {
            errors.push(AttributeViolation::MissingRequired {
                attribute: attr.name.clone(),
            });
        }
    }

    for name in &provided {
        match model.attribute(name) {
            None => errors.push(AttributeViolation::UnknownAttribute {
                attribute: name.clone(),
            }),
            Some(spec) if spec.is_computed_only() => {
                errors.push(AttributeViolation::ComputedOnly {
                    attribute: name.clone(),
                })
            }
            Some(_) => {}
        }
    }

    AttributeValidation::from_errors(errors)
}

/// Check only that every name is settable, without requiring completeness.
///
/// Used for partial maps such as explicit overrides.
pub fn check_settable<I, K>(repo: &SchemaRepository, kind: &str, provided: I) -> AttributeValidation
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    let full = validate_attributes(repo, kind, provided);
    AttributeValidation::from_errors(
        full.errors
            .into_iter()
            .filter(|e| !matches!(e, AttributeViolation::MissingRequired { .. }))
            .collect(),
    )
}

impl SchemaRepository {
    /// See [`validate_attributes`].
    pub fn validate_attributes<I, K>(&self, kind: &str, provided: I) -> AttributeValidation
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        validate_attributes(self, kind, provided)
    }
}

//! Pluggable document validators for the schema layer.
//!
//! A [`ValidatorRegistry`] is an ordinary value owned by the caller and
//! handed to the synthesizer. Register validators before synthesizing.

use super::ValidationIssue;
use crate::model::is_expression;
use serde_json::Value;
use std::fmt;

/// A named check over a whole serialized document.
pub trait DocumentValidator: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, document: &Value, unit: &str) -> Vec<ValidationIssue>;
}

#[derive(Default)]
pub struct ValidatorRegistry {
    validators: Vec<Box<dyn DocumentValidator>>,
}

impl ValidatorRegistry {
    /// An empty registry: the schema layer runs but finds nothing.
    pub fn new() -> Self {
        ValidatorRegistry::default()
    }

    /// Schema conformance, naming conventions and platform limits.
    pub fn with_defaults() -> Self {
        let mut registry = ValidatorRegistry::new();
        registry
            .register(SchemaConformanceValidator::new())
            .register(NamingConventionValidator)
            .register(PlatformLimitsValidator::default());
        registry
    }

    pub fn register(&mut self, validator: impl DocumentValidator + 'static) -> &mut Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn validators(&self) -> impl Iterator<Item = &dyn DocumentValidator> {
        self.validators.iter().map(|v| v.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("validators", &self.names())
            .finish()
    }
}

// ── Schema conformance ────────────────────────────────────────────────────────

const DEPLOYMENT_TEMPLATE_SCHEMA: &str =
    include_str!("../../../../schema/deployment-template-schema.json");

/// Checks the document against the bundled structural JSON Schema.
pub struct SchemaConformanceValidator {
    validator: Result<jsonschema::Validator, String>,
}

impl SchemaConformanceValidator {
    pub fn new() -> Self {
        match serde_json::from_str::<Value>(DEPLOYMENT_TEMPLATE_SCHEMA) {
            Ok(schema) => SchemaConformanceValidator::from_schema(&schema),
            Err(e) => SchemaConformanceValidator {
                validator: Err(format!("bundled schema is not JSON: {}", e)),
            },
        }
    }

    pub fn from_schema(schema: &Value) -> Self {
        SchemaConformanceValidator {
            validator: jsonschema::validator_for(schema)
                .map_err(|e| format!("failed to compile schema: {}", e)),
        }
    }
}

impl Default for SchemaConformanceValidator {
    fn default() -> Self {
        SchemaConformanceValidator::new()
    }
}

impl DocumentValidator for SchemaConformanceValidator {
    fn name(&self) -> &str {
        "schema-conformance"
    }

    fn validate(&self, document: &Value, _unit: &str) -> Vec<ValidationIssue> {
        match &self.validator {
            Ok(validator) => validator
                .iter_errors(document)
                .map(|e| ValidationIssue::error("SCHEMA_VIOLATION", format!("{}", e)))
                .collect(),
            Err(message) => vec![ValidationIssue::error("SCHEMA_UNAVAILABLE", message.clone())],
        }
    }
}

// ── Naming conventions ────────────────────────────────────────────────────────

const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', '%', '&', '\\', '?', '#'];
const MAX_NAME_LENGTH: usize = 80;

/// Flags names the platform rejects (errors) or that break common
/// per-type conventions (warnings).
#[derive(Debug, Clone, Copy, Default)]
pub struct NamingConventionValidator;

impl NamingConventionValidator {
    fn check_name(resource_type: &str, name: &str, path: &str) -> Option<ValidationIssue> {
        let segment = name.rsplit('/').next().unwrap_or(name);

        if segment.chars().any(|c| c.is_control() || FORBIDDEN_NAME_CHARS.contains(&c))
            || segment.ends_with('.')
            || segment.trim() != segment
        {
            return Some(
                ValidationIssue::error(
                    "INVALID_NAME",
                    format!("'{}' contains characters the platform rejects", name),
                )
                .at(path)
                .suggest("use letters, digits, hyphens, underscores and periods"),
            );
        }

        let kind = resource_type
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let convention = match kind.as_str() {
            "storageaccounts" => {
                let ok = (3..=24).contains(&segment.len())
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
                (!ok).then_some("storage account names are 3-24 lowercase letters and digits")
            }
            "vaults" => {
                let ok = (3..=24).contains(&segment.len())
                    && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
                (!ok).then_some("key vault names are 3-24 letters, digits and hyphens")
            }
            _ => (segment.len() > MAX_NAME_LENGTH)
                .then_some("names longer than 80 characters are rejected by most resource types"),
        };
        convention.map(|rule| {
            ValidationIssue::warning(
                "NAME_CONVENTION",
                format!("'{}' does not follow the naming rule for '{}'", name, resource_type),
            )
            .at(path)
            .suggest(rule)
        })
    }
}

impl DocumentValidator for NamingConventionValidator {
    fn name(&self) -> &str {
        "naming-convention"
    }

    fn validate(&self, document: &Value, _unit: &str) -> Vec<ValidationIssue> {
        let Some(entries) = document.get("resources").and_then(Value::as_array) else {
            return Vec::new();
        };
        entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let resource_type = entry.get("type").and_then(Value::as_str)?;
                let name = entry.get("name").and_then(Value::as_str)?;
                if name.is_empty() || is_expression(name) {
                    return None;
                }
                NamingConventionValidator::check_name(
                    resource_type,
                    name,
                    &format!("resources[{}].name", i),
                )
            })
            .collect()
    }
}

// ── Platform limits ───────────────────────────────────────────────────────────

/// Engine limits per document; warns once usage crosses `warn_ratio`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformLimitsValidator {
    pub max_resources: usize,
    pub max_parameters: usize,
    pub max_outputs: usize,
    pub max_document_size: usize,
    pub warn_ratio: f64,
}

impl Default for PlatformLimitsValidator {
    fn default() -> Self {
        PlatformLimitsValidator {
            max_resources: 800,
            max_parameters: 256,
            max_outputs: 64,
            max_document_size: 4 * 1024 * 1024,
            warn_ratio: 0.9,
        }
    }
}

impl PlatformLimitsValidator {
    fn check(&self, what: &str, path: &str, used: usize, limit: usize) -> Option<ValidationIssue> {
        if used > limit {
            return Some(
                ValidationIssue::error(
                    "LIMIT_EXCEEDED",
                    format!("{} is {}, above the limit of {}", what, used, limit),
                )
                .at(path)
                .suggest("enable linked templates or split the unit into several stacks"),
            );
        }
        if used as f64 >= limit as f64 * self.warn_ratio {
            return Some(
                ValidationIssue::warning(
                    "LIMIT_APPROACHING",
                    format!("{} is {}, close to the limit of {}", what, used, limit),
                )
                .at(path),
            );
        }
        None
    }
}

impl DocumentValidator for PlatformLimitsValidator {
    fn name(&self) -> &str {
        "platform-limits"
    }

    fn validate(&self, document: &Value, _unit: &str) -> Vec<ValidationIssue> {
        let count = |section: &str| match document.get(section) {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(map)) => map.len(),
            _ => 0,
        };
        let size = serde_json::to_string(document).map(|s| s.len()).unwrap_or(0);

        [
            self.check("resource count", "resources", count("resources"), self.max_resources),
            self.check("parameter count", "parameters", count("parameters"), self.max_parameters),
            self.check("output count", "outputs", count("outputs"), self.max_outputs),
            self.check("document size in bytes", "$", size, self.max_document_size),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

//! Validation Pipeline: five ordered layers over a generated document.
//!
//! The construct layer is satisfied before resources reach this pipeline and
//! only records an empty report. The schema layer delegates to a
//! [`ValidatorRegistry`] supplied by the caller.

mod registry;
mod schema;
mod sequence;
mod structure;
mod transformation;

pub use registry::{
    DocumentValidator, NamingConventionValidator, PlatformLimitsValidator,
    SchemaConformanceValidator, ValidatorRegistry,
};

use crate::model::ResourceNode;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationLayer {
    Construct,
    Transformation,
    ArmStructure,
    DeploymentSequence,
    Schema,
}

impl ValidationLayer {
    pub const ALL: [ValidationLayer; 5] = [
        ValidationLayer::Construct,
        ValidationLayer::Transformation,
        ValidationLayer::ArmStructure,
        ValidationLayer::DeploymentSequence,
        ValidationLayer::Schema,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ValidationLayer::Construct => "construct",
            ValidationLayer::Transformation => "transformation",
            ValidationLayer::ArmStructure => "arm-structure",
            ValidationLayer::DeploymentSequence => "deployment-sequence",
            ValidationLayer::Schema => "schema",
        }
    }
}

impl fmt::Display for ValidationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single finding produced by a validation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ValidationIssue {
            severity: Severity::Error,
            message: message.into(),
            path: None,
            code: code.to_owned(),
            suggestion: None,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        ValidationIssue {
            severity: Severity::Warning,
            ..ValidationIssue::error(code, message)
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}[{}]", label, self.code)?;
        if let Some(path) = &self.path {
            write!(f, " {}", path)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (suggestion: {})", suggestion)?;
        }
        Ok(())
    }
}

/// Timing and counts of one layer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerReport {
    pub layer: ValidationLayer,
    pub duration_us: u64,
    pub error_count: usize,
    pub warning_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    /// Layers that ran, in order.
    pub layers: Vec<LayerReport>,
}

impl ValidationResult {
    /// Combine the result of another document of the same family.
    pub fn merge(&mut self, other: ValidationResult) {
        self.valid = self.valid && other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.layers.extend(other.layers);
    }

    pub fn ran(&self, layer: ValidationLayer) -> bool {
        self.layers.iter().any(|l| l.layer == layer)
    }

    /// Errors first, then warnings.
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().chain(self.warnings.iter())
    }

    /// Short description of the blocking issues, for error messages.
    pub fn summary(&self) -> String {
        let blocking: Vec<String> = if self.errors.is_empty() {
            self.warnings.iter().map(ToString::to_string).collect()
        } else {
            self.errors.iter().map(ToString::to_string).collect()
        };
        let shown = blocking.len().min(3);
        let mut summary = blocking[..shown].join("; ");
        if blocking.len() > shown {
            summary.push_str(&format!("; and {} more", blocking.len() - shown));
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Treat warnings as blocking.
    pub strict: bool,
    /// Stop after the first layer that blocks.
    pub fail_fast: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        ValidationOptions {
            strict: false,
            fail_fast: true,
        }
    }
}

/// Runs the layers in order over one document.
#[derive(Debug, Clone, Copy)]
pub struct ValidationPipeline<'r> {
    registry: &'r ValidatorRegistry,
}

impl<'r> ValidationPipeline<'r> {
    pub fn new(registry: &'r ValidatorRegistry) -> Self {
        ValidationPipeline { registry }
    }

    /// Validate `document`, produced from `resources`, for deployment unit `unit`.
    pub fn validate(
        &self,
        resources: &[ResourceNode],
        document: &Value,
        unit: &str,
        options: &ValidationOptions,
    ) -> ValidationResult {
        let mut result = ValidationResult::default();

        for layer in ValidationLayer::ALL {
            let started = Instant::now();
            let issues = match layer {
                ValidationLayer::Construct => Vec::new(),
                ValidationLayer::Transformation => transformation::check(resources, document),
                ValidationLayer::ArmStructure => structure::check(document),
                ValidationLayer::DeploymentSequence => sequence::check(document),
                ValidationLayer::Schema => schema::check(self.registry, document, unit),
            };
            let duration_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

            let mut report = LayerReport {
                layer,
                duration_us,
                error_count: 0,
                warning_count: 0,
            };
            for issue in issues {
                let issue = tag(issue, layer);
                if issue.is_error() {
                    report.error_count += 1;
                    result.errors.push(issue);
                } else {
                    report.warning_count += 1;
                    result.warnings.push(issue);
                }
            }
            debug!(
                unit,
                layer = %layer,
                errors = report.error_count,
                warnings = report.warning_count,
                duration_us,
                "validation layer finished"
            );

            let blocking = report.error_count > 0 || (options.strict && report.warning_count > 0);
            result.layers.push(report);
            if blocking && options.fail_fast {
                debug!(unit, layer = %layer, "validation stopped early");
                break;
            }
        }

        result.valid =
            result.errors.is_empty() && !(options.strict && !result.warnings.is_empty());
        result
    }
}

fn tag(mut issue: ValidationIssue, layer: ValidationLayer) -> ValidationIssue {
    issue.path = Some(match issue.path.take() {
        Some(path) => format!("{}:{}", layer, path),
        None => layer.to_string(),
    });
    issue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeploymentDocument, DeploymentScope};
    use serde_json::json;

    fn document(resources: Value) -> Value {
        json!({
            "$schema": DeploymentScope::ResourceGroup.schema(),
            "contentVersion": "1.0.0.0",
            "parameters": {},
            "resources": resources,
            "outputs": {}
        })
    }

    fn run(resources: &[ResourceNode], document: &Value, options: ValidationOptions) -> ValidationResult {
        let registry = ValidatorRegistry::with_defaults();
        ValidationPipeline::new(&registry).validate(resources, document, "unit", &options)
    }

    fn vnet(name: &str) -> ResourceNode {
        ResourceNode::new("Microsoft.Network/virtualNetworks", "2023-04-01", name)
            .with_properties(json!({"addressSpace": {"addressPrefixes": ["10.0.0.0/16"]}}))
    }

    #[test]
    fn clean_document_passes_every_layer() {
        let resources = vec![vnet("vnet-core")];
        let doc = DeploymentDocument::new(DeploymentScope::ResourceGroup, resources.clone())
            .to_value()
            .unwrap();
        let result = run(&resources, &doc, ValidationOptions::default());
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.layers.len(), 5);
        assert!(result.ran(ValidationLayer::Schema));
    }

    #[test]
    fn missing_type_stops_after_transformation() {
        let doc = document(json!([{"apiVersion": "2023-04-01", "name": "x"}]));
        let resources = vec![ResourceNode::default()];
        let result = run(&resources, &doc, ValidationOptions::default());

        assert!(!result.valid);
        assert_eq!(result.errors[0].code, "MISSING_TYPE");
        assert_eq!(
            result.errors[0].path.as_deref(),
            Some("transformation:resources[0].type")
        );
        assert!(!result.ran(ValidationLayer::ArmStructure));
        assert!(!result.ran(ValidationLayer::Schema));
    }

    #[test]
    fn without_fail_fast_all_layers_run() {
        let doc = document(json!([{"apiVersion": "2023-04-01", "name": "x"}]));
        let resources = vec![ResourceNode::default()];
        let result = run(
            &resources,
            &doc,
            ValidationOptions {
                strict: false,
                fail_fast: false,
            },
        );
        assert!(!result.valid);
        assert_eq!(result.layers.len(), 5);
    }

    #[test]
    fn warnings_do_not_block_unless_strict() {
        // Count mismatch is a warning from the transformation layer.
        let resources = vec![vnet("a"), vnet("b")];
        let doc = DeploymentDocument::new(DeploymentScope::ResourceGroup, vec![vnet("a")])
            .to_value()
            .unwrap();

        let lenient = run(&resources, &doc, ValidationOptions::default());
        assert!(lenient.valid);
        assert_eq!(lenient.warnings[0].code, "RESOURCE_COUNT_MISMATCH");
        assert_eq!(lenient.layers.len(), 5);

        let strict = run(
            &resources,
            &doc,
            ValidationOptions {
                strict: true,
                fail_fast: true,
            },
        );
        assert!(!strict.valid);
        assert_eq!(strict.layers.len(), 2);
    }

    #[test]
    fn merge_combines_validity() {
        let mut a = ValidationResult {
            valid: true,
            ..ValidationResult::default()
        };
        let b = ValidationResult {
            valid: false,
            errors: vec![ValidationIssue::error("X", "bad")],
            ..ValidationResult::default()
        };
        a.merge(b);
        assert!(!a.valid);
        assert_eq!(a.errors.len(), 1);
        assert_eq!(a.summary(), "error[X]: bad");
    }

    #[test]
    fn issue_display_includes_path_and_suggestion() {
        let issue = ValidationIssue::warning("NAME_CONVENTION", "odd name")
            .at("schema:resources[0].name")
            .suggest("use lowercase");
        assert_eq!(
            issue.to_string(),
            "warning[NAME_CONVENTION] schema:resources[0].name: odd name (suggestion: use lowercase)"
        );
    }
}

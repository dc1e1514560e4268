use super::{ValidationIssue, ValidatorRegistry};
use serde_json::Value;
use tracing::trace;

pub(super) fn check(registry: &ValidatorRegistry, document: &Value, unit: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for validator in registry.validators() {
        let found = validator.validate(document, unit);
        trace!(validator = validator.name(), issues = found.len(), "document validator ran");
        issues.extend(found);
    }
    issues
}

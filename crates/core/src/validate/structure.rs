use super::ValidationIssue;
use crate::model::DeploymentScope;
use serde_json::Value;
use std::collections::HashMap;

pub(super) fn check(document: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    match document.get("$schema").and_then(Value::as_str) {
        None => issues.push(
            ValidationIssue::error("MISSING_SCHEMA", "document has no '$schema'")
                .at("$schema")
                .suggest("set '$schema' to the identifier of the unit's deployment scope"),
        ),
        Some(schema) if DeploymentScope::from_schema(schema).is_none() => issues.push(
            ValidationIssue::warning(
                "UNKNOWN_SCHEMA",
                format!("'{}' is not a known deployment schema", schema),
            )
            .at("$schema"),
        ),
        Some(_) => {}
    }

    if document
        .get("contentVersion")
        .and_then(Value::as_str)
        .map_or(true, str::is_empty)
    {
        issues.push(
            ValidationIssue::error("MISSING_CONTENT_VERSION", "document has no 'contentVersion'")
                .at("contentVersion")
                .suggest("use \"1.0.0.0\""),
        );
    }

    for section in ["parameters", "outputs"] {
        if let Some(value) = document.get(section) {
            if !value.is_object() {
                issues.push(
                    ValidationIssue::error(
                        "INVALID_SECTION",
                        format!("'{}' must be an object", section),
                    )
                    .at(section),
                );
            }
        }
    }

    let Some(entries) = document.get("resources").and_then(Value::as_array) else {
        issues.push(
            ValidationIssue::error("INVALID_RESOURCES", "'resources' must be an array")
                .at("resources"),
        );
        return issues;
    };

    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        let (Some(resource_type), Some(name)) = (
            entry.get("type").and_then(Value::as_str),
            entry.get("name").and_then(Value::as_str),
        ) else {
            continue;
        };
        let key = (resource_type.to_ascii_lowercase(), name.to_ascii_lowercase());
        if let Some(first) = seen.get(&key) {
            issues.push(
                ValidationIssue::error(
                    "DUPLICATE_RESOURCE_NAME",
                    format!(
                        "'{}' of type '{}' is declared at resources[{}] and resources[{}]",
                        name, resource_type, first, i
                    ),
                )
                .at(format!("resources[{}].name", i))
                .suggest("give each resource of a type a distinct name"),
            );
        } else {
            seen.insert(key, i);
        }
    }

    issues
}

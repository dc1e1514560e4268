use super::ValidationIssue;
use crate::model::ResourceNode;
use serde_json::Value;

/// Resource kinds that are not deployable without a `properties` object.
const NEEDS_PROPERTIES: &[&str] = &[
    "virtualnetworks",
    "subnets",
    "networksecuritygroups",
    "networkinterfaces",
    "virtualmachines",
    "storageaccounts",
    "vaults",
    "serverfarms",
    "sites",
];

pub(super) fn check(resources: &[ResourceNode], document: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let Some(entries) = document.get("resources").and_then(Value::as_array) else {
        return issues;
    };

    for (i, entry) in entries.iter().enumerate() {
        let path = |field: &str| format!("resources[{}].{}", i, field);
        for (field, code) in [
            ("type", "MISSING_TYPE"),
            ("apiVersion", "MISSING_API_VERSION"),
            ("name", "MISSING_NAME"),
        ] {
            let present = entry
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.is_empty());
            if !present {
                issues.push(
                    ValidationIssue::error(code, format!("resource {} has no '{}'", i, field))
                        .at(path(field))
                        .suggest(format!("return a non-empty '{}' from to_document", field)),
                );
            }
        }

        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .and_then(|t| t.rsplit('/').next())
            .map(str::to_ascii_lowercase);
        if let Some(kind) = kind {
            if NEEDS_PROPERTIES.contains(&kind.as_str()) && entry.get("properties").is_none() {
                issues.push(
                    ValidationIssue::warning(
                        "MISSING_PROPERTIES",
                        format!("resource {} of kind '{}' has no properties object", i, kind),
                    )
                    .at(path("properties")),
                );
            }
        }
    }

    if entries.len() != resources.len() {
        issues.push(
            ValidationIssue::warning(
                "RESOURCE_COUNT_MISMATCH",
                format!(
                    "{} source resource(s) produced {} document resource(s)",
                    resources.len(),
                    entries.len()
                ),
            )
            .at("resources"),
        );
    }

    issues
}

use super::ValidationIssue;
use crate::deps::{find_cycle, ExpressionIndex};
use crate::model::is_expression;
use serde_json::Value;
use std::collections::BTreeSet;

pub(super) fn check(document: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let Some(entries) = document.get("resources").and_then(Value::as_array) else {
        return issues;
    };

    let mut index = ExpressionIndex::default();
    let mut labels = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let resource_type = entry.get("type").and_then(Value::as_str).unwrap_or_default();
        let name = entry.get("name").and_then(Value::as_str).unwrap_or_default();
        index.insert(i, resource_type, name);
        labels.push(if name.is_empty() {
            format!("resources[{}]", i)
        } else {
            name.to_owned()
        });
    }

    let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); entries.len()];
    for (i, entry) in entries.iter().enumerate() {
        let Some(depends_on) = entry.get("dependsOn") else {
            continue;
        };
        let Some(list) = depends_on.as_array() else {
            issues.push(
                ValidationIssue::error("INVALID_DEPENDS_ON", "'dependsOn' must be an array")
                    .at(format!("resources[{}].dependsOn", i)),
            );
            continue;
        };

        for (k, value) in list.iter().enumerate() {
            let path = format!("resources[{}].dependsOn[{}]", i, k);
            let Some(target) = value.as_str() else {
                issues.push(
                    ValidationIssue::error("INVALID_DEPENDS_ON", "dependsOn entries must be strings")
                        .at(path),
                );
                continue;
            };
            match index.resolve(target) {
                Some(j) => {
                    adjacency[i].insert(j);
                }
                None if is_expression(target) && !ExpressionIndex::is_parseable(target) => {
                    issues.push(
                        ValidationIssue::warning(
                            "UNRESOLVED_DEPENDENCY_EXPRESSION",
                            format!("cannot check dependency '{}' statically", target),
                        )
                        .at(path),
                    );
                }
                None => issues.push(
                    ValidationIssue::error(
                        "MISSING_DEPENDENCY",
                        format!("'{}' depends on '{}', which is not in this document", labels[i], target),
                    )
                    .at(path)
                    .suggest("declare the dependency on a resource of the same deployment unit"),
                ),
            }
        }
    }

    if let Some(cycle) = find_cycle(&adjacency) {
        let path: Vec<&str> = cycle.iter().map(|&i| labels[i].as_str()).collect();
        issues.push(
            ValidationIssue::error(
                "CIRCULAR_DEPENDENCY",
                format!("circular dependency: {}", path.join(" \u{2192} ")),
            )
            .at("resources"),
        );
    }

    issues
}

use std::path::Path;
use std::process;

use armature_core::{ResourceNode, ValidationOptions, ValidationPipeline, ValidatorRegistry};
use serde_json::Value;

use crate::{report_error, OutputFormat};

/// Resources as they appear in the document; entries that do not parse
/// become empty nodes so the structural layers report them.
fn document_resources(doc: &Value) -> Vec<ResourceNode> {
    doc.get("resources")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|e| serde_json::from_value(e.clone()).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn cmd_validate(path: &Path, strict: bool, output: OutputFormat, quiet: bool) {
    let doc_str = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    let doc: Value = match serde_json::from_str(&doc_str) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error parsing JSON in '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let unit = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let registry = ValidatorRegistry::with_defaults();
    let options = ValidationOptions {
        strict,
        fail_fast: false,
    };
    let result = ValidationPipeline::new(&registry).validate(
        &document_resources(&doc),
        &doc,
        &unit,
        &options,
    );

    match output {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&result)
                    .unwrap_or_else(|e| format!("serialization error: {}", e))
            );
        }
        OutputFormat::Text => {
            if !quiet {
                for issue in result.issues() {
                    println!("{}", issue);
                }
                if result.valid {
                    println!("{}: valid", path.display());
                } else {
                    println!(
                        "{}: invalid ({} error(s), {} warning(s))",
                        path.display(),
                        result.errors.len(),
                        result.warnings.len()
                    );
                }
            }
        }
    }

    if !result.valid {
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_entries_become_empty_nodes() {
        let resources = document_resources(&json!({
            "resources": [
                {"type": "Microsoft.Web/sites", "apiVersion": "2022-09-01", "name": "app"},
                "not an object"
            ]
        }));
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].name, "app");
        assert_eq!(resources[1], ResourceNode::default());
    }

    #[test]
    fn missing_resources_section_yields_nothing() {
        assert!(document_resources(&json!({})).is_empty());
    }
}

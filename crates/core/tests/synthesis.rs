//! End-to-end synthesis: construct tree in, documents and manifest on disk.

use armature_core::{
    AssemblyManifest, ConstructTree, DeploymentScope, DocumentValidator, StaticResource,
    SynthConfig, Synthesizer, ValidationIssue, ValidatorRegistry,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

fn config(out: &Path) -> SynthConfig {
    SynthConfig {
        out_dir: out.to_path_buf(),
        ..SynthConfig::default()
    }
}

fn read_json(path: &Path) -> Value {
    let text = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e));
    serde_json::from_str(&text).unwrap()
}

fn network_tree() -> ConstructTree {
    let mut tree = ConstructTree::new("app");
    let stack = tree
        .add_stack(tree.root(), "network", DeploymentScope::ResourceGroup)
        .unwrap();
    tree.add_resource(
        stack,
        "subnet",
        StaticResource::new(json!({
            "type": "Network/vnets/subnets",
            "apiVersion": "2023-04-01",
            "name": "vnet1/subnet1",
            "properties": {"vnetName": "vnet1"}
        })),
    )
    .unwrap();
    tree.add_resource(
        stack,
        "vnet",
        StaticResource::new(json!({
            "type": "Network/vnets",
            "apiVersion": "2023-04-01",
            "name": "vnet1",
            "location": null
        })),
    )
    .unwrap();
    tree
}

#[test]
fn subnet_depends_on_its_network() {
    let dir = tempfile::tempdir().unwrap();
    let assembly = Synthesizer::new(config(dir.path()), ValidatorRegistry::with_defaults())
        .synthesize(&network_tree())
        .unwrap();

    let doc = read_json(&dir.path().join("network.json"));
    assert_eq!(
        doc["$schema"],
        json!(DeploymentScope::ResourceGroup.schema())
    );
    assert_eq!(doc["contentVersion"], json!("1.0.0.0"));
    assert_eq!(doc["parameters"], json!({}));
    assert_eq!(doc["outputs"], json!({}));

    let resources = doc["resources"].as_array().unwrap();
    assert_eq!(resources[0]["name"], json!("vnet1"));
    assert!(resources[0].get("dependsOn").is_none());
    assert!(resources[0].get("location").is_none());
    assert_eq!(resources[1]["name"], json!("vnet1/subnet1"));
    assert_eq!(
        resources[1]["dependsOn"],
        json!(["[resourceId('Network/vnets', 'vnet1')]"])
    );

    assert_eq!(assembly.unit("network").unwrap().resource_count(), 2);
}

#[test]
fn manifest_lists_every_unit() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = ConstructTree::new("app");
    let base = tree
        .add_stack(tree.root(), "base", DeploymentScope::Subscription)
        .unwrap();
    let rg = tree
        .add_resource(
            base,
            "rg",
            StaticResource::new(json!({
                "type": "Microsoft.Resources/resourceGroups",
                "apiVersion": "2022-09-01",
                "name": "rg-app",
                "location": "westeurope"
            }))
            .with_scope(DeploymentScope::Subscription),
        )
        .unwrap();
    let app = tree
        .add_stack(tree.root(), "workload", DeploymentScope::ResourceGroup)
        .unwrap();
    let vault = tree
        .add_resource(
            app,
            "vault",
            StaticResource::new(json!({
                "type": "Microsoft.KeyVault/vaults",
                "apiVersion": "2023-02-01",
                "name": "kv-app",
                "properties": {"tenantId": "00000000-0000-0000-0000-000000000000"}
            })),
        )
        .unwrap();
    tree.add_dependency(vault, rg).unwrap();

    let assembly = Synthesizer::new(config(dir.path()), ValidatorRegistry::with_defaults())
        .synthesize(&tree)
        .unwrap();

    let manifest: AssemblyManifest =
        serde_json::from_value(read_json(&dir.path().join("manifest.json"))).unwrap();
    assert_eq!(manifest, assembly.manifest);
    let keys: Vec<&str> = manifest.artifacts.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["base", "workload"]);
    assert_eq!(manifest.artifacts["workload"].dependencies, vec!["base".to_string()]);
    assert_eq!(manifest.artifacts["base"].template_file, "base.json");
    assert_eq!(manifest.artifacts["base"].scope, DeploymentScope::Subscription);

    let base_doc = read_json(&dir.path().join("base.json"));
    assert_eq!(
        base_doc["$schema"],
        json!(DeploymentScope::Subscription.schema())
    );
    let workload = read_json(&dir.path().join("workload.json"));
    assert_eq!(
        workload["resources"][0]["properties"]["tenantId"],
        json!("[subscription().tenantId]")
    );
    // Cross-unit ordering never becomes a within-document reference.
    assert!(workload["resources"][0].get("dependsOn").is_none());
}

#[test]
fn validation_failure_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let mut tree = ConstructTree::new("app");
    let stack = tree
        .add_stack(tree.root(), "core", DeploymentScope::ResourceGroup)
        .unwrap();
    tree.add_resource(
        stack,
        "untyped",
        StaticResource::new(json!({"apiVersion": "2023-04-01", "name": "thing"})),
    )
    .unwrap();

    let err = Synthesizer::new(config(&out), ValidatorRegistry::with_defaults())
        .synthesize(&tree)
        .unwrap_err();
    let message = err.to_string();
    assert!(
        message.starts_with("Synthesis failed: validation failed for unit 'core'"),
        "{}",
        message
    );
    assert!(message.contains("MISSING_TYPE"));
    assert!(!out.exists());
}

#[test]
fn circular_property_references_fail_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = ConstructTree::new("app");
    let stack = tree
        .add_stack(tree.root(), "loop", DeploymentScope::ResourceGroup)
        .unwrap();
    tree.add_resource(
        stack,
        "a",
        StaticResource::new(json!({
            "type": "Contoso.Widgets/gizmos",
            "apiVersion": "1",
            "name": "alpha",
            "properties": {"peer": "beta"}
        })),
    )
    .unwrap();
    tree.add_resource(
        stack,
        "b",
        StaticResource::new(json!({
            "type": "Contoso.Widgets/gizmos",
            "apiVersion": "1",
            "name": "beta",
            "properties": {"peer": "alpha"}
        })),
    )
    .unwrap();

    let err = Synthesizer::new(config(dir.path()), ValidatorRegistry::with_defaults())
        .synthesize(&tree)
        .unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("Synthesis failed: circular dependency detected"));
    assert!(message.contains("loop/a"));
    assert!(message.contains("loop/b"));
}

fn storage_tree(name: &str) -> ConstructTree {
    let mut tree = ConstructTree::new("app");
    let stack = tree
        .add_stack(tree.root(), "data", DeploymentScope::ResourceGroup)
        .unwrap();
    tree.add_resource(
        stack,
        "storage",
        StaticResource::new(json!({
            "type": "Microsoft.Storage/storageAccounts",
            "apiVersion": "2023-01-01",
            "name": name,
            "kind": "StorageV2",
            "sku": {"name": "Standard_LRS"},
            "properties": {}
        })),
    )
    .unwrap();
    tree
}

#[test]
fn warnings_surface_without_blocking() {
    let dir = tempfile::tempdir().unwrap();
    let assembly = Synthesizer::new(config(dir.path()), ValidatorRegistry::with_defaults())
        .synthesize(&storage_tree("Data_Store"))
        .unwrap();
    assert_eq!(assembly.warnings.len(), 1);
    assert_eq!(assembly.warnings[0].code, "NAME_CONVENTION");
    assert_eq!(
        assembly.warnings[0].path.as_deref(),
        Some("schema:resources[0].name")
    );
    assert!(assembly.warnings[0].suggestion.is_some());
}

#[test]
fn strict_mode_blocks_on_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let err = Synthesizer::new(
        SynthConfig {
            strict: true,
            ..config(dir.path())
        },
        ValidatorRegistry::with_defaults(),
    )
    .synthesize(&storage_tree("Data_Store"))
    .unwrap_err();
    assert!(err.to_string().contains("NAME_CONVENTION"));
}

struct NoPublicAccess;

impl DocumentValidator for NoPublicAccess {
    fn name(&self) -> &str {
        "no-public-access"
    }

    fn validate(&self, document: &Value, unit: &str) -> Vec<ValidationIssue> {
        let public = document["resources"]
            .as_array()
            .map(|rs| {
                rs.iter()
                    .any(|r| r["properties"]["allowBlobPublicAccess"] == json!(true))
            })
            .unwrap_or(false);
        if public {
            vec![ValidationIssue::error(
                "PUBLIC_ACCESS",
                format!("unit '{}' allows public blob access", unit),
            )]
        } else {
            Vec::new()
        }
    }
}

#[test]
fn registered_validators_take_part() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = ConstructTree::new("app");
    let stack = tree
        .add_stack(tree.root(), "data", DeploymentScope::ResourceGroup)
        .unwrap();
    tree.add_resource(
        stack,
        "storage",
        StaticResource::new(json!({
            "type": "Microsoft.Storage/storageAccounts",
            "apiVersion": "2023-01-01",
            "name": "stdata",
            "properties": {"allowBlobPublicAccess": true}
        })),
    )
    .unwrap();

    let mut registry = ValidatorRegistry::with_defaults();
    registry.register(NoPublicAccess);
    let err = Synthesizer::new(config(dir.path()), registry)
        .synthesize(&tree)
        .unwrap_err();
    assert!(err.to_string().contains("PUBLIC_ACCESS"));

    // A fresh registry carries none of that state.
    Synthesizer::new(config(dir.path()), ValidatorRegistry::with_defaults())
        .synthesize(&tree)
        .unwrap();
}

#[test]
fn compact_output_when_pretty_print_is_off() {
    let dir = tempfile::tempdir().unwrap();
    Synthesizer::new(
        SynthConfig {
            pretty_print: false,
            ..config(dir.path())
        },
        ValidatorRegistry::with_defaults(),
    )
    .synthesize(&network_tree())
    .unwrap();
    let text = fs::read_to_string(dir.path().join("network.json")).unwrap();
    assert_eq!(text.trim_end().lines().count(), 1);
}

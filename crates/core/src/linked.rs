//! Build the root and linked documents of a split unit from a
//! [`TemplateAssignment`].

use crate::assign::{DependencyKind, TemplateAssignment};
use crate::deps::ExpressionIndex;
use crate::model::{
    ordering_expression, quote, DeploymentDocument, DeploymentScope, ResourceNode, CONTENT_VERSION,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

pub const DEPLOYMENTS_TYPE: &str = "Microsoft.Resources/deployments";
pub const DEPLOYMENTS_API_VERSION: &str = "2022-09-01";

#[derive(Debug, Clone, PartialEq)]
pub struct LinkedDocument {
    pub name: String,
    /// Path of the file relative to the output directory.
    pub relative_path: String,
    pub document: DeploymentDocument,
}

/// A root document plus the linked documents it deploys.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFamily {
    pub root: DeploymentDocument,
    pub linked: Vec<LinkedDocument>,
}

/// Relative path of a linked document file, as written by the assembler.
pub fn linked_path(unit: &str, document: &str) -> String {
    format!("{}/linked/{}.json", unit, document)
}

/// Name of the deployment resource that deploys `document` of `unit`.
pub fn deployment_name(unit: &str, document: &str) -> String {
    format!("{}-{}", unit, document)
}

/// Split `resources` (already dependency-sorted) into a document family.
///
/// `link_base` is prepended to every `templateLink.relativePath`.
pub fn build_linked_documents(
    scope: DeploymentScope,
    unit: &str,
    resources: &[ResourceNode],
    assignment: &TemplateAssignment,
    link_base: &str,
) -> DocumentFamily {
    let by_id: HashMap<&str, &ResourceNode> = resources.iter().map(|r| (r.id.as_str(), r)).collect();
    let index = ExpressionIndex::new(resources);

    let mut linked = Vec::new();
    for template in assignment.linked_templates() {
        let members: Vec<ResourceNode> = resources
            .iter()
            .filter(|r| assignment.template_of(&r.id) == Some(template.name.as_str()))
            .cloned()
            .map(|mut node| {
                let before = node.depends_on.len();
                node.depends_on.retain(|entry| match index.resolve(entry) {
                    Some(j) => assignment.template_of(&resources[j].id) == Some(template.name.as_str()),
                    None => true,
                });
                if node.depends_on.len() != before {
                    debug!(
                        resource = %node.id,
                        dropped = before - node.depends_on.len(),
                        "cross-template dependsOn entries replaced by deployment ordering"
                    );
                }
                node
            })
            .collect();

        let mut document = DeploymentDocument::new(scope, members);
        for output in &template.outputs {
            let Some(node) = by_id.get(output.resource.as_str()) else {
                continue;
            };
            document.outputs.insert(
                output.name.clone(),
                json!({
                    "type": "string",
                    "value": output_expression(node, &output.field_path),
                }),
            );
        }
        for dep in &assignment.cross_template_dependencies {
            if dep.source_template == template.name && dep.kind == DependencyKind::ValueReference {
                document
                    .parameters
                    .insert(dep.output_name.clone(), json!({ "type": "string" }));
            }
        }

        linked.push(LinkedDocument {
            name: template.name.clone(),
            relative_path: linked_path(unit, &template.name),
            document,
        });
    }

    let root = root_document(scope, unit, assignment, link_base);
    DocumentFamily { root, linked }
}

fn root_document(
    scope: DeploymentScope,
    unit: &str,
    assignment: &TemplateAssignment,
    link_base: &str,
) -> DeploymentDocument {
    // source template -> (target templates, parameters fed from targets)
    let mut ordering: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut fed: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
    for dep in &assignment.cross_template_dependencies {
        ordering
            .entry(dep.source_template.as_str())
            .or_default()
            .insert(dep.target_template.as_str());
        if dep.kind == DependencyKind::ValueReference {
            fed.entry(dep.source_template.as_str())
                .or_default()
                .insert(dep.output_name.as_str(), dep.target_template.as_str());
        }
    }

    let deployments = assignment
        .linked_templates()
        .map(|template| {
            let name = deployment_name(unit, &template.name);
            let mut parameters = Map::new();
            if let Some(inputs) = fed.get(template.name.as_str()) {
                for (output, target) in inputs {
                    parameters.insert(
                        (*output).to_owned(),
                        json!({
                            "value": format!(
                                "[reference({}).outputs.{}.value]",
                                quote(&deployment_name(unit, target)),
                                output
                            )
                        }),
                    );
                }
            }

            let mut node = ResourceNode::new(DEPLOYMENTS_TYPE, DEPLOYMENTS_API_VERSION, &name)
                .with_properties(json!({
                    "mode": "Incremental",
                    "templateLink": {
                        "relativePath": format!("{}{}", link_base, linked_path(unit, &template.name)),
                        "contentVersion": CONTENT_VERSION,
                    },
                    "parameters": Value::Object(parameters),
                }))
                .with_depends_on(
                    ordering
                        .get(template.name.as_str())
                        .map(|targets| {
                            targets
                                .iter()
                                .map(|t| ordering_expression(DEPLOYMENTS_TYPE, &deployment_name(unit, t)))
                                .collect()
                        })
                        .unwrap_or_default(),
                );
            if scope != DeploymentScope::ResourceGroup {
                node.location = Some(json!("[deployment().location]"));
            }
            node
        })
        .collect();

    DeploymentDocument::new(scope, deployments)
}

/// Expression that reads `field_path` of `node` at deployment time.
fn output_expression(node: &ResourceNode, field_path: &str) -> String {
    let id = node.ordering_expression();
    let id_call = id.trim_start_matches('[').trim_end_matches(']');
    if field_path == "id" {
        return id;
    }
    format!(
        "[reference({}, {}, 'Full').{}]",
        id_call,
        quote(&node.api_version),
        field_path
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::{AssignmentOptions, GroupingStrategy, ResourceMetadata, TemplateAssigner};
    use pretty_assertions::assert_eq;

    fn node(id: &str, ty: &str, name: &str) -> ResourceNode {
        ResourceNode::new(ty, "2023-01-01", name).with_id(id)
    }

    fn split(resources: &[ResourceNode], metadata: Vec<ResourceMetadata>) -> TemplateAssignment {
        TemplateAssigner::new(AssignmentOptions {
            strategy: GroupingStrategy::ByTier,
            prefer_linked: true,
            ..AssignmentOptions::default()
        })
        .assign(&metadata)
        .map(|a| {
            assert_eq!(a.assignments.len(), resources.len());
            a
        })
        .unwrap()
    }

    #[test]
    fn root_holds_only_deployments() {
        let store = node("app/store", "Microsoft.Storage/storageAccounts", "st1");
        let site = node("app/site", "Microsoft.Web/sites", "web1")
            .with_depends_on(vec![store.ordering_expression()]);
        let resources = vec![store, site];
        let assignment = split(
            &resources,
            vec![
                ResourceMetadata::new("app/store", "Microsoft.Storage/storageAccounts", "st1", 200),
                ResourceMetadata::new("app/site", "Microsoft.Web/sites", "web1", 200)
                    .with_dependencies(&["app/store"])
                    .with_hint("reference:app/store", "properties.primaryEndpoints.blob"),
            ],
        );

        let family = build_linked_documents(
            DeploymentScope::ResourceGroup,
            "app",
            &resources,
            &assignment,
            "",
        );

        assert!(family
            .root
            .resources
            .iter()
            .all(|r| r.resource_type == DEPLOYMENTS_TYPE));
        assert_eq!(family.root.resources.len(), 2);
        assert_eq!(family.linked.len(), 2);

        let application = &family.root.resources[1];
        assert_eq!(application.name, "app-application-1");
        assert_eq!(
            application.depends_on,
            vec!["[resourceId('Microsoft.Resources/deployments', 'app-foundation-1')]".to_string()]
        );
        let properties = application.properties.as_ref().unwrap();
        assert_eq!(
            properties["templateLink"]["relativePath"],
            json!("app/linked/application-1.json")
        );
        assert_eq!(
            properties["parameters"]["appStorePropertiesPrimaryEndpointsBlob"]["value"],
            json!("[reference('app-foundation-1').outputs.appStorePropertiesPrimaryEndpointsBlob.value]")
        );
        assert!(application.location.is_none());

        let foundation = &family.linked[0].document;
        assert_eq!(
            foundation.outputs["appStorePropertiesPrimaryEndpointsBlob"]["value"],
            json!("[reference(resourceId('Microsoft.Storage/storageAccounts', 'st1'), '2023-01-01', 'Full').properties.primaryEndpoints.blob]")
        );

        let app_doc = &family.linked[1].document;
        assert!(app_doc.resources[0].depends_on.is_empty());
        assert!(app_doc
            .parameters
            .contains_key("appStorePropertiesPrimaryEndpointsBlob"));
    }

    #[test]
    fn ordering_edges_expose_resource_ids() {
        let vnet = node("net/vnet", "Microsoft.Network/virtualNetworks", "vnet1");
        let vm = node("net/vm", "Microsoft.Compute/virtualMachines", "vm1")
            .with_depends_on(vec![vnet.ordering_expression()]);
        let resources = vec![vnet, vm];
        let assignment = split(
            &resources,
            vec![
                ResourceMetadata::new("net/vnet", "Microsoft.Network/virtualNetworks", "vnet1", 100),
                ResourceMetadata::new("net/vm", "Microsoft.Compute/virtualMachines", "vm1", 100)
                    .with_dependencies(&["net/vnet"]),
            ],
        );
        let family = build_linked_documents(
            DeploymentScope::Subscription,
            "net",
            &resources,
            &assignment,
            "templates/",
        );

        let foundation = &family.linked[0];
        assert_eq!(foundation.relative_path, "net/linked/foundation-1.json");
        assert_eq!(
            foundation.document.outputs["netVnetId"]["value"],
            json!("[resourceId('Microsoft.Network/virtualNetworks', 'vnet1')]")
        );
        let deployment = &family.root.resources[0];
        assert_eq!(deployment.location, Some(json!("[deployment().location]")));
        assert_eq!(
            deployment.properties.as_ref().unwrap()["templateLink"]["relativePath"],
            json!("templates/net/linked/foundation-1.json")
        );
        assert!(family.linked[1].document.parameters.is_empty());
    }

    #[test]
    fn same_document_dependencies_are_kept() {
        let a = node("u/a", "Microsoft.Network/virtualNetworks", "a");
        let b = node("u/b", "Microsoft.Network/networkSecurityGroups", "b")
            .with_depends_on(vec![a.ordering_expression()]);
        let resources = vec![a, b];
        let assignment = split(
            &resources,
            vec![
                ResourceMetadata::new("u/a", "Microsoft.Network/virtualNetworks", "a", 100),
                ResourceMetadata::new("u/b", "Microsoft.Network/networkSecurityGroups", "b", 100)
                    .with_dependencies(&["u/a"]),
            ],
        );
        let family =
            build_linked_documents(DeploymentScope::ResourceGroup, "u", &resources, &assignment, "");
        assert_eq!(family.linked.len(), 1);
        assert_eq!(family.linked[0].document.resources[1].depends_on.len(), 1);
        assert!(family.root.resources[0].depends_on.is_empty());
    }
}

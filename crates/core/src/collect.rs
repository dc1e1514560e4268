//! Resource Collector: group traversed resources by deployment unit and
//! check scope legality.

use crate::error::SynthError;
use crate::tree::{DeploymentUnit, Traversal, TraversedResource};

/// Resources of one deployment unit, in traversal order.
#[derive(Debug, Clone)]
pub struct UnitResources<'a> {
    pub unit: DeploymentUnit,
    pub resources: Vec<TraversedResource<'a>>,
}

pub fn collect(traversal: Traversal<'_>) -> Result<Vec<UnitResources<'_>>, SynthError> {
    let mut grouped: Vec<UnitResources<'_>> = traversal
        .units
        .into_iter()
        .map(|unit| UnitResources {
            unit,
            resources: Vec::new(),
        })
        .collect();

    for resource in traversal.resources {
        let entry = &mut grouped[resource.unit];
        let required = resource.resource.target_scope();
        if required.breadth() > entry.unit.scope.breadth() {
            return Err(SynthError::Scope {
                resource: resource.path.clone(),
                unit: entry.unit.name.clone(),
                required: required.to_string(),
                actual: entry.unit.scope.to_string(),
            });
        }
        entry.resources.push(resource);
    }

    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeploymentScope;
    use crate::resource::StaticResource;
    use crate::tree::{traverse, ConstructTree};
    use serde_json::json;

    fn resource_group(name: &str) -> StaticResource {
        StaticResource::new(json!({
            "type": "Microsoft.Resources/resourceGroups",
            "apiVersion": "2022-09-01",
            "name": name,
        }))
        .with_scope(DeploymentScope::Subscription)
    }

    #[test]
    fn groups_resources_per_unit() {
        let mut tree = ConstructTree::new("app");
        let a = tree
            .add_stack(tree.root(), "a", DeploymentScope::Subscription)
            .unwrap();
        let b = tree
            .add_stack(tree.root(), "b", DeploymentScope::Subscription)
            .unwrap();
        tree.add_resource(a, "rg1", resource_group("rg1")).unwrap();
        tree.add_resource(b, "rg2", resource_group("rg2")).unwrap();
        tree.add_resource(a, "rg3", resource_group("rg3")).unwrap();

        let units = collect(traverse(&tree).unwrap()).unwrap();
        assert_eq!(units.len(), 2);
        let a_paths: Vec<&str> = units[0].resources.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(a_paths, vec!["a/rg1", "a/rg3"]);
        assert_eq!(units[1].resources.len(), 1);
    }

    #[test]
    fn broader_scoped_resource_in_narrower_unit_is_rejected() {
        let mut tree = ConstructTree::new("app");
        let stack = tree
            .add_stack(tree.root(), "workload", DeploymentScope::ResourceGroup)
            .unwrap();
        tree.add_resource(stack, "rg", resource_group("rg")).unwrap();

        let err = collect(traverse(&tree).unwrap()).unwrap_err();
        match err {
            SynthError::Scope {
                resource,
                unit,
                required,
                actual,
            } => {
                assert_eq!(resource, "workload/rg");
                assert_eq!(unit, "workload");
                assert_eq!(required, "subscription");
                assert_eq!(actual, "resource-group");
            }
            other => panic!("expected scope error, got {:?}", other),
        }
    }

    #[test]
    fn empty_units_are_kept() {
        let mut tree = ConstructTree::new("app");
        tree.add_stack(tree.root(), "empty", DeploymentScope::ResourceGroup)
            .unwrap();
        let units = collect(traverse(&tree).unwrap()).unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].resources.is_empty());
    }
}

//! Loading a JSON application description into a construct tree.
//!
//! The description mirrors the tree: an app holds stacks, stacks hold
//! resources, groups and nested stacks. `dependsOn` entries name other
//! constructs by path and are wired after every construct exists.

use std::collections::BTreeMap;
use std::path::Path;

use armature_core::{
    ConstructId, ConstructTree, DeploymentScope, StaticResource, Tier, TreeError,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub(crate) enum AppError {
    #[error("error reading file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing application description '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid construct tree: {0}")]
    Tree(#[from] TreeError),

    #[error("'{from}' depends on '{to}', which is not a construct path")]
    UnknownDependency { from: String, to: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct AppSpec {
    pub app: String,
    #[serde(default)]
    pub stacks: Vec<StackSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StackSpec {
    pub id: String,
    #[serde(default = "default_scope")]
    pub scope: DeploymentScope,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
    #[serde(default)]
    pub stacks: Vec<StackSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct GroupSpec {
    pub id: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ResourceSpec {
    pub id: String,
    pub document: Value,
    #[serde(default = "default_scope")]
    pub scope: DeploymentScope,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub co_located_with: Vec<String>,
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_scope() -> DeploymentScope {
    DeploymentScope::ResourceGroup
}

impl ResourceSpec {
    fn to_resource(&self) -> StaticResource {
        let mut resource = StaticResource::new(self.document.clone()).with_scope(self.scope);
        if let Some(tier) = self.tier {
            resource = resource.with_tier(tier);
        }
        for path in &self.co_located_with {
            resource = resource.co_located_with_path(path);
        }
        for (key, value) in &self.hints {
            resource = resource.with_hint(key, value);
        }
        resource
    }
}

/// Read and build the construct tree described by the file at `path`.
pub(crate) fn load(path: &Path) -> Result<ConstructTree, AppError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| AppError::Read {
        path: display.clone(),
        source,
    })?;
    let spec: AppSpec = serde_json::from_str(&text).map_err(|source| AppError::Parse {
        path: display,
        source,
    })?;
    build(&spec)
}

/// Build the construct tree for an already-parsed description.
pub(crate) fn build(spec: &AppSpec) -> Result<ConstructTree, AppError> {
    let mut tree = ConstructTree::new(&spec.app);
    let mut pending: Vec<(ConstructId, String, Vec<String>)> = Vec::new();
    let root = tree.root();
    for stack in &spec.stacks {
        add_stack(&mut tree, root, "", stack, &mut pending)?;
    }

    for (from, from_path, targets) in pending {
        for target in targets {
            let Some(to) = tree.find(&target) else {
                return Err(AppError::UnknownDependency {
                    from: from_path,
                    to: target,
                });
            };
            tree.add_dependency(from, to)?;
        }
    }
    tracing::debug!(app = %spec.app, constructs = tree.len(), "application loaded");
    Ok(tree)
}

fn child_path(parent: &str, id: &str) -> String {
    if parent.is_empty() {
        id.to_owned()
    } else {
        format!("{}/{}", parent, id)
    }
}

fn add_stack(
    tree: &mut ConstructTree,
    parent: ConstructId,
    parent_path: &str,
    spec: &StackSpec,
    pending: &mut Vec<(ConstructId, String, Vec<String>)>,
) -> Result<(), AppError> {
    let id = tree.add_stack(parent, &spec.id, spec.scope)?;
    let path = child_path(parent_path, &spec.id);
    if !spec.depends_on.is_empty() {
        pending.push((id, path.clone(), spec.depends_on.clone()));
    }
    add_children(tree, id, &path, &spec.resources, &spec.groups, pending)?;
    for nested in &spec.stacks {
        add_stack(tree, id, &path, nested, pending)?;
    }
    Ok(())
}

fn add_children(
    tree: &mut ConstructTree,
    parent: ConstructId,
    parent_path: &str,
    resources: &[ResourceSpec],
    groups: &[GroupSpec],
    pending: &mut Vec<(ConstructId, String, Vec<String>)>,
) -> Result<(), AppError> {
    for resource in resources {
        let id = tree.add_resource(parent, &resource.id, resource.to_resource())?;
        if !resource.depends_on.is_empty() {
            pending.push((
                id,
                child_path(parent_path, &resource.id),
                resource.depends_on.clone(),
            ));
        }
    }
    for group in groups {
        let id = tree.add_group(parent, &group.id)?;
        let path = child_path(parent_path, &group.id);
        if !group.depends_on.is_empty() {
            pending.push((id, path.clone(), group.depends_on.clone()));
        }
        add_children(tree, id, &path, &group.resources, &group.groups, pending)?;
    }
    Ok(())
}

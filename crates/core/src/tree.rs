//! Construct tree and the Tree Traverser.
//!
//! The tree is an arena rooted at an application node. Stacks are the only
//! constructs that provide a deployment scope; every resource must live
//! beneath one. [`traverse`] walks the tree once, parent before child, and
//! resolves each resource's owning unit and its construct-level dependencies.

use crate::error::TreeError;
use crate::model::DeploymentScope;
use crate::resource::Resource;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Unit name taken by the assembly manifest file.
const MANIFEST_UNIT: &str = "manifest";

/// Handle to a node in a [`ConstructTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstructId(usize);

/// Capability of constructs that define a deployment unit.
pub trait ScopeProvider {
    fn unit_name(&self) -> &str;
    fn scope(&self) -> DeploymentScope;
}

/// Properties of a stack construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackProps {
    pub unit_name: String,
    pub scope: DeploymentScope,
}

impl ScopeProvider for StackProps {
    fn unit_name(&self) -> &str {
        &self.unit_name
    }

    fn scope(&self) -> DeploymentScope {
        self.scope
    }
}

#[derive(Debug)]
pub enum ConstructKind {
    App,
    Stack(StackProps),
    Group,
    Resource(Box<dyn Resource>),
}

impl ConstructKind {
    pub fn as_scope_provider(&self) -> Option<&dyn ScopeProvider> {
        match self {
            ConstructKind::Stack(props) => Some(props),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&dyn Resource> {
        match self {
            ConstructKind::Resource(resource) => Some(resource.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ConstructNode {
    pub id: ConstructId,
    /// Id local to the parent.
    pub local_id: String,
    /// `/`-joined ids from the first child of the application root.
    pub path: String,
    pub parent: Option<ConstructId>,
    pub children: Vec<ConstructId>,
    pub kind: ConstructKind,
    pub dependencies: Vec<ConstructId>,
}

#[derive(Debug)]
pub struct ConstructTree {
    nodes: Vec<ConstructNode>,
}

impl ConstructTree {
    pub fn new(app_id: &str) -> Self {
        ConstructTree {
            nodes: vec![ConstructNode {
                id: ConstructId(0),
                local_id: app_id.to_owned(),
                path: String::new(),
                parent: None,
                children: Vec::new(),
                kind: ConstructKind::App,
                dependencies: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> ConstructId {
        ConstructId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: ConstructId) -> Result<&ConstructNode, TreeError> {
        self.nodes.get(id.0).ok_or(TreeError::UnknownConstruct(id.0))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ConstructNode> {
        self.nodes.iter()
    }

    /// Look up a construct by its path.
    pub fn find(&self, path: &str) -> Option<ConstructId> {
        self.nodes
            .iter()
            .find(|node| node.parent.is_some() && node.path == path)
            .map(|node| node.id)
    }

    /// Add a stack. Nested stacks form their own deployment unit, named
    /// after their path with `/` replaced by `-`. Unit names are file names
    /// in the assembly, so they must be unique and must not be `manifest`.
    pub fn add_stack(
        &mut self,
        parent: ConstructId,
        id: &str,
        scope: DeploymentScope,
    ) -> Result<ConstructId, TreeError> {
        let path = self.child_path(parent, id)?;
        let unit_name = path.replace('/', "-");
        if unit_name == MANIFEST_UNIT {
            return Err(TreeError::ReservedUnitName(path));
        }
        let taken = self.nodes.iter().any(|node| {
            node.kind
                .as_scope_provider()
                .is_some_and(|stack| stack.unit_name() == unit_name)
        });
        if taken {
            return Err(TreeError::DuplicateUnit {
                path,
                unit: unit_name,
            });
        }
        Ok(self.push_node(
            parent,
            id,
            path,
            ConstructKind::Stack(StackProps { unit_name, scope }),
        ))
    }

    pub fn add_group(&mut self, parent: ConstructId, id: &str) -> Result<ConstructId, TreeError> {
        self.add_node(parent, id, ConstructKind::Group)
    }

    pub fn add_resource(
        &mut self,
        parent: ConstructId,
        id: &str,
        resource: impl Resource + 'static,
    ) -> Result<ConstructId, TreeError> {
        self.add_node(parent, id, ConstructKind::Resource(Box::new(resource)))
    }

    /// Record that `from` must be deployed after `to`.
    pub fn add_dependency(&mut self, from: ConstructId, to: ConstructId) -> Result<(), TreeError> {
        self.node(to)?;
        let node = self
            .nodes
            .get_mut(from.0)
            .ok_or(TreeError::UnknownConstruct(from.0))?;
        if from != to && !node.dependencies.contains(&to) {
            node.dependencies.push(to);
        }
        Ok(())
    }

    fn add_node(
        &mut self,
        parent: ConstructId,
        id: &str,
        kind: ConstructKind,
    ) -> Result<ConstructId, TreeError> {
        let path = self.child_path(parent, id)?;
        Ok(self.push_node(parent, id, path, kind))
    }

    /// Path of a new child `id` under `parent`, checking the id is legal there.
    fn child_path(&self, parent: ConstructId, id: &str) -> Result<String, TreeError> {
        if id.is_empty() || id.contains('/') {
            return Err(TreeError::InvalidId(id.to_owned()));
        }
        let parent_node = self.node(parent)?;
        if matches!(parent_node.kind, ConstructKind::Resource(_)) {
            return Err(TreeError::NotAContainer(parent_node.path.clone()));
        }
        for child in &parent_node.children {
            if self.nodes[child.0].local_id == id {
                return Err(TreeError::DuplicateId {
                    parent: parent_node.path.clone(),
                    id: id.to_owned(),
                });
            }
        }
        Ok(if parent_node.path.is_empty() {
            id.to_owned()
        } else {
            format!("{}/{}", parent_node.path, id)
        })
    }

    fn push_node(
        &mut self,
        parent: ConstructId,
        id: &str,
        path: String,
        kind: ConstructKind,
    ) -> ConstructId {
        let new_id = ConstructId(self.nodes.len());
        self.nodes.push(ConstructNode {
            id: new_id,
            local_id: id.to_owned(),
            path,
            parent: Some(parent),
            children: Vec::new(),
            kind,
            dependencies: Vec::new(),
        });
        self.nodes[parent.0].children.push(new_id);
        new_id
    }

    /// Every resource construct in the subtree rooted at `id`, in pre-order.
    fn resources_under(&self, id: ConstructId) -> Vec<ConstructId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0];
            if matches!(node.kind, ConstructKind::Resource(_)) {
                out.push(current);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }
}

// ── Traversal ─────────────────────────────────────────────────────────────────

/// A deployment unit discovered during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentUnit {
    pub name: String,
    pub scope: DeploymentScope,
    pub construct: ConstructId,
    /// Names of units that must be deployed before this one.
    pub dependencies: BTreeSet<String>,
}

/// A resource construct together with its resolved unit and dependencies.
#[derive(Debug, Clone)]
pub struct TraversedResource<'a> {
    pub construct: ConstructId,
    pub path: String,
    /// Index into [`Traversal::units`].
    pub unit: usize,
    pub resource: &'a dyn Resource,
    /// Paths of resources in the same unit this resource explicitly depends on.
    pub explicit_dependencies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Traversal<'a> {
    pub units: Vec<DeploymentUnit>,
    pub resources: Vec<TraversedResource<'a>>,
}

/// Walk the tree in parent-before-child order.
pub fn traverse(tree: &ConstructTree) -> Result<Traversal<'_>, TreeError> {
    let mut units: Vec<DeploymentUnit> = Vec::new();
    let mut unit_of: Vec<Option<usize>> = vec![None; tree.nodes.len()];
    let mut order: Vec<ConstructId> = Vec::new();

    let mut stack: Vec<(ConstructId, Option<usize>)> = vec![(tree.root(), None)];
    while let Some((id, inherited)) = stack.pop() {
        let node = &tree.nodes[id.0];
        let owner = match node.kind.as_scope_provider() {
            Some(scope) => {
                units.push(DeploymentUnit {
                    name: scope.unit_name().to_owned(),
                    scope: scope.scope(),
                    construct: id,
                    dependencies: BTreeSet::new(),
                });
                Some(units.len() - 1)
            }
            None => inherited,
        };
        unit_of[id.0] = owner;
        order.push(id);
        for child in node.children.iter().rev() {
            stack.push((*child, owner));
        }
    }

    let mut resources = Vec::new();
    for id in order {
        let node = &tree.nodes[id.0];
        match &node.kind {
            ConstructKind::Resource(resource) => {
                let unit = unit_of[id.0].ok_or_else(|| TreeError::OrphanResource(node.path.clone()))?;
                let mut explicit_dependencies = Vec::new();
                for target in declared_dependencies(tree, id, units[unit].construct) {
                    for dep in tree.resources_under(target) {
                        if dep == id {
                            continue;
                        }
                        let dep_path = &tree.nodes[dep.0].path;
                        match unit_of[dep.0] {
                            Some(dep_unit) if dep_unit == unit => {
                                if !explicit_dependencies.contains(dep_path) {
                                    explicit_dependencies.push(dep_path.clone());
                                }
                            }
                            Some(dep_unit) => {
                                let dep_name = units[dep_unit].name.clone();
                                debug!(
                                    resource = %node.path,
                                    dependency = %dep_path,
                                    "cross-unit dependency recorded at unit level"
                                );
                                units[unit].dependencies.insert(dep_name);
                            }
                            None => {}
                        }
                    }
                }
                resources.push(TraversedResource {
                    construct: id,
                    path: node.path.clone(),
                    unit,
                    resource: resource.as_ref(),
                    explicit_dependencies,
                });
            }
            ConstructKind::Stack(_) => {
                let Some(unit) = unit_of[id.0] else { continue };
                for target in &node.dependencies {
                    let mut target_units: BTreeSet<usize> = BTreeSet::new();
                    target_units.extend(unit_of[target.0]);
                    for dep in tree.resources_under(*target) {
                        target_units.extend(unit_of[dep.0]);
                    }
                    target_units.remove(&unit);
                    if target_units.is_empty() {
                        warn!(
                            stack = %node.path,
                            target = %tree.nodes[target.0].path,
                            "stack dependency resolves to no other deployment unit"
                        );
                    }
                    for target_unit in target_units {
                        let name = units[target_unit].name.clone();
                        units[unit].dependencies.insert(name);
                    }
                }
            }
            ConstructKind::App | ConstructKind::Group => {}
        }
    }

    debug!(
        units = units.len(),
        resources = resources.len(),
        "construct tree traversed"
    );
    Ok(Traversal { units, resources })
}

/// Dependencies declared on the resource itself and on every ancestor below its stack.
fn declared_dependencies(
    tree: &ConstructTree,
    resource: ConstructId,
    stack: ConstructId,
) -> Vec<ConstructId> {
    let mut out = Vec::new();
    let mut current = Some(resource);
    while let Some(id) = current {
        if id == stack {
            break;
        }
        let node = &tree.nodes[id.0];
        for dep in &node.dependencies {
            if !out.contains(dep) {
                out.push(*dep);
            }
        }
        current = node.parent;
    }
    out
}

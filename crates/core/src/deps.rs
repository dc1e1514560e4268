//! Dependency Resolver: infer ordering edges between transformed resources,
//! reject cycles, emit `dependsOn` expressions, and sort for deployment.
//!
//! Edges come from four additive sources:
//!
//! - construct-level dependencies declared on the tree,
//! - `dependsOn` entries the resource already carried,
//! - any other resource whose `name` occurs inside this resource's serialized
//!   `properties` (coarse on purpose: extra ordering is harmless),
//! - structural rules: nested-type parents, subnet to security group, inline
//!   subnets resolving to their network, and a table of well-known pairs.
//!
//! The graph is rebuilt on every call and never cached.

use crate::error::SynthError;
use crate::model::{is_expression, parse_ordering_expression, resource_key, ResourceNode};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Construct-level view of a resource: its path and explicit dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNode {
    pub id: String,
    pub dependencies: Vec<String>,
}

impl SourceNode {
    pub fn new(id: &str, dependencies: &[&str]) -> Self {
        SourceNode {
            id: id.to_owned(),
            dependencies: dependencies.iter().map(|d| (*d).to_owned()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraphNode {
    pub id: String,
    /// Resources this one requires.
    pub dependencies: BTreeSet<String>,
    /// Resources that require this one.
    pub dependents: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<DependencyGraphNode>,
    edges: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn nodes(&self) -> &[DependencyGraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&DependencyGraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(BTreeSet::len).sum()
    }

    /// First cycle found, as identifiers with the start repeated at the end.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        find_cycle(&self.edges).map(|cycle| {
            cycle
                .into_iter()
                .map(|i| self.nodes[i].id.clone())
                .collect()
        })
    }
}

// ── Well-known resource kinds ─────────────────────────────────────────────────

const NETWORK_KINDS: &[&str] = &["virtualnetworks", "vnets"];
const SUBNET_KINDS: &[&str] = &["subnets"];
const SECURITY_GROUP_KINDS: &[&str] = &["networksecuritygroups", "nsgs"];
const INSTANCE_KINDS: &[&str] = &["virtualmachines"];
const INTERFACE_KINDS: &[&str] = &["networkinterfaces"];
const APPLICATION_KINDS: &[&str] = &["sites"];
const PLAN_KINDS: &[&str] = &["serverfarms"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeCondition {
    Always,
    StandaloneSubnets,
}

/// `(dependent kinds, dependency kinds, condition)`.
const WELL_KNOWN_EDGES: [(&[&str], &[&str], EdgeCondition); 3] = [
    (INSTANCE_KINDS, INTERFACE_KINDS, EdgeCondition::Always),
    (INSTANCE_KINDS, SUBNET_KINDS, EdgeCondition::StandaloneSubnets),
    (APPLICATION_KINDS, PLAN_KINDS, EdgeCondition::Always),
];

fn is_kind(node: &ResourceNode, kinds: &[&str]) -> bool {
    let kind = node.kind_segment();
    kinds.contains(&kind.as_str())
}

fn has_standalone_subnets(resources: &[ResourceNode]) -> bool {
    resources.iter().any(|r| is_kind(r, SUBNET_KINDS))
}

fn names_subnet_type(entry: &str) -> bool {
    parse_ordering_expression(entry)
        .map(|(resource_type, _)| {
            let lower = resource_type.to_ascii_lowercase();
            SUBNET_KINDS.contains(&crate::model::kind_segment(&lower))
        })
        .unwrap_or(false)
}

// ── Expression index ──────────────────────────────────────────────────────────

/// Resolves `dependsOn` entries (ordering expressions or plain names) to
/// positions in a resource list.
#[derive(Debug, Clone, Default)]
pub struct ExpressionIndex {
    by_key: HashMap<(String, String), usize>,
    by_name: HashMap<String, usize>,
}

impl ExpressionIndex {
    pub fn new(resources: &[ResourceNode]) -> Self {
        let mut index = ExpressionIndex::default();
        for (i, r) in resources.iter().enumerate() {
            index.insert(i, &r.resource_type, &r.name);
        }
        index
    }

    pub fn insert(&mut self, position: usize, resource_type: &str, name: &str) {
        self.by_key
            .entry(resource_key(resource_type, name))
            .or_insert(position);
        self.by_name
            .entry(name.to_ascii_lowercase())
            .or_insert(position);
    }

    pub fn resolve(&self, entry: &str) -> Option<usize> {
        if let Some((resource_type, name)) = parse_ordering_expression(entry) {
            return self.by_key.get(&resource_key(&resource_type, &name)).copied();
        }
        if is_expression(entry) {
            return None;
        }
        self.by_name.get(&entry.to_ascii_lowercase()).copied()
    }

    /// True when `entry` is a `resourceId` call with literal arguments.
    pub fn is_parseable(entry: &str) -> bool {
        parse_ordering_expression(entry).is_some()
    }
}

// ── Resolver ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        DependencyResolver
    }

    /// Annotate every resource with its merged `dependsOn` list.
    ///
    /// `sources` carries construct-level dependencies keyed by resource id;
    /// resources without a matching source node simply have none.
    pub fn resolve(
        &self,
        mut resources: Vec<ResourceNode>,
        sources: &[SourceNode],
    ) -> Result<Vec<ResourceNode>, SynthError> {
        let graph = self.build_graph(&resources, sources);
        if let Some(path) = graph.find_cycle() {
            return Err(SynthError::CircularDependency { path });
        }

        let standalone_subnets = has_standalone_subnets(&resources);
        let index = ExpressionIndex::new(&resources);
        let expressions: Vec<String> = resources
            .iter()
            .map(ResourceNode::ordering_expression)
            .collect();

        for (i, node) in resources.iter_mut().enumerate() {
            let existing: Vec<String> = std::mem::take(&mut node.depends_on)
                .into_iter()
                .filter(|entry| standalone_subnets || !names_subnet_type(entry))
                .filter_map(|entry| match index.resolve(&entry) {
                    Some(j) if j == i => None,
                    Some(j) => Some(expressions[j].clone()),
                    None => Some(entry),
                })
                .collect();
            let detected: Vec<String> = graph.edges[i]
                .iter()
                .map(|&j| expressions[j].clone())
                .collect();
            add_depends_on(node, existing, detected);
        }

        info!(
            resources = resources.len(),
            edges = graph.edge_count(),
            "dependencies resolved"
        );
        Ok(resources)
    }

    /// Build the dependency graph over `resources`.
    pub fn build_graph(&self, resources: &[ResourceNode], sources: &[SourceNode]) -> DependencyGraph {
        let n = resources.len();
        let by_id: HashMap<&str, usize> = resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.as_str(), i))
            .collect();
        let sources_by_id: HashMap<&str, &SourceNode> =
            sources.iter().map(|s| (s.id.as_str(), s)).collect();
        let properties: Vec<String> = resources.iter().map(ResourceNode::properties_json).collect();
        let standalone_subnets = has_standalone_subnets(resources);
        let index = ExpressionIndex::new(resources);

        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for (i, resource) in resources.iter().enumerate() {
            if let Some(source) = sources_by_id.get(resource.id.as_str()) {
                for dep in &source.dependencies {
                    match by_id.get(dep.as_str()) {
                        Some(&j) if j != i => {
                            edges[i].insert(j);
                        }
                        Some(_) => {}
                        None => debug!(
                            resource = %resource.id,
                            dependency = %dep,
                            "explicit dependency has no resource in this unit"
                        ),
                    }
                }
            }

            for entry in &resource.depends_on {
                let target = if !standalone_subnets && names_subnet_type(entry) {
                    owning_network(entry, resources)
                } else {
                    index.resolve(entry)
                };
                if let Some(j) = target.filter(|&j| j != i) {
                    edges[i].insert(j);
                }
            }

            for (j, other) in resources.iter().enumerate() {
                if i == j {
                    continue;
                }
                if let Some(reason) =
                    detect_dependency(resource, &properties[i], other, standalone_subnets)
                {
                    if edges[i].insert(j) {
                        debug!(
                            resource = %resource.id,
                            dependency = %other.id,
                            reason,
                            "dependency detected"
                        );
                    }
                }
            }
        }

        let mut nodes: Vec<DependencyGraphNode> = resources
            .iter()
            .map(|r| DependencyGraphNode {
                id: r.id.clone(),
                dependencies: BTreeSet::new(),
                dependents: BTreeSet::new(),
            })
            .collect();
        for (i, deps) in edges.iter().enumerate() {
            for &j in deps {
                let dep_id = resources[j].id.clone();
                let dependent_id = resources[i].id.clone();
                nodes[i].dependencies.insert(dep_id);
                nodes[j].dependents.insert(dependent_id);
            }
        }

        DependencyGraph { nodes, edges }
    }

    /// Order resources so every resource follows everything it depends on.
    ///
    /// Ties keep input order. Entries that match no resource in the list are
    /// ignored here.
    pub fn topological_sort(
        &self,
        resources: Vec<ResourceNode>,
    ) -> Result<Vec<ResourceNode>, SynthError> {
        let n = resources.len();
        let adjacency = depends_on_adjacency(&resources);

        let mut remaining: Vec<usize> = adjacency.iter().map(BTreeSet::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, deps) in adjacency.iter().enumerate() {
            for &j in deps {
                dependents[j].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        let mut order: Vec<usize> = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &d in &dependents[i] {
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if order.len() < n {
            let path = match find_cycle(&adjacency) {
                Some(cycle) => cycle.into_iter().map(|i| resources[i].id.clone()).collect(),
                None => (0..n)
                    .filter(|i| !order.contains(i))
                    .map(|i| resources[i].id.clone())
                    .collect(),
            };
            return Err(SynthError::CircularDependency { path });
        }

        let mut slots: Vec<Option<ResourceNode>> = resources.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect())
    }
}

/// Resource ids each resource depends on, read back from `dependsOn`.
pub fn dependency_ids(resources: &[ResourceNode]) -> Vec<Vec<String>> {
    depends_on_adjacency(resources)
        .into_iter()
        .map(|deps| deps.into_iter().map(|j| resources[j].id.clone()).collect())
        .collect()
}

/// Merge existing and detected `dependsOn` entries, de-duplicated, into `node`.
///
/// An empty merge leaves `depends_on` empty, which omits the field when serialized.
pub fn add_depends_on(node: &mut ResourceNode, existing: Vec<String>, detected: Vec<String>) {
    let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
    let mut merged: Vec<String> = Vec::new();
    for entry in existing.into_iter().chain(detected) {
        let key = match parse_ordering_expression(&entry) {
            Some((resource_type, name)) => resource_key(&resource_type, &name),
            None => (String::new(), entry.clone()),
        };
        if seen.insert(key) {
            merged.push(entry);
        }
    }
    node.depends_on = merged;
}

fn depends_on_adjacency(resources: &[ResourceNode]) -> Vec<BTreeSet<usize>> {
    let index = ExpressionIndex::new(resources);
    resources
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.depends_on
                .iter()
                .filter_map(|entry| index.resolve(entry))
                .filter(|&j| j != i)
                .collect()
        })
        .collect()
}

/// Why `resource` depends on `other`, if it does by a heuristic or structural rule.
fn detect_dependency(
    resource: &ResourceNode,
    properties: &str,
    other: &ResourceNode,
    standalone_subnets: bool,
) -> Option<&'static str> {
    if !other.name.is_empty() && properties.contains(&other.name) {
        return Some("name-reference");
    }

    if let (Some(parent_type), Some(parent_name)) = (resource.parent_type(), resource.parent_name()) {
        if other.resource_type.eq_ignore_ascii_case(parent_type)
            && other.name.eq_ignore_ascii_case(parent_name)
        {
            return Some("parent");
        }
    }

    if is_kind(resource, SUBNET_KINDS)
        && is_kind(other, SECURITY_GROUP_KINDS)
        && references_security_group(resource, other)
    {
        return Some("security-group");
    }

    if !standalone_subnets
        && is_kind(other, NETWORK_KINDS)
        && references_inline_subnet(properties, &other.name)
    {
        return Some("subnet-owner");
    }

    for (dependent, dependency, condition) in WELL_KNOWN_EDGES {
        if condition == EdgeCondition::StandaloneSubnets && !standalone_subnets {
            continue;
        }
        if is_kind(resource, dependent) && is_kind(other, dependency) {
            return Some("well-known");
        }
    }

    None
}

fn references_security_group(subnet: &ResourceNode, group: &ResourceNode) -> bool {
    let reference = subnet
        .properties
        .as_ref()
        .and_then(|p| p.get("networkSecurityGroup"))
        .and_then(|g| g.get("id"))
        .and_then(|id| id.as_str());
    match reference {
        Some(id) => !group.name.is_empty() && id.contains(&group.name),
        None => false,
    }
}

fn references_inline_subnet(properties: &str, network_name: &str) -> bool {
    if network_name.is_empty() || !properties.contains("subnets") {
        return false;
    }
    properties.contains(&format!("{}/subnets", network_name))
        || properties.contains(&format!("'{}'", network_name))
}

/// For an expression naming `<network>/<subnet>`, the position of the network.
fn owning_network(entry: &str, resources: &[ResourceNode]) -> Option<usize> {
    let (_, name) = parse_ordering_expression(entry)?;
    let (network, _) = name.split_once('/')?;
    resources
        .iter()
        .position(|r| is_kind(r, NETWORK_KINDS) && r.name.eq_ignore_ascii_case(network))
}

// ── Cycle detection ───────────────────────────────────────────────────────────

/// Depth-first search with a recursion stack; returns the first cycle as
/// positions with its start repeated at the end.
pub(crate) fn find_cycle(adjacency: &[BTreeSet<usize>]) -> Option<Vec<usize>> {
    let n = adjacency.len();
    let mut visited = vec![false; n];
    let mut in_path = vec![false; n];
    let mut path: Vec<usize> = Vec::new();
    for start in 0..n {
        if !visited[start] {
            if let Some(cycle) = dfs(start, adjacency, &mut visited, &mut in_path, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn dfs(
    node: usize,
    adjacency: &[BTreeSet<usize>],
    visited: &mut [bool],
    in_path: &mut [bool],
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    path.push(node);
    in_path[node] = true;

    for &next in &adjacency[node] {
        if in_path[next] {
            let cycle_start = path.iter().position(|&p| p == next).unwrap_or(0);
            let mut cycle = path[cycle_start..].to_vec();
            cycle.push(next);
            return Some(cycle);
        }
        if !visited[next] {
            if let Some(cycle) = dfs(next, adjacency, visited, in_path, path) {
                return Some(cycle);
            }
        }
    }

    in_path[node] = false;
    visited[node] = true;
    path.pop();
    None
}

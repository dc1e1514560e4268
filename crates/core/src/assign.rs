//! Template Assigner: partition resources across linked documents so that
//! every document stays under the size ceiling.
//!
//! Priorities, highest first: co-location sets are never split, resources
//! stay with their tier (or other grouping key), and dependency neighbours
//! share a document whenever one fits. Sets are placed in dependency order,
//! a set's dependents right after it when they are ready, and only into
//! documents created at or after the documents of their dependencies, so
//! edges between documents always point backwards and the document graph is
//! acyclic.

use crate::deps::find_cycle;
use crate::error::SynthError;
use crate::model::{ResourceNode, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Engine ceiling is 4 MiB; stay safely below it.
pub const DEFAULT_MAX_TEMPLATE_SIZE: usize = 3_670_016;
/// Estimated bytes of an empty document skeleton.
pub const TEMPLATE_OVERHEAD: usize = 512;
/// Estimated bytes of one output or parameter declaration.
pub const OUTPUT_COST: usize = 256;
/// Estimated bytes of one deployment resource in the root document.
pub const DEPLOYMENT_RESOURCE_COST: usize = 512;
/// Name of the root (or only) document of a unit.
pub const ROOT_TEMPLATE: &str = "main";

/// Hint key prefix: `reference:<target id>` -> field path read from the target.
pub const REFERENCE_HINT_PREFIX: &str = "reference:";
/// Hint key: field path a resource exposes when referenced from another document.
pub const OUTPUT_HINT: &str = "output";
const DEFAULT_FIELD: &str = "id";

/// Planning record for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub id: String,
    pub resource_type: String,
    pub name: String,
    pub dependencies: Vec<String>,
    pub estimated_size: usize,
    pub requires_same_template: Vec<String>,
    pub tier: Option<Tier>,
    pub hints: BTreeMap<String, String>,
}

impl ResourceMetadata {
    pub fn new(id: &str, resource_type: &str, name: &str, estimated_size: usize) -> Self {
        ResourceMetadata {
            id: id.to_owned(),
            resource_type: resource_type.to_owned(),
            name: name.to_owned(),
            dependencies: Vec::new(),
            estimated_size,
            requires_same_template: Vec::new(),
            tier: None,
            hints: BTreeMap::new(),
        }
    }

    /// Metadata for a resolved node, sized by its compact serialized form.
    pub fn from_node(node: &ResourceNode, dependencies: Vec<String>) -> Self {
        let estimated_size = serde_json::to_string(node).map(|s| s.len()).unwrap_or(0);
        ResourceMetadata {
            dependencies,
            ..ResourceMetadata::new(&node.id, &node.resource_type, &node.name, estimated_size)
        }
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| (*d).to_owned()).collect();
        self
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn requiring_same_template(mut self, ids: &[&str]) -> Self {
        self.requires_same_template = ids.iter().map(|d| (*d).to_owned()).collect();
        self
    }

    pub fn with_hint(mut self, key: &str, value: &str) -> Self {
        self.hints.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Declared tier, or the one inferred from the type.
    pub fn effective_tier(&self) -> Option<Tier> {
        self.tier.or_else(|| Tier::infer(&self.resource_type))
    }

    /// `(target id, field path)` for every `reference:` hint.
    fn references(&self) -> impl Iterator<Item = (&str, &str)> {
        self.hints.iter().filter_map(|(key, field)| {
            key.strip_prefix(REFERENCE_HINT_PREFIX)
                .map(|target| (target, field.as_str()))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingStrategy {
    /// Pure bin-packing in dependency order.
    BySize,
    /// Keep each tier in its own documents.
    #[default]
    ByTier,
    /// Keep connected dependency components contiguous.
    ByDependency,
    /// Group by the key returned from [`AssignmentOptions::custom_grouping`].
    Custom,
}

pub type GroupingFn = Arc<dyn Fn(&ResourceMetadata) -> String + Send + Sync>;

#[derive(Clone)]
pub struct AssignmentOptions {
    pub max_template_size: usize,
    pub strategy: GroupingStrategy,
    /// Split even when everything would fit in one document.
    pub prefer_linked: bool,
    pub custom_grouping: Option<GroupingFn>,
}

impl Default for AssignmentOptions {
    fn default() -> Self {
        AssignmentOptions {
            max_template_size: DEFAULT_MAX_TEMPLATE_SIZE,
            strategy: GroupingStrategy::default(),
            prefer_linked: false,
            custom_grouping: None,
        }
    }
}

impl fmt::Debug for AssignmentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssignmentOptions")
            .field("max_template_size", &self.max_template_size)
            .field("strategy", &self.strategy)
            .field("prefer_linked", &self.prefer_linked)
            .field("custom_grouping", &self.custom_grouping.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Deployment order only.
    Ordering,
    /// The source reads a field of the target (`reference:` hint on the source).
    ValueReference,
    /// The target declares the field it exposes (`output` hint on the target).
    ExposedOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTemplateDependency {
    pub source_template: String,
    pub target_template: String,
    pub source_resource: String,
    pub target_resource: String,
    pub kind: DependencyKind,
    pub output_name: String,
    pub field_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOutput {
    pub name: String,
    pub resource: String,
    pub field_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    pub name: String,
    pub estimated_size: usize,
    pub resource_count: usize,
    pub tier: Option<Tier>,
    pub is_root: bool,
    /// Assigned resource ids, in input order. Empty for a split root.
    pub resources: Vec<String>,
    pub outputs: Vec<TemplateOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateAssignment {
    /// Resource id -> document name.
    pub assignments: BTreeMap<String, String>,
    /// Root first, then linked documents in deployment order.
    pub templates: Vec<TemplateInfo>,
    pub cross_template_dependencies: Vec<CrossTemplateDependency>,
}

impl TemplateAssignment {
    pub fn is_split(&self) -> bool {
        self.templates.len() > 1
    }

    pub fn template(&self, name: &str) -> Option<&TemplateInfo> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn template_of(&self, resource: &str) -> Option<&str> {
        self.assignments.get(resource).map(String::as_str)
    }

    pub fn linked_templates(&self) -> impl Iterator<Item = &TemplateInfo> {
        self.templates.iter().filter(|t| !t.is_root)
    }
}

#[derive(Debug, Clone)]
struct Draft {
    name: String,
    label: String,
    tier: Option<Tier>,
    members: Vec<usize>,
    reserved: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateAssigner {
    options: AssignmentOptions,
}

impl TemplateAssigner {
    pub fn new(options: AssignmentOptions) -> Self {
        TemplateAssigner { options }
    }

    pub fn options(&self) -> &AssignmentOptions {
        &self.options
    }

    pub fn assign(&self, resources: &[ResourceMetadata]) -> Result<TemplateAssignment, SynthError> {
        let max = self.options.max_template_size;
        let total = TEMPLATE_OVERHEAD
            + resources
                .iter()
                .map(|r| r.estimated_size)
                .sum::<usize>();
        if total <= max && !self.options.prefer_linked {
            return Ok(single_template(resources, total));
        }

        let index: HashMap<&str, usize> = resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.as_str(), i))
            .collect();
        let targets = dependency_targets(resources, &index);
        let reservation = reservations(resources, &targets, &index);

        let groups = co_location_groups(resources, &index, &targets);
        for group in &groups {
            let needed = TEMPLATE_OVERHEAD + group.iter().map(|&i| reservation[i]).sum::<usize>();
            if needed > max {
                return Err(SynthError::Sizing {
                    resources: group.iter().map(|&i| resources[i].id.clone()).collect(),
                    estimated_size: needed,
                    max_size: max,
                });
            }
        }

        let labels = self.group_labels(resources, &groups, &targets);
        let order = placement_order(&groups, &labels, &targets, resources.len());

        let mut drafts: Vec<Draft> = Vec::new();
        let mut template_of: Vec<Option<usize>> = vec![None; resources.len()];
        let mut label_counts: HashMap<String, usize> = HashMap::new();

        for g in order {
            let group = &groups[g];
            let (label, rank_tier) = (&labels[g].0, labels[g].2);
            let needed: usize = group.iter().map(|&i| reservation[i]).sum();
            let min_template = group
                .iter()
                .flat_map(|&i| targets[i].iter())
                .filter_map(|&j| template_of[j])
                .max()
                .unwrap_or(0);

            let fit = (min_template..drafts.len()).find(|&d| {
                drafts[d].label == *label && TEMPLATE_OVERHEAD + drafts[d].reserved + needed <= max
            });

            let d = match fit {
                Some(d) => d,
                None => {
                    let count = label_counts.entry(label.clone()).or_insert(0);
                    *count += 1;
                    drafts.push(Draft {
                        name: format!("{}-{}", label, count),
                        label: label.clone(),
                        tier: rank_tier,
                        members: Vec::new(),
                        reserved: 0,
                    });
                    drafts.len() - 1
                }
            };
            debug!(
                template = %drafts[d].name,
                resources = group.len(),
                "co-location set placed"
            );
            drafts[d].reserved += needed;
            drafts[d].members.extend(group.iter().copied());
            for &i in group {
                template_of[i] = Some(d);
            }
        }

        let assignment = finish_split(resources, &targets, drafts, &template_of);
        info!(
            templates = assignment.templates.len(),
            cross_template_dependencies = assignment.cross_template_dependencies.len(),
            "resources assigned to linked templates"
        );
        Ok(assignment)
    }

    /// `(label, priority rank, tier)` for every co-location set.
    fn group_labels(
        &self,
        resources: &[ResourceMetadata],
        groups: &[Vec<usize>],
        targets: &[BTreeSet<usize>],
    ) -> Vec<(String, usize, Option<Tier>)> {
        let group_tier = |group: &Vec<usize>| {
            group
                .iter()
                .find_map(|&i| resources[i].effective_tier())
        };

        let strategy = match (self.options.strategy, &self.options.custom_grouping) {
            (GroupingStrategy::Custom, None) => {
                warn!("custom grouping requested without a grouping function; packing by size");
                GroupingStrategy::BySize
            }
            (strategy, _) => strategy,
        };

        match strategy {
            GroupingStrategy::BySize => groups
                .iter()
                .map(|g| ("linked".to_owned(), 0, group_tier(g)))
                .collect(),
            GroupingStrategy::ByTier => groups
                .iter()
                .map(|g| match group_tier(g) {
                    Some(tier) => (tier.as_str().to_owned(), tier as usize, Some(tier)),
                    None => ("general".to_owned(), 4, None),
                })
                .collect(),
            GroupingStrategy::ByDependency => {
                let components = components(resources.len(), targets);
                let mut ranks: HashMap<usize, usize> = HashMap::new();
                groups
                    .iter()
                    .map(|g| {
                        let component = components[g[0]];
                        let next = ranks.len();
                        let rank = *ranks.entry(component).or_insert(next);
                        ("linked".to_owned(), rank, group_tier(g))
                    })
                    .collect()
            }
            GroupingStrategy::Custom => {
                let mut ranks: HashMap<String, usize> = HashMap::new();
                groups
                    .iter()
                    .map(|g| {
                        let key = match &self.options.custom_grouping {
                            Some(f) => sanitize_label(&f(&resources[g[0]])),
                            None => "linked".to_owned(),
                        };
                        let next = ranks.len();
                        let rank = *ranks.entry(key.clone()).or_insert(next);
                        (key, rank, group_tier(g))
                    })
                    .collect()
            }
        }
    }
}

fn single_template(resources: &[ResourceMetadata], total: usize) -> TemplateAssignment {
    let ids: Vec<String> = resources.iter().map(|r| r.id.clone()).collect();
    TemplateAssignment {
        assignments: ids
            .iter()
            .map(|id| (id.clone(), ROOT_TEMPLATE.to_owned()))
            .collect(),
        templates: vec![TemplateInfo {
            name: ROOT_TEMPLATE.to_owned(),
            estimated_size: total,
            resource_count: ids.len(),
            tier: None,
            is_root: true,
            resources: ids,
            outputs: Vec::new(),
        }],
        cross_template_dependencies: Vec::new(),
    }
}

/// Positions each resource depends on: declared dependencies plus `reference:` targets.
fn dependency_targets(
    resources: &[ResourceMetadata],
    index: &HashMap<&str, usize>,
) -> Vec<BTreeSet<usize>> {
    resources
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.dependencies
                .iter()
                .map(String::as_str)
                .chain(r.references().map(|(target, _)| target))
                .filter_map(|id| index.get(id).copied())
                .filter(|&j| j != i)
                .collect()
        })
        .collect()
}

/// Bytes each resource may occupy once outputs and parameters are added.
fn reservations(
    resources: &[ResourceMetadata],
    targets: &[BTreeSet<usize>],
    index: &HashMap<&str, usize>,
) -> Vec<usize> {
    let mut exposed: Vec<BTreeSet<String>> = resources
        .iter()
        .map(|r| {
            let field = r.hints.get(OUTPUT_HINT).map(String::as_str).unwrap_or(DEFAULT_FIELD);
            BTreeSet::from([field.to_owned()])
        })
        .collect();
    for r in resources {
        for (target, field) in r.references() {
            if let Some(&j) = index.get(target) {
                exposed[j].insert(field.to_owned());
            }
        }
    }
    resources
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let parameters = r.references().count().min(targets[i].len());
            r.estimated_size + OUTPUT_COST * (exposed[i].len() + parameters)
        })
        .collect()
}

/// Close `requires_same_template` symmetrically, then merge any sets that
/// would otherwise depend on each other in a cycle.
fn co_location_groups(
    resources: &[ResourceMetadata],
    index: &HashMap<&str, usize>,
    targets: &[BTreeSet<usize>],
) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..resources.len()).collect();
    for (i, r) in resources.iter().enumerate() {
        for other in &r.requires_same_template {
            match index.get(other.as_str()) {
                Some(&j) => union(&mut parent, i, j),
                None => debug!(
                    resource = %r.id,
                    co_located_with = %other,
                    "co-location target not in this unit"
                ),
            }
        }
    }

    loop {
        let groups = collect_groups(&mut parent);
        let mut group_of = vec![0usize; resources.len()];
        for (g, members) in groups.iter().enumerate() {
            for &i in members {
                group_of[i] = g;
            }
        }
        let adjacency: Vec<BTreeSet<usize>> = groups
            .iter()
            .enumerate()
            .map(|(g, members)| {
                members
                    .iter()
                    .flat_map(|&i| targets[i].iter().map(|&j| group_of[j]))
                    .filter(|&h| h != g)
                    .collect()
            })
            .collect();
        match find_cycle(&adjacency) {
            None => return groups,
            Some(cycle) => {
                debug!(sets = cycle.len() - 1, "merging co-location sets that form a cycle");
                for pair in cycle.windows(2) {
                    union(&mut parent, groups[pair[0]][0], groups[pair[1]][0]);
                }
            }
        }
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[merge] = keep;
    }
}

/// Sets in order of their first member; members in input order.
fn collect_groups(parent: &mut [usize]) -> Vec<Vec<usize>> {
    let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..parent.len() {
        let root = find(parent, i);
        by_root.entry(root).or_default().push(i);
    }
    let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
    groups.sort_by_key(|g| g[0]);
    groups
}

/// Weakly connected component id of every resource.
fn components(n: usize, targets: &[BTreeSet<usize>]) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..n).collect();
    for (i, deps) in targets.iter().enumerate() {
        for &j in deps {
            union(&mut parent, i, j);
        }
    }
    (0..n).map(|i| find(&mut parent, i)).collect()
}

/// Dependency order over sets. Among ready sets of the lowest rank, a
/// dependent of the set just placed goes first; otherwise the lowest
/// `(rank, first member)` wins.
fn placement_order(
    groups: &[Vec<usize>],
    labels: &[(String, usize, Option<Tier>)],
    targets: &[BTreeSet<usize>],
    n: usize,
) -> Vec<usize> {
    let mut group_of = vec![0usize; n];
    for (g, members) in groups.iter().enumerate() {
        for &i in members {
            group_of[i] = g;
        }
    }
    let deps: Vec<BTreeSet<usize>> = groups
        .iter()
        .enumerate()
        .map(|(g, members)| {
            members
                .iter()
                .flat_map(|&i| targets[i].iter().map(|&j| group_of[j]))
                .filter(|&h| h != g)
                .collect()
        })
        .collect();
    let mut remaining: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); groups.len()];
    for (g, ds) in deps.iter().enumerate() {
        for &h in ds {
            dependents[h].push(g);
        }
    }

    let key = |g: usize| (labels[g].1, groups[g][0], g);
    let mut ready: BTreeSet<(usize, usize, usize)> = (0..groups.len())
        .filter(|&g| remaining[g] == 0)
        .map(key)
        .collect();
    let mut order = Vec::with_capacity(groups.len());
    let mut last: Option<usize> = None;
    while let Some(&first) = ready.first() {
        let next = last
            .and_then(|p| {
                ready
                    .iter()
                    .take_while(|k| k.0 == first.0)
                    .find(|k| deps[k.2].contains(&p))
                    .copied()
            })
            .unwrap_or(first);
        ready.remove(&next);
        let g = next.2;
        last = Some(g);
        order.push(g);
        for &d in &dependents[g] {
            remaining[d] -= 1;
            if remaining[d] == 0 {
                ready.insert(key(d));
            }
        }
    }
    order
}

fn finish_split(
    resources: &[ResourceMetadata],
    targets: &[BTreeSet<usize>],
    drafts: Vec<Draft>,
    template_of: &[Option<usize>],
) -> TemplateAssignment {
    let mut outputs: Vec<Vec<TemplateOutput>> = vec![Vec::new(); drafts.len()];
    let mut parameters: Vec<BTreeSet<String>> = vec![BTreeSet::new(); drafts.len()];
    let mut cross = Vec::new();
    // One name per exposed (resource, field), unique across the split.
    let mut exposed: BTreeMap<(usize, String), String> = BTreeMap::new();
    let mut taken: BTreeSet<String> = BTreeSet::new();

    for (i, r) in resources.iter().enumerate() {
        let Some(source) = template_of[i] else { continue };
        for &j in &targets[i] {
            let Some(target) = template_of[j] else { continue };
            if source == target {
                continue;
            }
            let dep = &resources[j];
            let reference = r.hints.get(&format!("{}{}", REFERENCE_HINT_PREFIX, dep.id));
            let (kind, field_path) = match (reference, dep.hints.get(OUTPUT_HINT)) {
                (Some(field), _) => (DependencyKind::ValueReference, field.clone()),
                (None, Some(field)) => (DependencyKind::ExposedOutput, field.clone()),
                (None, None) => (DependencyKind::Ordering, DEFAULT_FIELD.to_owned()),
            };
            let output_name = match exposed.get(&(j, field_path.clone())) {
                Some(name) => name.clone(),
                None => {
                    let name = unique_name(output_name(&dep.id, &field_path), &mut taken);
                    exposed.insert((j, field_path.clone()), name.clone());
                    outputs[target].push(TemplateOutput {
                        name: name.clone(),
                        resource: dep.id.clone(),
                        field_path: field_path.clone(),
                    });
                    name
                }
            };
            if kind == DependencyKind::ValueReference {
                parameters[source].insert(output_name.clone());
            }
            cross.push(CrossTemplateDependency {
                source_template: drafts[source].name.clone(),
                target_template: drafts[target].name.clone(),
                source_resource: r.id.clone(),
                target_resource: dep.id.clone(),
                kind,
                output_name,
                field_path,
            });
        }
    }

    let mut assignments = BTreeMap::new();
    let mut templates = vec![TemplateInfo {
        name: ROOT_TEMPLATE.to_owned(),
        estimated_size: TEMPLATE_OVERHEAD + DEPLOYMENT_RESOURCE_COST * drafts.len(),
        resource_count: drafts.len(),
        tier: None,
        is_root: true,
        resources: Vec::new(),
        outputs: Vec::new(),
    }];
    for (d, mut draft) in drafts.into_iter().enumerate() {
        draft.members.sort_unstable();
        let size: usize = draft
            .members
            .iter()
            .map(|&i| resources[i].estimated_size)
            .sum();
        let ids: Vec<String> = draft
            .members
            .iter()
            .map(|&i| resources[i].id.clone())
            .collect();
        for id in &ids {
            assignments.insert(id.clone(), draft.name.clone());
        }
        templates.push(TemplateInfo {
            name: draft.name,
            estimated_size: TEMPLATE_OVERHEAD
                + size
                + OUTPUT_COST * (outputs[d].len() + parameters[d].len()),
            resource_count: ids.len(),
            tier: draft.tier,
            is_root: false,
            resources: ids,
            outputs: std::mem::take(&mut outputs[d]),
        });
    }

    TemplateAssignment {
        assignments,
        templates,
        cross_template_dependencies: cross,
    }
}

/// camelCase output name from a resource id and a field path.
pub fn output_name(resource_id: &str, field_path: &str) -> String {
    let mut name = String::new();
    for word in resource_id
        .split(|c: char| !c.is_ascii_alphanumeric())
        .chain(field_path.split(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|w| !w.is_empty())
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if name.is_empty() {
                name.push(first.to_ascii_lowercase());
            } else {
                name.push(first.to_ascii_uppercase());
            }
            name.push_str(chars.as_str());
        }
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        name.insert(0, 'r');
    }
    name
}

/// `base`, or `base2`, `base3`... when an earlier output already took it.
fn unique_name(base: String, taken: &mut BTreeSet<String>) -> String {
    let mut name = base.clone();
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{}{}", base, n);
        n += 1;
    }
    taken.insert(name.clone());
    name
}

fn sanitize_label(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "linked".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, size: usize) -> ResourceMetadata {
        ResourceMetadata::new(id, "Contoso.Widgets/gizmos", id, size)
    }

    fn options(max: usize) -> AssignmentOptions {
        AssignmentOptions {
            max_template_size: max,
            strategy: GroupingStrategy::BySize,
            ..AssignmentOptions::default()
        }
    }

    #[test]
    fn small_sets_stay_in_one_document() {
        let resources = vec![meta("a", 100), meta("b", 100)];
        let assignment = TemplateAssigner::new(options(10_000))
            .assign(&resources)
            .unwrap();
        assert!(!assignment.is_split());
        assert_eq!(assignment.template_of("a"), Some(ROOT_TEMPLATE));
        assert_eq!(assignment.templates[0].resource_count, 2);
        assert!(assignment.cross_template_dependencies.is_empty());
    }

    #[test]
    fn oversized_sets_split_under_the_ceiling() {
        let resources = vec![
            meta("a", 1_500),
            meta("b", 1_500).with_dependencies(&["a"]),
            meta("c", 1_500).with_dependencies(&["b"]),
        ];
        let max = 2_600;
        let assignment = TemplateAssigner::new(options(max)).assign(&resources).unwrap();

        let linked: Vec<&TemplateInfo> = assignment.linked_templates().collect();
        assert!(linked.len() >= 2);
        for t in &linked {
            assert!(t.estimated_size <= max, "{} is {} bytes", t.name, t.estimated_size);
        }
        let root = &assignment.templates[0];
        assert!(root.is_root);
        assert!(root.resources.is_empty());

        for r in &resources {
            assert!(assignment.template_of(&r.id).is_some());
        }
        for r in &resources {
            for dep in &r.dependencies {
                let source = assignment.template_of(&r.id).unwrap();
                let target = assignment.template_of(dep).unwrap();
                if source != target {
                    let edge = assignment
                        .cross_template_dependencies
                        .iter()
                        .find(|c| c.source_resource == r.id && c.target_resource == *dep)
                        .expect("cross-template dependency recorded");
                    let exposing = assignment.template(target).unwrap();
                    assert!(exposing.outputs.iter().any(|o| o.name == edge.output_name));
                }
            }
        }
    }

    #[test]
    fn co_located_resources_share_a_document() {
        let resources = vec![
            meta("a", 1_000).requiring_same_template(&["c"]),
            meta("b", 1_000),
            meta("c", 1_000),
        ];
        let assignment = TemplateAssigner::new(AssignmentOptions {
            prefer_linked: true,
            ..options(3_000)
        })
        .assign(&resources)
        .unwrap();
        assert_eq!(assignment.template_of("a"), assignment.template_of("c"));
    }

    #[test]
    fn oversized_co_location_set_is_a_sizing_error() {
        let resources = vec![
            meta("a", 2_000).requiring_same_template(&["b"]),
            meta("b", 2_000),
        ];
        let err = TemplateAssigner::new(options(3_000))
            .assign(&resources)
            .unwrap_err();
        match err {
            SynthError::Sizing {
                resources,
                max_size,
                ..
            } => {
                assert_eq!(resources, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(max_size, 3_000);
            }
            other => panic!("expected sizing error, got {:?}", other),
        }
    }

    #[test]
    fn tiers_get_their_own_documents_in_order() {
        let resources = vec![
            meta("app", 100).with_tier(Tier::Application),
            meta("net", 100).with_tier(Tier::Foundation),
            meta("vm", 100).with_tier(Tier::Compute),
        ];
        let assignment = TemplateAssigner::new(AssignmentOptions {
            strategy: GroupingStrategy::ByTier,
            prefer_linked: true,
            ..AssignmentOptions::default()
        })
        .assign(&resources)
        .unwrap();
        let names: Vec<&str> = assignment
            .linked_templates()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["foundation-1", "compute-1", "application-1"]);
        assert_eq!(assignment.template_of("vm"), Some("compute-1"));
    }

    #[test]
    fn dependencies_never_point_at_later_documents() {
        // A foundation resource that depends on an application resource must
        // not be placed before it.
        let resources = vec![
            meta("site", 100).with_tier(Tier::Application),
            meta("net", 100)
                .with_tier(Tier::Foundation)
                .with_dependencies(&["site"]),
        ];
        let assignment = TemplateAssigner::new(AssignmentOptions {
            strategy: GroupingStrategy::ByTier,
            prefer_linked: true,
            ..AssignmentOptions::default()
        })
        .assign(&resources)
        .unwrap();
        let position = |name: &str| {
            assignment
                .templates
                .iter()
                .position(|t| t.name == name)
                .unwrap()
        };
        for edge in &assignment.cross_template_dependencies {
            assert!(position(&edge.target_template) < position(&edge.source_template));
        }
    }

    #[test]
    fn co_location_cycle_is_merged() {
        let resources = vec![
            meta("a", 100).with_dependencies(&["b"]).requiring_same_template(&["c"]),
            meta("b", 100).with_dependencies(&["c"]),
            meta("c", 100),
        ];
        let assignment = TemplateAssigner::new(AssignmentOptions {
            prefer_linked: true,
            ..options(100_000)
        })
        .assign(&resources)
        .unwrap();
        let a = assignment.template_of("a");
        assert_eq!(a, assignment.template_of("b"));
        assert_eq!(a, assignment.template_of("c"));
    }

    #[test]
    fn neighbours_prefer_the_same_document() {
        let resources = vec![
            meta("a", 400),
            meta("b", 400),
            meta("a2", 400).with_dependencies(&["a"]),
        ];
        // Room for two resources per document.
        let assignment = TemplateAssigner::new(AssignmentOptions {
            prefer_linked: true,
            ..options(2_000)
        })
        .assign(&resources)
        .unwrap();
        assert_eq!(assignment.template_of("a"), Some("linked-1"));
        assert_eq!(assignment.template_of("a2"), Some("linked-1"));
        assert_eq!(assignment.template_of("b"), Some("linked-2"));
        assert!(assignment.cross_template_dependencies.is_empty());
    }

    #[test]
    fn value_reference_hint_sets_kind_and_field() {
        let resources = vec![
            meta("store", 1_500),
            meta("site", 1_500).with_hint("reference:store", "properties.primaryEndpoints.blob"),
        ];
        let assignment = TemplateAssigner::new(options(2_500)).assign(&resources).unwrap();
        let edge = &assignment.cross_template_dependencies[0];
        assert_eq!(edge.kind, DependencyKind::ValueReference);
        assert_eq!(edge.field_path, "properties.primaryEndpoints.blob");
        assert_eq!(edge.output_name, "storePropertiesPrimaryEndpointsBlob");
    }

    #[test]
    fn output_hint_marks_exposed_output() {
        let resources = vec![
            meta("vault", 1_500).with_hint("output", "properties.vaultUri"),
            meta("app", 1_500).with_dependencies(&["vault"]),
        ];
        let assignment = TemplateAssigner::new(options(2_500)).assign(&resources).unwrap();
        let edge = &assignment.cross_template_dependencies[0];
        assert_eq!(edge.kind, DependencyKind::ExposedOutput);
        assert_eq!(edge.output_name, "vaultPropertiesVaultUri");
    }

    #[test]
    fn custom_grouping_uses_returned_key() {
        let resources = vec![
            meta("team-a/x", 100),
            meta("team-b/y", 100),
            meta("team-a/z", 100),
        ];
        let grouping: GroupingFn = Arc::new(|m: &ResourceMetadata| {
            m.id.split('/').next().unwrap_or_default().to_string()
        });
        let assignment = TemplateAssigner::new(AssignmentOptions {
            strategy: GroupingStrategy::Custom,
            prefer_linked: true,
            custom_grouping: Some(grouping),
            ..AssignmentOptions::default()
        })
        .assign(&resources)
        .unwrap();
        assert_eq!(assignment.template_of("team-a/x"), Some("team-a-1"));
        assert_eq!(assignment.template_of("team-a/z"), Some("team-a-1"));
        assert_eq!(assignment.template_of("team-b/y"), Some("team-b-1"));
    }

    #[test]
    fn colliding_output_names_get_distinct_suffixes() {
        let resources = vec![
            meta("u/a-b", 100),
            meta("u/a/b", 100),
            meta("u/c", 100).with_dependencies(&["u/a-b", "u/a/b"]),
        ];
        let grouping: GroupingFn = Arc::new(|m: &ResourceMetadata| {
            if m.id == "u/c" { "consumer" } else { "producer" }.to_string()
        });
        let assignment = TemplateAssigner::new(AssignmentOptions {
            strategy: GroupingStrategy::Custom,
            prefer_linked: true,
            custom_grouping: Some(grouping),
            ..AssignmentOptions::default()
        })
        .assign(&resources)
        .unwrap();

        let edges = &assignment.cross_template_dependencies;
        assert_eq!(edges.len(), 2);
        assert_ne!(edges[0].output_name, edges[1].output_name);
        let producer = assignment
            .templates
            .iter()
            .find(|t| t.name == "producer-1")
            .unwrap();
        assert_eq!(producer.outputs.len(), 2);
        for edge in edges {
            let output = producer
                .outputs
                .iter()
                .find(|o| o.name == edge.output_name)
                .unwrap();
            assert_eq!(output.resource, edge.target_resource);
        }
        let mut names: Vec<&str> = producer.outputs.iter().map(|o| o.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["uABId", "uABId2"]);
    }

    #[test]
    fn output_names_are_camel_case() {
        assert_eq!(output_name("core/net-vnet", "id"), "coreNetVnetId");
        assert_eq!(output_name("1st", "id"), "r1stId");
    }
}

//! Synthesis Orchestrator: prepare, transform, validate, assemble.
//!
//! Thin driver over the phase modules. Every unit is transformed and
//! validated before anything is written, so a failing run leaves the
//! output directory untouched.

use crate::assemble::{AssemblyManifest, Assembler, UnitDocuments};
use crate::assign::{
    AssignmentOptions, GroupingFn, GroupingStrategy, ResourceMetadata, TemplateAssigner,
};
use crate::collect::{collect, UnitResources};
use crate::config::SynthConfig;
use crate::deps::{dependency_ids, find_cycle, DependencyResolver, SourceNode};
use crate::error::{SynthError, SynthesisFailure};
use crate::linked::build_linked_documents;
use crate::model::{DeploymentDocument, ResourceNode};
use crate::transform::{into_node, transform};
use crate::tree::{traverse, ConstructTree, TraversedResource};
use crate::validate::{
    ValidationIssue, ValidationPipeline, ValidationResult, ValidatorRegistry,
};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// The completed output of a synthesis run.
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    pub directory: PathBuf,
    pub manifest: AssemblyManifest,
    pub units: Vec<UnitDocuments>,
    /// Non-blocking validation findings, for display.
    pub warnings: Vec<ValidationIssue>,
}

impl CloudAssembly {
    pub fn unit(&self, name: &str) -> Option<&UnitDocuments> {
        self.units.iter().find(|u| u.unit == name)
    }
}

#[derive(Debug)]
pub struct Synthesizer {
    config: SynthConfig,
    registry: ValidatorRegistry,
    assignment: AssignmentOptions,
}

impl Synthesizer {
    pub fn new(config: SynthConfig, registry: ValidatorRegistry) -> Self {
        let assignment = config.assignment_options();
        Synthesizer {
            config,
            registry,
            assignment,
        }
    }

    /// Group resources of split units by a caller-supplied key.
    pub fn with_custom_grouping(mut self, grouping: GroupingFn) -> Self {
        self.assignment.strategy = GroupingStrategy::Custom;
        self.assignment.custom_grouping = Some(grouping);
        self
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    pub fn synthesize(&self, tree: &ConstructTree) -> Result<CloudAssembly, SynthesisFailure> {
        self.run(tree).map_err(|source| {
            warn!(error = %source, "synthesis failed");
            SynthesisFailure::from(source)
        })
    }

    fn run(&self, tree: &ConstructTree) -> Result<CloudAssembly, SynthError> {
        // Phase 1: prepare
        let traversal = traverse(tree)?;
        let units = collect(traversal)?;
        check_unit_order(&units)?;
        info!(
            units = units.len(),
            resources = units.iter().map(|u| u.resources.len()).sum::<usize>(),
            "construct tree prepared"
        );

        // Phases 2-3: transform and validate every unit
        let mut produced = Vec::with_capacity(units.len());
        let mut warnings = Vec::new();
        for unit in &units {
            let documents = self.build_unit(unit)?;
            if !self.config.skip_validation {
                let result = self.validate_unit(&documents)?;
                for issue in &result.warnings {
                    debug!(unit = %documents.unit, "{}", issue);
                }
                warnings.extend(result.warnings);
            }
            produced.push(documents);
        }

        // Phase 4: assemble
        let manifest =
            Assembler::new(&self.config.out_dir, self.config.pretty_print).write(&produced)?;
        info!(
            out_dir = %self.config.out_dir.display(),
            warnings = warnings.len(),
            "synthesis complete"
        );

        Ok(CloudAssembly {
            directory: self.config.out_dir.clone(),
            manifest,
            units: produced,
            warnings,
        })
    }

    fn build_unit(&self, unit: &UnitResources<'_>) -> Result<UnitDocuments, SynthError> {
        let name = &unit.unit.name;

        let mut nodes = Vec::with_capacity(unit.resources.len());
        for resource in &unit.resources {
            nodes.push(transform_resource(resource)?);
        }
        debug!(unit = %name, resources = nodes.len(), "resources transformed");

        let sources: Vec<SourceNode> = unit
            .resources
            .iter()
            .map(|r| SourceNode {
                id: r.path.clone(),
                dependencies: r.explicit_dependencies.clone(),
            })
            .collect();
        let resolver = DependencyResolver::new();
        let sorted = resolver.topological_sort(resolver.resolve(nodes, &sources)?)?;

        let mut documents = UnitDocuments {
            unit: name.clone(),
            scope: unit.unit.scope,
            root: DeploymentDocument::new(unit.unit.scope, Vec::new()),
            linked: Vec::new(),
            dependencies: unit.unit.dependencies.clone(),
        };

        if self.config.enable_linked_templates {
            let metadata = planning_metadata(&sorted, &unit.resources);
            let assignment = TemplateAssigner::new(self.assignment.clone()).assign(&metadata)?;
            if assignment.is_split() {
                let family = build_linked_documents(
                    unit.unit.scope,
                    name,
                    &sorted,
                    &assignment,
                    &self.config.linked_template_base,
                );
                info!(
                    unit = %name,
                    linked = family.linked.len(),
                    cross_template_dependencies = assignment.cross_template_dependencies.len(),
                    "unit split into linked templates"
                );
                documents.root = family.root;
                documents.linked = family.linked;
                return Ok(documents);
            }
        }

        documents.root.resources = sorted;
        Ok(documents)
    }

    fn validate_unit(&self, documents: &UnitDocuments) -> Result<ValidationResult, SynthError> {
        let pipeline = ValidationPipeline::new(&self.registry);
        let options = self.config.validation_options();

        let mut result = pipeline.validate(
            &documents.root.resources,
            &document_value(&documents.root, &documents.template_file())?,
            &documents.unit,
            &options,
        );
        for linked in &documents.linked {
            result.merge(pipeline.validate(
                &linked.document.resources,
                &document_value(&linked.document, &linked.relative_path)?,
                &documents.unit,
                &options,
            ));
        }
        debug!(
            unit = %documents.unit,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "unit validated"
        );

        if !result.valid {
            return Err(SynthError::Validation {
                unit: documents.unit.clone(),
                error_count: result.errors.len(),
                warning_count: result.warnings.len(),
                summary: result.summary(),
            });
        }
        Ok(result)
    }
}

fn transform_resource(resource: &TraversedResource<'_>) -> Result<ResourceNode, SynthError> {
    transform(resource.resource)
        .and_then(|fragment| into_node(&resource.path, fragment))
        .map_err(|source| SynthError::Transformation {
            resource: resource.path.clone(),
            source,
        })
}

fn planning_metadata(
    sorted: &[ResourceNode],
    traversed: &[TraversedResource<'_>],
) -> Vec<ResourceMetadata> {
    let by_path: HashMap<&str, &TraversedResource<'_>> =
        traversed.iter().map(|r| (r.path.as_str(), r)).collect();
    sorted
        .iter()
        .zip(dependency_ids(sorted))
        .map(|(node, dependencies)| {
            let mut metadata = ResourceMetadata::from_node(node, dependencies);
            if let Some(source) = by_path.get(node.id.as_str()) {
                metadata.tier = source.resource.tier();
                metadata.requires_same_template = source.resource.co_located_with();
                metadata.hints = source.resource.assignment_hints();
            }
            metadata
        })
        .collect()
}

fn document_value(document: &DeploymentDocument, name: &str) -> Result<Value, SynthError> {
    document.to_value().map_err(|source| SynthError::Serialize {
        document: name.to_owned(),
        source,
    })
}

/// Inter-unit dependencies must be acyclic for the units to be deployable.
fn check_unit_order(units: &[UnitResources<'_>]) -> Result<(), SynthError> {
    let position: HashMap<&str, usize> = units
        .iter()
        .enumerate()
        .map(|(i, u)| (u.unit.name.as_str(), i))
        .collect();
    let adjacency: Vec<BTreeSet<usize>> = units
        .iter()
        .map(|u| {
            u.unit
                .dependencies
                .iter()
                .filter_map(|d| position.get(d.as_str()).copied())
                .collect()
        })
        .collect();
    match find_cycle(&adjacency) {
        Some(cycle) => Err(SynthError::CircularDependency {
            path: cycle
                .into_iter()
                .map(|i| units[i].unit.name.clone())
                .collect(),
        }),
        None => Ok(()),
    }
}

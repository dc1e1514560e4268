#![allow(clippy::result_large_err)]
//! armature-core: synthesis engine from a construct tree to deployment
//! templates.
//!
//! The pipeline runs in four phases, one module per step:
//!
//! - prepare: [`tree::traverse`], [`collect::collect`]
//! - transform: [`transform`], [`deps`], and [`assign`] + [`linked`] when
//!   linked templates are enabled
//! - validate: [`validate::ValidationPipeline`]
//! - assemble: [`assemble::Assembler`]
//!
//! [`Synthesizer`] drives all of them.

pub mod assemble;
pub mod assign;
pub mod collect;
pub mod config;
pub mod deps;
pub mod error;
pub mod linked;
pub mod model;
pub mod resource;
pub mod synth;
pub mod transform;
pub mod tree;
pub mod validate;

// ── Convenience re-exports: key types ────────────────────────────────

pub use assemble::{AssemblyManifest, ArtifactEntry, UnitDocuments};
pub use assign::{
    AssignmentOptions, CrossTemplateDependency, DependencyKind, GroupingStrategy,
    ResourceMetadata, TemplateAssignment, TemplateInfo,
};
pub use config::SynthConfig;
pub use deps::{DependencyGraph, DependencyGraphNode, SourceNode};
pub use error::{ResourceError, SynthError, SynthesisFailure, TreeError};
pub use model::{DeploymentDocument, DeploymentScope, ResourceNode, Tier};
pub use resource::{Resource, StaticResource};
pub use tree::{ConstructId, ConstructTree, ScopeProvider, StackProps};
pub use validate::{
    DocumentValidator, Severity, ValidationIssue, ValidationLayer, ValidationOptions,
    ValidationResult, ValidatorRegistry,
};

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use assemble::Assembler;
pub use assign::TemplateAssigner;
pub use deps::DependencyResolver;
pub use synth::{CloudAssembly, Synthesizer};
pub use transform::{transform, transform_all};
pub use validate::ValidationPipeline;

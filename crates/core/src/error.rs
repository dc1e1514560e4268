//! Error types for the synthesis pipeline.
//!
//! Each phase reports failures through [`SynthError`]; the orchestrator wraps
//! whichever phase failed in a single [`SynthesisFailure`] so callers see one
//! uniform "Synthesis failed: ..." message.

use std::path::PathBuf;

/// Failure raised by a resource's own `to_document` contract.
///
/// The message is carried through the pipeline unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ResourceError {
    pub message: String,
}

impl ResourceError {
    pub fn new(message: impl Into<String>) -> Self {
        ResourceError {
            message: message.into(),
        }
    }
}

/// Misuse of the construct tree API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("invalid construct id '{0}': ids must be non-empty and must not contain '/'")]
    InvalidId(String),

    #[error("duplicate construct id '{id}' under '{parent}'")]
    DuplicateId { parent: String, id: String },

    #[error("unknown construct #{0}")]
    UnknownConstruct(usize),

    #[error("construct '{0}' is a resource and cannot have children")]
    NotAContainer(String),

    #[error("resource '{0}' is not contained in any stack")]
    OrphanResource(String),

    #[error("stack '{path}' maps to unit '{unit}', which another stack already uses")]
    DuplicateUnit { path: String, unit: String },

    #[error("stack '{0}' cannot use the unit name 'manifest': it is reserved for the assembly manifest")]
    ReservedUnitName(String),
}

/// A phase-level synthesis failure.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(
        "resource '{resource}' requires {required} scope but unit '{unit}' is deployed at {actual} scope"
    )]
    Scope {
        resource: String,
        unit: String,
        required: String,
        actual: String,
    },

    #[error("resource '{resource}' failed to produce its document: {source}")]
    Transformation {
        resource: String,
        #[source]
        source: ResourceError,
    },

    #[error("circular dependency detected: {}", .path.join(" \u{2192} "))]
    CircularDependency { path: Vec<String> },

    #[error(
        "validation failed for unit '{unit}' with {error_count} error(s) and {warning_count} warning(s): {summary}"
    )]
    Validation {
        unit: String,
        error_count: usize,
        warning_count: usize,
        summary: String,
    },

    #[error(
        "co-location group [{}] needs {estimated_size} bytes, exceeding the {max_size}-byte template limit",
        .resources.join(", ")
    )]
    Sizing {
        resources: Vec<String>,
        estimated_size: usize,
        max_size: usize,
    },

    #[error("failed to write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize '{document}': {source}")]
    Serialize {
        document: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// The single error surfaced by [`crate::Synthesizer::synthesize`].
#[derive(Debug, thiserror::Error)]
#[error("Synthesis failed: {source}")]
pub struct SynthesisFailure {
    #[from]
    pub source: SynthError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_wraps_phase_message() {
        let failure = SynthesisFailure::from(SynthError::CircularDependency {
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        });
        assert_eq!(
            failure.to_string(),
            "Synthesis failed: circular dependency detected: a \u{2192} b \u{2192} a"
        );
    }

    #[test]
    fn transformation_error_keeps_resource_message() {
        let err = SynthError::Transformation {
            resource: "stack/storage".to_string(),
            source: ResourceError::new("sku is required"),
        };
        assert!(err.to_string().ends_with("sku is required"));
    }
}

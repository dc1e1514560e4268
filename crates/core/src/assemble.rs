//! Assembler: write every unit's documents and the assembly manifest.
//!
//! Layout under the output directory:
//!
//! ```text
//! manifest.json
//! <unit>.json                  root (or only) document of the unit
//! <unit>/linked/<doc>.json     linked documents, when the unit was split
//! ```

use crate::error::SynthError;
use crate::linked::LinkedDocument;
use crate::model::{DeploymentDocument, DeploymentScope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1.0";
pub const ARTIFACT_TYPE: &str = "deployment-template";

/// All documents produced for one deployment unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDocuments {
    pub unit: String,
    pub scope: DeploymentScope,
    pub root: DeploymentDocument,
    pub linked: Vec<LinkedDocument>,
    /// Units that must be deployed first.
    pub dependencies: BTreeSet<String>,
}

impl UnitDocuments {
    pub fn template_file(&self) -> String {
        format!("{}.json", self.unit)
    }

    pub fn is_split(&self) -> bool {
        !self.linked.is_empty()
    }

    /// Application resources of the unit, across linked documents when split.
    pub fn resource_count(&self) -> usize {
        if self.is_split() {
            self.linked.iter().map(|l| l.document.resources.len()).sum()
        } else {
            self.root.resources.len()
        }
    }

    fn documents(&self) -> impl Iterator<Item = &DeploymentDocument> {
        std::iter::once(&self.root).chain(self.linked.iter().map(|l| &l.document))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub scope: DeploymentScope,
    pub template_file: String,
    pub linked_templates: Vec<String>,
    pub resource_count: usize,
    pub parameter_count: usize,
    pub output_count: usize,
    pub dependencies: Vec<String>,
    pub etag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyManifest {
    pub version: String,
    pub artifacts: BTreeMap<String, ArtifactEntry>,
}

/// SHA-256 of the compact JSON form of `document`.
pub fn compute_etag(document: &Value) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_string(document)?;
    Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
}

#[derive(Debug, Clone)]
pub struct Assembler {
    out_dir: PathBuf,
    pretty: bool,
}

impl Assembler {
    pub fn new(out_dir: impl Into<PathBuf>, pretty: bool) -> Self {
        Assembler {
            out_dir: out_dir.into(),
            pretty,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Describe `units` without touching the filesystem.
    pub fn manifest(&self, units: &[UnitDocuments]) -> Result<AssemblyManifest, SynthError> {
        let mut artifacts = BTreeMap::new();
        for unit in units {
            let root = unit.root.to_value().map_err(|source| SynthError::Serialize {
                document: unit.template_file(),
                source,
            })?;
            let etag = compute_etag(&root).map_err(|source| SynthError::Serialize {
                document: unit.template_file(),
                source,
            })?;
            artifacts.insert(
                unit.unit.clone(),
                ArtifactEntry {
                    artifact_type: ARTIFACT_TYPE.to_owned(),
                    scope: unit.scope,
                    template_file: unit.template_file(),
                    linked_templates: unit.linked.iter().map(|l| l.relative_path.clone()).collect(),
                    resource_count: unit.resource_count(),
                    parameter_count: unit.documents().map(|d| d.parameters.len()).sum(),
                    output_count: unit.documents().map(|d| d.outputs.len()).sum(),
                    dependencies: unit.dependencies.iter().cloned().collect(),
                    etag,
                },
            );
        }
        Ok(AssemblyManifest {
            version: MANIFEST_VERSION.to_owned(),
            artifacts,
        })
    }

    /// Write every document plus `manifest.json`.
    pub fn write(&self, units: &[UnitDocuments]) -> Result<AssemblyManifest, SynthError> {
        let manifest = self.manifest(units)?;
        create_dir(&self.out_dir)?;

        let mut files = 0usize;
        for unit in units {
            self.write_json(&unit.template_file(), &unit.root)?;
            files += 1;
            for linked in &unit.linked {
                self.write_json(&linked.relative_path, &linked.document)?;
                files += 1;
            }
        }
        self.write_json(MANIFEST_FILE, &manifest)?;

        info!(
            out_dir = %self.out_dir.display(),
            units = units.len(),
            documents = files,
            "assembly written"
        );
        Ok(manifest)
    }

    fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> Result<(), SynthError> {
        let path = self.out_dir.join(relative);
        if let Some(parent) = path.parent() {
            create_dir(parent)?;
        }
        let serialized = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|source| SynthError::Serialize {
            document: relative.to_owned(),
            source,
        })?;
        fs::write(&path, serialized + "\n").map_err(|source| SynthError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "document written");
        Ok(())
    }
}

fn create_dir(path: &Path) -> Result<(), SynthError> {
    fs::create_dir_all(path).map_err(|source| SynthError::Io {
        path: path.to_path_buf(),
        source,
    })
}

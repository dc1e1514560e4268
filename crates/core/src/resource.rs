//! The contract every resource construct exposes to the synthesis engine.

use crate::error::ResourceError;
use crate::model::{DeploymentScope, Tier};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A resource construct.
///
/// Only [`Resource::to_document`] is required; the remaining methods are
/// planning hints with neutral defaults.
pub trait Resource: fmt::Debug {
    /// Produce the resource's document fragment.
    fn to_document(&self) -> Result<Value, ResourceError>;

    /// Broadest scope this resource may be deployed from.
    fn target_scope(&self) -> DeploymentScope {
        DeploymentScope::ResourceGroup
    }

    /// Preferred tier when documents are split.
    fn tier(&self) -> Option<Tier> {
        None
    }

    /// Construct paths of resources that must share this resource's document.
    fn co_located_with(&self) -> Vec<String> {
        Vec::new()
    }

    /// Free-form assignment hints (e.g. `reference:<path>` -> field path).
    fn assignment_hints(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// A resource backed by a fixed document fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticResource {
    document: Value,
    scope: DeploymentScope,
    tier: Option<Tier>,
    co_located_with: Vec<String>,
    hints: BTreeMap<String, String>,
}

impl StaticResource {
    pub fn new(document: Value) -> Self {
        StaticResource {
            document,
            scope: DeploymentScope::ResourceGroup,
            tier: None,
            co_located_with: Vec::new(),
            hints: BTreeMap::new(),
        }
    }

    pub fn with_scope(mut self, scope: DeploymentScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn co_located_with_path(mut self, path: &str) -> Self {
        self.co_located_with.push(path.to_owned());
        self
    }

    pub fn with_hint(mut self, key: &str, value: &str) -> Self {
        self.hints.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Resource for StaticResource {
    fn to_document(&self) -> Result<Value, ResourceError> {
        Ok(self.document.clone())
    }

    fn target_scope(&self) -> DeploymentScope {
        self.scope
    }

    fn tier(&self) -> Option<Tier> {
        self.tier
    }

    fn co_located_with(&self) -> Vec<String> {
        self.co_located_with.clone()
    }

    fn assignment_hints(&self) -> BTreeMap<String, String> {
        self.hints.clone()
    }
}

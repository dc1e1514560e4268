//! Document model: deployment scopes, tiers, resource nodes, and the
//! deployment document itself, plus ordering-expression helpers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Fixed `contentVersion` of every produced document.
pub const CONTENT_VERSION: &str = "1.0.0.0";

/// The scope a deployment unit (or a resource) targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentScope {
    ResourceGroup,
    Subscription,
    ManagementGroup,
    Tenant,
}

impl DeploymentScope {
    pub const ALL: [DeploymentScope; 4] = [
        DeploymentScope::ResourceGroup,
        DeploymentScope::Subscription,
        DeploymentScope::ManagementGroup,
        DeploymentScope::Tenant,
    ];

    /// The `$schema` identifier for documents deployed at this scope.
    pub fn schema(self) -> &'static str {
        match self {
            DeploymentScope::ResourceGroup => {
                "https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#"
            }
            DeploymentScope::Subscription => {
                "https://schema.management.azure.com/schemas/2018-05-01/subscriptionDeploymentTemplate.json#"
            }
            DeploymentScope::ManagementGroup => {
                "https://schema.management.azure.com/schemas/2019-08-01/managementGroupDeploymentTemplate.json#"
            }
            DeploymentScope::Tenant => {
                "https://schema.management.azure.com/schemas/2019-08-01/tenantDeploymentTemplate.json#"
            }
        }
    }

    /// Scope whose schema identifier is `schema`, if it is one of the four known ones.
    pub fn from_schema(schema: &str) -> Option<DeploymentScope> {
        DeploymentScope::ALL
            .into_iter()
            .find(|scope| scope.schema() == schema)
    }

    /// Relative breadth: a unit may only hold resources whose scope is no broader than its own.
    pub fn breadth(self) -> u8 {
        match self {
            DeploymentScope::ResourceGroup => 0,
            DeploymentScope::Subscription => 1,
            DeploymentScope::ManagementGroup => 2,
            DeploymentScope::Tenant => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentScope::ResourceGroup => "resource-group",
            DeploymentScope::Subscription => "subscription",
            DeploymentScope::ManagementGroup => "management-group",
            DeploymentScope::Tenant => "tenant",
        }
    }
}

impl fmt::Display for DeploymentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse deployment-order category used as a placement hint when splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    Foundation,
    Compute,
    Application,
    Configuration,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Foundation => "foundation",
            Tier::Compute => "compute",
            Tier::Application => "application",
            Tier::Configuration => "configuration",
        }
    }

    /// Best-effort tier for a resource type when none was declared.
    pub fn infer(resource_type: &str) -> Option<Tier> {
        let lower = resource_type.to_ascii_lowercase();
        let namespace = lower.split('/').next().unwrap_or_default();
        let kind = kind_segment(&lower);

        if matches!(
            kind,
            "roleassignments" | "diagnosticsettings" | "locks" | "config" | "configurationstores"
        ) {
            return Some(Tier::Configuration);
        }
        if namespace.ends_with(".network")
            || namespace.ends_with(".storage")
            || namespace.ends_with(".managedidentity")
            || namespace.ends_with(".keyvault")
            || namespace.ends_with(".resources")
        {
            return Some(Tier::Foundation);
        }
        if namespace.ends_with(".compute") || namespace.ends_with(".containerservice") {
            return Some(Tier::Compute);
        }
        if namespace.ends_with(".web") || namespace.ends_with(".app") {
            return Some(Tier::Application);
        }
        None
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transformed resource as it appears inside a document's `resources` array.
///
/// `id` is the construct path of the originating resource; it never appears in
/// the serialized form. Fields missing from a fragment deserialize to empty
/// values so that later validation can report them instead of the parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceNode {
    pub fn new(resource_type: &str, api_version: &str, name: &str) -> Self {
        ResourceNode {
            id: name.to_owned(),
            resource_type: resource_type.to_owned(),
            api_version: api_version.to_owned(),
            name: name.to_owned(),
            ..ResourceNode::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_owned();
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Engine expression that refers to this resource in a `dependsOn` list.
    pub fn ordering_expression(&self) -> String {
        ordering_expression(&self.resource_type, &self.name)
    }

    /// Last segment of the type, lowercased (e.g. `subnets`).
    pub fn kind_segment(&self) -> String {
        kind_segment(&self.resource_type.to_ascii_lowercase()).to_owned()
    }

    /// Type of the parent resource for a nested type (`Provider/Parent/Child`).
    pub fn parent_type(&self) -> Option<&str> {
        if self.resource_type.split('/').count() < 3 {
            return None;
        }
        self.resource_type.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// Name of the parent resource for a compound `parent/child` name.
    pub fn parent_name(&self) -> Option<&str> {
        self.name.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// Compact JSON of `properties`, or an empty string when there are none.
    pub fn properties_json(&self) -> String {
        self.properties
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default()
    }

    /// Lookup key used to match ordering expressions back to resources.
    pub fn key(&self) -> (String, String) {
        resource_key(&self.resource_type, &self.name)
    }
}

/// A complete deployment document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentDocument {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "contentVersion")]
    pub content_version: String,
    pub parameters: Map<String, Value>,
    pub resources: Vec<ResourceNode>,
    pub outputs: Map<String, Value>,
}

impl DeploymentDocument {
    pub fn new(scope: DeploymentScope, resources: Vec<ResourceNode>) -> Self {
        DeploymentDocument {
            schema: scope.schema().to_owned(),
            content_version: CONTENT_VERSION.to_owned(),
            parameters: Map::new(),
            resources,
            outputs: Map::new(),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

pub(crate) fn kind_segment(resource_type: &str) -> &str {
    resource_type.rsplit('/').next().unwrap_or(resource_type)
}

pub(crate) fn resource_key(resource_type: &str, name: &str) -> (String, String) {
    (resource_type.to_ascii_lowercase(), name.to_ascii_lowercase())
}

/// Build a `dependsOn` ordering expression.
///
/// A simple name yields `[resourceId('type', 'name')]`; a compound
/// `parent/child` name yields one argument per segment so the engine can
/// address the child through its parent.
pub fn ordering_expression(resource_type: &str, name: &str) -> String {
    let mut args = vec![quote(resource_type)];
    args.extend(
        name.split('/')
            .filter(|segment| !segment.is_empty())
            .map(quote),
    );
    format!("[resourceId({})]", args.join(", "))
}

/// Inverse of [`ordering_expression`]: returns `(type, name)` when the
/// expression is a `resourceId` call whose arguments are all string literals.
pub fn parse_ordering_expression(expression: &str) -> Option<(String, String)> {
    let inner = expression
        .trim()
        .strip_prefix("[resourceId(")?
        .strip_suffix(")]")?;
    let args = parse_literal_args(inner)?;
    let (resource_type, segments) = args.split_first()?;
    if segments.is_empty() {
        return None;
    }
    Some((resource_type.clone(), segments.join("/")))
}

/// True when `value` is an engine expression (`[...]`, but not the `[[` literal escape).
pub fn is_expression(value: &str) -> bool {
    value.starts_with('[') && !value.starts_with("[[") && value.ends_with(']')
}

/// Quote a literal for use inside an engine expression.
pub fn quote(literal: &str) -> String {
    format!("'{}'", literal.replace('\'', "''"))
}

fn parse_literal_args(inner: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.next()? != '\'' {
            return None;
        }
        let mut arg = String::new();
        loop {
            match chars.next()? {
                '\'' if chars.peek() == Some(&'\'') => {
                    chars.next();
                    arg.push('\'');
                }
                '\'' => break,
                c => arg.push(c),
            }
        }
        args.push(arg);
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => return Some(args),
            Some(',') => continue,
            Some(_) => return None,
        }
    }
}

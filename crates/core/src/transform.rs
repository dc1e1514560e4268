//! Resource Transformer: invoke each resource's `to_document`, drop null
//! placeholders, and rewrite deployment-context tokens into engine calls.

use crate::error::ResourceError;
use crate::model::{is_expression, quote, ResourceNode};
use crate::resource::Resource;
use serde_json::Value;

/// Placeholder for the subscription being deployed to.
pub const SUBSCRIPTION_ID_TOKEN: &str = "${Token[SubscriptionId]}";
/// Placeholder for the resource group being deployed to.
pub const RESOURCE_GROUP_NAME_TOKEN: &str = "${Token[ResourceGroupName]}";
/// Tenant id sentinel emitted by identity resources.
pub const TENANT_ID_SENTINEL: &str = "00000000-0000-0000-0000-000000000000";

const SUBSTITUTIONS: [(&str, &str); 3] = [
    (SUBSCRIPTION_ID_TOKEN, "subscription().subscriptionId"),
    (RESOURCE_GROUP_NAME_TOKEN, "resourceGroup().name"),
    (TENANT_ID_SENTINEL, "subscription().tenantId"),
];

/// Produce the normalized document fragment of one resource.
///
/// Errors from `to_document` are returned as-is.
pub fn transform(resource: &dyn Resource) -> Result<Value, ResourceError> {
    let fragment = resource.to_document()?;
    Ok(normalize(fragment))
}

pub fn transform_all(resources: &[&dyn Resource]) -> Result<Vec<Value>, ResourceError> {
    resources.iter().map(|r| transform(*r)).collect()
}

/// Strip nulls and substitute tokens throughout a fragment.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, normalize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(normalize)
                .collect(),
        ),
        Value::String(s) => match substitute_tokens(&s) {
            Some(rewritten) => Value::String(rewritten),
            None => Value::String(s),
        },
        other => other,
    }
}

/// Convert a normalized fragment into a [`ResourceNode`] owned by construct `id`.
pub fn into_node(id: &str, fragment: Value) -> Result<ResourceNode, ResourceError> {
    if !fragment.is_object() {
        return Err(ResourceError::new(format!(
            "document of '{}' must be a JSON object, got {}",
            id,
            json_kind(&fragment)
        )));
    }
    let mut node: ResourceNode = serde_json::from_value(fragment).map_err(|e| {
        ResourceError::new(format!("document of '{}' is not a resource: {}", id, e))
    })?;
    node.id = id.to_owned();
    Ok(node)
}

/// Rewrite placeholder tokens in a string leaf; `None` when nothing changes.
///
/// Strings that already are engine expressions are left untouched.
pub fn substitute_tokens(value: &str) -> Option<String> {
    if is_expression(value) {
        return None;
    }

    let mut parts: Vec<String> = Vec::new();
    let mut calls = 0usize;
    let mut rest = value;
    loop {
        let next = SUBSTITUTIONS
            .iter()
            .filter_map(|(token, call)| rest.find(token).map(|pos| (pos, *token, *call)))
            .min_by_key(|(pos, _, _)| *pos);
        match next {
            Some((pos, token, call)) => {
                if pos > 0 {
                    parts.push(quote(&rest[..pos]));
                }
                parts.push(call.to_owned());
                calls += 1;
                rest = &rest[pos + token.len()..];
            }
            None => {
                if !rest.is_empty() {
                    parts.push(quote(rest));
                }
                break;
            }
        }
    }

    match (calls, parts.len()) {
        (0, _) => None,
        (_, 1) => Some(format!("[{}]", parts[0])),
        _ => Some(format!("[concat({})]", parts.join(", "))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

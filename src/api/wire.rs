//! Conversion between resource trees and API request/response bodies.

use serde_json::{Map, Value};

use crate::error::{ApiError, Result};
use crate::resources::ResourceRef;
use crate::schema::{FieldKind, FieldSpec, ObjectSchema, is_zero, last_segment};

/// Builds a request body from a resource tree.
///
/// Output-only and parameter fields are removed, `name` becomes the fully
/// qualified resource name, and absent values are dropped. Zero values are
/// dropped too unless the field transmits them.
///
/// # Errors
///
/// Returns an error if `tree` is not an object.
pub fn expand(schema: &ObjectSchema, tree: &Value, resource: &ResourceRef) -> Result<Value> {
    let map = as_object(schema, tree)?;
    let mut body = expand_object(schema, map, true);
    if schema.field("name").is_some() {
        body.insert("name".to_string(), Value::String(resource.path()));
    }
    Ok(Value::Object(body))
}

/// Builds a body holding only the named top-level fields of `tree`.
///
/// # Errors
///
/// Returns an error if `tree` is not an object.
pub fn expand_fields(
    schema: &ObjectSchema,
    tree: &Value,
    resource: &ResourceRef,
    fields: &[&str],
) -> Result<Value> {
    let Value::Object(mut body) = expand(schema, tree, resource)? else {
        return Err(ApiError::invalid_response("expanded body is not an object").into());
    };
    body.retain(|key, _| key == "name" || fields.contains(&key.as_str()));
    Ok(Value::Object(body))
}

/// Builds a resource tree from a response body.
///
/// Unknown fields are dropped, `name` is reduced to its short form and
/// parameter fields are filled from the resource identity.
///
/// # Errors
///
/// Returns an error if `raw` is not an object.
pub fn flatten(schema: &ObjectSchema, raw: &Value, resource: &ResourceRef) -> Result<Value> {
    let map = as_object(schema, raw)?;
    let mut tree = flatten_object(schema, map);

    if let Some(Value::String(name)) = tree.get("name") {
        let short = last_segment(name).to_string();
        tree.insert("name".to_string(), Value::String(short));
    }

    for field in schema.fields.iter().filter(|f| f.parameter) {
        let value = match field.name {
            "project" => Some(resource.parent.project.clone()),
            "location" => Some(resource.parent.location.clone()),
            "cluster" => resource.parent.cluster.clone(),
            _ => None,
        };
        if let Some(value) = value {
            tree.insert(field.name.to_string(), Value::String(value));
        }
    }

    Ok(Value::Object(tree))
}

fn as_object<'v>(schema: &ObjectSchema, value: &'v Value) -> Result<&'v Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        ApiError::invalid_response(format!("{} body is not a JSON object", schema.name)).into()
    })
}

fn expand_object(schema: &ObjectSchema, map: &Map<String, Value>, top: bool) -> Map<String, Value> {
    let mut out = Map::new();
    for field in schema.fields {
        if field.output_only || field.parameter {
            continue;
        }
        if let Some(value) = expand_value(field, map.get(field.name), top) {
            out.insert(field.name.to_string(), value);
        }
    }
    out
}

fn expand_value(field: &FieldSpec, value: Option<&Value>, top: bool) -> Option<Value> {
    let value = value.filter(|v| !v.is_null())?;
    let send_empty = field.send_empty || (top && matches!(field.kind, FieldKind::Scalar(_)));

    let expanded = match (field.kind, value) {
        (FieldKind::Object(nested), Value::Object(inner)) => {
            Value::Object(expand_object(nested, inner, false))
        }
        (FieldKind::ObjectList { schema, .. }, Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(inner) => Value::Object(expand_object(schema, inner, false)),
                    other => other.clone(),
                })
                .collect(),
        ),
        (_, other) => other.clone(),
    };

    if is_zero(&expanded) && !send_empty {
        None
    } else {
        Some(expanded)
    }
}

fn flatten_object(schema: &ObjectSchema, map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for field in schema.fields {
        let Some(value) = map.get(field.name).filter(|v| !v.is_null()) else {
            continue;
        };
        let flattened = match (field.kind, value) {
            (FieldKind::Object(nested), Value::Object(inner)) => {
                Value::Object(flatten_object(nested, inner))
            }
            (FieldKind::ObjectList { schema, .. }, Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(inner) => Value::Object(flatten_object(schema, inner)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            (_, other) => other.clone(),
        };
        out.insert(field.name.to_string(), flattened);
    }
    out
}

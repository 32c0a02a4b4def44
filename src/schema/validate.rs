//! Required-field and oneof validation of raw desired resources.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, ValidationError};

use super::field::{FieldKind, ObjectSchema};
use super::value::{Presence, is_unset, presence};

/// Validates a raw desired tree against its schema.
///
/// Nested objects are only checked when they carry values, so an absent or
/// empty block never reports its own required members.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found, walking fields in schema order.
pub fn validate(schema: &ObjectSchema, tree: &Value) -> Result<()> {
    let Some(map) = tree.as_object() else {
        return Err(ValidationError::Malformed {
            resource: schema.name.to_string(),
            message: "expected an object".to_string(),
        }
        .into());
    };
    debug!("Validating {}", schema.name);
    validate_object(schema, map, "")
}

fn validate_object(schema: &ObjectSchema, map: &Map<String, Value>, prefix: &str) -> Result<()> {
    for group in schema.one_of {
        let set: Vec<&str> = group
            .fields
            .iter()
            .copied()
            .filter(|name| presence(map.get(*name)) != Presence::Absent)
            .collect();
        if set.len() > 1 {
            return Err(ValidationError::ConflictingFields {
                resource: schema.name.to_string(),
                fields: group.fields.iter().map(|f| join(prefix, f)).collect(),
            }
            .into());
        }
        if group.required && set.is_empty() {
            return Err(ValidationError::MissingOneOf {
                resource: schema.name.to_string(),
                fields: group.fields.iter().map(|f| join(prefix, f)).collect(),
            }
            .into());
        }
    }

    for field in schema.fields {
        let path = join(prefix, field.name);
        let value = map.get(field.name);

        if field.required && is_unset(value) {
            return Err(ValidationError::MissingRequiredField {
                resource: schema.name.to_string(),
                field: path,
            }
            .into());
        }

        match (field.kind, value) {
            (FieldKind::Object(nested), Some(Value::Object(inner))) if !inner.is_empty() => {
                validate_object(nested, inner, &path)?;
            }
            (FieldKind::ObjectList { schema: nested, .. }, Some(Value::Array(items))) => {
                for (i, item) in items.iter().enumerate() {
                    if let Value::Object(inner) = item {
                        validate_object(nested, inner, &format!("{path}[{i}]"))?;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MultiCloudError;
    use crate::schema::field::{FieldSpec, OneOf};
    use serde_json::json;

    static AUTH: ObjectSchema = ObjectSchema {
        name: "Auth",
        fields: &[
            FieldSpec::text("tenantId").required(),
            FieldSpec::text("applicationId").required(),
        ],
        one_of: &[],
    };

    static USER: ObjectSchema = ObjectSchema {
        name: "User",
        fields: &[FieldSpec::text("username").required()],
        one_of: &[],
    };

    static ROOT: ObjectSchema = ObjectSchema {
        name: "Root",
        fields: &[
            FieldSpec::text("name").required(),
            FieldSpec::text("client"),
            FieldSpec::object("auth", &AUTH),
            FieldSpec::object_list("users", &USER, false),
        ],
        one_of: &[OneOf {
            fields: &["client", "auth"],
            required: true,
        }],
    };

    fn field_of(err: MultiCloudError) -> String {
        match err {
            MultiCloudError::Validation(ValidationError::MissingRequiredField { field, .. }) => {
                field
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_valid_tree() {
        let tree = json!({"name": "a", "client": "c", "users": [{"username": "u"}]});
        assert!(validate(&ROOT, &tree).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let tree = json!({"name": "", "client": "c"});
        let err = validate(&ROOT, &tree).expect_err("name is empty");
        assert_eq!(field_of(err), "name");
    }

    #[test]
    fn test_nested_required_only_when_set() {
        let tree = json!({"name": "a", "auth": {"tenantId": "t"}});
        let err = validate(&ROOT, &tree).expect_err("applicationId missing");
        assert_eq!(field_of(err), "auth.applicationId");

        let tree = json!({"name": "a", "client": "c", "users": [{"username": "u"}, {}]});
        let err = validate(&ROOT, &tree).expect_err("username missing");
        assert_eq!(field_of(err), "users[1].username");
    }

    #[test]
    fn test_one_of() {
        let both = json!({"name": "a", "client": "c", "auth": {"tenantId": "t", "applicationId": "x"}});
        assert!(matches!(
            validate(&ROOT, &both),
            Err(MultiCloudError::Validation(ValidationError::ConflictingFields { .. }))
        ));

        let neither = json!({"name": "a"});
        assert!(matches!(
            validate(&ROOT, &neither),
            Err(MultiCloudError::Validation(ValidationError::MissingOneOf { .. }))
        ));
    }

    #[test]
    fn test_not_an_object() {
        assert!(validate(&ROOT, &json!("a")).is_err());
    }
}

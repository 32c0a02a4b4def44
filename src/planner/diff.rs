//! Field differ.
//!
//! Compares two canonical resource trees field by field in schema order and
//! accumulates every difference, tagged with the operation selector of the
//! field that differs.

use serde_json::{Map, Value};
use std::fmt;

use crate::error::{MultiCloudError, Result};
use crate::schema::{
    FieldKind, FieldSpec, ObjectSchema, OperationSelector, Presence, equivalent, is_unset,
    presence,
};

/// One detected difference between desired and actual state.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    /// Dotted camelCase path, with `[i]` for list elements.
    pub path: String,
    /// Desired value at the path.
    pub desired: Option<Value>,
    /// Actual value at the path.
    pub actual: Option<Value>,
    /// How the difference is reconciled.
    pub operation: OperationSelector,
    /// The field is assigned by the server.
    pub output_only: bool,
}

impl FieldDiff {
    fn new(path: String, field: &FieldSpec, desired: Option<&Value>, actual: Option<&Value>) -> Self {
        Self {
            path,
            desired: desired.filter(|v| !v.is_null()).cloned(),
            actual: actual.filter(|v| !v.is_null()).cloned(),
            operation: field.selector,
            output_only: field.output_only,
        }
    }

    /// Returns the top-level field this difference belongs to.
    #[must_use]
    pub fn top_level_field(&self) -> &str {
        self.path
            .split(['.', '['])
            .next()
            .unwrap_or(self.path.as_str())
    }

    /// Returns the path with list indices removed, as used in update masks.
    #[must_use]
    pub fn mask_path(&self) -> String {
        let mut out = String::with_capacity(self.path.len());
        let mut in_index = false;
        for c in self.path.chars() {
            match c {
                '[' => in_index = true,
                ']' => in_index = false,
                _ if !in_index => out.push(c),
                _ => {}
            }
        }
        out
    }

    /// Returns true if this difference can only be fixed by recreation.
    #[must_use]
    pub fn requires_recreate(&self) -> bool {
        self.operation == OperationSelector::RequiresRecreate
    }
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<Value>| v.as_ref().map_or_else(|| "<unset>".to_string(), Value::to_string);
        write!(
            f,
            "{}: {} -> {} ({})",
            self.path,
            show(&self.actual),
            show(&self.desired),
            self.operation
        )?;
        if self.output_only {
            write!(f, " [output only]")?;
        }
        Ok(())
    }
}

/// Renders the paths of a set of differences for diagnostics.
#[must_use]
pub fn describe_diffs(diffs: &[FieldDiff]) -> String {
    if diffs.is_empty() {
        return "no fields".to_string();
    }
    diffs
        .iter()
        .map(|d| d.path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds a deduplicated update mask from a set of differences.
#[must_use]
pub fn update_mask(diffs: &[FieldDiff]) -> Vec<String> {
    let mut mask: Vec<String> = Vec::new();
    for diff in diffs {
        let path = diff.mask_path();
        if !mask.contains(&path) {
            mask.push(path);
        }
    }
    mask
}

/// Compares canonical desired and actual trees.
///
/// Neither input is mutated and every difference is reported.
///
/// # Errors
///
/// Returns an internal error if either tree is not an object, which means a
/// caller passed an absent resource.
pub fn diff(schema: &ObjectSchema, desired: &Value, actual: &Value) -> Result<Vec<FieldDiff>> {
    let (Some(desired), Some(actual)) = (desired.as_object(), actual.as_object()) else {
        return Err(MultiCloudError::internal(format!(
            "cannot diff {}: desired and actual state must both be present",
            schema.name
        )));
    };

    let mut diffs = Vec::new();
    diff_object(schema, desired, actual, "", &mut diffs);
    Ok(diffs)
}

/// Returns true if two objects show no differences under `schema`.
#[must_use]
pub fn objects_match(schema: &ObjectSchema, desired: &Map<String, Value>, actual: &Map<String, Value>) -> bool {
    let mut diffs = Vec::new();
    diff_object(schema, desired, actual, "", &mut diffs);
    diffs.is_empty()
}

fn diff_object(
    schema: &ObjectSchema,
    desired: &Map<String, Value>,
    actual: &Map<String, Value>,
    prefix: &str,
    out: &mut Vec<FieldDiff>,
) {
    for field in schema.fields {
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{prefix}.{}", field.name)
        };
        let d = desired.get(field.name);
        let a = actual.get(field.name);

        match presence(d) {
            Presence::Absent => continue,
            Presence::Empty => {
                // Empty objects and lists compare equal to absent ones.
                let scalar = matches!(field.kind, FieldKind::Scalar(_));
                if scalar && !field.server_default && !is_unset(a) {
                    out.push(FieldDiff::new(path, field, d, a));
                }
                continue;
            }
            Presence::Set => {}
        }

        match field.kind {
            FieldKind::Scalar(rule) => {
                if !equivalent(rule, d, a) {
                    out.push(FieldDiff::new(path, field, d, a));
                }
            }
            FieldKind::Object(nested) => match (d, a) {
                (Some(Value::Object(dm)), Some(Value::Object(am))) => {
                    diff_object(nested, dm, am, &path, out);
                }
                _ => out.push(FieldDiff::new(path, field, d, a)),
            },
            FieldKind::ObjectList { schema: nested, ordered } => {
                diff_object_list(field, nested, ordered, d, a, path, out);
            }
            FieldKind::StringList { ordered } => {
                let equal = match (d, a) {
                    (Some(Value::Array(dl)), Some(Value::Array(al))) => {
                        string_lists_equal(dl, al, ordered)
                    }
                    _ => false,
                };
                if !equal {
                    out.push(FieldDiff::new(path, field, d, a));
                }
            }
            FieldKind::StringMap => {
                if !maps_equal(d, a) {
                    out.push(FieldDiff::new(path, field, d, a));
                }
            }
        }
    }
}

fn diff_object_list(
    field: &FieldSpec,
    nested: &ObjectSchema,
    ordered: bool,
    d: Option<&Value>,
    a: Option<&Value>,
    path: String,
    out: &mut Vec<FieldDiff>,
) {
    let (Some(Value::Array(dl)), Some(Value::Array(al))) = (d, a) else {
        out.push(FieldDiff::new(path, field, d, a));
        return;
    };
    if dl.len() != al.len() {
        out.push(FieldDiff::new(path, field, d, a));
        return;
    }

    if ordered {
        for (i, (de, ae)) in dl.iter().zip(al).enumerate() {
            match (de, ae) {
                (Value::Object(dm), Value::Object(am)) => {
                    diff_object(nested, dm, am, &format!("{path}[{i}]"), out);
                }
                _ if de == ae => {}
                _ => out.push(FieldDiff::new(format!("{path}[{i}]"), field, Some(de), Some(ae))),
            }
        }
        return;
    }

    let mut used = vec![false; al.len()];
    let all_matched = dl.iter().all(|de| {
        let found = al.iter().enumerate().position(|(j, ae)| {
            !used[j] && element_matches(nested, de, ae)
        });
        found.is_some_and(|j| {
            used[j] = true;
            true
        })
    });
    if !all_matched {
        out.push(FieldDiff::new(path, field, d, a));
    }
}

/// Returns true if two list elements are equal under the element schema.
#[must_use]
pub fn element_matches(schema: &ObjectSchema, desired: &Value, actual: &Value) -> bool {
    match (desired, actual) {
        (Value::Object(dm), Value::Object(am)) => objects_match(schema, dm, am),
        _ => desired == actual,
    }
}

/// Compares two string lists, optionally ignoring order.
#[must_use]
pub fn string_lists_equal(desired: &[Value], actual: &[Value], ordered: bool) -> bool {
    if desired.len() != actual.len() {
        return false;
    }
    let norm = |v: &Value| v.as_str().map_or_else(|| v.to_string(), |s| s.trim().to_string());
    let mut d: Vec<String> = desired.iter().map(norm).collect();
    let mut a: Vec<String> = actual.iter().map(norm).collect();
    if !ordered {
        d.sort_unstable();
        a.sort_unstable();
    }
    d == a
}

/// Compares two string maps, treating absent and empty as equal.
#[must_use]
pub fn maps_equal(desired: Option<&Value>, actual: Option<&Value>) -> bool {
    match (desired, actual) {
        (Some(Value::Object(d)), Some(Value::Object(a))) => d == a,
        _ => is_unset(desired) && is_unset(actual),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Equivalence, FieldSpec, ObjectSchema};
    use serde_json::json;

    static SSH: ObjectSchema = ObjectSchema {
        name: "Ssh",
        fields: &[FieldSpec::text("authorizedKey").triggers("UpdateThing")],
        one_of: &[],
    };

    static VOLUME: ObjectSchema = ObjectSchema {
        name: "Volume",
        fields: &[FieldSpec::scalar("sizeGib", Equivalence::Numeric).recreate().server_default()],
        one_of: &[],
    };

    static USER: ObjectSchema = ObjectSchema {
        name: "User",
        fields: &[FieldSpec::text("username").triggers("UpdateThing")],
        one_of: &[],
    };

    static PLACEMENT: ObjectSchema = ObjectSchema {
        name: "Placement",
        fields: &[FieldSpec::text("subnetId").recreate()],
        one_of: &[],
    };

    static THING: ObjectSchema = ObjectSchema {
        name: "Thing",
        fields: &[
            FieldSpec::scalar("name", Equivalence::SelfLink).recreate(),
            FieldSpec::text("version").triggers("UpdateThing"),
            FieldSpec::text("subnetId").recreate(),
            FieldSpec::text("vmSize").triggers("UpdateThing").server_default(),
            FieldSpec::object("ssh", &SSH).recreate(),
            FieldSpec::object("rootVolume", &VOLUME).recreate().server_default(),
            FieldSpec::object_list("users", &USER, false).triggers("UpdateThing"),
            FieldSpec::object_list("placements", &PLACEMENT, true).recreate(),
            FieldSpec::string_list("cidrs", true).recreate(),
            FieldSpec::string_map("tags").recreate(),
            FieldSpec::text("uid").output_only().recreate(),
        ],
        one_of: &[],
    };

    fn full() -> Value {
        json!({
            "name": "projects/p/locations/l/things/a",
            "version": "1.18",
            "subnetId": "s1",
            "vmSize": "Standard_DS2_v2",
            "ssh": {"authorizedKey": "ssh-rsa AAA"},
            "rootVolume": {"sizeGib": 32},
            "users": [{"username": "alice"}, {"username": "bob"}],
            "placements": [{"subnetId": "s1"}, {"subnetId": "s2"}],
            "cidrs": ["10.0.0.0/16"],
            "tags": {"env": "prod"},
            "uid": "u-1"
        })
    }

    #[test]
    fn test_no_diffs_against_self() {
        let tree = full();
        assert!(diff(&THING, &tree, &tree).expect("diff").is_empty());
    }

    #[test]
    fn test_absent_desired_never_diffs() {
        let desired = json!({"name": "a"});
        assert!(diff(&THING, &desired, &full()).expect("diff").is_empty());
    }

    #[test]
    fn test_accumulates_all_diffs_in_schema_order() {
        let desired = json!({"version": "1.19", "subnetId": "s9", "tags": {"env": "dev"}});
        let diffs = diff(&THING, &desired, &full()).expect("diff");
        let paths: Vec<&str> = diffs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["version", "subnetId", "tags"]);
        assert_eq!(
            diffs[0].operation,
            OperationSelector::TriggersOperation("UpdateThing")
        );
        assert!(diffs[1].requires_recreate());
    }

    #[test]
    fn test_nested_fields_use_their_own_selector() {
        let desired = json!({"ssh": {"authorizedKey": "ssh-rsa BBB"}});
        let diffs = diff(&THING, &desired, &full()).expect("diff");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "ssh.authorizedKey");
        assert_eq!(
            diffs[0].operation,
            OperationSelector::TriggersOperation("UpdateThing")
        );
        assert_eq!(diffs[0].top_level_field(), "ssh");
    }

    #[test]
    fn test_missing_actual_object_uses_parent_selector() {
        let desired = json!({"ssh": {"authorizedKey": "k"}});
        let actual = json!({"name": "a"});
        let diffs = diff(&THING, &desired, &actual).expect("diff");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "ssh");
        assert!(diffs[0].requires_recreate());
    }

    #[test]
    fn test_empty_object_sentinel() {
        let desired = json!({"ssh": {}});
        let actual = json!({});
        assert!(diff(&THING, &desired, &actual).expect("diff").is_empty());
    }

    #[test]
    fn test_server_default_is_lenient() {
        let desired = json!({"vmSize": "", "rootVolume": {"sizeGib": 0}});
        assert!(diff(&THING, &desired, &full()).expect("diff").is_empty());

        let desired = json!({"version": ""});
        assert_eq!(diff(&THING, &desired, &full()).expect("diff").len(), 1);
    }

    #[test]
    fn test_output_only_drift_requires_recreate() {
        let desired = json!({"uid": "u-2"});
        let diffs = diff(&THING, &desired, &full()).expect("diff");
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].output_only);
        assert!(diffs[0].requires_recreate());
    }

    #[test]
    fn test_unordered_list_ignores_order() {
        let desired = json!({"users": [{"username": "bob"}, {"username": "alice"}]});
        assert!(diff(&THING, &desired, &full()).expect("diff").is_empty());

        let desired = json!({"users": [{"username": "bob"}, {"username": "carol"}]});
        let diffs = diff(&THING, &desired, &full()).expect("diff");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "users");
    }

    #[test]
    fn test_ordered_list_diffs() {
        let desired = json!({"placements": [{"subnetId": "s2"}, {"subnetId": "s1"}]});
        let diffs = diff(&THING, &desired, &full()).expect("diff");
        let paths: Vec<&str> = diffs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["placements[0].subnetId", "placements[1].subnetId"]);
        assert_eq!(diffs[0].mask_path(), "placements.subnetId");

        let desired = json!({"placements": [{"subnetId": "s1"}]});
        let diffs = diff(&THING, &desired, &full()).expect("diff");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "placements");
    }

    #[test]
    fn test_string_list_order() {
        let desired = json!({"cidrs": ["10.0.0.0/16", "10.1.0.0/16"]});
        let diffs = diff(&THING, &desired, &full()).expect("diff");
        assert_eq!(diffs.len(), 1);
        assert!(string_lists_equal(&[json!("a"), json!("b")], &[json!("b"), json!("a")], false));
        assert!(!string_lists_equal(&[json!("a"), json!("b")], &[json!("b"), json!("a")], true));
    }

    #[test]
    fn test_update_mask_dedup() {
        let desired = json!({"version": "2", "users": [{"username": "zed"}, {"username": "x"}]});
        let diffs = diff(&THING, &desired, &full()).expect("diff");
        assert_eq!(update_mask(&diffs), vec!["version".to_string(), "users".to_string()]);
        assert_eq!(describe_diffs(&diffs), "version, users");
    }

    #[test]
    fn test_absent_input_is_an_error() {
        assert!(diff(&THING, &Value::Null, &full()).is_err());
        assert!(diff(&THING, &full(), &Value::Null).is_err());
    }
}

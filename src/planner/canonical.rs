//! State canonicalizer.
//!
//! Normalizes desired and server-observed trees so that values which only
//! differ in formatting compare equal. Canonical trees are fresh copies and
//! never alias their inputs.

use serde_json::{Map, Value};

use crate::schema::{FieldKind, ObjectSchema, Presence, equivalent, is_unset, presence};

use super::diff::{element_matches, maps_equal, string_lists_equal};

type Object = Map<String, Value>;

/// Canonicalizes a raw desired tree against the initial live state.
///
/// Without an initial state only nested objects are walked. With one, each
/// input field takes the initial value when the desired value is unset or
/// equivalent to it, and output-only fields are dropped.
#[must_use]
pub fn canonicalize_desired(schema: &ObjectSchema, desired: &Value, initial: Option<&Value>) -> Value {
    match desired {
        Value::Object(des) => Value::Object(desired_object(
            schema,
            des,
            initial.and_then(Value::as_object),
        )),
        other => other.clone(),
    }
}

/// Canonicalizes a server-observed tree against the raw desired tree.
///
/// Server values that are equivalent to the desired ones are replaced with
/// the desired spelling; server-only values are kept.
#[must_use]
pub fn canonicalize_new(schema: &ObjectSchema, observed: &Value, desired: &Value) -> Value {
    match (observed, desired) {
        (Value::Object(nw), Value::Object(des)) => Value::Object(new_object(schema, nw, des)),
        (other, _) => other.clone(),
    }
}

fn desired_object(schema: &ObjectSchema, des: &Object, initial: Option<&Object>) -> Object {
    let Some(init) = initial else {
        let mut out = des.clone();
        for field in schema.fields {
            match (field.kind, des.get(field.name)) {
                (FieldKind::Object(nested), Some(Value::Object(d))) if !d.is_empty() => {
                    out.insert(field.name.to_string(), Value::Object(desired_object(nested, d, None)));
                }
                (FieldKind::ObjectList { schema: nested, .. }, Some(Value::Array(items))) => {
                    let items = items.iter().map(|i| desired_element(nested, i, None)).collect();
                    out.insert(field.name.to_string(), Value::Array(items));
                }
                _ => {}
            }
        }
        return out;
    };

    let mut out = Object::new();
    for field in schema.fields.iter().filter(|f| f.is_input()) {
        let d = des.get(field.name);
        let i = init.get(field.name);
        let value = match field.kind {
            FieldKind::Scalar(rule) => {
                (if is_unset(d) || equivalent(rule, d, i) { i } else { d }).cloned()
            }
            FieldKind::StringList { ordered } => {
                let same = matches!((d, i), (Some(Value::Array(dl)), Some(Value::Array(il)))
                    if string_lists_equal(dl, il, ordered));
                (if is_unset(d) || same { i } else { d }).cloned()
            }
            FieldKind::StringMap => {
                (if is_unset(d) || maps_equal(d, i) { i } else { d }).cloned()
            }
            FieldKind::Object(nested) => nested_desired(nested, d, i),
            FieldKind::ObjectList { schema: nested, .. } => list_desired(nested, d, i),
        };
        put(&mut out, field.name, value);
    }

    for group in schema.one_of {
        for member in group.fields {
            let others_set = group
                .fields
                .iter()
                .any(|other| other != member && presence(des.get(*other)) == Presence::Set);
            if others_set {
                out.remove(*member);
            }
        }
    }

    out
}

fn nested_desired(schema: &ObjectSchema, d: Option<&Value>, i: Option<&Value>) -> Option<Value> {
    match (presence(d), d) {
        (Presence::Absent, _) => i.filter(|v| !v.is_null()).cloned(),
        (Presence::Set, Some(Value::Object(dm))) => Some(Value::Object(desired_object(
            schema,
            dm,
            i.and_then(Value::as_object),
        ))),
        (_, other) => other.cloned(),
    }
}

fn list_desired(schema: &ObjectSchema, d: Option<&Value>, i: Option<&Value>) -> Option<Value> {
    let Some(Value::Array(dl)) = d.filter(|v| !is_unset(Some(*v))) else {
        return i.filter(|v| !v.is_null()).cloned();
    };
    let il = i.and_then(Value::as_array);
    let items = match il {
        Some(il) if il.len() == dl.len() => dl
            .iter()
            .zip(il)
            .map(|(de, ie)| desired_element(schema, de, Some(ie)))
            .collect(),
        _ => dl.iter().map(|de| desired_element(schema, de, None)).collect(),
    };
    Some(Value::Array(items))
}

fn desired_element(schema: &ObjectSchema, des: &Value, initial: Option<&Value>) -> Value {
    match des {
        Value::Object(dm) => Value::Object(desired_object(
            schema,
            dm,
            initial.and_then(Value::as_object),
        )),
        other => other.clone(),
    }
}

fn new_object(schema: &ObjectSchema, nw: &Object, des: &Object) -> Object {
    let mut out = nw.clone();
    for field in schema.fields {
        let n = nw.get(field.name);
        let d = des.get(field.name);

        if field.parameter {
            put(&mut out, field.name, d.cloned());
            continue;
        }
        if is_unset(n) && is_unset(d) {
            put(&mut out, field.name, d.cloned());
            continue;
        }

        match field.kind {
            FieldKind::Scalar(rule) => {
                if equivalent(rule, d, n) {
                    put(&mut out, field.name, d.cloned());
                }
            }
            FieldKind::StringList { ordered } => {
                if let (Some(Value::Array(dl)), Some(Value::Array(nl))) = (d, n) {
                    if string_lists_equal(dl, nl, ordered) {
                        put(&mut out, field.name, d.cloned());
                    }
                }
            }
            FieldKind::StringMap => {}
            FieldKind::Object(nested) => {
                put(&mut out, field.name, nested_new(nested, n, d));
            }
            FieldKind::ObjectList { schema: nested, ordered } => {
                put(&mut out, field.name, list_new(nested, ordered, n, d));
            }
        }
    }
    out
}

fn nested_new(schema: &ObjectSchema, n: Option<&Value>, d: Option<&Value>) -> Option<Value> {
    if presence(d) == Presence::Absent {
        return n.cloned();
    }
    match (n, d) {
        (Some(Value::Object(nm)), Some(Value::Object(dm))) => {
            Some(Value::Object(new_object(schema, nm, dm)))
        }
        (None | Some(Value::Null), _) => d.filter(|_| presence(d) == Presence::Empty).cloned(),
        _ => n.cloned(),
    }
}

fn list_new(schema: &ObjectSchema, ordered: bool, n: Option<&Value>, d: Option<&Value>) -> Option<Value> {
    let (Some(Value::Array(nl)), Some(Value::Array(dl))) = (n, d) else {
        return n.cloned();
    };

    if ordered {
        if nl.len() != dl.len() {
            return n.cloned();
        }
        let items = nl
            .iter()
            .zip(dl)
            .map(|(ne, de)| new_element(schema, ne, de))
            .collect();
        return Some(Value::Array(items));
    }

    let mut used = vec![false; nl.len()];
    let mut items = Vec::with_capacity(nl.len());
    for de in dl {
        let matched = nl
            .iter()
            .enumerate()
            .find(|(j, ne)| !used[*j] && element_matches(schema, de, ne))
            .map(|(j, _)| j);
        if let Some(j) = matched {
            used[j] = true;
            items.push(new_element(schema, &nl[j], de));
        }
    }
    items.extend(
        nl.iter()
            .zip(&used)
            .filter(|(_, taken)| !**taken)
            .map(|(ne, _)| ne.clone()),
    );
    Some(Value::Array(items))
}

fn new_element(schema: &ObjectSchema, nw: &Value, des: &Value) -> Value {
    match (nw, des) {
        (Value::Object(nm), Value::Object(dm)) => Value::Object(new_object(schema, nm, dm)),
        (other, _) => other.clone(),
    }
}

fn put(out: &mut Object, name: &str, value: Option<Value>) {
    match value {
        Some(v) if !v.is_null() => {
            out.insert(name.to_string(), v);
        }
        _ => {
            out.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::diff::diff;
    use crate::schema::{Equivalence, FieldSpec, OneOf};
    use serde_json::json;

    static AUTH: ObjectSchema = ObjectSchema {
        name: "Auth",
        fields: &[FieldSpec::text("tenantId"), FieldSpec::text("applicationId")],
        one_of: &[],
    };

    static USER: ObjectSchema = ObjectSchema {
        name: "User",
        fields: &[FieldSpec::text("username")],
        one_of: &[],
    };

    static VOLUME: ObjectSchema = ObjectSchema {
        name: "Volume",
        fields: &[FieldSpec::scalar("sizeGib", Equivalence::Numeric).server_default()],
        one_of: &[],
    };

    static THING: ObjectSchema = ObjectSchema {
        name: "Thing",
        fields: &[
            FieldSpec::scalar("name", Equivalence::SelfLink).recreate(),
            FieldSpec::scalar("region", Equivalence::CaseInsensitive).recreate(),
            FieldSpec::scalar("client", Equivalence::Reference).triggers("Update"),
            FieldSpec::object("auth", &AUTH).triggers("Update"),
            FieldSpec::object("rootVolume", &VOLUME).recreate(),
            FieldSpec::object_list("users", &USER, false).triggers("Update"),
            FieldSpec::string_list("cidrs", true).recreate(),
            FieldSpec::text("uid").output_only().recreate(),
            FieldSpec::scalar("project", Equivalence::Reference).parameter(),
        ],
        one_of: &[OneOf {
            fields: &["client", "auth"],
            required: true,
        }],
    };

    fn live() -> Value {
        json!({
            "name": "projects/p/locations/l/things/a",
            "region": "eastus",
            "client": "projects/p/locations/l/azureClients/c1",
            "rootVolume": {"sizeGib": 32},
            "users": [{"username": "alice"}, {"username": "bob"}],
            "cidrs": ["10.0.0.0/16"],
            "uid": "u-1",
            "project": "p"
        })
    }

    #[test]
    fn test_no_initial_returns_desired() {
        let desired = json!({"name": "a", "rootVolume": {}, "users": [{"username": "x"}]});
        assert_eq!(canonicalize_desired(&THING, &desired, None), desired);
    }

    #[test]
    fn test_equivalent_values_take_initial_spelling() {
        let desired = json!({"name": "a", "region": "EastUS", "client": "c1"});
        let canonical = canonicalize_desired(&THING, &desired, Some(&live()));
        assert_eq!(canonical["name"], json!("projects/p/locations/l/things/a"));
        assert_eq!(canonical["region"], json!("eastus"));
        assert_eq!(canonical["client"], json!("projects/p/locations/l/azureClients/c1"));
        assert!(diff(&THING, &canonical, &live()).expect("diff").is_empty());
    }

    #[test]
    fn test_unset_values_take_initial_and_output_only_dropped() {
        let desired = json!({"name": "a", "region": ""});
        let canonical = canonicalize_desired(&THING, &desired, Some(&live()));
        assert_eq!(canonical["region"], json!("eastus"));
        assert_eq!(canonical["rootVolume"], json!({"sizeGib": 32}));
        assert!(canonical.get("uid").is_none());
    }

    #[test]
    fn test_differing_values_are_kept() {
        let desired = json!({"name": "b", "region": "westus"});
        let canonical = canonicalize_desired(&THING, &desired, Some(&live()));
        assert_eq!(canonical["name"], json!("b"));
        assert_eq!(canonical["region"], json!("westus"));
    }

    #[test]
    fn test_one_of_clears_competing_member() {
        let desired = json!({"name": "a", "auth": {"tenantId": "t", "applicationId": "x"}});
        let canonical = canonicalize_desired(&THING, &desired, Some(&live()));
        assert!(canonical.get("client").is_none());
        assert_eq!(canonical["auth"]["tenantId"], json!("t"));
    }

    #[test]
    fn test_list_length_mismatch_passes_through() {
        let desired = json!({"users": [{"username": "carol"}]});
        let canonical = canonicalize_desired(&THING, &desired, Some(&live()));
        assert_eq!(canonical["users"], json!([{"username": "carol"}]));
    }

    #[test]
    fn test_canonicalize_desired_is_idempotent() {
        let samples = [
            json!({"name": "a", "region": "EastUS", "client": "c1", "users": [{"username": "z"}]}),
            json!({"name": "a", "auth": {"tenantId": "t"}, "cidrs": ["10.0.0.0/16"]}),
            json!({"name": "q", "rootVolume": {}, "project": "projects/p"}),
        ];
        let initial = live();
        for x in samples {
            let once = canonicalize_desired(&THING, &x, Some(&initial));
            let twice = canonicalize_desired(&THING, &once, Some(&initial));
            assert_eq!(once, twice, "not idempotent for {x}");
        }
    }

    #[test]
    fn test_canonicalize_new_prefers_desired_spelling() {
        let desired = json!({"name": "a", "region": "EastUS", "client": "c1", "project": "p"});
        let canonical = canonicalize_new(&THING, &live(), &desired);
        assert_eq!(canonical["name"], json!("a"));
        assert_eq!(canonical["region"], json!("EastUS"));
        assert_eq!(canonical["client"], json!("c1"));
        assert_eq!(canonical["uid"], json!("u-1"));
    }

    #[test]
    fn test_canonicalize_new_copies_parameters() {
        let desired = json!({"name": "a", "project": "my-project"});
        let canonical = canonicalize_new(&THING, &live(), &desired);
        assert_eq!(canonical["project"], json!("my-project"));
    }

    #[test]
    fn test_canonicalize_new_matches_unordered_elements() {
        let observed = json!({"users": [{"username": "bob"}, {"username": "alice"}, {"username": "eve"}]});
        let desired = json!({"users": [{"username": "alice"}, {"username": "bob"}]});
        let canonical = canonicalize_new(&THING, &observed, &desired);
        assert_eq!(
            canonical["users"],
            json!([{"username": "alice"}, {"username": "bob"}, {"username": "eve"}])
        );
    }

    #[test]
    fn test_canonicalize_new_empty_nested() {
        let observed = json!({"name": "a"});
        let desired = json!({"name": "a", "rootVolume": {}});
        let canonical = canonicalize_new(&THING, &observed, &desired);
        assert_eq!(canonical["rootVolume"], json!({}));

        let desired = json!({"name": "a", "auth": {"tenantId": "t"}});
        let canonical = canonicalize_new(&THING, &observed, &desired);
        assert!(canonical.get("auth").is_none());
    }
}

//! Value helpers shared by the canonicalizer, differ and validator.
//!
//! Resource trees are `serde_json` values. A field is *absent* when its key
//! is missing or `null`, *empty* when it holds a zero value (`""`, `0`,
//! `false`, `[]`, `{}`), and *set* otherwise.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::field::Equivalence;

/// Tri-state view of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Missing or null.
    Absent,
    /// Present but zero-valued.
    Empty,
    /// Present with a non-zero value.
    Set,
}

/// Classifies an optional field value.
#[must_use]
pub fn presence(value: Option<&Value>) -> Presence {
    match value {
        None | Some(Value::Null) => Presence::Absent,
        Some(v) if is_zero(v) => Presence::Empty,
        Some(_) => Presence::Set,
    }
}

/// Returns true if the value is the zero value of its type.
#[must_use]
pub fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Returns true if the optional value is absent or zero.
#[must_use]
pub fn is_unset(value: Option<&Value>) -> bool {
    presence(value) != Presence::Set
}

/// Returns true if `desired` and `actual` are semantically equal under `rule`.
///
/// Two absent values are equivalent; an absent value never matches a set one.
#[must_use]
pub fn equivalent(rule: Equivalence, desired: Option<&Value>, actual: Option<&Value>) -> bool {
    let (desired, actual) = match (non_null(desired), non_null(actual)) {
        (None, None) => return true,
        (Some(d), Some(a)) => (d, a),
        _ => return false,
    };

    match rule {
        Equivalence::Exact => desired == actual,
        Equivalence::Text => match (desired.as_str(), actual.as_str()) {
            (Some(d), Some(a)) => d.trim() == a.trim(),
            _ => desired == actual,
        },
        Equivalence::CaseInsensitive => match (desired.as_str(), actual.as_str()) {
            (Some(d), Some(a)) => d.trim().eq_ignore_ascii_case(a.trim()),
            _ => desired == actual,
        },
        Equivalence::SelfLink => match (desired.as_str(), actual.as_str()) {
            (Some(d), Some(a)) => self_link_matches(d, a),
            _ => desired == actual,
        },
        Equivalence::Reference => match (desired.as_str(), actual.as_str()) {
            (Some(d), Some(a)) => last_segment(d) == last_segment(a),
            _ => desired == actual,
        },
        Equivalence::Numeric => match (as_number(desired), as_number(actual)) {
            (Some(d), Some(a)) => (d - a).abs() < f64::EPSILON,
            _ => desired == actual,
        },
        Equivalence::Boolean => match (as_bool(desired), as_bool(actual)) {
            (Some(d), Some(a)) => d == a,
            _ => desired == actual,
        },
    }
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Returns the last `/`-separated segment of a resource path.
#[must_use]
pub fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Returns true if one value is a partial self link of the other.
///
/// `"a"` matches `"projects/p/locations/l/azureClusters/a"`; two full paths
/// must be identical.
#[must_use]
pub fn self_link_matches(left: &str, right: &str) -> bool {
    let (left, right) = (left.trim_end_matches('/'), right.trim_end_matches('/'));
    if left == right {
        return true;
    }
    let (short, long) = if left.len() < right.len() {
        (left, right)
    } else {
        (right, left)
    };
    !short.is_empty() && long.ends_with(short) && long[..long.len() - short.len()].ends_with('/')
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A nested object that distinguishes "absent" from "present but empty".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block<T> {
    /// The object was not supplied.
    Absent,
    /// The object was supplied with every field at its default.
    Empty,
    /// The object was supplied with values.
    Set(T),
}

impl<T> Block<T> {
    /// Returns true if the block was not supplied.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns true if the block was supplied, empty or not.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        !self.is_absent()
    }

    /// Returns the contained value, if any.
    #[must_use]
    pub const fn as_ref(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Absent | Self::Empty => None,
        }
    }

    /// Consumes the block, returning the contained value.
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Absent | Self::Empty => None,
        }
    }
}

impl<T> Default for Block<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> From<T> for Block<T> {
    fn from(value: T) -> Self {
        Self::Set(value)
    }
}

impl<T: Serialize> Serialize for Block<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent => serializer.serialize_none(),
            Self::Empty => serde_json::Map::new().serialize(serializer),
            Self::Set(value) => value.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Block<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null => Ok(Self::Absent),
            Value::Object(ref map) if map.is_empty() => Ok(Self::Empty),
            other => serde_json::from_value(other)
                .map(Self::Set)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ssh {
        #[serde(rename = "authorizedKey")]
        authorized_key: Option<String>,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(default)]
        ssh: Block<Ssh>,
    }

    #[test]
    fn test_presence() {
        assert_eq!(presence(None), Presence::Absent);
        assert_eq!(presence(Some(&Value::Null)), Presence::Absent);
        assert_eq!(presence(Some(&json!(""))), Presence::Empty);
        assert_eq!(presence(Some(&json!(0))), Presence::Empty);
        assert_eq!(presence(Some(&json!({}))), Presence::Empty);
        assert_eq!(presence(Some(&json!([]))), Presence::Empty);
        assert_eq!(presence(Some(&json!("x"))), Presence::Set);
        assert_eq!(presence(Some(&json!({"a": 1}))), Presence::Set);
    }

    #[test]
    fn test_self_link_equivalence() {
        let short = json!("a");
        let long = json!("projects/p/locations/l/azureClusters/a");
        let other = json!("projects/p/locations/l/azureClusters/ba");
        assert!(equivalent(Equivalence::SelfLink, Some(&short), Some(&long)));
        assert!(equivalent(Equivalence::SelfLink, Some(&long), Some(&short)));
        assert!(!equivalent(Equivalence::SelfLink, Some(&json!("a")), Some(&other)));
        assert!(!equivalent(Equivalence::SelfLink, Some(&short), None));
    }

    #[test]
    fn test_reference_and_text_equivalence() {
        assert!(equivalent(
            Equivalence::Reference,
            Some(&json!("my-client")),
            Some(&json!("projects/123/locations/l/azureClients/my-client")),
        ));
        assert!(equivalent(Equivalence::Text, Some(&json!(" v1 ")), Some(&json!("v1"))));
        assert!(!equivalent(Equivalence::Text, Some(&json!("V1")), Some(&json!("v1"))));
        assert!(equivalent(
            Equivalence::CaseInsensitive,
            Some(&json!("EastUS")),
            Some(&json!("eastus")),
        ));
    }

    #[test]
    fn test_numeric_and_boolean_equivalence() {
        assert!(equivalent(Equivalence::Numeric, Some(&json!(3)), Some(&json!(3.0))));
        assert!(equivalent(Equivalence::Numeric, Some(&json!("3")), Some(&json!(3))));
        assert!(!equivalent(Equivalence::Numeric, Some(&json!(3)), Some(&json!(4))));
        assert!(equivalent(Equivalence::Boolean, Some(&json!("true")), Some(&json!(true))));
        assert!(equivalent(Equivalence::Exact, None, Some(&Value::Null)));
    }

    #[test]
    fn test_block_tri_state_serde() {
        let absent: Holder = serde_json::from_value(json!({})).expect("absent");
        assert!(absent.ssh.is_absent());

        let null: Holder = serde_json::from_value(json!({"ssh": null})).expect("null");
        assert!(null.ssh.is_absent());

        let empty: Holder = serde_json::from_value(json!({"ssh": {}})).expect("empty");
        assert_eq!(empty.ssh, Block::Empty);
        assert_eq!(serde_json::to_value(&empty).expect("ser"), json!({"ssh": {}}));

        let set: Holder =
            serde_json::from_value(json!({"ssh": {"authorizedKey": "k"}})).expect("set");
        assert_eq!(
            set.ssh.as_ref().and_then(|s| s.authorized_key.as_deref()),
            Some("k")
        );
        assert_eq!(serde_json::to_value(&Holder::default()).expect("ser"), json!({"ssh": null}));
    }
}

//! Static per-field metadata consumed by the canonicalizer and differ.
//!
//! Each resource type declares one [`ObjectSchema`] tree. The tables are
//! plain `static` items built with `const fn` helpers, so a schema costs
//! nothing at runtime and cannot be mutated.

use std::fmt;

/// Policy deciding how a difference in a field is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationSelector {
    /// A difference needs no remote call.
    None,
    /// A difference can only be resolved by recreating the resource.
    RequiresRecreate,
    /// A difference is resolved by the named update operation.
    TriggersOperation(&'static str),
}

impl fmt::Display for OperationSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::RequiresRecreate => write!(f, "recreate"),
            Self::TriggersOperation(name) => write!(f, "{name}"),
        }
    }
}

/// Equality rule used for scalar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equivalence {
    /// Values must be identical.
    Exact,
    /// Strings are compared after trimming surrounding whitespace.
    Text,
    /// Strings are compared ignoring ASCII case.
    CaseInsensitive,
    /// A short name matches any fully-qualified path ending in it.
    SelfLink,
    /// Resource references are compared by their last path segment.
    Reference,
    /// Numbers compare by value regardless of representation.
    Numeric,
    /// Booleans, accepting `"true"`/`"false"` strings.
    Boolean,
}

/// Shape of a field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// A single value compared with the given rule.
    Scalar(Equivalence),
    /// A nested object.
    Object(&'static ObjectSchema),
    /// A repeated group of nested objects.
    ObjectList {
        /// Schema of each element.
        schema: &'static ObjectSchema,
        /// Whether element order is significant.
        ordered: bool,
    },
    /// A repeated string field.
    StringList {
        /// Whether element order is significant.
        ordered: bool,
    },
    /// A string-keyed map of strings.
    StringMap,
}

/// Metadata for one field of an object.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// camelCase field name, identical to the wire name.
    pub name: &'static str,
    /// Field shape.
    pub kind: FieldKind,
    /// How a difference is reconciled.
    pub selector: OperationSelector,
    /// The user must supply a non-empty value.
    pub required: bool,
    /// Assigned by the server, never supplied by the user.
    pub output_only: bool,
    /// The server fills a value when the user leaves it unset.
    pub server_default: bool,
    /// Part of the resource identity rather than the request body.
    pub parameter: bool,
    /// Zero values are transmitted when explicitly set.
    pub send_empty: bool,
}

impl FieldSpec {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            selector: OperationSelector::None,
            required: false,
            output_only: false,
            server_default: false,
            parameter: false,
            send_empty: false,
        }
    }

    /// Creates a scalar field compared with `equivalence`.
    #[must_use]
    pub const fn scalar(name: &'static str, equivalence: Equivalence) -> Self {
        Self::new(name, FieldKind::Scalar(equivalence))
    }

    /// Creates a string field compared after trimming.
    #[must_use]
    pub const fn text(name: &'static str) -> Self {
        Self::scalar(name, Equivalence::Text)
    }

    /// Creates a nested object field.
    #[must_use]
    pub const fn object(name: &'static str, schema: &'static ObjectSchema) -> Self {
        Self::new(name, FieldKind::Object(schema))
    }

    /// Creates a repeated object field.
    #[must_use]
    pub const fn object_list(
        name: &'static str,
        schema: &'static ObjectSchema,
        ordered: bool,
    ) -> Self {
        Self::new(name, FieldKind::ObjectList { schema, ordered })
    }

    /// Creates a repeated string field.
    #[must_use]
    pub const fn string_list(name: &'static str, ordered: bool) -> Self {
        Self::new(name, FieldKind::StringList { ordered })
    }

    /// Creates a string map field.
    #[must_use]
    pub const fn string_map(name: &'static str) -> Self {
        Self::new(name, FieldKind::StringMap)
    }

    /// Differences require recreating the resource.
    #[must_use]
    pub const fn recreate(mut self) -> Self {
        self.selector = OperationSelector::RequiresRecreate;
        self
    }

    /// Differences are resolved by the named update operation.
    #[must_use]
    pub const fn triggers(mut self, operation: &'static str) -> Self {
        self.selector = OperationSelector::TriggersOperation(operation);
        self
    }

    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field as server-assigned.
    #[must_use]
    pub const fn output_only(mut self) -> Self {
        self.output_only = true;
        self
    }

    /// Marks the field as defaulted by the server.
    #[must_use]
    pub const fn server_default(mut self) -> Self {
        self.server_default = true;
        self
    }

    /// Marks the field as an identity parameter.
    #[must_use]
    pub const fn parameter(mut self) -> Self {
        self.parameter = true;
        self
    }

    /// Transmits explicitly set zero values.
    #[must_use]
    pub const fn send_empty(mut self) -> Self {
        self.send_empty = true;
        self
    }

    /// Returns true if the user may supply this field in a request body.
    #[must_use]
    pub const fn is_input(&self) -> bool {
        !self.output_only
    }
}

/// A group of mutually exclusive fields.
#[derive(Debug, Clone, Copy)]
pub struct OneOf {
    /// Member field names.
    pub fields: &'static [&'static str],
    /// Exactly one member must be set.
    pub required: bool,
}

/// Schema of an object: its fields in declaration order plus oneof groups.
#[derive(Debug)]
pub struct ObjectSchema {
    /// Type name used in diagnostics.
    pub name: &'static str,
    /// Fields in diff order.
    pub fields: &'static [FieldSpec],
    /// Mutually exclusive groups.
    pub one_of: &'static [OneOf],
}

impl ObjectSchema {
    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static INNER: ObjectSchema = ObjectSchema {
        name: "Inner",
        fields: &[FieldSpec::text("key").required()],
        one_of: &[],
    };

    static OUTER: ObjectSchema = ObjectSchema {
        name: "Outer",
        fields: &[
            FieldSpec::scalar("name", Equivalence::SelfLink).recreate(),
            FieldSpec::text("version").triggers("UpdateOuter"),
            FieldSpec::object("inner", &INNER),
            FieldSpec::text("uid").output_only().recreate(),
        ],
        one_of: &[],
    };

    #[test]
    fn test_builder_flags() {
        let version = OUTER.field("version").expect("version field");
        assert_eq!(
            version.selector,
            OperationSelector::TriggersOperation("UpdateOuter")
        );
        assert!(!version.required);

        let uid = OUTER.field("uid").expect("uid field");
        assert!(uid.output_only);
        assert!(!uid.is_input());
        assert_eq!(uid.selector, OperationSelector::RequiresRecreate);

        assert!(OUTER.field("missing").is_none());
    }

    #[test]
    fn test_nested_schema_reference() {
        let inner = OUTER.field("inner").expect("inner field");
        match inner.kind {
            FieldKind::Object(schema) => assert_eq!(schema.name, "Inner"),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(OperationSelector::RequiresRecreate.to_string(), "recreate");
        assert_eq!(
            OperationSelector::TriggersOperation("UpdateAzureCluster").to_string(),
            "UpdateAzureCluster"
        );
    }
}

//! Field metadata for resource trees.
//!
//! This module is the schema collaborator of the engine:
//! - [`FieldSpec`] / [`ObjectSchema`] tables declaring selectors, equivalence
//!   rules and flags per field
//! - tri-state values ([`Block`], [`Presence`]) separating "absent" from
//!   "present but empty"
//! - validation of raw desired input

mod field;
mod validate;
mod value;

pub use field::{Equivalence, FieldKind, FieldSpec, ObjectSchema, OneOf, OperationSelector};
pub use validate::validate;
pub use value::{
    Block, Presence, equivalent, is_unset, is_zero, last_segment, presence, self_link_matches,
};

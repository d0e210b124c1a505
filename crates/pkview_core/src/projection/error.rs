//! Projection, reverse projection and reference repair errors.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ProjectionResult<T> = Result<T, ProjectionError>;

/// Schema or graph defects detected while walking an object graph.
///
/// None of these are transient; callers surface them unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// No map is registered for the domain type.
    NoMappingForType(String),
    /// A map names a property the object (or map) does not have.
    UnknownProperty { type_name: String, property: String },
    /// An owned-property chain reaches an object that is still being walked.
    CyclicOwnership { type_name: String, path: String },
    /// A reference targets a type whose map declares no identity property.
    MissingReferenceId { type_name: String, property: String },
    /// A referenced object carries no usable identity key value.
    MissingIdentityKey { type_name: String, property: String },
    /// Value shape disagrees with the property definition.
    ShapeMismatch {
        type_name: String,
        property: String,
        expected: &'static str,
    },
    /// Two distinct objects of one authoritative collection share a key.
    DuplicateIdentityKey { type_name: String, key: String },
    /// An edit refers to a key absent from the live model.
    UnresolvedReference {
        type_name: String,
        property: String,
        key: String,
    },
    /// An edit document is not shaped like a projected object.
    InvalidPatch { path: String, reason: String },
}

impl Display for ProjectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMappingForType(type_name) => {
                write!(f, "no projection map registered for type `{type_name}`")
            }
            Self::UnknownProperty {
                type_name,
                property,
            } => write!(f, "type `{type_name}` has no property `{property}`"),
            Self::CyclicOwnership { type_name, path } => write!(
                f,
                "cyclic ownership: `{type_name}` is reachable from itself via `{path}`"
            ),
            Self::MissingReferenceId {
                type_name,
                property,
            } => write!(
                f,
                "property `{property}` references type `{type_name}`, which declares no ReferenceIDProperty"
            ),
            Self::MissingIdentityKey {
                type_name,
                property,
            } => write!(
                f,
                "object of type `{type_name}` has no identity key in `{property}`"
            ),
            Self::ShapeMismatch {
                type_name,
                property,
                expected,
            } => write!(
                f,
                "property `{type_name}.{property}` does not hold {expected}"
            ),
            Self::DuplicateIdentityKey { type_name, key } => write!(
                f,
                "identity key `{key}` is shared by two `{type_name}` objects in the model"
            ),
            Self::UnresolvedReference {
                type_name,
                property,
                key,
            } => write!(
                f,
                "property `{property}` refers to unknown `{type_name}` with key `{key}`"
            ),
            Self::InvalidPatch { path, reason } => {
                write!(f, "invalid edit at `{path}`: {reason}")
            }
        }
    }
}

impl Error for ProjectionError {}

//! Detached snapshot codec for domain object graphs.
//!
//! # Responsibility
//! - Capture a live graph into a versioned, storage-friendly JSON envelope.
//! - Restore an envelope into a fresh graph.
//!
//! # Invariants
//! - Capture follows map-declared properties only; unmapped properties and
//!   the back-pointers they carry are not stored.
//! - Owned objects are written as full copies; aliasing is not preserved.
//! - Referenced objects are written as stubs holding only their identity
//!   property. Restored graphs must be repaired before use.
//! - Capture fails when owned edges loop back instead of recursing forever.

use crate::graph::object::{DomainObject, ObjectRef, PropertyValue};
use crate::projection::error::ProjectionError;
use crate::projection::identity::map_for;
use crate::schema::map::{ProjectionMap, PropertyDefinition};
use crate::schema::registry::MapRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Envelope version written by this binary.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Versioned snapshot envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    /// Unix epoch milliseconds at capture time.
    pub saved_at_ms: i64,
    pub root: SnapshotObject,
}

/// Detached copy of one domain object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotObject {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, SnapshotValue>,
}

/// Tagged property payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotValue {
    Value { value: Value },
    Object { object: SnapshotObject },
    Objects { objects: Vec<SnapshotObject> },
    Empty,
}

impl Snapshot {
    /// Captures `root` through the maps in `registry`.
    ///
    /// # Errors
    /// - Returns [`SnapshotError::Unmapped`] when the root or a nested
    ///   object has no usable map.
    /// - Returns [`SnapshotError::Cycle`] when an owned object is reachable
    ///   from itself.
    pub fn capture(registry: &MapRegistry, root: &ObjectRef) -> Result<Self, SnapshotError> {
        let map = registry.get_map(&root.type_name())?;
        let mut capture = Capture {
            registry,
            active: HashSet::new(),
        };
        let root = capture.object(root, map)?;
        Ok(Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved_at_ms: now_epoch_ms(),
            root,
        })
    }

    /// Rebuilds a fresh graph of detached objects.
    ///
    /// # Errors
    /// - Returns [`SnapshotError::UnsupportedVersion`] for unknown envelopes.
    pub fn restore(&self) -> Result<ObjectRef, SnapshotError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.format_version,
                supported: SNAPSHOT_FORMAT_VERSION,
            });
        }
        Ok(restore_object(&self.root))
    }

    pub fn root_type(&self) -> &str {
        &self.root.type_name
    }

    pub fn to_json_string(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(SnapshotError::Encode)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(raw).map_err(SnapshotError::Decode)
    }
}

struct Capture<'r> {
    registry: &'r MapRegistry,
    /// Objects on the current owned chain.
    active: HashSet<usize>,
}

impl Capture<'_> {
    fn object(
        &mut self,
        object: &ObjectRef,
        map: &ProjectionMap,
    ) -> Result<SnapshotObject, SnapshotError> {
        if !self.active.insert(object.addr()) {
            return Err(SnapshotError::Cycle(object.type_name()));
        }
        let result = self.properties(object, map);
        self.active.remove(&object.addr());

        Ok(SnapshotObject {
            type_name: object.type_name(),
            properties: result?,
        })
    }

    fn properties(
        &mut self,
        object: &ObjectRef,
        map: &ProjectionMap,
    ) -> Result<BTreeMap<String, SnapshotValue>, SnapshotError> {
        let mut properties = BTreeMap::new();
        for property in map.properties() {
            // Absent properties stay absent; projection reports them.
            let Some(value) = object.get(&property.name) else {
                continue;
            };
            let captured = self.value(property, value)?;
            properties.insert(property.name.clone(), captured);
        }
        Ok(properties)
    }

    fn value(
        &mut self,
        property: &PropertyDefinition,
        value: PropertyValue,
    ) -> Result<SnapshotValue, SnapshotError> {
        let Some(declared) = property.type_name.as_deref() else {
            return Ok(match value {
                PropertyValue::Value(value) => SnapshotValue::Value { value },
                // Objects under a primitive property are unmapped edges.
                _ => SnapshotValue::Empty,
            });
        };

        match value {
            PropertyValue::Value(value) => Ok(SnapshotValue::Value { value }),
            PropertyValue::Empty => Ok(SnapshotValue::Empty),
            PropertyValue::Object(child) => Ok(SnapshotValue::Object {
                object: self.child(property, declared, &child)?,
            }),
            PropertyValue::Objects(children) => Ok(SnapshotValue::Objects {
                objects: children
                    .iter()
                    .map(|child| self.child(property, declared, child))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
        }
    }

    fn child(
        &mut self,
        property: &PropertyDefinition,
        declared: &str,
        child: &ObjectRef,
    ) -> Result<SnapshotObject, SnapshotError> {
        let map = map_for(self.registry, child, declared)?;
        if property.is_reference {
            return Ok(reference_stub(child, map));
        }
        self.object(child, map)
    }
}

fn reference_stub(object: &ObjectRef, map: &ProjectionMap) -> SnapshotObject {
    let mut properties = BTreeMap::new();
    if let Some(id_property) = map.reference_id_property() {
        if let Some(PropertyValue::Value(value)) = object.get(id_property) {
            properties.insert(id_property.to_string(), SnapshotValue::Value { value });
        }
    }
    SnapshotObject {
        type_name: object.type_name(),
        properties,
    }
}

fn restore_object(snapshot: &SnapshotObject) -> ObjectRef {
    let mut object = DomainObject::new(snapshot.type_name.clone());
    for (name, value) in &snapshot.properties {
        let restored = match value {
            SnapshotValue::Value { value } => PropertyValue::Value(value.clone()),
            SnapshotValue::Object { object } => PropertyValue::Object(restore_object(object)),
            SnapshotValue::Objects { objects } => {
                PropertyValue::Objects(objects.iter().map(restore_object).collect())
            }
            SnapshotValue::Empty => PropertyValue::Empty,
        };
        object.set(name.clone(), restored);
    }
    object.into_ref()
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Snapshot capture/restore errors.
#[derive(Debug)]
pub enum SnapshotError {
    /// Owned object of the named type is reachable from itself.
    Cycle(String),
    /// Part of the graph cannot be captured through the registered maps.
    Unmapped(ProjectionError),
    UnsupportedVersion {
        found: u32,
        supported: u32,
    },
    Encode(serde_json::Error),
    Decode(serde_json::Error),
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cycle(type_name) => {
                write!(f, "cannot snapshot cyclic graph: `{type_name}` reaches itself")
            }
            Self::Unmapped(err) => write!(f, "cannot snapshot graph: {err}"),
            Self::UnsupportedVersion { found, supported } => write!(
                f,
                "snapshot format version {found} is not supported (expected {supported})"
            ),
            Self::Encode(err) => write!(f, "failed to encode snapshot: {err}"),
            Self::Decode(err) => write!(f, "failed to decode snapshot: {err}"),
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Encode(err) | Self::Decode(err) => Some(err),
            Self::Unmapped(err) => Some(err),
            Self::Cycle(_) | Self::UnsupportedVersion { .. } => None,
        }
    }
}

impl From<ProjectionError> for SnapshotError {
    fn from(value: ProjectionError) -> Self {
        Self::Unmapped(value)
    }
}

//! Schema-driven projection of object graphs into JSON trees.
//!
//! # Responsibility
//! - Walk a root object through its projection maps and emit a JSON tree.
//! - Emit identity markers for references instead of embedding them.
//!
//! # Invariants
//! - The input graph is only read.
//! - Object keys follow declared property order after the `$class` tag.
//! - Array properties always project to arrays, empty ones included.
//! - An owned chain that revisits an active object fails with
//!   `CyclicOwnership` instead of recursing.

use crate::graph::object::{ObjectRef, PropertyValue};
use crate::projection::error::{ProjectionError, ProjectionResult};
use crate::projection::identity::{identity_key, map_for, reference_marker, CLASS_KEY};
use crate::schema::map::{ProjectionMap, PropertyDefinition};
use crate::schema::registry::MapRegistry;
use log::debug;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Stateless projection front-end bound to one registry.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionEngine<'r> {
    registry: &'r MapRegistry,
}

impl<'r> ProjectionEngine<'r> {
    pub fn new(registry: &'r MapRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r MapRegistry {
        self.registry
    }

    /// Projects `root` into a JSON tree.
    ///
    /// # Errors
    /// - `NoMappingForType` when the root or a nested type has no map.
    /// - `UnknownProperty` when an object lacks a mapped property.
    /// - `CyclicOwnership` when owned edges loop back to an active object.
    /// - `MissingReferenceId`/`MissingIdentityKey` for unresolvable references.
    /// - `ShapeMismatch` when a value disagrees with its definition.
    pub fn to_json(&self, root: &ObjectRef) -> ProjectionResult<Value> {
        let started_at = Instant::now();
        let root_type = root.type_name();
        let map = self.registry.get_map(&root_type)?;

        let mut walk = Walk::default();
        let projected = walk.object(self.registry, root, map, &root_type)?;

        debug!(
            "event=projection module=projection status=ok root_type={} objects={} duration_ms={}",
            root_type,
            walk.projected_count,
            started_at.elapsed().as_millis()
        );
        Ok(projected)
    }
}

/// Per-call traversal state.
#[derive(Default)]
struct Walk {
    /// Objects on the current owned chain.
    active: HashSet<usize>,
    /// Fully projected objects that carry an identity key.
    emitted: HashMap<usize, String>,
    path: Vec<String>,
    projected_count: usize,
}

impl Walk {
    fn object(
        &mut self,
        registry: &MapRegistry,
        object: &ObjectRef,
        map: &ProjectionMap,
        segment: &str,
    ) -> ProjectionResult<Value> {
        let addr = object.addr();
        if self.active.contains(&addr) {
            return Err(ProjectionError::CyclicOwnership {
                type_name: map.source_type().to_string(),
                path: self.path_with(segment),
            });
        }
        if let Some(key) = self.emitted.get(&addr) {
            return Ok(reference_marker(key, map));
        }

        self.active.insert(addr);
        self.path.push(segment.to_string());
        let result = self.fields(registry, object, map);
        self.path.pop();
        self.active.remove(&addr);
        let fields = result?;

        if map.reference_id_property().is_some() {
            if let Ok(key) = identity_key(object, map, segment) {
                self.emitted.insert(addr, key);
            }
        }
        self.projected_count += 1;
        Ok(Value::Object(fields))
    }

    fn fields(
        &mut self,
        registry: &MapRegistry,
        object: &ObjectRef,
        map: &ProjectionMap,
    ) -> ProjectionResult<Map<String, Value>> {
        let mut fields = Map::new();
        fields.insert(
            CLASS_KEY.to_string(),
            Value::String(map.target_type().to_string()),
        );

        for property in map.properties() {
            let value = object
                .get(&property.name)
                .ok_or_else(|| ProjectionError::UnknownProperty {
                    type_name: map.source_type().to_string(),
                    property: property.name.clone(),
                })?;
            let projected = self.property(registry, map, property, value)?;
            fields.insert(property.target_name.clone(), projected);
        }
        Ok(fields)
    }

    fn property(
        &mut self,
        registry: &MapRegistry,
        owner: &ProjectionMap,
        property: &PropertyDefinition,
        value: PropertyValue,
    ) -> ProjectionResult<Value> {
        let Some(declared) = property.type_name.as_deref() else {
            return match value {
                PropertyValue::Value(value) => Ok(value),
                PropertyValue::Empty if property.is_array => Ok(Value::Array(Vec::new())),
                PropertyValue::Empty => Ok(Value::Null),
                PropertyValue::Object(_) | PropertyValue::Objects(_) => {
                    Err(shape_mismatch(owner, property, "a primitive value"))
                }
            };
        };

        let objects = match value {
            PropertyValue::Object(object) => vec![object],
            PropertyValue::Objects(objects) => objects,
            PropertyValue::Empty | PropertyValue::Value(Value::Null) => Vec::new(),
            PropertyValue::Value(Value::Array(items)) if items.is_empty() => Vec::new(),
            PropertyValue::Value(_) => {
                return Err(shape_mismatch(owner, property, "domain objects"));
            }
        };

        if !property.is_array && objects.len() > 1 {
            return Err(shape_mismatch(owner, property, "a single object"));
        }

        let mut projected = Vec::with_capacity(objects.len());
        for (position, object) in objects.iter().enumerate() {
            let map = map_for(registry, object, declared)?;
            let item = if property.is_reference {
                reference_marker(&identity_key(object, map, &property.name)?, map)
            } else {
                let segment = if property.is_array {
                    format!("{}[{position}]", property.name)
                } else {
                    property.name.clone()
                };
                self.object(registry, object, map, &segment)?
            };
            projected.push(item);
        }

        if property.is_array {
            Ok(Value::Array(projected))
        } else {
            Ok(projected.pop().unwrap_or(Value::Null))
        }
    }

    fn path_with(&self, segment: &str) -> String {
        let mut parts = self.path.clone();
        parts.push(segment.to_string());
        parts.join(".")
    }
}

fn shape_mismatch(
    owner: &ProjectionMap,
    property: &PropertyDefinition,
    expected: &'static str,
) -> ProjectionError {
    ProjectionError::ShapeMismatch {
        type_name: owner.source_type().to_string(),
        property: property.name.clone(),
        expected,
    }
}

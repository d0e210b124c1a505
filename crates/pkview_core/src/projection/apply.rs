//! Reverse projection: applying UI edits back onto the object graph.
//!
//! # Responsibility
//! - Accept edits shaped like projected JSON and write them onto the graph.
//! - Resolve edited references against the root's live model.
//!
//! # Invariants
//! - The whole edit is validated before any property is written; a failing
//!   edit leaves the graph untouched.
//! - `ReadOnly` properties are never written.
//! - Owned sub-objects are edited in place, never replaced or resized.
//! - A projected document applied back onto its own graph succeeds.

use crate::graph::object::{ObjectRef, PropertyValue};
use crate::projection::engine::ProjectionEngine;
use crate::projection::error::{ProjectionError, ProjectionResult};
use crate::projection::identity::{map_for, marker_key, CLASS_KEY, REF_KEY};
use crate::remap::index::AuthoritativeIndex;
use crate::schema::map::{ProjectionMap, PropertyDefinition};
use crate::schema::registry::MapRegistry;
use log::info;
use serde_json::Value;

/// Outcome of one applied edit document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplyReport {
    /// Dotted target-name paths that were written.
    pub updated: Vec<String>,
    /// Dotted target-name paths ignored because they are read-only.
    pub skipped_read_only: Vec<String>,
}

struct PendingWrite {
    object: ObjectRef,
    property: String,
    value: PropertyValue,
}

struct Planner<'a> {
    registry: &'a MapRegistry,
    index: Option<&'a AuthoritativeIndex>,
    writes: Vec<PendingWrite>,
    report: ApplyReport,
}

impl<'r> ProjectionEngine<'r> {
    /// Applies `patch` onto `root`.
    ///
    /// `patch` uses projected keys (`TargetName`s). Reference values may be
    /// markers (`{"$ref": key}`) or bare keys.
    ///
    /// # Errors
    /// - `UnknownProperty` for keys the map does not project.
    /// - `UnresolvedReference` for keys absent from the live model.
    /// - `InvalidPatch` for documents that do not match the projected shape.
    pub fn apply_json(&self, root: &ObjectRef, patch: &Value) -> ProjectionResult<ApplyReport> {
        let registry = self.registry();
        let root_type = root.type_name();
        let map = registry.get_map(&root_type)?;
        let index = model_index(registry, root, map)?;

        let mut planner = Planner {
            registry,
            index: index.as_ref(),
            writes: Vec::new(),
            report: ApplyReport::default(),
        };
        planner.object(root, map, patch, &root_type)?;

        for write in planner.writes {
            write.object.set(write.property, write.value);
        }
        info!(
            "event=apply_edits module=projection status=ok root_type={} updated={} skipped_read_only={}",
            root_type,
            planner.report.updated.len(),
            planner.report.skipped_read_only.len()
        );
        Ok(planner.report)
    }
}

fn model_index(
    registry: &MapRegistry,
    root: &ObjectRef,
    map: &ProjectionMap,
) -> ProjectionResult<Option<AuthoritativeIndex>> {
    let Some(model_property) = map.model_property() else {
        return Ok(None);
    };
    let model = root
        .get(model_property)
        .and_then(|value| value.objects().into_iter().next());
    match model {
        Some(model) => AuthoritativeIndex::build(registry, &model).map(Some),
        None => Ok(None),
    }
}

impl Planner<'_> {
    fn object(
        &mut self,
        object: &ObjectRef,
        map: &ProjectionMap,
        patch: &Value,
        path: &str,
    ) -> ProjectionResult<()> {
        let Value::Object(fields) = patch else {
            return Err(invalid(path, "expected an object"));
        };

        for (key, value) in fields {
            if key == CLASS_KEY {
                if value.as_str() != Some(map.target_type()) {
                    return Err(invalid(
                        path,
                        &format!("`$class` does not match `{}`", map.target_type()),
                    ));
                }
                continue;
            }
            if key == REF_KEY {
                continue;
            }

            let property = map.property_by_target(key).ok_or_else(|| {
                ProjectionError::UnknownProperty {
                    type_name: map.source_type().to_string(),
                    property: key.clone(),
                }
            })?;
            let property_path = format!("{path}.{key}");
            if property.read_only {
                self.report.skipped_read_only.push(property_path);
                continue;
            }

            match property.type_name.as_deref() {
                None => {
                    self.writes.push(PendingWrite {
                        object: object.clone(),
                        property: property.name.clone(),
                        value: PropertyValue::Value(value.clone()),
                    });
                    self.report.updated.push(property_path);
                }
                Some(declared) if property.is_reference => {
                    let resolved = self.references(property, declared, value, &property_path)?;
                    self.writes.push(PendingWrite {
                        object: object.clone(),
                        property: property.name.clone(),
                        value: resolved,
                    });
                    self.report.updated.push(property_path);
                }
                Some(declared) => {
                    self.owned(object, map, property, declared, value, &property_path)?;
                }
            }
        }
        Ok(())
    }

    fn references(
        &self,
        property: &PropertyDefinition,
        declared: &str,
        value: &Value,
        path: &str,
    ) -> ProjectionResult<PropertyValue> {
        let items: Vec<&Value> = match value {
            Value::Null => Vec::new(),
            Value::Array(items) if property.is_array => items.iter().collect(),
            Value::Array(_) => return Err(invalid(path, "expected a single reference")),
            single if !property.is_array => vec![single],
            _ => return Err(invalid(path, "expected an array of references")),
        };

        let mut live = Vec::with_capacity(items.len());
        for item in items {
            let key = marker_key(item).ok_or_else(|| invalid(path, "expected a reference"))?;
            let index = self
                .index
                .ok_or_else(|| invalid(path, "no model is attached to resolve references"))?;
            let found = index.lookup(declared, &key).ok_or_else(|| {
                ProjectionError::UnresolvedReference {
                    type_name: declared.to_string(),
                    property: property.name.clone(),
                    key: key.clone(),
                }
            })?;
            live.push(found.clone());
        }

        if property.is_array {
            Ok(PropertyValue::Objects(live))
        } else {
            Ok(live
                .into_iter()
                .next()
                .map_or(PropertyValue::Empty, PropertyValue::Object))
        }
    }

    fn owned(
        &mut self,
        object: &ObjectRef,
        map: &ProjectionMap,
        property: &PropertyDefinition,
        declared: &str,
        value: &Value,
        path: &str,
    ) -> ProjectionResult<()> {
        let children = object
            .get(&property.name)
            .ok_or_else(|| ProjectionError::UnknownProperty {
                type_name: map.source_type().to_string(),
                property: property.name.clone(),
            })?
            .objects();

        let edits: Vec<&Value> = match value {
            // Projected shape of an absent single object.
            Value::Null if !property.is_array && children.is_empty() => return Ok(()),
            Value::Array(items) if property.is_array => items.iter().collect(),
            Value::Object(_) if !property.is_array => vec![value],
            _ if property.is_array => return Err(invalid(path, "expected an array")),
            _ => return Err(invalid(path, "expected an object")),
        };
        if edits.len() != children.len() {
            return Err(ProjectionError::ShapeMismatch {
                type_name: map.source_type().to_string(),
                property: property.name.clone(),
                expected: "one edit per existing element",
            });
        }

        for (position, (child, edit)) in children.iter().zip(edits).enumerate() {
            let child_map = map_for(self.registry, child, declared)?;
            let child_path = if property.is_array {
                format!("{path}[{position}]")
            } else {
                path.to_string()
            };
            self.object(child, child_map, edit, &child_path)?;
        }
        Ok(())
    }
}

fn invalid(path: &str, reason: &str) -> ProjectionError {
    ProjectionError::InvalidPatch {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

//! Post-load reference repair.
//!
//! # Responsibility
//! - Re-bind reference properties of a reloaded root onto the live objects
//!   owned by its model, matching by identity key.
//!
//! # Invariants
//! - Elements are always re-resolved by key; pointer equality is never
//!   trusted, since restored snapshots hold detached copies.
//! - Elements whose key is absent from the model are dropped, never fatal.
//! - Relative order of surviving elements is preserved; repeated keys keep
//!   the first occurrence.
//! - An absent or empty model leaves the root untouched.
//! - Must not run concurrently on the same root.

use crate::graph::object::{ObjectRef, PropertyValue};
use crate::projection::error::{ProjectionError, ProjectionResult};
use crate::projection::identity::{identity_key, map_for};
use crate::remap::index::AuthoritativeIndex;
use crate::schema::map::PropertyDefinition;
use crate::schema::registry::MapRegistry;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashSet;

/// Why repair did not touch the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairSkip {
    /// The root map declares no `ModelProperty`.
    NoModelProperty,
    /// The model property holds no object.
    ModelAbsent,
}

/// Outcome for one repaired reference property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRepair {
    pub property: String,
    pub kept: usize,
    pub dropped: usize,
}

/// Outcome of one repair pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepairReport {
    pub skipped: Option<RepairSkip>,
    pub properties: Vec<PropertyRepair>,
}

impl RepairReport {
    fn skipped(reason: RepairSkip) -> Self {
        Self {
            skipped: Some(reason),
            properties: Vec::new(),
        }
    }

    /// Total number of dropped elements across all properties.
    pub fn dropped(&self) -> usize {
        self.properties.iter().map(|repair| repair.dropped).sum()
    }
}

/// Reference repair front-end bound to one registry.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceResolver<'r> {
    registry: &'r MapRegistry,
}

impl<'r> ReferenceResolver<'r> {
    pub fn new(registry: &'r MapRegistry) -> Self {
        Self { registry }
    }

    /// Repairs every reference property of `root` in declared order.
    ///
    /// # Errors
    /// - `NoMappingForType` when the root type has no map.
    /// - `UnknownProperty` when the root lacks its declared model property.
    /// - `DuplicateIdentityKey` when the model holds two objects with one key.
    pub fn repair(&self, root: &ObjectRef) -> ProjectionResult<RepairReport> {
        let root_type = root.type_name();
        let map = self.registry.get_map(&root_type)?;
        let Some(model_property) = map.model_property() else {
            debug!(
                "event=reference_repair module=remap status=skipped reason=no_model_property root_type={}",
                root_type
            );
            return Ok(RepairReport::skipped(RepairSkip::NoModelProperty));
        };

        let Some(model) = model_object(root, &root_type, model_property)? else {
            info!(
                "event=reference_repair module=remap status=skipped reason=model_absent root_type={}",
                root_type
            );
            return Ok(RepairReport::skipped(RepairSkip::ModelAbsent));
        };

        let index = AuthoritativeIndex::build(self.registry, &model)?;
        let mut report = RepairReport::default();
        for property in map.reference_properties() {
            if let Some(repair) = self.repair_property(root, property, &index)? {
                report.properties.push(repair);
            }
        }

        let dropped = report.dropped();
        if dropped > 0 {
            warn!(
                "event=reference_repair module=remap status=ok root_type={} properties={} dropped={}",
                root_type,
                report.properties.len(),
                dropped
            );
        } else {
            info!(
                "event=reference_repair module=remap status=ok root_type={} properties={} dropped=0",
                root_type,
                report.properties.len()
            );
        }
        Ok(report)
    }

    fn repair_property(
        &self,
        root: &ObjectRef,
        property: &PropertyDefinition,
        index: &AuthoritativeIndex,
    ) -> ProjectionResult<Option<PropertyRepair>> {
        let Some(declared) = property.type_name.as_deref() else {
            return Ok(None);
        };
        let stale = match root.get(&property.name) {
            None | Some(PropertyValue::Empty) | Some(PropertyValue::Value(Value::Null)) => {
                return Ok(None);
            }
            Some(PropertyValue::Value(Value::Array(items))) if items.is_empty() => {
                return Ok(None);
            }
            Some(PropertyValue::Value(_)) => {
                return Err(ProjectionError::ShapeMismatch {
                    type_name: root.type_name(),
                    property: property.name.clone(),
                    expected: "domain objects",
                });
            }
            Some(value) => value.objects(),
        };

        let mut seen = HashSet::new();
        let mut live = Vec::with_capacity(stale.len());
        for element in &stale {
            let Some(key) = self.element_key(element, declared, &property.name)? else {
                continue;
            };
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Some(found) = index.lookup(declared, &key) {
                live.push(found.clone());
            } else {
                debug!(
                    "event=reference_repair module=remap status=dropped property={} key={}",
                    property.name, key
                );
            }
        }

        let repair = PropertyRepair {
            property: property.name.clone(),
            kept: live.len(),
            dropped: stale.len() - live.len(),
        };
        let repaired = if property.is_array {
            PropertyValue::Objects(live)
        } else {
            live.into_iter()
                .next()
                .map_or(PropertyValue::Empty, PropertyValue::Object)
        };
        root.set(property.name.clone(), repaired);
        Ok(Some(repair))
    }

    fn element_key(
        &self,
        element: &ObjectRef,
        declared: &str,
        property: &str,
    ) -> ProjectionResult<Option<String>> {
        let map = map_for(self.registry, element, declared)?;
        match identity_key(element, map, property) {
            Ok(key) => Ok(Some(key)),
            Err(ProjectionError::MissingIdentityKey { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn model_object(
    root: &ObjectRef,
    root_type: &str,
    model_property: &str,
) -> ProjectionResult<Option<ObjectRef>> {
    match root.get(model_property) {
        None => Err(ProjectionError::UnknownProperty {
            type_name: root_type.to_string(),
            property: model_property.to_string(),
        }),
        Some(value) => Ok(value.objects().into_iter().next()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ReferenceResolver, RepairSkip};
    use crate::graph::object::{DomainObject, ObjectRef, PropertyValue};
    use crate::schema::definition::{MapDefinition, PropertyDefinitionSpec};
    use crate::schema::registry::MapRegistry;
    use serde_json::json;

    fn registry() -> MapRegistry {
        let mut model = PropertyDefinitionSpec::named("ModelObj");
        model.type_name = Some("Model".to_string());
        let mut target = PropertyDefinitionSpec::named("Target");
        target.type_name = Some("Species".to_string());
        target.is_reference = true;
        let mut species = PropertyDefinitionSpec::named("Species");
        species.type_name = Some("Species".to_string());
        species.is_array = true;

        MapRegistry::from_definitions(vec![
            (
                "analysis.json".to_string(),
                MapDefinition {
                    source_type: "Analysis".to_string(),
                    target_type: "Analysis".to_string(),
                    reference_id_property: None,
                    model_property: Some("ModelObj".to_string()),
                    properties: vec![model, target],
                },
            ),
            (
                "model.json".to_string(),
                MapDefinition {
                    source_type: "Model".to_string(),
                    target_type: "Model".to_string(),
                    reference_id_property: None,
                    model_property: None,
                    properties: vec![species],
                },
            ),
            (
                "species.json".to_string(),
                MapDefinition {
                    source_type: "Species".to_string(),
                    target_type: "Species".to_string(),
                    reference_id_property: Some("SessionID".to_string()),
                    model_property: None,
                    properties: vec![],
                },
            ),
        ])
        .expect("registry")
    }

    fn species(key: &str) -> ObjectRef {
        DomainObject::new("Species")
            .with("SessionID", json!(key))
            .into_ref()
    }

    #[test]
    fn scalar_reference_is_rebound_or_cleared() {
        let registry = registry();
        let live = species("S1");
        let model = DomainObject::new("Model")
            .with("Species", vec![live.clone()])
            .into_ref();
        let root = DomainObject::new("Analysis")
            .with("ModelObj", model)
            .with("Target", species("S1"))
            .into_ref();

        let report = ReferenceResolver::new(&registry)
            .repair(&root)
            .expect("repair");
        assert_eq!(report.dropped(), 0);
        match root.get("Target") {
            Some(PropertyValue::Object(target)) => assert!(target.ptr_eq(&live)),
            other => panic!("unexpected target: {other:?}"),
        }

        root.set("Target", species("gone"));
        let report = ReferenceResolver::new(&registry)
            .repair(&root)
            .expect("repair");
        assert_eq!(report.dropped(), 1);
        assert!(matches!(root.get("Target"), Some(PropertyValue::Empty)));
    }

    #[test]
    fn missing_model_is_skipped() {
        let registry = registry();
        let stale = species("S1");
        let root = DomainObject::new("Analysis")
            .with_empty("ModelObj")
            .with("Target", stale.clone())
            .into_ref();

        let report = ReferenceResolver::new(&registry)
            .repair(&root)
            .expect("repair");
        assert_eq!(report.skipped, Some(RepairSkip::ModelAbsent));
        match root.get("Target") {
            Some(PropertyValue::Object(target)) => assert!(target.ptr_eq(&stale)),
            other => panic!("unexpected target: {other:?}"),
        }
    }
}

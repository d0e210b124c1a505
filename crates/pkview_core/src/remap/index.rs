//! Authoritative identity index over a live model.

use crate::graph::object::ObjectRef;
use crate::projection::error::{ProjectionError, ProjectionResult};
use crate::projection::identity::{identity_key, map_for};
use crate::schema::map::ProjectionMap;
use crate::schema::registry::MapRegistry;
use std::collections::{BTreeMap, HashSet};

/// Identity-keyed lookup of every keyed object owned by one model.
///
/// Objects are bucketed under their own map type and, when different, under
/// the `Type` declared by the property that owns them.
#[derive(Debug, Default)]
pub struct AuthoritativeIndex {
    buckets: BTreeMap<String, BTreeMap<String, ObjectRef>>,
}

impl AuthoritativeIndex {
    /// Walks `model` through owned, typed properties and indexes keyed objects.
    ///
    /// # Errors
    /// - `DuplicateIdentityKey` when two distinct objects in one bucket share
    ///   a key. Reaching the same object twice is not a duplicate.
    /// - `CyclicOwnership` when owned edges loop back to an active object.
    /// - Map lookup errors for unmapped types.
    pub fn build(registry: &MapRegistry, model: &ObjectRef) -> ProjectionResult<Self> {
        let mut index = Self::default();
        let model_type = model.type_name();
        let map = registry.get_map(&model_type)?;
        let mut active = HashSet::new();
        let mut visited = HashSet::new();
        index.visit(
            registry,
            model,
            map,
            &model_type,
            &mut active,
            &mut visited,
        )?;
        Ok(index)
    }

    fn visit(
        &mut self,
        registry: &MapRegistry,
        object: &ObjectRef,
        map: &ProjectionMap,
        declared: &str,
        active: &mut HashSet<usize>,
        visited: &mut HashSet<usize>,
    ) -> ProjectionResult<()> {
        let addr = object.addr();
        if active.contains(&addr) {
            return Err(ProjectionError::CyclicOwnership {
                type_name: map.source_type().to_string(),
                path: declared.to_string(),
            });
        }

        // Keyless objects cannot be referenced, so they are walked but not indexed.
        if let Ok(key) = identity_key(object, map, declared) {
            self.insert(map.source_type(), &key, object)?;
            if declared != map.source_type() {
                self.insert(declared, &key, object)?;
            }
        }
        if !visited.insert(addr) {
            return Ok(());
        }

        active.insert(addr);
        for property in map.properties() {
            let Some(nested) = property.type_name.as_deref() else {
                continue;
            };
            if property.is_reference {
                continue;
            }
            let children = object
                .get(&property.name)
                .map(|value| value.objects())
                .unwrap_or_default();
            for child in &children {
                let child_map = map_for(registry, child, nested)?;
                self.visit(registry, child, child_map, nested, active, visited)?;
            }
        }
        active.remove(&addr);
        Ok(())
    }

    fn insert(&mut self, type_name: &str, key: &str, object: &ObjectRef) -> ProjectionResult<()> {
        let bucket = self.buckets.entry(type_name.to_string()).or_default();
        match bucket.get(key) {
            Some(existing) if existing.ptr_eq(object) => Ok(()),
            Some(_) => Err(ProjectionError::DuplicateIdentityKey {
                type_name: type_name.to_string(),
                key: key.to_string(),
            }),
            None => {
                bucket.insert(key.to_string(), object.clone());
                Ok(())
            }
        }
    }

    /// Returns the live object of `type_name` with identity `key`.
    pub fn lookup(&self, type_name: &str, key: &str) -> Option<&ObjectRef> {
        self.buckets.get(type_name)?.get(key)
    }

    /// Number of keyed objects indexed under `type_name`.
    pub fn count(&self, type_name: &str) -> usize {
        self.buckets.get(type_name).map_or(0, BTreeMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::AuthoritativeIndex;
    use crate::graph::object::DomainObject;
    use crate::projection::error::ProjectionError;
    use crate::schema::definition::{MapDefinition, PropertyDefinitionSpec};
    use crate::schema::registry::MapRegistry;
    use serde_json::json;

    fn registry() -> MapRegistry {
        let mut species = PropertyDefinitionSpec::named("Species");
        species.type_name = Some("Species".to_string());
        species.is_array = true;
        MapRegistry::from_definitions(vec![
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
                    properties: vec![PropertyDefinitionSpec::named("Name")],
                },
            ),
        ])
        .expect("registry")
    }

    fn species(key: &str) -> crate::graph::object::ObjectRef {
        DomainObject::new("Species")
            .with("SessionID", json!(key))
            .with("Name", json!(key))
            .into_ref()
    }

    #[test]
    fn indexes_owned_keyed_objects() {
        let registry = registry();
        let s1 = species("S1");
        let model = DomainObject::new("Model")
            .with("Species", vec![s1.clone(), species("S2")])
            .into_ref();

        let index = AuthoritativeIndex::build(&registry, &model).expect("index");
        assert_eq!(index.count("Species"), 2);
        assert!(index
            .lookup("Species", "S1")
            .expect("S1 indexed")
            .ptr_eq(&s1));
        assert!(index.lookup("Species", "S3").is_none());
    }

    #[test]
    fn same_object_twice_is_not_a_duplicate() {
        let registry = registry();
        let s1 = species("S1");
        let model = DomainObject::new("Model")
            .with("Species", vec![s1.clone(), s1])
            .into_ref();
        let index = AuthoritativeIndex::build(&registry, &model).expect("index");
        assert_eq!(index.count("Species"), 1);
    }

    #[test]
    fn distinct_objects_sharing_a_key_fail_fast() {
        let registry = registry();
        let model = DomainObject::new("Model")
            .with("Species", vec![species("S1"), species("S1")])
            .into_ref();
        let err = AuthoritativeIndex::build(&registry, &model).expect_err("duplicate ids");
        assert_eq!(
            err,
            ProjectionError::DuplicateIdentityKey {
                type_name: "Species".to_string(),
                key: "S1".to_string(),
            }
        );
    }
}

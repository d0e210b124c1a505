//! Resolved projection maps.
//!
//! # Responsibility
//! - Hold one validated, immutable schema per domain type.
//! - Answer property lookups in declared order.
//!
//! # Invariants
//! - `target_name` is always populated (defaults to `name`).
//! - Property order equals declaration order in the definition file.

use crate::projection::error::ProjectionError;
use crate::schema::definition::{MapDefinition, PropertyDefinitionSpec};
use crate::schema::registry::MapRegistry;
use std::collections::BTreeMap;

/// Resolved property definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub name: String,
    pub target_name: String,
    /// Nested domain type for object-valued properties.
    pub type_name: Option<String>,
    pub is_array: bool,
    pub is_reference: bool,
    pub read_only: bool,
}

impl PropertyDefinition {
    fn from_spec(spec: &PropertyDefinitionSpec) -> Self {
        let name = spec.name.trim().to_string();
        let target_name = spec
            .target_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map_or_else(|| name.clone(), str::to_string);
        Self {
            name,
            target_name,
            type_name: spec
                .type_name
                .as_deref()
                .map(|value| value.trim().to_string()),
            is_array: spec.is_array,
            is_reference: spec.is_reference,
            read_only: spec.read_only,
        }
    }

    /// Returns whether values are projected by recursing into owned objects.
    pub fn is_owned_object(&self) -> bool {
        self.type_name.is_some() && !self.is_reference
    }
}

/// Immutable schema for one domain type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionMap {
    source_type: String,
    target_type: String,
    reference_id_property: Option<String>,
    model_property: Option<String>,
    properties: Vec<PropertyDefinition>,
    index: BTreeMap<String, usize>,
}

impl ProjectionMap {
    /// Builds a map from an already validated definition.
    pub fn from_definition(definition: &MapDefinition) -> Self {
        let properties = definition
            .properties
            .iter()
            .map(PropertyDefinition::from_spec)
            .collect::<Vec<_>>();
        let index = properties
            .iter()
            .enumerate()
            .map(|(position, property)| (property.name.clone(), position))
            .collect();
        Self {
            source_type: definition.source_type.trim().to_string(),
            target_type: definition.target_type.trim().to_string(),
            reference_id_property: definition
                .reference_id_property
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            model_property: definition
                .model_property
                .as_deref()
                .map(|value| value.trim().to_string()),
            properties,
            index,
        }
    }

    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    /// Property holding the identity key, when this type can be referenced.
    pub fn reference_id_property(&self) -> Option<&str> {
        self.reference_id_property.as_deref()
    }

    pub fn model_property(&self) -> Option<&str> {
        self.model_property.as_deref()
    }

    /// Returns source property names in declared order.
    pub fn property_names(&self) -> Vec<&str> {
        self.properties
            .iter()
            .map(|property| property.name.as_str())
            .collect()
    }

    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    /// Returns the definition of one source property.
    pub fn property_definition(&self, name: &str) -> Result<&PropertyDefinition, ProjectionError> {
        self.index
            .get(name)
            .map(|position| &self.properties[*position])
            .ok_or_else(|| ProjectionError::UnknownProperty {
                type_name: self.source_type.clone(),
                property: name.to_string(),
            })
    }

    /// Looks a property up by its projected key.
    pub fn property_by_target(&self, target_name: &str) -> Option<&PropertyDefinition> {
        self.properties
            .iter()
            .find(|property| property.target_name == target_name)
    }

    /// Properties projected as identity references.
    pub fn reference_properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties
            .iter()
            .filter(|property| property.is_reference)
    }

    /// Resolves a nested type map through `registry`.
    pub fn nested_map<'r>(
        &self,
        registry: &'r MapRegistry,
        type_name: &str,
    ) -> Result<&'r ProjectionMap, ProjectionError> {
        registry.get_map(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::ProjectionMap;
    use crate::projection::error::ProjectionError;
    use crate::schema::definition::{MapDefinition, PropertyDefinitionSpec};

    fn species_map() -> ProjectionMap {
        let mut amount = PropertyDefinitionSpec::named("InitialAmount");
        amount.target_name = Some("initialAmount".to_string());
        let mut id = PropertyDefinitionSpec::named("SessionID");
        id.read_only = true;
        ProjectionMap::from_definition(&MapDefinition {
            source_type: "Species".to_string(),
            target_type: "PKSpecies".to_string(),
            reference_id_property: Some("SessionID".to_string()),
            model_property: None,
            properties: vec![PropertyDefinitionSpec::named("Name"), amount, id],
        })
    }

    #[test]
    fn keeps_declared_order() {
        assert_eq!(
            species_map().property_names(),
            vec!["Name", "InitialAmount", "SessionID"]
        );
    }

    #[test]
    fn target_name_defaults_to_name() {
        let map = species_map();
        assert_eq!(
            map.property_definition("Name").expect("Name").target_name,
            "Name"
        );
        assert_eq!(
            map.property_definition("InitialAmount")
                .expect("InitialAmount")
                .target_name,
            "initialAmount"
        );
        assert_eq!(
            map.property_by_target("initialAmount")
                .map(|property| property.name.as_str()),
            Some("InitialAmount")
        );
    }

    #[test]
    fn unknown_property_is_reported_with_type() {
        let err = species_map()
            .property_definition("Units")
            .expect_err("undeclared property must fail");
        assert_eq!(
            err,
            ProjectionError::UnknownProperty {
                type_name: "Species".to_string(),
                property: "Units".to_string(),
            }
        );
    }
}

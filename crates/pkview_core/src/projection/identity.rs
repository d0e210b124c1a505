//! Identity keys and reference markers.

use crate::graph::object::{ObjectRef, PropertyValue};
use crate::projection::error::{ProjectionError, ProjectionResult};
use crate::schema::map::ProjectionMap;
use crate::schema::registry::MapRegistry;
use serde_json::{json, Value};

/// Key carrying the projected class of every emitted object.
pub const CLASS_KEY: &str = "$class";
/// Key carrying the identity key inside a reference marker.
pub const REF_KEY: &str = "$ref";

/// Picks the map for `object`: its own type when registered, else `declared`.
pub fn map_for<'r>(
    registry: &'r MapRegistry,
    object: &ObjectRef,
    declared: &str,
) -> ProjectionResult<&'r ProjectionMap> {
    let actual = object.type_name();
    if registry.has_map(&actual) {
        return registry.get_map(&actual);
    }
    registry.get_map(declared)
}

/// Reads the identity key of `object` through `map`.
///
/// `via` names the property being resolved and is only used in diagnostics.
pub fn identity_key(
    object: &ObjectRef,
    map: &ProjectionMap,
    via: &str,
) -> ProjectionResult<String> {
    let Some(id_property) = map.reference_id_property() else {
        return Err(ProjectionError::MissingReferenceId {
            type_name: map.source_type().to_string(),
            property: via.to_string(),
        });
    };

    let key = match object.get(id_property) {
        Some(PropertyValue::Value(Value::String(text))) => text.trim().to_string(),
        Some(PropertyValue::Value(Value::Number(number))) => number.to_string(),
        _ => String::new(),
    };
    if key.is_empty() {
        return Err(ProjectionError::MissingIdentityKey {
            type_name: map.source_type().to_string(),
            property: id_property.to_string(),
        });
    }
    Ok(key)
}

/// Builds the projected stand-in for a referenced object.
pub fn reference_marker(key: &str, map: &ProjectionMap) -> Value {
    json!({
        REF_KEY: key,
        CLASS_KEY: map.target_type(),
    })
}

/// Extracts a key from a marker or a bare key string.
pub fn marker_key(value: &Value) -> Option<String> {
    match value {
        Value::String(key) if !key.trim().is_empty() => Some(key.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Object(fields) => fields.get(REF_KEY).and_then(marker_key),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{identity_key, marker_key, reference_marker};
    use crate::graph::object::DomainObject;
    use crate::projection::error::ProjectionError;
    use crate::schema::definition::{MapDefinition, PropertyDefinitionSpec};
    use crate::schema::map::ProjectionMap;
    use serde_json::json;

    fn dose_map(id: Option<&str>) -> ProjectionMap {
        ProjectionMap::from_definition(&MapDefinition {
            source_type: "Dose".to_string(),
            target_type: "PKDose".to_string(),
            reference_id_property: id.map(str::to_string),
            model_property: None,
            properties: vec![PropertyDefinitionSpec::named("Name")],
        })
    }

    #[test]
    fn reads_string_and_numeric_keys() {
        let map = dose_map(Some("SessionID"));
        let text = DomainObject::new("Dose")
            .with("SessionID", json!(" D1 "))
            .into_ref();
        let number = DomainObject::new("Dose")
            .with("SessionID", json!(42))
            .into_ref();

        assert_eq!(identity_key(&text, &map, "SelectedDoses").unwrap(), "D1");
        assert_eq!(identity_key(&number, &map, "SelectedDoses").unwrap(), "42");
    }

    #[test]
    fn blank_or_missing_keys_are_rejected() {
        let map = dose_map(Some("SessionID"));
        let blank = DomainObject::new("Dose")
            .with("SessionID", json!(""))
            .into_ref();
        let missing = DomainObject::new("Dose").into_ref();

        for object in [blank, missing] {
            let err = identity_key(&object, &map, "SelectedDoses").unwrap_err();
            assert!(matches!(err, ProjectionError::MissingIdentityKey { .. }));
        }
    }

    #[test]
    fn map_without_identity_property_is_a_configuration_defect() {
        let map = dose_map(None);
        let object = DomainObject::new("Dose").into_ref();
        let err = identity_key(&object, &map, "SelectedDoses").unwrap_err();
        assert_eq!(
            err,
            ProjectionError::MissingReferenceId {
                type_name: "Dose".to_string(),
                property: "SelectedDoses".to_string(),
            }
        );
    }

    #[test]
    fn markers_round_trip_through_marker_key() {
        let marker = reference_marker("D7", &dose_map(Some("SessionID")));
        assert_eq!(marker, json!({"$ref": "D7", "$class": "PKDose"}));
        assert_eq!(marker_key(&marker).as_deref(), Some("D7"));
        assert_eq!(marker_key(&json!("D8")).as_deref(), Some("D8"));
        assert_eq!(marker_key(&json!({"Name": "x"})), None);
    }
}

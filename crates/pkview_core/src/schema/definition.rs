//! Projection map definition file format and validation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid identifier regex"));
static TYPE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)*$").expect("valid type name regex")
});
static TARGET_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid target name regex"));

/// Declarative map definition, one per file.
///
/// Wire keys follow the historical definition format (`MATLABClass` for the
/// domain type, `JSClass` for the projected type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapDefinition {
    #[serde(rename = "MATLABClass")]
    pub source_type: String,
    #[serde(rename = "JSClass")]
    pub target_type: String,
    #[serde(
        rename = "ReferenceIDProperty",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_id_property: Option<String>,
    /// Owned property holding the authoritative model used by reference repair.
    #[serde(
        rename = "ModelProperty",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub model_property: Option<String>,
    #[serde(rename = "Properties")]
    pub properties: Vec<PropertyDefinitionSpec>,
}

/// One property entry as written in a definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyDefinitionSpec {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "TargetName", default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(rename = "IsArray", default)]
    pub is_array: bool,
    #[serde(rename = "IsReference", default)]
    pub is_reference: bool,
    #[serde(rename = "ReadOnly", default)]
    pub read_only: bool,
}

impl PropertyDefinitionSpec {
    /// Creates a primitive, owned, writable property entry.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_name: None,
            type_name: None,
            is_array: false,
            is_reference: false,
            read_only: false,
        }
    }
}

impl MapDefinition {
    /// Parses one definition document.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Validates single-definition invariants.
    ///
    /// Cross-definition checks (duplicate types, unresolved `Type`s, reference
    /// targets without identity keys) belong to the registry loader.
    pub fn validate(&self) -> Result<(), MapDefinitionError> {
        let source_type = self.source_type.trim();
        if source_type.is_empty() {
            return Err(MapDefinitionError::EmptySourceType);
        }
        if !TYPE_NAME_RE.is_match(source_type) {
            return Err(MapDefinitionError::InvalidTypeName(
                self.source_type.clone(),
            ));
        }
        if self.target_type.trim().is_empty() {
            return Err(MapDefinitionError::EmptyTargetType);
        }
        if !TYPE_NAME_RE.is_match(self.target_type.trim()) {
            return Err(MapDefinitionError::InvalidTypeName(
                self.target_type.clone(),
            ));
        }
        if let Some(id_property) = &self.reference_id_property {
            if !IDENTIFIER_RE.is_match(id_property.trim()) {
                return Err(MapDefinitionError::InvalidPropertyName(
                    id_property.clone(),
                ));
            }
        }

        let mut names = BTreeSet::<&str>::new();
        let mut target_names = BTreeSet::<&str>::new();
        for property in &self.properties {
            let name = property.name.trim();
            if name.is_empty() {
                return Err(MapDefinitionError::EmptyPropertyName);
            }
            if !IDENTIFIER_RE.is_match(name) {
                return Err(MapDefinitionError::InvalidPropertyName(
                    property.name.clone(),
                ));
            }
            if !names.insert(name) {
                return Err(MapDefinitionError::DuplicateProperty(name.to_string()));
            }

            let target = property.target_name.as_deref().map_or(name, str::trim);
            if !TARGET_NAME_RE.is_match(target) {
                return Err(MapDefinitionError::InvalidTargetName(target.to_string()));
            }
            if !target_names.insert(target) {
                return Err(MapDefinitionError::DuplicateTargetName(target.to_string()));
            }

            match property.type_name.as_deref().map(str::trim) {
                Some(type_name) if !TYPE_NAME_RE.is_match(type_name) => {
                    return Err(MapDefinitionError::InvalidTypeName(type_name.to_string()));
                }
                None if property.is_reference => {
                    return Err(MapDefinitionError::ReferenceWithoutType(name.to_string()));
                }
                _ => {}
            }
        }

        if let Some(model_property) = &self.model_property {
            let model_property = model_property.trim();
            let declared = self
                .properties
                .iter()
                .find(|property| property.name.trim() == model_property)
                .ok_or_else(|| MapDefinitionError::UnknownModelProperty(model_property.to_string()))?;
            if declared.type_name.is_none() || declared.is_reference || declared.is_array {
                return Err(MapDefinitionError::InvalidModelProperty(
                    model_property.to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Single-definition validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapDefinitionError {
    EmptySourceType,
    EmptyTargetType,
    InvalidTypeName(String),
    EmptyPropertyName,
    InvalidPropertyName(String),
    InvalidTargetName(String),
    DuplicateProperty(String),
    DuplicateTargetName(String),
    ReferenceWithoutType(String),
    UnknownModelProperty(String),
    InvalidModelProperty(String),
}

impl Display for MapDefinitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySourceType => write!(f, "MATLABClass must not be empty"),
            Self::EmptyTargetType => write!(f, "JSClass must not be empty"),
            Self::InvalidTypeName(value) => write!(f, "type name is invalid: {value}"),
            Self::EmptyPropertyName => write!(f, "property Name must not be empty"),
            Self::InvalidPropertyName(value) => write!(f, "property name is invalid: {value}"),
            Self::InvalidTargetName(value) => write!(f, "TargetName is invalid: {value}"),
            Self::DuplicateProperty(value) => write!(f, "property is declared twice: {value}"),
            Self::DuplicateTargetName(value) => {
                write!(f, "TargetName is used by two properties: {value}")
            }
            Self::ReferenceWithoutType(value) => {
                write!(f, "reference property has no Type: {value}")
            }
            Self::UnknownModelProperty(value) => {
                write!(f, "ModelProperty names an undeclared property: {value}")
            }
            Self::InvalidModelProperty(value) => write!(
                f,
                "ModelProperty must name an owned, typed, scalar property: {value}"
            ),
        }
    }
}

impl Error for MapDefinitionError {}

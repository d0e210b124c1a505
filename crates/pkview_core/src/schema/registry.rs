//! Map registry and directory loader.
//!
//! # Responsibility
//! - Load every map definition in a directory into one lookup.
//! - Reject the whole directory when any definition is malformed.
//!
//! # Invariants
//! - Loading is all-or-nothing; a partially valid registry is never returned.
//! - Every declared `Type` resolves to a registered map.
//! - Every reference target declares a `ReferenceIDProperty`.
//! - The registry is immutable after construction and `Send + Sync`.

use crate::projection::error::ProjectionError;
use crate::schema::definition::{MapDefinition, MapDefinitionError};
use crate::schema::map::ProjectionMap;
use log::{error, info};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

const DEFINITION_EXTENSION: &str = "json";

/// Immutable type name to map lookup.
#[derive(Debug, Clone, Default)]
pub struct MapRegistry {
    maps: BTreeMap<String, ProjectionMap>,
    origins: BTreeMap<String, String>,
}

impl MapRegistry {
    /// Loads every `*.json` definition directly inside `dir`.
    ///
    /// Files are read in file-name order; sub-directories and other
    /// extensions are ignored.
    ///
    /// # Errors
    /// - [`RegistryError::Io`]/[`RegistryError::Walk`] when the directory or
    ///   a file cannot be read.
    /// - [`RegistryError::Parse`]/[`RegistryError::InvalidDefinition`] naming
    ///   the offending file.
    /// - Cross-definition errors from [`MapRegistry::from_definitions`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref();
        let started_at = Instant::now();
        info!(
            "event=registry_load module=schema status=start dir={}",
            dir.display()
        );

        let result = read_definitions(dir).and_then(|definitions| {
            if definitions.is_empty() {
                return Err(RegistryError::NoDefinitions(dir.to_path_buf()));
            }
            Self::from_definitions(definitions)
        });

        match &result {
            Ok(registry) => info!(
                "event=registry_load module=schema status=ok maps={} duration_ms={}",
                registry.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=registry_load module=schema status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Builds a registry from `(origin, definition)` pairs.
    ///
    /// `origin` names where a definition came from (usually a file path) and
    /// is echoed in diagnostics.
    pub fn from_definitions(
        definitions: Vec<(String, MapDefinition)>,
    ) -> Result<Self, RegistryError> {
        let mut maps = BTreeMap::new();
        let mut origins = BTreeMap::<String, String>::new();

        for (origin, definition) in &definitions {
            definition
                .validate()
                .map_err(|source| RegistryError::InvalidDefinition {
                    file: origin.clone(),
                    source,
                })?;
            let map = ProjectionMap::from_definition(definition);
            let type_name = map.source_type().to_string();
            if let Some(first) = origins.get(&type_name) {
                return Err(RegistryError::DuplicateType {
                    type_name,
                    first: first.clone(),
                    second: origin.clone(),
                });
            }
            origins.insert(type_name.clone(), origin.clone());
            maps.insert(type_name, map);
        }

        for (type_name, map) in &maps {
            let origin = origins.get(type_name).cloned().unwrap_or_default();
            for property in map.properties() {
                let Some(nested) = property.type_name.as_deref() else {
                    continue;
                };
                let Some(nested_map) = maps.get(nested) else {
                    return Err(RegistryError::UnresolvedType {
                        file: origin,
                        property: property.name.clone(),
                        type_name: nested.to_string(),
                    });
                };
                if property.is_reference && nested_map.reference_id_property().is_none() {
                    return Err(RegistryError::MissingReferenceId {
                        file: origin,
                        property: property.name.clone(),
                        target_type: nested.to_string(),
                    });
                }
            }
        }

        Ok(Self { maps, origins })
    }

    pub fn has_map(&self, type_name: &str) -> bool {
        self.maps.contains_key(type_name)
    }

    /// Returns the map registered for `type_name`.
    pub fn get_map(&self, type_name: &str) -> Result<&ProjectionMap, ProjectionError> {
        self.maps
            .get(type_name)
            .ok_or_else(|| ProjectionError::NoMappingForType(type_name.to_string()))
    }

    /// Returns registered type names in sorted order.
    pub fn type_names(&self) -> Vec<&str> {
        self.maps.keys().map(String::as_str).collect()
    }

    /// Returns where the map for `type_name` was defined.
    pub fn origin_of(&self, type_name: &str) -> Option<&str> {
        self.origins.get(type_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

fn read_definitions(dir: &Path) -> Result<Vec<(String, MapDefinition)>, RegistryError> {
    if !dir.is_dir() {
        return Err(RegistryError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let mut definitions = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(RegistryError::Walk)?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|ext| ext.to_str()) != Some(DEFINITION_EXTENSION)
        {
            continue;
        }

        let origin = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let definition =
            MapDefinition::from_json_str(&raw).map_err(|source| RegistryError::Parse {
                file: origin.clone(),
                source,
            })?;
        definitions.push((origin, definition));
    }
    Ok(definitions)
}

/// Configuration errors raised while building a registry.
#[derive(Debug)]
pub enum RegistryError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Walk(walkdir::Error),
    Parse {
        file: String,
        source: serde_json::Error,
    },
    InvalidDefinition {
        file: String,
        source: MapDefinitionError,
    },
    DuplicateType {
        type_name: String,
        first: String,
        second: String,
    },
    UnresolvedType {
        file: String,
        property: String,
        type_name: String,
    },
    MissingReferenceId {
        file: String,
        property: String,
        target_type: String,
    },
    NoDefinitions(PathBuf),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read map definitions at `{}`: {source}", path.display())
            }
            Self::Walk(err) => write!(f, "cannot list map definitions: {err}"),
            Self::Parse { file, source } => {
                write!(f, "malformed map definition `{file}`: {source}")
            }
            Self::InvalidDefinition { file, source } => {
                write!(f, "invalid map definition `{file}`: {source}")
            }
            Self::DuplicateType {
                type_name,
                first,
                second,
            } => write!(
                f,
                "type `{type_name}` is mapped twice (`{first}` and `{second}`)"
            ),
            Self::UnresolvedType {
                file,
                property,
                type_name,
            } => write!(
                f,
                "map definition `{file}`: property `{property}` uses undefined type `{type_name}`"
            ),
            Self::MissingReferenceId {
                file,
                property,
                target_type,
            } => write!(
                f,
                "map definition `{file}`: reference property `{property}` targets `{target_type}`, which declares no ReferenceIDProperty"
            ),
            Self::NoDefinitions(dir) => {
                write!(f, "no map definitions found in `{}`", dir.display())
            }
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Walk(err) => Some(err),
            Self::Parse { source, .. } => Some(source),
            Self::InvalidDefinition { source, .. } => Some(source),
            Self::DuplicateType { .. }
            | Self::UnresolvedType { .. }
            | Self::MissingReferenceId { .. }
            | Self::NoDefinitions(_) => None,
        }
    }
}

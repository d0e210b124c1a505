//! Core projection logic for PK/PD analysis views.
//! Map-driven conversion of analysis object graphs into UI-ready JSON,
//! plus reference repair for graphs reloaded from snapshots.

pub mod db;
pub mod graph;
pub mod logging;
pub mod projection;
pub mod remap;
pub mod repo;
pub mod schema;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use graph::object::{DomainObject, ObjectRef, PropertyValue};
pub use graph::snapshot::{Snapshot, SnapshotError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use projection::apply::ApplyReport;
pub use projection::engine::ProjectionEngine;
pub use projection::error::{ProjectionError, ProjectionResult};
pub use remap::index::AuthoritativeIndex;
pub use remap::resolver::{PropertyRepair, ReferenceResolver, RepairReport, RepairSkip};
pub use repo::snapshot_repo::{
    RepoError, RepoResult, SnapshotId, SnapshotRepository, SnapshotSummary,
    SqliteSnapshotRepository, StoredSnapshot,
};
pub use schema::definition::{MapDefinition, MapDefinitionError, PropertyDefinitionSpec};
pub use schema::map::{ProjectionMap, PropertyDefinition};
pub use schema::registry::{MapRegistry, RegistryError};
pub use service::session_service::{AnalysisSession, SessionError, SessionResult};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Directory of the bundled PK/PD map definitions.
pub fn default_maps_dir() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("maps")
}

#[cfg(test)]
mod tests {
    use super::{core_version, default_maps_dir, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn default_maps_dir_points_into_crate() {
        assert!(default_maps_dir().ends_with("maps"));
    }
}

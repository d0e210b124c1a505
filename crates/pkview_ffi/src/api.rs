//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose map validation, projection and snapshot storage to Dart via FRB.
//! - Carry analysis graphs across the boundary as snapshot envelopes
//!   (JSON strings), never as live objects.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every graph received from Dart is repaired before it is projected,
//!   edited or saved.
//! - Only save, load and list open the snapshot store; projection and edits
//!   run against an in-memory scratch store.
//! - Failures are reported in response envelopes, never as panics.

use log::warn;
use pkview_core::db::{open_db, open_db_in_memory, Connection};
use pkview_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    AnalysisSession, MapRegistry, RepairReport, SessionError, Snapshot, SnapshotRepository,
    SqliteSnapshotRepository,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

const STORE_DB_FILE_NAME: &str = "pkview_snapshots.sqlite3";
static STORE_DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Result of validating a map directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapValidationResponse {
    pub ok: bool,
    /// Registered domain type names, sorted.
    pub type_names: Vec<String>,
    pub message: String,
}

/// Projection result for one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionResponse {
    pub ok: bool,
    /// Projected analysis JSON on success.
    pub projection_json: Option<String>,
    /// Snapshot envelope of the repaired graph, for the next round trip.
    pub snapshot_json: Option<String>,
    /// Stale selections removed by reference repair.
    pub dropped_references: u32,
    pub message: String,
}

impl ProjectionResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            projection_json: None,
            snapshot_json: None,
            dropped_references: 0,
            message: message.into(),
        }
    }
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotActionResponse {
    pub ok: bool,
    /// Stored snapshot ID on successful saves.
    pub snapshot_id: Option<String>,
    pub message: String,
}

/// Listing row for stored snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotListItem {
    pub snapshot_id: String,
    pub name: String,
    pub root_type: String,
    pub sequence: i64,
    pub created_at_ms: i64,
}

/// Loads and validates every map definition in `maps_dir`.
///
/// # FFI contract
/// - Sync call, file-system backed.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn validate_maps(maps_dir: String) -> MapValidationResponse {
    match MapRegistry::load(maps_dir.trim()) {
        Ok(registry) => {
            let type_names = registry
                .type_names()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>();
            MapValidationResponse {
                ok: true,
                message: format!("Loaded {} map(s).", type_names.len()),
                type_names,
            }
        }
        Err(err) => MapValidationResponse {
            ok: false,
            type_names: Vec::new(),
            message: format!("validate_maps failed: {err}"),
        },
    }
}

/// Repairs and projects an analysis carried as a snapshot envelope.
///
/// # FFI contract
/// - Sync call, CPU-bound.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn project_snapshot(maps_dir: String, snapshot_json: String) -> ProjectionResponse {
    with_scratch_session(&maps_dir, |session| {
        let report = restore_from_json(session, &snapshot_json)?;
        Ok(projection_response(session, &report))
    })
    .unwrap_or_else(|err| ProjectionResponse::failure(format!("project_snapshot failed: {err}")))
}

/// Applies projected-shape UI edits to an analysis snapshot.
///
/// Returns the updated projection and snapshot envelope; the input envelope
/// is not modified when the edit fails.
#[flutter_rust_bridge::frb(sync)]
pub fn apply_edits(maps_dir: String, snapshot_json: String, edits_json: String) -> ProjectionResponse {
    let edits = match serde_json::from_str::<serde_json::Value>(&edits_json) {
        Ok(edits) => edits,
        Err(err) => {
            return ProjectionResponse::failure(format!("apply_edits failed: invalid edits: {err}"))
        }
    };
    with_scratch_session(&maps_dir, |session| {
        let report = restore_from_json(session, &snapshot_json)?;
        session.apply_edits(&edits).map_err(|err| err.to_string())?;
        Ok(projection_response(session, &report))
    })
    .unwrap_or_else(|err| ProjectionResponse::failure(format!("apply_edits failed: {err}")))
}

/// Stores an analysis snapshot under `name` as a new revision.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn save_snapshot(maps_dir: String, name: String, snapshot_json: String) -> SnapshotActionResponse {
    let result = with_stored_session(&maps_dir, &resolve_store_db_path(), |session| {
        restore_from_json(session, &snapshot_json)?;
        session.save(&name).map_err(|err| err.to_string())
    });
    match result {
        Ok(id) => SnapshotActionResponse {
            ok: true,
            snapshot_id: Some(id.to_string()),
            message: "Snapshot saved.".to_string(),
        },
        Err(err) => SnapshotActionResponse {
            ok: false,
            snapshot_id: None,
            message: format!("save_snapshot failed: {err}"),
        },
    }
}

/// Loads, repairs and projects the latest revision stored under `name`.
#[flutter_rust_bridge::frb(sync)]
pub fn load_snapshot(maps_dir: String, name: String) -> ProjectionResponse {
    with_stored_session(&maps_dir, &resolve_store_db_path(), |session| {
        let report = session.load(&name).map_err(|err| err.to_string())?;
        Ok(projection_response(session, &report))
    })
    .unwrap_or_else(|err| ProjectionResponse::failure(format!("load_snapshot failed: {err}")))
}

/// Lists stored snapshot revisions, newest revision first per name.
///
/// Returns an empty list when the store cannot be opened.
#[flutter_rust_bridge::frb(sync)]
pub fn list_snapshots() -> Vec<SnapshotListItem> {
    let db_path = resolve_store_db_path();
    let conn = match open_db(&db_path) {
        Ok(conn) => conn,
        Err(err) => {
            warn!("event=snapshot_list module=ffi status=error error={err}");
            return Vec::new();
        }
    };
    let repo = SqliteSnapshotRepository::new(&conn);
    match repo.list_snapshots() {
        Ok(summaries) => summaries
            .into_iter()
            .map(|summary| SnapshotListItem {
                snapshot_id: summary.id.to_string(),
                name: summary.name,
                root_type: summary.root_type,
                sequence: summary.sequence,
                created_at_ms: summary.created_at_ms,
            })
            .collect(),
        Err(err) => {
            warn!("event=snapshot_list module=ffi status=error error={err}");
            Vec::new()
        }
    }
}

fn resolve_store_db_path() -> PathBuf {
    STORE_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("PKVIEW_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(STORE_DB_FILE_NAME)
        })
        .clone()
}

type Session<'conn> = AnalysisSession<SqliteSnapshotRepository<'conn>>;

fn with_scratch_session<T>(
    maps_dir: &str,
    f: impl FnOnce(&mut Session<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let registry = load_registry(maps_dir)?;
    let conn = open_db_in_memory().map_err(|err| format!("scratch store failed: {err}"))?;
    run_session(registry, &conn, f)
}

fn with_stored_session<T>(
    maps_dir: &str,
    db_path: &Path,
    f: impl FnOnce(&mut Session<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let registry = load_registry(maps_dir)?;
    let conn = open_db(db_path).map_err(|err| format!("store open failed: {err}"))?;
    run_session(registry, &conn, f)
}

fn load_registry(maps_dir: &str) -> Result<MapRegistry, String> {
    MapRegistry::load(maps_dir.trim()).map_err(|err| format!("map load failed: {err}"))
}

fn run_session<T>(
    registry: MapRegistry,
    conn: &Connection,
    f: impl FnOnce(&mut Session<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let mut session = AnalysisSession::new(Arc::new(registry), SqliteSnapshotRepository::new(conn));
    f(&mut session)
}

fn restore_from_json(
    session: &mut Session<'_>,
    snapshot_json: &str,
) -> Result<RepairReport, String> {
    let snapshot = Snapshot::from_json_str(snapshot_json).map_err(|err| err.to_string())?;
    session.restore(&snapshot).map_err(|err| err.to_string())
}

fn projection_response(
    session: &Session<'_>,
    report: &RepairReport,
) -> ProjectionResponse {
    let projection = match session.project() {
        Ok(projection) => projection,
        Err(err) => return ProjectionResponse::failure(err.to_string()),
    };
    let snapshot = session
        .snapshot()
        .and_then(|snapshot| snapshot.to_json_string().map_err(SessionError::from));
    match snapshot {
        Ok(snapshot_json) => ProjectionResponse {
            ok: true,
            projection_json: Some(projection.to_string()),
            snapshot_json: Some(snapshot_json),
            dropped_references: u32::try_from(report.dropped()).unwrap_or(u32::MAX),
            message: if report.dropped() == 0 {
                "Projected.".to_string()
            } else {
                format!("Projected; dropped {} stale selection(s).", report.dropped())
            },
        },
        Err(err) => ProjectionResponse::failure(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        apply_edits, core_version, init_logging, list_snapshots, load_snapshot, ping,
        project_snapshot, save_snapshot, validate_maps, with_stored_session, STORE_DB_FILE_NAME,
    };
    use pkview_core::{
        default_maps_dir, DomainObject, MapRegistry, ObjectRef, PropertyValue, Snapshot,
    };
    use serde_json::{json, Value};
    use std::sync::OnceLock;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tempfile::TempDir;

    static TEST_STORE_DIR: OnceLock<TempDir> = OnceLock::new();

    fn maps_dir() -> String {
        default_maps_dir().to_string_lossy().into_owned()
    }

    /// Points the process-wide store at a private temp directory.
    ///
    /// Must run before any call that resolves the store path.
    fn use_test_store() {
        TEST_STORE_DIR.get_or_init(|| {
            let dir = tempfile::tempdir().expect("tempdir");
            std::env::set_var("PKVIEW_DB_PATH", dir.path().join(STORE_DB_FILE_NAME));
            dir
        });
    }

    fn species(id: &str) -> ObjectRef {
        DomainObject::new("Species")
            .with("SessionID", json!(id))
            .with("Name", json!(id))
            .with("InitialAmount", json!(1))
            .with("InitialAmountUnits", json!("mole"))
            .into_ref()
    }

    fn analysis_snapshot(selected: &[&str]) -> String {
        let live = vec![species("S1"), species("S2")];
        let selected = selected.iter().map(|id| species(id)).collect::<Vec<_>>();
        let model = DomainObject::new("Model")
            .with("SessionID", json!("M1"))
            .with("Name", json!("model"))
            .with("Species", live)
            .with("Parameters", PropertyValue::Objects(Vec::new()))
            .with("Doses", PropertyValue::Objects(Vec::new()))
            .with("Variants", PropertyValue::Objects(Vec::new()))
            .into_ref();
        let root = DomainObject::new("Analysis")
            .with("Name", json!("ffi"))
            .with("Description", json!(""))
            .with("ModelObj", model)
            .with("SelectedSpecies", selected)
            .with("SelectedParams", PropertyValue::Objects(Vec::new()))
            .with("SelectedDoses", PropertyValue::Objects(Vec::new()))
            .with("SelectedVariants", PropertyValue::Objects(Vec::new()))
            .with("StartTime", json!(0))
            .with("StopTime", json!(1))
            .with_empty("PlotSettings")
            .with("FilePath", json!(""))
            .into_ref();
        let registry = MapRegistry::load(default_maps_dir()).expect("maps");
        Snapshot::capture(&registry, &root)
            .expect("capture")
            .to_json_string()
            .expect("encode")
    }

    fn unique_name(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}-{nanos}")
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(error.contains("unsupported log level"));
    }

    #[test]
    fn validate_maps_lists_bundled_types() {
        let response = validate_maps(maps_dir());
        assert!(response.ok, "{}", response.message);
        assert!(response.type_names.contains(&"Analysis".to_string()));

        let missing = validate_maps("/definitely/not/here".to_string());
        assert!(!missing.ok);
        assert!(missing.type_names.is_empty());
    }

    #[test]
    fn project_snapshot_repairs_before_projecting() {
        let response = project_snapshot(maps_dir(), analysis_snapshot(&["S2", "S5"]));
        assert!(response.ok, "{}", response.message);
        assert_eq!(response.dropped_references, 1);

        let projected: Value =
            serde_json::from_str(response.projection_json.as_deref().expect("json")).expect("parse");
        assert_eq!(
            projected["SelectedSpecies"],
            json!([{"$ref": "S2", "$class": "Species"}])
        );
    }

    #[test]
    fn project_snapshot_reports_malformed_envelopes() {
        let response = project_snapshot(maps_dir(), "{".to_string());
        assert!(!response.ok);
        assert!(response.message.starts_with("project_snapshot failed"));
    }

    #[test]
    fn apply_edits_returns_updated_snapshot() {
        let response = apply_edits(
            maps_dir(),
            analysis_snapshot(&[]),
            json!({"SelectedSpecies": ["S1"], "Name": "edited"}).to_string(),
        );
        assert!(response.ok, "{}", response.message);

        let again = project_snapshot(maps_dir(), response.snapshot_json.expect("snapshot"));
        let projected: Value =
            serde_json::from_str(again.projection_json.as_deref().expect("json")).expect("parse");
        assert_eq!(projected["Name"], json!("edited"));
        assert_eq!(projected["SelectedSpecies"][0]["$ref"], json!("S1"));
    }

    #[test]
    fn apply_edits_rejects_unknown_selection() {
        let response = apply_edits(
            maps_dir(),
            analysis_snapshot(&[]),
            json!({"SelectedSpecies": ["S404"]}).to_string(),
        );
        assert!(!response.ok);
        assert!(response.message.contains("S404"));
    }

    #[test]
    fn save_and_load_round_trip_through_store() {
        use_test_store();
        let name = unique_name("ffi-save");
        let saved = save_snapshot(maps_dir(), name.clone(), analysis_snapshot(&["S1"]));
        assert!(saved.ok, "{}", saved.message);
        let saved_id = saved.snapshot_id.expect("snapshot id");

        let loaded = load_snapshot(maps_dir(), name.clone());
        assert!(loaded.ok, "{}", loaded.message);
        assert_eq!(loaded.dropped_references, 0);

        assert!(list_snapshots()
            .iter()
            .any(|item| item.snapshot_id == saved_id && item.name == name && item.sequence == 1));
    }

    #[test]
    fn load_snapshot_reports_unknown_names() {
        use_test_store();
        let response = load_snapshot(maps_dir(), unique_name("ffi-missing"));
        assert!(!response.ok);
        assert!(response.message.contains("no snapshot named"));
    }

    #[test]
    fn projection_and_edits_do_not_need_the_store() {
        let blocker = tempfile::NamedTempFile::new().expect("temp file");
        let unwritable = blocker.path().join(STORE_DB_FILE_NAME);

        let stored = with_stored_session(&maps_dir(), &unwritable, |_| Ok(()));
        assert!(stored.unwrap_err().starts_with("store open failed"));

        let projected = project_snapshot(maps_dir(), analysis_snapshot(&["S1"]));
        assert!(projected.ok, "{}", projected.message);
        let edited = apply_edits(
            maps_dir(),
            analysis_snapshot(&[]),
            json!({"Name": "scratch"}).to_string(),
        );
        assert!(edited.ok, "{}", edited.message);
    }
}

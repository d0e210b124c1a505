//! Analysis session: the host-facing controller.
//!
//! # Responsibility
//! - Hold the active analysis root and the shared map registry.
//! - Orchestrate save (capture + persist) and load (fetch + restore +
//!   repair) around the core projection components.
//!
//! # Invariants
//! - A loaded graph is repaired before it becomes the active root.
//! - A failed load leaves the previous root attached.
//! - Loads take `&mut self`, so at most one repair runs per session.

use crate::graph::object::ObjectRef;
use crate::graph::snapshot::{Snapshot, SnapshotError};
use crate::projection::apply::ApplyReport;
use crate::projection::engine::ProjectionEngine;
use crate::projection::error::ProjectionError;
use crate::remap::resolver::{ReferenceResolver, RepairReport};
use crate::repo::snapshot_repo::{RepoError, SnapshotId, SnapshotRepository, SnapshotSummary};
use crate::schema::registry::MapRegistry;
use log::{error, info};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type SessionResult<T> = Result<T, SessionError>;

/// Host session over one snapshot repository.
pub struct AnalysisSession<R: SnapshotRepository> {
    registry: Arc<MapRegistry>,
    repo: R,
    root: Option<ObjectRef>,
}

impl<R: SnapshotRepository> AnalysisSession<R> {
    pub fn new(registry: Arc<MapRegistry>, repo: R) -> Self {
        Self {
            registry,
            repo,
            root: None,
        }
    }

    pub fn registry(&self) -> &MapRegistry {
        &self.registry
    }

    /// Attaches a live root owned by the host.
    ///
    /// # Errors
    /// - `NoMappingForType` when the root type is not registered.
    pub fn attach(&mut self, root: ObjectRef) -> SessionResult<()> {
        self.registry.get_map(&root.type_name())?;
        self.root = Some(root);
        Ok(())
    }

    /// Detaches and returns the active root.
    pub fn detach(&mut self) -> Option<ObjectRef> {
        self.root.take()
    }

    pub fn root(&self) -> Option<&ObjectRef> {
        self.root.as_ref()
    }

    /// Projects the active root.
    pub fn project(&self) -> SessionResult<Value> {
        let root = self.require_root()?;
        Ok(ProjectionEngine::new(&self.registry).to_json(root)?)
    }

    /// Applies projected-shape UI edits onto the active root.
    pub fn apply_edits(&self, patch: &Value) -> SessionResult<ApplyReport> {
        let root = self.require_root()?;
        Ok(ProjectionEngine::new(&self.registry).apply_json(root, patch)?)
    }

    /// Captures the active root through the registered maps.
    pub fn snapshot(&self) -> SessionResult<Snapshot> {
        let root = self.require_root()?;
        Ok(Snapshot::capture(&self.registry, root)?)
    }

    /// Captures the active root and stores it as a new revision of `name`.
    pub fn save(&self, name: &str) -> SessionResult<SnapshotId> {
        let snapshot = self.snapshot()?;
        match self.repo.save_snapshot(name, &snapshot) {
            Ok(id) => {
                info!(
                    "event=snapshot_save module=service status=ok name={} snapshot_id={} root_type={}",
                    name.trim(),
                    id,
                    snapshot.root_type()
                );
                Ok(id)
            }
            Err(err) => {
                error!(
                    "event=snapshot_save module=service status=error name={} error={}",
                    name.trim(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Loads the latest revision of `name`, repairs it and attaches it.
    ///
    /// # Errors
    /// - `SnapshotNotFound` when no revision exists.
    /// - Snapshot, repository and projection errors unchanged.
    pub fn load(&mut self, name: &str) -> SessionResult<RepairReport> {
        let stored = self
            .repo
            .latest_snapshot(name)?
            .ok_or_else(|| SessionError::SnapshotNotFound(name.trim().to_string()))?;
        let report = self.restore(&stored.snapshot)?;
        info!(
            "event=snapshot_load module=service status=ok name={} snapshot_id={} sequence={} dropped={}",
            stored.summary.name,
            stored.summary.id,
            stored.summary.sequence,
            report.dropped()
        );
        Ok(report)
    }

    /// Restores `snapshot`, repairs it and attaches it.
    pub fn restore(&mut self, snapshot: &Snapshot) -> SessionResult<RepairReport> {
        let root = snapshot.restore()?;
        let report = ReferenceResolver::new(&self.registry).repair(&root)?;
        self.root = Some(root);
        Ok(report)
    }

    /// Lists stored snapshot revisions.
    pub fn list(&self) -> SessionResult<Vec<SnapshotSummary>> {
        Ok(self.repo.list_snapshots()?)
    }

    fn require_root(&self) -> SessionResult<&ObjectRef> {
        self.root.as_ref().ok_or(SessionError::NoActiveRoot)
    }
}

/// Host session errors.
#[derive(Debug)]
pub enum SessionError {
    NoActiveRoot,
    SnapshotNotFound(String),
    Projection(ProjectionError),
    Snapshot(SnapshotError),
    Repo(RepoError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoActiveRoot => write!(f, "no analysis is attached to the session"),
            Self::SnapshotNotFound(name) => write!(f, "no snapshot named `{name}`"),
            Self::Projection(err) => write!(f, "{err}"),
            Self::Snapshot(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Projection(err) => Some(err),
            Self::Snapshot(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::NoActiveRoot | Self::SnapshotNotFound(_) => None,
        }
    }
}

impl From<ProjectionError> for SessionError {
    fn from(value: ProjectionError) -> Self {
        Self::Projection(value)
    }
}

impl From<SnapshotError> for SessionError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}

impl From<RepoError> for SessionError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

//! Repository layer for persisted snapshots.
//!
//! # Responsibility
//! - Define use-case oriented storage contracts for snapshots.
//! - Isolate SQLite query details from the host session.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `InvalidName`) in
//!   addition to DB transport errors.

pub mod snapshot_repo;

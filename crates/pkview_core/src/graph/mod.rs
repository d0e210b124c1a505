//! Host-side domain object graph and its detached snapshot form.
//!
//! # Responsibility
//! - Model analysis objects as typed property bags with shared handles.
//! - Convert graphs to and from the legacy detached snapshot format.
//!
//! # Invariants
//! - The graph is owned by the host; core components only read it, except
//!   reference repair and reverse projection.

pub mod object;
pub mod snapshot;

//! Declarative projection schema.
//!
//! # Responsibility
//! - Parse and validate map definition files.
//! - Expose immutable per-type projection maps through one registry.
//!
//! # Invariants
//! - Maps and the registry never change after load.
//! - A registry is either complete and consistent, or not built at all.

pub mod definition;
pub mod map;
pub mod registry;

//! Host-facing services.
//!
//! # Responsibility
//! - Compose registry, engine, resolver and storage into use-case APIs.
//!
//! # Invariants
//! - Services never bypass repair when attaching a reloaded graph.

pub mod session_service;

//! Projection engine: object graph to JSON and back.
//!
//! # Responsibility
//! - Convert graphs into schema-shaped, reference-safe JSON trees.
//! - Apply projected-shape edits back onto the graph.
//!
//! # Invariants
//! - Output shape is fully determined by the loaded maps.
//! - References are projected as identity markers, never as sub-trees.

pub mod apply;
pub mod engine;
pub mod error;
pub mod identity;

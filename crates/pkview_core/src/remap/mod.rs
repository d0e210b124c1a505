//! Reference repair for graphs reloaded from snapshots.
//!
//! # Responsibility
//! - Index the live model's keyed objects.
//! - Rewrite stale reference properties onto those live objects.
//!
//! # Invariants
//! - This is the only core path that rewrites reference properties after load.

pub mod index;
pub mod resolver;

//! Flutter bridge for the PK/PD projection core.

pub mod api;

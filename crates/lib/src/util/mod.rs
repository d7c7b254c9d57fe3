//! Shared utilities.
//!
//! Dependency-ordered traversal and glob matching used by several modules.

pub mod glob;
pub mod topo;

//! keel-lib: resolved project model and build graph core for keel
//!
//! This crate provides the pieces a build executor needs once a project has been
//! resolved:
//! - `language`: products, groups, rules, modules and the project tree
//! - `persist`: identity-preserving storage of the tree between runs
//! - `buildgraph`: rule ordering derived from file tags
//! - `wildcards`: source file discovery from glob patterns
//! - `environment`: build and run environments from module setup scripts

pub mod buildgraph;
pub mod consts;
pub mod environment;
pub mod language;
pub mod persist;
pub mod script;
pub mod util;
pub mod wildcards;

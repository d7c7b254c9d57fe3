//! Script evaluation for setup logic.
//!
//! Setup scripts are Lua chunks evaluated against a stack of scope tables. Each scope
//! falls back to the one below it and finally to the Lua globals, so a chunk sees the
//! bindings of every enclosing scope while only adding to its own.

mod convert;
mod engine;

pub use convert::{properties_to_table, property_to_lua};
pub use engine::ScriptEngine;

//! Build and run environments of products.
//!
//! Each module of a product may carry a setup script that adjusts the process
//! environment through `getenv`/`putenv`. Scripts run in module dependency order, so
//! a module sees the changes of everything it depends on.

mod resolve;

use std::collections::BTreeMap;
use std::fmt;

use mlua::prelude::LuaError;
use thiserror::Error;

use crate::language::{Module, ProjectError};

pub use resolve::compute_environment;

/// Variable name to value.
pub type ProcessEnvironment = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentKind {
  Build,
  Run,
}

impl EnvironmentKind {
  /// The script a module runs for this kind of environment, if any.
  ///
  /// A module without a run setup script reuses its build setup script for the run
  /// environment.
  pub fn setup_script(self, module: &Module) -> Option<&str> {
    let build = module.setup_build_environment_script.as_str();
    let run = module.setup_run_environment_script.as_str();
    match self {
      EnvironmentKind::Build if !build.is_empty() => Some(build),
      EnvironmentKind::Run if !run.is_empty() => Some(run),
      EnvironmentKind::Run if !build.is_empty() => Some(build),
      _ => None,
    }
  }
}

impl fmt::Display for EnvironmentKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EnvironmentKind::Build => write!(f, "build"),
      EnvironmentKind::Run => write!(f, "run"),
    }
  }
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
  /// A module names a dependency the product does not have. Resolution should have
  /// caught this earlier.
  #[error("module '{module}' depends on '{dependency}', which is not a module of the product")]
  UnresolvedModuleDependency { module: String, dependency: String },

  #[error("cyclic module dependency: {}", modules.join(" -> "))]
  CyclicModuleDependency { modules: Vec<String> },

  #[error("error while setting up {kind} environment in module '{module}': {message}")]
  EnvironmentSetupFailed {
    module: String,
    kind: EnvironmentKind,
    message: String,
  },

  #[error("script engine error: {0}")]
  Lua(#[from] LuaError),

  #[error(transparent)]
  Project(#[from] ProjectError),
}

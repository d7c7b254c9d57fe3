use crate::persist::{PersistError, Persistent, PoolReader, PoolWriter};

use super::location::CodeLocation;

/// Script files made visible to a module or rule under one scope name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptImport {
  pub scope_name: String,
  pub file_names: Vec<String>,
  pub location: CodeLocation,
}

impl ScriptImport {
  pub fn new(scope_name: impl Into<String>, file_names: Vec<String>) -> Self {
    Self {
      scope_name: scope_name.into(),
      file_names,
      location: CodeLocation::default(),
    }
  }
}

impl Persistent for ScriptImport {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_string(&self.scope_name)?;
    pool.store_string_list(&self.file_names)?;
    pool.write(&self.location)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    Ok(Self {
      scope_name: pool.load_string()?,
      file_names: pool.load_string_list()?,
      location: pool.read()?,
    })
  }
}

/// A reusable configuration unit.
///
/// Modules are shared as `Arc<Module>` between the products and rules that use them
/// and are never modified after resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
  pub name: String,
  /// Names of modules this one depends on, resolved against the product's module list.
  pub module_dependencies: Vec<String>,
  pub imports: Vec<ScriptImport>,
  pub setup_build_environment_script: String,
  pub setup_run_environment_script: String,
}

impl Module {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }
}

impl Persistent for Module {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_string(&self.name)?;
    pool.store_string_list(&self.module_dependencies)?;
    pool.store_container(&self.imports)?;
    pool.store_string(&self.setup_build_environment_script)?;
    pool.store_string(&self.setup_run_environment_script)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    Ok(Self {
      name: pool.load_string()?,
      module_dependencies: pool.load_string_list()?,
      imports: pool.load_container()?,
      setup_build_environment_script: pool.load_string()?,
      setup_run_environment_script: pool.load_string()?,
    })
  }
}

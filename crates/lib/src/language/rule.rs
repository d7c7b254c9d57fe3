use std::fmt;
use std::sync::Arc;

use crate::persist::{PersistError, Persistent, PoolReader, PoolWriter};

use super::location::{CodeLocation, FileTags};
use super::module::{Module, ScriptImport};

/// A property assignment evaluated for each produced artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleArtifactBinding {
  pub name: Vec<String>,
  pub code: String,
  pub location: CodeLocation,
}

impl Persistent for RuleArtifactBinding {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_string_list(&self.name)?;
    pool.store_string(&self.code)?;
    pool.write(&self.location)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    Ok(Self {
      name: pool.load_string_list()?,
      code: pool.load_string()?,
      location: pool.read()?,
    })
  }
}

/// Template for one output of a rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleArtifact {
  /// Script expression producing the output file name.
  pub file_name: String,
  pub file_tags: FileTags,
  /// Evaluated in declaration order.
  pub bindings: Vec<RuleArtifactBinding>,
}

impl RuleArtifact {
  pub fn new(file_name: impl Into<String>, file_tags: FileTags) -> Self {
    Self {
      file_name: file_name.into(),
      file_tags,
      bindings: Vec::new(),
    }
  }
}

impl Persistent for RuleArtifact {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_string(&self.file_name)?;
    pool.store_string_set(&self.file_tags)?;
    pool.store_container(&self.bindings)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    Ok(Self {
      file_name: pool.load_string()?,
      file_tags: pool.load_string_set()?,
      bindings: pool.load_container()?,
    })
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareScript {
  pub script: String,
  pub location: CodeLocation,
}

impl PrepareScript {
  pub fn new(script: impl Into<String>) -> Self {
    Self {
      script: script.into(),
      location: CodeLocation::default(),
    }
  }
}

impl Persistent for PrepareScript {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_string(&self.script)?;
    pool.write(&self.location)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    Ok(Self {
      script: pool.load_string()?,
      location: pool.read()?,
    })
  }
}

/// A transformation from input-tagged artifacts to output artifacts.
#[derive(Debug, Clone)]
pub struct Rule {
  /// Script producing the commands for this rule.
  pub script: PrepareScript,
  /// Module that declared the rule. Shared with the product's module list.
  pub module: Arc<Module>,
  /// Files loaded before the prepare script runs.
  pub imports: Vec<ScriptImport>,
  /// Tags of the artifacts this rule consumes.
  pub inputs: FileTags,
  /// Tags whose producers must run first without triggering this rule.
  pub usings: FileTags,
  /// Tags whose producers must run first, with no input relation at all.
  pub explicitly_depends_on: FileTags,
  /// Run once over all inputs instead of once per input.
  pub multiplex: bool,
  /// Declared outputs.
  pub artifacts: Vec<RuleArtifact>,
}

impl Rule {
  pub fn new(module: Arc<Module>, script: PrepareScript) -> Self {
    Self {
      script,
      module,
      imports: Vec::new(),
      inputs: FileTags::new(),
      usings: FileTags::new(),
      explicitly_depends_on: FileTags::new(),
      multiplex: false,
      artifacts: Vec::new(),
    }
  }

  /// Union of the tags of all produced artifacts.
  pub fn output_file_tags(&self) -> FileTags {
    self.artifacts.iter().flat_map(|a| a.file_tags.iter().cloned()).collect()
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let join = |tags: &FileTags| tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    write!(f, "[{} -> {}]", join(&self.inputs), join(&self.output_file_tags()))
  }
}

impl Persistent for Rule {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    self.script.store(pool)?;
    pool.store_shared(&self.module)?;
    pool.store_container(&self.imports)?;
    pool.store_string_set(&self.inputs)?;
    pool.store_string_set(&self.usings)?;
    pool.store_string_set(&self.explicitly_depends_on)?;
    pool.write(&self.multiplex)?;
    pool.store_container(&self.artifacts)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    Ok(Self {
      script: PrepareScript::load(pool)?,
      module: pool.load_shared()?,
      imports: pool.load_container()?,
      inputs: pool.load_string_set()?,
      usings: pool.load_string_set()?,
      explicitly_depends_on: pool.load_string_set()?,
      multiplex: pool.read()?,
      artifacts: pool.load_container()?,
    })
  }
}

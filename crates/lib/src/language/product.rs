use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::buildgraph::{RuleGraph, RuleGraphError};
use crate::environment::{EnvironmentError, EnvironmentKind, ProcessEnvironment, compute_environment};
use crate::persist::{PersistError, Persistent, PoolReader, PoolWriter};
use crate::script::ScriptEngine;

use super::artifact::{FileTagger, SourceArtifact};
use super::group::Group;
use super::location::{CodeLocation, FileTags};
use super::module::Module;
use super::project::{ProjectError, ProjectId, TopLevelProject};
use super::property::PropertyMap;
use super::rule::Rule;

/// Property overrides for artifacts carrying any of the filter tags.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactProperties {
  pub file_tags_filter: FileTags,
  pub properties: Arc<PropertyMap>,
}

impl Persistent for ArtifactProperties {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_string_set(&self.file_tags_filter)?;
    pool.store_shared(&self.properties)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    Ok(Self {
      file_tags_filter: pool.load_string_set()?,
      properties: pool.load_shared()?,
    })
  }
}

/// One buildable unit of a project.
#[derive(Debug, Clone)]
pub struct Product {
  /// Disabled products are kept in the tree but not built.
  pub enabled: bool,
  pub name: String,
  /// Base name of the product's main output file.
  pub target_name: String,
  /// Tags of the artifacts this product delivers. Their producers are the root rules.
  pub file_tags: FileTags,
  /// Extra delivered tags. Rules producing them are roots of the rule graph too.
  pub additional_file_tags: FileTags,
  /// Base directory for relative source paths and wildcards.
  pub source_directory: PathBuf,
  /// Directory receiving the build outputs.
  pub destination_directory: PathBuf,
  pub location: CodeLocation,
  /// Product properties, including per-module values under `modules`.
  pub properties: Arc<PropertyMap>,
  /// Rules in declaration order.
  pub rules: Vec<Arc<Rule>>,
  /// Names of products this one depends on.
  pub dependencies: Vec<String>,
  pub file_taggers: Vec<FileTagger>,
  /// Modules loaded by the product. Order matters only as a tie-breaker.
  pub modules: Vec<Arc<Module>>,
  pub groups: Vec<Group>,
  /// Overrides consulted in order by [`Product::properties_for_artifact`].
  pub artifact_properties: Vec<ArtifactProperties>,

  /// Owning project, set when the product is added to a tree.
  pub(super) project: Option<ProjectId>,

  // Computed on first use; never persisted.
  top_sorted_rules: OnceLock<Vec<Arc<Rule>>>,
  build_environment: OnceLock<ProcessEnvironment>,
  run_environment: OnceLock<ProcessEnvironment>,
}

impl Product {
  pub fn new(name: impl Into<String>) -> Self {
    let name = name.into();
    Self {
      enabled: true,
      target_name: name.clone(),
      name,
      file_tags: FileTags::new(),
      additional_file_tags: FileTags::new(),
      source_directory: PathBuf::new(),
      destination_directory: PathBuf::new(),
      location: CodeLocation::default(),
      properties: Arc::new(PropertyMap::new()),
      rules: Vec::new(),
      dependencies: Vec::new(),
      file_taggers: Vec::new(),
      modules: Vec::new(),
      groups: Vec::new(),
      artifact_properties: Vec::new(),
      project: None,
      top_sorted_rules: OnceLock::new(),
      build_environment: OnceLock::new(),
      run_environment: OnceLock::new(),
    }
  }

  /// The project this product was added to.
  pub fn project(&self) -> Option<ProjectId> {
    self.project
  }

  /// Files of every group, explicit files first within each group.
  pub fn all_files(&self) -> Vec<Arc<SourceArtifact>> {
    self.files_of(self.groups.iter())
  }

  pub fn all_enabled_files(&self) -> Vec<Arc<SourceArtifact>> {
    self.files_of(self.groups.iter().filter(|g| g.enabled))
  }

  fn files_of<'a>(&self, groups: impl Iterator<Item = &'a Group>) -> Vec<Arc<SourceArtifact>> {
    groups
      .flat_map(|group| group.all_files(&self.source_directory, |path| self.file_tags_for_path(path)))
      .collect()
  }

  fn file_tags_for_path(&self, path: &Path) -> FileTags {
    path
      .file_name()
      .map(|name| self.file_tags_for_file_name(&name.to_string_lossy()))
      .unwrap_or_default()
  }

  /// Union of the tags of every file tagger matching `file_name`.
  pub fn file_tags_for_file_name(&self, file_name: &str) -> FileTags {
    self
      .file_taggers
      .iter()
      .filter(|tagger| tagger.matches(file_name))
      .flat_map(|tagger| tagger.file_tags().iter().cloned())
      .collect()
  }

  /// Properties for an artifact with the given tags.
  ///
  /// The first override whose filter shares a tag wins; otherwise the product's own
  /// properties apply.
  pub fn properties_for_artifact(&self, file_tags: &FileTags) -> &Arc<PropertyMap> {
    self
      .artifact_properties
      .iter()
      .find(|ap| !ap.file_tags_filter.is_disjoint(file_tags))
      .map(|ap| &ap.properties)
      .unwrap_or(&self.properties)
  }

  /// Rules ordered so that every rule follows the rules it depends on.
  ///
  /// Computed on first call and cached.
  pub fn top_sorted_rules(&self) -> Result<&[Arc<Rule>], RuleGraphError> {
    if let Some(rules) = self.top_sorted_rules.get() {
      return Ok(rules);
    }
    let product_tags: FileTags = self.file_tags.union(&self.additional_file_tags).cloned().collect();
    let sorted = RuleGraph::build(&self.rules, &product_tags).top_sorted()?;
    debug!(product = %self.name, rules = sorted.len(), "sorted rules");
    Ok(self.top_sorted_rules.get_or_init(|| sorted))
  }

  pub fn build_environment(&self) -> Option<&ProcessEnvironment> {
    self.build_environment.get()
  }

  pub fn run_environment(&self) -> Option<&ProcessEnvironment> {
    self.run_environment.get()
  }

  /// Compute the environment for building this product, once.
  pub fn setup_build_environment(
    &self,
    engine: &ScriptEngine,
    top_level: &TopLevelProject,
    base_environment: &ProcessEnvironment,
  ) -> Result<&ProcessEnvironment, EnvironmentError> {
    self.setup_environment(EnvironmentKind::Build, engine, top_level, base_environment)
  }

  /// Compute the environment for running this product, once.
  pub fn setup_run_environment(
    &self,
    engine: &ScriptEngine,
    top_level: &TopLevelProject,
    base_environment: &ProcessEnvironment,
  ) -> Result<&ProcessEnvironment, EnvironmentError> {
    self.setup_environment(EnvironmentKind::Run, engine, top_level, base_environment)
  }

  fn belongs_to(&self, top_level: &TopLevelProject) -> bool {
    self
      .project
      .and_then(|project| top_level.project(project))
      .is_some_and(|project| project.products().iter().any(|product| std::ptr::eq(product, self)))
  }

  fn setup_environment(
    &self,
    kind: EnvironmentKind,
    engine: &ScriptEngine,
    top_level: &TopLevelProject,
    base_environment: &ProcessEnvironment,
  ) -> Result<&ProcessEnvironment, EnvironmentError> {
    let cache = match kind {
      EnvironmentKind::Build => &self.build_environment,
      EnvironmentKind::Run => &self.run_environment,
    };
    if let Some(environment) = cache.get() {
      return Ok(environment);
    }
    if !self.belongs_to(top_level) {
      return Err(ProjectError::ForeignProduct(self.name.clone()).into());
    }

    let environment = compute_environment(
      engine,
      kind,
      &self.modules,
      &self.properties,
      &top_level.platform_environment,
      base_environment,
    )?;
    debug!(product = %self.name, kind = %kind, variables = environment.len(), "environment ready");
    Ok(cache.get_or_init(|| environment))
  }
}

impl Persistent for Product {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.write(&self.enabled)?;
    pool.store_string(&self.name)?;
    pool.store_string(&self.target_name)?;
    pool.store_string_set(&self.file_tags)?;
    pool.store_string_set(&self.additional_file_tags)?;
    pool.store_path(&self.source_directory)?;
    pool.store_path(&self.destination_directory)?;
    pool.write(&self.location)?;
    pool.store_shared(&self.properties)?;
    pool.store_shared_container(&self.rules)?;
    pool.store_string_list(&self.dependencies)?;
    pool.store_container(&self.file_taggers)?;
    pool.store_shared_container(&self.modules)?;
    pool.store_container(&self.groups)?;
    pool.store_container(&self.artifact_properties)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    let mut product = Product::new(String::new());
    product.enabled = pool.read()?;
    product.name = pool.load_string()?;
    product.target_name = pool.load_string()?;
    product.file_tags = pool.load_string_set()?;
    product.additional_file_tags = pool.load_string_set()?;
    product.source_directory = pool.load_path()?;
    product.destination_directory = pool.load_path()?;
    product.location = pool.read()?;
    product.properties = pool.load_shared()?;
    product.rules = pool.load_shared_container()?;
    product.dependencies = pool.load_string_list()?;
    product.file_taggers = pool.load_container()?;
    product.modules = pool.load_shared_container()?;
    product.groups = pool.load_container()?;
    product.artifact_properties = pool.load_container()?;
    Ok(product)
  }
}

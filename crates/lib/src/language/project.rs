//! The project tree.
//!
//! Projects live in an arena owned by the [`TopLevelProject`]; the root is always at
//! [`ProjectId::ROOT`]. Children are referenced by handle and each project keeps a
//! non-owning handle to its parent, so there is no ownership cycle between levels.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{
  BUILD_CONFIG_NAMESPACE, BUILD_CONFIG_PROFILE_KEY, BUILD_CONFIG_VARIANT_KEY, BUILD_GRAPH_FILE_EXTENSION,
};
use crate::persist::{self, PersistError, Persistent, PoolReader, PoolWriter};

use super::location::CodeLocation;
use super::product::Product;
use super::property::{PropertyMap, PropertyValue};

/// Handle of a project inside a [`TopLevelProject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(u32);

impl ProjectId {
  pub const ROOT: ProjectId = ProjectId(0);

  fn index(self) -> usize {
    self.0 as usize
  }

  fn from_index(index: usize) -> Result<Self, ProjectError> {
    u32::try_from(index).map(ProjectId).map_err(|_| ProjectError::TooManyProjects)
  }
}

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("no project with handle {0:?} in this tree")]
  UnknownProject(ProjectId),

  #[error("project '{0}' is not attached to a parent")]
  Detached(String),

  #[error("too many projects in one tree")]
  TooManyProjects,

  #[error("product '{0}' does not belong to this project tree")]
  ForeignProduct(String),
}

/// A node in the project tree.
#[derive(Debug, Clone)]
pub struct Project {
  pub name: String,
  pub location: CodeLocation,
  pub enabled: bool,
  pub properties: PropertyMap,
  products: Vec<Product>,
  sub_projects: Vec<ProjectId>,
  parent: Option<ProjectId>,
  top_level: OnceLock<ProjectId>,
}

impl Project {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      location: CodeLocation::default(),
      enabled: true,
      properties: PropertyMap::new(),
      products: Vec::new(),
      sub_projects: Vec::new(),
      parent: None,
      top_level: OnceLock::new(),
    }
  }

  pub fn products(&self) -> &[Product] {
    &self.products
  }

  pub fn sub_projects(&self) -> &[ProjectId] {
    &self.sub_projects
  }

  pub fn parent(&self) -> Option<ProjectId> {
    self.parent
  }
}

/// Build-system bookkeeping that decides whether the stored graph is stale.
#[derive(Debug, Default)]
pub struct ProjectBuildData {
  /// Project files read while resolving the tree.
  pub build_system_files: BTreeSet<PathBuf>,
  dirty: AtomicBool,
}

impl ProjectBuildData {
  /// Fresh build data, in need of storing.
  pub fn new() -> Self {
    Self {
      build_system_files: BTreeSet::new(),
      dirty: AtomicBool::new(true),
    }
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty.load(Ordering::Acquire)
  }

  pub fn set_dirty(&self, dirty: bool) {
    self.dirty.store(dirty, Ordering::Release);
  }
}

impl Clone for ProjectBuildData {
  fn clone(&self) -> Self {
    Self {
      build_system_files: self.build_system_files.clone(),
      dirty: AtomicBool::new(self.is_dirty()),
    }
  }
}

impl Persistent for ProjectBuildData {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_path_set(&self.build_system_files)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    Ok(Self {
      build_system_files: pool.load_path_set()?,
      dirty: AtomicBool::new(false),
    })
  }
}

/// Root of a project tree plus the identity of the build it belongs to.
#[derive(Debug, Clone)]
pub struct TopLevelProject {
  /// Arena of every project in the tree. The root sits at [`ProjectId::ROOT`].
  projects: Vec<Project>,
  id: String,
  /// Directory holding the build graph file and build outputs.
  pub build_directory: PathBuf,
  build_configuration: PropertyMap,
  /// Environment of the process that resolved the tree.
  pub platform_environment: BTreeMap<String, String>,
  /// Variables the build read, with the values it saw.
  used_environment: BTreeMap<String, String>,
  /// Environment captured for the build.
  pub environment: BTreeMap<String, String>,
  /// Present once the tree has been resolved for building.
  pub build_data: Option<ProjectBuildData>,
}

impl TopLevelProject {
  pub fn new(mut root: Project) -> Self {
    root.parent = None;
    root.sub_projects.clear();
    for product in &mut root.products {
      product.project = Some(ProjectId::ROOT);
    }
    Self {
      projects: vec![root],
      id: String::new(),
      build_directory: PathBuf::new(),
      build_configuration: PropertyMap::new(),
      platform_environment: BTreeMap::new(),
      used_environment: BTreeMap::new(),
      environment: BTreeMap::new(),
      build_data: None,
    }
  }

  pub fn root(&self) -> &Project {
    &self.projects[ProjectId::ROOT.index()]
  }

  pub fn project(&self, id: ProjectId) -> Option<&Project> {
    self.projects.get(id.index())
  }

  pub fn project_mut(&mut self, id: ProjectId) -> Option<&mut Project> {
    self.projects.get_mut(id.index())
  }

  fn project_or_err(&self, id: ProjectId) -> Result<&Project, ProjectError> {
    self.project(id).ok_or(ProjectError::UnknownProject(id))
  }

  /// Attach `project` as the last child of `parent`.
  pub fn add_sub_project(&mut self, parent: ProjectId, mut project: Project) -> Result<ProjectId, ProjectError> {
    self.project_or_err(parent)?;
    let id = ProjectId::from_index(self.projects.len())?;
    project.parent = Some(parent);
    project.sub_projects.clear();
    project.top_level = OnceLock::new();
    for product in &mut project.products {
      product.project = Some(id);
    }
    self.projects.push(project);
    if let Some(parent) = self.project_mut(parent) {
      parent.sub_projects.push(id);
    }
    Ok(id)
  }

  pub fn add_product(&mut self, project: ProjectId, mut product: Product) -> Result<&Product, ProjectError> {
    let owner = self.project_mut(project).ok_or(ProjectError::UnknownProject(project))?;
    product.project = Some(project);
    owner.products.push(product);
    owner.products.last().ok_or(ProjectError::UnknownProject(project))
  }

  /// Direct children of a project.
  pub fn sub_projects(&self, id: ProjectId) -> Result<Vec<&Project>, ProjectError> {
    let project = self.project_or_err(id)?;
    Ok(project.sub_projects.iter().filter_map(|&child| self.project(child)).collect())
  }

  /// All descendants of a project: the direct children first, then each child's
  /// descendants in turn.
  pub fn all_sub_projects(&self, id: ProjectId) -> Result<Vec<&Project>, ProjectError> {
    let project = self.project_or_err(id)?;
    let mut result = self.sub_projects(id)?;
    for &child in &project.sub_projects {
      result.extend(self.all_sub_projects(child)?);
    }
    Ok(result)
  }

  /// Products of a project and all its descendants.
  pub fn products_of(&self, id: ProjectId) -> Result<Vec<&Product>, ProjectError> {
    let project = self.project_or_err(id)?;
    let mut result: Vec<&Product> = project.products.iter().collect();
    for &child in &project.sub_projects {
      result.extend(self.products_of(child)?);
    }
    Ok(result)
  }

  pub fn all_products(&self) -> Vec<&Product> {
    self.products_of(ProjectId::ROOT).unwrap_or_default()
  }

  pub fn product(&self, name: &str) -> Option<&Product> {
    self.all_products().into_iter().find(|p| p.name == name)
  }

  /// The top-level ancestor of a project, resolved once and cached on the project.
  pub fn top_level_of(&self, id: ProjectId) -> Result<ProjectId, ProjectError> {
    let project = self.project_or_err(id)?;
    if let Some(&top) = project.top_level.get() {
      return Ok(top);
    }
    let top = match project.parent {
      Some(parent) => self.top_level_of(parent)?,
      None if id == ProjectId::ROOT => ProjectId::ROOT,
      None => return Err(ProjectError::Detached(project.name.clone())),
    };
    Ok(*project.top_level.get_or_init(|| top))
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn build_configuration(&self) -> &PropertyMap {
    &self.build_configuration
  }

  /// Set the build configuration and the id derived from it.
  pub fn set_build_configuration(&mut self, config: PropertyMap) {
    self.id = Self::derive_id(&config);
    self.build_configuration = config;
  }

  /// `<profile>-<buildVariant>` from the build configuration.
  pub fn derive_id(config: &PropertyMap) -> String {
    let value = |key: &str| {
      config
        .get_path(&format!("{BUILD_CONFIG_NAMESPACE}.{key}"))
        .map(PropertyValue::to_env_string)
        .unwrap_or_default()
    };
    format!("{}-{}", value(BUILD_CONFIG_PROFILE_KEY), value(BUILD_CONFIG_VARIANT_KEY))
  }

  pub fn derive_build_directory(build_root: &Path, id: &str) -> PathBuf {
    build_root.join(id)
  }

  pub fn build_graph_file_path(&self) -> PathBuf {
    self
      .build_directory
      .join(format!("{}.{BUILD_GRAPH_FILE_EXTENSION}", self.id))
  }

  /// Environment variables read while resolving, with the values they had.
  pub fn used_environment(&self) -> &BTreeMap<String, String> {
    &self.used_environment
  }

  pub fn record_used_environment(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.used_environment.insert(name.into(), value.into());
  }

  /// Write the build graph file if the build data has changed.
  ///
  /// Returns whether a file was written.
  pub fn store_build_graph(&self) -> Result<bool, PersistError> {
    let Some(build_data) = &self.build_data else {
      debug!(project = %self.id, "[BG] no build data to store");
      return Ok(false);
    };
    if !build_data.is_dirty() {
      debug!(project = %self.id, "[BG] build graph is unchanged in project");
      return Ok(false);
    }

    let path = self.build_graph_file_path();
    let bytes = persist::store(self)?;
    write_atomically(&path, &bytes)?;
    build_data.set_dirty(false);
    info!(path = %path.display(), bytes = bytes.len(), "[BG] stored build graph");
    Ok(true)
  }

  pub fn load_build_graph(path: &Path) -> Result<Self, PersistError> {
    let bytes = fs::read(path).map_err(|source| PersistError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    persist::load(&bytes)
  }

  fn store_project(&self, pool: &mut PoolWriter, id: ProjectId) -> Result<(), PersistError> {
    let project = self
      .project(id)
      .ok_or_else(|| PersistError::Encode(format!("dangling project handle {id:?}")))?;
    pool.store_string(&project.name)?;
    pool.write(&project.location)?;
    pool.write(&project.enabled)?;
    pool.write(&project.properties)?;
    pool.store_container(&project.products)?;
    pool.write_len(project.sub_projects.len())?;
    for &child in &project.sub_projects {
      self.store_project(pool, child)?;
    }
    Ok(())
  }

  fn load_project(
    pool: &mut PoolReader<'_>,
    projects: &mut Vec<Project>,
    parent: Option<ProjectId>,
  ) -> Result<ProjectId, PersistError> {
    let id = ProjectId::from_index(projects.len()).map_err(|e| PersistError::corrupt(e.to_string()))?;
    let mut project = Project::new(pool.load_string()?);
    project.location = pool.read()?;
    project.enabled = pool.read()?;
    project.properties = pool.read()?;
    project.products = pool.load_container()?;
    for product in &mut project.products {
      product.project = Some(id);
    }
    project.parent = parent;
    projects.push(project);

    let children = pool.read_len()?;
    for _ in 0..children {
      let child = Self::load_project(pool, projects, Some(id))?;
      let project = projects
        .get_mut(id.index())
        .ok_or_else(|| PersistError::corrupt(format!("lost project {id:?} while loading")))?;
      project.sub_projects.push(child);
    }
    Ok(id)
  }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
  let io_error = |path: &Path| {
    let path = path.to_path_buf();
    move |source: std::io::Error| PersistError::Io { path, source }
  };
  let dir = path.parent().unwrap_or(Path::new("."));
  fs::create_dir_all(dir).map_err(io_error(dir))?;

  let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_error(dir))?;
  file.write_all(bytes).map_err(io_error(file.path()))?;
  file.persist(path).map_err(|e| PersistError::Io {
    path: path.to_path_buf(),
    source: e.error,
  })?;
  Ok(())
}

impl Persistent for TopLevelProject {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    self.store_project(pool, ProjectId::ROOT)?;
    pool.store_string(&self.id)?;
    pool.store_path(&self.build_directory)?;
    pool.write(&self.platform_environment)?;
    pool.write(&self.used_environment)?;
    pool.write(&self.environment)?;
    match &self.build_data {
      Some(build_data) => {
        pool.write(&true)?;
        build_data.store(pool)
      }
      None => pool.write(&false),
    }
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    let mut projects = Vec::new();
    Self::load_project(pool, &mut projects, None)?;
    let id = pool.load_string()?;
    let build_directory = pool.load_path()?;
    let platform_environment = pool.read()?;
    let used_environment = pool.read()?;
    let environment = pool.read()?;
    let has_build_data: bool = pool.read()?;
    let build_data = if has_build_data {
      Some(ProjectBuildData::load(pool)?)
    } else {
      None
    };
    Ok(Self {
      projects,
      id,
      build_directory,
      build_configuration: pool.head().build_configuration.clone(),
      platform_environment,
      used_environment,
      environment,
      build_data,
    })
  }
}

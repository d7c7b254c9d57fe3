use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::persist::{PersistError, Persistent, PoolReader, PoolWriter};

use super::artifact::{SourceArtifact, SourceWildCards};
use super::location::{CodeLocation, FileTags};
use super::property::PropertyMap;

/// A named set of source files with shared property overrides.
#[derive(Debug, Clone)]
pub struct Group {
  pub name: String,
  pub enabled: bool,
  pub location: CodeLocation,
  pub files: Vec<Arc<SourceArtifact>>,
  pub wildcards: Option<SourceWildCards>,
  pub properties: Arc<PropertyMap>,
}

impl Group {
  pub fn new(name: impl Into<String>, properties: Arc<PropertyMap>) -> Self {
    Self {
      name: name.into(),
      enabled: true,
      location: CodeLocation::default(),
      files: Vec::new(),
      wildcards: None,
      properties,
    }
  }

  /// Explicit files followed by wildcard matches.
  ///
  /// Wildcard matches are created with the group's properties and the tags `tag_file`
  /// returns for their file name.
  pub fn all_files(&self, base_dir: &Path, tag_file: impl Fn(&Path) -> FileTags) -> Vec<Arc<SourceArtifact>> {
    let mut files = self.files.clone();
    if let Some(wildcards) = &self.wildcards {
      let make_artifact = |path: PathBuf| {
        let tags = tag_file(&path);
        Arc::new(SourceArtifact::new(path, tags, self.properties.clone()))
      };
      files.extend(wildcards.files(base_dir, make_artifact).iter().cloned());
    }
    files
  }
}

impl Persistent for Group {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_string(&self.name)?;
    pool.write(&self.enabled)?;
    pool.write(&self.location)?;
    pool.store_shared_container(&self.files)?;
    match &self.wildcards {
      Some(wildcards) => {
        pool.write(&true)?;
        wildcards.store(pool)?;
      }
      None => pool.write(&false)?,
    }
    pool.store_shared(&self.properties)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    let name = pool.load_string()?;
    let enabled = pool.read()?;
    let location = pool.read()?;
    let files = pool.load_shared_container()?;
    let has_wildcards: bool = pool.read()?;
    let wildcards = if has_wildcards {
      Some(SourceWildCards::load(pool)?)
    } else {
      None
    };
    Ok(Self {
      name,
      enabled,
      location,
      files,
      wildcards,
      properties: pool.load_shared()?,
    })
  }
}

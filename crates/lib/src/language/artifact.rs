use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::persist::{PersistError, Persistent, PoolReader, PoolWriter};
use crate::util::glob::glob_matches;
use crate::wildcards;

use super::location::FileTags;
use super::property::PropertyMap;

/// Infers file tags from a file name pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTagger {
  pattern: String,
  file_tags: FileTags,
}

impl FileTagger {
  pub fn new(pattern: impl Into<String>, file_tags: FileTags) -> Self {
    Self {
      pattern: pattern.into(),
      file_tags,
    }
  }

  pub fn pattern(&self) -> &str {
    &self.pattern
  }

  pub fn file_tags(&self) -> &FileTags {
    &self.file_tags
  }

  pub fn matches(&self, file_name: &str) -> bool {
    glob_matches(&self.pattern, file_name)
  }
}

impl Persistent for FileTagger {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_string(&self.pattern)?;
    pool.store_string_set(&self.file_tags)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    Ok(Self {
      pattern: pool.load_string()?,
      file_tags: pool.load_string_set()?,
    })
  }
}

/// One concrete source file of a product.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceArtifact {
  pub absolute_file_path: PathBuf,
  pub file_tags: FileTags,
  pub properties: Arc<PropertyMap>,
}

impl SourceArtifact {
  pub fn new(absolute_file_path: impl Into<PathBuf>, file_tags: FileTags, properties: Arc<PropertyMap>) -> Self {
    Self {
      absolute_file_path: absolute_file_path.into(),
      file_tags,
      properties,
    }
  }
}

impl Persistent for SourceArtifact {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_path(&self.absolute_file_path)?;
    pool.store_string_set(&self.file_tags)?;
    pool.store_shared(&self.properties)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    Ok(Self {
      absolute_file_path: pool.load_path()?,
      file_tags: pool.load_string_set()?,
      properties: pool.load_shared()?,
    })
  }
}

/// Wildcard file specification of a group.
///
/// The expansion is computed on first use and kept for the lifetime of the object,
/// including across a store/load round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceWildCards {
  pub prefix: String,
  pub patterns: Vec<String>,
  pub exclude_patterns: Vec<String>,
  files: OnceLock<Vec<Arc<SourceArtifact>>>,
}

impl SourceWildCards {
  pub fn new(prefix: impl Into<String>, patterns: Vec<String>, exclude_patterns: Vec<String>) -> Self {
    Self {
      prefix: prefix.into(),
      patterns,
      exclude_patterns,
      files: OnceLock::new(),
    }
  }

  /// Paths currently matched by the patterns, without touching the cache.
  pub fn expand_patterns(&self, base_dir: &Path) -> BTreeSet<PathBuf> {
    wildcards::expand_patterns(&self.prefix, &self.patterns, &self.exclude_patterns, base_dir)
  }

  /// Matched files as artifacts, expanded once.
  pub fn files(
    &self,
    base_dir: &Path,
    make_artifact: impl FnMut(PathBuf) -> Arc<SourceArtifact>,
  ) -> &[Arc<SourceArtifact>] {
    self
      .files
      .get_or_init(|| self.expand_patterns(base_dir).into_iter().map(make_artifact).collect())
  }

  pub fn cached_files(&self) -> Option<&[Arc<SourceArtifact>]> {
    self.files.get().map(Vec::as_slice)
  }
}

impl Persistent for SourceWildCards {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.store_string(&self.prefix)?;
    pool.store_string_list(&self.patterns)?;
    pool.store_string_list(&self.exclude_patterns)?;
    match self.files.get() {
      Some(files) => {
        pool.write(&true)?;
        pool.store_shared_container(files)
      }
      None => pool.write(&false),
    }
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    let wildcards = Self::new(pool.load_string()?, pool.load_string_list()?, pool.load_string_list()?);
    let expanded: bool = pool.read()?;
    if expanded {
      let files = pool.load_shared_container()?;
      let _ = wildcards.files.set(files);
    }
    Ok(wildcards)
  }
}

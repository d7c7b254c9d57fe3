//! Error and head types for the persistent object pool.

use std::path::PathBuf;

use thiserror::Error;

use crate::consts::FORMAT_VERSION;
use crate::language::PropertyMap;

/// Pool-local identifier of a stored object or string.
///
/// Identifiers are assigned in first-write order starting at 1.
pub type PersistentObjectId = u32;

/// Identifier written for an absent optional reference.
pub const NULL_OBJECT_ID: PersistentObjectId = 0;

/// Errors raised while storing or loading a build graph.
#[derive(Debug, Error)]
pub enum PersistError {
  /// The stream is truncated, out of sequence, or otherwise malformed.
  #[error("corrupt persistent state: {0}")]
  CorruptPersistentState(String),

  /// The stream was written by an incompatible format version.
  #[error("build graph format version mismatch: expected {expected}, found {found}")]
  VersionMismatch { expected: u32, found: u32 },

  /// A value could not be encoded into the stream.
  #[error("cannot encode build graph: {0}")]
  Encode(String),

  /// Reading or writing a build graph file failed.
  #[error("cannot access {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl PersistError {
  pub(crate) fn corrupt(message: impl Into<String>) -> Self {
    PersistError::CorruptPersistentState(message.into())
  }
}

/// Metadata written at the head of every stream, before any object.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadData {
  /// Format version the stream was written with.
  pub format_version: u32,
  /// Build configuration the stored graph was resolved with.
  pub build_configuration: PropertyMap,
}

impl HeadData {
  pub fn new(build_configuration: PropertyMap) -> Self {
    Self {
      format_version: FORMAT_VERSION,
      build_configuration,
    }
  }
}

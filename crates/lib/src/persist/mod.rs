//! Persistence of resolved project trees.
//!
//! A resolved [`TopLevelProject`] is written to a byte stream between invocations so the
//! next run can reuse it for incremental builds. See [`pool`] for the stream layout.

mod pool;
mod types;

pub use pool::{Persistent, PoolReader, PoolWriter};
pub use types::*;

use tracing::debug;

use crate::language::TopLevelProject;

/// Serialize a whole project tree.
pub fn store(project: &TopLevelProject) -> Result<Vec<u8>, PersistError> {
  let mut pool = PoolWriter::new(&HeadData::new(project.build_configuration().clone()))?;
  project.store(&mut pool)?;
  let bytes = pool.into_bytes();
  debug!(project = %project.id(), bytes = bytes.len(), "[BG] stored project tree");
  Ok(bytes)
}

/// Rebuild a project tree from bytes written by [`store`].
///
/// No partial tree is returned on failure.
pub fn load(bytes: &[u8]) -> Result<TopLevelProject, PersistError> {
  let mut pool = PoolReader::new(bytes)?;
  let project = TopLevelProject::load(&mut pool)?;
  pool.finish()?;
  debug!(project = %project.id(), "[BG] loaded project tree");
  Ok(project)
}

//! Identity-preserving object pool.
//!
//! Objects shared by several owners (modules, property maps, rules, artifacts) are
//! written once and referenced by a pool-local id afterwards. Loading rebuilds each
//! object exactly once, so `Arc` sharing before a store is `Arc` sharing after a load.
//!
//! # Stream layout
//!
//! ```text
//! magic  version  build-configuration  payload...
//! ```
//!
//! Primitives are postcard-encoded. A shared reference is its id, followed by the
//! object payload only the first time that id appears.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::consts::{BUILD_GRAPH_MAGIC, FORMAT_VERSION};

use super::types::{HeadData, NULL_OBJECT_ID, PersistError, PersistentObjectId};

/// A type that can be written to and read back from a pool.
pub trait Persistent: Sized {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError>;
  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError>;
}

type SharedObject = Arc<dyn Any + Send + Sync>;

/// Write side of the pool. Id tables live for one store operation.
pub struct PoolWriter {
  buf: Vec<u8>,
  object_ids: HashMap<(TypeId, usize), PersistentObjectId>,
  string_ids: HashMap<String, PersistentObjectId>,
}

impl PoolWriter {
  /// Start a stream with the given head data.
  pub fn new(head: &HeadData) -> Result<Self, PersistError> {
    let mut writer = Self {
      buf: BUILD_GRAPH_MAGIC.to_vec(),
      object_ids: HashMap::new(),
      string_ids: HashMap::new(),
    };
    writer.write(&head.format_version)?;
    writer.write(&head.build_configuration)?;
    Ok(writer)
  }

  /// Append one primitive value.
  pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), PersistError> {
    let bytes = postcard::to_allocvec(value).map_err(|e| PersistError::Encode(e.to_string()))?;
    self.buf.extend_from_slice(&bytes);
    Ok(())
  }

  pub fn write_len(&mut self, len: usize) -> Result<(), PersistError> {
    let len = u32::try_from(len).map_err(|_| PersistError::Encode(format!("container too large: {len}")))?;
    self.write(&len)
  }

  /// Store a string through the string id table.
  pub fn store_string(&mut self, value: &str) -> Result<(), PersistError> {
    if let Some(&id) = self.string_ids.get(value) {
      return self.write(&id);
    }
    let id = next_id(self.string_ids.len())?;
    self.string_ids.insert(value.to_string(), id);
    self.write(&id)?;
    self.write(&value)
  }

  pub fn store_string_list(&mut self, values: &[String]) -> Result<(), PersistError> {
    self.write_len(values.len())?;
    for value in values {
      self.store_string(value)?;
    }
    Ok(())
  }

  pub fn store_string_set(&mut self, values: &BTreeSet<String>) -> Result<(), PersistError> {
    self.write_len(values.len())?;
    for value in values {
      self.store_string(value)?;
    }
    Ok(())
  }

  /// Store a path as its raw OS bytes, so names that are not valid UTF-8 survive.
  pub fn store_path(&mut self, path: &Path) -> Result<(), PersistError> {
    let bytes = path_to_bytes(path)?;
    self.write(&bytes.as_slice())
  }

  pub fn store_path_set(&mut self, paths: &BTreeSet<PathBuf>) -> Result<(), PersistError> {
    self.write_len(paths.len())?;
    for path in paths {
      self.store_path(path)?;
    }
    Ok(())
  }

  /// Store a shared object by reference.
  ///
  /// Identity is the allocation, so two `Arc`s pointing at one object produce one
  /// payload and two references.
  pub fn store_shared<T: Persistent + 'static>(&mut self, object: &Arc<T>) -> Result<(), PersistError> {
    let key = (TypeId::of::<T>(), Arc::as_ptr(object) as *const () as usize);
    if let Some(&id) = self.object_ids.get(&key) {
      return self.write(&id);
    }
    let id = next_id(self.object_ids.len())?;
    self.object_ids.insert(key, id);
    trace!(id, kind = std::any::type_name::<T>(), "storing shared object");
    self.write(&id)?;
    object.store(self)
  }

  pub fn store_optional_shared<T: Persistent + 'static>(&mut self, object: Option<&Arc<T>>) -> Result<(), PersistError> {
    match object {
      Some(object) => self.store_shared(object),
      None => self.write(&NULL_OBJECT_ID),
    }
  }

  /// Store exclusively owned elements, count first.
  pub fn store_container<T: Persistent>(&mut self, items: &[T]) -> Result<(), PersistError> {
    self.write_len(items.len())?;
    for item in items {
      item.store(self)?;
    }
    Ok(())
  }

  pub fn store_shared_container<T: Persistent + 'static>(&mut self, items: &[Arc<T>]) -> Result<(), PersistError> {
    self.write_len(items.len())?;
    for item in items {
      self.store_shared(item)?;
    }
    Ok(())
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.buf
  }
}

fn next_id(assigned: usize) -> Result<PersistentObjectId, PersistError> {
  assigned
    .checked_add(1)
    .and_then(|id| PersistentObjectId::try_from(id).ok())
    .ok_or_else(|| PersistError::Encode("object id space exhausted".to_string()))
}

/// Read side of the pool.
pub struct PoolReader<'a> {
  rest: &'a [u8],
  head: HeadData,
  objects: Vec<Option<SharedObject>>,
  strings: Vec<String>,
}

impl<'a> PoolReader<'a> {
  /// Validate the stream head.
  ///
  /// Fails before any object is constructed if the magic or version does not match.
  pub fn new(bytes: &'a [u8]) -> Result<Self, PersistError> {
    let rest = bytes
      .strip_prefix(BUILD_GRAPH_MAGIC)
      .ok_or_else(|| PersistError::corrupt("stream does not start with a build graph header"))?;
    let mut reader = Self {
      rest,
      head: HeadData::new(Default::default()),
      objects: Vec::new(),
      strings: Vec::new(),
    };
    let found: u32 = reader.read()?;
    if found != FORMAT_VERSION {
      return Err(PersistError::VersionMismatch {
        expected: FORMAT_VERSION,
        found,
      });
    }
    reader.head.build_configuration = reader.read()?;
    Ok(reader)
  }

  pub fn head(&self) -> &HeadData {
    &self.head
  }

  /// Read one primitive value.
  pub fn read<T: DeserializeOwned>(&mut self) -> Result<T, PersistError> {
    let (value, rest) = postcard::take_from_bytes::<T>(self.rest).map_err(|e| PersistError::corrupt(e.to_string()))?;
    self.rest = rest;
    Ok(value)
  }

  pub fn read_len(&mut self) -> Result<usize, PersistError> {
    let len: u32 = self.read()?;
    usize::try_from(len).map_err(|_| PersistError::corrupt(format!("container length {len} does not fit")))
  }

  pub fn load_string(&mut self) -> Result<String, PersistError> {
    let id: PersistentObjectId = self.read()?;
    let index = slot_index(id)?;
    if let Some(value) = self.strings.get(index) {
      return Ok(value.clone());
    }
    if index != self.strings.len() {
      return Err(PersistError::corrupt(format!("string id {id} out of sequence")));
    }
    let value: String = self.read()?;
    self.strings.push(value.clone());
    Ok(value)
  }

  pub fn load_string_list(&mut self) -> Result<Vec<String>, PersistError> {
    let len = self.read_len()?;
    (0..len).map(|_| self.load_string()).collect()
  }

  pub fn load_string_set(&mut self) -> Result<BTreeSet<String>, PersistError> {
    let len = self.read_len()?;
    (0..len).map(|_| self.load_string()).collect()
  }

  pub fn load_path(&mut self) -> Result<PathBuf, PersistError> {
    let bytes: Vec<u8> = self.read()?;
    path_from_bytes(bytes)
  }

  pub fn load_path_set(&mut self) -> Result<BTreeSet<PathBuf>, PersistError> {
    let len = self.read_len()?;
    (0..len).map(|_| self.load_path()).collect()
  }

  pub fn load_shared<T: Persistent + Send + Sync + 'static>(&mut self) -> Result<Arc<T>, PersistError> {
    self
      .load_optional_shared()?
      .ok_or_else(|| PersistError::corrupt(format!("unexpected null {}", std::any::type_name::<T>())))
  }

  /// Load a shared object, reusing the instance if its id was seen before.
  pub fn load_optional_shared<T: Persistent + Send + Sync + 'static>(&mut self) -> Result<Option<Arc<T>>, PersistError> {
    let id: PersistentObjectId = self.read()?;
    if id == NULL_OBJECT_ID {
      return Ok(None);
    }
    let index = slot_index(id)?;

    if let Some(slot) = self.objects.get(index) {
      let object = slot
        .clone()
        .ok_or_else(|| PersistError::corrupt(format!("object {id} references itself while loading")))?;
      return object
        .downcast::<T>()
        .map(Some)
        .map_err(|_| PersistError::corrupt(format!("object {id} is not a {}", std::any::type_name::<T>())));
    }

    if index != self.objects.len() {
      return Err(PersistError::corrupt(format!("object id {id} out of sequence")));
    }

    // Reserve the slot first so nested objects get the ids they were written with.
    self.objects.push(None);
    let object = Arc::new(T::load(self)?);
    if let Some(slot) = self.objects.get_mut(index) {
      *slot = Some(object.clone() as SharedObject);
    }
    Ok(Some(object))
  }

  pub fn load_container<T: Persistent>(&mut self) -> Result<Vec<T>, PersistError> {
    let len = self.read_len()?;
    (0..len).map(|_| T::load(self)).collect()
  }

  pub fn load_shared_container<T: Persistent + Send + Sync + 'static>(&mut self) -> Result<Vec<Arc<T>>, PersistError> {
    let len = self.read_len()?;
    (0..len).map(|_| self.load_shared()).collect()
  }

  /// Check that the whole stream was consumed and hand back the head data.
  pub fn finish(self) -> Result<HeadData, PersistError> {
    if !self.rest.is_empty() {
      return Err(PersistError::corrupt(format!("{} trailing bytes", self.rest.len())));
    }
    Ok(self.head)
  }
}

fn slot_index(id: PersistentObjectId) -> Result<usize, PersistError> {
  id.checked_sub(1)
    .and_then(|index| usize::try_from(index).ok())
    .ok_or_else(|| PersistError::corrupt(format!("invalid id {id}")))
}

#[cfg(unix)]
fn path_to_bytes(path: &Path) -> Result<Vec<u8>, PersistError> {
  use std::os::unix::ffi::OsStrExt;
  Ok(path.as_os_str().as_bytes().to_vec())
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> Result<PathBuf, PersistError> {
  use std::os::unix::ffi::OsStringExt;
  Ok(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

// Outside unix the OS encoding is not exposed safely; paths must be unicode there.
#[cfg(not(unix))]
fn path_to_bytes(path: &Path) -> Result<Vec<u8>, PersistError> {
  path
    .to_str()
    .map(|s| s.as_bytes().to_vec())
    .ok_or_else(|| PersistError::Encode(format!("path is not valid unicode: {}", path.display())))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> Result<PathBuf, PersistError> {
  String::from_utf8(bytes)
    .map(PathBuf::from)
    .map_err(|_| PersistError::corrupt("path is not valid unicode"))
}

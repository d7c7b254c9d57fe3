//! Typed property values.
//!
//! Resolved configuration arrives as nested, string-keyed property bags. They are held
//! as an ordered map of tagged values so they can be persisted and handed to setup
//! scripts without going through dynamic objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::MODULES_PROPERTY_KEY;
use crate::persist::{PersistError, Persistent, PoolReader, PoolWriter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
  String(String),
  Number(f64),
  Boolean(bool),
  List(Vec<PropertyValue>),
  Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      PropertyValue::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&BTreeMap<String, PropertyValue>> {
    match self {
      PropertyValue::Map(map) => Some(map),
      _ => None,
    }
  }

  /// Render the value the way it ends up in a process environment.
  pub fn to_env_string(&self) -> String {
    match self {
      PropertyValue::String(s) => s.clone(),
      PropertyValue::Number(n) => n.to_string(),
      PropertyValue::Boolean(b) => b.to_string(),
      PropertyValue::List(items) => items.iter().map(PropertyValue::to_env_string).collect::<Vec<_>>().join(","),
      PropertyValue::Map(_) => String::new(),
    }
  }
}

impl From<&str> for PropertyValue {
  fn from(value: &str) -> Self {
    PropertyValue::String(value.to_string())
  }
}

impl From<String> for PropertyValue {
  fn from(value: String) -> Self {
    PropertyValue::String(value)
  }
}

impl From<f64> for PropertyValue {
  fn from(value: f64) -> Self {
    PropertyValue::Number(value)
  }
}

impl From<bool> for PropertyValue {
  fn from(value: bool) -> Self {
    PropertyValue::Boolean(value)
  }
}

impl From<Vec<PropertyValue>> for PropertyValue {
  fn from(value: Vec<PropertyValue>) -> Self {
    PropertyValue::List(value)
  }
}

impl From<PropertyMap> for PropertyValue {
  fn from(value: PropertyMap) -> Self {
    PropertyValue::Map(value.0)
  }
}

/// Errors converting external values into properties.
#[derive(Debug, Error)]
pub enum PropertyError {
  #[error("null is not a valid property value (at '{0}')")]
  Null(String),

  #[error("number at '{0}' cannot be represented")]
  Number(String),

  #[error("expected an object at the top level of a property map")]
  NotAnObject,
}

impl TryFrom<serde_json::Value> for PropertyValue {
  type Error = PropertyError;

  fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
    json_to_property(value, "$")
  }
}

fn json_to_property(value: serde_json::Value, at: &str) -> Result<PropertyValue, PropertyError> {
  use serde_json::Value;

  match value {
    Value::Null => Err(PropertyError::Null(at.to_string())),
    Value::Bool(b) => Ok(PropertyValue::Boolean(b)),
    Value::Number(n) => n.as_f64().map(PropertyValue::Number).ok_or_else(|| PropertyError::Number(at.to_string())),
    Value::String(s) => Ok(PropertyValue::String(s)),
    Value::Array(items) => items
      .into_iter()
      .enumerate()
      .map(|(i, item)| json_to_property(item, &format!("{at}[{i}]")))
      .collect::<Result<Vec<_>, _>>()
      .map(PropertyValue::List),
    Value::Object(map) => map
      .into_iter()
      .map(|(k, v)| {
        let value = json_to_property(v, &format!("{at}.{k}"))?;
        Ok((k, value))
      })
      .collect::<Result<BTreeMap<_, _>, _>>()
      .map(PropertyValue::Map),
  }
}

/// An ordered mapping from property name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap(BTreeMap<String, PropertyValue>);

impl PropertyMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
    self.0.insert(name.into(), value.into());
  }

  pub fn get(&self, name: &str) -> Option<&PropertyValue> {
    self.0.get(name)
  }

  /// Look up a value by dotted path, e.g. `keel.profile`.
  pub fn get_path(&self, path: &str) -> Option<&PropertyValue> {
    let mut segments = path.split('.');
    let mut current = self.0.get(segments.next()?)?;
    for segment in segments {
      current = current.as_map()?.get(segment)?;
    }
    Some(current)
  }

  /// The resolved configuration of one module within a product's properties.
  pub fn module_properties(&self, module: &str) -> Option<&BTreeMap<String, PropertyValue>> {
    self.0.get(MODULES_PROPERTY_KEY)?.as_map()?.get(module)?.as_map()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
    self.0.iter()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }
}

impl TryFrom<serde_json::Value> for PropertyMap {
  type Error = PropertyError;

  fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
    match PropertyValue::try_from(value)? {
      PropertyValue::Map(map) => Ok(Self(map)),
      _ => Err(PropertyError::NotAnObject),
    }
  }
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for PropertyMap {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}

impl Persistent for PropertyMap {
  fn store(&self, pool: &mut PoolWriter) -> Result<(), PersistError> {
    pool.write(self)
  }

  fn load(pool: &mut PoolReader<'_>) -> Result<Self, PersistError> {
    pool.read()
  }
}

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A set of file tags. Ordered so stored graphs are byte-for-byte reproducible.
pub type FileTags = BTreeSet<String>;

/// Build a [`FileTags`] set from string literals.
pub fn file_tags<I, S>(tags: I) -> FileTags
where
  I: IntoIterator<Item = S>,
  S: Into<String>,
{
  tags.into_iter().map(Into::into).collect()
}

/// Position of an item in a project file, kept for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLocation {
  pub file_name: String,
  pub line: u32,
  pub column: u32,
}

impl CodeLocation {
  pub fn new(file_name: impl Into<String>, line: u32, column: u32) -> Self {
    Self {
      file_name: file_name.into(),
      line,
      column,
    }
  }
}

impl fmt::Display for CodeLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.file_name, self.line, self.column)
  }
}

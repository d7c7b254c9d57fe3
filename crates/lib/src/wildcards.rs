//! Wildcard expansion against the filesystem.
//!
//! Patterns are split into path segments and matched one directory level at a time.
//! A `**` segment turns on recursive descent for the segment that follows it; a
//! trailing `**` matches every file at every depth below the current directory.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use tracing::trace;
use walkdir::WalkDir;

use crate::util::glob::{glob_matches, is_pattern};

/// Expand `patterns` relative to `base_dir`, minus whatever `exclude_patterns` match.
///
/// `prefix` is prepended to every pattern. Unreadable directories are skipped.
pub fn expand_patterns(
  prefix: &str,
  patterns: &[String],
  exclude_patterns: &[String],
  base_dir: &Path,
) -> BTreeSet<PathBuf> {
  let mut files = expand_all(prefix, patterns, base_dir);
  for excluded in expand_all(prefix, exclude_patterns, base_dir) {
    files.remove(&excluded);
  }
  files
}

fn expand_all(prefix: &str, patterns: &[String], base_dir: &Path) -> BTreeSet<PathBuf> {
  let mut files = BTreeSet::new();
  for pattern in patterns {
    let pattern = format!("{prefix}{pattern}").replace('\\', "/");
    let mut parts: Vec<&str> = pattern.split('/').filter(|part| !part.is_empty()).collect();
    match absolute_root(&pattern, &mut parts) {
      Some(root) => expand_parts(&mut files, &parts, &root),
      None => expand_parts(&mut files, &parts, base_dir),
    }
  }
  files
}

#[cfg(not(windows))]
fn absolute_root(pattern: &str, _parts: &mut Vec<&str>) -> Option<PathBuf> {
  pattern.starts_with('/').then(|| PathBuf::from("/"))
}

/// Drive-rooted patterns start at the named drive.
#[cfg(windows)]
fn absolute_root(pattern: &str, parts: &mut Vec<&str>) -> Option<PathBuf> {
  let bytes = pattern.as_bytes();
  if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && !parts.is_empty() {
    let drive = parts.remove(0);
    return Some(PathBuf::from(format!("{drive}/")));
  }
  pattern.starts_with('/').then(|| PathBuf::from("/"))
}

fn expand_parts(files: &mut BTreeSet<PathBuf>, parts: &[&str], base_dir: &Path) {
  let Some((&first, mut rest)) = parts.split_first() else {
    return;
  };
  let mut part = first;
  let mut recursive = false;
  while part == "**" {
    recursive = true;
    match rest.split_first() {
      Some((&next, remaining)) => {
        part = next;
        rest = remaining;
      }
      None => {
        part = "*";
        break;
      }
    }
  }

  let want_dirs = !rest.is_empty();
  for path in matching_entries(base_dir, part, want_dirs, recursive) {
    if want_dirs {
      expand_parts(files, rest, &path);
    } else {
      files.insert(clean_path(&path));
    }
  }
}

/// Entries below `dir` whose name matches `part`, directories or files only.
fn matching_entries(dir: &Path, part: &str, want_dirs: bool, recursive: bool) -> Vec<PathBuf> {
  if part == "." || part == ".." || (!recursive && !is_pattern(part)) {
    let path = dir.join(part);
    let kind_matches = if want_dirs { path.is_dir() } else { path.is_file() };
    return if kind_matches { vec![path] } else { Vec::new() };
  }

  // Hidden entries are entered only when the segment names them exactly.
  let walker = WalkDir::new(dir)
    .min_depth(1)
    .max_depth(if recursive { usize::MAX } else { 1 })
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()) || entry.file_name() == part);

  let mut matches = Vec::new();
  for entry in walker {
    let entry = match entry {
      Ok(entry) => entry,
      Err(err) => {
        trace!(dir = %dir.display(), error = %err, "skipping unreadable entry");
        continue;
      }
    };
    let path = entry.path();
    let kind_matches = if want_dirs { path.is_dir() } else { path.is_file() };
    if kind_matches && glob_matches(part, &entry.file_name().to_string_lossy()) {
      matches.push(path.to_path_buf());
    }
  }
  matches
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
  name.to_string_lossy().starts_with('.')
}

/// Lexically resolve `.` and `..` components.
fn clean_path(path: &Path) -> PathBuf {
  let mut cleaned = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !cleaned.pop() {
          cleaned.push(component);
        }
      }
      other => cleaned.push(other),
    }
  }
  cleaned
}

//! Wildcard expansion over real directory trees.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use keel_lib::wildcards::expand_patterns;
use tempfile::TempDir;

fn tree(files: &[&str]) -> TempDir {
  let dir = tempfile::tempdir().unwrap();
  for file in files {
    let path = dir.path().join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
  }
  dir
}

fn strings(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}

fn under(root: &Path, files: &[&str]) -> BTreeSet<PathBuf> {
  files.iter().map(|f| root.join(f)).collect()
}

#[test]
fn excludes_are_subtracted() {
  let dir = tree(&["a.cpp", "b.cpp", "generated.cpp", "notes.txt"]);
  let found = expand_patterns("", &strings(&["*.cpp"]), &strings(&["generated.cpp"]), dir.path());
  assert_eq!(found, under(dir.path(), &["a.cpp", "b.cpp"]));
}

#[test]
fn expansion_is_idempotent() {
  let dir = tree(&["a.cpp", "b.cpp", "generated.cpp"]);
  let patterns = strings(&["*.cpp"]);
  let excludes = strings(&["generated.cpp"]);
  assert_eq!(
    expand_patterns("", &patterns, &excludes, dir.path()),
    expand_patterns("", &patterns, &excludes, dir.path())
  );
}

#[test]
fn recursive_pattern_reaches_every_depth() {
  let dir = tree(&["src/a.h", "src/sub/b.h", "src/sub/deep/c.h", "src/sub/deep/c.cpp"]);
  let found = expand_patterns("", &strings(&["**/*.h"]), &[], dir.path());
  assert_eq!(found, under(dir.path(), &["src/a.h", "src/sub/b.h", "src/sub/deep/c.h"]));
}

#[test]
fn overlapping_patterns_do_not_duplicate() {
  let dir = tree(&["a.cpp", "b.cpp"]);
  let found = expand_patterns("", &strings(&["*.cpp", "a.*", "**/a.cpp"]), &[], dir.path());
  assert_eq!(found, under(dir.path(), &["a.cpp", "b.cpp"]));
}

#[test]
fn recursive_literal_names_skip_hidden_directories() {
  let dir = tree(&["config.txt", "sub/config.txt", ".git/config.txt", ".cache/x/config.txt"]);
  let found = expand_patterns("", &strings(&["**/config.txt"]), &[], dir.path());
  assert_eq!(found, under(dir.path(), &["config.txt", "sub/config.txt"]));
}

#[test]
fn recursive_excludes_apply_at_every_depth() {
  let dir = tree(&["a.cpp", "test/a_test.cpp", "lib/test/b_test.cpp", "lib/b.cpp"]);
  let found = expand_patterns("", &strings(&["**/*.cpp"]), &strings(&["**/*_test.cpp"]), dir.path());
  assert_eq!(found, under(dir.path(), &["a.cpp", "lib/b.cpp"]));
}

#[test]
fn absolute_patterns_ignore_the_base_directory() {
  let dir = tree(&["abs/x.cpp"]);
  let elsewhere = tempfile::tempdir().unwrap();
  let pattern = format!("{}/abs/*.cpp", dir.path().to_string_lossy().replace('\\', "/"));

  let found = expand_patterns("", &[pattern], &[], elsewhere.path());
  assert_eq!(found.len(), 1);
  assert!(found.iter().all(|p| p.ends_with("abs/x.cpp")));
}

#[cfg(unix)]
#[test]
fn unreadable_directories_are_skipped() {
  use std::os::unix::fs::PermissionsExt;

  let dir = tree(&["open/a.cpp", "locked/b.cpp"]);
  let locked = dir.path().join("locked");
  fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
  // Privileged users can read anything, so the lock only shows when it holds.
  let lock_holds = fs::read_dir(&locked).is_err();

  let found = expand_patterns("", &strings(&["**/*.cpp"]), &[], dir.path());
  fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

  assert!(found.contains(&dir.path().join("open/a.cpp")));
  if lock_holds {
    assert_eq!(found.len(), 1);
  }
}

//! Round trips of whole project trees through the persistent pool.

use std::fs;
use std::sync::Arc;

use keel_lib::consts::BUILD_GRAPH_MAGIC;
use keel_lib::language::{ProjectId, TopLevelProject};
use keel_lib::persist::{self, PersistError};
use tracing_test::traced_test;

use super::common::{build_configuration, sample_project};

mod round_trip {
  use super::*;

  #[test]
  fn scalar_fields_survive() {
    let dir = tempfile::tempdir().unwrap();
    let top = sample_project(dir.path());

    let loaded = persist::load(&persist::store(&top).unwrap()).unwrap();

    assert_eq!(loaded.id(), "clang-debug");
    assert_eq!(loaded.build_configuration(), &build_configuration());
    assert_eq!(loaded.platform_environment, top.platform_environment);
    assert_eq!(loaded.used_environment(), top.used_environment());

    let app = loaded.product("app").unwrap();
    let original = top.product("app").unwrap();
    assert_eq!(app.name, original.name);
    assert_eq!(app.target_name, original.target_name);
    assert_eq!(app.file_tags, original.file_tags);
    assert_eq!(app.source_directory, original.source_directory);
    assert_eq!(app.file_taggers, original.file_taggers);
    assert_eq!(app.rules.len(), 2);
    assert_eq!(app.rules[1].inputs, original.rules[1].inputs);
    assert_eq!(app.rules[1].script, original.rules[1].script);
    assert_eq!(app.rules[1].artifacts, original.rules[1].artifacts);
    assert_eq!(app.groups[0].name, "sources");
    assert_eq!(app.groups[0].files[0].absolute_file_path, original.groups[0].files[0].absolute_file_path);
    assert_eq!(*app.properties, *original.properties);
  }

  #[test]
  fn shared_modules_stay_shared() {
    let dir = tempfile::tempdir().unwrap();
    let top = sample_project(dir.path());

    let loaded = persist::load(&persist::store(&top).unwrap()).unwrap();
    let app = loaded.product("app").unwrap();
    let tool = loaded.product("tool").unwrap();

    assert!(Arc::ptr_eq(&app.rules[0].module, &app.rules[1].module));
    assert!(Arc::ptr_eq(&app.rules[0].module, &app.modules[0]));
    assert!(Arc::ptr_eq(&app.modules[0], &tool.modules[0]));
    assert!(Arc::ptr_eq(&app.properties, &tool.properties));
    assert!(Arc::ptr_eq(&app.properties, &app.groups[0].properties));
    assert_eq!(app.modules[0].name, "cpp");
  }

  #[test]
  fn project_tree_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = persist::load(&persist::store(&sample_project(dir.path())).unwrap()).unwrap();

    let subs = loaded.all_sub_projects(ProjectId::ROOT).unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].name, "tools");
    assert_eq!(subs[0].parent(), Some(ProjectId::ROOT));

    let tool = loaded.product("tool").unwrap();
    let project = tool.project().unwrap();
    assert_ne!(project, ProjectId::ROOT);
    assert_eq!(loaded.top_level_of(project).unwrap(), ProjectId::ROOT);
    assert_eq!(tool.dependencies, vec!["app".to_string()]);
  }

  #[test]
  fn expanded_wildcards_are_not_rescanned() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/util.cpp"), "").unwrap();

    let top = sample_project(dir.path());
    assert_eq!(top.product("app").unwrap().all_files().len(), 2);

    let loaded = persist::load(&persist::store(&top).unwrap()).unwrap();
    fs::write(dir.path().join("src/new.cpp"), "").unwrap();

    let app = loaded.product("app").unwrap();
    let wildcards = app.groups[0].wildcards.as_ref().unwrap();
    assert_eq!(wildcards.cached_files().unwrap().len(), 1);
    let files = app.all_files();
    assert_eq!(files.len(), 2);
    assert!(files[1].absolute_file_path.ends_with("src/util.cpp"));
  }

  // Linux file systems accept any byte sequence in a name.
  #[cfg(target_os = "linux")]
  #[test]
  fn non_unicode_file_names_survive() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir().unwrap();
    let odd_name = OsStr::from_bytes(b"bad\xff.cpp");
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/ok.cpp"), "").unwrap();
    fs::write(dir.path().join("src").join(odd_name), "").unwrap();

    let mut top = sample_project(dir.path());
    top.build_directory = dir.path().join(odd_name);
    if let Some(build_data) = top.build_data.as_mut() {
      build_data.build_system_files.insert(dir.path().join("src").join(odd_name));
    }
    assert_eq!(top.product("app").unwrap().all_files().len(), 3);

    let loaded = persist::load(&persist::store(&top).unwrap()).unwrap();

    let files = loaded.product("app").unwrap().all_files();
    assert_eq!(files.len(), 3);
    assert!(files.iter().any(|f| f.absolute_file_path.file_name() == Some(odd_name)));
    assert_eq!(loaded.build_directory, top.build_directory);
    assert_eq!(
      loaded.build_data.as_ref().unwrap().build_system_files,
      top.build_data.as_ref().unwrap().build_system_files
    );
  }

  #[test]
  fn loaded_tree_still_sorts_rules() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = persist::load(&persist::store(&sample_project(dir.path())).unwrap()).unwrap();

    let app = loaded.product("app").unwrap();
    let sorted = app.top_sorted_rules().unwrap();
    assert!(Arc::ptr_eq(&sorted[0], &app.rules[1]));
    assert!(Arc::ptr_eq(&sorted[1], &app.rules[0]));
  }
}

mod failures {
  use super::*;

  #[test]
  fn truncated_stream_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = persist::store(&sample_project(dir.path())).unwrap();

    let err = persist::load(&bytes[..bytes.len() / 2]).unwrap_err();
    assert!(matches!(err, PersistError::CorruptPersistentState(_)));
  }

  #[test]
  fn trailing_garbage_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = persist::store(&sample_project(dir.path())).unwrap();
    bytes.extend_from_slice(&[1, 2, 3]);

    let err = persist::load(&bytes).unwrap_err();
    assert!(matches!(err, PersistError::CorruptPersistentState(_)));
  }

  #[test]
  fn other_format_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = persist::store(&sample_project(dir.path())).unwrap();
    // The version directly follows the magic; a single-byte varint for small values.
    let version_at = BUILD_GRAPH_MAGIC.len();
    bytes[version_at] = bytes[version_at].wrapping_add(1);

    let err = persist::load(&bytes).unwrap_err();
    assert!(matches!(err, PersistError::VersionMismatch { .. }));
  }
}

mod build_graph_file {
  use super::*;

  fn stored_project(root: &std::path::Path) -> TopLevelProject {
    let mut top = sample_project(root);
    top.build_directory = TopLevelProject::derive_build_directory(&root.join("build"), top.id());
    top
  }

  #[test]
  #[traced_test]
  fn written_only_when_dirty() {
    let dir = tempfile::tempdir().unwrap();
    let top = stored_project(dir.path());
    let path = top.build_graph_file_path();
    assert!(path.ends_with("build/clang-debug/clang-debug.bg"));

    assert!(top.store_build_graph().unwrap());
    assert!(path.is_file());
    assert!(!top.build_data.as_ref().unwrap().is_dirty());

    assert!(!top.store_build_graph().unwrap());
    assert!(logs_contain("[BG] build graph is unchanged"));
  }

  #[test]
  fn loads_back_clean() {
    let dir = tempfile::tempdir().unwrap();
    let top = stored_project(dir.path());
    top.store_build_graph().unwrap();

    let loaded = TopLevelProject::load_build_graph(&top.build_graph_file_path()).unwrap();
    assert_eq!(loaded.id(), top.id());
    assert_eq!(loaded.build_directory, top.build_directory);
    assert!(!loaded.build_data.as_ref().unwrap().is_dirty());
    assert_eq!(loaded.all_products().len(), 2);
  }

  #[test]
  fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = TopLevelProject::load_build_graph(&dir.path().join("nope.bg")).unwrap_err();
    assert!(matches!(err, PersistError::Io { .. }));
  }
}

//! Environment setup through products.

use std::sync::Arc;

use keel_lib::environment::{EnvironmentError, EnvironmentKind, ProcessEnvironment};
use keel_lib::language::{Module, Product, Project, ProjectError, ProjectId, TopLevelProject};
use keel_lib::script::ScriptEngine;

use super::common::sample_project;

fn module(name: &str, deps: &[&str], build: &str, run: &str) -> Arc<Module> {
  Arc::new(Module {
    module_dependencies: deps.iter().map(|d| d.to_string()).collect(),
    setup_build_environment_script: build.to_string(),
    setup_run_environment_script: run.to_string(),
    ..Module::new(name)
  })
}

fn project_with(modules: Vec<Arc<Module>>) -> TopLevelProject {
  let mut product = Product::new("app");
  product.modules = modules;
  let mut top = TopLevelProject::new(Project::new("root"));
  top.add_product(ProjectId::ROOT, product).unwrap();
  top
}

fn base() -> ProcessEnvironment {
  [("HOME", "/home/dev"), ("FOO", "0"), ("LANG", "C")]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[test]
fn single_module_sets_a_variable_and_keeps_the_rest() {
  let top = project_with(vec![module("m", &[], "putenv('FOO', '1')", "")]);
  let product = top.product("app").unwrap();

  let env = product
    .setup_build_environment(&ScriptEngine::new(), &top, &base())
    .unwrap();
  assert_eq!(env["FOO"], "1");
  assert_eq!(env["HOME"], "/home/dev");
  assert_eq!(env["LANG"], "C");
}

#[test]
fn dependent_module_sees_dependency_changes() {
  let top = project_with(vec![
    module("b", &["a"], "putenv('SEEN_BY_B', getenv('FROM_A'))", ""),
    module("a", &[], "putenv('FROM_A', 'a-was-here')", ""),
  ]);
  let product = top.product("app").unwrap();

  let env = product
    .setup_build_environment(&ScriptEngine::new(), &top, &base())
    .unwrap();
  assert_eq!(env["SEEN_BY_B"], "a-was-here");
}

#[test]
fn environment_is_computed_once_per_product() {
  let top = project_with(vec![module("m", &[], "putenv('N', (tonumber(getenv('N')) or 0) + 1)", "")]);
  let product = top.product("app").unwrap();
  let engine = ScriptEngine::new();

  assert!(product.build_environment().is_none());
  let first = product.setup_build_environment(&engine, &top, &base()).unwrap();
  assert_eq!(first["N"], "1");

  let mut changed = base();
  changed.insert("N".to_string(), "41".to_string());
  let second = product.setup_build_environment(&engine, &top, &changed).unwrap();
  assert_eq!(second["N"], "1");
  assert!(std::ptr::eq(first, second));
}

#[test]
fn run_environment_falls_back_to_build_script() {
  let top = project_with(vec![
    module("shared", &[], "putenv('MODE', 'build')", ""),
    module("split", &[], "putenv('SPLIT', 'build')", "putenv('SPLIT', 'run')"),
    module("build_only_skipped", &[], "", ""),
  ]);
  let product = top.product("app").unwrap();
  let engine = ScriptEngine::new();

  let run = product.setup_run_environment(&engine, &top, &base()).unwrap();
  assert_eq!(run["MODE"], "build");
  assert_eq!(run["SPLIT"], "run");

  let build = product.setup_build_environment(&engine, &top, &base()).unwrap();
  assert_eq!(build["SPLIT"], "build");
  assert!(product.run_environment().is_some());
}

#[test]
fn platform_environment_of_the_tree_is_applied() {
  let dir = tempfile::tempdir().unwrap();
  let top = sample_project(dir.path());
  let product = top.product("app").unwrap();

  let env = product
    .setup_build_environment(&ScriptEngine::new(), &top, &ProcessEnvironment::new())
    .unwrap();
  assert_eq!(env["PATH"], "/usr/bin");
  assert_eq!(env["CC"], "clang");
}

#[test]
fn failing_script_is_reported_per_kind() {
  let top = project_with(vec![module("broken", &[], "", "nil_value.field = 1")]);
  let product = top.product("app").unwrap();
  let engine = ScriptEngine::new();

  assert!(product.setup_build_environment(&engine, &top, &base()).is_ok());
  let err = product.setup_run_environment(&engine, &top, &base()).unwrap_err();
  assert!(matches!(
    err,
    EnvironmentError::EnvironmentSetupFailed { ref module, kind: EnvironmentKind::Run, .. } if module == "broken"
  ));
  assert!(err.to_string().starts_with("error while setting up run environment in module 'broken'"));
  assert!(product.run_environment().is_none());
}

#[test]
fn product_of_another_tree_is_rejected() {
  let owner = project_with(vec![module("m", &[], "putenv('FOO', '1')", "")]);
  let other = project_with(vec![module("m", &[], "putenv('FOO', '2')", "")]);
  let product = owner.product("app").unwrap();

  let err = product
    .setup_build_environment(&ScriptEngine::new(), &other, &base())
    .unwrap_err();
  assert!(matches!(err, EnvironmentError::Project(ProjectError::ForeignProduct(ref name)) if name == "app"));
  assert!(product.build_environment().is_none());
}

#[test]
fn detached_product_is_rejected() {
  let top = project_with(Vec::new());
  let product = Product::new("loose");

  let err = product
    .setup_run_environment(&ScriptEngine::new(), &top, &base())
    .unwrap_err();
  assert!(matches!(err, EnvironmentError::Project(ProjectError::ForeignProduct(_))));
}

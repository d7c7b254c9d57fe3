//! Fixtures shared by the library tests.

use std::path::Path;
use std::sync::Arc;

use keel_lib::language::{
  FileTagger, Group, Module, PrepareScript, Product, Project, ProjectBuildData, ProjectId, PropertyMap, Rule,
  RuleArtifact, SourceArtifact, SourceWildCards, TopLevelProject, file_tags,
};
use serde_json::json;

pub fn rule(module: &Arc<Module>, inputs: &[&str], outputs: &[&str]) -> Arc<Rule> {
  let mut rule = Rule::new(module.clone(), PrepareScript::new("cmd = 'run'"));
  rule.inputs = file_tags(inputs.iter().copied());
  rule
    .artifacts
    .push(RuleArtifact::new("output", file_tags(outputs.iter().copied())));
  Arc::new(rule)
}

pub fn build_configuration() -> PropertyMap {
  PropertyMap::try_from(json!({
    "keel": { "profile": "clang", "buildVariant": "debug" }
  }))
  .unwrap()
}

/// A root project with one product using a shared `cpp` module, plus a sub-project
/// with a second product.
pub fn sample_project(source_dir: &Path) -> TopLevelProject {
  let cpp = Arc::new(Module {
    setup_build_environment_script: "putenv('CC', compilerName)".to_string(),
    ..Module::new("cpp")
  });
  let properties = Arc::new(
    PropertyMap::try_from(json!({
      "modules": { "cpp": { "compilerName": "clang" } }
    }))
    .unwrap(),
  );

  let mut app = Product::new("app");
  app.source_directory = source_dir.to_path_buf();
  app.file_tags = file_tags(["application"]);
  app.properties = properties.clone();
  app.modules = vec![cpp.clone()];
  app.rules = vec![
    rule(&cpp, &["obj"], &["application"]),
    rule(&cpp, &["cpp"], &["obj"]),
  ];
  app.file_taggers = vec![FileTagger::new("*.cpp", file_tags(["cpp"]))];

  let mut sources = Group::new("sources", properties.clone());
  sources.files.push(Arc::new(SourceArtifact::new(
    source_dir.join("main.cpp"),
    file_tags(["cpp"]),
    properties.clone(),
  )));
  sources.wildcards = Some(SourceWildCards::new("", vec!["src/*.cpp".to_string()], Vec::new()));
  app.groups.push(sources);

  let mut tool = Product::new("tool");
  tool.dependencies = vec!["app".to_string()];
  tool.modules = vec![cpp.clone()];
  tool.rules = vec![rule(&cpp, &["cpp"], &["obj"])];
  tool.properties = properties;

  let mut top = TopLevelProject::new(Project::new("root"));
  top.set_build_configuration(build_configuration());
  top.add_product(ProjectId::ROOT, app).unwrap();
  let tools = top.add_sub_project(ProjectId::ROOT, Project::new("tools")).unwrap();
  top.add_product(tools, tool).unwrap();
  top.platform_environment.insert("PATH".to_string(), "/usr/bin".to_string());
  top.record_used_environment("CC", "clang");
  top.build_data = Some(ProjectBuildData::new());
  top
}

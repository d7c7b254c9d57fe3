use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;

use mlua::prelude::*;
use petgraph::graph::NodeIndex;
use tracing::{debug, error, trace};

use crate::language::{Module, PropertyMap};
use crate::script::{ScriptEngine, properties_to_table, property_to_lua};
use crate::util::topo::{Cycle, DependencyGraph};

use super::{EnvironmentError, EnvironmentKind, ProcessEnvironment};

/// Modules of one product connected by their declared dependency names.
struct ModuleGraph<'m> {
  graph: DependencyGraph<&'m Arc<Module>>,
}

impl<'m> ModuleGraph<'m> {
  /// Modules are deduplicated by name; the first one listed wins.
  fn build(modules: &'m [Arc<Module>]) -> Result<Self, EnvironmentError> {
    let mut graph = DependencyGraph::new();
    let mut by_name: HashMap<&str, NodeIndex> = HashMap::new();
    for module in modules.iter().filter(|m| !m.name.is_empty()) {
      by_name.entry(module.name.as_str()).or_insert_with(|| graph.add_node(module));
    }

    let nodes: Vec<NodeIndex> = graph.nodes().collect();
    for node in nodes {
      let Some(module) = graph.node(node).copied() else {
        continue;
      };
      for dependency in &module.module_dependencies {
        let Some(&dependency_node) = by_name.get(dependency.as_str()) else {
          error!(module = %module.name, dependency = %dependency, "module dependency was not resolved");
          return Err(EnvironmentError::UnresolvedModuleDependency {
            module: module.name.clone(),
            dependency: dependency.clone(),
          });
        };
        graph.add_dependency(node, dependency_node);
      }
    }
    Ok(Self { graph })
  }

  fn module(&self, node: NodeIndex) -> Option<&'m Arc<Module>> {
    self.graph.node(node).copied()
  }

  /// Every module after its dependencies, walking from the modules nothing depends on.
  fn evaluation_order(&self) -> Result<Vec<NodeIndex>, EnvironmentError> {
    let seeds = self.graph.roots().into_iter().chain(self.graph.nodes());
    self.graph.topological_order(seeds).map_err(|Cycle(cycle)| {
      EnvironmentError::CyclicModuleDependency {
        modules: cycle
          .into_iter()
          .filter_map(|node| self.module(node))
          .map(|m| m.name.clone())
          .collect(),
      }
    })
  }
}

/// Run the setup scripts of `modules` and return the resulting environment.
///
/// The environment starts as `base_environment` overlaid with `platform_environment`.
/// Each script sees its module's own properties as bare names, its direct
/// dependencies as tables named after them, and `getenv`/`putenv` over the shared
/// environment.
pub fn compute_environment(
  engine: &ScriptEngine,
  kind: EnvironmentKind,
  modules: &[Arc<Module>],
  properties: &PropertyMap,
  platform_environment: &BTreeMap<String, String>,
  base_environment: &ProcessEnvironment,
) -> Result<ProcessEnvironment, EnvironmentError> {
  let graph = ModuleGraph::build(modules)?;
  let order = graph.evaluation_order()?;
  debug!(kind = %kind, modules = order.len(), "setting up environment");

  let mut initial = base_environment.clone();
  initial.extend(platform_environment.iter().map(|(k, v)| (k.clone(), v.clone())));
  let environment = Rc::new(RefCell::new(initial));

  engine.clear_imports_cache();
  let base_scope = environment_scope(engine.lua(), environment.clone())?;
  engine.with_scope(base_scope, |engine| {
    for &node in &order {
      let Some(module) = graph.module(node) else {
        continue;
      };
      let Some(script) = kind.setup_script(module) else {
        trace!(module = %module.name, kind = %kind, "no setup script");
        continue;
      };
      run_setup_script(engine, &graph, node, module, script, properties).map_err(|e| {
        EnvironmentError::EnvironmentSetupFailed {
          module: module.name.clone(),
          kind,
          message: e.to_string(),
        }
      })?;
      trace!(module = %module.name, kind = %kind, "ran setup script");
    }
    Ok::<_, EnvironmentError>(())
  })?;

  let result = environment.borrow().clone();
  Ok(result)
}

/// A scope exposing `getenv` and `putenv` over `environment`.
fn environment_scope(lua: &Lua, environment: Rc<RefCell<ProcessEnvironment>>) -> LuaResult<LuaTable> {
  let scope = lua.create_table()?;

  let env = environment.clone();
  let getenv = lua.create_function(move |_, name: Option<String>| {
    let name = name.ok_or_else(|| LuaError::external("getenv expects 1 argument"))?;
    Ok(env.borrow().get(&name).cloned())
  })?;
  scope.set("getenv", getenv)?;

  let putenv = lua.create_function(move |_, (name, value): (Option<String>, LuaValue)| {
    let name = name.ok_or_else(|| LuaError::external("putenv expects 2 arguments"))?;
    let value = match value {
      LuaValue::String(s) => s.to_str()?.to_string(),
      LuaValue::Integer(i) => i.to_string(),
      LuaValue::Number(n) => n.to_string(),
      LuaValue::Boolean(b) => b.to_string(),
      LuaValue::Nil => return Err(LuaError::external("putenv expects 2 arguments")),
      other => {
        return Err(LuaError::external(format!(
          "putenv: cannot store a {} in the environment",
          other.type_name()
        )));
      }
    };
    environment.borrow_mut().insert(name, value);
    Ok(())
  })?;
  scope.set("putenv", putenv)?;

  Ok(scope)
}

fn run_setup_script(
  engine: &ScriptEngine,
  graph: &ModuleGraph<'_>,
  node: NodeIndex,
  module: &Module,
  script: &str,
  properties: &PropertyMap,
) -> LuaResult<()> {
  let lua = engine.lua();
  let scope = lua.create_table()?;
  engine.import(&module.imports, &scope)?;

  for dependency in graph.graph.dependencies(node) {
    let Some(dependency) = graph.module(dependency) else {
      continue;
    };
    let table = match properties.module_properties(&dependency.name) {
      Some(values) => properties_to_table(lua, values)?,
      None => lua.create_table()?,
    };
    scope.set(dependency.name.as_str(), table)?;
  }

  if let Some(own) = properties.module_properties(&module.name) {
    for (name, value) in own {
      scope.set(name.as_str(), property_to_lua(lua, value)?)?;
    }
  }

  let chunk_name = format!("={} setup script", module.name);
  engine.with_scope(scope, |engine| engine.evaluate(script, &chunk_name).map(|_| ()))
}

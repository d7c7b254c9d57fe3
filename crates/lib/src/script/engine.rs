use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use mlua::prelude::*;
use tracing::trace;

use crate::language::ScriptImport;

/// A Lua state with a stack of evaluation scopes.
pub struct ScriptEngine {
  lua: Lua,
  scopes: RefCell<Vec<LuaTable>>,
  imports_cache: RefCell<HashMap<PathBuf, LuaTable>>,
}

impl Default for ScriptEngine {
  fn default() -> Self {
    Self::new()
  }
}

impl ScriptEngine {
  pub fn new() -> Self {
    Self::with_lua(Lua::new())
  }

  pub fn with_lua(lua: Lua) -> Self {
    Self {
      lua,
      scopes: RefCell::new(Vec::new()),
      imports_cache: RefCell::new(HashMap::new()),
    }
  }

  pub fn lua(&self) -> &Lua {
    &self.lua
  }

  /// The innermost scope, or the globals when no scope is pushed.
  pub fn current_scope(&self) -> LuaTable {
    self.scopes.borrow().last().cloned().unwrap_or_else(|| self.lua.globals())
  }

  pub fn scope_depth(&self) -> usize {
    self.scopes.borrow().len()
  }

  /// Push `scope` so lookups it cannot satisfy fall through to the current scope.
  pub fn push_scope(&self, scope: LuaTable) -> LuaResult<()> {
    let mt = self.lua.create_table()?;
    mt.set("__index", self.current_scope())?;
    scope.set_metatable(Some(mt))?;
    self.scopes.borrow_mut().push(scope);
    Ok(())
  }

  pub fn pop_scope(&self) -> Option<LuaTable> {
    self.scopes.borrow_mut().pop()
  }

  /// Run `f` with `scope` pushed, popping it again whatever `f` returns.
  pub fn with_scope<R, E>(&self, scope: LuaTable, f: impl FnOnce(&Self) -> Result<R, E>) -> Result<R, E>
  where
    E: From<LuaError>,
  {
    self.push_scope(scope)?;
    let result = f(self);
    self.pop_scope();
    result
  }

  /// Evaluate a chunk in the current scope.
  pub fn evaluate(&self, script: &str, chunk_name: &str) -> LuaResult<LuaValue> {
    self
      .lua
      .load(script)
      .set_name(chunk_name)
      .set_environment(self.current_scope())
      .eval()
  }

  /// Bind each import into `scope` as a table of the names its files define.
  pub fn import(&self, imports: &[ScriptImport], scope: &LuaTable) -> LuaResult<()> {
    for import in imports {
      let target = self.lua.create_table()?;
      for file_name in &import.file_names {
        let exports = self.load_import_file(Path::new(file_name))?;
        for pair in exports.pairs::<LuaValue, LuaValue>() {
          let (key, value) = pair?;
          target.set(key, value)?;
        }
      }
      scope.set(import.scope_name.as_str(), target)?;
    }
    Ok(())
  }

  /// Forget previously loaded import files so they are read again.
  pub fn clear_imports_cache(&self) {
    self.imports_cache.borrow_mut().clear();
  }

  fn load_import_file(&self, path: &Path) -> LuaResult<LuaTable> {
    if let Some(exports) = self.imports_cache.borrow().get(path) {
      return Ok(exports.clone());
    }

    let content =
      fs::read_to_string(path).map_err(|e| LuaError::external(format!("cannot read '{}': {}", path.display(), e)))?;

    let env = self.lua.create_table()?;
    let mt = self.lua.create_table()?;
    mt.set("__index", self.lua.globals())?;
    env.set_metatable(Some(mt))?;

    let returned: LuaValue = self
      .lua
      .load(&content)
      .set_name(format!("@{}", path.display()))
      .set_environment(env.clone())
      .eval()?;
    if let LuaValue::Table(returned) = returned {
      for pair in returned.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        env.raw_set(key, value)?;
      }
    }

    trace!(path = %path.display(), "loaded import");
    self.imports_cache.borrow_mut().insert(path.to_path_buf(), env.clone());
    Ok(env)
  }
}

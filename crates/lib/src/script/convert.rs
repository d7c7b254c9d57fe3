use std::collections::BTreeMap;

use mlua::prelude::*;

use crate::language::PropertyValue;

/// Largest float that still converts to an integer without loss.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Convert a property value to a Lua value.
///
/// Whole numbers become Lua integers so they print without a fractional part.
pub fn property_to_lua(lua: &Lua, value: &PropertyValue) -> LuaResult<LuaValue> {
  Ok(match value {
    PropertyValue::String(s) => LuaValue::String(lua.create_string(s)?),
    PropertyValue::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER => LuaValue::Integer(*n as i64),
    PropertyValue::Number(n) => LuaValue::Number(*n),
    PropertyValue::Boolean(b) => LuaValue::Boolean(*b),
    PropertyValue::List(items) => {
      let table = lua.create_table()?;
      for item in items {
        table.push(property_to_lua(lua, item)?)?;
      }
      LuaValue::Table(table)
    }
    PropertyValue::Map(map) => LuaValue::Table(properties_to_table(lua, map)?),
  })
}

pub fn properties_to_table(lua: &Lua, properties: &BTreeMap<String, PropertyValue>) -> LuaResult<LuaTable> {
  let table = lua.create_table()?;
  for (name, value) in properties {
    table.set(name.as_str(), property_to_lua(lua, value)?)?;
  }
  Ok(table)
}

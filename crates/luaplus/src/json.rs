//! JSON bridge for referenced values.
//!
//! Lua to JSON:
//! - nil -> null, boolean -> boolean
//! - integer -> integer, finite float -> float
//! - string -> string (invalid UTF-8 replaced)
//! - table with keys exactly 1..=n, or no keys -> array
//! - any other table -> object keyed by strings and stringified integers
//!
//! Functions, userdata, threads, non-finite floats, unsupported key types and
//! cyclic tables are conversion errors. So is nesting deeper than
//! 128 levels in either direction.

use std::os::raw::c_int;

use ahash::AHashSet;
use mlua_sys as ffi;
use serde_json::{Map, Number, Value as JsonValue};

use crate::convert::{IntoLua, PushTarget};
use crate::error::{LuaError, LuaResult};
use crate::lua_object::{LuaObject, read_bytes, size_hint};
use crate::lua_state::StateHandle;
use crate::lua_type::LuaType;
use crate::stack::{StackGuard, check_stack};

/// Deepest table or array/object nesting converted either way.
const MAX_DEPTH: usize = 128;

fn too_deep() -> LuaError {
    LuaError::Conversion("nesting too deep".to_string())
}

impl LuaObject {
    /// Convert the referenced value to a `serde_json::Value`.
    pub fn to_json(&self) -> LuaResult<JsonValue> {
        let (_inner, l) = self.bound_state("LuaObject::to_json")?;
        let _guard = StackGuard::new(l);
        check_stack(l, 1)?;
        unsafe { self.push_raw(l) };
        let index = unsafe { ffi::lua_gettop(l) };
        let mut visited = AHashSet::new();
        unsafe { to_value_internal(l, index, &mut visited, 0) }
    }

    /// Bind to a new value built from `json`.
    pub fn assign_json(&mut self, state: &StateHandle, json: &JsonValue) -> LuaResult<()> {
        self.assign_value(state, json)
    }
}

impl IntoLua for &JsonValue {
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        unsafe { push_json(target.l, self, 0) }
    }
}

unsafe fn to_value_internal(
    l: *mut ffi::lua_State,
    index: c_int,
    visited: &mut AHashSet<usize>,
    depth: usize,
) -> LuaResult<JsonValue> {
    unsafe {
        match ffi::lua_type(l, index) {
            ffi::LUA_TNIL => Ok(JsonValue::Null),
            ffi::LUA_TBOOLEAN => Ok(JsonValue::Bool(ffi::lua_toboolean(l, index) != 0)),
            ffi::LUA_TNUMBER => {
                if ffi::lua_isinteger(l, index) != 0 {
                    let n = ffi::lua_tointegerx(l, index, std::ptr::null_mut());
                    Ok(JsonValue::Number(Number::from(n)))
                } else {
                    let n = ffi::lua_tonumberx(l, index, std::ptr::null_mut());
                    Number::from_f64(n)
                        .map(JsonValue::Number)
                        .ok_or_else(|| LuaError::Conversion(format!("cannot represent {} in JSON", n)))
                }
            }
            ffi::LUA_TSTRING => {
                let bytes = read_bytes(l, index).unwrap_or_default();
                Ok(JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()))
            }
            ffi::LUA_TTABLE => {
                if depth >= MAX_DEPTH {
                    return Err(too_deep());
                }
                let ptr_addr = ffi::lua_topointer(l, index) as usize;
                if !visited.insert(ptr_addr) {
                    return Err(LuaError::Conversion(
                        "circular reference detected in table".to_string(),
                    ));
                }
                let result = table_to_json(l, index, visited, depth + 1);
                visited.remove(&ptr_addr);
                result
            }
            other => Err(LuaError::Conversion(format!(
                "cannot serialize a Lua {} to JSON",
                LuaType::from_raw(other).name()
            ))),
        }
    }
}

enum JsonKey {
    Index(i64),
    Name(String),
}

unsafe fn table_to_json(
    l: *mut ffi::lua_State,
    table: c_int,
    visited: &mut AHashSet<usize>,
    depth: usize,
) -> LuaResult<JsonValue> {
    let _guard = StackGuard::new(l);
    check_stack(l, 3)?;

    let mut entries = Vec::new();
    unsafe {
        ffi::lua_pushnil(l);
        while ffi::lua_next(l, table) != 0 {
            let key = match ffi::lua_type(l, -2) {
                ffi::LUA_TNUMBER if ffi::lua_isinteger(l, -2) != 0 => {
                    JsonKey::Index(ffi::lua_tointegerx(l, -2, std::ptr::null_mut()))
                }
                ffi::LUA_TSTRING => {
                    let bytes = read_bytes(l, -2).unwrap_or_default();
                    JsonKey::Name(String::from_utf8_lossy(&bytes).into_owned())
                }
                other => {
                    return Err(LuaError::Conversion(format!(
                        "table key of type {} cannot be a JSON key",
                        LuaType::from_raw(other).name()
                    )));
                }
            };
            let value = to_value_internal(l, ffi::lua_gettop(l), visited, depth)?;
            entries.push((key, value));
            ffi::lua_pop(l, 1);
        }
    }

    if is_array_like(&entries) {
        let mut items: Vec<(i64, JsonValue)> = entries
            .into_iter()
            .filter_map(|(key, value)| match key {
                JsonKey::Index(i) => Some((i, value)),
                JsonKey::Name(_) => None,
            })
            .collect();
        items.sort_by_key(|(i, _)| *i);
        Ok(JsonValue::Array(items.into_iter().map(|(_, v)| v).collect()))
    } else {
        let mut map = Map::new();
        for (key, value) in entries {
            let name = match key {
                JsonKey::Index(i) => i.to_string(),
                JsonKey::Name(s) => s,
            };
            map.insert(name, value);
        }
        Ok(JsonValue::Object(map))
    }
}

/// Keys are exactly `1..=n`. An empty table counts.
fn is_array_like(entries: &[(JsonKey, JsonValue)]) -> bool {
    let n = entries.len() as i64;
    let mut seen = vec![false; entries.len()];
    for (key, _) in entries {
        match key {
            JsonKey::Index(i) if *i >= 1 && *i <= n => {
                seen[(*i - 1) as usize] = true;
            }
            _ => return false,
        }
    }
    seen.into_iter().all(|s| s)
}

unsafe fn push_json(l: *mut ffi::lua_State, json: &JsonValue, depth: usize) -> LuaResult<()> {
    if matches!(json, JsonValue::Array(_) | JsonValue::Object(_)) && depth >= MAX_DEPTH {
        return Err(too_deep());
    }
    unsafe {
        match json {
            JsonValue::Null => ffi::lua_pushnil(l),
            JsonValue::Bool(b) => ffi::lua_pushboolean(l, *b as c_int),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ffi::lua_pushinteger(l, i);
                } else if let Some(f) = n.as_f64() {
                    ffi::lua_pushnumber(l, f);
                } else {
                    return Err(LuaError::Conversion(format!("invalid JSON number {}", n)));
                }
            }
            JsonValue::String(s) => {
                ffi::lua_pushlstring(l, s.as_ptr() as *const _, s.len());
            }
            JsonValue::Array(items) => {
                check_stack(l, 3)?;
                ffi::lua_createtable(l, size_hint(items.len()), 0);
                let table = ffi::lua_gettop(l);
                for (i, item) in items.iter().enumerate() {
                    push_json(l, item, depth + 1)?;
                    ffi::lua_rawseti(l, table, (i + 1) as ffi::lua_Integer);
                }
            }
            JsonValue::Object(fields) => {
                check_stack(l, 3)?;
                ffi::lua_createtable(l, 0, size_hint(fields.len()));
                let table = ffi::lua_gettop(l);
                for (key, value) in fields {
                    ffi::lua_pushlstring(l, key.as_ptr() as *const _, key.len());
                    push_json(l, value, depth + 1)?;
                    ffi::lua_rawset(l, table);
                }
            }
        }
        Ok(())
    }
}

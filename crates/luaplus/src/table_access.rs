//! Table reads and writes on a `LuaObject`.
//!
//! `get` and `set` honor `__index` and `__newindex`. They run inside
//! `lua_pcall`, so a metamethod error comes back as `LuaError::Engine`.
//! `raw_get`, `raw_set`, `raw_len` and `pairs` never run a metamethod.

use std::os::raw::{c_int, c_void};

use mlua_sys as ffi;

use crate::convert::{FromLua, IntoLua, LightUserData, Nil, PushTarget, TableKey, UserData};
use crate::error::{LuaError, LuaResult, lua_assert};
use crate::lua_object::{LuaObject, size_hint};
use crate::lua_state::check_status;
use crate::lua_type::LuaType;
use crate::stack::{StackGuard, check_stack};

impl LuaObject {
    // ==================== Writes ====================

    /// `t[key] = value`, running `__newindex` when the key is absent.
    ///
    /// ```ignore
    /// config.set("name", "demo")?;
    /// config.set(1, 3.5)?;
    /// config.set(&key_object, &value_object)?;
    /// ```
    pub fn set<K: TableKey, V: IntoLua>(&self, key: K, value: V) -> LuaResult<()> {
        self.table_op("LuaObject::set", |target, table| {
            let l = target.l;
            unsafe {
                ffi::lua_pushcfunction(l, protected_set);
                ffi::lua_pushvalue(l, table);
            }
            push_write_key(&key, target)?;
            value.push_into(target)?;
            protected_call(l, 3, 0)
        })
    }

    /// `rawset(t, key, value)`.
    pub fn raw_set<K: TableKey, V: IntoLua>(&self, key: K, value: V) -> LuaResult<()> {
        self.table_op("LuaObject::raw_set", |target, table| {
            push_write_key(&key, target)?;
            value.push_into(target)?;
            unsafe { ffi::lua_rawset(target.l, table) };
            Ok(())
        })
    }

    pub fn set_boolean<K: TableKey>(&self, key: K, value: bool) -> LuaResult<()> {
        self.set(key, value)
    }

    pub fn set_integer<K: TableKey>(&self, key: K, value: i64) -> LuaResult<()> {
        self.set(key, value)
    }

    pub fn set_number<K: TableKey>(&self, key: K, value: f64) -> LuaResult<()> {
        self.set(key, value)
    }

    pub fn set_string<K: TableKey>(&self, key: K, value: &str) -> LuaResult<()> {
        self.set(key, value)
    }

    /// Setting nil removes the entry unless `__newindex` intercepts it.
    pub fn set_nil<K: TableKey>(&self, key: K) -> LuaResult<()> {
        self.set(key, Nil)
    }

    pub fn set_light_user_data<K: TableKey>(&self, key: K, value: *mut c_void) -> LuaResult<()> {
        self.set(key, LightUserData(value))
    }

    pub fn set_user_data<K: TableKey>(&self, key: K, value: *mut c_void) -> LuaResult<()> {
        self.set(key, UserData(value))
    }

    pub fn set_object<K: TableKey>(&self, key: K, value: &LuaObject) -> LuaResult<()> {
        self.set(key, value)
    }

    /// Store a new table under `key` and return a reference to it.
    pub fn create_table<K: TableKey>(&self, key: K, narr: usize, nrec: usize) -> LuaResult<LuaObject> {
        self.table_op("LuaObject::create_table", |target, table| {
            let l = target.l;
            let child = unsafe {
                ffi::lua_createtable(l, size_hint(narr), size_hint(nrec));
                ffi::lua_pushcfunction(l, protected_set);
                ffi::lua_pushvalue(l, table);
                ffi::lua_gettop(l) - 2
            };
            push_write_key(&key, target)?;
            unsafe { ffi::lua_pushvalue(l, child) };
            protected_call(l, 3, 0)?;
            Ok(LuaObject::from_top(target.state, l))
        })
    }

    // ==================== Reads ====================

    /// `t[key]`, running `__index` when the key is absent. A missing key
    /// yields a reference bound to nil.
    pub fn get<K: TableKey>(&self, key: K) -> LuaResult<LuaObject> {
        self.table_op("LuaObject::get", |target, table| {
            let l = target.l;
            unsafe {
                ffi::lua_pushcfunction(l, protected_get);
                ffi::lua_pushvalue(l, table);
            }
            key.push_key(target)?;
            protected_call(l, 2, 1)?;
            Ok(LuaObject::from_top(target.state, l))
        })
    }

    /// `rawget(t, key)`.
    pub fn raw_get<K: TableKey>(&self, key: K) -> LuaResult<LuaObject> {
        self.table_op("LuaObject::raw_get", |target, table| {
            key.push_key(target)?;
            unsafe { ffi::lua_rawget(target.l, table) };
            Ok(LuaObject::from_top(target.state, target.l))
        })
    }

    pub fn get_by_name(&self, name: &str) -> LuaResult<LuaObject> {
        self.get(name)
    }

    pub fn get_by_index(&self, index: i64) -> LuaResult<LuaObject> {
        self.get(index)
    }

    pub fn get_by_object(&self, key: &LuaObject) -> LuaResult<LuaObject> {
        self.get(key)
    }

    /// `t[key]` converted to a Rust value.
    pub fn get_as<T: FromLua, K: TableKey>(&self, key: K) -> LuaResult<T> {
        T::from_lua(&self.get(key)?)
    }

    // ==================== Inspection ====================

    /// Raw length: border of a table, byte length of a string, block size of
    /// a full userdata, 0 for anything else.
    pub fn raw_len(&self) -> LuaResult<usize> {
        let (_inner, l) = self.bound_state("LuaObject::raw_len")?;
        let _guard = StackGuard::new(l);
        check_stack(l, 1)?;
        unsafe {
            self.push_raw(l);
            Ok(ffi::lua_rawlen(l, -1) as usize)
        }
    }

    /// Snapshot of every key/value pair, in engine traversal order.
    pub fn pairs(&self) -> LuaResult<Vec<(LuaObject, LuaObject)>> {
        self.table_op("LuaObject::pairs", |target, table| {
            let l = target.l;
            let mut entries = Vec::new();
            unsafe {
                ffi::lua_pushnil(l);
                while ffi::lua_next(l, table) != 0 {
                    let value = LuaObject::from_top(target.state, l);
                    ffi::lua_pushvalue(l, -1);
                    let key = LuaObject::from_top(target.state, l);
                    entries.push((key, value));
                }
            }
            Ok(entries)
        })
    }

    /// Push the table, check it really is one, then hand `f` the push target
    /// and the table's absolute stack index.
    fn table_op<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&PushTarget<'_>, c_int) -> LuaResult<R>,
    ) -> LuaResult<R> {
        let (inner, l) = self.bound_state(operation)?;
        let _guard = StackGuard::new(l);
        check_stack(l, 6)?;
        unsafe { self.push_raw(l) };
        let tag = unsafe { ffi::lua_type(l, -1) };
        let is_table = tag == ffi::LUA_TTABLE;
        lua_assert!(
            is_table,
            operation,
            "value is a {}",
            LuaType::from_raw(tag).name()
        );
        let table = unsafe { ffi::lua_gettop(l) };
        f(&PushTarget::new(&inner, l, operation), table)
    }
}

/// Stack: table, key. Leaves `table[key]`.
unsafe extern "C-unwind" fn protected_get(l: *mut ffi::lua_State) -> c_int {
    unsafe { ffi::lua_gettable(l, 1) };
    1
}

/// Stack: table, key, value.
unsafe extern "C-unwind" fn protected_set(l: *mut ffi::lua_State) -> c_int {
    unsafe { ffi::lua_settable(l, 1) };
    0
}

fn protected_call(l: *mut ffi::lua_State, nargs: c_int, nresults: c_int) -> LuaResult<()> {
    let status = unsafe { ffi::lua_pcall(l, nargs, nresults, 0) };
    check_status(l, status)
}

/// Push a key for a write. `nil` and NaN cannot index a table.
fn push_write_key<K: TableKey + ?Sized>(key: &K, target: &PushTarget<'_>) -> LuaResult<()> {
    key.push_key(target)?;
    let l = target.l;
    unsafe {
        match ffi::lua_type(l, -1) {
            ffi::LUA_TNIL => Err(LuaError::assertion(
                target.operation,
                "!key.is_nil()",
                Some("table index is nil".to_string()),
            )),
            ffi::LUA_TNUMBER
                if ffi::lua_isinteger(l, -1) == 0 && ffi::lua_tonumberx(l, -1, std::ptr::null_mut()).is_nan() =>
            {
                Err(LuaError::assertion(
                    target.operation,
                    "!key.is_nan()",
                    Some("table index is NaN".to_string()),
                ))
            }
            _ => Ok(()),
        }
    }
}

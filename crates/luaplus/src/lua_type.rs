use std::os::raw::c_int;

use mlua_sys as ffi;

/// Engine value-type tag, one variant per `LUA_T*` constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaType {
    /// No value at all (empty reference, invalid stack slot).
    None,
    Nil,
    Boolean,
    LightUserData,
    Number,
    String,
    Table,
    Function,
    UserData,
    Thread,
}

impl LuaType {
    pub fn from_raw(tag: c_int) -> Self {
        match tag {
            ffi::LUA_TNIL => LuaType::Nil,
            ffi::LUA_TBOOLEAN => LuaType::Boolean,
            ffi::LUA_TLIGHTUSERDATA => LuaType::LightUserData,
            ffi::LUA_TNUMBER => LuaType::Number,
            ffi::LUA_TSTRING => LuaType::String,
            ffi::LUA_TTABLE => LuaType::Table,
            ffi::LUA_TFUNCTION => LuaType::Function,
            ffi::LUA_TUSERDATA => LuaType::UserData,
            ffi::LUA_TTHREAD => LuaType::Thread,
            _ => LuaType::None,
        }
    }

    pub fn to_raw(self) -> c_int {
        match self {
            LuaType::None => ffi::LUA_TNONE,
            LuaType::Nil => ffi::LUA_TNIL,
            LuaType::Boolean => ffi::LUA_TBOOLEAN,
            LuaType::LightUserData => ffi::LUA_TLIGHTUSERDATA,
            LuaType::Number => ffi::LUA_TNUMBER,
            LuaType::String => ffi::LUA_TSTRING,
            LuaType::Table => ffi::LUA_TTABLE,
            LuaType::Function => ffi::LUA_TFUNCTION,
            LuaType::UserData => ffi::LUA_TUSERDATA,
            LuaType::Thread => ffi::LUA_TTHREAD,
        }
    }

    /// Same strings as `lua_typename`; both userdata flavours read "userdata".
    pub fn name(self) -> &'static str {
        match self {
            LuaType::None => "no value",
            LuaType::Nil => "nil",
            LuaType::Boolean => "boolean",
            LuaType::LightUserData | LuaType::UserData => "userdata",
            LuaType::Number => "number",
            LuaType::String => "string",
            LuaType::Table => "table",
            LuaType::Function => "function",
            LuaType::Thread => "thread",
        }
    }
}

impl std::fmt::Display for LuaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

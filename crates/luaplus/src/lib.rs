// Lua value handles
// Registry-anchored references and an owning engine handle over the Lua 5.4 C API

#[cfg(test)]
mod test;

mod convert;
mod error;
mod lua_object;
mod lua_state;
mod lua_type;
mod options;
mod stack;
mod state_map;
mod table_access;
mod table_builder;

#[cfg(feature = "serde")]
mod json;

pub use convert::{FromLua, IntoLua, LightUserData, Nil, PushTarget, TableKey, UserData};
pub use error::{LuaError, LuaResult};
pub use lua_object::{LuaObject, NO_REF};
pub use lua_state::{LuaState, StateHandle};
pub use lua_type::LuaType;
pub use options::StateOptions;
pub use table_builder::TableBuilder;

/// Raw Lua 5.4 C API.
pub use mlua_sys as ffi;

//! Stack discipline helpers.
//!
//! Every public operation that touches the execution stack must leave it at
//! the depth it found it. `StackGuard` records the depth on entry and restores
//! it on drop, so early returns through `?` cannot leak slots.

use std::os::raw::c_int;

use mlua_sys as ffi;

use crate::error::{LuaError, LuaResult};

pub(crate) struct StackGuard {
    l: *mut ffi::lua_State,
    top: c_int,
}

impl StackGuard {
    #[inline]
    pub(crate) fn new(l: *mut ffi::lua_State) -> Self {
        let top = unsafe { ffi::lua_gettop(l) };
        StackGuard { l, top }
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        unsafe {
            if ffi::lua_gettop(self.l) > self.top {
                ffi::lua_settop(self.l, self.top);
            }
        }
    }
}

/// Make room for `n` more pushes.
#[inline]
pub(crate) fn check_stack(l: *mut ffi::lua_State, n: c_int) -> LuaResult<()> {
    if unsafe { ffi::lua_checkstack(l, n) } == 0 {
        return Err(LuaError::StackOverflow);
    }
    Ok(())
}

/// Resolve an absolute (`1..=top`) or relative (`-top..=-1`) position.
/// Returns `None` for zero, pseudo-indices and anything past the top.
pub(crate) fn resolve_position(l: *mut ffi::lua_State, position: c_int) -> Option<c_int> {
    let top = unsafe { ffi::lua_gettop(l) };
    if position > 0 && position <= top {
        Some(position)
    } else if position < 0 && position >= -top {
        Some(top + position + 1)
    } else {
        None
    }
}

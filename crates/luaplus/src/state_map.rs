//! Identity side-table: raw `lua_State` pointer -> owning wrapper.
//!
//! Populated when a `LuaState` is created and erased when it is closed, so a
//! raw pointer handed back by native code can be mapped to its wrapper
//! without storing anything inside the engine's own registry.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use mlua_sys as ffi;

use crate::lua_state::StateInner;

thread_local! {
    static STATES: RefCell<AHashMap<usize, Weak<StateInner>>> = RefCell::new(AHashMap::new());
}

pub(crate) fn register(raw: *mut ffi::lua_State, inner: &Rc<StateInner>) {
    STATES.with(|states| {
        states
            .borrow_mut()
            .insert(raw as usize, Rc::downgrade(inner));
    });
}

/// Returns false when the pointer was not registered.
pub(crate) fn unregister(raw: *mut ffi::lua_State) -> bool {
    STATES
        .try_with(|states| states.borrow_mut().remove(&(raw as usize)).is_some())
        // thread-local already torn down at thread exit
        .unwrap_or(false)
}

pub(crate) fn lookup(raw: *mut ffi::lua_State) -> Option<Rc<StateInner>> {
    if raw.is_null() {
        return None;
    }
    STATES.with(|states| {
        states
            .borrow()
            .get(&(raw as usize))
            .and_then(Weak::upgrade)
            .filter(|inner| inner.raw() == raw)
    })
}

#[cfg(test)]
pub(crate) fn len() -> usize {
    STATES.with(|states| states.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LuaState;

    #[test]
    fn test_register_and_erase() {
        let before = len();
        let mut state = LuaState::new().unwrap();
        let raw = state.raw_state();
        assert_eq!(len(), before + 1);
        assert!(lookup(raw).is_some());

        state.close();
        assert_eq!(len(), before);
        assert!(lookup(raw).is_none());
    }

    #[test]
    fn test_lookup_null() {
        assert!(lookup(std::ptr::null_mut()).is_none());
    }
}

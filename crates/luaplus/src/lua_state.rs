//! Engine handle: one exclusively owned Lua instance.
//!
//! `LuaState` owns the instance and closes it exactly once. Everything that
//! does not change the lifecycle lives on `StateHandle`, which `LuaState`
//! derefs to and which can also be recovered from a raw `lua_State` pointer.

use std::cell::Cell;
use std::ffi::CString;
use std::ops::Deref;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr;
use std::rc::Rc;

use mlua_sys as ffi;
use tracing::{debug, warn};

use crate::error::{LuaError, LuaResult, lua_assert};
use crate::lua_object::LuaObject;
use crate::options::StateOptions;
use crate::stack::{StackGuard, check_stack};
use crate::state_map;

/// Shared bookkeeping for one instance. The raw pointer is cleared to null
/// when the instance is closed; references detect that instead of touching
/// freed memory.
pub(crate) struct StateInner {
    raw: Cell<*mut ffi::lua_State>,
    options: StateOptions,
}

impl StateInner {
    #[inline]
    pub(crate) fn raw(&self) -> *mut ffi::lua_State {
        self.raw.get()
    }

    #[inline]
    pub(crate) fn options(&self) -> &StateOptions {
        &self.options
    }

    /// The raw pointer, or `StateClosed` once the instance is gone.
    #[inline]
    pub(crate) fn open_raw(&self) -> LuaResult<*mut ffi::lua_State> {
        let raw = self.raw.get();
        if raw.is_null() {
            return Err(LuaError::StateClosed);
        }
        Ok(raw)
    }
}

/// Owner of one Lua instance.
///
/// Dropping the state (or calling [`close`](LuaState::close)) closes the
/// instance and frees every registry slot with it. `LuaObject`s that outlive
/// the state report `LuaError::StateClosed` instead of dangling.
///
/// # Example
///
/// ```ignore
/// let state = LuaState::new()?;
/// let mut table = LuaObject::new();
/// table.assign_new_table(&state, 0, 4)?;
/// table.set_integer("answer", 42)?;
/// assert_eq!(table.get_by_name("answer")?.to_integer()?, 42);
/// ```
pub struct LuaState {
    handle: StateHandle,
}

impl LuaState {
    pub fn new() -> LuaResult<Self> {
        Self::with_options(StateOptions::default())
    }

    pub fn with_options(options: StateOptions) -> LuaResult<Self> {
        let raw = unsafe { ffi::luaL_newstate() };
        if raw.is_null() {
            return Err(LuaError::OutOfMemory);
        }
        let inner = Rc::new(StateInner {
            raw: Cell::new(raw),
            options,
        });
        state_map::register(raw, &inner);
        if inner.options.open_libs {
            unsafe { ffi::luaL_openlibs(raw) };
        }
        debug!(state = ?raw, options = ?inner.options, "opened lua state");

        Ok(LuaState {
            handle: StateHandle { inner },
        })
    }

    /// Close the instance. Safe to call more than once.
    pub fn close(&mut self) {
        let raw = self.handle.inner.raw.replace(ptr::null_mut());
        if raw.is_null() {
            return;
        }
        if !state_map::unregister(raw) {
            warn!(state = ?raw, "closing a lua state missing from the state map");
        }
        unsafe { ffi::lua_close(raw) };
        debug!(state = ?raw, "closed lua state");
    }

    /// Recover the wrapper that owns `raw`.
    ///
    /// Returns `None` for null, for pointers this crate did not create, and
    /// for instances that were already closed.
    pub fn cast_state(raw: *mut ffi::lua_State) -> Option<StateHandle> {
        state_map::lookup(raw).map(|inner| StateHandle { inner })
    }

    /// A non-owning handle to this instance.
    pub fn handle(&self) -> StateHandle {
        self.handle.clone()
    }
}

impl Deref for LuaState {
    type Target = StateHandle;

    fn deref(&self) -> &StateHandle {
        &self.handle
    }
}

impl Drop for LuaState {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for LuaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LuaState({:?})", self.handle.inner.raw())
    }
}

/// Non-owning view of an instance. Never closes it.
#[derive(Clone)]
pub struct StateHandle {
    pub(crate) inner: Rc<StateInner>,
}

impl StateHandle {
    /// Raw engine pointer; null once the instance is closed.
    pub fn raw_state(&self) -> *mut ffi::lua_State {
        self.inner.raw()
    }

    pub fn is_open(&self) -> bool {
        !self.inner.raw().is_null()
    }

    pub fn options(&self) -> &StateOptions {
        self.inner.options()
    }

    /// True when both handles refer to the same wrapper.
    pub fn same_state(&self, other: &StateHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ==================== Stack ====================

    /// Current stack depth (0 once closed).
    pub fn get_top(&self) -> c_int {
        match self.inner.open_raw() {
            Ok(l) => unsafe { ffi::lua_gettop(l) },
            Err(_) => 0,
        }
    }

    /// Truncate the stack to `top` slots.
    pub fn set_top(&self, top: c_int) -> LuaResult<()> {
        let l = self.inner.open_raw()?;
        let current = unsafe { ffi::lua_gettop(l) };
        lua_assert!(
            top >= 0 && top <= current,
            "StateHandle::set_top",
            "requested {} with {} on the stack",
            top,
            current
        );
        unsafe { ffi::lua_settop(l, top) };
        Ok(())
    }

    /// Pop `n` values.
    pub fn pop(&self, n: c_int) -> LuaResult<()> {
        let l = self.inner.open_raw()?;
        let current = unsafe { ffi::lua_gettop(l) };
        lua_assert!(
            n >= 0 && n <= current,
            "StateHandle::pop",
            "popping {} with {} on the stack",
            n,
            current
        );
        unsafe { ffi::lua_pop(l, n) };
        Ok(())
    }

    /// Capture the value at `position` into a new reference. The stack is
    /// left as it was.
    pub fn stack(&self, position: c_int) -> LuaResult<LuaObject> {
        LuaObject::from_stack(self, position)
    }

    /// The global table.
    pub fn globals(&self) -> LuaResult<LuaObject> {
        let l = self.inner.open_raw()?;
        let _guard = StackGuard::new(l);
        check_stack(l, 1)?;
        unsafe { ffi::lua_rawgeti(l, ffi::LUA_REGISTRYINDEX, ffi::LUA_RIDX_GLOBALS) };
        Ok(LuaObject::from_top(&self.inner, l))
    }

    // ==================== Load / execute ====================

    /// Compile `source` and leave the chunk on the stack.
    pub fn load_string(&self, source: &str) -> LuaResult<()> {
        // same chunk name luaL_loadstring would use
        let name = if source.contains('\0') { "=(load)" } else { source };
        self.load_buffer(source.as_bytes(), name)
    }

    /// Compile a text or binary chunk and leave it on the stack.
    /// `name` is used in error messages, as with `luaL_loadbuffer`.
    pub fn load_buffer(&self, chunk: &[u8], name: &str) -> LuaResult<()> {
        let l = self.inner.open_raw()?;
        let name = chunk_name(name)?;
        check_stack(l, 1)?;
        let status = unsafe {
            ffi::luaL_loadbufferx(
                l,
                chunk.as_ptr() as *const c_char,
                chunk.len(),
                name.as_ptr(),
                ptr::null(),
            )
        };
        check_status(l, status)
    }

    /// Compile a file and leave the chunk on the stack.
    pub fn load_file(&self, path: impl AsRef<Path>) -> LuaResult<()> {
        let l = self.inner.open_raw()?;
        let path = path.as_ref().to_string_lossy().into_owned();
        let c_path = CString::new(path.as_str()).map_err(|_| {
            LuaError::assertion(
                "StateHandle::load_file",
                "path has no interior NUL",
                Some(path.clone()),
            )
        })?;
        check_stack(l, 1)?;
        let status = unsafe { ffi::luaL_loadfilex(l, c_path.as_ptr(), ptr::null()) };
        check_status(l, status)
    }

    /// Run `source`, discarding its results.
    pub fn do_string(&self, source: &str) -> LuaResult<()> {
        let l = self.inner.open_raw()?;
        let _guard = StackGuard::new(l);
        self.load_string(source)?;
        self.pcall(0, ffi::LUA_MULTRET)
    }

    /// Run a script file, discarding its results.
    pub fn do_file(&self, path: impl AsRef<Path>) -> LuaResult<()> {
        let l = self.inner.open_raw()?;
        let _guard = StackGuard::new(l);
        self.load_file(path)?;
        self.pcall(0, ffi::LUA_MULTRET)
    }

    /// `lua_pcall` on the function sitting below `nargs` arguments.
    /// Results are left on the stack; on failure the error message is popped
    /// and returned.
    pub fn pcall(&self, nargs: c_int, nresults: c_int) -> LuaResult<()> {
        let l = self.inner.open_raw()?;
        let top = unsafe { ffi::lua_gettop(l) };
        lua_assert!(
            nargs >= 0 && top > nargs,
            "StateHandle::pcall",
            "{} arguments requested with {} on the stack",
            nargs,
            top
        );
        lua_assert!(
            nresults == ffi::LUA_MULTRET || nresults >= 0,
            "StateHandle::pcall",
            "{} results requested",
            nresults
        );
        // fixed result counts must fit in the slots the call frees plus what we reserve
        if nresults > nargs {
            check_stack(l, nresults - nargs)?;
        }
        let status = unsafe { ffi::lua_pcall(l, nargs, nresults, 0) };
        check_status(l, status)
    }
}

impl std::fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StateHandle({:?})", self.inner.raw())
    }
}

fn chunk_name(name: &str) -> LuaResult<CString> {
    CString::new(name).map_err(|_| {
        LuaError::assertion(
            "StateHandle::load_buffer",
            "chunk name has no interior NUL",
            None,
        )
    })
}

/// Turn a non-OK status into `LuaError::Engine`, popping the message.
pub(crate) fn check_status(l: *mut ffi::lua_State, status: c_int) -> LuaResult<()> {
    if status == ffi::LUA_OK {
        return Ok(());
    }
    let message = unsafe {
        let mut len = 0usize;
        let s = ffi::lua_tolstring(l, -1, &mut len);
        let message = if s.is_null() {
            let tag = crate::LuaType::from_raw(ffi::lua_type(l, -1));
            format!("(error object is a {} value)", tag.name())
        } else {
            let bytes = std::slice::from_raw_parts(s as *const u8, len);
            String::from_utf8_lossy(bytes).into_owned()
        };
        ffi::lua_pop(l, 1);
        message
    };
    Err(LuaError::Engine { status, message })
}

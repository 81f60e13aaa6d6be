//! Value references anchored in the engine registry.
//!
//! A `LuaObject` owns exactly one registry slot (or none, when empty). The
//! value lives in the registry, not on the stack, so it survives any amount
//! of stack traffic and is never collected while the reference is alive.
//!
//! Copies are independent: `clone` takes a fresh slot holding the same value.
//! Tables and other reference types still share identity through the engine,
//! so a write through one copy is visible through the other.

use std::cell::Cell;
use std::os::raw::{c_int, c_void};
use std::rc::{Rc, Weak};

use mlua_sys as ffi;
use tracing::trace;

use crate::convert::{IntoLua, PushTarget};
use crate::error::{LuaError, LuaResult, lua_assert};
use crate::lua_state::{StateHandle, StateInner};
use crate::lua_type::LuaType;
use crate::options::StateOptions;
use crate::stack::{StackGuard, check_stack, resolve_position};

/// Registry key of an empty reference.
pub const NO_REF: c_int = ffi::LUA_NOREF;

/// Handle to one Lua value, independent of the execution stack.
///
/// # Example
///
/// ```ignore
/// let mut count = LuaObject::new();
/// count.assign_integer(&state, 7)?;
/// assert!(count.is_number());
/// assert_eq!(count.to_integer()?, 7);
/// count.reset();
/// assert!(count.is_none());
/// ```
pub struct LuaObject {
    state: Option<Weak<StateInner>>,
    key: Cell<c_int>,
}

impl LuaObject {
    /// An empty reference. Type queries report `LuaType::None`.
    pub const fn new() -> Self {
        LuaObject {
            state: None,
            key: Cell::new(NO_REF),
        }
    }

    /// Capture the value at stack `position` (absolute or negative).
    pub fn from_stack(state: &StateHandle, position: c_int) -> LuaResult<Self> {
        let mut object = LuaObject::new();
        object.capture_stack_position(state, position)?;
        Ok(object)
    }

    /// Register the value on top of the stack (popping it) into a new reference.
    pub(crate) fn from_top(inner: &Rc<StateInner>, l: *mut ffi::lua_State) -> Self {
        let key = unsafe { ffi::luaL_ref(l, ffi::LUA_REGISTRYINDEX) };
        trace!(key, "acquired registry slot");
        LuaObject {
            state: Some(Rc::downgrade(inner)),
            key: Cell::new(key),
        }
    }

    // ==================== Lifecycle ====================

    pub fn is_empty(&self) -> bool {
        self.key.get() == NO_REF
    }

    /// Registry key of the slot; `NO_REF` when empty, `LUA_REFNIL` for nil.
    pub fn ref_key(&self) -> c_int {
        self.key.get()
    }

    /// Handle of the owning state, if the reference is bound and the state
    /// still exists.
    pub fn state(&self) -> Option<StateHandle> {
        self.state
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| StateHandle { inner })
    }

    /// Release the slot and become empty. No-op when already empty.
    pub fn reset(&mut self) {
        let key = self.key.replace(NO_REF);
        release_slot(self.state.take(), key);
    }

    /// Push the value onto the stack and leave it there. The caller owns the
    /// pushed slot.
    pub fn push(&self) -> LuaResult<()> {
        let (_inner, l) = self.bound_state("LuaObject::push")?;
        check_stack(l, 1)?;
        unsafe { self.push_raw(l) };
        Ok(())
    }

    // ==================== Assign ====================

    pub fn assign_boolean(&mut self, state: &StateHandle, value: bool) -> LuaResult<()> {
        self.assign_with(state, |l| unsafe {
            ffi::lua_pushboolean(l, value as c_int);
            Ok(())
        })
    }

    pub fn assign_integer(&mut self, state: &StateHandle, value: i64) -> LuaResult<()> {
        self.assign_with(state, |l| unsafe {
            ffi::lua_pushinteger(l, value);
            Ok(())
        })
    }

    pub fn assign_number(&mut self, state: &StateHandle, value: f64) -> LuaResult<()> {
        self.assign_with(state, |l| unsafe {
            ffi::lua_pushnumber(l, value);
            Ok(())
        })
    }

    /// Byte-exact; interior NULs are kept.
    pub fn assign_string(&mut self, state: &StateHandle, value: &str) -> LuaResult<()> {
        self.assign_with(state, |l| unsafe {
            ffi::lua_pushlstring(l, value.as_ptr() as *const _, value.len());
            Ok(())
        })
    }

    pub fn assign_nil(&mut self, state: &StateHandle) -> LuaResult<()> {
        self.assign_with(state, |l| unsafe {
            ffi::lua_pushnil(l);
            Ok(())
        })
    }

    /// Bind to a fresh table; `narr`/`nrec` are preallocation hints for the
    /// array and hash parts.
    pub fn assign_new_table(
        &mut self,
        state: &StateHandle,
        narr: usize,
        nrec: usize,
    ) -> LuaResult<()> {
        self.assign_with(state, |l| unsafe {
            ffi::lua_createtable(l, size_hint(narr), size_hint(nrec));
            Ok(())
        })
    }

    pub fn assign_light_user_data(
        &mut self,
        state: &StateHandle,
        value: *mut c_void,
    ) -> LuaResult<()> {
        self.assign_with(state, |l| unsafe {
            ffi::lua_pushlightuserdata(l, value);
            Ok(())
        })
    }

    /// Bind to a new full userdata block holding `value`.
    pub fn assign_user_data(&mut self, state: &StateHandle, value: *mut c_void) -> LuaResult<()> {
        self.assign_with(state, |l| unsafe {
            push_user_data(l, value);
            Ok(())
        })
    }

    /// Bind to the value held by `source`, in a slot of our own.
    pub fn assign_object(&mut self, source: &LuaObject) -> LuaResult<()> {
        let state = source
            .state()
            .ok_or_else(|| source.unbound_error("LuaObject::assign_object"))?;
        self.assign_value(&state, source)
    }

    /// Bind to any value that knows how to push itself.
    pub fn assign_value<V: IntoLua>(&mut self, state: &StateHandle, value: V) -> LuaResult<()> {
        self.assign_with(state, |l| {
            value.push_into(&PushTarget::new(&state.inner, l, "LuaObject::assign_value"))
        })
    }

    /// Capture the value at stack `position` without disturbing the stack.
    pub fn capture_stack_position(
        &mut self,
        state: &StateHandle,
        position: c_int,
    ) -> LuaResult<()> {
        let l = state.inner.open_raw()?;
        let resolved = resolve_position(l, position);
        lua_assert!(
            resolved.is_some(),
            "LuaObject::capture_stack_position",
            "position {} with {} on the stack",
            position,
            unsafe { ffi::lua_gettop(l) }
        );
        let index = resolved.unwrap_or_default();
        self.assign_with(state, |l| unsafe {
            ffi::lua_pushvalue(l, index);
            Ok(())
        })
    }

    /// Push via `push`, take a new slot for it, then let go of the old slot.
    /// The new slot is acquired first so a value read from our own old slot
    /// is never released before it has been re-registered.
    pub(crate) fn assign_with(
        &mut self,
        state: &StateHandle,
        push: impl FnOnce(*mut ffi::lua_State) -> LuaResult<()>,
    ) -> LuaResult<()> {
        let l = state.inner.open_raw()?;
        let _guard = StackGuard::new(l);
        check_stack(l, 2)?;
        push(l)?;
        let fresh = LuaObject::from_top(&state.inner, l);
        let old = std::mem::replace(self, fresh);
        drop(old);
        Ok(())
    }

    // ==================== Type ====================

    /// Type tag of the value; `LuaType::None` when empty or detached.
    pub fn type_of(&self) -> LuaType {
        self.query(LuaType::None, |l, _| unsafe {
            LuaType::from_raw(ffi::lua_type(l, -1))
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.type_of().name()
    }

    pub fn is_boolean(&self) -> bool {
        self.query(false, |l, _| unsafe { ffi::lua_isboolean(l, -1) != 0 })
    }

    /// Numbers, plus numeral strings unless strict type checks are on.
    pub fn is_number(&self) -> bool {
        self.query(false, |l, options| unsafe {
            if options.strict_type_checks {
                ffi::lua_type(l, -1) == ffi::LUA_TNUMBER
            } else {
                ffi::lua_isnumber(l, -1) != 0
            }
        })
    }

    /// Integer-valued numbers. Without strict checks, anything `to_integer`
    /// converts exactly (`3.0`, `"42"`) also counts.
    pub fn is_integer(&self) -> bool {
        self.query(false, |l, options| unsafe {
            if options.strict_type_checks {
                ffi::lua_isinteger(l, -1) != 0
            } else {
                let mut isnum = 0;
                ffi::lua_tointegerx(l, -1, &mut isnum);
                isnum != 0
            }
        })
    }

    /// Strings, plus numbers unless strict type checks are on.
    pub fn is_string(&self) -> bool {
        self.query(false, |l, options| unsafe {
            if options.strict_type_checks {
                ffi::lua_type(l, -1) == ffi::LUA_TSTRING
            } else {
                ffi::lua_isstring(l, -1) != 0
            }
        })
    }

    pub fn is_table(&self) -> bool {
        self.query(false, |l, _| unsafe { ffi::lua_istable(l, -1) != 0 })
    }

    pub fn is_nil(&self) -> bool {
        self.query(false, |l, _| unsafe { ffi::lua_isnil(l, -1) != 0 })
    }

    /// True for an empty reference.
    pub fn is_none(&self) -> bool {
        self.query(true, |l, _| unsafe { ffi::lua_isnone(l, -1) != 0 })
    }

    pub fn is_none_or_nil(&self) -> bool {
        self.query(true, |l, _| unsafe { ffi::lua_isnoneornil(l, -1) != 0 })
    }

    /// Full or light userdata.
    pub fn is_user_data(&self) -> bool {
        self.query(false, |l, _| unsafe { ffi::lua_isuserdata(l, -1) != 0 })
    }

    pub fn is_light_user_data(&self) -> bool {
        self.query(false, |l, _| unsafe {
            ffi::lua_islightuserdata(l, -1) != 0
        })
    }

    pub fn is_function(&self) -> bool {
        self.query(false, |l, _| unsafe { ffi::lua_isfunction(l, -1) != 0 })
    }

    pub fn is_c_function(&self) -> bool {
        self.query(false, |l, _| unsafe { ffi::lua_iscfunction(l, -1) != 0 })
    }

    pub fn is_thread(&self) -> bool {
        self.query(false, |l, _| unsafe { ffi::lua_isthread(l, -1) != 0 })
    }

    // ==================== Coercion ====================

    /// Lua truthiness: only `nil` and `false` are false.
    pub fn to_boolean(&self) -> LuaResult<bool> {
        self.coerce("LuaObject::to_boolean", |l| unsafe {
            Ok(ffi::lua_toboolean(l, -1) != 0)
        })
    }

    /// Engine integer conversion; 0 when the value is not convertible.
    pub fn to_integer(&self) -> LuaResult<i64> {
        Ok(self.to_integer_x()?.unwrap_or(0))
    }

    /// Like `to_integer`, with `None` when the value is not convertible.
    pub fn to_integer_x(&self) -> LuaResult<Option<i64>> {
        self.coerce("LuaObject::to_integer", |l| unsafe {
            let mut isnum = 0;
            let value = ffi::lua_tointegerx(l, -1, &mut isnum);
            Ok((isnum != 0).then_some(value))
        })
    }

    /// Engine float conversion; 0.0 when the value is not convertible.
    pub fn to_number(&self) -> LuaResult<f64> {
        Ok(self.to_number_x()?.unwrap_or(0.0))
    }

    pub fn to_number_x(&self) -> LuaResult<Option<f64>> {
        self.coerce("LuaObject::to_number", |l| unsafe {
            let mut isnum = 0;
            let value = ffi::lua_tonumberx(l, -1, &mut isnum);
            Ok((isnum != 0).then_some(value))
        })
    }

    /// Raw string bytes. Numbers are formatted by the engine; other types
    /// yield `None`.
    pub fn to_bytes(&self) -> LuaResult<Option<Vec<u8>>> {
        self.coerce("LuaObject::to_bytes", |l| unsafe { Ok(read_bytes(l, -1)) })
    }

    /// `to_bytes`, decoded as UTF-8 with replacement characters.
    pub fn to_str(&self) -> LuaResult<Option<String>> {
        Ok(self
            .to_bytes()?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// The pointer stored in a userdata value. Full userdata is unwrapped
    /// through one indirection; light userdata is the pointer itself.
    pub fn to_user_data(&self) -> LuaResult<*mut c_void> {
        self.coerce("LuaObject::to_user_data", |l| unsafe {
            match ffi::lua_type(l, -1) {
                ffi::LUA_TLIGHTUSERDATA => Ok(ffi::lua_touserdata(l, -1)),
                ffi::LUA_TUSERDATA => {
                    let block_size = ffi::lua_rawlen(l, -1) as usize;
                    lua_assert!(
                        block_size >= std::mem::size_of::<*mut c_void>(),
                        "LuaObject::to_user_data",
                        "userdata block of {} bytes cannot hold a pointer",
                        block_size
                    );
                    let block = ffi::lua_touserdata(l, -1) as *mut *mut c_void;
                    Ok(block.read_unaligned())
                }
                other => Err(LuaError::assertion(
                    "LuaObject::to_user_data",
                    "self.is_user_data()",
                    Some(format!("value is a {}", LuaType::from_raw(other).name())),
                )),
            }
        })
    }

    /// Identity of the referenced object as `lua_topointer` reports it: the
    /// block address for full userdata, the pointer itself for light
    /// userdata, null for values without identity.
    pub fn to_pointer(&self) -> LuaResult<*const c_void> {
        self.coerce("LuaObject::to_pointer", |l| unsafe { Ok(ffi::lua_topointer(l, -1)) })
    }

    /// Raw (metamethod-free) equality with another reference.
    pub fn raw_equal(&self, other: &LuaObject) -> LuaResult<bool> {
        let (inner, l) = self.bound_state("LuaObject::raw_equal")?;
        let _guard = StackGuard::new(l);
        check_stack(l, 2)?;
        unsafe { self.push_raw(l) };
        other.push_checked(&inner, l, "LuaObject::raw_equal")?;
        Ok(unsafe { ffi::lua_rawequal(l, -1, -2) } != 0)
    }

    // ==================== Internals ====================

    /// Push our value without any checks. Caller has verified the state.
    #[inline]
    pub(crate) unsafe fn push_raw(&self, l: *mut ffi::lua_State) {
        unsafe {
            ffi::lua_rawgeti(l, ffi::LUA_REGISTRYINDEX, self.key.get() as ffi::lua_Integer);
        }
    }

    /// Push our value into `inner`'s stack after checking that we are bound
    /// to that same state.
    pub(crate) fn push_checked(
        &self,
        inner: &Rc<StateInner>,
        l: *mut ffi::lua_State,
        operation: &'static str,
    ) -> LuaResult<()> {
        lua_assert!(!self.is_empty(), operation, "reference is empty");
        let owner = self
            .state
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(LuaError::StateClosed)?;
        let same_state = Rc::ptr_eq(&owner, inner);
        lua_assert!(same_state, operation, "reference belongs to another state");
        unsafe { self.push_raw(l) };
        Ok(())
    }

    /// The owning state of a bound reference, open and ready.
    pub(crate) fn bound_state(
        &self,
        operation: &'static str,
    ) -> LuaResult<(Rc<StateInner>, *mut ffi::lua_State)> {
        lua_assert!(!self.is_empty(), operation, "reference is empty");
        let inner = self
            .state
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(LuaError::StateClosed)?;
        let l = inner.open_raw()?;
        Ok((inner, l))
    }

    fn unbound_error(&self, operation: &'static str) -> LuaError {
        if self.is_empty() {
            LuaError::assertion(operation, "!source.is_empty()", Some("reference is empty".to_string()))
        } else {
            LuaError::StateClosed
        }
    }

    /// Push, inspect, pop. Empty or detached references yield `default`.
    fn query<R>(&self, default: R, f: impl FnOnce(*mut ffi::lua_State, &StateOptions) -> R) -> R {
        let Ok((inner, l)) = self.bound_state("LuaObject::query") else {
            return default;
        };
        let _guard = StackGuard::new(l);
        if check_stack(l, 1).is_err() {
            return default;
        }
        unsafe { self.push_raw(l) };
        f(l, inner.options())
    }

    /// Push, convert, pop. When `convert_on_coerce` is set and the conversion
    /// changed the pushed value's type, rebind to the converted value.
    fn coerce<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(*mut ffi::lua_State) -> LuaResult<R>,
    ) -> LuaResult<R> {
        let (inner, l) = self.bound_state(operation)?;
        let _guard = StackGuard::new(l);
        check_stack(l, 2)?;
        unsafe { self.push_raw(l) };
        let before = unsafe { ffi::lua_type(l, -1) };
        let value = f(l)?;
        if inner.options().convert_on_coerce && unsafe { ffi::lua_type(l, -1) } != before {
            let key = unsafe { ffi::luaL_ref(l, ffi::LUA_REGISTRYINDEX) };
            let old = self.key.replace(key);
            unsafe { ffi::luaL_unref(l, ffi::LUA_REGISTRYINDEX, old) };
            trace!(old, key, "rebound converted value");
        }
        Ok(value)
    }
}

impl Default for LuaObject {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LuaObject {
    /// Duplicate into a new registry slot. An empty or detached reference
    /// clones to an empty one.
    fn clone(&self) -> Self {
        let Ok((inner, l)) = self.bound_state("LuaObject::clone") else {
            return LuaObject::new();
        };
        let _guard = StackGuard::new(l);
        if check_stack(l, 1).is_err() {
            return LuaObject::new();
        }
        unsafe { self.push_raw(l) };
        LuaObject::from_top(&inner, l)
    }
}

impl Drop for LuaObject {
    fn drop(&mut self) {
        let key = self.key.replace(NO_REF);
        release_slot(self.state.take(), key);
    }
}

impl std::fmt::Debug for LuaObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LuaObject(ref={}, type={})",
            self.key.get(),
            self.type_name()
        )
    }
}

/// Return `key` to the free list of the state it came from, if that state is
/// still open. A closed state already freed everything.
fn release_slot(state: Option<Weak<StateInner>>, key: c_int) {
    if key == NO_REF {
        return;
    }
    let Some(inner) = state.as_ref().and_then(Weak::upgrade) else {
        return;
    };
    let l = inner.raw();
    if l.is_null() {
        return;
    }
    unsafe { ffi::luaL_unref(l, ffi::LUA_REGISTRYINDEX, key) };
    trace!(key, "released registry slot");
}

/// Clamp a capacity hint into the engine's `int`.
#[inline]
pub(crate) fn size_hint(n: usize) -> c_int {
    c_int::try_from(n).unwrap_or(c_int::MAX)
}

/// Push a full userdata block that stores `value`.
pub(crate) unsafe fn push_user_data(l: *mut ffi::lua_State, value: *mut c_void) {
    unsafe {
        let block =
            ffi::lua_newuserdatauv(l, std::mem::size_of::<*mut c_void>(), 0) as *mut *mut c_void;
        block.write_unaligned(value);
    }
}

/// Copy the string at `index`, converting numbers in place like
/// `lua_tolstring` does.
pub(crate) unsafe fn read_bytes(l: *mut ffi::lua_State, index: c_int) -> Option<Vec<u8>> {
    unsafe {
        let mut len = 0usize;
        let s = ffi::lua_tolstring(l, index, &mut len);
        if s.is_null() {
            None
        } else {
            Some(std::slice::from_raw_parts(s as *const u8, len).to_vec())
        }
    }
}

//! `IntoLua` / `TableKey` / `FromLua`: moving Rust values in and out of
//! references without touching the stack by hand.
//!
//! # Built-in impls
//! - `IntoLua`: `bool`, `i8`..`i64`, `u8`..`u64`, `isize`, `usize`, `f32`,
//!   `f64`, `&str`, `String`, `&[u8]`, `Vec<u8>`, `Option<T>`, [`Nil`],
//!   `&LuaObject`, [`LightUserData`], [`UserData`]
//! - `TableKey`: `str`, `String`, integer types, `LuaObject`, and `&K` for
//!   any of those
//! - `FromLua`: `bool`, `i64`, `i32`, `f64`, `String`, `Vec<u8>`, `Option<T>`,
//!   `LuaObject`
//!
//! # User extensibility
//! ```ignore
//! struct Celsius(f64);
//!
//! impl IntoLua for Celsius {
//!     fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
//!         self.0.push_into(target)
//!     }
//! }
//! ```

use std::os::raw::c_void;
use std::rc::Rc;

use mlua_sys as ffi;

use crate::error::{LuaError, LuaResult};
use crate::lua_object::{LuaObject, push_user_data};
use crate::lua_state::StateInner;

/// Where a value is being pushed: the state it must belong to, its raw
/// stack, and the public operation on whose behalf the push happens.
///
/// The caller has already reserved stack space for one value.
pub struct PushTarget<'a> {
    pub(crate) state: &'a Rc<StateInner>,
    pub(crate) l: *mut ffi::lua_State,
    pub(crate) operation: &'static str,
}

impl<'a> PushTarget<'a> {
    pub(crate) fn new(
        state: &'a Rc<StateInner>,
        l: *mut ffi::lua_State,
        operation: &'static str,
    ) -> Self {
        PushTarget {
            state,
            l,
            operation,
        }
    }

    /// The raw stack to push onto.
    pub fn raw_state(&self) -> *mut ffi::lua_State {
        self.l
    }

    /// Name of the operation the push belongs to, for error messages.
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

/// Push a Rust value onto the stack.
///
/// Implementations must push exactly one value on success and nothing on
/// failure beyond what the surrounding guard pops.
pub trait IntoLua {
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()>;
}

/// A value usable as a table key.
pub trait TableKey {
    fn push_key(&self, target: &PushTarget<'_>) -> LuaResult<()>;
}

/// Read a Rust value out of a reference.
pub trait FromLua: Sized {
    fn from_lua(object: &LuaObject) -> LuaResult<Self>;
}

/// The `nil` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nil;

/// A raw pointer pushed as light userdata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightUserData(pub *mut c_void);

/// A raw pointer boxed into a new full userdata block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserData(pub *mut c_void);

// ==================== Nil / Boolean ====================

impl IntoLua for Nil {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        unsafe { ffi::lua_pushnil(target.l) };
        Ok(())
    }
}

impl IntoLua for bool {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        unsafe { ffi::lua_pushboolean(target.l, self as _) };
        Ok(())
    }
}

impl FromLua for bool {
    /// Lua truthiness: nil and false are false, everything else is true.
    #[inline]
    fn from_lua(object: &LuaObject) -> LuaResult<Self> {
        object.to_boolean()
    }
}

// ==================== Integer types ====================

macro_rules! impl_integer {
    ($($ty:ty),*) => {
        $(
            impl IntoLua for $ty {
                #[inline]
                fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
                    unsafe { ffi::lua_pushinteger(target.l, self as ffi::lua_Integer) };
                    Ok(())
                }
            }

            impl TableKey for $ty {
                #[inline]
                fn push_key(&self, target: &PushTarget<'_>) -> LuaResult<()> {
                    (*self).push_into(target)
                }
            }
        )*
    };
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32);

// Values past i64::MAX have no integer representation; they go in as floats.
macro_rules! impl_wide_unsigned {
    ($($ty:ty),*) => {
        $(
            impl IntoLua for $ty {
                #[inline]
                fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
                    match ffi::lua_Integer::try_from(self) {
                        Ok(n) => unsafe { ffi::lua_pushinteger(target.l, n) },
                        Err(_) => unsafe { ffi::lua_pushnumber(target.l, self as ffi::lua_Number) },
                    }
                    Ok(())
                }
            }

            impl TableKey for $ty {
                #[inline]
                fn push_key(&self, target: &PushTarget<'_>) -> LuaResult<()> {
                    (*self).push_into(target)
                }
            }
        )*
    };
}

impl_wide_unsigned!(u64, usize);

impl FromLua for i64 {
    fn from_lua(object: &LuaObject) -> LuaResult<Self> {
        object
            .to_integer_x()?
            .ok_or_else(|| LuaError::Conversion(format!("expected integer, got {}", object.type_name())))
    }
}

impl FromLua for i32 {
    fn from_lua(object: &LuaObject) -> LuaResult<Self> {
        let n = i64::from_lua(object)?;
        i32::try_from(n)
            .map_err(|_| LuaError::Conversion(format!("integer {} does not fit in i32", n)))
    }
}

// ==================== Float types ====================

impl IntoLua for f64 {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        unsafe { ffi::lua_pushnumber(target.l, self) };
        Ok(())
    }
}

impl IntoLua for f32 {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        (self as f64).push_into(target)
    }
}

impl FromLua for f64 {
    fn from_lua(object: &LuaObject) -> LuaResult<Self> {
        object
            .to_number_x()?
            .ok_or_else(|| LuaError::Conversion(format!("expected number, got {}", object.type_name())))
    }
}

// ==================== Strings ====================

impl IntoLua for &[u8] {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        unsafe { ffi::lua_pushlstring(target.l, self.as_ptr() as *const _, self.len()) };
        Ok(())
    }
}

impl IntoLua for Vec<u8> {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        self.as_slice().push_into(target)
    }
}

impl IntoLua for &str {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        self.as_bytes().push_into(target)
    }
}

impl IntoLua for String {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        self.as_bytes().push_into(target)
    }
}

impl TableKey for str {
    #[inline]
    fn push_key(&self, target: &PushTarget<'_>) -> LuaResult<()> {
        self.as_bytes().push_into(target)
    }
}

impl TableKey for String {
    #[inline]
    fn push_key(&self, target: &PushTarget<'_>) -> LuaResult<()> {
        self.as_bytes().push_into(target)
    }
}

impl FromLua for String {
    fn from_lua(object: &LuaObject) -> LuaResult<Self> {
        object
            .to_str()?
            .ok_or_else(|| LuaError::Conversion(format!("expected string, got {}", object.type_name())))
    }
}

impl FromLua for Vec<u8> {
    fn from_lua(object: &LuaObject) -> LuaResult<Self> {
        object
            .to_bytes()?
            .ok_or_else(|| LuaError::Conversion(format!("expected string, got {}", object.type_name())))
    }
}

// ==================== Option ====================

impl<T: IntoLua> IntoLua for Option<T> {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        match self {
            Some(value) => value.push_into(target),
            None => Nil.push_into(target),
        }
    }
}

impl<T: FromLua> FromLua for Option<T> {
    fn from_lua(object: &LuaObject) -> LuaResult<Self> {
        if object.is_none_or_nil() {
            Ok(None)
        } else {
            T::from_lua(object).map(Some)
        }
    }
}

// ==================== Userdata ====================

impl IntoLua for LightUserData {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        unsafe { ffi::lua_pushlightuserdata(target.l, self.0) };
        Ok(())
    }
}

impl IntoLua for UserData {
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        unsafe { push_user_data(target.l, self.0) };
        Ok(())
    }
}

// ==================== References ====================

impl IntoLua for &LuaObject {
    /// The referenced value. The reference must be bound to the target state.
    #[inline]
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        self.push_checked(target.state, target.l, target.operation)
    }
}

impl TableKey for LuaObject {
    #[inline]
    fn push_key(&self, target: &PushTarget<'_>) -> LuaResult<()> {
        self.push_into(target)
    }
}

impl<K: TableKey + ?Sized> TableKey for &K {
    #[inline]
    fn push_key(&self, target: &PushTarget<'_>) -> LuaResult<()> {
        (**self).push_key(target)
    }
}

impl FromLua for LuaObject {
    /// Identity, as an independent copy.
    #[inline]
    fn from_lua(object: &LuaObject) -> LuaResult<Self> {
        Ok(object.clone())
    }
}

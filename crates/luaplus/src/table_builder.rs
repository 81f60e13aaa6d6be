//! Fluent builder for constructing Lua tables from Rust.
//!
//! `TableBuilder` collects key-value pairs and then creates the table in one
//! shot via [`build`](TableBuilder::build), sized from what was collected.
//!
//! # Example
//!
//! ```ignore
//! let config = TableBuilder::new()
//!     .set("host", "localhost")
//!     .set("port", 8080)
//!     .set("debug", true)
//!     .build(&state)?;
//! state.globals()?.set("config", &config)?;
//! ```

use crate::convert::{IntoLua, PushTarget, TableKey};
use crate::error::LuaResult;
use crate::lua_object::LuaObject;
use crate::lua_state::StateHandle;

/// Fluent builder for Lua tables.
pub struct TableBuilder<'a> {
    /// Keyed entries, written after the array part.
    entries: Vec<(Box<dyn TableKey + 'a>, Deferred<'a>)>,
    /// Sequential array entries (1-based).
    array: Vec<Deferred<'a>>,
}

/// A value whose push is postponed until `build` has a state to push into.
struct Deferred<'a>(Box<dyn PushOnce + 'a>);

trait PushOnce {
    fn push_once(self: Box<Self>, target: &PushTarget<'_>) -> LuaResult<()>;
}

impl<T: IntoLua> PushOnce for T {
    fn push_once(self: Box<Self>, target: &PushTarget<'_>) -> LuaResult<()> {
        (*self).push_into(target)
    }
}

impl IntoLua for Deferred<'_> {
    fn push_into(self, target: &PushTarget<'_>) -> LuaResult<()> {
        self.0.push_once(target)
    }
}

impl<'a> TableBuilder<'a> {
    #[inline]
    pub fn new() -> Self {
        TableBuilder {
            entries: Vec::new(),
            array: Vec::new(),
        }
    }

    /// Add a keyed entry.
    #[inline]
    pub fn set<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TableKey + 'a,
        V: IntoLua + 'a,
    {
        self.entries
            .push((Box::new(key), Deferred(Box::new(value))));
        self
    }

    /// Append a value to the sequential part. Values get keys 1, 2, 3, ...
    /// in order.
    ///
    /// ```ignore
    /// let list = TableBuilder::new().push(10).push(20).push(30).build(&state)?;
    /// // Lua: {10, 20, 30}
    /// ```
    #[inline]
    pub fn push<V: IntoLua + 'a>(mut self, value: V) -> Self {
        self.array.push(Deferred(Box::new(value)));
        self
    }

    /// Materialise the table in `state`.
    pub fn build(self, state: &StateHandle) -> LuaResult<LuaObject> {
        let mut table = LuaObject::new();
        table.assign_new_table(state, self.array.len(), self.entries.len())?;

        for (i, value) in self.array.into_iter().enumerate() {
            table.set((i + 1) as i64, value)?;
        }
        for (key, value) in self.entries {
            table.set(&*key, value)?;
        }

        Ok(table)
    }
}

impl Default for TableBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

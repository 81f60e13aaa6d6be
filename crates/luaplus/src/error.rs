use std::os::raw::c_int;

pub type LuaResult<T> = Result<T, LuaError>;

/// Everything that can go wrong while talking to an engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LuaError {
    /// Contract violation: the caller used an operation outside its precondition
    /// (wrong value type, empty reference, bad stack position, foreign key).
    Assertion {
        operation: &'static str,
        condition: &'static str,
        context: Option<String>,
    },
    /// The owning `LuaState` was closed or dropped before this use.
    StateClosed,
    /// `lua_checkstack` could not make room for the pushes an operation needs.
    StackOverflow,
    /// `luaL_newstate` could not allocate an instance.
    OutOfMemory,
    /// Status code and message reported by the engine (load or protected call).
    Engine { status: c_int, message: String },
    /// A value could not be represented as the requested Rust type.
    Conversion(String),
}

impl LuaError {
    pub(crate) fn assertion(
        operation: &'static str,
        condition: &'static str,
        context: Option<String>,
    ) -> Self {
        LuaError::Assertion {
            operation,
            condition,
            context,
        }
    }

    /// True for contract violations.
    pub fn is_assertion(&self) -> bool {
        matches!(self, LuaError::Assertion { .. })
    }

    /// The raw engine status code, if this error came from the engine.
    pub fn status(&self) -> Option<c_int> {
        match self {
            LuaError::Engine { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for LuaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LuaError::Assertion {
                operation,
                condition,
                context,
            } => {
                write!(f, "assertion failed in {}: ({})", operation, condition)?;
                if let Some(context) = context {
                    write!(f, "; {}", context)?;
                }
                Ok(())
            }
            LuaError::StateClosed => write!(f, "Lua state is closed"),
            LuaError::StackOverflow => write!(f, "Stack Overflow"),
            LuaError::OutOfMemory => write!(f, "not enough memory to create a Lua state"),
            LuaError::Engine { message, .. } => write!(f, "{}", message),
            LuaError::Conversion(msg) => write!(f, "conversion error: {}", msg),
        }
    }
}

impl std::error::Error for LuaError {}

/// Return a `LuaError::Assertion` from the enclosing function unless `cond` holds.
///
/// The failing expression is recorded verbatim, so keep it readable.
macro_rules! lua_assert {
    ($cond:expr, $operation:expr) => {
        if !($cond) {
            return Err($crate::error::LuaError::assertion(
                $operation,
                stringify!($cond),
                None,
            ));
        }
    };
    ($cond:expr, $operation:expr, $($context:tt)+) => {
        if !($cond) {
            return Err($crate::error::LuaError::assertion(
                $operation,
                stringify!($cond),
                Some(format!($($context)+)),
            ));
        }
    };
}

pub(crate) use lua_assert;

#[cfg(test)]
mod tests {
    use super::*;

    fn needs_positive(n: i32) -> LuaResult<i32> {
        lua_assert!(n > 0, "needs_positive");
        Ok(n)
    }

    fn needs_even(n: i32) -> LuaResult<i32> {
        lua_assert!(n % 2 == 0, "needs_even", "got {}", n);
        Ok(n)
    }

    #[test]
    fn test_assertion_message() {
        let err = needs_positive(-1).unwrap_err();
        assert!(err.is_assertion());
        assert_eq!(err.to_string(), "assertion failed in needs_positive: (n > 0)");

        let err = needs_even(3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "assertion failed in needs_even: (n % 2 == 0); got 3"
        );
        assert_eq!(needs_even(4), Ok(4));
    }

    #[test]
    fn test_engine_status() {
        let err = LuaError::Engine {
            status: 3,
            message: "syntax error".to_string(),
        };
        assert_eq!(err.status(), Some(3));
        assert_eq!(err.to_string(), "syntax error");
        assert_eq!(LuaError::StateClosed.status(), None);
    }
}

/// Behaviour switches fixed when a `LuaState` is created.
///
/// Every `LuaObject` bound to the state sees the same options, so type
/// predicates and conversions behave uniformly for the life of the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StateOptions {
    /// `is_number` / `is_string` match the exact value type only.
    /// When off, a numeral string is a number and a number is a string,
    /// following the engine's implicit coercion.
    pub strict_type_checks: bool,
    /// `to_*` conversions that change the value's type (a number read back
    /// as a string) rebind the reference to the converted value.
    pub convert_on_coerce: bool,
    /// Open the standard libraries right after the instance is created.
    pub open_libs: bool,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            strict_type_checks: cfg!(feature = "strict-type-checks"),
            convert_on_coerce: cfg!(feature = "convert-on-coerce"),
            open_libs: false,
        }
    }
}

impl StateOptions {
    pub fn strict() -> Self {
        Self {
            strict_type_checks: true,
            ..Self::default()
        }
    }

    pub fn with_libs(mut self) -> Self {
        self.open_libs = true;
        self
    }
}

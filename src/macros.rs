//! Macros to reduce boilerplate in the codebase

/// Macro to generate Display and FromStr implementations for enums.
///
/// Parsing is case-insensitive; unknown values become a validation error
/// naming the offending input.
///
/// # Usage
///
/// ```rust,ignore
/// enum_display_fromstr!(
///     SortKey,
///     "sort key",
///     {
///         LastSeen => "lastSeen",
///         EventCount => "eventCount",
///     }
/// );
/// ```
#[macro_export]
macro_rules! enum_display_fromstr {
    (
        $enum_name:ident,
        $what:expr,
        { $($variant:ident => $str:expr),+ $(,)? }
    ) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($enum_name::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = $crate::error::LookoutError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($str) {
                        return Ok($enum_name::$variant);
                    }
                )+
                Err($crate::error::LookoutError::Validation(format!(
                    "invalid {} '{}'",
                    $what, s
                )))
            }
        }
    };
}

/// Macro to generate only Display implementation for enums
///
/// # Usage
///
/// ```rust,ignore
/// enum_display!(
///     MyEnum,
///     {
///         Variant1 => "variant1",
///         Variant2 => "variant2",
///     }
/// );
/// ```
#[macro_export]
macro_rules! enum_display {
    (
        $enum_name:ident,
        { $($variant:ident => $str:expr),+ $(,)? }
    ) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($enum_name::$variant => write!(f, $str),)+
                }
            }
        }
    };
}

//! # Registration Macros
//!
//! - [`argument_enum!`] - exposes a plain Rust enum as an argument type so it can
//!   travel through callables, predefined arguments and member signatures
//! - `for_each_arity!` (crate internal) - stamps out an implementation for every
//!   supported parameter count, 0 through [`MAX_ARITY`](crate::MAX_ARITY)

/// Implements [`ArgumentType`](crate::ArgumentType), [`ReturnValue`](crate::ReturnValue)
/// and [`EnumType`](crate::EnumType) for a fieldless enum.
///
/// The second argument is the fully-qualified name used in member tokens and
/// argument tags. Every variant must be listed with its ordinal.
///
/// # Examples
///
/// ```rust
/// use events_plus::argument_enum;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Difficulty { Easy, Normal, Hard }
///
/// argument_enum!(Difficulty, "Game.Difficulty", { Easy = 0, Normal = 1, Hard = 2 });
/// ```
#[macro_export]
macro_rules! argument_enum {
    ($ty:ident, $name:expr, { $($variant:ident = $ord:expr),+ $(,)? }) => {
        impl $crate::ArgumentType for $ty {
            fn type_ref() -> $crate::TypeRef {
                $crate::TypeRef::named($name)
            }

            fn from_value(value: &$crate::Value) -> ::core::option::Option<Self> {
                match value {
                    $crate::Value::Enum { type_ref, ordinal } if type_ref.name() == $name => {
                        match *ordinal {
                            $( o if o == $ord => ::core::option::Option::Some($ty::$variant), )+
                            _ => ::core::option::Option::None,
                        }
                    }
                    _ => ::core::option::Option::None,
                }
            }

            fn into_value(self) -> $crate::Value {
                let ordinal = match self {
                    $( $ty::$variant => $ord, )+
                };
                $crate::Value::Enum { type_ref: $crate::TypeRef::named($name), ordinal }
            }
        }

        impl $crate::ReturnValue for $ty {
            fn return_type() -> ::core::option::Option<$crate::TypeRef> {
                ::core::option::Option::Some(<$ty as $crate::ArgumentType>::type_ref())
            }

            fn into_return(self) -> ::core::result::Result<::core::option::Option<$crate::Value>, $crate::EventError> {
                ::core::result::Result::Ok(::core::option::Option::Some($crate::ArgumentType::into_value(self)))
            }
        }

        impl $crate::EnumType for $ty {
            fn variants() -> &'static [(&'static str, i32)] {
                &[ $( (stringify!($variant), $ord), )+ ]
            }
        }
    };
}

/// Invokes `$mac` once per supported arity with generic parameter names.
macro_rules! for_each_arity {
    ($mac:ident) => {
        $mac!();
        $mac!(A1);
        $mac!(A1, A2);
        $mac!(A1, A2, A3);
        $mac!(A1, A2, A3, A4);
        $mac!(A1, A2, A3, A4, A5);
        $mac!(A1, A2, A3, A4, A5, A6);
        $mac!(A1, A2, A3, A4, A5, A6, A7);
        $mac!(A1, A2, A3, A4, A5, A6, A7, A8);
        $mac!(A1, A2, A3, A4, A5, A6, A7, A8, A9);
        $mac!(A1, A2, A3, A4, A5, A6, A7, A8, A9, A10);
    };
}

pub(crate) use for_each_arity;

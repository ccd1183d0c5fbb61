#![feature(error_generic_member_access)]
#![deny(missing_docs)]

//! This crate defines error & result types for Tessera.
//! It also contains a variety of useful macros for error handling.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::num::TryFromIntError;
use std::ops::Deref;
use std::{env, fmt, io};

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

#[allow(clippy::fallible_impl_from)]
impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    fn from(msg: T) -> Self {
        if env::var("TESSERA_PANIC_ON_ERR").as_deref().unwrap_or("") == "1" {
            panic!("{}\nBacktrace:\n{}", msg.into(), Backtrace::capture());
        } else {
            Self(msg.into())
        }
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The top-level error type for Tessera.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum TesseraError {
    /// An index is out of bounds.
    #[error("index {0} out of bounds from {1} to {2}\nBacktrace:\n{3}")]
    OutOfBounds(usize, usize, usize, Backtrace),
    /// An invalid argument or configuration was provided.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, Backtrace),
    /// A computed on-disk region would not fit in a single file.
    #[error("{0}\nBacktrace:\n{1}")]
    Capacity(ErrString, Backtrace),
    /// An error occurred while decoding persisted bytes.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidSerde(ErrString, Backtrace),
    /// An operation is not supported for the given type.
    #[error("function {0} not implemented for {1}\nBacktrace:\n{2}")]
    NotImplemented(ErrString, ErrString, Backtrace),
    /// A type mismatch occurred.
    #[error("expected type: {0} but instead got {1}\nBacktrace:\n{2}")]
    MismatchedTypes(ErrString, ErrString, Backtrace),
    /// An object was used in a state that does not permit the operation.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidState(ErrString, Backtrace),
    /// An assertion failed.
    #[error("{0}\nBacktrace:\n{1}")]
    AssertionFailed(ErrString, Backtrace),
    /// A wrapper for other errors, carrying additional context.
    #[error("{0}: {1}")]
    Context(ErrString, #[source] Box<TesseraError>),
    /// A wrapper for IO errors.
    #[error("{0}\nBacktrace:\n{1}")]
    IOError(#[from] io::Error, Backtrace),
    /// A wrapper for errors from integer conversions.
    #[error("{0}\nBacktrace:\n{1}")]
    TryFromIntError(#[from] TryFromIntError, Backtrace),
    /// A wrapper for JSON (de)serialization errors.
    #[cfg(feature = "serde")]
    #[error("{0}\nBacktrace:\n{1}")]
    JSONError(#[from] serde_json::Error, Backtrace),
}

impl TesseraError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        TesseraError::Context(msg.into(), Box::new(self))
    }
}

impl Debug for TesseraError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return TesseraErrors as their error type.
pub type TesseraResult<T> = Result<T, TesseraError>;

/// A trait for expect-ing a TesseraResult or an Option.
pub trait TesseraExpect {
    /// The type of the value being expected.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug.
    fn tessera_expect(self, msg: &str) -> Self::Output;
}

impl<T, E> TesseraExpect for Result<T, E>
where
    E: Into<TesseraError>,
{
    type Output = T;

    #[inline(always)]
    fn tessera_expect(self, msg: &str) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|e| tessera_panic!(e.with_context(msg.to_string())))
    }
}

impl<T> TesseraExpect for Option<T> {
    type Output = T;

    #[inline(always)]
    fn tessera_expect(self, msg: &str) -> Self::Output {
        self.unwrap_or_else(|| {
            let err = TesseraError::AssertionFailed(msg.to_string().into(), Backtrace::capture());
            tessera_panic!(err)
        })
    }
}

/// A convenient macro for creating a TesseraError.
#[macro_export]
macro_rules! tessera_err {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        $crate::__private::must_use($crate::TesseraError::OutOfBounds(
            $idx,
            $start,
            $stop,
            ::std::backtrace::Backtrace::capture(),
        ))
    }};
    (NotImplemented: $func:expr, $by_whom:expr) => {{
        $crate::__private::must_use($crate::TesseraError::NotImplemented(
            $func.into(),
            format!("{}", $by_whom).into(),
            ::std::backtrace::Backtrace::capture(),
        ))
    }};
    (MismatchedTypes: $expected:literal, $actual:expr) => {{
        $crate::__private::must_use($crate::TesseraError::MismatchedTypes(
            $expected.into(),
            $actual.to_string().into(),
            ::std::backtrace::Backtrace::capture(),
        ))
    }};
    (MismatchedTypes: $expected:expr, $actual:expr) => {{
        $crate::__private::must_use($crate::TesseraError::MismatchedTypes(
            $expected.to_string().into(),
            $actual.to_string().into(),
            ::std::backtrace::Backtrace::capture(),
        ))
    }};
    (Context: $msg:literal, $err:expr) => {{
        $crate::__private::must_use($crate::TesseraError::Context(
            $msg.into(),
            Box::new($err),
        ))
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        $crate::__private::must_use($crate::TesseraError::$variant(
            format!($fmt, $($arg),*).into(),
            ::std::backtrace::Backtrace::capture(),
        ))
    }};
    ($variant:ident: $err:expr $(,)?) => {
        $crate::__private::must_use($crate::TesseraError::$variant(
            $err,
            ::std::backtrace::Backtrace::capture(),
        ))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::tessera_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning a TesseraError.
#[macro_export]
macro_rules! tessera_bail {
    ($($tt:tt)+) => {
        return Err($crate::tessera_err!($($tt)+))
    };
}

/// A convenient macro for panicking with a TesseraError in the presence of a programmer error
/// (e.g., an invariant has been violated).
#[macro_export]
macro_rules! tessera_panic {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        $crate::tessera_panic!($crate::tessera_err!(OutOfBounds: $idx, $start, $stop))
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::tessera_panic!($crate::tessera_err!($variant: $fmt, $($arg),*))
    };
    ($err:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let err: $crate::TesseraError = $err;
        panic!("{}", err.with_context(format!($fmt, $($arg),*)))
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::tessera_panic!($crate::tessera_err!($fmt, $($arg),*))
    };
    ($err:expr) => {{
        let err: $crate::TesseraError = $err;
        panic!("{}", err)
    }};
}

#[doc(hidden)]
pub mod __private {
    use crate::TesseraError;

    #[doc(hidden)]
    #[inline]
    #[cold]
    #[must_use]
    pub const fn must_use(s: TesseraError) -> TesseraError {
        s
    }
}

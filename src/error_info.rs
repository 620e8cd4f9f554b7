//! Application error taxonomy.
//!
//! [`ErrorInfo`] is the one structured failure handler logic is expected to
//! raise. It carries an application error code, free-form debug text, and a
//! `kick` flag asking the session to close once the error reply is sent.
//!
//! Handlers return `Result<_, ErrorInfo>` and bail out with `?`, so a failure
//! deep in a call stack reaches the session boundary without panicking.
//!
//! # Example
//!
//! ```
//! use gatewire::error_info::{ensure, ensure_kick, ErrorInfo};
//!
//! fn buy(gold: u32, price: u32, banned: bool) -> Result<u32, ErrorInfo> {
//!     ensure_kick(!banned, 403, "banned account")?;
//!     ensure(gold >= price, 1001, "not enough gold")?;
//!     Ok(gold - price)
//! }
//!
//! assert_eq!(buy(10, 4, false), Ok(6));
//! assert!(!buy(1, 4, false).unwrap_err().kick());
//! assert!(buy(10, 4, true).unwrap_err().kick());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-defined error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        ErrorCode(code)
    }
}

/// Application error raised by handler logic.
///
/// Immutable once built; use [`ErrorInfo::kicking`] to get a copy with the
/// kick flag set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Code:{code},Debug:{debug}")]
pub struct ErrorInfo {
    code: ErrorCode,
    debug: String,
    kick: bool,
}

impl ErrorInfo {
    /// Create an error that keeps the session open.
    pub fn new(code: impl Into<ErrorCode>, debug: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            debug: debug.into(),
            kick: false,
        }
    }

    /// Create an error with an explicit kick flag.
    pub fn with_kick(code: impl Into<ErrorCode>, debug: impl Into<String>, kick: bool) -> Self {
        Self {
            code: code.into(),
            debug: debug.into(),
            kick,
        }
    }

    /// Same error, but closing the session after the reply.
    pub fn kicking(self) -> Self {
        Self { kick: true, ..self }
    }

    #[inline]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[inline]
    pub fn debug(&self) -> &str {
        &self.debug
    }

    /// Whether the session must be terminated after the error reply.
    #[inline]
    pub fn kick(&self) -> bool {
        self.kick
    }
}

/// Fail with a non-kicking error unless `check` holds.
pub fn ensure(
    check: bool,
    code: impl Into<ErrorCode>,
    debug: impl Into<String>,
) -> Result<(), ErrorInfo> {
    if check {
        Ok(())
    } else {
        Err(ErrorInfo::new(code, debug))
    }
}

/// Fail with a kicking error unless `check` holds.
pub fn ensure_kick(
    check: bool,
    code: impl Into<ErrorCode>,
    debug: impl Into<String>,
) -> Result<(), ErrorInfo> {
    if check {
        Ok(())
    } else {
        Err(ErrorInfo::with_kick(code, debug, true))
    }
}

/// Always fail, with the given kick flag.
pub fn fail<T>(
    code: impl Into<ErrorCode>,
    debug: impl Into<String>,
    kick: bool,
) -> Result<T, ErrorInfo> {
    Err(ErrorInfo::with_kick(code, debug, kick))
}

/// Return early with a non-kicking [`ErrorInfo`] unless the condition holds.
///
/// The error is converted with `Into`, so the macro works in functions
/// returning either `Result<_, ErrorInfo>` or `gatewire::Result<_>`.
///
/// ```
/// use gatewire::{ensure, ErrorInfo};
///
/// fn level_gate(level: u32) -> Result<(), ErrorInfo> {
///     ensure!(level >= 10, 7, "level {} too low", level);
///     Ok(())
/// }
///
/// assert_eq!(level_gate(3).unwrap_err().debug(), "level 3 too low");
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $code:expr, $($arg:tt)+) => {
        if !$cond {
            return ::core::result::Result::Err(
                $crate::ErrorInfo::new($code, ::std::format!($($arg)+)).into(),
            );
        }
    };
}

/// Return early with a kicking [`ErrorInfo`] unless the condition holds.
#[macro_export]
macro_rules! ensure_kick {
    ($cond:expr, $code:expr, $($arg:tt)+) => {
        if !$cond {
            return ::core::result::Result::Err(
                $crate::ErrorInfo::with_kick($code, ::std::format!($($arg)+), true).into(),
            );
        }
    };
}

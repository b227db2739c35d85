//! The fatal-error convention used for contract violations.
//!
//! Every precondition this crate enforces (capacity configured twice,
//! thread-id exhaustion, a `SLOT_COUNT` too small for the configured thread
//! capacity, a double-unlock) is a programming error, not a recoverable
//! runtime condition. There is no `Result` channel for these: the caller has
//! no sensible way to handle them, so we log the violation at `error` level
//! and then panic, the same way the rest of this codebase treats assertion
//! failures in its synchronization primitives.

use std::fmt;

/// Logs `args` at `error` level and panics with the same message.
///
/// Kept out of line and marked `#[cold]` so the (never-taken-in-practice)
/// call site stays small; the actual formatting and panicking happen here.
#[cold]
#[inline(never)]
pub(crate) fn fatal(args: fmt::Arguments<'_>) -> ! {
    log::error!("{args}");
    panic!("{args}");
}

/// Reports a contract violation: logs it and unwinds the process.
macro_rules! fatal_error {
    ($($arg:tt)*) => {
        $crate::error::fatal(format_args!($($arg)*))
    };
}

pub(crate) use fatal_error;

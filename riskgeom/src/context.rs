//! Engine context: numerical configuration and the per-context error channel.

use super::error::{Error, ErrorCode, Result};
use std::cell::RefCell;

/// Default finite-difference bump size: one basis point.
pub const DEFAULT_BUMP_SIZE: f64 = 1e-4;

/// Largest accepted bump size.
pub const MAX_BUMP_SIZE: f64 = 0.1;

/// Longest error message retained by the error channel, in bytes.
const MAX_ERROR_MESSAGE: usize = 255;

/// Central configuration object from which every analysis borrows.
///
/// A context holds the finite-difference bump size used by direct-mode
/// differentiation, a thread-count hint forwarded to external pricing
/// engines, and a one-slot error channel recording the most recent failure.
/// The channel uses interior mutability and the type is intentionally not
/// [`Sync`]; parallel analyses are expected to create one context per thread.
pub struct EngineContext {
    bump_size: f64,
    num_threads: usize,
    last_error: RefCell<Option<(ErrorCode, String)>>,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineContext {
    /// Creates a context with default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bump_size: DEFAULT_BUMP_SIZE,
            num_threads: 1,
            last_error: RefCell::new(None),
        }
    }

    /// Returns the finite-difference bump size.
    #[must_use]
    pub const fn bump_size(&self) -> f64 {
        self.bump_size
    }

    /// Sets the finite-difference bump size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] and leaves the current value
    /// unchanged unless `0 < bump <= 0.1`.
    pub fn set_bump_size(&mut self, bump: f64) -> Result<()> {
        if bump.is_nan() || bump <= 0.0 {
            return self.fail(Error::InvalidArgument(
                "bump size must be positive".to_owned(),
            ));
        }
        if bump > MAX_BUMP_SIZE {
            return self.fail(Error::InvalidArgument(format!(
                "bump size {bump} too large (max {MAX_BUMP_SIZE})"
            )));
        }
        self.bump_size = bump;
        Ok(())
    }

    /// Returns the thread-count hint.
    #[must_use]
    pub const fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Sets the thread-count hint forwarded to external pricing engines. The
    /// analyses in this crate are single-threaded regardless of this value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `threads` is zero.
    pub fn set_num_threads(&mut self, threads: usize) -> Result<()> {
        if threads == 0 {
            return self.fail(Error::InvalidArgument(
                "thread count must be at least 1".to_owned(),
            ));
        }
        self.num_threads = threads;
        Ok(())
    }

    /// Returns the code of the most recently recorded error, or
    /// [`ErrorCode::Success`] if the channel is clear.
    #[must_use]
    pub fn last_error(&self) -> ErrorCode {
        self.last_error
            .borrow()
            .as_ref()
            .map_or(ErrorCode::Success, |(code, _)| *code)
    }

    /// Returns the message of the most recently recorded error, or the
    /// empty string if the channel is clear.
    #[must_use]
    pub fn last_error_message(&self) -> String {
        self.last_error
            .borrow()
            .as_ref()
            .map_or_else(String::new, |(_, msg)| msg.clone())
    }

    /// Clears the error channel.
    pub fn clear_last_error(&self) {
        *self.last_error.borrow_mut() = None;
    }

    /// Records `err` in the error channel. Messages are truncated to 255
    /// bytes on a character boundary.
    pub(crate) fn record(&self, err: &Error) {
        let mut msg = err.to_string();
        if msg.len() > MAX_ERROR_MESSAGE {
            let mut cut = MAX_ERROR_MESSAGE;
            while !msg.is_char_boundary(cut) {
                cut -= 1;
            }
            msg.truncate(cut);
        }
        *self.last_error.borrow_mut() = Some((err.code(), msg));
    }

    /// Records `err` and returns it as the error of a `Result`.
    pub(crate) fn fail<T>(&self, err: Error) -> Result<T> {
        self.record(&err);
        Err(err)
    }
}

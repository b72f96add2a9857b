//! Callback error model.

/// Error raised by a callback (consumer, procedure or listener).
///
/// The bus never wraps, converts or logs-and-drops these: whatever a callback
/// returns is handed back to the caller of `dispatch` as-is.
pub type CallbackError = anyhow::Error;

/// Result type returned by every fallible callback contract.
pub type CallbackResult<T = ()> = Result<T, CallbackError>;

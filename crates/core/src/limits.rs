//! Fixed sizes of the native contract
//!
//! These constants mirror the bounded buffers the native library writes into.
//! They are part of the ABI and cannot change without breaking every model.

/// Maximum variable rank; shape buffers always hold this many entries.
pub const MAXDIMS: usize = 6;

/// Size in bytes of every string buffer exchanged with the model
/// (names, type tags), including the terminating NUL.
pub const MAXSTRLEN: usize = 1024;

/// Longest string (in bytes, without terminator) that fits a `MAXSTRLEN` buffer.
pub const MAX_NAME_BYTES: usize = MAXSTRLEN - 1;

/// Step size that asks the model to advance by its own default step.
pub const DEFAULT_STEP: f64 = -1.0;

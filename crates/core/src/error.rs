//! Error types for the BMI binding
//!
//! Every failure the binding can report is a variant of [`BmiError`].
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Errors are never retried or swallowed: a failed native call is assumed to be
//! non-transient (bad config, missing symbol) and is surfaced once, with the
//! operation and variable name attached.

use crate::types::{ElementType, SessionState};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for binding operations
pub type Result<T> = std::result::Result<T, BmiError>;

/// Error types for the BMI binding
#[derive(Debug, Error)]
pub enum BmiError {
    /// No candidate path yielded a library file
    #[error("library '{library}' not found, looked in: {}", display_paths(.searched))]
    NotFound {
        /// Platform file name that was searched for
        library: String,
        /// Every path that was inspected, in search order
        searched: Vec<PathBuf>,
    },

    /// The dynamic loader rejected a library file
    #[error("failed to load library '{}': {reason}", .path.display())]
    LoadError {
        /// Path handed to the loader
        path: PathBuf,
        /// Loader diagnostic
        reason: String,
    },

    /// A required entry point is missing (the library does not implement BMI)
    #[error("entry point '{symbol}' not found in '{library}'")]
    SymbolNotFound {
        /// Symbol name
        symbol: String,
        /// Library the symbol was looked up in
        library: String,
    },

    /// Operation invoked out of lifecycle order
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the session was in
        state: SessionState,
    },

    /// `initialize` was called on an already initialized session
    #[error("model is already initialized")]
    AlreadyInitialized,

    /// A string does not fit the fixed native buffer
    #[error("string of {len} bytes exceeds the {max} byte native buffer")]
    StringTooLong {
        /// Length of the offending string in bytes
        len: usize,
        /// Maximum number of bytes the buffer can hold
        max: usize,
    },

    /// A string cannot be represented as a C string
    #[error("invalid native string: {0}")]
    InvalidString(String),

    /// The model reported a type tag outside the lookup table
    #[error("variable '{variable}' has unknown type tag '{tag}'")]
    UnknownType {
        /// Variable name
        variable: String,
        /// Tag as reported by the model
        tag: String,
    },

    /// An entry point returned a non-zero status
    #[error("native {operation} failed with status {status}")]
    NativeStatus {
        /// Entry point that failed
        operation: &'static str,
        /// Status code returned by the model
        status: i32,
    },

    /// The model reported a rank, shape or address the binding cannot view
    #[error("invalid descriptor for variable '{variable}': {reason}")]
    InvalidDescriptor {
        /// Variable name
        variable: String,
        /// What is wrong with it
        reason: String,
    },

    /// Caller data does not match the variable's shape
    #[error("shape mismatch for variable '{variable}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Variable name
        variable: String,
        /// Shape the variable (or slice) has
        expected: Vec<usize>,
        /// Shape the caller supplied
        actual: Vec<usize>,
    },

    /// Caller asked for a different element type than the model reports
    #[error("type mismatch for variable '{variable}': model has {actual}, requested {requested}")]
    TypeMismatch {
        /// Variable name
        variable: String,
        /// Element type requested by the caller
        requested: ElementType,
        /// Element type reported by the model
        actual: ElementType,
    },

    /// Settings file could not be parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (settings files, path canonicalisation)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<no candidates>".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl BmiError {
    /// Create an `InvalidState` error
    pub fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        BmiError::InvalidState { operation, state }
    }

    /// Create an `InvalidDescriptor` error
    pub fn invalid_descriptor(variable: impl Into<String>, reason: impl Into<String>) -> Self {
        BmiError::InvalidDescriptor {
            variable: variable.into(),
            reason: reason.into(),
        }
    }

    /// Map a native status code to `Ok(())` or `NativeStatus`
    pub fn check_status(operation: &'static str, status: i32) -> Result<()> {
        if status == 0 {
            Ok(())
        } else {
            Err(BmiError::NativeStatus { operation, status })
        }
    }

    /// Whether this error came from library discovery or loading
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            BmiError::NotFound { .. } | BmiError::LoadError { .. } | BmiError::SymbolNotFound { .. }
        )
    }

    /// Whether this error is a lifecycle-ordering violation
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            BmiError::InvalidState { .. } | BmiError::AlreadyInitialized
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found_lists_paths() {
        let err = BmiError::NotFound {
            library: "libdemo.so".to_string(),
            searched: vec![PathBuf::from("./libdemo.so"), PathBuf::from("/opt/demo/lib/libdemo.so")],
        };
        let msg = err.to_string();
        assert!(msg.contains("libdemo.so"));
        assert!(msg.contains("/opt/demo/lib/libdemo.so"));
    }

    #[test]
    fn test_error_display_not_found_without_candidates() {
        let err = BmiError::NotFound {
            library: "libdemo.so".to_string(),
            searched: vec![],
        };
        assert!(err.to_string().contains("<no candidates>"));
    }

    #[test]
    fn test_error_display_invalid_state() {
        let err = BmiError::invalid_state("update", SessionState::Loaded);
        let msg = err.to_string();
        assert!(msg.contains("update"));
        assert!(msg.contains("loaded"));
    }

    #[test]
    fn test_error_display_unknown_type() {
        let err = BmiError::UnknownType {
            variable: "h".to_string(),
            tag: "complex".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'h'"));
        assert!(msg.contains("complex"));
    }

    #[test]
    fn test_check_status() {
        assert!(BmiError::check_status("update", 0).is_ok());
        match BmiError::check_status("update", 3) {
            Err(BmiError::NativeStatus { operation, status }) => {
                assert_eq!(operation, "update");
                assert_eq!(status, 3);
            }
            other => panic!("Wrong result: {:?}", other),
        }
    }

    #[test]
    fn test_error_classification() {
        let err = BmiError::SymbolNotFound {
            symbol: "get_var".to_string(),
            library: "libdemo.so".to_string(),
        };
        assert!(err.is_load_failure());
        assert!(!err.is_lifecycle_error());
        assert!(BmiError::AlreadyInitialized.is_lifecycle_error());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: BmiError = io_err.into();
        assert!(matches!(err, BmiError::Io(_)));
    }
}

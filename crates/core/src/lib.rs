//! Core types for the BMI binding
//!
//! This crate defines the foundational, FFI-free pieces of the binding:
//! - BmiError: error taxonomy shared by every layer
//! - ElementType / VariableDescriptor: runtime-reported variable metadata
//! - SessionState: model session lifecycle
//! - Limits: fixed sizes of the native contract (MAXDIMS, MAXSTRLEN)
//! - C-string bridge: bounded native character buffers in both directions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cstr;
pub mod error;
pub mod limits;
pub mod types;

pub use cstr::{from_foreign, to_foreign, CName, Padding, StringBuffer};
pub use error::{BmiError, Result};
pub use limits::{DEFAULT_STEP, MAXDIMS, MAXSTRLEN, MAX_NAME_BYTES};
pub use types::{ElementType, SessionState, VariableDescriptor};

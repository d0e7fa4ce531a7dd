//! Core type definitions for the BMI binding
//!
//! This module defines the runtime-reported variable metadata:
//! - ElementType: the element type behind a model's type tag
//! - VariableDescriptor: the (type, rank, shape) triple of a named variable
//! - SessionState: lifecycle position of a model session

use crate::limits::MAXDIMS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a model variable.
///
/// Models report the type as a tag string; the mapping is a fixed table and
/// tags outside it are rejected by the descriptor resolver.
///
/// | Tag        | Rust element |
/// |------------|--------------|
/// | `"double"` | `f64`        |
/// | `"float"`  | `f32`        |
/// | `"int"`    | `i32`        |
/// | `"bool"`   | `CBool` (1 byte) |
/// | `"char"`   | `u8`         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// 64-bit float
    Double,
    /// 32-bit float
    Float,
    /// 32-bit signed integer
    Int,
    /// One-byte C boolean
    Bool,
    /// Single byte character
    Char,
}

impl ElementType {
    /// All element types (for iteration)
    pub const ALL: [ElementType; 5] = [
        ElementType::Double,
        ElementType::Float,
        ElementType::Int,
        ElementType::Bool,
        ElementType::Char,
    ];

    /// Type tag as exchanged with the native library
    pub const fn tag(&self) -> &'static str {
        match self {
            ElementType::Double => "double",
            ElementType::Float => "float",
            ElementType::Int => "int",
            ElementType::Bool => "bool",
            ElementType::Char => "char",
        }
    }

    /// Parse a native type tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "double" => Some(ElementType::Double),
            "float" => Some(ElementType::Float),
            "int" => Some(ElementType::Int),
            "bool" => Some(ElementType::Bool),
            "char" => Some(ElementType::Char),
            _ => None,
        }
    }

    /// Size of one element in native memory
    pub const fn size_in_bytes(&self) -> usize {
        match self {
            ElementType::Double => 8,
            ElementType::Float | ElementType::Int => 4,
            ElementType::Bool | ElementType::Char => 1,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Runtime-reported description of a model variable.
///
/// `shape` always holds `MAXDIMS` entries; only the first `rank` are
/// meaningful and the rest are zero. A descriptor is resolved fresh on every
/// access because a model may redefine shapes between timesteps.
///
/// A variable the model does not know comes back with no element type and an
/// all-zero shape; see [`VariableDescriptor::is_absent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    /// Variable name as passed to the model
    pub name: String,
    /// Element type, `None` when the model left the type tag empty
    pub element_type: Option<ElementType>,
    /// Number of dimensions (0 = scalar)
    pub rank: usize,
    /// Per-dimension extents, zero-padded to `MAXDIMS`
    pub shape: [usize; MAXDIMS],
}

impl VariableDescriptor {
    /// Create a descriptor from the leading dimensions.
    ///
    /// # Panics
    ///
    /// Panics if `dims` has more than `MAXDIMS` entries.
    pub fn new(name: impl Into<String>, element_type: Option<ElementType>, dims: &[usize]) -> Self {
        assert!(dims.len() <= MAXDIMS, "rank exceeds MAXDIMS");
        let mut shape = [0usize; MAXDIMS];
        shape[..dims.len()].copy_from_slice(dims);
        Self {
            name: name.into(),
            element_type,
            rank: dims.len(),
            shape,
        }
    }

    /// The meaningful leading extents, `shape[..rank]`
    pub fn dims(&self) -> &[usize] {
        &self.shape[..self.rank]
    }

    /// Whether the model reported nothing for this name
    pub fn is_absent(&self) -> bool {
        self.element_type.is_none() && self.shape.iter().all(|&d| d == 0)
    }

    /// Whether this is a rank-0 variable
    pub fn is_scalar(&self) -> bool {
        self.rank == 0
    }

    /// Total number of elements, `None` on overflow.
    ///
    /// A scalar has one element.
    pub fn element_count(&self) -> Option<usize> {
        self.dims()
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Size of the variable's storage in bytes, `None` if absent or on overflow
    pub fn size_in_bytes(&self) -> Option<usize> {
        let element_type = self.element_type?;
        self.element_count()?
            .checked_mul(element_type.size_in_bytes())
    }
}

/// Lifecycle state of a model session.
///
/// `Unloaded → Loaded → Initialized → Finalized`, with `unload` allowed from
/// any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No library handle is held
    Unloaded,
    /// Library loaded and entry points resolved
    Loaded,
    /// `initialize` succeeded; update and variable access are allowed
    Initialized,
    /// `finalize` was called; only `unload` remains
    Finalized,
}

impl SessionState {
    /// Lower-case name used in diagnostics
    pub const fn name(&self) -> &'static str {
        match self {
            SessionState::Unloaded => "unloaded",
            SessionState::Loaded => "loaded",
            SessionState::Initialized => "initialized",
            SessionState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

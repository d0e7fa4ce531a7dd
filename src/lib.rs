//! bmi-bridge - runtime binding for native Basic Model Interface libraries
//!
//! A BMI library is a shared object exposing a fixed set of C entry points:
//! lifecycle control (`initialize`/`update`/`finalize`), time queries, and
//! generic variable access by name. Which variables exist, and their type,
//! rank and shape, is only known once the library is loaded.
//!
//! # Quick Start
//!
//! ```ignore
//! use bmi_bridge::{LibrarySearch, ModelSession, ForeignArrayView};
//!
//! let mut session = ModelSession::load(&LibrarySearch::new("model1"))?;
//! session.initialize("model1.ini")?;
//! session.update(-1.0)?;
//!
//! if let Some(ForeignArrayView::Double(mut h)) = session.get_var("h")? {
//!     h[[0, 0]] = 1.5; // writes model memory directly
//! }
//! session.finalize()?;
//! ```
//!
//! # Architecture
//!
//! `bmi-core` holds the FFI-free pieces (errors, descriptors, C-string
//! bridge); `bmi-runtime` loads the library and owns every unsafe boundary.

pub use bmi_core::*;
pub use bmi_runtime::*;

//! Runtime layer of the BMI binding
//!
//! This crate handles everything that touches the native library:
//!
//! - Library search and dynamic loading (`search`, `dl`)
//! - Entry-point table resolved once per library (`api`)
//! - Descriptor resolution: (type, rank, shape) by variable name (`describe`)
//! - Zero-copy, column-major views over model memory (`view`)
//! - Model session state machine (`session`)
//! - Native log forwarding to `tracing` (`logger`)
//! - Settings file `bmi.toml` (`config`)
//! - Process-wide registry of loaded libraries (`registry`)
//!
//! # Quick Start
//!
//! ```ignore
//! use bmi_runtime::{LibrarySearch, ModelSession};
//!
//! let mut session = ModelSession::load(&LibrarySearch::new("heat"))?;
//! session.initialize("heat.ini")?;
//! while session.current_time()? < session.end_time()? {
//!     session.update_default()?;
//! }
//! let temperature = session.get_var_as::<f64>("temperature")?;
//! println!("{:?}", temperature.shape());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod describe;
pub mod dl;
pub mod logger;
pub mod registry;
pub mod search;
pub mod session;
pub mod view;

pub use api::{BmiApi, Logger};
pub use config::{BmiSettings, SETTINGS_FILE_NAME};
pub use describe::describe;
pub use dl::{DynLib, StaticSymbols, SymbolSource};
pub use logger::{forward_native_log, log_native, NativeLevel, NATIVE_TARGET};
pub use search::{default_search_dirs, platform_library_name, LibrarySearch, DEFAULT_SEARCH_DIRS};
pub use session::{ModelClock, ModelSession};
pub use view::{bind, CBool, ForeignArray, ForeignArrayView, ForeignElement};

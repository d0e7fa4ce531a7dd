//! Shared test utilities for the runtime integration suites.
//!
//! The demo model keeps process-wide state, so every test that drives it
//! holds [`DEMO_LOCK`] for its whole duration.

#![allow(dead_code)]

use std::path::PathBuf;

use parking_lot::{const_mutex, Mutex, MutexGuard};
use tempfile::TempDir;

#[allow(unused_imports)]
pub use bmi_core::{BmiError, ElementType, SessionState, VariableDescriptor};
#[allow(unused_imports)]
pub use bmi_runtime::{
    platform_library_name, CBool, ForeignArray, ForeignArrayView, LibrarySearch, ModelSession,
    StaticSymbols,
};

static DEMO_LOCK: Mutex<()> = const_mutex(());

/// Symbol table name used for in-process demo sessions.
pub const DEMO_ORIGIN: &str = "bmi-demo";

/// The demo's entry points as a symbol source.
pub fn demo_symbols() -> StaticSymbols {
    StaticSymbols::new(DEMO_ORIGIN, bmi_demo::entry_points())
}

// ============================================================================
// TestModel - demo session plus exclusive access to the demo's state
// ============================================================================

/// An in-process demo session, with the lock and a scratch directory.
pub struct TestModel {
    pub session: ModelSession,
    pub dir: TempDir,
    _guard: MutexGuard<'static, ()>,
}

impl TestModel {
    /// Loaded, not yet initialized.
    pub fn loaded() -> Self {
        Self::from_symbols(demo_symbols())
    }

    /// Loaded from a custom table (e.g. with optional symbols removed).
    pub fn from_symbols(symbols: StaticSymbols) -> Self {
        let guard = DEMO_LOCK.lock();
        let session = ModelSession::from_symbols(symbols).expect("demo entry points resolve");
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        TestModel {
            session,
            dir,
            _guard: guard,
        }
    }

    /// Initialized with the model's defaults (t = 0 .. 10, step 1).
    pub fn initialized() -> Self {
        let mut model = Self::loaded();
        model.session.initialize("").expect("demo initializes");
        model
    }

    /// Initialized, without the named optional entry point.
    pub fn initialized_without(symbol: &str) -> Self {
        let mut model = Self::from_symbols(demo_symbols().without(symbol));
        model.session.initialize("").expect("demo initializes");
        model
    }

    /// Write a demo configuration file into the scratch directory.
    pub fn write_config(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("Failed to write config");
        path
    }
}

impl Drop for TestModel {
    fn drop(&mut self) {
        // Leave the demo finalized for the next test, still under the lock.
        if self.session.state() == SessionState::Initialized {
            let _ = self.session.finalize();
        }
        let _ = self.session.unload();
    }
}

/// The demo cdylib next to the test executable, if it has been built.
pub fn built_demo_library() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let file = platform_library_name("bmi_demo");
    exe.ancestors()
        .skip(1)
        .take(3)
        .map(|dir| dir.join(&file))
        .find(|path| path.is_file())
}

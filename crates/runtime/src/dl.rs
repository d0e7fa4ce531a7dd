//! Shared library handles and symbol lookup.
//!
//! [`DynLib`] wraps a `libloading::Library` opened from a concrete path.
//! [`StaticSymbols`] serves the same lookups from a table of addresses that
//! are already linked into the process, which is how in-process models (and
//! the test suite) plug into the binding without touching the loader.

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};

use bmi_core::{BmiError, Result};
use libloading::Library;

/// Something entry points can be resolved from.
pub trait SymbolSource: Send {
    /// Human-readable origin (library path or table name), used in diagnostics
    /// and as the aliasing-registry key.
    fn origin(&self) -> &str;

    /// Resolve `name` to an address. `None` if the symbol is absent or the
    /// source has been closed.
    fn lookup(&self, name: &str) -> Option<*mut c_void>;

    /// Release the underlying handle. Idempotent.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Handle to a dynamically loaded shared library.
#[derive(Debug)]
pub struct DynLib {
    library: Option<Library>,
    path: PathBuf,
    origin: String,
}

impl DynLib {
    /// Open a shared library.
    ///
    /// `path` may be a full path or a bare file name; a bare name is resolved
    /// by the platform loader, which honours `LD_LIBRARY_PATH`,
    /// `DYLD_LIBRARY_PATH` or `PATH` natively.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // SAFETY: loading a library runs its initialisers. The native model is
        // trusted to be a well-formed BMI library; this is the contract the
        // caller opted into by naming it.
        let library = unsafe { Library::new(path) }.map_err(|e| BmiError::LoadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let origin = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();

        Ok(Self {
            library: Some(library),
            path: path.to_path_buf(),
            origin,
        })
    }

    /// Path the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the handle is still open.
    pub fn is_open(&self) -> bool {
        self.library.is_some()
    }
}

impl SymbolSource for DynLib {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn lookup(&self, name: &str) -> Option<*mut c_void> {
        let library = self.library.as_ref()?;
        let mut symbol = Vec::with_capacity(name.len() + 1);
        symbol.extend_from_slice(name.as_bytes());
        symbol.push(0);
        // SAFETY: the symbol is read as an opaque address only; callers cast
        // it to the correct signature and keep the library alive while using it.
        let ptr = unsafe { library.get::<*mut c_void>(&symbol) }
            .ok()
            .map(|sym| *sym)?;
        (!ptr.is_null()).then_some(ptr)
    }

    fn close(&mut self) -> Result<()> {
        match self.library.take() {
            Some(library) => library.close().map_err(|e| BmiError::LoadError {
                path: self.path.clone(),
                reason: format!("unload failed: {}", e),
            }),
            None => Ok(()),
        }
    }
}

/// Entry points resolved from addresses already present in the process.
pub struct StaticSymbols {
    origin: String,
    table: HashMap<String, usize>,
    open: bool,
}

impl StaticSymbols {
    /// Build a table from `(name, address)` pairs. Null addresses are skipped.
    pub fn new<I, S>(origin: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, *mut c_void)>,
        S: Into<String>,
    {
        let table = entries
            .into_iter()
            .filter(|(_, ptr)| !ptr.is_null())
            .map(|(name, ptr)| (name.into(), ptr as usize))
            .collect();
        Self {
            origin: origin.into(),
            table,
            open: true,
        }
    }

    /// Drop an entry, e.g. to exercise a model without an optional symbol.
    pub fn without(mut self, name: &str) -> Self {
        self.table.remove(name);
        self
    }
}

impl SymbolSource for StaticSymbols {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn lookup(&self, name: &str) -> Option<*mut c_void> {
        if !self.open {
            return None;
        }
        self.table.get(name).map(|&addr| addr as *mut c_void)
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn marker() -> i32 {
        7
    }

    #[test]
    fn test_open_missing_library_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libdoes_not_exist.so");
        match DynLib::open(&path) {
            Err(BmiError::LoadError { path: p, .. }) => assert_eq!(p, path),
            Err(other) => panic!("Wrong error: {:?}", other),
            Ok(_) => panic!("Loading a missing file must fail"),
        }
    }

    #[test]
    fn test_open_garbage_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libgarbage.so");
        std::fs::write(&path, b"definitely not an ELF, Mach-O or PE image").unwrap();
        assert!(matches!(DynLib::open(&path), Err(BmiError::LoadError { .. })));

        let err = DynLib::open(&path).unwrap_err();
        assert!(format!("{:?}", err).contains("libgarbage.so"));
    }

    #[test]
    fn test_static_symbols_lookup_and_close() {
        let mut symbols = StaticSymbols::new(
            "table",
            vec![
                ("marker", marker as *const () as *mut c_void),
                ("null", std::ptr::null_mut()),
            ],
        );
        assert_eq!(symbols.origin(), "table");
        assert_eq!(
            symbols.lookup("marker"),
            Some(marker as *const () as *mut c_void)
        );
        assert_eq!(symbols.lookup("null"), None);
        assert_eq!(symbols.lookup("missing"), None);

        symbols.close().unwrap();
        symbols.close().unwrap();
        assert_eq!(symbols.lookup("marker"), None);
    }

    #[test]
    fn test_static_symbols_without() {
        let symbols = StaticSymbols::new(
            "table",
            vec![("marker", marker as *const () as *mut c_void)],
        )
        .without("marker");
        assert_eq!(symbols.lookup("marker"), None);
    }
}

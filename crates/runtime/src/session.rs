//! Model session: one loaded library driven through its lifecycle.
//!
//! ```text
//! load ──► Loaded ──initialize──► Initialized ──finalize──► Finalized
//!                                   │    ▲
//!                                   └────┘ update
//! unload: any state ──► Unloaded
//! ```
//!
//! Variable access is only valid while `Initialized`. Every access resolves
//! the descriptor and the storage address afresh, since a model may
//! reallocate between steps. Views borrow the session mutably, so the borrow
//! checker rules out a view that survives `update`, `finalize` or `unload`.
//!
//! A session is `Send` but not `Sync`: it may move between threads, but
//! concurrent calls need external locking. Two sessions on the same library
//! file share whatever process-wide state the model keeps (see
//! [`registry`](crate::registry)).

use std::fmt;
use std::os::raw::c_int;
use std::path::Path;

use bmi_core::{BmiError, CName, Result, SessionState, VariableDescriptor, DEFAULT_STEP};
use ndarray::{ArrayViewD, ArrayViewMutD, Slice};
use tracing::{debug, info, warn};

use crate::api::BmiApi;
use crate::config::BmiSettings;
use crate::describe::describe;
use crate::dl::{DynLib, SymbolSource};
use crate::logger::forward_native_log;
use crate::registry::{self, Registration};
use crate::search::LibrarySearch;
use crate::view::{self, ForeignArray, ForeignArrayView, ForeignElement};

/// Model clock as of the last lifecycle call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModelClock {
    /// Start of the simulation period
    pub start: f64,
    /// End of the simulation period
    pub end: f64,
    /// Current model time
    pub current: f64,
}

/// A loaded model and its lifecycle state.
pub struct ModelSession {
    api: Option<BmiApi>,
    state: SessionState,
    origin: String,
    clock: ModelClock,
    forward_native_logs: bool,
    logger_installed: bool,
    _registration: Option<Registration>,
}

impl ModelSession {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Locate, load and resolve a model library.
    pub fn load(search: &LibrarySearch) -> Result<Self> {
        Self::from_library(search.open()?)
    }

    /// Load `engine` using the search directories and options in `settings`.
    pub fn load_with_settings(engine: &str, settings: &BmiSettings) -> Result<Self> {
        let mut session = Self::load(&LibrarySearch::from_settings(engine, settings))?;
        session.forward_native_logs = settings.forward_native_logs;
        Ok(session)
    }

    /// Resolve entry points from an already opened library.
    pub fn from_library(library: DynLib) -> Result<Self> {
        Self::from_source(Box::new(library))
    }

    /// Resolve entry points from any symbol source.
    pub fn from_symbols(source: impl SymbolSource + 'static) -> Result<Self> {
        Self::from_source(Box::new(source))
    }

    fn from_source(source: Box<dyn SymbolSource>) -> Result<Self> {
        let api = BmiApi::load(source)?;
        let origin = api.origin().to_string();
        let registration = registry::register(&origin);
        info!(library = %origin, "Model library loaded");
        Ok(Self {
            api: Some(api),
            state: SessionState::Loaded,
            origin,
            clock: ModelClock::default(),
            forward_native_logs: true,
            logger_installed: false,
            _registration: Some(registration),
        })
    }

    /// Enable or disable forwarding of native log messages (applied at initialize).
    pub fn set_forward_native_logs(&mut self, enabled: bool) {
        self.forward_native_logs = enabled;
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Library path or symbol-table name the session was loaded from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Clock cached by the last `initialize` or `update`.
    pub fn clock(&self) -> ModelClock {
        self.clock
    }

    /// Whether the model exports `set_var`.
    pub fn supports_set_var(&self) -> bool {
        self.api.as_ref().map_or(false, BmiApi::supports_set_var)
    }

    /// Whether the model exports `set_var_slice`.
    pub fn supports_set_var_slice(&self) -> bool {
        self.api.as_ref().map_or(false, BmiApi::supports_set_var_slice)
    }

    fn api_in(&self, operation: &'static str, state: SessionState) -> Result<&BmiApi> {
        match &self.api {
            Some(api) if self.state == state => Ok(api),
            _ => Err(BmiError::invalid_state(operation, self.state)),
        }
    }

    fn initialized_api(&self, operation: &'static str) -> Result<&BmiApi> {
        self.api_in(operation, SessionState::Initialized)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize the model from its configuration file.
    ///
    /// The path is handed to the model verbatim. Fails with
    /// `AlreadyInitialized` on a second call and `NativeStatus` if the model
    /// rejects the file; in the latter case the session stays `Loaded`.
    pub fn initialize(&mut self, config_file: impl AsRef<Path>) -> Result<()> {
        if self.state == SessionState::Initialized {
            return Err(BmiError::AlreadyInitialized);
        }
        let api = self.api_in("initialize", SessionState::Loaded)?;

        let config_file = config_file.as_ref();
        let path = config_file.to_str().ok_or_else(|| {
            BmiError::InvalidString(format!(
                "config path {} is not valid UTF-8",
                config_file.display()
            ))
        })?;
        let c_path = CName::new(path)?;

        let install_logger =
            self.forward_native_logs && !self.logger_installed && api.supports_logger();
        if install_logger {
            api.set_logger(Some(forward_native_log))?;
            debug!(library = %self.origin, "Forwarding native log messages");
        }

        let outcome = api.initialize(&c_path).map(|()| ModelClock {
            start: api.start_time(),
            end: api.end_time(),
            current: api.current_time(),
        });
        self.logger_installed |= install_logger;
        self.clock = outcome?;
        self.state = SessionState::Initialized;
        info!(
            library = %self.origin,
            config = path,
            start = self.clock.start,
            end = self.clock.end,
            "Model initialized"
        );
        Ok(())
    }

    /// Advance the model by `dt`; `-1.0` asks for the model's default step.
    pub fn update(&mut self, dt: f64) -> Result<()> {
        let api = self.initialized_api("update")?;
        api.update(dt)?;
        self.clock.current = api.current_time();
        debug!(dt, current = self.clock.current, "Model updated");
        Ok(())
    }

    /// Advance the model by its own default step.
    pub fn update_default(&mut self) -> Result<()> {
        self.update(DEFAULT_STEP)
    }

    /// Finalize the model.
    ///
    /// The session moves to `Finalized` even when the model reports a
    /// failure, so finalize is never called twice on the same model.
    pub fn finalize(&mut self) -> Result<()> {
        let api = self.initialized_api("finalize")?;
        let result = api.finalize();
        self.state = SessionState::Finalized;
        match &result {
            Ok(()) => info!(library = %self.origin, "Model finalized"),
            Err(e) => warn!(library = %self.origin, error = %e, "Model finalize reported failure"),
        }
        result
    }

    /// Release the library. Idempotent; valid from any state.
    ///
    /// Unloading an initialized session does not finalize the model.
    pub fn unload(&mut self) -> Result<()> {
        let Some(api) = self.api.take() else {
            self.state = SessionState::Unloaded;
            return Ok(());
        };
        if self.logger_installed {
            if let Err(e) = api.set_logger(None) {
                warn!(library = %self.origin, error = %e, "Could not clear native logger");
            }
            self.logger_installed = false;
        }
        self.state = SessionState::Unloaded;
        self._registration = None;
        let result = api.close();
        info!(library = %self.origin, "Model library unloaded");
        result
    }

    // ========================================================================
    // Time
    // ========================================================================

    /// Start of the simulation period.
    pub fn start_time(&mut self) -> Result<f64> {
        let t = self.initialized_api("get_start_time")?.start_time();
        self.clock.start = t;
        Ok(t)
    }

    /// End of the simulation period.
    pub fn end_time(&mut self) -> Result<f64> {
        let t = self.initialized_api("get_end_time")?.end_time();
        self.clock.end = t;
        Ok(t)
    }

    /// Current model time.
    pub fn current_time(&mut self) -> Result<f64> {
        let t = self.initialized_api("get_current_time")?.current_time();
        self.clock.current = t;
        Ok(t)
    }

    /// The model's default step, `None` if it does not export `get_time_step`.
    pub fn time_step(&self) -> Result<Option<f64>> {
        Ok(self.initialized_api("get_time_step")?.time_step())
    }

    // ========================================================================
    // Variables
    // ========================================================================

    /// Resolve type, rank and shape of `name`.
    ///
    /// A name the model does not know resolves to an absent descriptor
    /// rather than an error.
    pub fn describe(&self, name: &str) -> Result<VariableDescriptor> {
        describe(self.initialized_api("describe")?, name)
    }

    /// Zero-copy view of `name`, or `None` if the variable is absent.
    ///
    /// Writes through the view land directly in model memory.
    pub fn get_var(&mut self, name: &str) -> Result<Option<ForeignArrayView<'_>>> {
        let api = self.initialized_api("get_var")?;
        let descriptor = describe(api, name)?;
        let ptr = api.var_ptr(&CName::new(name)?);
        // SAFETY: the model owns `ptr` and keeps it valid until the next
        // update/finalize; the view borrows `self` mutably, so neither can
        // happen while it lives, and no other view of the session can exist.
        unsafe { view::bind(ptr, &descriptor) }
    }

    /// Zero-copy view of `name` as element type `T`.
    ///
    /// Fails with `TypeMismatch` if the model reports another type and with
    /// `InvalidDescriptor` if the variable is absent.
    pub fn get_var_as<T: ForeignElement>(&mut self, name: &str) -> Result<ArrayViewMutD<'_, T>> {
        match self.get_var(name)? {
            Some(view) => view.into_typed::<T>().map_err(|view| BmiError::TypeMismatch {
                variable: name.to_string(),
                requested: T::ELEMENT_TYPE,
                actual: view.element_type(),
            }),
            None => Err(BmiError::invalid_descriptor(
                name,
                "variable is absent or has no storage",
            )),
        }
    }

    /// Owned copy of `name`, or `None` if the variable is absent.
    pub fn get_var_copy(&mut self, name: &str) -> Result<Option<ForeignArray>> {
        Ok(self.get_var(name)?.map(|view| view.to_owned()))
    }

    /// Replace the whole of `name` with `data`.
    ///
    /// `data` is indexed like the model's variable, whatever its memory
    /// layout. Uses the model's `set_var` when exported (with a column-major
    /// copy), otherwise writes through the view.
    pub fn set_var<T: ForeignElement>(&mut self, name: &str, data: ArrayViewD<'_, T>) -> Result<()> {
        let api = self.initialized_api("set_var")?;
        let descriptor = describe(api, name)?;
        view::check_assignable(&descriptor, &data)?;

        if api.supports_set_var() {
            let buffer = view::to_column_major(&data);
            let c_name = CName::new(name)?;
            // SAFETY: type and full shape were checked against the model's
            // descriptor; `buffer` is contiguous column-major.
            unsafe { api.set_var(&c_name, buffer.as_ptr().cast())? };
            debug!(variable = name, "Variable set through model");
        } else {
            self.get_var_as::<T>(name)?.assign(&data);
            debug!(variable = name, "Variable set through view");
        }
        Ok(())
    }

    /// Replace the block of `name` starting at `start` with `data`.
    ///
    /// The block's extents are `data.shape()`; it must lie within the
    /// variable. Uses the model's `set_var_slice` when exported.
    pub fn set_var_slice<T: ForeignElement>(
        &mut self,
        name: &str,
        start: &[usize],
        data: ArrayViewD<'_, T>,
    ) -> Result<()> {
        let api = self.initialized_api("set_var_slice")?;
        let descriptor = describe(api, name)?;
        view::check_element_type::<T>(&descriptor)?;

        let dims = descriptor.dims();
        let count = data.shape();
        let in_bounds = start.len() == dims.len()
            && count.len() == dims.len()
            && start
                .iter()
                .zip(count)
                .zip(dims)
                .all(|((&s, &c), &d)| s.checked_add(c).map_or(false, |end| end <= d));
        if !in_bounds {
            return Err(BmiError::ShapeMismatch {
                variable: name.to_string(),
                expected: dims.to_vec(),
                actual: start.iter().zip(count).map(|(s, c)| s.saturating_add(*c)).collect(),
            });
        }

        if api.supports_set_var_slice() {
            let to_c = |values: &[usize]| -> Result<Vec<c_int>> {
                values
                    .iter()
                    .map(|&v| {
                        c_int::try_from(v).map_err(|_| {
                            BmiError::invalid_descriptor(name, format!("index {} exceeds int range", v))
                        })
                    })
                    .collect()
            };
            let c_start = to_c(start)?;
            let c_count = to_c(count)?;
            let buffer = view::to_column_major(&data);
            let c_name = CName::new(name)?;
            // SAFETY: start/count have one entry per dimension and were
            // bounds-checked; `buffer` holds product(count) elements of the
            // variable's type in column-major order.
            unsafe { api.set_var_slice(&c_name, &c_start, &c_count, buffer.as_ptr().cast())? };
            debug!(variable = name, ?start, ?count, "Slice set through model");
        } else {
            let mut target = self.get_var_as::<T>(name)?;
            target
                .slice_each_axis_mut(|axis| {
                    let i = axis.axis.index();
                    Slice::from(start[i]..start[i] + count[i])
                })
                .assign(&data);
            debug!(variable = name, ?start, ?count, "Slice set through view");
        }
        Ok(())
    }

    /// Names of all variables the model exposes.
    ///
    /// Fails with `SymbolNotFound` if the model does not export
    /// `get_var_count` and `get_var_name`.
    pub fn variable_names(&self) -> Result<Vec<String>> {
        let api = self.initialized_api("variable_names")?;
        let count = api.var_count()?;
        (0..count).map(|index| api.var_name(index)).collect()
    }
}

impl fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSession")
            .field("origin", &self.origin)
            .field("state", &self.state)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Drop for ModelSession {
    fn drop(&mut self) {
        if self.state == SessionState::Initialized {
            warn!(library = %self.origin, "Session dropped while initialized; finalizing model");
            let _ = self.finalize();
        }
        if let Err(e) = self.unload() {
            warn!(library = %self.origin, error = %e, "Unloading model library failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dl::StaticSymbols;

    // Lifecycle transitions that never reach the model's entry points, so
    // they do not race with the integration tests over the demo's state.

    fn session() -> ModelSession {
        ModelSession::from_symbols(StaticSymbols::new("session-unit", bmi_demo::entry_points()))
            .unwrap()
    }

    #[test]
    fn test_new_session_is_loaded() {
        let s = session();
        assert_eq!(s.state(), SessionState::Loaded);
        assert_eq!(s.origin(), "session-unit");
        assert_eq!(s.clock(), ModelClock::default());
        assert!(s.supports_set_var());
    }

    #[test]
    fn test_operations_before_initialize() {
        let mut s = session();
        assert!(matches!(
            s.update(1.0),
            Err(BmiError::InvalidState { operation: "update", state: SessionState::Loaded })
        ));
        assert!(matches!(s.finalize(), Err(BmiError::InvalidState { .. })));
        assert!(matches!(s.get_var("var1"), Err(BmiError::InvalidState { .. })));
        assert!(matches!(s.describe("var1"), Err(BmiError::InvalidState { .. })));
        assert!(matches!(s.current_time(), Err(BmiError::InvalidState { .. })));
    }

    #[test]
    fn test_unload_is_idempotent() {
        let mut s = session();
        s.unload().unwrap();
        assert_eq!(s.state(), SessionState::Unloaded);
        s.unload().unwrap();
        assert!(!s.supports_set_var());
        assert!(matches!(
            s.initialize(""),
            Err(BmiError::InvalidState { state: SessionState::Unloaded, .. })
        ));
    }

    #[test]
    fn test_missing_required_symbol_fails_load() {
        let source = StaticSymbols::new("broken", bmi_demo::entry_points()).without("update");
        assert!(matches!(
            ModelSession::from_symbols(source),
            Err(BmiError::SymbolNotFound { .. })
        ));
        assert_eq!(registry::live_sessions("broken"), 0);
    }

    #[test]
    fn test_registration_follows_session() {
        let key = "session-unit-registry";
        let mut s = ModelSession::from_symbols(StaticSymbols::new(key, bmi_demo::entry_points()))
            .unwrap();
        assert_eq!(registry::live_sessions(key), 1);
        s.unload().unwrap();
        assert_eq!(registry::live_sessions(key), 0);
    }
}

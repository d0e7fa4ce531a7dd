//! BMI entry points resolved from a loaded library.
//!
//! All function pointers are resolved once, when the [`BmiApi`] is built, and
//! live exactly as long as the symbol source that produced them: the source
//! is owned by the `BmiApi` and closed only when the `BmiApi` is consumed.
//!
//! Native signatures:
//!
//! ```c
//! int  initialize(const char* config_file);
//! int  update(double dt);
//! int  finalize(void);
//! void get_start_time(double* t);
//! void get_end_time(double* t);
//! void get_current_time(double* t);
//! void get_var_type(const char* name, char* type);
//! void get_var_rank(const char* name, int* rank);
//! void get_var_shape(const char* name, int shape[MAXDIMS]);
//! void get_var(const char* name, void** ptr);
//!
//! /* optional */
//! void get_time_step(double* dt);
//! void get_var_count(int* count);
//! void get_var_name(int index, char* name);
//! void set_var(const char* name, const void* ptr);
//! void set_var_slice(const char* name, const int* start, const int* count, const void* ptr);
//! void set_logger(void (*logger)(int level, const char* msg));
//! ```

use std::ffi::c_void;
use std::os::raw::{c_char, c_double, c_int};

use bmi_core::{BmiError, CName, Result, StringBuffer, MAXDIMS};

use crate::dl::SymbolSource;

/// Callback a model calls with `(level, message)`.
pub type Logger = unsafe extern "C" fn(level: c_int, msg: *const c_char);

// ---------------------------------------------------------------------------
// Function pointer types
// ---------------------------------------------------------------------------

type FnInitialize = unsafe extern "C" fn(config_file: *const c_char) -> c_int;
type FnUpdate = unsafe extern "C" fn(dt: c_double) -> c_int;
type FnFinalize = unsafe extern "C" fn() -> c_int;
type FnGetTime = unsafe extern "C" fn(t: *mut c_double);
type FnGetVarType = unsafe extern "C" fn(name: *const c_char, ty: *mut c_char);
type FnGetVarRank = unsafe extern "C" fn(name: *const c_char, rank: *mut c_int);
type FnGetVarShape = unsafe extern "C" fn(name: *const c_char, shape: *mut c_int);
type FnGetVar = unsafe extern "C" fn(name: *const c_char, ptr: *mut *mut c_void);
type FnGetVarCount = unsafe extern "C" fn(count: *mut c_int);
type FnGetVarName = unsafe extern "C" fn(index: c_int, name: *mut c_char);
type FnSetVar = unsafe extern "C" fn(name: *const c_char, ptr: *const c_void);
type FnSetVarSlice = unsafe extern "C" fn(
    name: *const c_char,
    start: *const c_int,
    count: *const c_int,
    ptr: *const c_void,
);
type FnSetLogger = unsafe extern "C" fn(logger: Option<Logger>);

/// Resolve a required symbol and transmute it to the expected fn pointer.
macro_rules! load_sym {
    ($source:expr, $name:expr) => {{
        let ptr = $source
            .lookup($name)
            .ok_or_else(|| BmiError::SymbolNotFound {
                symbol: $name.to_string(),
                library: $source.origin().to_string(),
            })?;
        unsafe { std::mem::transmute::<*mut c_void, _>(ptr) }
    }};
}

/// Resolve an optional symbol.
macro_rules! load_opt_sym {
    ($source:expr, $name:expr) => {{
        $source
            .lookup($name)
            .map(|ptr| unsafe { std::mem::transmute::<*mut c_void, _>(ptr) })
    }};
}

/// Resolved BMI entry points plus the source that keeps them valid.
pub struct BmiApi {
    source: Box<dyn SymbolSource>,

    initialize: FnInitialize,
    update: FnUpdate,
    finalize: FnFinalize,
    get_start_time: FnGetTime,
    get_end_time: FnGetTime,
    get_current_time: FnGetTime,
    get_var_type: FnGetVarType,
    get_var_rank: FnGetVarRank,
    get_var_shape: FnGetVarShape,
    get_var: FnGetVar,

    get_time_step: Option<FnGetTime>,
    get_var_count: Option<FnGetVarCount>,
    get_var_name: Option<FnGetVarName>,
    set_var: Option<FnSetVar>,
    set_var_slice: Option<FnSetVarSlice>,
    set_logger: Option<FnSetLogger>,
}

impl BmiApi {
    /// Resolve every required entry point from `source`.
    ///
    /// Fails with `SymbolNotFound` naming the first missing required symbol;
    /// optional symbols are simply recorded as absent.
    pub fn load(source: Box<dyn SymbolSource>) -> Result<Self> {
        let initialize: FnInitialize = load_sym!(source, "initialize");
        let update: FnUpdate = load_sym!(source, "update");
        let finalize: FnFinalize = load_sym!(source, "finalize");
        let get_start_time: FnGetTime = load_sym!(source, "get_start_time");
        let get_end_time: FnGetTime = load_sym!(source, "get_end_time");
        let get_current_time: FnGetTime = load_sym!(source, "get_current_time");
        let get_var_type: FnGetVarType = load_sym!(source, "get_var_type");
        let get_var_rank: FnGetVarRank = load_sym!(source, "get_var_rank");
        let get_var_shape: FnGetVarShape = load_sym!(source, "get_var_shape");
        let get_var: FnGetVar = load_sym!(source, "get_var");

        let get_time_step: Option<FnGetTime> = load_opt_sym!(source, "get_time_step");
        let get_var_count: Option<FnGetVarCount> = load_opt_sym!(source, "get_var_count");
        let get_var_name: Option<FnGetVarName> = load_opt_sym!(source, "get_var_name");
        let set_var: Option<FnSetVar> = load_opt_sym!(source, "set_var");
        let set_var_slice: Option<FnSetVarSlice> = load_opt_sym!(source, "set_var_slice");
        let set_logger: Option<FnSetLogger> = load_opt_sym!(source, "set_logger");

        Ok(Self {
            source,
            initialize,
            update,
            finalize,
            get_start_time,
            get_end_time,
            get_current_time,
            get_var_type,
            get_var_rank,
            get_var_shape,
            get_var,
            get_time_step,
            get_var_count,
            get_var_name,
            set_var,
            set_var_slice,
            set_logger,
        })
    }

    /// Where the entry points came from.
    pub fn origin(&self) -> &str {
        self.source.origin()
    }

    /// Close the symbol source. Every entry point dies with `self`.
    pub fn close(mut self) -> Result<()> {
        self.source.close()
    }

    fn missing(&self, symbol: &str) -> BmiError {
        BmiError::SymbolNotFound {
            symbol: symbol.to_string(),
            library: self.origin().to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Call `initialize(config_file)`.
    pub fn initialize(&self, config_file: &CName) -> Result<()> {
        let rc = unsafe { (self.initialize)(config_file.as_ptr()) };
        BmiError::check_status("initialize", rc)
    }

    /// Call `update(dt)`.
    pub fn update(&self, dt: f64) -> Result<()> {
        let rc = unsafe { (self.update)(dt) };
        BmiError::check_status("update", rc)
    }

    /// Call `finalize()`.
    pub fn finalize(&self) -> Result<()> {
        let rc = unsafe { (self.finalize)() };
        BmiError::check_status("finalize", rc)
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    fn read_time(f: FnGetTime) -> f64 {
        let mut t: c_double = 0.0;
        unsafe { f(&mut t) };
        t
    }

    /// Model start time.
    pub fn start_time(&self) -> f64 {
        Self::read_time(self.get_start_time)
    }

    /// Model end time.
    pub fn end_time(&self) -> f64 {
        Self::read_time(self.get_end_time)
    }

    /// Model current time.
    pub fn current_time(&self) -> f64 {
        Self::read_time(self.get_current_time)
    }

    /// Model default step, if the model exports `get_time_step`.
    pub fn time_step(&self) -> Option<f64> {
        self.get_time_step.map(Self::read_time)
    }

    // -----------------------------------------------------------------------
    // Variable information
    // -----------------------------------------------------------------------

    /// Raw type tag; empty if the model did not write one.
    pub fn var_type(&self, name: &CName) -> String {
        let mut out = StringBuffer::new();
        unsafe { (self.get_var_type)(name.as_ptr(), out.as_mut_ptr()) };
        out.into_string()
    }

    /// Raw rank; zero if the model did not write one.
    pub fn var_rank(&self, name: &CName) -> i32 {
        let mut rank: c_int = 0;
        unsafe { (self.get_var_rank)(name.as_ptr(), &mut rank) };
        rank
    }

    /// Raw shape buffer; entries the model did not write stay zero.
    pub fn var_shape(&self, name: &CName) -> [i32; MAXDIMS] {
        let mut shape: [c_int; MAXDIMS] = [0; MAXDIMS];
        unsafe { (self.get_var_shape)(name.as_ptr(), shape.as_mut_ptr()) };
        shape
    }

    /// Address of the variable's storage; null if the model has none.
    pub fn var_ptr(&self, name: &CName) -> *mut c_void {
        let mut ptr: *mut c_void = std::ptr::null_mut();
        unsafe { (self.get_var)(name.as_ptr(), &mut ptr) };
        ptr
    }

    /// Number of variables the model exposes.
    pub fn var_count(&self) -> Result<usize> {
        let f = self.get_var_count.ok_or_else(|| self.missing("get_var_count"))?;
        let mut count: c_int = 0;
        unsafe { f(&mut count) };
        usize::try_from(count).map_err(|_| {
            BmiError::invalid_descriptor("get_var_count", format!("negative variable count {}", count))
        })
    }

    /// Name of the variable at `index` (zero-based).
    pub fn var_name(&self, index: usize) -> Result<String> {
        let f = self.get_var_name.ok_or_else(|| self.missing("get_var_name"))?;
        let index = c_int::try_from(index)
            .map_err(|_| BmiError::invalid_descriptor(index.to_string(), "index exceeds int range"))?;
        let mut out = StringBuffer::new();
        unsafe { f(index, out.as_mut_ptr()) };
        Ok(out.into_string())
    }

    // -----------------------------------------------------------------------
    // Optional setters
    // -----------------------------------------------------------------------

    /// Whether the model exports `set_var`.
    pub fn supports_set_var(&self) -> bool {
        self.set_var.is_some()
    }

    /// Whether the model exports `set_var_slice`.
    pub fn supports_set_var_slice(&self) -> bool {
        self.set_var_slice.is_some()
    }

    /// Whether the model exports `set_logger`.
    pub fn supports_logger(&self) -> bool {
        self.set_logger.is_some()
    }

    /// Call `set_var(name, data)`.
    ///
    /// # Safety
    ///
    /// `data` must point to a column-major buffer of the variable's full
    /// element count and element type.
    pub unsafe fn set_var(&self, name: &CName, data: *const c_void) -> Result<()> {
        let f = self.set_var.ok_or_else(|| self.missing("set_var"))?;
        f(name.as_ptr(), data);
        Ok(())
    }

    /// Call `set_var_slice(name, start, count, data)`.
    ///
    /// # Safety
    ///
    /// `start` and `count` must have one entry per dimension of the variable
    /// and describe an in-bounds block; `data` must point to a column-major
    /// buffer of `product(count)` elements of the variable's element type.
    pub unsafe fn set_var_slice(
        &self,
        name: &CName,
        start: &[c_int],
        count: &[c_int],
        data: *const c_void,
    ) -> Result<()> {
        let f = self.set_var_slice.ok_or_else(|| self.missing("set_var_slice"))?;
        f(name.as_ptr(), start.as_ptr(), count.as_ptr(), data);
        Ok(())
    }

    /// Register (or with `None`, clear) the model's log callback.
    pub fn set_logger(&self, logger: Option<Logger>) -> Result<()> {
        let f = self.set_logger.ok_or_else(|| self.missing("set_logger"))?;
        unsafe { f(logger) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dl::StaticSymbols;

    unsafe extern "C" fn status_ok() -> c_int {
        0
    }

    unsafe extern "C" fn negative_count(count: *mut c_int) {
        *count = -3;
    }

    fn demo_source() -> StaticSymbols {
        StaticSymbols::new("bmi-demo", bmi_demo::entry_points())
    }

    #[test]
    fn test_load_resolves_optional_symbols() {
        let api = BmiApi::load(Box::new(demo_source())).unwrap();
        assert_eq!(api.origin(), "bmi-demo");
        assert!(api.supports_set_var());
        assert!(api.supports_set_var_slice());
        assert!(api.supports_logger());
        api.close().unwrap();
    }

    #[test]
    fn test_missing_required_symbol() {
        let source = demo_source().without("get_var_shape");
        match BmiApi::load(Box::new(source)) {
            Err(BmiError::SymbolNotFound { symbol, library }) => {
                assert_eq!(symbol, "get_var_shape");
                assert_eq!(library, "bmi-demo");
            }
            Err(other) => panic!("Wrong error: {:?}", other),
            Ok(_) => panic!("A library without get_var_shape is not BMI"),
        }
    }

    #[test]
    fn test_missing_optional_symbol() {
        let api = BmiApi::load(Box::new(demo_source().without("set_var"))).unwrap();
        assert!(!api.supports_set_var());
        let name = CName::new("var1").unwrap();
        let err = unsafe { api.set_var(&name, std::ptr::null()) }.unwrap_err();
        assert!(matches!(err, BmiError::SymbolNotFound { ref symbol, .. } if symbol == "set_var"));
    }

    #[test]
    fn test_only_required_symbols() {
        let names = [
            "initialize",
            "update",
            "finalize",
            "get_start_time",
            "get_end_time",
            "get_current_time",
            "get_var_type",
            "get_var_rank",
            "get_var_shape",
            "get_var",
        ];
        let full = bmi_demo::entry_points();
        let required = full
            .into_iter()
            .filter(|(name, _)| names.contains(name));
        let api = BmiApi::load(Box::new(StaticSymbols::new("minimal", required))).unwrap();
        assert_eq!(api.time_step(), None);
        assert!(api.var_count().is_err());
        assert!(api.set_logger(None).is_err());
    }

    #[test]
    fn test_status_passthrough() {
        let ok = status_ok as unsafe extern "C" fn() -> c_int;
        let full = bmi_demo::entry_points()
            .into_iter()
            .map(|(name, ptr)| {
                if name == "finalize" {
                    (name, ok as *const () as *mut c_void)
                } else {
                    (name, ptr)
                }
            });
        let api = BmiApi::load(Box::new(StaticSymbols::new("patched", full))).unwrap();
        assert!(api.finalize().is_ok());
    }

    #[test]
    fn test_negative_var_count_is_invalid_descriptor() {
        let bad = negative_count as unsafe extern "C" fn(*mut c_int);
        let full = bmi_demo::entry_points().into_iter().map(|(name, ptr)| {
            if name == "get_var_count" {
                (name, bad as *const () as *mut c_void)
            } else {
                (name, ptr)
            }
        });
        let api = BmiApi::load(Box::new(StaticSymbols::new("negative", full))).unwrap();
        match api.var_count() {
            Err(BmiError::InvalidDescriptor { variable, reason }) => {
                assert_eq!(variable, "get_var_count");
                assert!(reason.contains("-3"));
            }
            other => panic!("Wrong result: {:?}", other),
        }
    }
}

//! Reference model implementing the native BMI contract.
//!
//! Built both as a `cdylib` (`libbmi_demo.so` and friends) for dynamic
//! loading and as an `rlib` whose [`entry_points`] table lets the binding
//! drive the same functions in-process.
//!
//! Like most native models, all state is process-wide: one model per process.
//!
//! | Name   | Tag      | Shape | Initial value (column-major storage)      |
//! |--------|----------|-------|-------------------------------------------|
//! | `var1` | `double` | `[]`  | current time, refreshed on every update   |
//! | `var2` | `int`    | `[2]` | `[1, 2]`                                  |
//! | `var3` | `bool`   | `[2, 3]` | `[1, 0, 0, 1, 1, 0]`                   |
//! | `var4` | `double` | `[2, 3]` | `v(i, j) = 10 i + j`: `[0, 10, 1, 11, 2, 12]` |
//! | `var5` | `float`  | `[3]` | `[0.5, 1.5, 2.5]`                         |
//! | `var6` | `char`   | `[4]` | `b"demo"`                                 |
//!
//! Time runs from 0 to 10 with a default step of 1. The configuration file is
//! optional; when given it may set `start_time`, `end_time` and `time_step`
//! as `key = value` lines.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_double, c_int};
use std::ptr;

use parking_lot::{const_mutex, Mutex};

const MAXDIMS: usize = 6;

/// Log callback type accepted by `set_logger`.
pub type Logger = unsafe extern "C" fn(level: c_int, msg: *const c_char);

const LOG_DEBUG: c_int = 1;
const LOG_INFO: c_int = 2;
const LOG_ERROR: c_int = 4;

/// Status codes returned by the lifecycle functions.
pub mod status {
    /// Success
    pub const OK: i32 = 0;
    /// Called in the wrong lifecycle state
    pub const NOT_INITIALIZED: i32 = 1;
    /// Configuration file could not be read
    pub const CONFIG_UNREADABLE: i32 = 2;
    /// Configuration file has an invalid line
    pub const CONFIG_INVALID: i32 = 3;
}

struct VarSpec {
    name: &'static str,
    tag: &'static str,
    dims: &'static [usize],
    element_size: usize,
}

static VARIABLES: [VarSpec; 6] = [
    VarSpec { name: "var1", tag: "double", dims: &[], element_size: 8 },
    VarSpec { name: "var2", tag: "int", dims: &[2], element_size: 4 },
    VarSpec { name: "var3", tag: "bool", dims: &[2, 3], element_size: 1 },
    VarSpec { name: "var4", tag: "double", dims: &[2, 3], element_size: 8 },
    VarSpec { name: "var5", tag: "float", dims: &[3], element_size: 4 },
    VarSpec { name: "var6", tag: "char", dims: &[4], element_size: 1 },
];

impl VarSpec {
    fn len(&self) -> usize {
        self.dims.iter().product()
    }

    fn size_in_bytes(&self) -> usize {
        self.len() * self.element_size
    }
}

/// Heap storage handed out by `get_var`; 8-byte aligned, freed on finalize.
struct Storage {
    ptr: *mut u64,
    words: usize,
}

impl Storage {
    fn zeroed(bytes: usize) -> Self {
        let words = (bytes + 7) / 8;
        let boxed = vec![0u64; words.max(1)].into_boxed_slice();
        let words = boxed.len();
        Self {
            ptr: Box::into_raw(boxed).cast::<u64>(),
            words,
        }
    }

    fn bytes(&self) -> *mut u8 {
        self.ptr.cast()
    }

    unsafe fn fill<T: Copy>(&self, values: &[T]) {
        ptr::copy_nonoverlapping(values.as_ptr(), self.ptr.cast::<T>(), values.len());
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`words` came from `Box::into_raw` of a boxed slice.
        unsafe {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(self.ptr, self.words)));
        }
    }
}

struct Model {
    start: f64,
    end: f64,
    step: f64,
    current: f64,
    storage: Vec<Storage>,
}

// SAFETY: the storage pointers are owned by the model and only touched under
// the MODEL lock (or by a caller the binding has given exclusive access).
unsafe impl Send for Model {}

impl Model {
    fn new(start: f64, end: f64, step: f64) -> Self {
        let storage: Vec<Storage> = VARIABLES
            .iter()
            .map(|spec| Storage::zeroed(spec.size_in_bytes()))
            .collect();
        // SAFETY: each buffer was sized for its variable above.
        unsafe {
            storage[0].fill(&[start]);
            storage[1].fill(&[1i32, 2]);
            storage[2].fill(&[1u8, 0, 0, 1, 1, 0]);
            storage[3].fill(&[0.0f64, 10.0, 1.0, 11.0, 2.0, 12.0]);
            storage[4].fill(&[0.5f32, 1.5, 2.5]);
            storage[5].fill(b"demo");
        }
        Self {
            start,
            end,
            step,
            current: start,
            storage,
        }
    }

    fn advance(&mut self, dt: f64) {
        self.current += if dt == -1.0 { self.step } else { dt };
        // SAFETY: var1 holds one f64.
        unsafe { *self.storage[0].ptr.cast::<f64>() = self.current };
    }
}

static MODEL: Mutex<Option<Model>> = const_mutex(None);
static LOGGER: Mutex<Option<Logger>> = const_mutex(None);

fn log(level: c_int, message: &str) {
    let logger = *LOGGER.lock();
    if let (Some(logger), Ok(msg)) = (logger, CString::new(message)) {
        // SAFETY: `msg` outlives the call.
        unsafe { logger(level, msg.as_ptr()) };
    }
}

unsafe fn lookup(name: *const c_char) -> Option<(usize, &'static VarSpec)> {
    if name.is_null() {
        return None;
    }
    let name = CStr::from_ptr(name).to_str().ok()?;
    VARIABLES.iter().enumerate().find(|(_, spec)| spec.name == name)
}

unsafe fn write_str(out: *mut c_char, s: &str) {
    ptr::copy_nonoverlapping(s.as_ptr(), out.cast::<u8>(), s.len());
    *out.add(s.len()) = 0;
}

fn parse_config(text: &str, model: &mut (f64, f64, f64)) -> Result<(), String> {
    for (number, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {}: expected key = value", number + 1))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| format!("line {}: {} is not a number", number + 1, value.trim()))?;
        match key.trim() {
            "start_time" => model.0 = value,
            "end_time" => model.1 = value,
            "time_step" => model.2 = value,
            other => return Err(format!("line {}: unknown key {}", number + 1, other)),
        }
    }
    Ok(())
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Start the model; `config_file` may be null or empty for defaults.
///
/// # Safety
///
/// `config_file` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn initialize(config_file: *const c_char) -> c_int {
    let mut times = (0.0, 10.0, 1.0);
    let path = if config_file.is_null() {
        String::new()
    } else {
        CStr::from_ptr(config_file).to_string_lossy().into_owned()
    };
    if !path.is_empty() {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                log(LOG_ERROR, &format!("cannot read {}: {}", path, e));
                return status::CONFIG_UNREADABLE;
            }
        };
        if let Err(e) = parse_config(&text, &mut times) {
            log(LOG_ERROR, &format!("{}: {}", path, e));
            return status::CONFIG_INVALID;
        }
    }
    let (start, end, step) = times;
    *MODEL.lock() = Some(Model::new(start, end, step));
    log(LOG_INFO, &format!("demo model initialized, t = {} .. {}", start, end));
    status::OK
}

/// Advance by `dt`, or by the default step when `dt == -1`.
#[no_mangle]
pub extern "C" fn update(dt: c_double) -> c_int {
    match MODEL.lock().as_mut() {
        Some(model) => {
            model.advance(dt);
            log(LOG_DEBUG, &format!("t = {}", model.current));
            status::OK
        }
        None => status::NOT_INITIALIZED,
    }
}

/// Release all model storage.
#[no_mangle]
pub extern "C" fn finalize() -> c_int {
    match MODEL.lock().take() {
        Some(_) => {
            log(LOG_INFO, "demo model finalized");
            status::OK
        }
        None => status::NOT_INITIALIZED,
    }
}

// ============================================================================
// Time
// ============================================================================

fn read_clock(f: impl FnOnce(&Model) -> f64) -> f64 {
    MODEL.lock().as_ref().map_or(0.0, f)
}

/// # Safety
///
/// `t` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn get_start_time(t: *mut c_double) {
    *t = read_clock(|m| m.start);
}

/// # Safety
///
/// `t` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn get_end_time(t: *mut c_double) {
    *t = read_clock(|m| m.end);
}

/// # Safety
///
/// `t` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn get_current_time(t: *mut c_double) {
    *t = read_clock(|m| m.current);
}

/// # Safety
///
/// `dt` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn get_time_step(dt: *mut c_double) {
    *dt = read_clock(|m| m.step);
}

// ============================================================================
// Variable information
// ============================================================================

/// Unknown names leave `ty` untouched.
///
/// # Safety
///
/// `name` must be NUL-terminated; `ty` must hold at least 8 bytes.
#[no_mangle]
pub unsafe extern "C" fn get_var_type(name: *const c_char, ty: *mut c_char) {
    if let Some((_, spec)) = lookup(name) {
        write_str(ty, spec.tag);
    }
}

/// Unknown names leave `rank` untouched.
///
/// # Safety
///
/// `name` must be NUL-terminated; `rank` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn get_var_rank(name: *const c_char, rank: *mut c_int) {
    if let Some((_, spec)) = lookup(name) {
        *rank = spec.dims.len() as c_int;
    }
}

/// Writes all six entries for known names; unknown names leave `shape` untouched.
///
/// # Safety
///
/// `name` must be NUL-terminated; `shape` must hold six ints.
#[no_mangle]
pub unsafe extern "C" fn get_var_shape(name: *const c_char, shape: *mut c_int) {
    if let Some((_, spec)) = lookup(name) {
        for axis in 0..MAXDIMS {
            *shape.add(axis) = spec.dims.get(axis).map_or(0, |&d| d as c_int);
        }
    }
}

/// Storage address of a variable; untouched for unknown names or before initialize.
///
/// # Safety
///
/// `name` must be NUL-terminated; `ptr` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn get_var(name: *const c_char, ptr: *mut *mut c_void) {
    let Some((index, _)) = lookup(name) else {
        return;
    };
    if let Some(model) = MODEL.lock().as_ref() {
        *ptr = model.storage[index].bytes().cast();
    }
}

/// # Safety
///
/// `count` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn get_var_count(count: *mut c_int) {
    *count = VARIABLES.len() as c_int;
}

/// Out-of-range indices leave `name` untouched.
///
/// # Safety
///
/// `name` must hold at least 5 bytes.
#[no_mangle]
pub unsafe extern "C" fn get_var_name(index: c_int, name: *mut c_char) {
    if let Some(spec) = usize::try_from(index).ok().and_then(|i| VARIABLES.get(i)) {
        write_str(name, spec.name);
    }
}

// ============================================================================
// Setters
// ============================================================================

/// Overwrite a whole variable from a column-major buffer.
///
/// # Safety
///
/// `name` must be NUL-terminated; `src` must hold the variable's full size.
#[no_mangle]
pub unsafe extern "C" fn set_var(name: *const c_char, src: *const c_void) {
    let Some((index, spec)) = lookup(name) else {
        return;
    };
    if let Some(model) = MODEL.lock().as_ref() {
        ptr::copy_nonoverlapping(
            src.cast::<u8>(),
            model.storage[index].bytes(),
            spec.size_in_bytes(),
        );
    }
}

/// Overwrite the block `start .. start + count` from a column-major buffer.
///
/// # Safety
///
/// `name` must be NUL-terminated; `start` and `count` must hold one entry per
/// dimension describing an in-bounds block; `src` must hold product(count)
/// elements.
#[no_mangle]
pub unsafe extern "C" fn set_var_slice(
    name: *const c_char,
    start: *const c_int,
    count: *const c_int,
    src: *const c_void,
) {
    let Some((index, spec)) = lookup(name) else {
        return;
    };
    let guard = MODEL.lock();
    let Some(model) = guard.as_ref() else {
        return;
    };
    let rank = spec.dims.len();
    let start: Vec<usize> = (0..rank).map(|d| *start.add(d) as usize).collect();
    let count: Vec<usize> = (0..rank).map(|d| *count.add(d) as usize).collect();
    let total: usize = count.iter().product();
    let dst = model.storage[index].bytes();
    let src = src.cast::<u8>();

    for k in 0..total {
        // column-major: first index fastest, in both buffers
        let mut rest = k;
        let mut offset = 0;
        let mut stride = 1;
        for d in 0..rank {
            let i = rest % count[d];
            rest /= count[d];
            offset += (start[d] + i) * stride;
            stride *= spec.dims[d];
        }
        ptr::copy_nonoverlapping(
            src.add(k * spec.element_size),
            dst.add(offset * spec.element_size),
            spec.element_size,
        );
    }
}

/// Install (or with null, remove) the log callback.
#[no_mangle]
pub extern "C" fn set_logger(logger: Option<Logger>) {
    *LOGGER.lock() = logger;
}

/// Every exported entry point with its address, for in-process symbol tables.
pub fn entry_points() -> Vec<(&'static str, *mut c_void)> {
    vec![
        ("initialize", initialize as *const () as *mut c_void),
        ("update", update as *const () as *mut c_void),
        ("finalize", finalize as *const () as *mut c_void),
        ("get_start_time", get_start_time as *const () as *mut c_void),
        ("get_end_time", get_end_time as *const () as *mut c_void),
        ("get_current_time", get_current_time as *const () as *mut c_void),
        ("get_time_step", get_time_step as *const () as *mut c_void),
        ("get_var_type", get_var_type as *const () as *mut c_void),
        ("get_var_rank", get_var_rank as *const () as *mut c_void),
        ("get_var_shape", get_var_shape as *const () as *mut c_void),
        ("get_var", get_var as *const () as *mut c_void),
        ("get_var_count", get_var_count as *const () as *mut c_void),
        ("get_var_name", get_var_name as *const () as *mut c_void),
        ("set_var", set_var as *const () as *mut c_void),
        ("set_var_slice", set_var_slice as *const () as *mut c_void),
        ("set_logger", set_logger as *const () as *mut c_void),
    ]
}

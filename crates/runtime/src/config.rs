//! Binding settings via `bmi.toml`
//!
//! Everything here is optional: a missing file means defaults. The file only
//! tunes the binding (where to look for libraries, how to step); the model's
//! own configuration file is passed through to `initialize` untouched.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use bmi_core::{BmiError, Result, DEFAULT_STEP};

/// Settings file name looked up in a settings directory.
pub const SETTINGS_FILE_NAME: &str = "bmi.toml";

/// Binding settings loaded from `bmi.toml`.
///
/// # Example
///
/// ```toml
/// search_dirs = ["/srv/models/lib"]
/// system_loader = true
/// forward_native_logs = true
/// time_step = -1.0
/// # max_steps = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmiSettings {
    /// Directories tried before the built-in search list.
    #[serde(default)]
    pub search_dirs: Vec<PathBuf>,
    /// Fall back to the platform loader's own search path.
    #[serde(default = "default_true")]
    pub system_loader: bool,
    /// Register a `set_logger` callback that forwards native messages to tracing.
    #[serde(default = "default_true")]
    pub forward_native_logs: bool,
    /// Step passed to `update`; `-1.0` means the model's default step.
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    /// Upper bound on update calls in a run; `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_time_step() -> f64 {
    DEFAULT_STEP
}

impl Default for BmiSettings {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            system_loader: true,
            forward_native_logs: true,
            time_step: DEFAULT_STEP,
            max_steps: None,
        }
    }
}

impl BmiSettings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| BmiError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| match e {
            BmiError::Config(msg) => BmiError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Read `bmi.toml` from `dir`, or defaults if there is none.
    pub fn load_or_default(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(SETTINGS_FILE_NAME);
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings the runner cannot act on.
    pub fn validate(&self) -> Result<()> {
        if !self.time_step.is_finite() {
            return Err(BmiError::Config(format!(
                "time_step must be finite, got {}",
                self.time_step
            )));
        }
        if self.time_step <= 0.0 && self.time_step != DEFAULT_STEP {
            return Err(BmiError::Config(format!(
                "time_step must be positive or {} (model default), got {}",
                DEFAULT_STEP, self.time_step
            )));
        }
        if self.max_steps == Some(0) {
            return Err(BmiError::Config("max_steps must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Returns the default settings file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# BMI binding settings
#
# Directories searched for the model library before the built-in list
# (., ~/local/lib, ~/.local/lib, $XDG_CONFIG_HOME/<engine>/lib,
#  /opt/<engine>/lib, /usr/local/lib, /usr/lib).
search_dirs = []

# Hand the bare library name to the platform loader when no candidate exists,
# so LD_LIBRARY_PATH / DYLD_LIBRARY_PATH / PATH apply.
system_loader = true

# Forward messages the model sends through set_logger to the log output.
forward_native_logs = true

# Step size passed to update. -1.0 asks the model for its default step.
time_step = -1.0

# Stop a run after this many updates (default: unbounded).
# max_steps = 10000
"#
    }
}

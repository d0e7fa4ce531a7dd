//! Locating a model library on disk.
//!
//! Candidate directories are tried in order, from most specific to most
//! generic: local installs win, and `/opt/<engine>/lib` wins over system
//! installs. The environment search-path variable of the platform loader is
//! not parsed here; when no candidate exists the bare file name is handed to
//! the loader, which applies it natively.

use std::path::{Path, PathBuf};

use bmi_core::{BmiError, Result};
use tracing::{debug, info, warn};

use crate::config::BmiSettings;
use crate::dl::DynLib;

/// Built-in candidate directories, `{engine}` is substituted and `~` expanded.
pub const DEFAULT_SEARCH_DIRS: &[&str] = &[
    ".",
    "~/local/lib",
    "~/.local/lib",
    "$XDG_CONFIG_HOME/{engine}/lib",
    "/opt/{engine}/lib",
    "/usr/local/lib",
    "/usr/lib",
];

/// Platform file name for a library base name.
///
/// `lib<name>.so` on Linux, `lib<name>.dylib` on macOS, `<name>.dll` on Windows.
pub fn platform_library_name(name: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("{}.dll", name)
    }
    #[cfg(target_os = "macos")]
    {
        format!("lib{}.dylib", name)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        format!("lib{}.so", name)
    }
}

/// Expand the built-in candidate list for `engine`.
pub fn default_search_dirs(engine: &str) -> Vec<PathBuf> {
    DEFAULT_SEARCH_DIRS
        .iter()
        .filter_map(|template| expand_dir(template, engine))
        .collect()
}

fn expand_dir(template: &str, engine: &str) -> Option<PathBuf> {
    let dir = template.replace("{engine}", engine);
    if let Some(rest) = dir.strip_prefix("$XDG_CONFIG_HOME/") {
        return dirs::config_dir().map(|config| config.join(rest));
    }
    if let Some(rest) = dir.strip_prefix("~/") {
        return dirs::home_dir().map(|home| home.join(rest));
    }
    Some(PathBuf::from(dir))
}

/// Whether `engine` names a library file rather than a base name.
fn is_explicit_path(engine: &str) -> bool {
    let path = Path::new(engine);
    if path.components().count() > 1 {
        return true;
    }
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    file.ends_with(".so")
        || file.contains(".so.")
        || file.ends_with(".dylib")
        || file.ends_with(".dll")
}

/// Ordered search for one model library.
#[derive(Debug, Clone)]
pub struct LibrarySearch {
    engine: String,
    dirs: Vec<PathBuf>,
    system_loader: bool,
}

impl LibrarySearch {
    /// Search the built-in directories, then the platform loader.
    pub fn new(engine: impl Into<String>) -> Self {
        let engine = engine.into();
        let dirs = default_search_dirs(&engine);
        Self {
            engine,
            dirs,
            system_loader: true,
        }
    }

    /// Search exactly `dirs`, in order, with the platform-loader fallback off.
    pub fn with_dirs(engine: impl Into<String>, dirs: Vec<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
            dirs,
            system_loader: false,
        }
    }

    /// Built-in search, with the settings' directories tried first.
    pub fn from_settings(engine: impl Into<String>, settings: &BmiSettings) -> Self {
        Self::new(engine)
            .prepend_dirs(settings.search_dirs.clone())
            .system_loader(settings.system_loader)
    }

    /// Try `dirs` before the current candidates.
    pub fn prepend_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        let mut all = dirs;
        all.append(&mut self.dirs);
        self.dirs = all;
        self
    }

    /// Enable or disable the final bare-name attempt through the platform loader.
    pub fn system_loader(mut self, enabled: bool) -> Self {
        self.system_loader = enabled;
        self
    }

    /// Engine name as given.
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Directories that will be searched, in order.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// File name looked for in every directory.
    pub fn library_file_name(&self) -> String {
        platform_library_name(&self.engine)
    }

    /// Full candidate paths, in search order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let file = self.library_file_name();
        self.dirs.iter().map(|dir| dir.join(&file)).collect()
    }

    /// First candidate that exists on disk, without loading it.
    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|path| path.is_file())
    }

    /// Load the first candidate that the platform loader accepts.
    ///
    /// Fails with `NotFound` when no candidate exists (and the platform loader
    /// cannot resolve the bare name), or with the last `LoadError` when
    /// candidates exist but none of them load.
    pub fn open(&self) -> Result<DynLib> {
        if is_explicit_path(&self.engine) {
            let path = PathBuf::from(&self.engine);
            if !path.is_file() && path.components().count() > 1 {
                return Err(BmiError::NotFound {
                    library: self.engine.clone(),
                    searched: vec![path],
                });
            }
            return match DynLib::open(&path) {
                Ok(lib) => {
                    info!(path = %path.display(), "Loading model library");
                    Ok(lib)
                }
                // A bare file name the platform loader cannot resolve
                Err(e) if !path.is_file() => {
                    debug!(library = %self.engine, error = %e, "Platform loader could not resolve library");
                    Err(BmiError::NotFound {
                        library: self.engine.clone(),
                        searched: vec![path],
                    })
                }
                Err(e) => Err(e),
            };
        }

        let file = self.library_file_name();
        let mut searched = Vec::with_capacity(self.dirs.len());
        let mut last_error = None;

        for path in self.candidates() {
            searched.push(path.clone());
            if !path.is_file() {
                continue;
            }
            match DynLib::open(&path) {
                Ok(lib) => {
                    info!(path = %path.display(), "Loading model library");
                    return Ok(lib);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Candidate library rejected by loader");
                    last_error = Some(e);
                }
            }
        }

        if self.system_loader {
            match DynLib::open(&file) {
                Ok(lib) => {
                    info!(library = %file, "Loading model library via platform search path");
                    return Ok(lib);
                }
                Err(e) => debug!(library = %file, error = %e, "Platform loader could not resolve library"),
            }
        }

        Err(last_error.unwrap_or(BmiError::NotFound {
            library: file,
            searched,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_library_name() {
        let name = platform_library_name("subgrid");
        #[cfg(target_os = "windows")]
        assert_eq!(name, "subgrid.dll");
        #[cfg(target_os = "macos")]
        assert_eq!(name, "libsubgrid.dylib");
        #[cfg(target_os = "linux")]
        assert_eq!(name, "libsubgrid.so");
    }

    #[test]
    fn test_default_dirs_order() {
        let dirs = default_search_dirs("demo");
        assert_eq!(dirs.first(), Some(&PathBuf::from(".")));
        let opt = dirs
            .iter()
            .position(|d| d == Path::new("/opt/demo/lib"))
            .unwrap();
        let usr_local = dirs
            .iter()
            .position(|d| d == Path::new("/usr/local/lib"))
            .unwrap();
        assert!(opt < usr_local);
        assert_eq!(dirs.last(), Some(&PathBuf::from("/usr/lib")));
        assert!(dirs.iter().all(|d| !d.to_string_lossy().starts_with('~')));
    }

    #[test]
    fn test_explicit_path_detection() {
        assert!(is_explicit_path("/usr/lib/libmodel1.so.5"));
        assert!(is_explicit_path("./libdemo.so"));
        assert!(is_explicit_path("model1.dll"));
        assert!(is_explicit_path("libmodel1.dylib"));
        assert!(!is_explicit_path("model1"));
    }

    #[test]
    fn test_prepend_dirs() {
        let search = LibrarySearch::with_dirs("demo", vec![PathBuf::from("/b")])
            .prepend_dirs(vec![PathBuf::from("/a")]);
        assert_eq!(search.dirs(), &[PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_candidates_use_platform_name() {
        let search = LibrarySearch::with_dirs("demo", vec![PathBuf::from("/opt/demo/lib")]);
        assert_eq!(
            search.candidates(),
            vec![PathBuf::from("/opt/demo/lib").join(platform_library_name("demo"))]
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = BmiSettings {
            search_dirs: vec![PathBuf::from("/models")],
            system_loader: false,
            ..BmiSettings::default()
        };
        let search = LibrarySearch::from_settings("demo", &settings);
        assert_eq!(search.dirs()[0], PathBuf::from("/models"));
        assert_eq!(search.dirs()[1], PathBuf::from("."));
        assert!(!search.system_loader);
    }

    #[test]
    fn test_missing_explicit_path_is_not_found() {
        let search = LibrarySearch::new("/nonexistent/dir/libmodel.so");
        assert!(matches!(search.open(), Err(BmiError::NotFound { .. })));
    }

    #[test]
    fn test_unresolvable_bare_file_name_is_not_found() {
        let engine = platform_library_name("bmi_missing_model_7f3a");
        let search = LibrarySearch::new(engine.clone());
        match search.open() {
            Err(BmiError::NotFound { library, searched }) => {
                assert_eq!(library, engine);
                assert_eq!(searched, vec![PathBuf::from(&engine)]);
            }
            other => panic!("Wrong result: {:?}", other),
        }
    }
}

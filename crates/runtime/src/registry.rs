//! Process-wide count of live sessions per library.
//!
//! A model that keeps its variables in process-wide statics is shared by
//! every session that loads the same file: the platform loader hands out the
//! same image again. The binding cannot separate such sessions, so it only
//! reports the aliasing.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

/// Live session count keyed by symbol-source origin.
static LIVE_SESSIONS: Lazy<Mutex<HashMap<String, usize>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Membership of one session in the registry; deregisters on drop.
#[derive(Debug)]
pub struct Registration {
    key: String,
}

impl Registration {
    /// The origin this registration counts against.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut live = LIVE_SESSIONS.lock();
        if let Some(count) = live.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                live.remove(&self.key);
            }
        }
    }
}

/// Count a new session on `key`, warning if another is already live.
pub fn register(key: &str) -> Registration {
    let mut live = LIVE_SESSIONS.lock();
    let count = live.entry(key.to_string()).or_insert(0);
    *count += 1;
    if *count > 1 {
        warn!(
            library = key,
            sessions = *count,
            "Library already loaded by another session; both share the model's native state"
        );
    }
    Registration {
        key: key.to_string(),
    }
}

/// Number of live sessions on `key`.
pub fn live_sessions(key: &str) -> usize {
    LIVE_SESSIONS.lock().get(key).copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_counts_and_releases() {
        let key = "registry-test-counts";
        assert_eq!(live_sessions(key), 0);
        let first = register(key);
        let second = register(key);
        assert_eq!(live_sessions(key), 2);
        assert_eq!(first.key(), key);
        drop(first);
        assert_eq!(live_sessions(key), 1);
        drop(second);
        assert_eq!(live_sessions(key), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let _a = register("registry-test-a");
        assert_eq!(live_sessions("registry-test-b"), 0);
    }
}

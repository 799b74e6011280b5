//! Line-pattern watchers attached to process output.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;

use crate::error::ProcessError;

/// Callback invoked when a watched pattern matches.
pub type WatchCallback = Arc<dyn Fn() + Send + Sync>;

/// Associates a pattern with a callback.
#[derive(Clone)]
pub struct LineWatcher {
    pattern: Regex,
    callback: WatchCallback,
    once: bool,
    fired: Arc<AtomicBool>,
}

/// Compiles a watch pattern.
///
/// # Errors
///
/// Returns [`ProcessError::Pattern`] when `pattern` is not a valid regular
/// expression.
pub fn compile_pattern(pattern: &str) -> Result<Regex, ProcessError> {
    Regex::new(pattern).map_err(|source| ProcessError::Pattern {
        pattern: pattern.to_owned(),
        source,
    })
}

impl LineWatcher {
    /// Fires `callback` on every matching line.
    pub fn every(pattern: Regex, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            pattern,
            callback: Arc::new(callback),
            once: false,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fires `callback` on the first matching line only.
    pub fn once(pattern: Regex, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            once: true,
            ..Self::every(pattern, callback)
        }
    }

    /// Pattern matched against each line.
    #[must_use]
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Checks `line` and invokes the callback when it matches.
    ///
    /// Returns `true` when the callback ran.
    pub fn observe(&self, line: &str) -> bool {
        if !self.pattern.is_match(line) {
            return false;
        }
        if self.once && self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        (self.callback)();
        true
    }
}

impl fmt::Debug for LineWatcher {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LineWatcher")
            .field("pattern", &self.pattern.as_str())
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

/// Runs every watcher in `watchers` against `line`.
pub(crate) fn observe_all(watchers: &[LineWatcher], line: &str) {
    for watcher in watchers {
        watcher.observe(line);
    }
}

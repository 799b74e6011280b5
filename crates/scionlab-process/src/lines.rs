//! Classification of SCION log lines into `tracing` levels.
//!
//! SCION services prefix every line with a timestamp and a bracketed level
//! tag. The timestamp is dropped because `tracing` adds its own; the tag
//! selects the level at which the line is re-emitted. Continuation lines
//! (starting with `> `) inherit the level of the line before them.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::Level;

/// Target under which process output is re-emitted.
pub const OUTPUT_TARGET: &str = "scionlab_process::output";

/// Prefix marking a continuation of the previous line.
const CONTINUATION_PREFIX: &str = "> ";

/// Leading timestamp, e.g. `2020-12-01 09:30:00.123456+0000 `.
#[expect(clippy::expect_used, reason = "the pattern is a literal")]
static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{6}\+\d{4} ")
        .expect("timestamp pattern compiles")
});

const LEVEL_PREFIXES: [(&str, Level); 6] = [
    ("[TRACE] [DBUG] ", Level::TRACE),
    ("[DEBUG] ", Level::DEBUG),
    ("[INFO] ", Level::INFO),
    ("[WARN] ", Level::WARN),
    ("[EROR] ", Level::ERROR),
    ("[CRIT] ", Level::ERROR),
];

/// Stateful classifier for one output stream.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    previous: Level,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self {
            previous: Level::INFO,
        }
    }
}

impl LineClassifier {
    /// Creates a classifier whose untagged lines default to `INFO`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the level for `line` and the message with prefixes removed.
    pub fn classify<'a>(&mut self, line: &'a str) -> (Level, &'a str) {
        let message = strip_timestamp(line);
        if message.starts_with(CONTINUATION_PREFIX) {
            return (self.previous, message);
        }
        for (prefix, level) in LEVEL_PREFIXES {
            if let Some(rest) = message.strip_prefix(prefix) {
                self.previous = level;
                return (level, rest);
            }
        }
        self.previous = Level::INFO;
        (Level::INFO, message)
    }
}

fn strip_timestamp(line: &str) -> &str {
    TIMESTAMP
        .find(line)
        .and_then(|timestamp| line.get(timestamp.end()..))
        .unwrap_or(line)
}

/// Re-emits one line of process output at the given level.
pub fn forward_line(tag: &str, level: Level, message: &str) {
    match level {
        Level::TRACE => tracing::trace!(target: OUTPUT_TARGET, component = tag, "{message}"),
        Level::DEBUG => tracing::debug!(target: OUTPUT_TARGET, component = tag, "{message}"),
        Level::INFO => tracing::info!(target: OUTPUT_TARGET, component = tag, "{message}"),
        Level::WARN => tracing::warn!(target: OUTPUT_TARGET, component = tag, "{message}"),
        Level::ERROR => tracing::error!(target: OUTPUT_TARGET, component = tag, "{message}"),
    }
}

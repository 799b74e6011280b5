//! Errors raised while launching and supervising external processes.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by [`crate::Process`] and [`crate::LogTail`].
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable does not exist or is not on `PATH`.
    #[error("binary not found: {binary}")]
    BinaryNotFound {
        /// Executable that could not be resolved.
        binary: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The operating system refused to start the process.
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        /// Executable that failed to start.
        binary: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// An output pipe was not captured after spawning.
    #[error("failed to capture {stream} of {tag}")]
    MissingPipe {
        /// Tag of the process.
        tag: String,
        /// Name of the missing stream.
        stream: &'static str,
    },
    /// A helper thread could not be started.
    #[error("failed to start {role} thread for {tag}: {source}")]
    Thread {
        /// Tag of the process.
        tag: String,
        /// What the thread was for.
        role: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Polling the child for its exit status failed.
    #[error("failed to wait for {tag}: {source}")]
    Wait {
        /// Tag of the process.
        tag: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The binary's version query did not succeed.
    #[error("version query for {binary} exited with status {status:?}")]
    VersionQuery {
        /// Executable that was queried.
        binary: PathBuf,
        /// Exit code, when the process was not killed by a signal.
        status: Option<i32>,
    },
    /// A watch pattern failed to compile.
    #[error("invalid watch pattern '{pattern}': {source}")]
    Pattern {
        /// Pattern source text.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },
}

impl ProcessError {
    /// Classifies a spawn failure, separating missing binaries.
    pub(crate) fn from_spawn(binary: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::BinaryNotFound { binary, source }
        } else {
            Self::Spawn { binary, source }
        }
    }
}

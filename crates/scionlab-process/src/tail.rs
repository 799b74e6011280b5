//! Side-channel log file tailing.
//!
//! Some SCION services report readiness only in a log file rather than on
//! their standard streams. [`LogTail`] polls such a file, forwards new lines
//! through `tracing`, and runs the attached watchers against them.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::error::ProcessError;
use crate::lines::{LineClassifier, forward_line};
use crate::process::PROCESS_TARGET;
use crate::watch::{LineWatcher, observe_all};

/// Handle to a background log tail. Dropping it stops the tail.
#[derive(Debug)]
pub struct LogTail {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LogTail {
    /// Starts tailing `path`.
    ///
    /// A file that already exists is followed from its current end so stale
    /// lines from an earlier run are ignored; a missing file is waited for and
    /// then read from its beginning. The tail ends when either `cancel` or the
    /// returned handle's own stop token fires.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Thread`] when the tail thread cannot start.
    pub fn spawn(
        tag: &str,
        path: impl Into<PathBuf>,
        watchers: Vec<LineWatcher>,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self, ProcessError> {
        let stop = CancellationToken::new();
        let path = path.into();
        let skip_existing = path.exists();
        let worker = TailWorker {
            tag: tag.to_owned(),
            path,
            skip_existing,
            watchers,
            poll_interval,
            cancel: cancel.clone(),
            stop: stop.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("{tag}-log"))
            .spawn(move || worker.run())
            .map_err(|source| ProcessError::Thread {
                tag: tag.to_owned(),
                role: "log tail",
                source,
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stops the tail and waits for its thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!(target: PROCESS_TARGET, "log tail thread panicked");
        }
    }
}

impl Drop for LogTail {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct TailWorker {
    tag: String,
    path: PathBuf,
    skip_existing: bool,
    watchers: Vec<LineWatcher>,
    poll_interval: Duration,
    cancel: CancellationToken,
    stop: CancellationToken,
}

impl TailWorker {
    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.stop.is_cancelled()
    }

    fn pause(&self) -> bool {
        self.stop.wait_timeout(self.poll_interval) || self.cancel.is_cancelled()
    }

    fn run(self) {
        let Some(mut reader) = self.open() else {
            return;
        };
        let mut classifier = LineClassifier::new();
        let mut pending = Vec::new();
        while !self.should_stop() {
            match reader.read_until(b'\n', &mut pending) {
                Ok(_) if pending.ends_with(b"\n") => {
                    let decoded = String::from_utf8_lossy(&pending);
                    let line = decoded.trim_end_matches(['\n', '\r']);
                    let (level, message) = classifier.classify(line);
                    forward_line(&self.tag, level, message);
                    observe_all(&self.watchers, line);
                    pending.clear();
                }
                // End of file or a partial line: keep what was read and wait
                // for the writer to finish it.
                Ok(_) => {
                    if self.pause() {
                        break;
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    warn!(
                        target: PROCESS_TARGET,
                        component = %self.tag,
                        file = %self.path.display(),
                        error = %error,
                        "failed to read log file"
                    );
                    break;
                }
            }
        }
        debug!(target: PROCESS_TARGET, component = %self.tag, "log tail stopped");
    }

    fn open(&self) -> Option<BufReader<File>> {
        loop {
            match open_log(&self.path, self.skip_existing) {
                Ok(file) => return Some(BufReader::new(file)),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    if self.pause() {
                        return None;
                    }
                }
                Err(error) => {
                    warn!(
                        target: PROCESS_TARGET,
                        component = %self.tag,
                        file = %self.path.display(),
                        error = %error,
                        "failed to open log file"
                    );
                    return None;
                }
            }
        }
    }
}

fn open_log(path: &Path, from_end: bool) -> io::Result<File> {
    let mut file = File::open(path)?;
    if from_end {
        file.seek(SeekFrom::End(0))?;
    }
    Ok(file)
}

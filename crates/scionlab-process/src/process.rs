//! Launching and supervising one external process.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::ProcessError;
use crate::lines::{LineClassifier, forward_line};
use crate::watch::{LineWatcher, observe_all};

/// Log target for process supervision.
pub const PROCESS_TARGET: &str = "scionlab_process::process";

/// Flag preceding the configuration file path.
pub const CONFIG_FLAG: &str = "--config";

/// Argument asking a SCION binary for its version.
pub const VERSION_FLAG: &str = "version";

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(2);
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How a supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited on its own; `None` when killed by a signal.
    Exited(Option<i32>),
    /// The run was cancelled and the process terminated.
    Cancelled,
}

/// Builder and runner for one external process invocation.
///
/// Output on stdout and stderr is re-emitted through `tracing` and matched
/// against the registered watchers. [`Process::run`] blocks until the process
/// exits or the supplied token is cancelled.
///
/// # Example
///
/// ```no_run
/// use regex::Regex;
/// use scionlab_process::{CancellationToken, Process};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cancel = CancellationToken::new();
/// let ready = Regex::new("Service started SCION Dispatcher")?;
/// Process::new("/opt/scion/scion", "dispatcher")
///     .arg("dispatcher")
///     .config_file("/var/lib/scionlab/config/dispatcher.toml")
///     .watch_for(ready, || println!("dispatcher ready"))
///     .run(&cancel)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Process {
    binary: PathBuf,
    tag: String,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    working_dir: Option<PathBuf>,
    watchers: Vec<LineWatcher>,
    termination_grace: Duration,
}

impl Process {
    /// Starts building an invocation of `binary`, logged under `tag`.
    pub fn new(binary: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            tag: tag.into(),
            args: Vec::new(),
            envs: Vec::new(),
            working_dir: None,
            watchers: Vec::new(),
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends `--config <path>`.
    #[must_use]
    pub fn config_file(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().as_os_str().to_owned();
        self.arg(CONFIG_FLAG).arg(path)
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Sets the child's working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Invokes `callback` for every output line matching `pattern`.
    #[must_use]
    pub fn watch_for(mut self, pattern: Regex, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.watchers.push(LineWatcher::every(pattern, callback));
        self
    }

    /// Attaches a prepared watcher.
    #[must_use]
    pub fn watcher(mut self, watcher: LineWatcher) -> Self {
        self.watchers.push(watcher);
        self
    }

    /// Time allowed between the termination request and a forced kill.
    #[must_use]
    pub fn termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    /// Tag used in log events.
    #[must_use]
    pub fn tag(&self) -> &str {
        self.tag.as_str()
    }

    /// Arguments collected so far.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Spawns the process and blocks until it exits or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when the process cannot be spawned, its pipes
    /// cannot be captured, or its exit status cannot be read. A non-zero exit
    /// is not an error; it is reported through [`ExitOutcome::Exited`].
    pub fn run(self, cancel: &CancellationToken) -> Result<ExitOutcome, ProcessError> {
        if cancel.is_cancelled() {
            return Ok(ExitOutcome::Cancelled);
        }

        let Self {
            binary,
            tag,
            args,
            envs,
            working_dir,
            watchers,
            termination_grace,
        } = self;

        let mut command = Command::new(&binary);
        command
            .args(&args)
            .envs(envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &working_dir {
            command.current_dir(dir);
        }

        debug!(
            target: PROCESS_TARGET,
            component = %tag,
            binary = %binary.display(),
            ?args,
            "spawning process"
        );
        let mut child = command
            .spawn()
            .map_err(|source| ProcessError::from_spawn(binary.clone(), source))?;
        info!(
            target: PROCESS_TARGET,
            component = %tag,
            pid = child.id(),
            "process started"
        );

        let watchers = Arc::new(watchers);
        let pumps = match start_pumps(&mut child, &tag, &watchers) {
            Ok(pumps) => pumps,
            Err(error) => {
                terminate_child(&mut child, &tag, termination_grace);
                return Err(error);
            }
        };

        let outcome = supervise(&mut child, &tag, cancel, termination_grace);
        join_pumps(pumps, &tag);
        outcome
    }
}

/// Waits briefly for the output readers so trailing lines reach the watchers.
///
/// Readers still blocked after [`PUMP_DRAIN_TIMEOUT`] are detached; this
/// happens when a grandchild inherited the pipes and outlived the process.
fn join_pumps(pumps: Vec<JoinHandle<()>>, tag: &str) {
    let deadline = Instant::now() + PUMP_DRAIN_TIMEOUT;
    for pump in pumps {
        while !pump.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if !pump.is_finished() {
            debug!(target: PROCESS_TARGET, component = %tag, "detaching output reader");
            continue;
        }
        if pump.join().is_err() {
            warn!(target: PROCESS_TARGET, component = %tag, "output reader panicked");
        }
    }
}

fn start_pumps(
    child: &mut Child,
    tag: &str,
    watchers: &Arc<Vec<LineWatcher>>,
) -> Result<Vec<JoinHandle<()>>, ProcessError> {
    let stdout = child.stdout.take().ok_or_else(|| ProcessError::MissingPipe {
        tag: tag.to_owned(),
        stream: "stdout",
    })?;
    let stderr = child.stderr.take().ok_or_else(|| ProcessError::MissingPipe {
        tag: tag.to_owned(),
        stream: "stderr",
    })?;
    Ok(vec![
        spawn_pump(stdout, tag, "stdout", Arc::clone(watchers))?,
        spawn_pump(stderr, tag, "stderr", Arc::clone(watchers))?,
    ])
}

fn spawn_pump(
    stream: impl Read + Send + 'static,
    tag: &str,
    role: &'static str,
    watchers: Arc<Vec<LineWatcher>>,
) -> Result<JoinHandle<()>, ProcessError> {
    let owned_tag = tag.to_owned();
    thread::Builder::new()
        .name(format!("{tag}-{role}"))
        .spawn(move || pump_lines(stream, &owned_tag, &watchers))
        .map_err(|source| ProcessError::Thread {
            tag: tag.to_owned(),
            role,
            source,
        })
}

/// Reads `stream` to the end, forwarding and watching every line.
pub(crate) fn pump_lines(stream: impl Read, tag: &str, watchers: &[LineWatcher]) {
    let mut reader = BufReader::new(stream);
    let mut classifier = LineClassifier::new();
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);
                let line = line.trim_end_matches(['\n', '\r']);
                let (level, message) = classifier.classify(line);
                forward_line(tag, level, message);
                observe_all(watchers, line);
            }
            Err(error) => {
                debug!(
                    target: PROCESS_TARGET,
                    component = %tag,
                    error = %error,
                    "stopped reading process output"
                );
                break;
            }
        }
    }
}

fn supervise(
    child: &mut Child,
    tag: &str,
    cancel: &CancellationToken,
    grace: Duration,
) -> Result<ExitOutcome, ProcessError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                log_exit(tag, status);
                return Ok(ExitOutcome::Exited(status.code()));
            }
            Ok(None) => {
                if cancel.wait_timeout(EXIT_POLL_INTERVAL) {
                    info!(
                        target: PROCESS_TARGET,
                        component = %tag,
                        "terminating process on request"
                    );
                    terminate_child(child, tag, grace);
                    return Ok(ExitOutcome::Cancelled);
                }
            }
            Err(source) => {
                terminate_child(child, tag, grace);
                return Err(ProcessError::Wait {
                    tag: tag.to_owned(),
                    source,
                });
            }
        }
    }
}

fn log_exit(tag: &str, status: ExitStatus) {
    if status.success() {
        info!(target: PROCESS_TARGET, component = %tag, ?status, "process exited");
    } else {
        warn!(target: PROCESS_TARGET, component = %tag, ?status, "process exited abnormally");
    }
}

/// Asks the child to terminate, killing it when the grace period lapses.
fn terminate_child(child: &mut Child, tag: &str, grace: Duration) {
    request_termination(child, tag);
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    target: PROCESS_TARGET,
                    component = %tag,
                    ?status,
                    "process exited during grace period"
                );
                return;
            }
            Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
            Err(_) => break,
        }
    }
    warn!(
        target: PROCESS_TARGET,
        component = %tag,
        grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
        "process did not exit in time, killing"
    );
    if let Err(error) = child.kill() {
        warn!(target: PROCESS_TARGET, component = %tag, error = %error, "failed to kill process");
    }
    drop(child.wait());
}

#[cfg(unix)]
fn request_termination(child: &Child, tag: &str) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(errno) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(
            target: PROCESS_TARGET,
            component = %tag,
            error = %errno,
            "failed to deliver SIGTERM"
        );
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child, tag: &str) {
    if let Err(error) = child.kill() {
        debug!(target: PROCESS_TARGET, component = %tag, error = %error, "failed to stop process");
    }
}

/// Queries a SCION binary for its version string.
///
/// # Errors
///
/// Returns [`ProcessError`] when the binary cannot be run or exits with a
/// failure status.
pub fn version(binary: impl AsRef<Path>) -> Result<String, ProcessError> {
    let binary = binary.as_ref();
    let output = Command::new(binary)
        .arg(VERSION_FLAG)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ProcessError::from_spawn(binary.to_path_buf(), source))?;
    if !output.status.success() {
        return Err(ProcessError::VersionQuery {
            binary: binary.to_path_buf(),
            status: output.status.code(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

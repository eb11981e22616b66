use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const DROP_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AppSpec {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl AppSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }
}

#[derive(Debug)]
pub enum SupervisorError {
    AlreadyRunning { pid: u32 },
    NotFound(PathBuf),
    Spawn { path: PathBuf, source: io::Error },
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::AlreadyRunning { pid } => {
                write!(f, "a supervised process is already running (pid {})", pid)
            }
            SupervisorError::NotFound(path) => {
                write!(f, "executable not found: {}", path.display())
            }
            SupervisorError::Spawn { path, source } => {
                write!(f, "failed to spawn '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for SupervisorError {}

struct Supervised {
    child: Child,
    path: PathBuf,
}

/// Owns at most one child process and the process group it leads. Polling
/// never blocks; only `terminate` and `kill` wait for the child.
pub struct ProcessSupervisor {
    label: String,
    process: Option<Supervised>,
}

impl ProcessSupervisor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            process: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.child.id())
    }

    pub fn path(&self) -> Option<&Path> {
        self.process.as_ref().map(|p| p.path.as_path())
    }

    pub fn spawn(&mut self, spec: &AppSpec) -> Result<u32, SupervisorError> {
        if let Some(pid) = self.pid() {
            if self.is_alive() {
                return Err(SupervisorError::AlreadyRunning { pid });
            }
        }

        let program = resolve_program(&spec.path);
        let mut command = Command::new(&program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        put_in_own_group(&mut command);

        if let Some(dir) = program.parent().filter(|d| d.is_dir()) {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SupervisorError::NotFound(spec.path.clone())
            } else {
                SupervisorError::Spawn {
                    path: spec.path.clone(),
                    source,
                }
            }
        })?;

        pipe_child_logs(&self.label, &mut child);

        let pid = child.id();
        info!(
            "[{}] spawned '{}' (pid {})",
            self.label,
            spec.path.display(),
            pid
        );

        self.process = Some(Supervised {
            child,
            path: spec.path.clone(),
        });

        Ok(pid)
    }

    /// Reaps the child without blocking. Once it has exited the handle is
    /// dropped and this keeps returning false. Descendants the app left
    /// behind in its process group are killed at that point.
    pub fn is_alive(&mut self) -> bool {
        match self.poll_leader() {
            LeaderState::Running => true,
            LeaderState::Exited(pgid) => {
                signal_group(pgid, GroupSignal::Kill);
                false
            }
            LeaderState::Gone => false,
        }
    }

    /// SIGTERM to the whole process group, wait up to `graceful_timeout` for
    /// every member to exit, then SIGKILL whatever is left.
    pub fn terminate(&mut self, graceful_timeout: Duration) {
        let pgid = match self.poll_leader() {
            LeaderState::Running => match self.pid() {
                Some(pid) => pid,
                None => return,
            },
            LeaderState::Exited(pgid) => pgid,
            LeaderState::Gone => return,
        };

        debug!("[{}] sending SIGTERM to process group {}", self.label, pgid);
        signal_group(pgid, GroupSignal::Terminate);

        let deadline = Instant::now() + graceful_timeout;
        while Instant::now() < deadline {
            let leader_done =
                !matches!(self.poll_leader(), LeaderState::Running);
            if leader_done && !group_exists(pgid) {
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }

        info!(
            "[{}] process group {} did not exit within {:?}; killing",
            self.label, pgid, graceful_timeout
        );

        if self.process.is_some() {
            self.kill();
        } else {
            signal_group(pgid, GroupSignal::Kill);
        }
    }

    /// SIGKILL to the process group, then a blocking reap of the leader.
    pub fn kill(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };

        let pgid = process.child.id();
        if !signal_group(pgid, GroupSignal::Kill) {
            if let Err(err) = process.child.kill() {
                // Already exited between polls; the wait below reaps it.
                debug!("[{}] kill failed: {}", self.label, err);
            }
        }

        match process.child.wait() {
            Ok(status) => info!(
                "[{}] '{}' stopped: {}",
                self.label,
                process.path.display(),
                describe_status(status)
            ),
            Err(err) => error!(
                "[{}] failed to reap '{}': {}",
                self.label,
                process.path.display(),
                err
            ),
        }
    }

    fn poll_leader(&mut self) -> LeaderState {
        let Some(process) = self.process.as_mut() else {
            return LeaderState::Gone;
        };

        match process.child.try_wait() {
            Ok(None) => LeaderState::Running,
            Ok(Some(status)) => {
                info!(
                    "[{}] '{}' exited: {}",
                    self.label,
                    process.path.display(),
                    describe_status(status)
                );
                let pgid = process.child.id();
                self.process = None;
                LeaderState::Exited(pgid)
            }
            Err(err) => {
                error!("[{}] failed to poll child: {}", self.label, err);
                self.kill();
                LeaderState::Gone
            }
        }
    }
}

enum LeaderState {
    Running,
    /// Reaped just now; carries the process group id.
    Exited(u32),
    Gone,
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.process.is_some() {
            debug!("[{}] dropping supervisor; terminating child", self.label);
            self.terminate(DROP_TIMEOUT);
        }
    }
}

// Bare names are looked up on PATH; anything with a directory is made
// absolute so it survives the change of working directory.
fn resolve_program(path: &Path) -> PathBuf {
    let has_dir = path
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty());

    if has_dir {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    }
}

#[derive(Clone, Copy, Debug)]
enum GroupSignal {
    Terminate,
    Kill,
}

// The app leads its own group (pgid == pid), so group signals reach
// launcher scripts and everything they start.
#[cfg(unix)]
fn put_in_own_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn put_in_own_group(_command: &mut Command) {}

/// Returns false when the group could not be signalled at all. A group
/// that is already empty counts as signalled.
#[cfg(unix)]
fn signal_group(pgid: u32, signal: GroupSignal) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return false;
    };

    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };

    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => true,
        Err(err) => {
            warn!("{:?} to process group {} failed: {}", signal, pgid, err);
            false
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: GroupSignal) -> bool {
    false
}

#[cfg(unix)]
fn group_exists(pgid: u32) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    i32::try_from(pgid)
        .is_ok_and(|raw| killpg(Pid::from_raw(raw), None).is_ok())
}

#[cfg(not(unix))]
fn group_exists(_pgid: u32) -> bool {
    false
}

fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {}", signal);
        }
    }

    status.to_string()
}

fn pipe_child_logs(label: &str, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        let label = label.to_string();
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(Result::ok) {
                info!("[{}:app] {}", label, line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let label = label.to_string();
        thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                warn!("[{}:app] {}", label, line);
            }
        });
    }
}

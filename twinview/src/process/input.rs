#[cfg(target_os = "linux")]
use std::fs;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyAction {
    KeyDown,
    KeyUp,
    Press,
}

impl KeyAction {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keydown" => Ok(KeyAction::KeyDown),
            "keyup" => Ok(KeyAction::KeyUp),
            "press" => Ok(KeyAction::Press),
            other => Err(format!("unknown key action '{}'", other)),
        }
    }

    fn xdotool_command(&self) -> &'static str {
        match self {
            KeyAction::KeyDown => "keydown",
            KeyAction::KeyUp => "keyup",
            KeyAction::Press => "key",
        }
    }
}

/// Delivers synthetic key events to the window of a supervised process.
pub trait KeyForwarder {
    fn forward(
        &mut self,
        pid: u32,
        key: &str,
        action: KeyAction,
    ) -> Result<(), String>;
}

const XDOTOOL_TIMEOUT: Duration = Duration::from_secs(1);
const XDOTOOL_POLL: Duration = Duration::from_millis(5);

/// Uses `xdotool` to find the newest window owned by the app's process
/// group and send it the key event. Every `xdotool` run is bounded by
/// `XDOTOOL_TIMEOUT`.
#[derive(Clone, Debug, Default)]
pub struct XdotoolForwarder {
    x_display: Option<String>,
}

impl XdotoolForwarder {
    pub fn new(x_display: Option<String>) -> Self {
        Self { x_display }
    }

    fn command(&self) -> Command {
        let mut command = Command::new("xdotool");
        if let Some(display) = self.x_display.as_ref() {
            command.env("DISPLAY", display);
        }
        command.stdin(Stdio::null());
        command
    }

    fn windows_of(&self, pid: u32) -> Result<Vec<String>, String> {
        let mut command = self.command();
        command.args(["search", "--pid", &pid.to_string()]);
        let output = run_bounded(command, XDOTOOL_TIMEOUT)?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }

    fn find_window(&self, pgid: u32) -> Result<String, String> {
        let members = process_group_members(pgid);
        newest_window(pgid, &members, |pid| self.windows_of(pid))
    }
}

impl KeyForwarder for XdotoolForwarder {
    fn forward(
        &mut self,
        pid: u32,
        key: &str,
        action: KeyAction,
    ) -> Result<(), String> {
        let window = self.find_window(pid)?;
        trace!("xdotool {} {} -> window {}", action.xdotool_command(), key, window);

        let mut command = self.command();
        command.args([action.xdotool_command(), "--window", &window, key]);
        let output = run_bounded(command, XDOTOOL_TIMEOUT)?;

        if !output.status.success() {
            return Err(format!("xdotool exited with {}", output.status));
        }

        debug!("forwarded '{}' ({:?}) to pid {}", key, action, pid);
        Ok(())
    }
}

/// Searches the leader and every other member of its process group,
/// newest process first, and returns the last window the first match
/// reports. Launcher scripts own no window themselves; the program they
/// start does.
pub fn newest_window<F>(
    pgid: u32,
    members: &[u32],
    mut search: F,
) -> Result<String, String>
where
    F: FnMut(u32) -> Result<Vec<String>, String>,
{
    let mut pids: Vec<u32> = members.to_vec();
    if !pids.contains(&pgid) {
        pids.push(pgid);
    }
    pids.sort_unstable_by(|a, b| b.cmp(a));

    for pid in pids {
        match search(pid) {
            Ok(windows) => {
                if let Some(window) = windows.last() {
                    return Ok(window.clone());
                }
            }
            Err(err) => debug!("window search for pid {} failed: {}", pid, err),
        }
    }

    Err(format!("no window found for process group {}", pgid))
}

/// Pids whose process group is `pgid`, read from `/proc`.
#[cfg(target_os = "linux")]
pub fn process_group_members(pgid: u32) -> Vec<u32> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return vec![pgid];
    };

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter(|pid| {
            fs::read_to_string(format!("/proc/{}/stat", pid))
                .ok()
                .and_then(|stat| stat_process_group(&stat))
                == Some(pgid)
        })
        .collect()
}

#[cfg(not(target_os = "linux"))]
pub fn process_group_members(pgid: u32) -> Vec<u32> {
    vec![pgid]
}

// `pid (comm) state ppid pgrp ...`; comm may itself contain spaces or
// parentheses, so fields are counted from the last ')'.
fn stat_process_group(stat: &str) -> Option<u32> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.split_whitespace().nth(2)?.parse().ok()
}

fn run_bounded(mut command: Command, timeout: Duration) -> Result<Output, String> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| format!("failed to run xdotool: {}", err))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => {
                return child
                    .wait_with_output()
                    .map_err(|err| format!("failed to read xdotool output: {}", err));
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(XDOTOOL_POLL),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("xdotool did not finish within {:?}", timeout));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("failed to poll xdotool: {}", err));
            }
        }
    }
}

struct KeyJob {
    pid: u32,
    key: String,
    action: KeyAction,
}

/// Runs another forwarder on a worker thread. `forward` only queues the
/// event, so the render loop never waits on the display server; failures
/// are logged by the worker.
pub struct QueuedForwarder {
    tx: Sender<KeyJob>,
}

impl QueuedForwarder {
    pub fn spawn<F>(mut inner: F) -> Self
    where
        F: KeyForwarder + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<KeyJob>();

        thread::spawn(move || {
            for KeyJob { pid, key, action } in rx {
                if let Err(err) = inner.forward(pid, &key, action) {
                    warn!("input for pid {} dropped: {}", pid, err);
                }
            }
            trace!("input worker exiting");
        });

        Self { tx }
    }
}

impl KeyForwarder for QueuedForwarder {
    fn forward(
        &mut self,
        pid: u32,
        key: &str,
        action: KeyAction,
    ) -> Result<(), String> {
        self.tx
            .send(KeyJob {
                pid,
                key: key.to_string(),
                action,
            })
            .map_err(|_| "input worker is gone".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_actions() {
        assert_eq!(KeyAction::parse("KeyDown"), Ok(KeyAction::KeyDown));
        assert_eq!(KeyAction::parse("keyup"), Ok(KeyAction::KeyUp));
        assert_eq!(KeyAction::parse(" press "), Ok(KeyAction::Press));
        assert!(KeyAction::parse("tap").is_err());
    }

    #[test]
    fn press_maps_to_xdotool_key() {
        assert_eq!(KeyAction::Press.xdotool_command(), "key");
        assert_eq!(KeyAction::KeyDown.xdotool_command(), "keydown");
    }

    #[test]
    fn window_search_covers_the_whole_group() {
        let mut searched = Vec::new();
        let window = newest_window(100, &[100, 104, 102], |pid| {
            searched.push(pid);
            Ok(match pid {
                102 => vec!["7340033".to_string(), "7340035".to_string()],
                _ => Vec::new(),
            })
        });

        assert_eq!(window, Ok("7340035".to_string()));
        assert_eq!(searched, vec![104, 102]);
    }

    #[test]
    fn window_search_includes_the_leader_and_survives_errors() {
        let mut searched = Vec::new();
        let window = newest_window(100, &[101], |pid| {
            searched.push(pid);
            match pid {
                101 => Err("timed out".to_string()),
                _ => Ok(vec!["42".to_string()]),
            }
        });

        assert_eq!(window, Ok("42".to_string()));
        assert_eq!(searched, vec![101, 100]);
        assert!(newest_window(100, &[], |_| Ok(Vec::new())).is_err());
    }

    #[test]
    fn reads_process_group_from_stat() {
        let stat = "4242 (my (odd) app) S 4200 4100 4100 0 -1 4194560";
        assert_eq!(stat_process_group(stat), Some(4100));
        assert_eq!(stat_process_group("garbage"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn own_process_is_in_its_group() {
        let pgid = nix::unistd::getpgrp().as_raw() as u32;
        let members = process_group_members(pgid);
        assert!(members.contains(&std::process::id()));
    }

    struct SlowForwarder {
        delay: Duration,
        done: mpsc::Sender<(u32, String)>,
    }

    impl KeyForwarder for SlowForwarder {
        fn forward(
            &mut self,
            pid: u32,
            key: &str,
            _action: KeyAction,
        ) -> Result<(), String> {
            thread::sleep(self.delay);
            self.done.send((pid, key.to_string())).map_err(|e| e.to_string())
        }
    }

    #[test]
    fn queued_forwarder_does_not_wait_for_delivery() {
        let (done_tx, done_rx) = mpsc::channel();
        let mut forwarder = QueuedForwarder::spawn(SlowForwarder {
            delay: Duration::from_millis(500),
            done: done_tx,
        });

        let started = Instant::now();
        forwarder.forward(7, "Return", KeyAction::Press).unwrap();
        forwarder.forward(7, "Escape", KeyAction::Press).unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));

        let delivered = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(delivered, (7, "Return".to_string()));
        let delivered = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(delivered, (7, "Escape".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn bounded_run_kills_a_hung_command() {
        let mut command = Command::new("/bin/sh");
        command.args(["-c", "sleep 5"]);

        let started = Instant::now();
        let result = run_bounded(command, Duration::from_millis(100));

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}

#![cfg(unix)]

mod support;

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use support::*;
use twinview::compose::SoftwareBackend;
use twinview::process::{
    AppSpec, KeyAction, KeyForwarder, ProcessSupervisor, QueuedForwarder,
    SupervisorError,
};
use twinview::runtime::engine::Engine;
use twinview::runtime::gateway::DispatchOutcome;
use twinview::runtime::status::STATUS_ERROR_TOPIC;
use twinview::scene::{ChannelTarget, DisplayChannel, Scene};

const LEFT: DisplayChannel = DisplayChannel::Left;

fn start_payload(channel: &str, script: &str) -> String {
    serde_json::json!({
        "channel": channel,
        "path": "/bin/sh",
        "args": ["-c", script],
        "transition_duration": 0.1,
    })
    .to_string()
}

fn pid_file(name: &str) -> PathBuf {
    let path = std::env::temp_dir()
        .join(format!("twinview-{}-{}.pid", name, std::process::id()));
    let _ = fs::remove_file(&path);
    path
}

/// Spawns a shell that backgrounds `sleep 300` and writes its pid to a file.
fn spawn_with_grandchild(
    supervisor: &mut ProcessSupervisor,
    pid_file: &PathBuf,
    then: &str,
) -> i32 {
    let script = format!("sleep 300 & echo $! > {}; {}", pid_file.display(), then);
    supervisor
        .spawn(&AppSpec::new("/bin/sh").with_args(["-c", script.as_str()]))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(pid) = fs::read_to_string(pid_file)
            .unwrap_or_default()
            .trim()
            .parse()
        {
            let _ = fs::remove_file(pid_file);
            return pid;
        }
        assert!(Instant::now() < deadline, "grandchild pid never written");
        thread::sleep(Duration::from_millis(10));
    }
}

/// Zombies count as gone; whoever inherited them may not reap promptly.
#[cfg(target_os = "linux")]
fn process_running(pid: i32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{}/stat", pid)) else {
        return false;
    };
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next());
    !matches!(state, Some('Z') | Some('X') | None)
}

#[cfg(target_os = "linux")]
fn wait_until_gone(pid: i32) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while process_running(pid) {
        assert!(Instant::now() < deadline, "pid {} is still running", pid);
        thread::sleep(Duration::from_millis(10));
    }
}

fn wait_for_exit(engine: &mut Engine<SoftwareBackend>, channel: DisplayChannel) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.channel_mut(channel).selector_mut().app_alive() {
        assert!(Instant::now() < deadline, "app did not exit");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn app_that_exits_on_its_own_falls_back_once() {
    let mut engine = software_engine(small_config());

    let outcomes = engine
        .dispatch(&message("app/start", &start_payload("left", "exit 3")))
        .unwrap();
    assert_eq!(outcomes, vec![(LEFT, DispatchOutcome::Applied)]);

    tick_until(&mut engine, 60, |e| {
        e.channel(LEFT).current() == &Scene::ExternalApp
    })
    .expect("app scene should become live");

    wait_for_exit(&mut engine, LEFT);

    tick(&mut engine);
    let left = engine.channel(LEFT);
    assert_eq!(left.next(), &Scene::Debug);
    assert!(left.in_flight());
    assert!(!left.selector().manually_stopped());

    tick_until(&mut engine, 60, |e| e.channel(LEFT).current() == &Scene::Debug)
        .expect("fallback should complete");

    tick_n(&mut engine, 30);
    let left = engine.channel(LEFT);
    assert_eq!(left.current(), &Scene::Debug);
    assert!(!left.in_flight());
}

#[test]
fn stop_returns_to_the_previous_scene_without_recovery() {
    let mut engine = software_engine(small_config());

    engine.apply_scene(ChannelTarget::Left, Scene::generated("plasma"), Some(0.1));
    tick_n(&mut engine, 10);

    engine
        .dispatch(&message("app/start", &start_payload("left", "sleep 30")))
        .unwrap();
    tick_until(&mut engine, 60, |e| {
        e.channel(LEFT).current() == &Scene::ExternalApp
    })
    .expect("app scene should become live");
    assert!(engine.channel(LEFT).selector().app_pid().is_some());

    let outcomes = engine
        .dispatch(&message("app/stop", r#"{"channel":"left"}"#))
        .unwrap();
    assert_eq!(outcomes, vec![(LEFT, DispatchOutcome::Applied)]);

    let left = engine.channel(LEFT);
    assert!(left.selector().manually_stopped());
    assert_eq!(left.selector().app_pid(), None);
    assert_eq!(left.next(), &Scene::generated("plasma"));

    tick_n(&mut engine, 40);
    let left = engine.channel(LEFT);
    assert_eq!(left.current(), &Scene::generated("plasma"));
    assert!(!left.in_flight());
}

#[test]
fn kill_returns_to_the_scene_shown_before_the_app() {
    let mut engine = software_engine(small_config());

    engine
        .dispatch(&message("app/start", &start_payload("right", "sleep 30")))
        .unwrap();
    tick_n(&mut engine, 10);

    let outcomes = engine
        .dispatch(&message("app/kill", r#"{"channel":"right"}"#))
        .unwrap();
    assert_eq!(
        outcomes,
        vec![(DisplayChannel::Right, DispatchOutcome::Applied)]
    );

    let right = engine.channel(DisplayChannel::Right);
    assert!(right.selector().manually_stopped());
    assert_eq!(right.next(), &Scene::generated("idle"));
}

#[test]
fn second_start_is_ignored_while_an_app_runs() {
    let mut engine = software_engine(small_config());

    engine
        .dispatch(&message("app/start", &start_payload("left", "sleep 30")))
        .unwrap();
    let pid = engine.channel(LEFT).selector().app_pid();

    let outcomes = engine
        .dispatch(&message("app/start", &start_payload("left", "sleep 30")))
        .unwrap();
    assert!(matches!(outcomes[0].1, DispatchOutcome::Ignored(_)));
    assert_eq!(engine.channel(LEFT).selector().app_pid(), pid);

    engine.shutdown();
    assert_eq!(engine.channel(LEFT).selector().app_pid(), None);
}

#[test]
fn spawn_failure_publishes_an_error_and_keeps_the_scene() {
    let mut engine = software_engine(small_config());
    let sink = MemorySink::default();
    engine.subscribe(Box::new(sink.clone()));

    let outcomes = engine
        .dispatch(&message(
            "app/start",
            r#"{"channel":"left","path":"/nonexistent/twinview-app"}"#,
        ))
        .unwrap();

    assert!(matches!(outcomes[0].1, DispatchOutcome::Failed(_)));
    assert_eq!(engine.channel(LEFT).next(), &Scene::generated("idle"));
    assert!(!engine.channel(LEFT).in_flight());

    let error: serde_json::Value =
        serde_json::from_str(&sink.last(STATUS_ERROR_TOPIC).unwrap()).unwrap();
    assert_eq!(error["channel"], "left");
}

#[test]
fn input_reaches_the_running_app() {
    let forwarder = RecordingForwarder::default();
    let mut engine = software_engine(small_config())
        .with_forwarder(Box::new(forwarder.clone()));

    engine
        .dispatch(&message("app/start", &start_payload("left", "sleep 30")))
        .unwrap();

    // Not live until the fade completes.
    let outcomes = engine
        .dispatch(&message(
            "input/forward",
            r#"{"channel":"left","key":"Return","action":"keydown"}"#,
        ))
        .unwrap();
    assert!(matches!(outcomes[0].1, DispatchOutcome::Ignored(_)));

    tick_n(&mut engine, 10);
    let pid = engine.channel(LEFT).selector().app_pid().unwrap();

    let outcomes = engine
        .dispatch(&message(
            "input/forward",
            r#"{"channel":"left","key":"Return","action":"keydown"}"#,
        ))
        .unwrap();
    assert!(outcomes[0].1.is_applied());

    let events = forwarder.events.lock().unwrap().clone();
    assert_eq!(events, vec![(pid, "Return".to_string(), KeyAction::KeyDown)]);

    engine.shutdown();
}

#[test]
fn scene_set_away_from_an_app_stops_it() {
    let mut engine = software_engine(small_config());

    engine
        .dispatch(&message("app/start", &start_payload("left", "sleep 30")))
        .unwrap();
    tick_n(&mut engine, 10);

    engine
        .dispatch(&message("scene/set", r#"{"channel":"left","name":"plasma"}"#))
        .unwrap();

    let left = engine.channel(LEFT);
    assert!(left.selector().manually_stopped());
    assert_eq!(left.selector().app_pid(), None);
    assert_eq!(left.next(), &Scene::generated("plasma"));
}

#[test]
fn terminate_escalates_when_sigterm_is_ignored() {
    let mut supervisor = ProcessSupervisor::new("test");
    let spec = AppSpec::new("/bin/sh")
        .with_args(["-c", "trap '' TERM; exec sleep 30"]);

    supervisor.spawn(&spec).unwrap();
    // Let the shell install its trap.
    thread::sleep(Duration::from_millis(100));

    supervisor.terminate(Duration::from_millis(200));

    assert!(!supervisor.is_alive());
    assert_eq!(supervisor.pid(), None);
}

#[test]
fn terminate_is_quick_for_a_cooperative_app() {
    let mut supervisor = ProcessSupervisor::new("test");
    let spec = AppSpec::new("/bin/sh").with_args(["-c", "exec sleep 30"]);

    supervisor.spawn(&spec).unwrap();

    let started = Instant::now();
    supervisor.terminate(Duration::from_secs(5));

    assert!(!supervisor.is_alive());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn missing_program_is_reported_as_not_found() {
    let mut supervisor = ProcessSupervisor::new("test");
    let result = supervisor.spawn(&AppSpec::new("/nonexistent/twinview-app"));

    assert!(matches!(result, Err(SupervisorError::NotFound(_))));
    assert!(!supervisor.is_alive());
}

#[cfg(target_os = "linux")]
#[test]
fn terminate_reaches_processes_the_app_started() {
    let mut supervisor = ProcessSupervisor::new("test");
    let pid_file = pid_file("terminate");
    let grandchild = spawn_with_grandchild(&mut supervisor, &pid_file, "wait");
    assert!(process_running(grandchild));

    supervisor.terminate(Duration::from_millis(500));

    assert!(!supervisor.is_alive());
    wait_until_gone(grandchild);
}

#[cfg(target_os = "linux")]
#[test]
fn launcher_exit_takes_its_children_down() {
    let mut supervisor = ProcessSupervisor::new("test");
    let pid_file = pid_file("launcher");
    let grandchild = spawn_with_grandchild(&mut supervisor, &pid_file, "exit 0");

    let deadline = Instant::now() + Duration::from_secs(5);
    while supervisor.is_alive() {
        assert!(Instant::now() < deadline, "launcher did not exit");
        thread::sleep(Duration::from_millis(10));
    }

    wait_until_gone(grandchild);
}

#[cfg(target_os = "linux")]
#[test]
fn failed_poll_still_cleans_up_the_group() {
    use nix::sys::signal::{Signal, kill};
    use nix::sys::wait::waitpid;
    use nix::unistd::Pid;

    let mut supervisor = ProcessSupervisor::new("test");
    let pid_file = pid_file("poll");
    let grandchild = spawn_with_grandchild(&mut supervisor, &pid_file, "wait");

    // Reap the leader behind the supervisor's back so its next poll fails.
    let leader = Pid::from_raw(supervisor.pid().unwrap() as i32);
    kill(leader, Signal::SIGKILL).unwrap();
    waitpid(leader, None).unwrap();

    assert!(!supervisor.is_alive());
    assert_eq!(supervisor.pid(), None);
    wait_until_gone(grandchild);
}

struct StalledForwarder;

impl KeyForwarder for StalledForwarder {
    fn forward(
        &mut self,
        _pid: u32,
        _key: &str,
        _action: KeyAction,
    ) -> Result<(), String> {
        thread::sleep(Duration::from_secs(2));
        Ok(())
    }
}

#[test]
fn slow_input_delivery_does_not_hold_up_the_frame() {
    let mut engine = software_engine(small_config())
        .with_forwarder(Box::new(QueuedForwarder::spawn(StalledForwarder)));

    engine
        .dispatch(&message("app/start", &start_payload("left", "sleep 30")))
        .unwrap();
    tick_n(&mut engine, 10);
    assert_eq!(engine.channel(LEFT).current(), &Scene::ExternalApp);

    let started = Instant::now();
    let outcomes = engine
        .dispatch(&message(
            "input/forward",
            r#"{"channel":"left","key":"Return","action":"press"}"#,
        ))
        .unwrap();
    tick(&mut engine);

    assert!(outcomes[0].1.is_applied());
    assert!(started.elapsed() < Duration::from_millis(100));

    engine.shutdown();
}

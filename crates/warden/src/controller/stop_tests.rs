//! Tests for the stop escalation and the command surface.

use std::process::ExitCode;

use rstest::rstest;

use crate::controller::{LifecycleCommand, StopOutcome, StopStage};
use crate::process_file::DaemonState;
use crate::process_group::StopSignal::{self, Interrupt, Kill, Terminate};
use crate::tests::support::{ControllerHarness, DAEMON_PID, ScriptedGroups};

#[test]
fn stop_without_pid_file_reports_not_running() {
    let mut harness = ControllerHarness::new(ScriptedGroups::running(), 3);
    let outcome = harness
        .controller
        .stop(&mut harness.output)
        .expect("stop should complete");
    assert_eq!(outcome, StopOutcome::NotRunning);
    assert!(harness.groups().sent().is_empty());
    assert!(
        harness
            .stderr()
            .contains("Pid file not found. Is the daemon running?")
    );
}

#[test]
fn stop_with_dead_group_dumps_the_crash_log() {
    let mut harness = ControllerHarness::new(ScriptedGroups::dead(), 3);
    harness.record_pid();
    harness.write_log(concat!(
        "=== Log Marked @ t0 [1] ===\n",
        "=== Daemon Exception Backtrace @ t1 ===\n",
        "Failed: listener died\n",
        "=== Daemon Crashed ===\n",
    ));
    let outcome = harness
        .controller
        .stop(&mut harness.output)
        .expect("stop should complete");
    assert_eq!(outcome, StopOutcome::NotRunning);
    assert!(harness.groups().sent().is_empty());
    let stderr = harness.stderr();
    assert!(stderr.contains(&format!("Pid {DAEMON_PID} is not running. Has daemon crashed?")));
    assert!(stderr.contains("Dumping daemon crash log:"));
    assert!(stderr.contains("Failed: listener died"));
    assert_eq!(harness.controller.pid(), Some(DAEMON_PID));
}

#[test]
fn stop_with_an_unreadable_pid_file_dumps_the_crash_log() {
    let mut harness = ControllerHarness::new(ScriptedGroups::running(), 3);
    harness.write_pid_file("garbage");
    harness.write_log(concat!(
        "=== Daemon Exception Backtrace @ t1 ===\n",
        "Failed: listener died\n",
        "=== Daemon Crashed ===\n",
    ));
    assert_eq!(harness.controller.status(), DaemonState::Unknown);

    let outcome = harness
        .controller
        .stop(&mut harness.output)
        .expect("stop should complete");

    assert_eq!(outcome, StopOutcome::NotRunning);
    assert!(harness.groups().sent().is_empty());
    let stderr = harness.stderr();
    assert!(!stderr.contains("Pid file not found"), "{stderr}");
    assert!(stderr.contains("holds no pid. Has daemon crashed?"), "{stderr}");
    assert!(stderr.contains("Dumping daemon crash log:"), "{stderr}");
    assert!(stderr.contains("Failed: listener died"), "{stderr}");
}

#[rstest]
#[case::graceful(&[], &[Interrupt], StopStage::InterruptSent)]
#[case::needs_terminate(&[Interrupt], &[Interrupt, Terminate], StopStage::TerminateLoop)]
#[case::needs_kill(&[Interrupt, Terminate], &[Interrupt, Terminate, Terminate, Kill], StopStage::Killed)]
fn stop_escalates_until_the_group_exits(
    #[case] ignored: &[StopSignal],
    #[case] expected: &[StopSignal],
    #[case] stage: StopStage,
) {
    let mut harness = ControllerHarness::new(ScriptedGroups::running().ignoring(ignored), 3);
    harness.record_pid();
    let outcome = harness
        .controller
        .stop(&mut harness.output)
        .expect("stop should complete");
    assert_eq!(
        outcome,
        StopOutcome::Stopped {
            pid: DAEMON_PID,
            during: stage
        }
    );
    assert_eq!(harness.groups().sent(), expected);
    assert_eq!(harness.controller.pid(), None, "pid file should be cleared");
    assert!(harness.stdout().contains("Daemon has left the building."));
}

#[test]
fn stop_reports_a_group_that_survives_the_kill() {
    let groups = ScriptedGroups::running().ignoring(&[Interrupt, Terminate, Kill]);
    let mut harness = ControllerHarness::new(groups, 2);
    harness.record_pid();
    let outcome = harness
        .controller
        .stop(&mut harness.output)
        .expect("stop should complete");
    assert_eq!(outcome, StopOutcome::StillRunning { pid: DAEMON_PID });
    assert_eq!(harness.groups().sent(), [Interrupt, Terminate, Kill]);
    assert!(harness.stderr().contains("Daemon appears to be still running!"));
    assert_eq!(harness.controller.pid(), Some(DAEMON_PID), "pid file must be kept");
}

#[test]
fn zero_terminate_attempts_go_straight_to_kill() {
    let groups = ScriptedGroups::running().ignoring(&[Interrupt]);
    let mut harness = ControllerHarness::new(groups, 0);
    harness.record_pid();
    harness
        .controller
        .stop(&mut harness.output)
        .expect("stop should complete");
    assert_eq!(harness.groups().sent(), [Interrupt, Kill]);
}

#[test]
fn stop_announces_each_signal_and_wait() {
    let groups = ScriptedGroups::running().ignoring(&[Interrupt]);
    let mut harness = ControllerHarness::new(groups, 3);
    harness.record_pid();
    harness
        .controller
        .stop(&mut harness.output)
        .expect("stop should complete");
    let stdout = harness.stdout();
    assert!(stdout.contains("Stopping scripted daemon..."), "{stdout}");
    assert!(stdout.contains("Sending INT to process group 4240..."), "{stdout}");
    assert!(stdout.contains("Sending TERM to process group 4240..."), "{stdout}");
    assert!(stdout.contains("Waiting for 0.0s for daemon to terminate..."), "{stdout}");
}

#[test]
fn stop_command_prints_status_and_succeeds() {
    let mut harness = ControllerHarness::new(ScriptedGroups::running(), 3);
    harness.record_pid();
    let succeeded = harness
        .controller
        .execute(LifecycleCommand::Stop, &mut harness.output)
        .expect("command should complete");
    assert!(succeeded);
    assert!(harness.stdout().contains("Daemon status: stopped"));
}

#[test]
fn stop_command_fails_when_the_daemon_survives() {
    let groups = ScriptedGroups::running().ignoring(&[Interrupt, Terminate, Kill]);
    let mut harness = ControllerHarness::new(groups, 1);
    harness.record_pid();
    let code = harness
        .controller
        .daemonize("stop", &mut harness.output)
        .expect("command should complete");
    assert_eq!(format!("{code:?}"), format!("{:?}", ExitCode::FAILURE));
    assert!(harness.stdout().contains("Daemon status: running pid=4242"));
}

#[rstest]
#[case("bogus")]
#[case("")]
#[case("STOP")]
fn unknown_commands_touch_nothing(#[case] command: &str) {
    let mut harness = ControllerHarness::new(ScriptedGroups::running(), 3);
    harness.record_pid();
    let code = harness
        .controller
        .daemonize(command, &mut harness.output)
        .expect("usage errors are reported, not raised");
    assert_eq!(format!("{code:?}"), format!("{:?}", ExitCode::FAILURE));
    assert!(
        harness
            .stderr()
            .contains("Invalid command. Please specify start, restart, stop or status.")
    );
    assert!(harness.groups().sent().is_empty());
    assert!(harness.stdout().is_empty());
}

#[rstest]
#[case::stopped(false, "", DaemonState::Stopped, "Daemon status: stopped")]
#[case::running(true, "", DaemonState::Running, "Daemon status: running pid=4242")]
#[case::unknown(false, "clean exit\n", DaemonState::Unknown, "Daemon status: unknown")]
#[case::crashed(false, "boom\n=== Daemon Crashed ===\n", DaemonState::Unknown, "Daemon status: crashed")]
fn show_status_reports_each_state(
    #[case] alive: bool,
    #[case] log: &str,
    #[case] state: DaemonState,
    #[case] line: &str,
) {
    let groups = if alive {
        ScriptedGroups::running()
    } else {
        ScriptedGroups::dead()
    };
    let mut harness = ControllerHarness::new(groups, 3);
    if state != DaemonState::Stopped {
        harness.record_pid();
    }
    harness.write_log(log);
    let reported = harness
        .controller
        .show_status(&mut harness.output)
        .expect("status should print");
    assert_eq!(reported, state);
    assert!(harness.stdout().contains(line), "{}", harness.stdout());
}

#[test]
fn crashed_status_dumps_the_crash_tail() {
    let mut harness = ControllerHarness::new(ScriptedGroups::dead(), 3);
    harness.record_pid();
    harness.write_log(concat!(
        "=== Log Marked @ t0 [1] ===\n",
        "serving\n",
        "=== Daemon Exception Backtrace @ t1 ===\n",
        "Panic: exploded\n",
        "=== Daemon Crashed ===\n",
    ));
    harness
        .controller
        .show_status(&mut harness.output)
        .expect("status should print");
    let stderr = harness.stderr();
    assert!(stderr.contains("Dumping daemon crash log:"));
    assert!(stderr.contains("\tPanic: exploded"));
    assert!(!stderr.contains("serving"), "tail should stop at the report header");
}

#[test]
fn kill_signals_the_live_group_only() {
    let harness = ControllerHarness::new(ScriptedGroups::running().ignoring(&[Terminate]), 3);
    assert!(!harness.controller.kill(Terminate).expect("kill"));
    harness.record_pid();
    assert!(harness.controller.kill(Terminate).expect("kill"));
    assert_eq!(harness.groups().sent(), [Terminate]);
}

#[test]
fn cleanup_clears_only_dead_pid_files() {
    let harness = ControllerHarness::new(ScriptedGroups::running(), 3);
    harness.record_pid();
    harness.controller.cleanup().expect("cleanup");
    assert_eq!(harness.controller.pid(), Some(DAEMON_PID));

    let harness = ControllerHarness::new(ScriptedGroups::dead(), 3);
    harness.record_pid();
    harness.controller.cleanup().expect("cleanup");
    assert_eq!(harness.controller.pid(), None);
}

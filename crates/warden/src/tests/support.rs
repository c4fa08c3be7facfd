//! Scripted collaborators for controller tests.

use std::cell::{Cell, RefCell};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use warden_config::DaemonSpec;

use crate::controller::{ControlOutput, ControlSettings, Controller, StartPolicy, StopPolicy};
use crate::daemon::{Daemon, Detach, DetachError, Fork};
use crate::process_file::ProcessFile;
use crate::process_group::{ProcessGroups, SignalError, StopSignal};
use crate::sentinel;

/// Pid the scripted daemon records.
pub(crate) const DAEMON_PID: u32 = 4_242;
/// Group the scripted daemon leads.
pub(crate) const DAEMON_PGID: u32 = 4_240;

/// A daemon whose hooks are never run by these tests.
pub(crate) struct QuietDaemon;

impl Daemon for QuietDaemon {}

/// Process group that exits on the first signal it does not ignore.
#[derive(Debug)]
pub(crate) struct ScriptedGroups {
    alive: Cell<bool>,
    ignored: Vec<StopSignal>,
    sent: RefCell<Vec<StopSignal>>,
}

impl ScriptedGroups {
    pub(crate) fn running() -> Self {
        Self {
            alive: Cell::new(true),
            ignored: Vec::new(),
            sent: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn dead() -> Self {
        let groups = Self::running();
        groups.alive.set(false);
        groups
    }

    pub(crate) fn ignoring(mut self, signals: &[StopSignal]) -> Self {
        self.ignored.extend_from_slice(signals);
        self
    }

    pub(crate) fn sent(&self) -> Vec<StopSignal> {
        self.sent.borrow().clone()
    }
}

impl ProcessGroups for ScriptedGroups {
    fn group_of(&self, pid: u32) -> Option<u32> {
        (pid == DAEMON_PID && self.alive.get()).then_some(DAEMON_PGID)
    }

    fn signal_group(&self, pgid: u32, signal: StopSignal) -> Result<(), SignalError> {
        assert_eq!(pgid, DAEMON_PGID, "signals must target the daemon's group");
        self.sent.borrow_mut().push(signal);
        if !self.ignored.contains(&signal) {
            self.alive.set(false);
        }
        Ok(())
    }
}

/// Fork stand-in that always leaves the caller on the parent side.
///
/// Optionally plays the detached daemon by recording its pid during the fork.
#[derive(Debug, Default)]
pub(crate) struct ScriptedDetach {
    pid_file: RefCell<Option<PathBuf>>,
    crash_log: RefCell<Option<PathBuf>>,
    forks: Cell<u32>,
    reaped: RefCell<Vec<u32>>,
}

impl ScriptedDetach {
    pub(crate) fn daemon_records_pid_in(&self, path: &Path) {
        *self.pid_file.borrow_mut() = Some(path.to_path_buf());
    }

    pub(crate) fn daemon_crashes_into(&self, path: &Path) {
        *self.crash_log.borrow_mut() = Some(path.to_path_buf());
    }

    pub(crate) fn forks(&self) -> u32 {
        self.forks.get()
    }

    pub(crate) fn reaped(&self) -> Vec<u32> {
        self.reaped.borrow().clone()
    }
}

impl Detach for ScriptedDetach {
    fn fork(&self) -> Result<Fork, DetachError> {
        self.forks.set(self.forks.get() + 1);
        if let Some(path) = self.pid_file.borrow().as_deref() {
            ProcessFile::new(path).store(DAEMON_PID).expect("record pid");
        }
        if let Some(path) = self.crash_log.borrow().as_deref() {
            let mut log = OpenOptions::new()
                .append(true)
                .open(path)
                .expect("open log");
            writeln!(log, "boom\n{}", sentinel::DAEMON_CRASHED).expect("write crash");
        }
        Ok(Fork::Parent { child: DAEMON_PGID })
    }

    fn become_session_leader(&self) -> Result<(), DetachError> {
        panic!("the parent side never starts a session");
    }

    fn redirect_standard_streams(&self, _log: &Path) -> Result<(), DetachError> {
        panic!("the parent side never redirects its streams");
    }

    fn set_process_title(&self, _name: &str) {}

    fn reap(&self, child: u32) -> Result<(), DetachError> {
        self.reaped.borrow_mut().push(child);
        Ok(())
    }
}

/// Millisecond-scale timings so escalation tests run quickly.
pub(crate) fn fast_settings(terminate_attempts: u32) -> ControlSettings {
    ControlSettings {
        stop: StopPolicy {
            timeout: Duration::from_millis(20),
            poll_interval: Duration::from_millis(1),
            terminate_attempts,
            backoff: Duration::from_millis(6),
        },
        start: StartPolicy {
            delay: Duration::ZERO,
            attempts: 1,
            poll_interval: Duration::from_millis(1),
        },
    }
}

/// A controller over scripted groups in a temporary working directory.
pub(crate) struct ControllerHarness {
    _temp: TempDir,
    pub(crate) controller: Controller<QuietDaemon, ScriptedGroups, ScriptedDetach>,
    pub(crate) output: ControlOutput<Vec<u8>, Vec<u8>>,
}

impl ControllerHarness {
    pub(crate) fn new(groups: ScriptedGroups, terminate_attempts: u32) -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let spec = DaemonSpec::new("scripted", temp.path()).expect("derive layout");
        spec.prepare_directories().expect("prepare directories");
        let controller = Controller::new(QuietDaemon, spec, fast_settings(terminate_attempts))
            .with_process_groups(groups)
            .with_detach(ScriptedDetach::default());
        Self {
            _temp: temp,
            controller,
            output: ControlOutput::new(Vec::new(), Vec::new()),
        }
    }

    pub(crate) fn record_pid(&self) {
        self.controller
            .process_file()
            .store(DAEMON_PID)
            .expect("store pid");
    }

    pub(crate) fn write_pid_file(&self, content: &str) {
        std::fs::write(self.controller.process_file().path(), content).expect("write pid file");
    }

    /// The next start behaves as if the daemon came up.
    pub(crate) fn daemon_comes_up(&self) {
        self.controller
            .detach()
            .daemon_records_pid_in(self.controller.process_file().path());
    }

    /// The next start behaves as if the daemon crashed during startup.
    pub(crate) fn daemon_crashes(&self) {
        self.controller
            .detach()
            .daemon_crashes_into(self.controller.log_file().path());
    }

    pub(crate) fn write_log(&self, content: &str) {
        std::fs::write(self.controller.log_file().path(), content).expect("write log");
    }

    pub(crate) fn groups(&self) -> &ScriptedGroups {
        self.controller.process_groups()
    }

    pub(crate) fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub(crate) fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }
}

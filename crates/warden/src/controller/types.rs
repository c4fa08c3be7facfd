//! Command, output and timing types shared by the controller flows.

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::time::Duration;

use warden_config::Config;

use super::error::ControlError;

/// Supported lifecycle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    /// Detach the daemon unless it is already running.
    Start,
    /// Escalate signals until the daemon exits.
    Stop,
    /// Stop, clear leftovers, then start.
    Restart,
    /// Report the daemon state.
    Status,
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => formatter.write_str("start"),
            Self::Stop => formatter.write_str("stop"),
            Self::Restart => formatter.write_str("restart"),
            Self::Status => formatter.write_str("status"),
        }
    }
}

/// Raised for anything other than the four lifecycle commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lifecycle command '{0}'")]
pub struct UnknownCommand(pub String);

impl FromStr for LifecycleCommand {
    type Err = UnknownCommand;

    fn from_str(command: &str) -> Result<Self, Self::Err> {
        match command {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "status" => Ok(Self::Status),
            other => Err(UnknownCommand(other.to_owned())),
        }
    }
}

/// Operator-facing output over any pair of writers.
pub struct ControlOutput<W: Write, E: Write> {
    /// Progress and status lines.
    pub stdout: W,
    /// Warnings and crash dumps.
    pub stderr: E,
}

impl<W: Write, E: Write> ControlOutput<W, E> {
    /// Wraps the two writers.
    pub const fn new(stdout: W, stderr: E) -> Self {
        Self { stdout, stderr }
    }

    /// Writes one line to stdout and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Output`] when the write fails.
    pub fn stdout_line(&mut self, args: fmt::Arguments<'_>) -> Result<(), ControlError> {
        self.stdout.write_fmt(args).map_err(ControlError::Output)?;
        self.stdout.write_all(b"\n").map_err(ControlError::Output)?;
        self.stdout.flush().map_err(ControlError::Output)
    }

    /// Writes one line to stderr and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Output`] when the write fails.
    pub fn stderr_line(&mut self, args: fmt::Arguments<'_>) -> Result<(), ControlError> {
        self.stderr.write_fmt(args).map_err(ControlError::Output)?;
        self.stderr.write_all(b"\n").map_err(ControlError::Output)?;
        self.stderr.flush().map_err(ControlError::Output)
    }
}

/// Bounds of the stop escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Graceful window after the interrupt.
    pub timeout: Duration,
    /// Liveness poll period, and the base escalation wait.
    pub poll_interval: Duration,
    /// Escalation attempts; the last sends kill.
    pub terminate_attempts: u32,
    /// Growth of the escalation wait across attempts.
    pub backoff: Duration,
}

impl StopPolicy {
    /// Wait after escalation attempt `attempt` (1-based): the poll interval
    /// plus the share `attempt / attempts` of the backoff.
    #[must_use]
    pub fn escalation_wait(&self, attempt: u32) -> Duration {
        let attempts = self.effective_attempts();
        let growth = self
            .backoff
            .checked_mul(attempt.min(attempts))
            .map_or(self.backoff, |scaled| scaled / attempts);
        self.poll_interval.saturating_add(growth)
    }

    /// Escalation attempts, never fewer than the single kill.
    #[must_use]
    pub fn effective_attempts(&self) -> u32 {
        self.terminate_attempts.max(1)
    }
}

/// Bounds of the startup poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPolicy {
    /// Pause before the first check.
    pub delay: Duration,
    /// Number of checks.
    pub attempts: u32,
    /// Pause between checks.
    pub poll_interval: Duration,
}

/// Timing of both controller flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSettings {
    /// Stop escalation bounds.
    pub stop: StopPolicy,
    /// Startup poll bounds.
    pub start: StartPolicy,
}

impl From<&Config> for ControlSettings {
    fn from(config: &Config) -> Self {
        Self {
            stop: StopPolicy {
                timeout: config.stop_timeout(),
                poll_interval: config.stop_poll_interval(),
                terminate_attempts: config.terminate_attempts(),
                backoff: config.stop_backoff(),
            },
            start: StartPolicy {
                delay: config.start_delay(),
                attempts: config.start_attempts(),
                poll_interval: config.start_poll_interval(),
            },
        }
    }
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("start", LifecycleCommand::Start)]
    #[case("stop", LifecycleCommand::Stop)]
    #[case("restart", LifecycleCommand::Restart)]
    #[case("status", LifecycleCommand::Status)]
    fn parses_and_displays_commands(#[case] text: &str, #[case] command: LifecycleCommand) {
        assert_eq!(text.parse::<LifecycleCommand>(), Ok(command));
        assert_eq!(command.to_string(), text);
    }

    #[rstest]
    #[case("")]
    #[case("Start")]
    #[case("reload")]
    fn rejects_other_commands(#[case] text: &str) {
        assert_eq!(
            text.parse::<LifecycleCommand>(),
            Err(UnknownCommand(text.to_owned()))
        );
    }

    fn policy(attempts: u32) -> StopPolicy {
        StopPolicy {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            terminate_attempts: attempts,
            backoff: Duration::from_secs(3),
        }
    }

    #[rstest]
    #[case(1, Duration::from_millis(700))]
    #[case(3, Duration::from_millis(1_900))]
    #[case(5, Duration::from_millis(3_100))]
    #[case(9, Duration::from_millis(3_100))]
    fn escalation_waits_grow_with_each_attempt(#[case] attempt: u32, #[case] expected: Duration) {
        assert_eq!(policy(5).escalation_wait(attempt), expected);
    }

    #[test]
    fn zero_attempts_still_allow_the_kill() {
        let policy = policy(0);
        assert_eq!(policy.effective_attempts(), 1);
        assert_eq!(policy.escalation_wait(1), Duration::from_millis(3_100));
    }

    #[test]
    fn settings_follow_configuration() {
        let config = Config {
            stop_timeout_ms: Some(250),
            terminate_attempts: Some(2),
            start_attempts: Some(7),
            ..Config::default()
        };
        let settings = ControlSettings::from(&config);
        assert_eq!(settings.stop.timeout, Duration::from_millis(250));
        assert_eq!(settings.stop.terminate_attempts, 2);
        assert_eq!(settings.start.attempts, 7);
        assert_eq!(settings.start.poll_interval, Duration::from_secs(1));
    }
}

//! TCP echo server supervised by `warden`.
//!
//! `warden-echo start` detaches the server into the background, `stop`
//! interrupts it and escalates until it exits, `restart` does both and
//! `status` reports what the pid file and the log say. Layout, stop policy
//! and logging come from the shared `WARDEN_*` configuration.

use std::ffi::OsString;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use ortho_config::OrthoConfig;
use thiserror::Error;
use warden::telemetry::{self, TelemetryError};
use warden::{ControlError, ControlOutput, Controller};
use warden_config::{Config, LayoutError};

mod echo;

use echo::EchoDaemon;

/// Command line of the echo daemon's controller.
#[derive(Parser, Debug)]
#[command(name = "warden-echo", disable_help_subcommand = true)]
struct Cli {
    /// Address the server listens on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    host: IpAddr,
    /// Port the server listens on.
    #[arg(long, default_value_t = 7007)]
    port: u16,
    /// One of `start`, `stop`, `restart` or `status`.
    #[arg(value_name = "COMMAND")]
    command: String,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Control(#[from] ControlError),
}

fn main() -> ExitCode {
    let mut output = ControlOutput::new(io::stdout(), io::stderr());
    match run(std::env::args_os().collect(), &mut output) {
        Ok(exit_code) => exit_code,
        Err(AppError::CliUsage(error)) if !error.use_stderr() => {
            let _ = write!(output.stdout, "{error}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            let _ = writeln!(output.stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn run<W: Write, E: Write>(
    args: Vec<OsString>,
    output: &mut ControlOutput<W, E>,
) -> Result<ExitCode, AppError> {
    let cli = Cli::try_parse_from(&args).map_err(AppError::CliUsage)?;
    // Flags belong to the echo server; configuration comes from the
    // environment and configuration files only.
    let program = args
        .into_iter()
        .next()
        .unwrap_or_else(|| OsString::from("warden-echo"));
    let config = Config::load_from_iter([program]).map_err(AppError::LoadConfiguration)?;
    let _telemetry = telemetry::initialise(&config)?;

    let daemon = EchoDaemon::new(SocketAddr::new(cli.host, cli.port));
    let mut controller = Controller::from_config(daemon, &config)?;
    Ok(controller.daemonize(&cli.command, output)?)
}

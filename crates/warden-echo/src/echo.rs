//! The echo server run inside the detached daemon.
//!
//! Connections are served one at a time. The listener is non-blocking so the
//! accept loop can notice the interrupt between connections.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, info, warn};
use warden::{Daemon, DaemonError, Notification};

const ECHO_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::echo");

/// Pause between accept attempts while no client is waiting.
const ACCEPT_POLL: Duration = Duration::from_millis(100);
/// A silent client is dropped after this long so the interrupt is honoured.
const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub(crate) struct EchoDaemon {
    address: SocketAddr,
    listener: Option<TcpListener>,
}

impl EchoDaemon {
    pub(crate) const fn new(address: SocketAddr) -> Self {
        Self {
            address,
            listener: None,
        }
    }

    #[cfg(test)]
    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }
}

impl Daemon for EchoDaemon {
    fn name(&self) -> String {
        env!("CARGO_PKG_NAME").to_owned()
    }

    fn startup(&mut self) -> Result<(), DaemonError> {
        let listener = TcpListener::bind(self.address)
            .map_err(|source| DaemonError::io(format!("binding {}", self.address), source))?;
        listener
            .set_nonblocking(true)
            .map_err(|source| DaemonError::io("configuring listener", source))?;
        info!(target: ECHO_TARGET, address = %self.address, "listening");
        self.listener = Some(listener);
        Ok(())
    }

    fn run(&mut self, interrupt: &Notification) -> Result<(), DaemonError> {
        let Some(listener) = self.listener.as_ref() else {
            return Err(DaemonError::failed("run called before startup"));
        };
        loop {
            if interrupt.is_signalled() {
                return Err(DaemonError::Interrupted);
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    debug!(target: ECHO_TARGET, %peer, "client connected");
                    if let Err(error) = echo(stream) {
                        warn!(target: ECHO_TARGET, %peer, %error, "client dropped");
                    }
                }
                Err(error) if error.kind() == ErrorKind::WouldBlock => {
                    interrupt.wait(Some(ACCEPT_POLL));
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(source) => return Err(DaemonError::io("accepting connection", source)),
            }
        }
    }

    fn shutdown(&mut self) -> Result<(), DaemonError> {
        if self.listener.take().is_some() {
            info!(target: ECHO_TARGET, address = %self.address, "listener closed");
        }
        Ok(())
    }
}

fn echo(stream: TcpStream) -> io::Result<u64> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CLIENT_IDLE_TIMEOUT))?;
    let mut reader = stream.try_clone()?;
    let mut writer = stream;
    io::copy(&mut reader, &mut writer)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, Shutdown};
    use std::sync::Arc;
    use std::thread;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn daemon() -> EchoDaemon {
        let mut daemon = EchoDaemon::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)));
        daemon.startup().expect("bind an ephemeral port");
        daemon
    }

    #[rstest]
    fn echoes_until_interrupted(mut daemon: EchoDaemon) {
        let address = daemon.local_addr().expect("bound address");
        let interrupt = Arc::new(Notification::new().expect("notification"));
        let server_interrupt = Arc::clone(&interrupt);
        let server = thread::spawn(move || {
            let result = daemon.run(&server_interrupt);
            daemon.shutdown().expect("shutdown");
            result
        });

        let mut client = TcpStream::connect(address).expect("connect");
        client.write_all(b"ping\n").expect("send");
        client.shutdown(Shutdown::Write).expect("half close");
        let mut reply = String::new();
        client.read_to_string(&mut reply).expect("receive");
        assert_eq!(reply, "ping\n");

        interrupt.signal();
        let result = server.join().expect("server thread");
        assert!(matches!(result, Err(DaemonError::Interrupted)));
    }

    #[rstest]
    fn shutdown_releases_the_listener(mut daemon: EchoDaemon) {
        daemon.shutdown().expect("shutdown");
        assert!(daemon.local_addr().is_none());
    }

    #[test]
    fn run_without_startup_fails() {
        let mut daemon = EchoDaemon::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)));
        let interrupt = Notification::new().expect("notification");
        let result = daemon.run(&interrupt);
        assert!(matches!(result, Err(DaemonError::Failed { .. })));
    }

    #[test]
    fn occupied_port_is_an_io_failure() {
        let holder = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        let address = holder.local_addr().expect("address");
        let mut daemon = EchoDaemon::new(address);
        let error = daemon.startup().expect_err("port already bound");
        assert_eq!(error.kind(), "IoError");
    }

    #[test]
    fn named_after_the_binary() {
        let daemon = EchoDaemon::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)));
        assert_eq!(daemon.name(), "warden-echo");
    }
}

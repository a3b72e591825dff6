//! Running a language server as a child process.
//!
//! Pipe I/O blocks, so each pipe gets a helper thread. The threads only move bytes: everything
//! they read is reported through one channel that the host drains on its own loop and hands to
//! the session synchronously.

use crate::config::ServerConfig;
use crate::session::Transport;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8 * 1024;
/// How long to wait for the exit status once stdout has closed.
const REAP_TIMEOUT: Duration = Duration::from_millis(500);
const REAP_POLL: Duration = Duration::from_millis(5);

/// Output of the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Raw bytes from stdout, in arrival order.
    Stdout(Vec<u8>),
    /// One line from stderr.
    Stderr(String),
    /// Stdout closed; the exit code when the process has already been reaped.
    Exited(Option<i32>),
}

enum Inbound {
    Stdout(Vec<u8>),
    Stderr(String),
    StdoutClosed,
}

/// A spawned server and its pipe threads.
pub struct ServerProcess {
    child: Child,
    command: String,
    outbound: mpsc::Sender<Vec<u8>>,
    inbound: mpsc::Receiver<Inbound>,
    exited: bool,
}

impl ServerProcess {
    /// Spawn the server described by `config` in its workspace root.
    pub fn spawn(config: &ServerConfig) -> io::Result<Self> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if config.root.is_dir() {
            command.current_dir(&config.root);
        }
        let process = Self::from_command(command)?;
        info!(
            "spawned language server `{}` (pid {})",
            config.command,
            process.id()
        );
        Ok(process)
    }

    /// Take over an already configured command. Stdio is replaced with pipes.
    pub fn from_command(mut command: Command) -> io::Result<Self> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let name = command.get_program().to_string_lossy().into_owned();
        let mut child = command.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("language server stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("language server stdout unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("language server stderr unavailable"))?;

        let (tx_out, rx_out) = mpsc::channel::<Vec<u8>>();
        let (tx_in, rx_in) = mpsc::channel::<Inbound>();

        thread::spawn(move || write_loop(stdin, rx_out));
        {
            let tx_in = tx_in.clone();
            thread::spawn(move || stdout_loop(stdout, tx_in));
        }
        thread::spawn(move || stderr_loop(stderr, tx_in));

        Ok(Self {
            child,
            command: name,
            outbound: tx_out,
            inbound: rx_in,
            exited: false,
        })
    }

    /// OS process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Program name the process was started with.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// A transport writing into the server's stdin.
    pub fn transport(&self) -> ChildTransport {
        ChildTransport {
            outbound: self.outbound.clone(),
        }
    }

    /// Next pending event, without blocking. Stderr lines still buffered after `Exited` are
    /// delivered too.
    pub fn try_next(&mut self) -> Option<ProcessEvent> {
        let inbound = self.inbound.try_recv().ok()?;
        Some(self.translate(inbound))
    }

    /// Like [`ServerProcess::try_next`], waiting up to `timeout` for an event.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<ProcessEvent> {
        let inbound = self.inbound.recv_timeout(timeout).ok()?;
        Some(self.translate(inbound))
    }

    fn translate(&mut self, inbound: Inbound) -> ProcessEvent {
        match inbound {
            Inbound::Stdout(bytes) => ProcessEvent::Stdout(bytes),
            Inbound::Stderr(line) => ProcessEvent::Stderr(line),
            Inbound::StdoutClosed => {
                self.exited = true;
                let code = self.reap();
                info!("language server exited ({code:?})");
                ProcessEvent::Exited(code)
            }
        }
    }

    /// Exit code of a process whose stdout has closed. A process that keeps running past
    /// [`REAP_TIMEOUT`] reports `None` and is left for [`ServerProcess::stop`].
    fn reap(&mut self) -> Option<i32> {
        let deadline = Instant::now() + REAP_TIMEOUT;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return status.code(),
                Ok(None) if Instant::now() < deadline => thread::sleep(REAP_POLL),
                Ok(None) => return None,
                Err(err) => {
                    warn!("failed to query language server status: {err}");
                    return None;
                }
            }
        }
    }

    /// Whether stdout has closed or the process was stopped.
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// Every event available right now, in order.
    pub fn drain(&mut self) -> Vec<ProcessEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Kill the process and reap it.
    pub fn stop(&mut self) {
        self.exited = true;
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }
        if let Err(err) = self.child.kill() {
            debug!("kill language server: {err}");
        }
        if let Err(err) = self.child.wait() {
            debug!("wait for language server: {err}");
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

/// [`Transport`] handing frames to the stdin writer thread.
#[derive(Debug, Clone)]
pub struct ChildTransport {
    outbound: mpsc::Sender<Vec<u8>>,
}

impl Transport for ChildTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.outbound.send(frame.to_vec()).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "language server stdin closed")
        })
    }
}

fn write_loop(stdin: ChildStdin, rx: mpsc::Receiver<Vec<u8>>) {
    let mut writer = io::BufWriter::new(stdin);
    for frame in rx {
        if let Err(err) = writer.write_all(&frame).and_then(|()| writer.flush()) {
            warn!("writing to language server failed: {err}");
            break;
        }
    }
}

fn stdout_loop(mut stdout: ChildStdout, tx: mpsc::Sender<Inbound>) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(Inbound::Stdout(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!("reading language server output failed: {err}");
                break;
            }
        }
    }
    let _ = tx.send(Inbound::StdoutClosed);
}

fn stderr_loop(stderr: ChildStderr, tx: mpsc::Sender<Inbound>) {
    for line in BufReader::new(stderr).lines() {
        let Ok(line) = line else {
            break;
        };
        if tx.send(Inbound::Stderr(line)).is_err() {
            break;
        }
    }
}

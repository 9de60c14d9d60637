//! Server manager - owns the single server process and its log reader

use std::ffi::OsString;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{EXIT_ADDR_IN_USE, ServerError};
use crate::net;
use crate::server::logger::{self, LogLine};

/// How many times a session is restarted on a fresh port after losing a bind race
pub const MAX_BIND_RETRIES: u32 = 5;

const STOP_GRACE: Duration = Duration::from_secs(3);
const LOGGER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Program and leading arguments used to start the server process.
/// `--dir`, `--port` and `--bind` are appended on every launch.
#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl Launcher {
    pub fn new<I, S>(program: impl Into<PathBuf>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-run our own executable in `serve` mode
    pub fn current_exe() -> Self {
        let exe = std::env::current_exe().unwrap_or_else(|_| "quickserve".into());
        Self::new(exe, ["serve"])
    }

    fn command(&self, folder: &Path, port: u16, bind: IpAddr) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("--dir")
            .arg(folder)
            .arg("--port")
            .arg(port.to_string())
            .arg("--bind")
            .arg(bind.to_string())
            .stdin(Stdio::null());
        cmd
    }
}

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub folder: PathBuf,
    pub preferred_port: u16,
    pub bind: IpAddr,
    pub max_port_search: u16,
}

/// What the GUI needs to know about the live session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub folder: PathBuf,
    /// Port the process was actually started on (may differ from the requested one)
    pub port: u16,
    pub bind: IpAddr,
    pub pid: u32,
    pub started_at: Instant,
}

#[derive(Debug)]
pub enum SessionEvent {
    /// The process lost its port and was restarted on another one
    Rebound { from: u16, to: u16, pid: u32 },
    /// The process exited on its own; the session is over
    Exited { port: u16, status: ExitStatus },
    /// The process lost its port and no replacement could be started
    RetryFailed { port: u16, error: ServerError },
    /// Its status could not be read; the process was killed and the session dropped
    Lost { port: u16, error: io::Error },
}

struct Session {
    info: SessionInfo,
    child: Child,
    logger: Option<JoinHandle<()>>,
    retries: u32,
    max_port_search: u16,
}

impl Session {
    fn join_logger(&mut self) {
        if let Some(handle) = self.logger.take() {
            logger::join_with_timeout(handle, LOGGER_JOIN_TIMEOUT);
        }
    }
}

pub struct ServerManager {
    launcher: Launcher,
    log_tx: Sender<LogLine>,
    session: Option<Session>,
}

impl ServerManager {
    pub fn new(launcher: Launcher, log_tx: Sender<LogLine>) -> Self {
        Self {
            launcher,
            log_tx,
            session: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref().map(|s| &s.info)
    }

    /// Validate the folder, pick a port and launch the server process
    pub fn start(&mut self, request: StartRequest) -> Result<SessionInfo, ServerError> {
        if let Some(session) = &self.session {
            return Err(ServerError::AlreadyRunning(session.info.port));
        }

        let folder = validate_folder(&request.folder)?;
        let port = net::select_port(request.preferred_port, request.bind, request.max_port_search)?;
        if port != request.preferred_port {
            info!(requested = request.preferred_port, port, "requested port busy");
        }

        let (child, logger) = self.spawn_process(&folder, port, request.bind)?;
        let info = SessionInfo {
            folder,
            port,
            bind: request.bind,
            pid: child.id(),
            started_at: Instant::now(),
        };
        info!(pid = info.pid, port, folder = %info.folder.display(), "server started");

        self.session = Some(Session {
            info: info.clone(),
            child,
            logger: Some(logger),
            retries: 0,
            max_port_search: request.max_port_search,
        });
        Ok(info)
    }

    /// Terminate the server process. Stopping with no session is a no-op.
    pub fn stop(&mut self) -> Result<Option<ExitStatus>, ServerError> {
        let Some(mut session) = self.session.take() else {
            return Ok(None);
        };

        let result = terminate(&mut session.child, STOP_GRACE);
        if result.is_err() {
            // signal path failed; make sure the process is gone
            let _ = session.child.kill();
            let _ = session.child.wait();
        }
        session.join_logger();

        match result {
            Ok(status) => {
                info!(pid = session.info.pid, %status, "server stopped");
                Ok(Some(status))
            }
            Err(e) => Err(ServerError::Stop(e)),
        }
    }

    /// Non-blocking check for process exit. Call once per UI frame.
    pub fn poll(&mut self) -> Option<SessionEvent> {
        let session = self.session.as_mut()?;
        let status = match session.child.try_wait() {
            Ok(Some(status)) => status,
            Ok(None) => return None,
            Err(error) => {
                let mut session = self.session.take()?;
                warn!(pid = session.info.pid, "error checking server status: {error}");
                let _ = session.child.kill();
                let _ = session.child.wait();
                session.join_logger();
                return Some(SessionEvent::Lost {
                    port: session.info.port,
                    error,
                });
            }
        };

        let mut session = self.session.take()?;
        session.join_logger();
        let port = session.info.port;

        if status.code() == Some(EXIT_ADDR_IN_USE) && session.retries < MAX_BIND_RETRIES {
            return Some(match self.rebind(session) {
                Ok(event) => event,
                Err(error) => SessionEvent::RetryFailed { port, error },
            });
        }

        info!(port, %status, "server exited");
        Some(SessionEvent::Exited { port, status })
    }

    fn rebind(&mut self, old: Session) -> Result<SessionEvent, ServerError> {
        let from = old.info.port;
        let next = from.checked_add(1).ok_or(ServerError::NoFreePort {
            start: from,
            end: from,
        })?;
        let to = net::find_free_port(next, old.info.bind, old.max_port_search)?;
        warn!(from, to, "port taken before the server could bind, retrying");

        let (child, logger) = self.spawn_process(&old.info.folder, to, old.info.bind)?;
        let pid = child.id();
        self.session = Some(Session {
            info: SessionInfo {
                port: to,
                pid,
                started_at: Instant::now(),
                ..old.info
            },
            child,
            logger: Some(logger),
            retries: old.retries + 1,
            max_port_search: old.max_port_search,
        });
        Ok(SessionEvent::Rebound { from, to, pid })
    }

    fn spawn_process(
        &self,
        folder: &Path,
        port: u16,
        bind: IpAddr,
    ) -> Result<(Child, JoinHandle<()>), ServerError> {
        // stdout and stderr share one pipe so a single reader sees them in order
        let (reader, writer) = io::pipe().map_err(ServerError::Spawn)?;
        let mut child = {
            let mut cmd = self.launcher.command(folder, port, bind);
            cmd.stdout(writer.try_clone().map_err(ServerError::Spawn)?)
                .stderr(writer);
            cmd.spawn().map_err(ServerError::Spawn)?
            // `cmd` drops here, closing our copies of the write end
        };

        match logger::spawn_logger(reader, self.log_tx.clone()) {
            Ok(handle) => Ok((child, handle)),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(ServerError::Spawn(e))
            }
        }
    }
}

impl Drop for ServerManager {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop server on shutdown: {e}");
        }
    }
}

fn validate_folder(folder: &Path) -> Result<PathBuf, ServerError> {
    if folder.as_os_str().is_empty() {
        return Err(ServerError::FolderNotSelected);
    }
    if !folder.is_dir() {
        return Err(ServerError::NotADirectory(folder.to_path_buf()));
    }
    Ok(folder.canonicalize().unwrap_or_else(|_| folder.to_path_buf()))
}

/// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps the child.
#[cfg(unix)]
fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    if let Err(e) = signal::kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
        if e == Errno::ESRCH {
            return child.wait();
        }
        return Err(io::Error::other(e));
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    warn!(pid = child.id(), "server ignored SIGTERM, killing");
    child.kill()?;
    child.wait()
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    child.kill()?;
    child.wait()
}

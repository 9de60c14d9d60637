//! Error types for the server manager (surfaced in the GUI) and the serve process

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no folder selected")]
    FolderNotSelected,

    #[error("'{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("no free port found in range {start}-{end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("a server is already running on port {0}")]
    AlreadyRunning(u16),

    #[error("could not start server process: {0}")]
    Spawn(#[source] io::Error),

    #[error("could not stop server process: {0}")]
    Stop(#[source] io::Error),
}

impl ServerError {
    /// Short dialog title for this error
    pub fn title(&self) -> &'static str {
        match self {
            Self::FolderNotSelected | Self::NotADirectory(_) => "Invalid folder",
            Self::NoFreePort { .. } => "No free port",
            Self::AlreadyRunning(_) => "Server running",
            Self::Spawn(_) => "Failed to start server",
            Self::Stop(_) => "Failed to stop server",
        }
    }

    /// Whether the error only needs a warning (user can fix it) rather than an error dialog
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::FolderNotSelected | Self::NotADirectory(_))
    }
}

/// Exit code the `serve` process uses when its port is taken
pub const EXIT_ADDR_IN_USE: i32 = 98;

/// Failures of the `serve` process itself, mapped to exit codes the manager understands
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("'{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("address {0} is already in use")]
    AddrInUse(SocketAddr),

    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("could not start async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

impl ServeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AddrInUse(_) => EXIT_ADDR_IN_USE,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_free_port_message() {
        let err = ServerError::NoFreePort { start: 8000, end: 8999 };
        assert_eq!(err.to_string(), "no free port found in range 8000-8999");
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_folder_errors_are_user_errors() {
        assert!(ServerError::FolderNotSelected.is_user_error());
        let err = ServerError::NotADirectory(PathBuf::from("/nope"));
        assert!(err.is_user_error());
        assert_eq!(err.title(), "Invalid folder");
        assert_eq!(err.to_string(), "'/nope' is not a directory");
    }

    #[test]
    fn test_serve_exit_codes() {
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(ServeError::AddrInUse(addr).exit_code(), EXIT_ADDR_IN_USE);
        let other = ServeError::Bind {
            addr,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(other.exit_code(), 1);
    }
}

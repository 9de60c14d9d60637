//! Server process management and the `serve` mode it launches

pub mod logger;
pub mod manager;
pub mod serve;

pub use logger::{LogLine, LogSource};
pub use manager::{Launcher, ServerManager, SessionEvent, SessionInfo, StartRequest};

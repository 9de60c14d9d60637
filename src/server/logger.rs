//! Background reader that forwards server process output to the GUI

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Where a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    /// Output of the server process
    Server,
    /// Lifecycle messages generated by this application
    System,
}

impl LogSource {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Server => "OUT",
            Self::System => "SYS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub source: LogSource,
    pub text: String,
}

impl LogLine {
    pub fn server(text: impl Into<String>) -> Self {
        Self {
            source: LogSource::Server,
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            source: LogSource::System,
            text: text.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source.tag(), self.text)
    }
}

/// Spawn the reader thread. It exits when the stream closes or the receiver is gone.
pub fn spawn_logger<R>(stream: R, tx: Sender<LogLine>) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("server-log".to_string())
        .spawn(move || forward_lines(stream, &tx))
}

/// Forward each line of `stream` in order. Invalid UTF-8 is replaced, not fatal.
pub fn forward_lines<R: Read>(stream: R, tx: &Sender<LogLine>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim_end_matches(['\n', '\r']);
                if tx.send(LogLine::server(text)).is_err() {
                    debug!("log receiver dropped, stopping reader");
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(LogLine::system(format!("Logger thread error: {e}")));
                break;
            }
        }
    }
    debug!("server output closed");
}

/// Join the reader, giving up (and detaching it) after `timeout`
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("log reader did not finish within {timeout:?}, detaching");
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    if handle.join().is_err() {
        warn!("log reader panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc;

    #[test]
    fn test_lines_forwarded_in_order() {
        let input: String = (0..200).map(|i| format!("line {i}\n")).collect();
        let (tx, rx) = mpsc::channel();

        let handle = spawn_logger(Cursor::new(input.into_bytes()), tx).unwrap();
        assert!(join_with_timeout(handle, Duration::from_secs(5)));

        let lines: Vec<String> = rx.try_iter().map(|l| l.text).collect();
        let expected: Vec<String> = (0..200).map(|i| format!("line {i}")).collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_crlf_and_invalid_utf8() {
        let (tx, rx) = mpsc::channel();
        forward_lines(Cursor::new(b"first\r\nbad \xff byte\nlast".to_vec()), &tx);

        let lines: Vec<LogLine> = rx.try_iter().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "first");
        assert_eq!(lines[1].text, "bad \u{FFFD} byte");
        assert_eq!(lines[2].text, "last");
        assert!(lines.iter().all(|l| l.source == LogSource::Server));
    }

    #[test]
    fn test_reader_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        forward_lines(Cursor::new(b"a\nb\n".to_vec()), &tx);
    }

    #[test]
    fn test_display_tags() {
        assert_eq!(LogLine::server("GET /").to_string(), "[OUT] GET /");
        assert_eq!(LogLine::system("started").to_string(), "[SYS] started");
    }
}

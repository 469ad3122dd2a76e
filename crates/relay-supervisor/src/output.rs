//! Draining a child's stdout/stderr into the supervisor log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

/// Substrings (lowercase) that mark an output line as an error.
pub const ERROR_KEYWORDS: &[&str] = &["error", "exception", "traceback", "failed", "critical"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Stdout,
    Stderr,
}

/// Health flag shared between a process entry and its drain tasks.
#[derive(Debug)]
pub struct ProcessHealth {
    healthy: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl Default for ProcessHealth {
    fn default() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            last_error: Mutex::new(None),
        }
    }
}

impl ProcessHealth {
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mark_unhealthy(&self, line: impl Into<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(line.into());
        self.healthy.store(false, Ordering::Release);
    }

    /// Fresh process: healthy again, last error kept for diagnostics.
    pub fn reset(&self) {
        self.healthy.store(true, Ordering::Release);
    }
}

pub fn is_error_line(line: &str, origin: Origin) -> bool {
    if origin == Origin::Stderr {
        return true;
    }
    let lower = line.to_lowercase();
    ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Strip ANSI escape codes and trailing whitespace from a raw line.
pub fn clean_line(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).trim_end().to_string()
}

/// Read `stream` line by line until EOF, mirroring every line and flagging
/// error lines on `health`.
pub async fn drain<R>(name: String, stream: R, origin: Origin, health: std::sync::Arc<ProcessHealth>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = clean_line(&buf);
                if line.is_empty() {
                    continue;
                }
                if is_error_line(&line, origin) {
                    warn!(bot = %name, "{line}");
                    health.mark_unhealthy(line);
                } else {
                    info!(bot = %name, "{line}");
                }
            }
            Err(e) => {
                debug!(bot = %name, error = %e, "output stream closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn keywords_are_case_insensitive() {
        assert!(is_error_line("Traceback (most recent call last):", Origin::Stdout));
        assert!(is_error_line("request FAILED", Origin::Stdout));
        assert!(!is_error_line("READY alpha", Origin::Stdout));
        assert!(is_error_line("READY alpha", Origin::Stderr));
    }

    #[test]
    fn ansi_is_stripped() {
        assert_eq!(clean_line(b"\x1b[32m INFO\x1b[0m ready\r\n"), " INFO ready");
    }

    #[tokio::test]
    async fn drain_flags_error_lines() {
        let health = Arc::new(ProcessHealth::default());
        let input: &[u8] = b"starting\nall good\nConnection Error: refused\nafter\n";
        drain("alpha".into(), input, Origin::Stdout, health.clone()).await;
        assert!(!health.is_healthy());
        assert_eq!(health.last_error().as_deref(), Some("Connection Error: refused"));

        health.reset();
        assert!(health.is_healthy());
        assert!(health.last_error().is_some());
    }

    #[tokio::test]
    async fn clean_stdout_stays_healthy() {
        let health = Arc::new(ProcessHealth::default());
        let input: &[u8] = b"one\ntwo";
        drain("alpha".into(), input, Origin::Stdout, health.clone()).await;
        assert!(health.is_healthy());
    }
}

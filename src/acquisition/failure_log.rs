//! Rate-limited logging for datagram parse failures.
//!
//! A packet flood of garbage must not turn into a log flood: at most one
//! warning is emitted per window, carrying the number of failures that were
//! swallowed since the previous one.

use std::time::{Duration, Instant};

pub struct ParseFailureLog {
    window: Duration,
    last_logged: Option<Instant>,
    suppressed: u64,
}

impl ParseFailureLog {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_logged: None,
            suppressed: 0,
        }
    }

    /// Record a failure at `now`.
    ///
    /// Returns `Some(suppressed)` when the caller should log this failure,
    /// where `suppressed` counts the failures dropped silently since the last
    /// logged one. Returns `None` while inside the window.
    pub fn record(&mut self, now: Instant) -> Option<u64> {
        let due = self
            .last_logged
            .map_or(true, |last| now.saturating_duration_since(last) >= self.window);
        if due {
            self.last_logged = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }

    /// Failures swallowed since the last logged one.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

/// Emit a parse failure warning unless rate-limited.
pub(crate) fn warn_parse_failure(
    log: &mut ParseFailureLog,
    peer: std::net::SocketAddr,
    len: usize,
    error: &super::ParseError,
) {
    if let Some(suppressed) = log.record(Instant::now()) {
        tracing::warn!(
            peer = %peer,
            bytes = len,
            suppressed,
            error = %error,
            "Dropping malformed telemetry datagram"
        );
    }
}

//! Session tracking
//!
//! Tracks session identity and the last-seen sequence number, and decides
//! resume-vs-reidentify on reconnect. The connection driver is the sole
//! writer; the lock only guards against concurrent readers.

use parking_lot::Mutex;

/// Outcome of recording a sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// The sequence advanced; the event is new and should be delivered
    Applied,
    /// Replay of the last recorded sequence; drop the event, not an error
    Duplicate,
}

/// A sequence number arrived below the last recorded one
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("sequence regression: got {got}, last recorded {last}")]
pub struct SequenceError {
    pub got: u64,
    pub last: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    session_id: Option<String>,
    sequence: Option<u64>,
    resume_url: Option<String>,
    last_close_resumable: bool,
}

/// Tracks the resumable session across reconnects
#[derive(Debug, Default)]
pub struct SessionManager {
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// Create an empty session manager; the first connect always identifies
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched sequence number
    ///
    /// Only monotonic non-decreasing updates are applied. Replaying the last
    /// recorded value is idempotent; anything lower is a protocol violation
    /// surfaced to the caller.
    pub fn record_sequence(&self, sequence: u64) -> Result<SequenceOutcome, SequenceError> {
        let mut state = self.state.lock();
        match state.sequence {
            Some(last) if sequence < last => Err(SequenceError { got: sequence, last }),
            Some(last) if sequence == last => Ok(SequenceOutcome::Duplicate),
            _ => {
                state.sequence = Some(sequence);
                Ok(SequenceOutcome::Applied)
            }
        }
    }

    /// Store session identity from the READY payload
    pub fn establish(&self, session_id: impl Into<String>, resume_url: impl Into<String>) {
        let mut state = self.state.lock();
        state.session_id = Some(session_id.into());
        state.resume_url = Some(resume_url.into());
        state.last_close_resumable = true;
    }

    /// Record how the last connection ended
    pub fn mark_closed(&self, resumable: bool) {
        self.state.lock().last_close_resumable = resumable;
    }

    /// Whether the next connect may resume instead of identifying
    ///
    /// True only if a session exists, a sequence has been recorded, and the
    /// last close was resumable.
    #[must_use]
    pub fn resumable(&self) -> bool {
        let state = self.state.lock();
        state.session_id.is_some() && state.sequence.is_some() && state.last_close_resumable
    }

    /// Session id and last sequence for building a Resume frame
    #[must_use]
    pub fn resume_info(&self) -> Option<(String, u64)> {
        let state = self.state.lock();
        Some((state.session_id.clone()?, state.sequence?))
    }

    /// Cached endpoint for resuming, if the session advertised one
    #[must_use]
    pub fn resume_url(&self) -> Option<String> {
        self.state.lock().resume_url.clone()
    }

    /// Last recorded sequence number
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.state.lock().sequence
    }

    /// Clear all session state, forcing a full identify on the next connect
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.session_id = None;
        state.sequence = None;
        state.resume_url = None;
        state.last_close_resumable = false;
        tracing::debug!("Session invalidated, next connect will identify");
    }
}

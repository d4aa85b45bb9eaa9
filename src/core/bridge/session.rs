use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle of a call. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Legs are up, telephony `start` not seen yet.
    Connecting,
    /// Stream id known; audio flows both ways.
    Active,
    /// Teardown in progress.
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct SessionInner {
    call_id: String,
    started_at: OffsetDateTime,
    state: RwLock<SessionState>,
    provider_call_sid: RwLock<Option<String>>,
    stream_id: watch::Sender<Option<String>>,
    cancel: CancellationToken,
}

/// Shared handle to one call.
///
/// The bridge drives it; the registry and admin routes only observe it or
/// ask it to hang up.
#[derive(Debug, Clone)]
pub struct CallSession {
    inner: Arc<SessionInner>,
}

/// Point-in-time view for the calls API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub call_id: String,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_call_sid: Option<String>,
    pub started_at: String,
}

impl CallSession {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self::started(call_id, OffsetDateTime::now_utc())
    }

    pub(crate) fn started(call_id: impl Into<String>, started_at: OffsetDateTime) -> Self {
        let (stream_id, _) = watch::channel(None);
        Self {
            inner: Arc::new(SessionInner {
                call_id: call_id.into(),
                started_at,
                state: RwLock::new(SessionState::Connecting),
                provider_call_sid: RwLock::new(None),
                stream_id,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.inner.call_id
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.inner.started_at
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    pub fn stream_id(&self) -> Option<String> {
        self.inner.stream_id.borrow().clone()
    }

    /// Observe the stream id becoming known.
    pub fn subscribe_stream_id(&self) -> watch::Receiver<Option<String>> {
        self.inner.stream_id.subscribe()
    }

    /// Record the telephony stream id and move to `Active`.
    pub fn start_stream(&self, stream_id: String, provider_call_sid: Option<String>) {
        *self.inner.provider_call_sid.write() = provider_call_sid;
        self.inner.stream_id.send_replace(Some(stream_id));
        self.advance(SessionState::Active);
    }

    /// Token cancelled when the session begins closing.
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn is_closing(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Ask the bridge to end the call.
    pub fn hang_up(&self) {
        debug!(call_id = %self.inner.call_id, "Hang-up requested");
        self.inner.cancel.cancel();
    }

    pub(crate) fn begin_close(&self) {
        self.advance(SessionState::Closing);
        self.inner.cancel.cancel();
    }

    pub(crate) fn mark_closed(&self) {
        self.advance(SessionState::Closed);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            call_id: self.inner.call_id.clone(),
            state: self.state(),
            stream_id: self.stream_id(),
            provider_call_sid: self.inner.provider_call_sid.read().clone(),
            started_at: self.inner.started_at.format(&Rfc3339).unwrap_or_default(),
        }
    }

    fn advance(&self, next: SessionState) {
        let mut state = self.inner.state.write();
        if next > *state {
            debug!(call_id = %self.inner.call_id, from = %*state, to = %next, "Session state change");
            *state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_only_moves_forward() {
        let session = CallSession::new("c1");
        assert_eq!(session.state(), SessionState::Connecting);

        session.begin_close();
        assert_eq!(session.state(), SessionState::Closing);

        // A late start must not reopen the session.
        session.start_stream("MZ1".into(), None);
        assert_eq!(session.state(), SessionState::Closing);

        session.mark_closed();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_stream_id_is_observable() {
        let session = CallSession::new("c1");
        let mut rx = session.subscribe_stream_id();
        assert!(rx.borrow().is_none());

        session.start_stream("MZ9".into(), Some("CA1".into()));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref(), Some("MZ9"));

        let snap = session.snapshot();
        assert_eq!(snap.state, SessionState::Active);
        assert_eq!(snap.provider_call_sid.as_deref(), Some("CA1"));
    }

    #[test]
    fn test_hang_up_cancels() {
        let session = CallSession::new("c1");
        let token = session.cancel_token();
        session.hang_up();
        assert!(token.is_cancelled());
        assert!(session.is_closing());
    }
}

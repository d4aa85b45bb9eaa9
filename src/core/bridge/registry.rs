use dashmap::DashMap;

use super::{CallSession, SessionSnapshot};

/// Live call sessions by call id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, CallSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: CallSession) {
        self.sessions
            .insert(session.call_id().to_string(), session);
    }

    pub fn remove(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.remove(call_id).map(|(_, session)| session)
    }

    pub fn get(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.get(call_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshots sorted by start time, then call id.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<CallSession> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| {
            a.started_at()
                .cmp(&b.started_at())
                .then_with(|| a.call_id().cmp(b.call_id()))
        });
        sessions.iter().map(CallSession::snapshot).collect()
    }

    /// Request hang-up of one call. Returns false if the call is unknown.
    pub fn hang_up(&self, call_id: &str) -> bool {
        match self.get(call_id) {
            Some(session) => {
                session.hang_up();
                true
            }
            None => false,
        }
    }

    /// Request hang-up of every call.
    pub fn hang_up_all(&self) -> usize {
        let sessions: Vec<CallSession> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for session in &sessions {
            session.hang_up();
        }
        sessions.len()
    }
}

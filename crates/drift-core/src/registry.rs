use std::collections::HashSet;

use uuid::Uuid;

use drift_types::models::{ChatMode, ClientState};

/// One connected anonymous participant. Owned exclusively by the engine's
/// registry map; everything else refers to it by id.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: Uuid,
    pub mode: ChatMode,
    pub interests: HashSet<String>,
    pub state: ClientState,
}

impl ClientHandle {
    pub fn new(id: Uuid, mode: ChatMode, interests: HashSet<String>) -> Self {
        Self {
            id,
            mode,
            interests,
            state: ClientState::Idle,
        }
    }

    /// Session this client is currently paired into, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        match self.state {
            ClientState::Paired { session_id } => Some(session_id),
            _ => None,
        }
    }

    /// Preference changes are only allowed before a session exists —
    /// a paired client cannot change the terms it matched under.
    pub fn can_update_preferences(&self) -> bool {
        matches!(self.state, ClientState::Idle | ClientState::Queued)
    }
}

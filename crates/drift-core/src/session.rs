use chrono::{DateTime, Utc};
use uuid::Uuid;

use drift_types::models::{ChatMode, PartnerLeftReason, SessionState};

/// Why a session is being torn down. Carries the member that initiated it.
#[derive(Debug, Clone, Copy)]
pub enum EndCause {
    Skipped { by: Uuid },
    Reported { by: Uuid },
    Disconnected { by: Uuid },
}

impl EndCause {
    pub fn initiator(&self) -> Uuid {
        match *self {
            EndCause::Skipped { by }
            | EndCause::Reported { by }
            | EndCause::Disconnected { by } => by,
        }
    }

    /// Reason delivered to the remaining member.
    pub fn partner_left_reason(&self) -> PartnerLeftReason {
        match self {
            EndCause::Skipped { .. } => PartnerLeftReason::Skipped,
            EndCause::Reported { .. } => PartnerLeftReason::Reported,
            EndCause::Disconnected { .. } => PartnerLeftReason::Disconnected,
        }
    }
}

/// A paired conversation between exactly two clients.
///
/// The state machine is Connecting -> Active -> Ending -> Ended. Text
/// sessions skip straight to Active; video sessions hold in Connecting until
/// both members have signaled (or the connect timeout promotes them).
/// Transition methods reject anything else, so lifecycle races collapse into
/// no-ops instead of corrupting state.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub members: [Uuid; 2],
    pub mode: ChatMode,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Intersection of both members' interest tags at pairing time.
    /// Display-only; the relay ignores it.
    pub shared_interests: Vec<String>,
    signaled: [bool; 2],
}

impl Session {
    pub fn new(a: Uuid, b: Uuid, mode: ChatMode, shared_interests: Vec<String>) -> Self {
        let state = match mode {
            ChatMode::Text => SessionState::Active,
            ChatMode::Video => SessionState::Connecting,
        };
        Self {
            id: Uuid::new_v4(),
            members: [a, b],
            mode,
            state,
            created_at: Utc::now(),
            ended_at: None,
            shared_interests,
            signaled: [false, false],
        }
    }

    pub fn is_member(&self, id: Uuid) -> bool {
        self.members.contains(&id)
    }

    /// The other member of the pair.
    pub fn peer_of(&self, id: Uuid) -> Option<Uuid> {
        if self.members[0] == id {
            Some(self.members[1])
        } else if self.members[1] == id {
            Some(self.members[0])
        } else {
            None
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Connecting | SessionState::Active)
    }

    /// Record that `sender` produced a signaling envelope. Once both members
    /// have signaled, the session goes Active. Returns true on promotion.
    pub fn note_signal(&mut self, sender: Uuid) -> bool {
        if self.state != SessionState::Connecting {
            return false;
        }
        if self.members[0] == sender {
            self.signaled[0] = true;
        } else if self.members[1] == sender {
            self.signaled[1] = true;
        }
        if self.signaled == [true, true] {
            self.state = SessionState::Active;
            return true;
        }
        false
    }

    /// Connecting -> Active (connect-timeout path). Returns false if the
    /// session already moved on.
    pub fn promote(&mut self) -> bool {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Active;
            true
        } else {
            false
        }
    }

    /// Connecting/Active -> Ending. Returns false if teardown already
    /// started, which makes concurrent skip/disconnect safe to race.
    pub fn begin_ending(&mut self) -> bool {
        if self.is_open() {
            self.state = SessionState::Ending;
            true
        } else {
            false
        }
    }

    /// Ending -> Ended. Sets `ended_at`. Only valid once both members'
    /// post-session transitions have been resolved.
    pub fn finalize(&mut self) {
        debug_assert_eq!(self.state, SessionState::Ending);
        self.state = SessionState::Ended;
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_sessions_start_active() {
        let s = Session::new(Uuid::new_v4(), Uuid::new_v4(), ChatMode::Text, vec![]);
        assert_eq!(s.state, SessionState::Active);
    }

    #[test]
    fn video_sessions_activate_after_both_signal() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut s = Session::new(a, b, ChatMode::Video, vec![]);
        assert_eq!(s.state, SessionState::Connecting);

        assert!(!s.note_signal(a));
        assert_eq!(s.state, SessionState::Connecting);
        assert!(s.note_signal(b));
        assert_eq!(s.state, SessionState::Active);
    }

    #[test]
    fn promote_is_noop_once_active() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut s = Session::new(a, b, ChatMode::Video, vec![]);
        assert!(s.promote());
        assert!(!s.promote());
        assert_eq!(s.state, SessionState::Active);
    }

    #[test]
    fn teardown_happens_once() {
        let mut s = Session::new(Uuid::new_v4(), Uuid::new_v4(), ChatMode::Text, vec![]);
        assert!(s.begin_ending());
        assert!(!s.begin_ending());
        s.finalize();
        assert_eq!(s.state, SessionState::Ended);
        assert!(s.ended_at.is_some());
    }

    #[test]
    fn peer_lookup() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let s = Session::new(a, b, ChatMode::Text, vec![]);
        assert_eq!(s.peer_of(a), Some(b));
        assert_eq!(s.peer_of(b), Some(a));
        assert_eq!(s.peer_of(Uuid::new_v4()), None);
    }
}

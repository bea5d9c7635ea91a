use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMode, PartnerLeftReason, SignalEnvelope};

/// Events sent FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    /// Server confirms the connection and assigns an anonymous id
    Ready { client_id: Uuid },

    /// A partner was found and a session opened
    Matched {
        session_id: Uuid,
        mode: ChatMode,
        shared_interests: Vec<String>,
    },

    /// The partner sent a chat message
    MessageReceived {
        session_id: Uuid,
        sender_id: Uuid,
        text: String,
        sent_at: chrono::DateTime<chrono::Utc>,
    },

    /// The partner sent a WebRTC signaling payload (video sessions)
    SignalReceived {
        session_id: Uuid,
        envelope: SignalEnvelope,
    },

    /// The partner left the session
    PartnerLeft {
        session_id: Uuid,
        reason: PartnerLeftReason,
    },

    /// The session was finalized
    SessionEnded { session_id: Uuid },

    /// A command failed; the connection stays open
    Error { message: String },
}

/// Commands sent FROM client TO server over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientCommand {
    /// First frame on every connection: declare mode and interests
    Connect {
        mode: ChatMode,
        #[serde(default)]
        interests: Vec<String>,
    },

    /// Update mode/interests; rejected while paired
    SetPreferences {
        mode: ChatMode,
        #[serde(default)]
        interests: Vec<String>,
    },

    /// Enter the matchmaking queue
    FindPartner,

    /// Send a chat message to the current partner
    SendMessage { text: String },

    /// Relay a signaling payload to the current partner (video only)
    SendSignal { envelope: SignalEnvelope },

    /// Leave the current session and re-queue
    Skip,

    /// Report the current partner and re-queue
    Report { reason: String },

    /// Leave the service entirely
    Disconnect,
}

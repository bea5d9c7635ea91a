use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat mode declared at connect time. Text and video clients never
/// cross-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Text,
    Video,
}

/// Lifecycle state of a connected client. `Paired` carries the session
/// back-reference; it is cleared when the session is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ClientState {
    Idle,
    Queued,
    Paired { session_id: Uuid },
    Disconnected,
}

/// Session lifecycle. `Connecting` only occurs for video sessions while
/// signaling is in flight; text sessions start out `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Active,
    Ending,
    Ended,
}

/// Why a client's partner left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerLeftReason {
    Skipped,
    Disconnected,
    Reported,
}

/// An abuse report tied to a session. Append-only: once filed it is never
/// edited, only surfaced to an external moderation consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub session_id: Uuid,
    pub reporter_id: Uuid,
    pub reported_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Opaque WebRTC signaling payload (offer/answer/ICE candidate).
/// The server routes it between session members but never inspects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalEnvelope(pub serde_json::Value);

/// Interest tags as entered by the client, normalized to trimmed,
/// non-empty strings.
pub fn normalize_interests<I, S>(raw: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_empty_and_trims() {
        let tags = normalize_interests(["  Music ", "", "Art", "   "]);
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("Music"));
        assert!(tags.contains("Art"));
    }
}

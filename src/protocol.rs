use crate::types::PlayerId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Intent messages non-host clients append to the shared event log. The host
/// consumes, deduplicates and validates them; senders get no reply beyond
/// the next snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    JoinRequest {
        name: String,
    },
    /// Reserved tag; present in the vocabulary but not emitted by the core
    /// flow.
    JoinResponse,
    /// Reserved tag; snapshots travel through the state slot, not the log.
    StateUpdate,
    SubmitClue {
        word: String,
    },
    SubmitVote {
        #[serde(rename = "targetId")]
        target_id: PlayerId,
    },
    ClearVote,
    ReadyForRound,
    PlayerLeave,
}

impl EventKind {
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::JoinRequest { .. } => "join-request",
            EventKind::JoinResponse => "join-response",
            EventKind::StateUpdate => "state-update",
            EventKind::SubmitClue { .. } => "submit-clue",
            EventKind::SubmitVote { .. } => "submit-vote",
            EventKind::ClearVote => "clear-vote",
            EventKind::ReadyForRound => "ready-for-round",
            EventKind::PlayerLeave => "player-leave",
        }
    }
}

/// Envelope for one log entry: type-specific payload plus origin and a
/// server-assigned timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: i64,
    #[serde(rename = "playerId")]
    pub player_id: PlayerId,
}

impl GameEvent {
    pub fn new(kind: EventKind, player_id: PlayerId, timestamp: i64) -> Self {
        Self {
            kind,
            timestamp,
            player_id,
        }
    }

    /// Opaque identity of a delivered event, derived from its log position,
    /// type, origin and timestamp. Redelivery of the same entry hashes to
    /// the same key, which is what makes at-least-once delivery safe.
    pub fn dedup_key(&self, log_position: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(log_position.to_be_bytes());
        hasher.update(self.kind.tag().as_bytes());
        hasher.update(self.player_id.as_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// A client ignores events it authored itself, except the kinds the host
    /// must apply no matter who sent them.
    pub fn requires_host_processing(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubmitClue { .. }
                | EventKind::SubmitVote { .. }
                | EventKind::ClearVote
                | EventKind::ReadyForRound
        )
    }

    /// Fail-closed decode of a raw log entry.
    pub fn from_value(value: serde_json::Value) -> Option<GameEvent> {
        serde_json::from_value(value).ok()
    }
}

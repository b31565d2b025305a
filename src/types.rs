use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque ID types for type safety
pub type PlayerId = String;
pub type ClueId = String;
pub type RoomCode = String;

/// Boundary limits enforced when events enter the state machine
pub const MAX_NAME_CHARS: usize = 18;
pub const MAX_CLUE_CHARS: usize = 30;
pub const MIN_PLAYERS: usize = 3;
pub const MAX_PLAYERS: usize = 6;

/// Seconds the word-reveal countdown runs before the host commits BeginClue
pub const REVEAL_COUNTDOWN_SECS: u64 = 10;

/// Clue auto-submitted for a speaker whose turn timer expires
pub const PLACEHOLDER_CLUE: &str = "...";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum GamePhase {
    #[default]
    Lobby,
    WordReveal,
    Clue,
    Voting,
    Reveal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Impostor,
    Civilians,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub is_impostor: bool,
    pub alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<PlayerId>,
    pub ready_for_round: bool,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            is_host: false,
            is_impostor: false,
            alive: true,
            clue: None,
            vote: None,
            ready_for_round: false,
        }
    }
}

impl Player {
    pub fn new(id: PlayerId, name: String, is_host: bool) -> Self {
        Self {
            id,
            name,
            is_host,
            ..Default::default()
        }
    }
}

/// One clue given by one player in one round. Immutable once appended; only a
/// full game reset removes clues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Clue {
    pub id: ClueId,
    pub player_id: PlayerId,
    pub word: String,
    pub round: u32,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Elimination {
    pub target_id: PlayerId,
    pub was_impostor: bool,
}

/// The single authoritative aggregate for a room. Mutated only by the host;
/// every mutation produces a fresh snapshot with a strictly larger
/// `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    pub code: RoomCode,
    pub topic: String,
    pub secret_word: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_player_clue: Option<String>,
    pub show_clue: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voting_time_limit: Option<u32>,
    pub host_id: PlayerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impostor_id: Option<PlayerId>,
    /// Arrival order; the canonical ring for turn derivation. Stable for the
    /// whole session.
    pub players: Vec<Player>,
    pub phase: GamePhase,
    /// -1 means "none / compute from first_speaker_index"
    pub current_turn_index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_speaker_index: Option<usize>,
    pub round: u32,
    pub clues: Vec<Clue>,
    pub votes: HashMap<PlayerId, PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elimination: Option<Elimination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    pub updated_at: i64,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            code: String::new(),
            topic: String::new(),
            secret_word: String::new(),
            selected_player_clue: None,
            show_clue: false,
            time_limit: None,
            voting_time_limit: None,
            host_id: String::new(),
            impostor_id: None,
            players: Vec::new(),
            phase: GamePhase::Lobby,
            current_turn_index: -1,
            first_speaker_index: None,
            round: 0,
            clues: Vec::new(),
            votes: HashMap::new(),
            elimination: None,
            winner: None,
            updated_at: 0,
        }
    }
}

impl GameState {
    /// Decode a raw snapshot read from the shared store. Missing fields are
    /// backfilled with defaults; structurally invalid payloads (wrong types,
    /// no room code, no host) are rejected rather than guessed at.
    pub fn from_value(value: serde_json::Value) -> Option<GameState> {
        let mut state: GameState = serde_json::from_value(value).ok()?;
        if state.code.is_empty() || state.host_id.is_empty() {
            return None;
        }
        state.normalize();
        Some(state)
    }

    /// Re-derive denormalized fields after any raw read. `is_impostor` is
    /// never trusted from the wire, votes from non-alive voters are
    /// discarded, and an out-of-range turn index falls back to -1.
    pub fn normalize(&mut self) {
        for player in &mut self.players {
            player.is_impostor = self.impostor_id.as_deref() == Some(player.id.as_str());
        }
        let alive: std::collections::HashSet<PlayerId> = self
            .players
            .iter()
            .filter(|p| p.alive)
            .map(|p| p.id.clone())
            .collect();
        self.votes.retain(|voter, _| alive.contains(voter));
        if self.current_turn_index >= self.players.len() as i32 {
            self.current_turn_index = -1;
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_index(&self, id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }
}

/// Room code charset: one uppercase letter followed by two digits, e.g. `A12`.
/// Generated client-side at creation; collisions are not checked.
pub fn generate_room_code() -> RoomCode {
    use rand::Rng;
    let mut rng = rand::rng();
    let letter = (b'A' + rng.random_range(0..26u8)) as char;
    format!("{}{:02}", letter, rng.random_range(0..100u8))
}

/// Validate a display name at the join boundary. Returns the trimmed name,
/// or None for empty/over-length input.
pub fn valid_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_CHARS {
        return None;
    }
    Some(trimmed.to_string())
}

/// Validate clue text. Returns the trimmed word, or None for empty or
/// over-length input.
pub fn valid_clue(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_CLUE_CHARS {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_code_format() {
        for _ in 0..50 {
            let code = generate_room_code();
            let chars: Vec<char> = code.chars().collect();
            assert_eq!(chars.len(), 3);
            assert!(chars[0].is_ascii_uppercase());
            assert!(chars[1].is_ascii_digit());
            assert!(chars[2].is_ascii_digit());
        }
    }

    #[test]
    fn test_from_value_backfills_missing_fields() {
        let state = GameState::from_value(json!({
            "code": "A12",
            "hostId": "p1",
        }))
        .expect("minimal snapshot should decode");

        assert_eq!(state.phase, GamePhase::Lobby);
        assert_eq!(state.current_turn_index, -1);
        assert_eq!(state.round, 0);
        assert!(state.players.is_empty());
        assert!(state.votes.is_empty());
    }

    #[test]
    fn test_from_value_rejects_invalid_payloads() {
        // Wrong type for players: fail closed, not guess
        assert!(GameState::from_value(json!({
            "code": "A12",
            "hostId": "p1",
            "players": "not a list",
        }))
        .is_none());

        // No room code
        assert!(GameState::from_value(json!({ "hostId": "p1" })).is_none());

        // Not an object at all
        assert!(GameState::from_value(json!(42)).is_none());
    }

    #[test]
    fn test_normalize_rederives_is_impostor() {
        let mut state = GameState::default();
        state.code = "B07".into();
        state.host_id = "p1".into();
        state.impostor_id = Some("p2".into());
        state.players = vec![
            // Partial write claims p1 is the impostor; impostor_id wins
            Player {
                is_impostor: true,
                ..Player::new("p1".into(), "Ana".into(), true)
            },
            Player::new("p2".into(), "Ben".into(), false),
        ];

        state.normalize();

        assert!(!state.players[0].is_impostor);
        assert!(state.players[1].is_impostor);
    }

    #[test]
    fn test_normalize_drops_votes_from_dead_and_unknown_voters() {
        let mut state = GameState::default();
        state.code = "C33".into();
        state.host_id = "p1".into();
        state.players = vec![
            Player::new("p1".into(), "Ana".into(), true),
            Player {
                alive: false,
                ..Player::new("p2".into(), "Ben".into(), false)
            },
        ];
        state.votes.insert("p1".into(), "p2".into());
        state.votes.insert("p2".into(), "p1".into());
        state.votes.insert("ghost".into(), "p1".into());

        state.normalize();

        assert_eq!(state.votes.len(), 1);
        assert!(state.votes.contains_key("p1"));
    }

    #[test]
    fn test_name_and_clue_validation() {
        assert_eq!(valid_name("  Ana  "), Some("Ana".to_string()));
        assert_eq!(valid_name("   "), None);
        assert_eq!(valid_name(&"x".repeat(19)), None);
        assert_eq!(valid_name(&"x".repeat(18)), Some("x".repeat(18)));

        assert_eq!(valid_clue(" fuzzy "), Some("fuzzy".to_string()));
        assert_eq!(valid_clue(""), None);
        assert_eq!(valid_clue(&"y".repeat(31)), None);
    }

    #[test]
    fn test_snapshot_round_trip_preserves_fields() {
        let mut state = GameState::default();
        state.code = "K81".into();
        state.topic = "animals".into();
        state.secret_word = "otter".into();
        state.host_id = "p1".into();
        state.impostor_id = Some("p2".into());
        state.phase = GamePhase::Clue;
        state.round = 2;
        state.first_speaker_index = Some(1);
        state.players = vec![
            Player::new("p1".into(), "Ana".into(), true),
            Player::new("p2".into(), "Ben".into(), false),
            Player::new("p3".into(), "Cleo".into(), false),
        ];
        state.normalize();
        state.updated_at = 1_700_000_000_123;

        let value = serde_json::to_value(&state).unwrap();
        let decoded = GameState::from_value(value).expect("round trip should decode");

        assert_eq!(decoded, state);
        // Denormalized flag stays consistent with impostor_id
        assert!(decoded.players[1].is_impostor);
        assert!(!decoded.players[0].is_impostor);
    }
}

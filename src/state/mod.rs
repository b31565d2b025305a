mod elimination;
mod machine;
mod turn;
mod vote;

pub use machine::GameAction;
pub use vote::VoteOutcome;

use crate::types::*;

impl GameState {
    /// Create the authoritative snapshot for a freshly opened room. The host
    /// is the first roster entry; phase lobby, round 0, empty clue/vote
    /// bookkeeping.
    pub fn new_room(code: RoomCode, host_id: PlayerId, host_name: String, now: i64) -> GameState {
        GameState {
            code,
            host_id: host_id.clone(),
            players: vec![Player::new(host_id, host_name, true)],
            show_clue: true,
            updated_at: now,
            ..Default::default()
        }
    }

    /// Stamp a mutation. `updated_at` must strictly increase on every
    /// authoritative write because it is the sole reconciliation tie-breaker,
    /// so a clock that has not advanced still bumps by one.
    pub fn touch(&mut self, now: i64) {
        self.updated_at = now.max(self.updated_at + 1);
    }
}

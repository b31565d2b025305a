use crate::types::*;
use std::collections::HashSet;

impl GameState {
    pub fn alive_players(&self) -> Vec<&Player> {
        self.players.iter().filter(|p| p.alive).collect()
    }

    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.alive).count()
    }

    /// Clues belonging to the current round. Clues accumulate across rounds;
    /// only this subset is "active".
    pub fn clues_for_round(&self) -> Vec<&Clue> {
        self.clues.iter().filter(|c| c.round == self.round).collect()
    }

    pub fn has_spoken(&self, player_id: &str) -> bool {
        self.clues
            .iter()
            .any(|c| c.round == self.round && c.player_id == player_id)
    }

    fn speakers_this_round(&self) -> HashSet<&str> {
        self.clues
            .iter()
            .filter(|c| c.round == self.round)
            .map(|c| c.player_id.as_str())
            .collect()
    }

    /// The round's starting point in the ring. `first_speaker_index` anchors
    /// rotation for the entire match; if that player is gone, scan forward
    /// circularly to the first alive player, with plain array order as the
    /// last resort.
    fn round_start_index(&self) -> usize {
        let n = self.players.len();
        if let Some(first) = self.first_speaker_index {
            if first < n {
                if self.players[first].alive {
                    return first;
                }
                for offset in 1..n {
                    let idx = (first + offset) % n;
                    if self.players[idx].alive {
                        return idx;
                    }
                }
            }
        }
        self.players.iter().position(|p| p.alive).unwrap_or(0)
    }

    /// Index of the next eligible speaker, or -1 when no alive player is
    /// left to speak this round. Pure: identical input yields identical
    /// output.
    pub fn next_speaker(&self) -> i32 {
        let n = self.players.len();
        let alive = self.alive_count();
        if alive == 0 {
            return -1;
        }
        let spoken = self.speakers_this_round();
        let distinct_spoken = spoken
            .iter()
            .filter(|id| self.players.iter().any(|p| p.alive && p.id == **id))
            .count();
        if distinct_spoken >= alive {
            return -1;
        }

        let start = if self.current_turn_index >= 0 {
            self.current_turn_index as usize % n
        } else {
            self.round_start_index()
        };

        for offset in 0..n {
            let idx = (start + offset) % n;
            let player = &self.players[idx];
            if player.alive && !spoken.contains(player.id.as_str()) {
                return idx as i32;
            }
        }
        -1
    }

    /// Display-only rotation of the full roster starting at the round anchor.
    /// Must visually match the order `next_speaker` traverses.
    pub fn player_order(&self) -> Vec<&Player> {
        let n = self.players.len();
        if n == 0 {
            return Vec::new();
        }
        let start = self.first_speaker_index.filter(|&i| i < n).unwrap_or(0);
        (0..n).map(|offset| &self.players[(start + offset) % n]).collect()
    }
}

use crate::content::ContentSource;
use crate::types::*;

/// Every state-changing operation the host can commit. Host-only variants
/// (StartGame, BeginClue, OpenVoting, ContinueAfterReveal, SetConfig and the
/// timer expiries) are only ever constructed from the host's own UI or timer
/// callbacks; per-player variants arrive as remote events and carry the
/// acting player's id, which the machine validates itself.
#[derive(Debug, Clone, PartialEq)]
pub enum GameAction {
    SetConfig {
        topic: String,
        show_clue: bool,
        time_limit: Option<u32>,
        voting_time_limit: Option<u32>,
    },
    StartGame,
    BeginClue,
    SubmitClue {
        player_id: PlayerId,
        word: String,
    },
    OpenVoting,
    SubmitVote {
        voter_id: PlayerId,
        target_id: PlayerId,
    },
    ClearVote {
        player_id: PlayerId,
    },
    ReadyForRound {
        player_id: PlayerId,
    },
    PlayerLeave {
        player_id: PlayerId,
    },
    ContinueAfterReveal,
    /// Turn timer expired: auto-submit the placeholder clue for the current
    /// speaker.
    TurnTimeout,
    /// Voting timer expired: commit whatever the votes resolve to; a tie or
    /// missing votes degrades to a reveal with no elimination.
    VotingTimeout,
}

impl GameState {
    /// Apply one operation. Total: any action that fails a precondition
    /// (wrong phase, wrong actor, invalid payload) returns the state
    /// unchanged — no error, no panic. Duplicate and out-of-order delivery
    /// are therefore harmless.
    pub fn apply(&self, action: GameAction, content: &dyn ContentSource, now: i64) -> GameState {
        let mut next = self.clone();
        if next.apply_mut(action, content, now) {
            next.touch(now);
        }
        next
    }

    fn apply_mut(&mut self, action: GameAction, content: &dyn ContentSource, now: i64) -> bool {
        match action {
            GameAction::SetConfig {
                topic,
                show_clue,
                time_limit,
                voting_time_limit,
            } => self.set_config(topic, show_clue, time_limit, voting_time_limit),
            GameAction::StartGame => self.start_game(content),
            GameAction::BeginClue => self.begin_clue(),
            GameAction::SubmitClue { player_id, word } => self.submit_clue(&player_id, &word, now),
            GameAction::OpenVoting => self.open_voting(),
            GameAction::SubmitVote {
                voter_id,
                target_id,
            } => self.submit_vote(&voter_id, &target_id),
            GameAction::ClearVote { player_id } => self.clear_vote(&player_id),
            GameAction::ReadyForRound { player_id } => self.ready_for_round(&player_id),
            GameAction::PlayerLeave { player_id } => self.player_leave(&player_id),
            GameAction::ContinueAfterReveal => self.continue_after_reveal(),
            GameAction::TurnTimeout => self.turn_timeout(content, now),
            GameAction::VotingTimeout => self.voting_timeout(),
        }
    }

    fn set_config(
        &mut self,
        topic: String,
        show_clue: bool,
        time_limit: Option<u32>,
        voting_time_limit: Option<u32>,
    ) -> bool {
        if self.phase != GamePhase::Lobby {
            return false;
        }
        self.topic = topic;
        self.show_clue = show_clue;
        self.time_limit = time_limit;
        self.voting_time_limit = voting_time_limit;
        true
    }

    fn start_game(&mut self, content: &dyn ContentSource) -> bool {
        use rand::Rng;

        if self.phase != GamePhase::Lobby
            || self.players.len() < MIN_PLAYERS
            || self.topic.is_empty()
            || !content.has_entries(&self.topic)
        {
            return false;
        }
        let Some(pair) = content.draw(&self.topic) else {
            return false;
        };

        for player in &mut self.players {
            player.alive = true;
            player.is_impostor = false;
            player.ready_for_round = false;
            player.clue = None;
            player.vote = None;
        }
        self.clues.clear();
        self.votes.clear();
        self.elimination = None;
        self.winner = None;

        let mut rng = rand::rng();
        let impostor_index = rng.random_range(0..self.players.len());
        self.players[impostor_index].is_impostor = true;
        self.impostor_id = Some(self.players[impostor_index].id.clone());
        // Everyone is alive at this point, so any roster index is a valid
        // alive first speaker.
        self.first_speaker_index = Some(rng.random_range(0..self.players.len()));

        self.secret_word = pair.subject;
        self.selected_player_clue = Some(pair.clue);
        self.round = 1;
        self.current_turn_index = -1;
        self.phase = GamePhase::WordReveal;
        true
    }

    fn begin_clue(&mut self) -> bool {
        use rand::Rng;

        if self.phase != GamePhase::WordReveal {
            return false;
        }
        let valid_anchor = self
            .first_speaker_index
            .is_some_and(|i| i < self.players.len());
        if !valid_anchor {
            let alive: Vec<usize> = self
                .players
                .iter()
                .enumerate()
                .filter(|(_, p)| p.alive)
                .map(|(i, _)| i)
                .collect();
            if alive.is_empty() {
                return false;
            }
            self.first_speaker_index = Some(alive[rand::rng().random_range(0..alive.len())]);
        }
        self.current_turn_index = -1;
        self.current_turn_index = self.next_speaker();
        self.phase = GamePhase::Clue;
        true
    }

    fn submit_clue(&mut self, player_id: &str, word: &str, now: i64) -> bool {
        if self.phase != GamePhase::Clue {
            return false;
        }
        let Some(word) = valid_clue(word) else {
            return false;
        };
        let Some(index) = self.player_index(player_id) else {
            return false;
        };
        if self.current_turn_index != index as i32 {
            return false;
        }
        if !self.players[index].alive || self.has_spoken(player_id) {
            return false;
        }

        self.clues.push(Clue {
            id: ulid::Ulid::new().to_string(),
            player_id: player_id.to_string(),
            word: word.clone(),
            round: self.round,
            created_at: now,
        });
        self.players[index].clue = Some(word);
        self.current_turn_index = self.next_speaker();
        true
    }

    fn open_voting(&mut self) -> bool {
        if self.phase != GamePhase::Clue || self.alive_count() == 0 {
            return false;
        }
        let all_spoke = self
            .players
            .iter()
            .filter(|p| p.alive)
            .all(|p| self.has_spoken(&p.id));
        if !all_spoke {
            return false;
        }
        self.votes.clear();
        for player in &mut self.players {
            player.vote = None;
        }
        self.phase = GamePhase::Voting;
        true
    }

    fn submit_vote(&mut self, voter_id: &str, target_id: &str) -> bool {
        if self.phase != GamePhase::Voting || voter_id == target_id {
            return false;
        }
        let voter_alive = self.player(voter_id).is_some_and(|p| p.alive);
        let target_alive = self.player(target_id).is_some_and(|p| p.alive);
        if !voter_alive || !target_alive {
            return false;
        }

        self.votes.insert(voter_id.to_string(), target_id.to_string());
        if let Some(voter) = self.player_mut(voter_id) {
            voter.vote = Some(target_id.to_string());
        }

        // Last ballot in: resolve immediately. A clean majority eliminates;
        // a tie keeps the phase and the votes so players can change theirs.
        if self.votes.len() >= self.alive_count() {
            let outcome = self.resolve_votes();
            if let Some(target) = outcome.target_id {
                self.finish_elimination(Some(&target));
            }
        }
        true
    }

    fn clear_vote(&mut self, player_id: &str) -> bool {
        if self.phase != GamePhase::Voting {
            return false;
        }
        if self.votes.remove(player_id).is_none() {
            return false;
        }
        if let Some(player) = self.player_mut(player_id) {
            player.vote = None;
        }
        true
    }

    fn ready_for_round(&mut self, player_id: &str) -> bool {
        match self.player_mut(player_id) {
            Some(player) if !player.ready_for_round => {
                player.ready_for_round = true;
                true
            }
            _ => false,
        }
    }

    fn player_leave(&mut self, player_id: &str) -> bool {
        if self.player(player_id).is_none() {
            return false;
        }
        if self.phase == GamePhase::Lobby {
            self.players.retain(|p| p.id != player_id);
            return true;
        }

        let mut was_alive = false;
        if let Some(player) = self.player_mut(player_id) {
            was_alive = player.alive;
            player.alive = false;
            player.vote = None;
        }
        let had_vote = self.votes.remove(player_id).is_some();

        // A departing current speaker must not stall the round.
        if self.phase == GamePhase::Clue {
            self.current_turn_index = self.next_speaker();
        }
        was_alive || had_vote
    }

    fn continue_after_reveal(&mut self) -> bool {
        if self.phase != GamePhase::Reveal {
            return false;
        }

        if self.winner.is_some() {
            // Fresh match: reset match-scoped fields, keep roster and the
            // winner for one more render.
            self.topic = String::new();
            self.secret_word = String::new();
            self.selected_player_clue = None;
            self.impostor_id = None;
            self.first_speaker_index = None;
            self.round = 0;
            self.clues.clear();
            self.votes.clear();
            self.elimination = None;
            self.current_turn_index = -1;
            for player in &mut self.players {
                player.alive = true;
                player.is_impostor = false;
                player.ready_for_round = false;
                player.clue = None;
                player.vote = None;
            }
            self.phase = GamePhase::Lobby;
        } else {
            for player in &mut self.players {
                player.clue = None;
                player.vote = None;
            }
            self.round += 1;
            self.votes.clear();
            self.elimination = None;
            self.current_turn_index = -1;
            self.current_turn_index = self.next_speaker();
            self.phase = GamePhase::Clue;
        }
        true
    }

    fn turn_timeout(&mut self, content: &dyn ContentSource, now: i64) -> bool {
        if self.phase != GamePhase::Clue || self.current_turn_index < 0 {
            return false;
        }
        let index = self.current_turn_index as usize;
        let Some(player) = self.players.get(index) else {
            return false;
        };
        let player_id = player.id.clone();
        // Same path as a real submission so turn advancement stays in one
        // place.
        self.apply_mut(
            GameAction::SubmitClue {
                player_id,
                word: PLACEHOLDER_CLUE.to_string(),
            },
            content,
            now,
        )
    }

    fn voting_timeout(&mut self) -> bool {
        if self.phase != GamePhase::Voting {
            return false;
        }
        let outcome = self.resolve_votes();
        self.finish_elimination(outcome.target_id.as_deref());
        true
    }
}

use crate::types::*;

impl GameState {
    /// Apply an elimination decision and move to the reveal phase. A target
    /// that does not resolve to a roster entry degrades to a reveal with no
    /// elimination recorded instead of failing.
    ///
    /// Win conditions, in order: the impostor wins while alive with two or
    /// fewer players left; civilians win once the impostor is dead. A winning
    /// elimination still lands in `reveal` — the lobby transition only
    /// happens when the host continues.
    pub(crate) fn finish_elimination(&mut self, target_id: Option<&str>) {
        self.elimination = None;

        if let Some(target_id) = target_id {
            if let Some(target) = self.player_mut(target_id) {
                target.alive = false;
                let was_impostor = target.is_impostor;
                self.elimination = Some(Elimination {
                    target_id: target_id.to_string(),
                    was_impostor,
                });
            }
        }

        if self.impostor_id.is_some() {
            let impostor_alive = self.players.iter().any(|p| p.alive && p.is_impostor);
            let alive_count = self.alive_count();
            if impostor_alive && alive_count <= 2 {
                self.winner = Some(Winner::Impostor);
            } else if !impostor_alive {
                self.winner = Some(Winner::Civilians);
            }
        }

        self.votes.clear();
        for player in &mut self.players {
            player.vote = None;
        }
        self.current_turn_index = -1;
        self.phase = GamePhase::Reveal;
    }
}

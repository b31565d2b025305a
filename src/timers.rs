use crate::state::GameAction;
use crate::types::*;
use std::time::Duration;
use tokio::sync::mpsc;

/// Identity of the one timer a room can have armed. A timer stays valid only
/// while the state it was armed for is current; any change to phase, round or
/// speaker re-keys and therefore replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerKey {
    pub phase: GamePhase,
    pub round: u32,
    pub turn: i32,
}

impl TimerKey {
    pub fn of(state: &GameState) -> Self {
        Self {
            phase: state.phase,
            round: state.round,
            turn: state.current_turn_index,
        }
    }
}

/// Which timer the current state calls for, if any.
pub fn timer_for(state: &GameState) -> Option<(Duration, GameAction)> {
    match state.phase {
        GamePhase::WordReveal => Some((
            Duration::from_secs(REVEAL_COUNTDOWN_SECS),
            GameAction::BeginClue,
        )),
        GamePhase::Clue => {
            let limit = state.time_limit?;
            if state.current_turn_index < 0 {
                return None;
            }
            Some((Duration::from_secs(limit as u64), GameAction::TurnTimeout))
        }
        GamePhase::Voting => {
            let limit = state.voting_time_limit?;
            Some((Duration::from_secs(limit as u64), GameAction::VotingTimeout))
        }
        GamePhase::Lobby | GamePhase::Reveal => None,
    }
}

/// Host-side timer driver. Arms at most one timer; when it fires, the
/// corresponding expiry action is sent down the same channel the host's UI
/// actions travel, so the state machine treats it like any other operation.
pub struct Scheduler {
    tx: mpsc::Sender<GameAction>,
    armed: Option<(TimerKey, tokio::task::JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(tx: mpsc::Sender<GameAction>) -> Self {
        Self { tx, armed: None }
    }

    pub fn armed_key(&self) -> Option<TimerKey> {
        self.armed.as_ref().map(|(key, _)| *key)
    }

    /// Bring the armed timer in line with the state: arm what the state
    /// calls for, cancel what it no longer does. Re-syncing against an
    /// unchanged key leaves the running timer alone.
    pub fn sync(&mut self, state: &GameState) {
        let key = TimerKey::of(state);
        match timer_for(state) {
            Some((delay, action)) => {
                if self.armed_key() == Some(key) {
                    return;
                }
                self.disarm();
                let tx = self.tx.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // Receiver gone means the room is shutting down
                    let _ = tx.send(action).await;
                });
                tracing::debug!(?key, ?delay, "timer armed");
                self.armed = Some((key, handle));
            }
            None => self.disarm(),
        }
    }

    pub fn disarm(&mut self) {
        if let Some((key, handle)) = self.armed.take() {
            handle.abort();
            tracing::debug!(?key, "timer cancelled");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FixedContent;

    fn lobby() -> GameState {
        let mut state = GameState::new_room("A12".into(), "p1".into(), "Ana".into(), 1);
        for i in 2..=3 {
            state
                .players
                .push(Player::new(format!("p{i}"), format!("Player{i}"), false));
        }
        state.topic = "animals".into();
        state.time_limit = Some(30);
        state.voting_time_limit = Some(20);
        state
    }

    #[test]
    fn test_timer_selection_per_phase() {
        let content = FixedContent::new("otter", "swims on its back");
        let lobby = lobby();
        assert!(timer_for(&lobby).is_none());

        let reveal = lobby.apply(GameAction::StartGame, &content, 10);
        let (delay, action) = timer_for(&reveal).unwrap();
        assert_eq!(delay, Duration::from_secs(REVEAL_COUNTDOWN_SECS));
        assert_eq!(action, GameAction::BeginClue);

        let clue = reveal.apply(GameAction::BeginClue, &content, 20);
        let (delay, action) = timer_for(&clue).unwrap();
        assert_eq!(delay, Duration::from_secs(30));
        assert_eq!(action, GameAction::TurnTimeout);

        // Untimed game: no clue timer
        let mut untimed = clue.clone();
        untimed.time_limit = None;
        assert!(timer_for(&untimed).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_sends_action_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx);

        let content = FixedContent::new("otter", "swims on its back");
        let reveal = lobby().apply(GameAction::StartGame, &content, 10);
        scheduler.sync(&reveal);
        assert!(scheduler.armed_key().is_some());

        tokio::time::sleep(Duration::from_secs(REVEAL_COUNTDOWN_SECS + 1)).await;
        assert_eq!(rx.recv().await, Some(GameAction::BeginClue));
        assert!(rx.try_recv().is_err(), "fires exactly once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_change_replaces_timer() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx);

        let content = FixedContent::new("otter", "swims on its back");
        let reveal = lobby().apply(GameAction::StartGame, &content, 10);
        scheduler.sync(&reveal);
        let countdown_key = scheduler.armed_key().unwrap();

        // Re-sync on the same state keeps the same timer
        scheduler.sync(&reveal);
        assert_eq!(scheduler.armed_key(), Some(countdown_key));

        // Phase change cancels the countdown and arms the turn timer instead
        let clue = reveal.apply(GameAction::BeginClue, &content, 20);
        scheduler.sync(&clue);
        let turn_key = scheduler.armed_key().unwrap();
        assert_ne!(turn_key, countdown_key);
        assert_eq!(turn_key.phase, GamePhase::Clue);

        // The cancelled countdown never fires
        tokio::time::sleep(Duration::from_secs(REVEAL_COUNTDOWN_SECS + 1)).await;
        assert!(rx.try_recv().is_err());

        // The turn timer does
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(rx.recv().await, Some(GameAction::TurnTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_phase_disarms() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(tx);

        let content = FixedContent::new("otter", "swims on its back");
        let reveal = lobby().apply(GameAction::StartGame, &content, 10);
        scheduler.sync(&reveal);

        let mut done = reveal.clone();
        done.phase = GamePhase::Reveal;
        scheduler.sync(&done);
        assert!(scheduler.armed_key().is_none());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }
}

use crate::content::ContentSource;
use crate::protocol::{EventKind, GameEvent};
use crate::session::SessionContext;
use crate::state::GameAction;
use crate::store::{EventLog, SnapshotStore, StoreError};
use crate::timers::Scheduler;
use crate::types::*;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Both halves of the shared-store contract, as one handle.
pub trait SharedStore: SnapshotStore + EventLog {}
impl<T: SnapshotStore + EventLog> SharedStore for T {}

/// How many processed event keys each client remembers. Oldest evicted
/// first; within one room session this comfortably outlives any redelivery
/// window.
pub const DEDUP_CAPACITY: usize = 256;

/// The sole conflict-resolution rule: a remote snapshot is accepted iff it is
/// strictly newer than whatever candidate the client currently holds.
pub fn reconcile(local: Option<&GameState>, remote: &GameState) -> bool {
    match local {
        None => true,
        Some(local) => remote.updated_at > local.updated_at,
    }
}

/// Bounded memory of recently-processed event keys, making at-least-once
/// delivery idempotent.
pub struct EventDedup {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl EventDedup {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Record a key. Returns false if it was already known (duplicate).
    pub fn insert(&mut self, key: String) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        true
    }
}

/// Failures surfaced to a joining user as a status message; the join attempt
/// is aborted and local session state reset.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    #[error("room {0} is full")]
    RoomFull(RoomCode),

    #[error("name {0:?} is already taken")]
    NameTaken(String),

    #[error("display name is empty or too long")]
    InvalidName,

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn encode_state(state: &GameState) -> Result<Value, StoreError> {
    serde_json::to_value(state).map_err(|e| StoreError::WriteFailed(e.to_string()))
}

/// Join a room as a non-host client. This is the one place a non-host writes
/// the snapshot slot directly: a read-modify-write appending the joining
/// player, with existence, capacity and name-uniqueness re-checked against
/// the freshly read snapshot immediately before the write.
///
/// The check and the write are not serialized against other joiners: two
/// players joining in the same instant can both pass the check before either
/// write lands. That window is an accepted property of the design, not a bug
/// this function hides.
pub async fn join_room(
    store: &dyn SharedStore,
    code: &str,
    session: &SessionContext,
    now: i64,
) -> Result<GameState, JoinError> {
    let name = valid_name(&session.display_name).ok_or(JoinError::InvalidName)?;

    let raw = store.read_state(code).await?;
    let Some(mut state) = raw.and_then(GameState::from_value) else {
        return Err(JoinError::RoomNotFound(code.to_string()));
    };
    if state.players.len() >= MAX_PLAYERS {
        return Err(JoinError::RoomFull(code.to_string()));
    }
    if state
        .players
        .iter()
        .any(|p| p.name.eq_ignore_ascii_case(&name))
    {
        return Err(JoinError::NameTaken(name));
    }

    state
        .players
        .push(Player::new(session.player_id.clone(), name, false));
    state.touch(now);
    store.set_state(code, Some(encode_state(&state)?)).await?;

    tracing::info!(code, player = %session.player_id, "joined room");
    Ok(state)
}

/// Push an intent event to a room's log as a non-host client. The store
/// stamps the timestamp.
pub async fn send_event(
    store: &dyn SharedStore,
    code: &str,
    session: &SessionContext,
    kind: EventKind,
) -> Result<u64, StoreError> {
    let event = GameEvent::new(kind, session.player_id.clone(), 0);
    let value =
        serde_json::to_value(&event).map_err(|e| StoreError::WriteFailed(e.to_string()))?;
    store.push_event(code, value).await
}

/// The host side of replication: owns the authoritative snapshot, feeds
/// validated log events into the state machine, publishes every new
/// snapshot, and holds the last unconfirmed snapshot as "pending" across a
/// failed write.
pub struct HostReplicator {
    session: SessionContext,
    store: Arc<dyn SharedStore>,
    content: Arc<dyn ContentSource>,
    state: GameState,
    pending: Option<GameState>,
    dedup: EventDedup,
}

impl HostReplicator {
    /// Open a room: generate a code, publish the lobby snapshot.
    pub async fn create_room(
        session: SessionContext,
        store: Arc<dyn SharedStore>,
        content: Arc<dyn ContentSource>,
    ) -> Result<Self, StoreError> {
        let code = generate_room_code();
        let state = GameState::new_room(
            code.clone(),
            session.player_id.clone(),
            session.display_name.clone(),
            chrono::Utc::now().timestamp_millis(),
        );
        let mut host = Self {
            session,
            store,
            content,
            state,
            pending: None,
            dedup: EventDedup::new(DEDUP_CAPACITY),
        };
        host.publish().await;
        tracing::info!(code, "room created");
        Ok(host)
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn code(&self) -> &str {
        &self.state.code
    }

    pub fn pending(&self) -> Option<&GameState> {
        self.pending.as_ref()
    }

    /// Publish the current snapshot. A transport failure retains it as
    /// pending — there is no retry beyond the write the next mutation
    /// triggers — and never blocks further local interaction.
    async fn publish(&mut self) {
        let value = match encode_state(&self.state) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "snapshot serialization failed");
                return;
            }
        };
        match self.store.set_state(&self.state.code, Some(value)).await {
            Ok(()) => self.pending = None,
            Err(e) => {
                tracing::warn!(code = %self.state.code, error = %e, "snapshot write failed, keeping pending copy");
                self.pending = Some(self.state.clone());
            }
        }
    }

    /// Apply one action and publish if it changed anything. Rejected
    /// operations produce no write.
    pub async fn commit(&mut self, action: GameAction) {
        let now = chrono::Utc::now().timestamp_millis();
        let next = self.state.apply(action, self.content.as_ref(), now);
        if next.updated_at == self.state.updated_at {
            return;
        }
        self.state = next;
        self.publish().await;
    }

    /// Consume one log entry: fail-closed decode, dedup, self-origin filter,
    /// then the state machine.
    pub async fn handle_log_entry(&mut self, position: u64, raw: Value) {
        let Some(event) = GameEvent::from_value(raw) else {
            tracing::debug!(position, "dropping malformed log entry");
            return;
        };
        if !self.dedup.insert(event.dedup_key(position)) {
            tracing::debug!(position, kind = event.kind.tag(), "duplicate event ignored");
            return;
        }
        // A client ignores its own events — except the kinds the host must
        // apply regardless of origin.
        if event.player_id == self.session.player_id && !event.requires_host_processing() {
            return;
        }

        let action = match event.kind {
            EventKind::SubmitClue { word } => GameAction::SubmitClue {
                player_id: event.player_id,
                word,
            },
            EventKind::SubmitVote { target_id } => GameAction::SubmitVote {
                voter_id: event.player_id,
                target_id,
            },
            EventKind::ClearVote => GameAction::ClearVote {
                player_id: event.player_id,
            },
            EventKind::ReadyForRound => GameAction::ReadyForRound {
                player_id: event.player_id,
            },
            EventKind::PlayerLeave => GameAction::PlayerLeave {
                player_id: event.player_id,
            },
            // Joins go through the direct roster read-modify-write, and the
            // remaining tags are reserved.
            EventKind::JoinRequest { .. } | EventKind::JoinResponse | EventKind::StateUpdate => {
                return;
            }
        };
        self.commit(action).await;
    }

    /// Reconcile a remotely observed snapshot against the local
    /// authoritative copy. The local copy is provisionally authoritative; a
    /// remote value only wins with a strictly newer timestamp.
    pub fn handle_remote_snapshot(&mut self, value: Option<Value>) {
        let Some(value) = value else {
            // The host is the only party that clears the slot; an observed
            // null while hosting is noise.
            return;
        };
        let Some(remote) = GameState::from_value(value) else {
            return;
        };
        if reconcile(Some(&self.state), &remote) {
            tracing::debug!(updated_at = remote.updated_at, "adopting newer remote snapshot");
            self.state = remote;
        }
    }

    /// Tear down the room: clear the snapshot slot. Observers treat the
    /// null as authoritative "room closed".
    pub async fn close_room(&mut self) -> Result<(), StoreError> {
        tracing::info!(code = %self.state.code, "closing room");
        self.store.set_state(&self.state.code, None).await
    }
}

/// What a non-host client learns from one snapshot-slot change.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverUpdate {
    State(GameState),
    RoomClosed,
}

/// Non-host view of a room: renders from the latest accepted snapshot and
/// treats an observed null as the room closing.
pub struct Observer {
    latest: Option<GameState>,
}

impl Observer {
    pub fn new() -> Self {
        Self { latest: None }
    }

    pub fn latest(&self) -> Option<&GameState> {
        self.latest.as_ref()
    }

    /// Feed one observed slot value. Returns the update to render, or None
    /// when the observation is stale or malformed.
    pub fn observe(&mut self, value: Option<Value>) -> Option<ObserverUpdate> {
        match value {
            None => {
                if self.latest.take().is_some() {
                    Some(ObserverUpdate::RoomClosed)
                } else {
                    None
                }
            }
            Some(value) => {
                let remote = GameState::from_value(value)?;
                if reconcile(self.latest.as_ref(), &remote) {
                    self.latest = Some(remote.clone());
                    Some(ObserverUpdate::State(remote))
                } else {
                    None
                }
            }
        }
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive a host until its local action channel closes: replay the log,
/// then interleave local actions, timer expiries, new log entries and
/// snapshot-slot changes. Each accepted mutation is mirrored onto the watch
/// channel for whoever renders the host's screen, and the phase timers are
/// re-synced against the fresh snapshot.
pub fn spawn_host_loop(
    mut host: HostReplicator,
    mut local_actions: mpsc::Receiver<GameAction>,
    state_tx: watch::Sender<GameState>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let code = host.code().to_string();
        let (replay, mut events_rx) = match host.store.subscribe_events(&code).await {
            Ok(sub) => sub,
            Err(e) => {
                tracing::error!(code, error = %e, "event subscription failed");
                return;
            }
        };
        let (initial, mut state_rx) = match host.store.subscribe_state(&code).await {
            Ok(sub) => sub,
            Err(e) => {
                tracing::error!(code, error = %e, "state subscription failed");
                return;
            }
        };
        // Adopt whatever the slot already holds (joins that landed while no
        // loop was running), then fold in the log backlog.
        host.handle_remote_snapshot(initial);
        for (position, raw) in replay {
            host.handle_log_entry(position, raw).await;
        }
        let _ = state_tx.send(host.state().clone());

        let (timer_tx, mut timer_rx) = mpsc::channel(8);
        let mut scheduler = Scheduler::new(timer_tx);
        scheduler.sync(host.state());

        loop {
            tokio::select! {
                action = local_actions.recv() => {
                    match action {
                        Some(action) => host.commit(action).await,
                        None => {
                            let _ = host.close_room().await;
                            break;
                        }
                    }
                }
                Some(action) = timer_rx.recv() => {
                    host.commit(action).await;
                }
                entry = events_rx.recv() => {
                    if let Ok((position, raw)) = entry {
                        host.handle_log_entry(position, raw).await;
                    }
                }
                snapshot = state_rx.recv() => {
                    if let Ok(value) = snapshot {
                        host.handle_remote_snapshot(value);
                    }
                }
            }
            scheduler.sync(host.state());
            let _ = state_tx.send(host.state().clone());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FixedContent;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn stamped(updated_at: i64) -> GameState {
        let mut state = GameState::new_room("A12".into(), "p1".into(), "Ana".into(), 1);
        state.updated_at = updated_at;
        state
    }

    async fn host_with_room() -> (HostReplicator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let host = HostReplicator::create_room(
            SessionContext::with_id("host".into(), "Ana"),
            store.clone(),
            Arc::new(FixedContent::new("otter", "swims on its back")),
        )
        .await
        .unwrap();
        (host, store)
    }

    #[test]
    fn test_reconcile_strictly_newer_wins() {
        let local = stamped(100);

        assert!(reconcile(None, &stamped(1)));
        assert!(reconcile(Some(&local), &stamped(101)));
        assert!(!reconcile(Some(&local), &stamped(100)));
        assert!(!reconcile(Some(&local), &stamped(99)));
    }

    #[test]
    fn test_dedup_rejects_known_keys_and_evicts_oldest() {
        let mut dedup = EventDedup::new(2);
        assert!(dedup.insert("a".into()));
        assert!(!dedup.insert("a".into()));
        assert!(dedup.insert("b".into()));
        // "a" evicted by the third distinct key
        assert!(dedup.insert("c".into()));
        assert!(dedup.insert("a".into()));
    }

    #[tokio::test]
    async fn test_create_room_publishes_lobby_snapshot() {
        let (host, store) = host_with_room().await;
        let raw = store.read_state(host.code()).await.unwrap().unwrap();
        let published = GameState::from_value(raw).unwrap();
        assert_eq!(published.phase, GamePhase::Lobby);
        assert_eq!(published.host_id, "host");
        assert_eq!(published.players.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_publishes_only_accepted_mutations() {
        let (mut host, store) = host_with_room().await;
        let before = host.state().updated_at;

        // Rejected in lobby with one player: no state change, no write
        host.commit(GameAction::StartGame).await;
        assert_eq!(host.state().updated_at, before);

        host.commit(GameAction::SetConfig {
            topic: "animals".into(),
            show_clue: true,
            time_limit: None,
            voting_time_limit: None,
        })
        .await;
        assert!(host.state().updated_at > before);

        let raw = store.read_state(host.code()).await.unwrap().unwrap();
        let published = GameState::from_value(raw).unwrap();
        assert_eq!(published.topic, "animals");
    }

    #[tokio::test]
    async fn test_failed_write_keeps_pending_until_next_mutation() {
        let (mut host, store) = host_with_room().await;
        store.set_fail_writes(true);

        host.commit(GameAction::SetConfig {
            topic: "animals".into(),
            show_clue: true,
            time_limit: Some(30),
            voting_time_limit: Some(20),
        })
        .await;

        // Local state advanced, remote did not, pending retained
        assert_eq!(host.state().topic, "animals");
        assert!(host.pending().is_some());
        let remote = GameState::from_value(
            store.read_state(host.code()).await.unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(remote.topic, "");

        // The next mutation's write carries the fresher data out
        store.set_fail_writes(false);
        host.commit(GameAction::SetConfig {
            topic: "food".into(),
            show_clue: false,
            time_limit: None,
            voting_time_limit: None,
        })
        .await;
        assert!(host.pending().is_none());
        let remote = GameState::from_value(
            store.read_state(host.code()).await.unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(remote.topic, "food");
    }

    #[tokio::test]
    async fn test_duplicate_log_entries_apply_once() {
        let (mut host, store) = host_with_room().await;
        let code = host.code().to_string();
        let joiner = SessionContext::with_id("p2".into(), "Ben");
        join_room(store.as_ref(), &code, &joiner, 10).await.unwrap();
        host.handle_remote_snapshot(store.read_state(&code).await.unwrap());

        let raw = json!({ "type": "ready-for-round", "playerId": "p2", "timestamp": 50 });
        host.handle_log_entry(0, raw.clone()).await;
        let after_first = host.state().updated_at;
        assert!(host.state().player("p2").unwrap().ready_for_round);

        // Redelivery of the same position: no second application
        host.handle_log_entry(0, raw).await;
        assert_eq!(host.state().updated_at, after_first);
    }

    #[tokio::test]
    async fn test_own_events_skipped_except_host_processed_kinds() {
        let (mut host, _store) = host_with_room().await;

        // Host-authored leave is ignored (origin filter)
        host.handle_log_entry(
            0,
            json!({ "type": "player-leave", "playerId": "host", "timestamp": 1 }),
        )
        .await;
        assert_eq!(host.state().players.len(), 1);

        // Host-authored ready-for-round is one of the four exceptions
        host.handle_log_entry(
            1,
            json!({ "type": "ready-for-round", "playerId": "host", "timestamp": 2 }),
        )
        .await;
        assert!(host.state().player("host").unwrap().ready_for_round);
    }

    #[tokio::test]
    async fn test_malformed_log_entries_are_dropped() {
        let (mut host, _store) = host_with_room().await;
        let before = host.state().clone();

        host.handle_log_entry(0, json!("garbage")).await;
        host.handle_log_entry(1, json!({ "type": "no-such-event" })).await;

        assert_eq!(host.state(), &before);
    }

    #[tokio::test]
    async fn test_host_rejects_stale_remote_snapshot() {
        let (mut host, _store) = host_with_room().await;
        let local_stamp = host.state().updated_at;

        let mut stale = host.state().clone();
        stale.topic = "should not land".into();
        stale.updated_at = local_stamp - 1;
        host.handle_remote_snapshot(Some(serde_json::to_value(&stale).unwrap()));
        assert_eq!(host.state().topic, "");

        let mut newer = host.state().clone();
        newer.topic = "accepted".into();
        newer.updated_at = local_stamp + 5;
        host.handle_remote_snapshot(Some(serde_json::to_value(&newer).unwrap()));
        assert_eq!(host.state().topic, "accepted");
    }

    #[tokio::test]
    async fn test_observer_defers_to_remote_and_detects_close() {
        let mut observer = Observer::new();
        assert_eq!(observer.observe(None), None, "no room yet, null is noise");

        let first = stamped(10);
        let update = observer.observe(Some(serde_json::to_value(&first).unwrap()));
        assert_eq!(update, Some(ObserverUpdate::State(first)));

        // Stale and malformed observations are ignored
        assert_eq!(
            observer.observe(Some(serde_json::to_value(&stamped(5)).unwrap())),
            None
        );
        assert_eq!(observer.observe(Some(json!({ "players": 3 }))), None);
        assert!(observer.latest().is_some());

        assert_eq!(observer.observe(None), Some(ObserverUpdate::RoomClosed));
        assert!(observer.latest().is_none());
    }

    #[tokio::test]
    async fn test_join_validation() {
        let (host, store) = host_with_room().await;
        let code = host.code().to_string();

        // Duplicate name, case-insensitive
        let dup = SessionContext::with_id("p2".into(), "ana");
        assert!(matches!(
            join_room(store.as_ref(), &code, &dup, 10).await,
            Err(JoinError::NameTaken(_))
        ));

        // Invalid name
        let blank = SessionContext::with_id("p3".into(), "   ");
        assert!(matches!(
            join_room(store.as_ref(), &code, &blank, 10).await,
            Err(JoinError::InvalidName)
        ));

        // Unknown room ("ZZZ" is outside the generated code space)
        let ben = SessionContext::with_id("p4".into(), "Ben");
        assert!(matches!(
            join_room(store.as_ref(), "ZZZ", &ben, 10).await,
            Err(JoinError::RoomNotFound(_))
        ));

        // Fill to capacity, then one more
        for i in 0..(MAX_PLAYERS - 1) {
            let s = SessionContext::with_id(format!("q{i}"), format!("Player{i}"));
            join_room(store.as_ref(), &code, &s, 20 + i as i64)
                .await
                .unwrap();
        }
        let extra = SessionContext::with_id("late".into(), "Latecomer");
        assert!(matches!(
            join_room(store.as_ref(), &code, &extra, 99).await,
            Err(JoinError::RoomFull(_))
        ));
    }
}

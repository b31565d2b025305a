use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};

/// Transport-level failures. State-machine rejections never surface here;
/// these cover only the shared-store round-trips.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("write to shared store failed: {0}")]
    WriteFailed(String),

    #[error("room {0} does not exist")]
    NoSuchRoom(String),
}

/// The per-room key-value slot holding the full snapshot. Writes always
/// replace the entire value ("set full value"); `None` clears the slot,
/// which non-host clients treat as "room closed".
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn set_state(&self, code: &str, value: Option<Value>) -> Result<(), StoreError>;

    async fn read_state(&self, code: &str) -> Result<Option<Value>, StoreError>;

    /// Current value plus a live feed of future changes.
    async fn subscribe_state(
        &self,
        code: &str,
    ) -> Result<(Option<Value>, broadcast::Receiver<Option<Value>>), StoreError>;
}

/// The per-room append-only list. Entries are never mutated or removed;
/// subscribing replays everything ever pushed, then streams new entries.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Push one entry. The store assigns the timestamp and returns the log
    /// position.
    async fn push_event(&self, code: &str, event: Value) -> Result<u64, StoreError>;

    async fn subscribe_events(
        &self,
        code: &str,
    ) -> Result<(Vec<(u64, Value)>, broadcast::Receiver<(u64, Value)>), StoreError>;
}

struct RoomSlot {
    state: Option<Value>,
    state_tx: broadcast::Sender<Option<Value>>,
    events: Vec<Value>,
    events_tx: broadcast::Sender<(u64, Value)>,
}

impl RoomSlot {
    fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        let (events_tx, _) = broadcast::channel(100);
        Self {
            state: None,
            state_tx,
            events: Vec::new(),
            events_tx,
        }
    }
}

/// In-process stand-in for the hosted real-time store, built on the same
/// broadcast fan-out the rest of the crate uses. Backs the demo binary and
/// every test that exercises replication.
#[derive(Default)]
pub struct MemoryStore {
    rooms: RwLock<HashMap<String, RoomSlot>>,
    /// Test hook: simulate a transport outage for snapshot writes.
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn set_state(&self, code: &str, value: Option<Value>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("simulated network error".into()));
        }
        let mut rooms = self.rooms.write().await;
        let slot = rooms.entry(code.to_string()).or_insert_with(RoomSlot::new);
        slot.state = value.clone();
        // No receivers connected is fine
        let _ = slot.state_tx.send(value);
        Ok(())
    }

    async fn read_state(&self, code: &str) -> Result<Option<Value>, StoreError> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(code).and_then(|slot| slot.state.clone()))
    }

    async fn subscribe_state(
        &self,
        code: &str,
    ) -> Result<(Option<Value>, broadcast::Receiver<Option<Value>>), StoreError> {
        let mut rooms = self.rooms.write().await;
        let slot = rooms.entry(code.to_string()).or_insert_with(RoomSlot::new);
        Ok((slot.state.clone(), slot.state_tx.subscribe()))
    }
}

#[async_trait]
impl EventLog for MemoryStore {
    async fn push_event(&self, code: &str, mut event: Value) -> Result<u64, StoreError> {
        let mut rooms = self.rooms.write().await;
        let slot = rooms
            .get_mut(code)
            .ok_or_else(|| StoreError::NoSuchRoom(code.to_string()))?;

        // Server-assigned timestamp, like the hosted store stamps pushes
        if let Some(map) = event.as_object_mut() {
            map.insert(
                "timestamp".to_string(),
                Value::from(chrono::Utc::now().timestamp_millis()),
            );
        }

        let position = slot.events.len() as u64;
        slot.events.push(event.clone());
        let _ = slot.events_tx.send((position, event));
        Ok(position)
    }

    async fn subscribe_events(
        &self,
        code: &str,
    ) -> Result<(Vec<(u64, Value)>, broadcast::Receiver<(u64, Value)>), StoreError> {
        let mut rooms = self.rooms.write().await;
        let slot = rooms.entry(code.to_string()).or_insert_with(RoomSlot::new);
        let replay = slot
            .events
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, e)| (i as u64, e))
            .collect();
        Ok((replay, slot.events_tx.subscribe()))
    }
}

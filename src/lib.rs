// Public API for integration tests and potential library usage

pub mod content;
pub mod protocol;
pub mod replication;
pub mod session;
pub mod state;
pub mod store;
pub mod timers;
pub mod types;

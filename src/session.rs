use crate::types::PlayerId;

/// Identity for one browser session. Generated once per session and injected
/// into whatever needs it — the core never reaches into ambient storage for
/// who it is.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub player_id: PlayerId,
    pub display_name: String,
}

impl SessionContext {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            player_id: ulid::Ulid::new().to_string(),
            display_name: display_name.into(),
        }
    }

    /// Rebuild a context from known parts (tests, resumed sessions).
    pub fn with_id(player_id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            player_id,
            display_name: display_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_per_session() {
        let a = SessionContext::new("Ana");
        let b = SessionContext::new("Ana");
        assert_ne!(a.player_id, b.player_id);
        assert_eq!(a.display_name, b.display_name);
    }
}

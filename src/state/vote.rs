use crate::types::*;
use std::collections::HashMap;

/// Result of resolving a vote map. Ties are reported, never broken
/// automatically: an ambiguous outcome must be visible to the caller, which
/// either re-solicits votes or moves on without an elimination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOutcome {
    pub target_id: Option<PlayerId>,
    pub tie: bool,
}

/// Aggregate a vote map into per-target counts.
pub fn tally(votes: &HashMap<PlayerId, PlayerId>) -> HashMap<PlayerId, u32> {
    let mut counts: HashMap<PlayerId, u32> = HashMap::new();
    for target in votes.values() {
        *counts.entry(target.clone()).or_insert(0) += 1;
    }
    counts
}

impl GameState {
    /// Resolve the current vote map. Empty map resolves to no target, no tie.
    pub fn resolve_votes(&self) -> VoteOutcome {
        let counts = tally(&self.votes);
        let mut ranked: Vec<(PlayerId, u32)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        match ranked.as_slice() {
            [] => VoteOutcome {
                target_id: None,
                tie: false,
            },
            [(top, _)] => VoteOutcome {
                target_id: Some(top.clone()),
                tie: false,
            },
            [(top, top_count), (_, second_count), ..] => {
                if top_count == second_count {
                    VoteOutcome {
                        target_id: None,
                        tie: true,
                    }
                } else {
                    VoteOutcome {
                        target_id: Some(top.clone()),
                        tie: false,
                    }
                }
            }
        }
    }
}

//! Session history: append-only round archives keyed by an opaque session id
//!
//! One session holds one match's full round history. The schema mirrors what
//! the controller emits at round end: per player, whether they were
//! eliminated in that round and the result that decided it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SessionId = Uuid;

/// The result a round was decided on, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedResult {
    pub title: String,
    pub score: u64,
}

/// One player's line in a round archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRoundRecord {
    pub eliminated_this_round: bool,
    /// `None` when the player never produced a real result this round
    pub result: Option<ArchivedResult>,
}

/// Everything the controller knows about one finished round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundArchive {
    pub round: u32,
    pub players: HashMap<String, PlayerRoundRecord>,
}

/// Full stored history of one match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub created_at: DateTime<Utc>,
    /// Seed roster at match init, in entry order
    pub players: Vec<String>,
    pub rounds: Vec<RoundArchive>,
}

/// Durable sink for match history. The controller only appends; reads are for
/// the session API.
pub trait SessionStore: Send + Sync + 'static {
    fn create(&self, id: SessionId, players: Vec<String>);
    fn append(&self, id: SessionId, round: RoundArchive);
    fn get(&self, id: &SessionId) -> Option<SessionRecord>;
    fn list(&self) -> Vec<SessionId>;
}

/// In-memory store backing the session API
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, id: SessionId, players: Vec<String>) {
        self.sessions.insert(
            id,
            SessionRecord {
                created_at: Utc::now(),
                players,
                rounds: Vec::new(),
            },
        );
    }

    fn append(&self, id: SessionId, round: RoundArchive) {
        if let Some(mut record) = self.sessions.get_mut(&id) {
            record.rounds.push(round);
        }
    }

    fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.get(id).map(|r| r.value().clone())
    }

    fn list(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|r| *r.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive(round: u32, player: &str, eliminated: bool) -> RoundArchive {
        let mut players = HashMap::new();
        players.insert(
            player.to_string(),
            PlayerRoundRecord {
                eliminated_this_round: eliminated,
                result: Some(ArchivedResult {
                    title: "Fracture Ray".to_string(),
                    score: 9_800_000,
                }),
            },
        );
        RoundArchive { round, players }
    }

    #[test]
    fn create_append_get_round_history() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store.create(id, vec!["123456789".to_string()]);
        store.append(id, archive(1, "123456789", false));
        store.append(id, archive(2, "123456789", true));

        let record = store.get(&id).unwrap();
        assert_eq!(record.players, vec!["123456789".to_string()]);
        assert_eq!(record.rounds.len(), 2);
        assert_eq!(record.rounds[1].round, 2);
        assert!(record.rounds[1].players["123456789"].eliminated_this_round);
        assert_eq!(store.list(), vec![id]);
    }

    #[test]
    fn append_to_unknown_session_is_a_no_op() {
        let store = MemorySessionStore::new();
        store.append(Uuid::new_v4(), archive(1, "123456789", false));
        assert!(store.list().is_empty());
    }
}

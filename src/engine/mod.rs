//! Match engine: roster, score polling, ranking, and the round state machine

pub mod controller;
pub mod normalize;
pub mod poller;
pub mod ranking;
pub mod roster;
pub mod snapshot;

pub use controller::{MatchController, MatchHandle, MatchRules};
pub use roster::{PlayerId, Roster, RosterEntry};

use serde::{Deserialize, Serialize};

/// Match lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// No match has been initialized
    Idle,
    /// Roster seeded; waiting for song and duration
    AwaitingSongSelection,
    /// Countdown in progress
    RoundRunning,
    /// Countdown expired and the automatic poll has settled
    AwaitingRanking,
    /// Board has been ranked at least once; eliminations still reversible
    RoundEnded,
    /// Active player count reached the completion threshold
    MatchComplete,
}

/// Engine-level errors surfaced to the organizer
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Aggregated: every offending identifier from one init attempt
    #[error("invalid player ids: {}", .0.join(", "))]
    InvalidIdentifiers(Vec<String>),

    #[error("unknown song id: {0}")]
    UnknownSong(String),

    #[error("player {0} is not in the match")]
    UnknownPlayer(String),

    #[error("player {0} is disqualified; resync is disabled")]
    PlayerDisqualified(String),

    /// An action attempted in a phase that does not permit it
    #[error("{action} is not allowed while the match is in the {phase:?} phase")]
    Guard {
        action: &'static str,
        phase: MatchPhase,
    },

    #[error("a song and a round duration must both be set before the round can start")]
    RoundNotConfigured,

    #[error("match controller is not running")]
    ControllerClosed,
}

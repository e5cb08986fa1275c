//! Match event protocol
//! These are the wire types broadcast to presentation clients

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::MatchPhase;

/// Severity of an organizer-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    Success,
    Warning,
    Danger,
}

/// Events emitted by the match controller on every state change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    /// Full renderable projection of the current match state
    Scoreboard { view: ScoreboardView },

    /// One-second countdown update while a round is running
    CountdownTick {
        remaining_secs: u32,
        /// `m:ss` display
        display: String,
    },

    /// A round began
    RoundStarted {
        round: u32,
        song_title: String,
        duration_secs: u32,
        /// Wall-clock "start - end" window
        window: String,
    },

    /// The round countdown reached zero; the automatic poll is starting
    RoundExpired { round: u32 },

    /// A batch poll finished: every player either loaded or failed
    PollSettled {
        loaded: usize,
        failed: Vec<String>,
    },

    /// Organizer-facing notice (partial load, resync failure, ...)
    Notice {
        severity: NoticeSeverity,
        message: String,
    },

    /// A round was closed out and eliminated players purged
    RoundEnded {
        round: u32,
        eliminated: Vec<String>,
    },

    /// Active player count reached the completion threshold
    MatchCompleted { winner: Option<String> },
}

/// Renderable projection of the whole match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreboardView {
    pub phase: MatchPhase,
    pub round: u32,
    pub session_id: Option<Uuid>,
    pub song: Option<SongView>,
    pub round_duration_secs: Option<u32>,
    /// Countdown display while running, `0:00` once expired
    pub clock_display: Option<String>,
    /// Wall-clock "start - end" window of the running round
    pub window: Option<String>,
    pub rows: Vec<ScoreboardRow>,
}

/// Selected song as shown above the scoreboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongView {
    pub song_id: String,
    pub title: String,
    pub base_duration_secs: u32,
}

/// One scoreboard line; placeholder fields render as `----`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreboardRow {
    pub player_id: String,
    pub display_name: String,
    pub eliminated: bool,
    pub title: String,
    pub difficulty: String,
    pub score: Option<u64>,
    pub score_display: String,
    /// Score with the shiny bonus removed
    pub raw_score_display: String,
    pub perfect_display: String,
    pub far_lost_display: String,
    pub played_at: String,
    /// Inline failure indicator from the most recent poll of this player
    pub sync_error: Option<String>,
}

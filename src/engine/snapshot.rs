//! Builds the renderable scoreboard projection emitted on every state change

use uuid::Uuid;

use crate::util::time::{format_clock, format_played_at};
use crate::ws::protocol::{ScoreboardRow, ScoreboardView, SongView};

use super::controller::{RoundTimer, SongSelection, TimerPhase};
use super::normalize::LatestPlay;
use super::roster::{Roster, RosterEntry};
use super::MatchPhase;

const PLACEHOLDER: &str = "----";

/// Project the current match state into its presentation form. Placeholders
/// are resolved to display strings here so the presentation layer never has
/// to distinguish a never-polled player from a failed one.
#[allow(clippy::too_many_arguments)]
pub fn build_scoreboard(
    phase: MatchPhase,
    round: u32,
    session_id: Option<Uuid>,
    song: Option<&SongSelection>,
    round_duration_secs: Option<u32>,
    timer: &RoundTimer,
    window: Option<String>,
    roster: &Roster,
) -> ScoreboardView {
    let clock_display = match timer.phase {
        TimerPhase::Running | TimerPhase::Expired => Some(format_clock(timer.remaining_secs)),
        TimerPhase::Idle => round_duration_secs.map(format_clock),
    };

    ScoreboardView {
        phase,
        round,
        session_id,
        song: song.map(|s| SongView {
            song_id: s.song_id.clone(),
            title: s.title.clone(),
            base_duration_secs: s.base_duration_secs,
        }),
        round_duration_secs,
        clock_display,
        window,
        rows: roster.entries().iter().map(project_row).collect(),
    }
}

fn project_row(entry: &RosterEntry) -> ScoreboardRow {
    let (title, difficulty, score, score_display, raw_score, perfect, far_lost, played_at) =
        match &entry.latest {
            LatestPlay::Scored(play) => (
                play.title.clone(),
                play.difficulty.label().to_string(),
                Some(play.score),
                play.score.to_string(),
                play.raw_score.to_string(),
                format!("P{} ({})", play.perfect_count, play.shiny_perfect_count),
                format!("F{}, L{}", play.near_count, play.miss_count),
                format_played_at(play.played_at),
            ),
            LatestPlay::NotYetScored => (
                PLACEHOLDER.to_string(),
                "-- --".to_string(),
                None,
                PLACEHOLDER.to_string(),
                PLACEHOLDER.to_string(),
                PLACEHOLDER.to_string(),
                PLACEHOLDER.to_string(),
                PLACEHOLDER.to_string(),
            ),
        };

    ScoreboardRow {
        player_id: entry.id.to_string(),
        display_name: entry.display_name.clone(),
        eliminated: entry.eliminated,
        title,
        difficulty,
        score,
        score_display,
        raw_score_display: raw_score,
        perfect_display: perfect,
        far_lost_display: far_lost,
        played_at,
        sync_error: entry.last_error.clone(),
    }
}

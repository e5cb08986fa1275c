//! Play Normalizer: turns raw play records into display-ready, rankable results

use crate::catalog::SongCatalog;
use crate::fetch::RawPlay;

/// Difficulty tiers as reported by the score source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Past,
    Present,
    Future,
    Beyond,
}

impl Difficulty {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Past),
            1 => Some(Self::Present),
            2 => Some(Self::Future),
            3 => Some(Self::Beyond),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Past => "PST",
            Self::Present => "PRS",
            Self::Future => "FTR",
            Self::Beyond => "BYN",
        }
    }
}

/// Tie-break weighting. Injected configuration: the observed implementations
/// disagree on the exact constants, so nothing else assumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiebreakWeights {
    pub miss_weight: u64,
    pub near_weight: u64,
}

impl Default for TiebreakWeights {
    /// One miss counts double one near-miss toward badness
    fn default() -> Self {
        Self {
            miss_weight: 2,
            near_weight: 1,
        }
    }
}

impl TiebreakWeights {
    /// Monotonically-increasing badness; lower is better
    pub fn badness(&self, near_count: u32, miss_count: u32) -> u64 {
        self.miss_weight * u64::from(miss_count) + self.near_weight * u64::from(near_count)
    }
}

/// A normalized play. Produced once per poll; superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredPlay {
    pub song_id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub score: u64,
    /// Score with the shiny-perfect bonus removed
    pub raw_score: u64,
    pub perfect_count: u32,
    pub shiny_perfect_count: u32,
    pub near_count: u32,
    pub miss_count: u32,
    /// Tie-break metric; lower ranks better
    pub badness: u64,
    /// Unix millis
    pub played_at: i64,
}

/// A roster entry's latest result. The placeholder is a distinct variant and
/// ranks strictly worse than any real play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatestPlay {
    NotYetScored,
    Scored(ScoredPlay),
}

impl LatestPlay {
    /// Two-key ranking key: score (higher better), then badness (lower better).
    /// The placeholder key loses to every real score.
    pub fn rank_key(&self) -> (i64, u64) {
        match self {
            LatestPlay::NotYetScored => (-1, u64::MAX),
            LatestPlay::Scored(play) => (play.score as i64, play.badness),
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self, LatestPlay::Scored(_))
    }

    pub fn as_scored(&self) -> Option<&ScoredPlay> {
        match self {
            LatestPlay::Scored(play) => Some(play),
            LatestPlay::NotYetScored => None,
        }
    }
}

/// Normalization failures; the poller reports these as transient
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("unrecognized difficulty index {0}")]
    UnknownDifficulty(u8),
}

/// Convert a raw play into a rankable result. The song title is resolved from
/// the static catalog, falling back to the raw song id on a miss.
pub fn normalize(
    raw: &RawPlay,
    catalog: &SongCatalog,
    weights: TiebreakWeights,
) -> Result<ScoredPlay, NormalizeError> {
    let difficulty = Difficulty::from_index(raw.difficulty)
        .ok_or(NormalizeError::UnknownDifficulty(raw.difficulty))?;

    Ok(ScoredPlay {
        song_id: raw.song_id.clone(),
        title: catalog.title_or_id(&raw.song_id),
        difficulty,
        score: raw.score,
        raw_score: raw.score.saturating_sub(u64::from(raw.shiny_perfect_count)),
        perfect_count: raw.perfect_count,
        shiny_perfect_count: raw.shiny_perfect_count,
        near_count: raw.near_count,
        miss_count: raw.miss_count,
        badness: weights.badness(raw.near_count, raw.miss_count),
        played_at: raw.time_played,
    })
}

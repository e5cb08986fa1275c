//! Score Fetcher boundary: the external source that reports each player's
//! most recent play

pub mod arcapi;

pub use arcapi::ArcApiClient;

use std::future::Future;

use serde::Deserialize;

/// A single play as reported by the external score source.
///
/// Parsed through serde so a shape mismatch surfaces as a fetch failure
/// instead of being trusted blindly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawPlay {
    pub song_id: String,
    pub score: u64,
    pub difficulty: u8,
    pub near_count: u32,
    pub miss_count: u32,
    pub perfect_count: u32,
    pub shiny_perfect_count: u32,
    /// Unix millis
    pub time_played: i64,
}

/// Successful fetch result for one player.
///
/// `recent` is `None` for an account that exists but has no recorded play yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPlayer {
    pub name: String,
    pub recent: Option<RawPlay>,
}

/// Fetch failure taxonomy
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The source does not recognize the player code. User-facing and
    /// distinct from a temporary failure.
    #[error("player code not recognized by the score service")]
    UnknownIdentifier,

    /// The source reported an internal error; retryable.
    #[error("score service error: {0}")]
    Service(String),

    /// Transport-level failure; retryable.
    #[error("network error: {0}")]
    Network(String),

    /// The response did not match the expected shape; retryable.
    #[error("malformed response from score service: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Whether a retry of the same request can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::UnknownIdentifier)
    }
}

/// Asynchronous source of latest-play records, one remote round trip per call.
///
/// Implementations must tolerate being called concurrently for different
/// players; the engine never retries internally.
pub trait ScoreFetcher: Clone + Send + Sync + 'static {
    fn fetch_latest_play(
        &self,
        player_code: &str,
    ) -> impl Future<Output = Result<FetchedPlayer, FetchError>> + Send;
}

//! Score Poller: concurrent fetch-and-normalize with per-player error isolation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::catalog::SongCatalog;
use crate::fetch::{FetchError, ScoreFetcher};

use super::normalize::{normalize, LatestPlay, TiebreakWeights};
use super::roster::PlayerId;

/// User-facing failure tag for one poll attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The source does not recognize the identifier; a retry will not help
    InvalidIdentifier,
    /// Retryable via manual resync or the next batch poll
    TransientError,
}

/// Terminal failure of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    pub reason: FailureReason,
    pub message: String,
}

/// Successful attempt: resolved display name plus the normalized latest play
/// (the placeholder when the player has no recorded play yet)
#[derive(Debug, Clone, PartialEq)]
pub struct PolledPlayer {
    pub display_name: String,
    pub latest: LatestPlay,
}

/// One settled attempt, stamped with its issue sequence.
///
/// Sequences are allocated at issue time, so comparing them orders attempts
/// by when they were requested, not when they completed.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub seq: u64,
    pub result: Result<PolledPlayer, PollFailure>,
}

/// Orchestrates fetch-and-normalize across a set of players.
///
/// One external round trip per attempt, no internal retry; a failure for one
/// player never aborts or delays the others. Clones share the issue-sequence
/// counter and the upstream concurrency bound.
#[derive(Clone)]
pub struct ScorePoller<F> {
    fetcher: F,
    catalog: Arc<SongCatalog>,
    weights: TiebreakWeights,
    limit: Arc<Semaphore>,
    next_seq: Arc<AtomicU64>,
}

impl<F: ScoreFetcher> ScorePoller<F> {
    pub fn new(
        fetcher: F,
        catalog: Arc<SongCatalog>,
        weights: TiebreakWeights,
        max_concurrent: usize,
    ) -> Self {
        Self {
            fetcher,
            catalog,
            weights,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    fn issue_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Poll every given player concurrently. Settles only when each attempt
    /// has produced a result or a terminal failure; no attempt is dropped.
    pub async fn poll_all(&self, ids: &[PlayerId]) -> HashMap<PlayerId, PollOutcome> {
        let attempts: Vec<_> = ids
            .iter()
            .map(|id| {
                let seq = self.issue_seq();
                self.attempt(seq, id.clone())
            })
            .collect();

        let outcomes = join_all(attempts).await;
        ids.iter().cloned().zip(outcomes).collect()
    }

    /// Single-player variant for manual resync; identical contract
    pub async fn poll_one(&self, id: &PlayerId) -> PollOutcome {
        let seq = self.issue_seq();
        self.attempt(seq, id.clone()).await
    }

    async fn attempt(&self, seq: u64, id: PlayerId) -> PollOutcome {
        // Bound simultaneous upstream calls; the semaphore is never closed
        let _permit = self.limit.acquire().await.ok();

        let result = match self.fetcher.fetch_latest_play(id.as_str()).await {
            Ok(fetched) => {
                let latest = match &fetched.recent {
                    Some(raw) => match normalize(raw, &self.catalog, self.weights) {
                        Ok(play) => LatestPlay::Scored(play),
                        Err(e) => {
                            debug!(player_id = %id, error = %e, "Normalization rejected play");
                            return PollOutcome {
                                seq,
                                result: Err(PollFailure {
                                    reason: FailureReason::TransientError,
                                    message: e.to_string(),
                                }),
                            };
                        }
                    },
                    None => LatestPlay::NotYetScored,
                };
                Ok(PolledPlayer {
                    display_name: fetched.name,
                    latest,
                })
            }
            Err(error) => {
                debug!(player_id = %id, error = %error, "Poll attempt failed");
                let reason = match &error {
                    FetchError::UnknownIdentifier => FailureReason::InvalidIdentifier,
                    _ => FailureReason::TransientError,
                };
                Err(PollFailure {
                    reason,
                    message: error.to_string(),
                })
            }
        };

        PollOutcome { seq, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testutil::{sample_play, MockFetcher, ScriptedError};
    use std::time::Duration;

    fn poller(fetcher: MockFetcher, max_concurrent: usize) -> ScorePoller<MockFetcher> {
        ScorePoller::new(
            fetcher,
            Arc::new(SongCatalog::default()),
            TiebreakWeights::default(),
            max_concurrent,
        )
    }

    fn player(raw: &str) -> PlayerId {
        PlayerId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let fetcher = MockFetcher::new();
        fetcher.succeed("111111111", "One", Some(sample_play("a", 9_900_000, 1, 0)));
        fetcher.fail("222222222", ScriptedError::Service("backend down".into()));
        fetcher.succeed("333333333", "Three", Some(sample_play("b", 9_800_000, 0, 0)));

        let ids = vec![player("111111111"), player("222222222"), player("333333333")];
        let outcomes = poller(fetcher, 4).poll_all(&ids).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[&ids[0]].result.is_ok());
        assert!(outcomes[&ids[2]].result.is_ok());
        let failure = outcomes[&ids[1]].result.as_ref().unwrap_err();
        assert_eq!(failure.reason, FailureReason::TransientError);
    }

    #[tokio::test]
    async fn unknown_identifier_is_tagged_distinctly() {
        let fetcher = MockFetcher::new();
        fetcher.fail("111111111", ScriptedError::UnknownIdentifier);

        let outcome = poller(fetcher, 4).poll_one(&player("111111111")).await;
        let failure = outcome.result.unwrap_err();
        assert_eq!(failure.reason, FailureReason::InvalidIdentifier);
    }

    #[tokio::test]
    async fn player_with_no_recorded_play_normalizes_to_placeholder() {
        let fetcher = MockFetcher::new();
        fetcher.succeed("111111111", "Fresh", None);

        let outcome = poller(fetcher, 4).poll_one(&player("111111111")).await;
        let polled = outcome.result.unwrap();
        assert_eq!(polled.display_name, "Fresh");
        assert_eq!(polled.latest, LatestPlay::NotYetScored);
    }

    #[tokio::test]
    async fn malformed_play_is_a_transient_failure() {
        let fetcher = MockFetcher::new();
        let mut bad = sample_play("a", 9_000_000, 0, 0);
        bad.difficulty = 42;
        fetcher.succeed("111111111", "One", Some(bad));

        let outcome = poller(fetcher, 4).poll_one(&player("111111111")).await;
        let failure = outcome.result.unwrap_err();
        assert_eq!(failure.reason, FailureReason::TransientError);
    }

    #[tokio::test]
    async fn issue_sequences_are_strictly_increasing_across_clones() {
        let fetcher = MockFetcher::new();
        let poller = poller(fetcher, 4);
        let clone = poller.clone();

        let first = poller.poll_one(&player("111111111")).await;
        let second = clone.poll_one(&player("111111111")).await;
        let batch = poller.poll_all(&[player("222222222")]).await;

        assert!(second.seq > first.seq);
        assert!(batch[&player("222222222")].seq > second.seq);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_progress_concurrently_up_to_the_bound() {
        let fetcher = MockFetcher::new();
        for code in ["111111111", "222222222", "333333333"] {
            fetcher.succeed_after(code, Duration::from_secs(1), "slow", None);
        }
        let ids = vec![player("111111111"), player("222222222"), player("333333333")];

        let start = tokio::time::Instant::now();
        poller(fetcher.clone(), 3).poll_all(&ids).await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        for code in ["111111111", "222222222", "333333333"] {
            fetcher.succeed_after(code, Duration::from_secs(1), "slow", None);
        }
        let start = tokio::time::Instant::now();
        poller(fetcher, 1).poll_all(&ids).await;
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}

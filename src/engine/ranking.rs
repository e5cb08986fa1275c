//! Ranking Engine: pure, stable two-key ordering of the roster

use std::cmp::Reverse;

use super::roster::RosterEntry;

/// Order entries for the scoreboard.
///
/// Non-eliminated entries first, by score descending then badness ascending;
/// eliminated entries follow in their original relative order. The sort is
/// stable, so entries tied on both keys keep their input order and repeated
/// ranking of an already-ranked roster never reshuffles ties.
pub fn rank(entries: &[RosterEntry]) -> Vec<RosterEntry> {
    let (mut active, eliminated): (Vec<RosterEntry>, Vec<RosterEntry>) =
        entries.iter().cloned().partition(|e| !e.eliminated);

    active.sort_by_key(|e| {
        let (score, badness) = e.latest.rank_key();
        (Reverse(score), badness)
    });

    active.extend(eliminated);
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SongCatalog;
    use crate::engine::normalize::{normalize, LatestPlay, TiebreakWeights};
    use crate::engine::roster::{PlayerId, Roster};
    use crate::fetch::testutil::sample_play;

    fn entry(code: &str, play: Option<(u64, u32, u32)>, eliminated: bool) -> RosterEntry {
        let roster = Roster::initialize(&[code.to_string()]).unwrap();
        let mut entry = roster.entries()[0].clone();
        entry.eliminated = eliminated;
        if let Some((score, near, miss)) = play {
            let raw = sample_play("song", score, near, miss);
            entry.latest = LatestPlay::Scored(
                normalize(&raw, &SongCatalog::default(), TiebreakWeights::default()).unwrap(),
            );
        }
        entry
    }

    fn order(entries: &[RosterEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn ranks_by_score_descending() {
        let ranked = rank(&[
            entry("111111111", Some((9_800_000, 0, 0)), false),
            entry("222222222", Some((9_950_000, 0, 0)), false),
            entry("333333333", Some((9_900_000, 0, 0)), false),
        ]);
        assert_eq!(order(&ranked), vec!["222222222", "333333333", "111111111"]);
    }

    #[test]
    fn score_tie_breaks_on_lower_badness() {
        let ranked = rank(&[
            entry("111111111", Some((9_900_000, 10, 5)), false),
            entry("222222222", Some((9_900_000, 2, 1)), false),
        ]);
        assert_eq!(order(&ranked), vec!["222222222", "111111111"]);
    }

    #[test]
    fn full_ties_keep_input_order() {
        let ranked = rank(&[
            entry("111111111", Some((9_900_000, 3, 1)), false),
            entry("222222222", Some((9_900_000, 3, 1)), false),
        ]);
        assert_eq!(order(&ranked), vec!["111111111", "222222222"]);
    }

    #[test]
    fn eliminated_players_always_trail_regardless_of_score() {
        let ranked = rank(&[
            entry("111111111", Some((10_000_000, 0, 0)), true),
            entry("222222222", Some((9_000_000, 0, 0)), false),
            entry("333333333", Some((9_999_999, 0, 0)), true),
        ]);
        assert_eq!(order(&ranked), vec!["222222222", "111111111", "333333333"]);
    }

    #[test]
    fn placeholder_never_outranks_a_real_result() {
        let ranked = rank(&[
            entry("111111111", None, false),
            entry("222222222", Some((1, 500, 500)), false),
        ]);
        assert_eq!(order(&ranked), vec!["222222222", "111111111"]);
    }

    #[test]
    fn rank_is_idempotent_and_does_not_mutate_input() {
        let input = vec![
            entry("111111111", Some((9_800_000, 0, 0)), false),
            entry("222222222", Some((9_950_000, 0, 0)), true),
            entry("333333333", None, false),
        ];
        let snapshot = input.clone();

        let once = rank(&input);
        let twice = rank(&once);
        assert_eq!(once, twice);
        assert_eq!(input, snapshot);
    }
}

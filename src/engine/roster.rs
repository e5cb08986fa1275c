//! Roster Manager: the set of active and eliminated players in the current match

use std::fmt;

use serde::Serialize;

use super::normalize::LatestPlay;
use super::poller::PollOutcome;
use super::EngineError;

/// Built-in non-player accounts, silently excluded from any roster
pub const RESERVED_PLAYER_IDS: [&str; 2] = ["000000001", "000000002"];

/// Validated 9-digit player code, immutable once in a roster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PlayerId(String);

impl PlayerId {
    /// Accepts exactly nine ASCII digits
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == 9 && raw.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a poll outcome should be admitted into the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Resolve the display name only; the fetched play is not a round score
    IdentifyOnly,
    /// Admit the fetched play as the player's latest result
    Scored,
}

/// Result of applying one poll outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    Applied,
    /// Outcome was issued before an already-applied one; dropped
    Stale,
    /// Player is no longer in the roster
    Unknown,
}

/// One player's slot in the match
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: PlayerId,
    /// Resolved from the score source; falls back to the id until then
    pub display_name: String,
    pub eliminated: bool,
    pub latest: LatestPlay,
    /// Inline failure indicator from the most recent poll attempt
    pub last_error: Option<String>,
    /// Issue sequence of the newest applied poll; gates stale completions
    pub last_poll_seq: u64,
}

impl RosterEntry {
    fn new(id: PlayerId) -> Self {
        let display_name = id.as_str().to_string();
        Self {
            id,
            display_name,
            eliminated: false,
            latest: LatestPlay::NotYetScored,
            last_error: None,
            last_poll_seq: 0,
        }
    }
}

/// Ordered roster; order reflects the last computed ranking
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Seed a roster from raw candidate ids.
    ///
    /// Deduplicates (first occurrence wins), drops the reserved system
    /// accounts, then validates the survivors. Fails atomically: if any id is
    /// malformed, no roster is created and every offending id is reported.
    pub fn initialize(candidates: &[String]) -> Result<Self, EngineError> {
        let mut seen: Vec<&str> = Vec::new();
        for raw in candidates {
            let raw = raw.trim();
            if !seen.contains(&raw) && !RESERVED_PLAYER_IDS.contains(&raw) {
                seen.push(raw);
            }
        }

        let invalid: Vec<String> = seen
            .iter()
            .filter(|raw| PlayerId::parse(raw).is_none())
            .map(|raw| raw.to_string())
            .collect();
        if !invalid.is_empty() {
            return Err(EngineError::InvalidIdentifiers(invalid));
        }

        let entries = seen
            .into_iter()
            .filter_map(PlayerId::parse)
            .map(RosterEntry::new)
            .collect();
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    fn get_mut(&mut self, id: &PlayerId) -> Option<&mut RosterEntry> {
        self.entries.iter_mut().find(|e| &e.id == id)
    }

    /// Look up a player by raw code
    pub fn find(&self, raw: &str) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.id.as_str() == raw)
    }

    /// Non-eliminated players in current roster order; the fetch set for the
    /// next poll
    pub fn active_players(&self) -> Vec<PlayerId> {
        self.entries
            .iter()
            .filter(|e| !e.eliminated)
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.eliminated).count()
    }

    /// Mark a player eliminated. Idempotent and reversible until round end.
    pub fn eliminate(&mut self, id: &PlayerId) -> Result<(), EngineError> {
        let entry = self
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownPlayer(id.to_string()))?;
        entry.eliminated = true;
        Ok(())
    }

    /// Clear a player's eliminated mark. Idempotent.
    pub fn reinstate(&mut self, id: &PlayerId) -> Result<(), EngineError> {
        let entry = self
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownPlayer(id.to_string()))?;
        entry.eliminated = false;
        Ok(())
    }

    /// Remove all eliminated entries; called exactly once per round end.
    /// Players removed here are permanently out of the match.
    pub fn purge_eliminated(&mut self) -> Vec<PlayerId> {
        let purged = self
            .entries
            .iter()
            .filter(|e| e.eliminated)
            .map(|e| e.id.clone())
            .collect();
        self.entries.retain(|e| !e.eliminated);
        purged
    }

    /// Reset every active player's result to the placeholder for a new round
    pub fn clear_active_scores(&mut self) {
        for entry in self.entries.iter_mut().filter(|e| !e.eliminated) {
            entry.latest = LatestPlay::NotYetScored;
            entry.last_error = None;
        }
    }

    /// Replace roster order with a ranked sequence of the same entries
    pub fn set_order(&mut self, ranked: Vec<RosterEntry>) {
        debug_assert_eq!(ranked.len(), self.entries.len());
        self.entries = ranked;
    }

    /// Admit one poll outcome as a single atomic replace.
    ///
    /// An outcome issued before the newest applied one is dropped, so a stale
    /// in-flight resync can never clobber a just-completed poll.
    pub fn apply_outcome(
        &mut self,
        id: &PlayerId,
        outcome: &PollOutcome,
        mode: ApplyMode,
    ) -> ApplyResult {
        let Some(entry) = self.get_mut(id) else {
            return ApplyResult::Unknown;
        };
        if outcome.seq <= entry.last_poll_seq {
            return ApplyResult::Stale;
        }
        entry.last_poll_seq = outcome.seq;

        match &outcome.result {
            Ok(polled) => {
                entry.display_name = polled.display_name.clone();
                entry.last_error = None;
                if mode == ApplyMode::Scored {
                    entry.latest = polled.latest.clone();
                }
            }
            Err(failure) => {
                // Last known display name and result are preserved
                entry.last_error = Some(failure.message.clone());
            }
        }
        ApplyResult::Applied
    }
}

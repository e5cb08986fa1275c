//! Match/Round State Machine
//!
//! The controller owns all mutable match state and runs as a single task:
//! organizer commands arrive on an mpsc channel, match events leave on a
//! broadcast channel. While a batch poll is in flight the controller is
//! suspended inside it, so queued commands cannot observe a half-applied
//! poll; manual resyncs run as their own tasks and settle through the
//! command channel, gated by issue-sequence versioning.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::SongCatalog;
use crate::fetch::ScoreFetcher;
use crate::session::{ArchivedResult, PlayerRoundRecord, RoundArchive, SessionStore};
use crate::util::time::{format_clock, format_time_of_day, unix_millis};
use crate::ws::protocol::{MatchEvent, NoticeSeverity, ScoreboardView};

use super::normalize::TiebreakWeights;
use super::poller::{PollOutcome, ScorePoller};
use super::ranking::rank;
use super::roster::{ApplyMode, ApplyResult, PlayerId, Roster};
use super::snapshot::build_scoreboard;
use super::{EngineError, MatchPhase};

/// Round-duration bonus for a range of round numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusTier {
    /// Tier applies through this round number (inclusive)
    pub last_round: u32,
    pub bonus_secs: u32,
}

/// Match-format configuration injected into the engine
#[derive(Debug, Clone)]
pub struct MatchRules {
    pub weights: TiebreakWeights,
    /// Sorted ascending by `last_round`; rounds past the table get no bonus
    pub bonus_tiers: Vec<BonusTier>,
    /// The match completes once the active count drops to this at round end
    pub completion_threshold: usize,
    /// Upper bound on simultaneous upstream score fetches
    pub max_concurrent_polls: usize,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            weights: TiebreakWeights::default(),
            bonus_tiers: vec![
                BonusTier { last_round: 3, bonus_secs: 90 },
                BonusTier { last_round: 6, bonus_secs: 60 },
                BonusTier { last_round: 9, bonus_secs: 30 },
            ],
            completion_threshold: 1,
            max_concurrent_polls: 2,
        }
    }
}

impl MatchRules {
    pub fn round_bonus(&self, round: u32) -> u32 {
        self.bonus_tiers
            .iter()
            .find(|tier| round <= tier.last_round)
            .map(|tier| tier.bonus_secs)
            .unwrap_or(0)
    }
}

/// Countdown timer phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Running,
    Expired,
}

/// The single round countdown; one active timer per match
#[derive(Debug, Clone)]
pub struct RoundTimer {
    pub duration_secs: u32,
    pub remaining_secs: u32,
    pub started_at_millis: Option<u64>,
    pub phase: TimerPhase,
}

impl RoundTimer {
    pub fn idle() -> Self {
        Self {
            duration_secs: 0,
            remaining_secs: 0,
            started_at_millis: None,
            phase: TimerPhase::Idle,
        }
    }

    fn start(duration_secs: u32) -> Self {
        Self {
            duration_secs,
            remaining_secs: duration_secs,
            started_at_millis: Some(unix_millis()),
            phase: TimerPhase::Running,
        }
    }
}

/// The song a round will be played on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongSelection {
    pub song_id: String,
    pub title: String,
    pub base_duration_secs: u32,
}

/// Aggregate result of match init
#[derive(Debug, Clone, Serialize)]
pub struct InitSummary {
    pub session_id: Uuid,
    pub players: usize,
    pub loaded: usize,
    pub failed: Vec<String>,
}

/// Reply to a successful round start
#[derive(Debug, Clone, Serialize)]
pub struct RoundStartInfo {
    pub round: u32,
    pub song_title: String,
    pub duration_secs: u32,
    pub display: String,
    pub window: String,
}

/// Reply to a successful round end
#[derive(Debug, Clone, Serialize)]
pub struct RoundEndSummary {
    pub round_completed: u32,
    pub eliminated: Vec<String>,
    pub phase: MatchPhase,
}

/// Organizer commands; internal completions share the same channel
enum Command {
    Init {
        candidates: Vec<String>,
        reply: oneshot::Sender<Result<InitSummary, EngineError>>,
    },
    SelectSong {
        song_id: String,
        reply: oneshot::Sender<Result<SongSelection, EngineError>>,
    },
    SetDuration {
        seconds: u32,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    StartRound {
        reply: oneshot::Sender<Result<RoundStartInfo, EngineError>>,
    },
    Disqualify {
        player: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Reinstate {
        player: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Rank {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    EndRound {
        reply: oneshot::Sender<Result<RoundEndSummary, EngineError>>,
    },
    Resync {
        player: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// A spawned resync completed
    ResyncSettled { id: PlayerId, outcome: PollOutcome },
    Snapshot {
        reply: oneshot::Sender<ScoreboardView>,
    },
}

/// Handle to a running match controller
#[derive(Clone)]
pub struct MatchHandle {
    cmd_tx: mpsc::Sender<Command>,
    events: broadcast::Sender<MatchEvent>,
}

impl MatchHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> Command,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| EngineError::ControllerClosed)?;
        rx.await.map_err(|_| EngineError::ControllerClosed)?
    }

    pub async fn init_match(&self, candidates: Vec<String>) -> Result<InitSummary, EngineError> {
        self.request(|reply| Command::Init { candidates, reply }).await
    }

    pub async fn select_song(&self, song_id: String) -> Result<SongSelection, EngineError> {
        self.request(|reply| Command::SelectSong { song_id, reply }).await
    }

    pub async fn set_duration(&self, seconds: u32) -> Result<(), EngineError> {
        self.request(|reply| Command::SetDuration { seconds, reply }).await
    }

    pub async fn start_round(&self) -> Result<RoundStartInfo, EngineError> {
        self.request(|reply| Command::StartRound { reply }).await
    }

    pub async fn disqualify(&self, player: String) -> Result<(), EngineError> {
        self.request(|reply| Command::Disqualify { player, reply }).await
    }

    pub async fn reinstate(&self, player: String) -> Result<(), EngineError> {
        self.request(|reply| Command::Reinstate { player, reply }).await
    }

    pub async fn rank_players(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Rank { reply }).await
    }

    pub async fn end_round(&self) -> Result<RoundEndSummary, EngineError> {
        self.request(|reply| Command::EndRound { reply }).await
    }

    pub async fn resync(&self, player: String) -> Result<(), EngineError> {
        self.request(|reply| Command::Resync { player, reply }).await
    }

    pub async fn scoreboard(&self) -> Result<ScoreboardView, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Snapshot { reply: tx })
            .await
            .map_err(|_| EngineError::ControllerClosed)?;
        rx.await.map_err(|_| EngineError::ControllerClosed)
    }
}

/// The authoritative match controller
pub struct MatchController<F: ScoreFetcher> {
    rules: MatchRules,
    catalog: Arc<SongCatalog>,
    poller: ScorePoller<F>,
    store: Arc<dyn SessionStore>,

    phase: MatchPhase,
    round: u32,
    roster: Roster,
    session_id: Option<Uuid>,
    song: Option<SongSelection>,
    round_duration: Option<u32>,
    timer: RoundTimer,
    window: Option<String>,

    cmd_tx: mpsc::Sender<Command>,
    cmd_rx: mpsc::Receiver<Command>,
    events: broadcast::Sender<MatchEvent>,
}

impl<F: ScoreFetcher> MatchController<F> {
    /// Spawn the controller task and return its handle
    pub fn spawn(
        fetcher: F,
        catalog: Arc<SongCatalog>,
        store: Arc<dyn SessionStore>,
        rules: MatchRules,
    ) -> MatchHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (events, _) = broadcast::channel(256);

        let poller = ScorePoller::new(
            fetcher,
            catalog.clone(),
            rules.weights,
            rules.max_concurrent_polls,
        );

        let handle = MatchHandle {
            cmd_tx: cmd_tx.clone(),
            events: events.clone(),
        };

        let controller = Self {
            rules,
            catalog,
            poller,
            store,
            phase: MatchPhase::Idle,
            round: 0,
            roster: Roster::empty(),
            session_id: None,
            song: None,
            round_duration: None,
            timer: RoundTimer::idle(),
            window: None,
            cmd_tx,
            cmd_rx,
            events,
        };

        tokio::spawn(controller.run());
        handle
    }

    async fn run(mut self) {
        let mut ticker: Option<Interval> = None;

        loop {
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => {
                    match maybe_cmd {
                        Some(cmd) => self.handle_command(cmd, &mut ticker).await,
                        None => break,
                    }
                }
                _ = next_tick(&mut ticker) => {
                    self.on_tick(&mut ticker).await;
                }
            }
        }

        info!("Match controller stopped");
    }

    async fn handle_command(&mut self, cmd: Command, ticker: &mut Option<Interval>) {
        match cmd {
            Command::Init { candidates, reply } => {
                let result = self.handle_init(candidates, ticker).await;
                let _ = reply.send(result);
            }
            Command::SelectSong { song_id, reply } => {
                let _ = reply.send(self.handle_select_song(song_id));
            }
            Command::SetDuration { seconds, reply } => {
                let _ = reply.send(self.handle_set_duration(seconds));
            }
            Command::StartRound { reply } => {
                let _ = reply.send(self.handle_start_round(ticker));
            }
            Command::Disqualify { player, reply } => {
                let _ = reply.send(self.handle_toggle_elimination(&player, true));
            }
            Command::Reinstate { player, reply } => {
                let _ = reply.send(self.handle_toggle_elimination(&player, false));
            }
            Command::Rank { reply } => {
                let _ = reply.send(self.handle_rank());
            }
            Command::EndRound { reply } => {
                let _ = reply.send(self.handle_end_round());
            }
            Command::Resync { player, reply } => {
                let _ = reply.send(self.handle_resync(&player));
            }
            Command::ResyncSettled { id, outcome } => {
                self.handle_resync_settled(id, outcome);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.view());
            }
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    async fn handle_init(
        &mut self,
        candidates: Vec<String>,
        ticker: &mut Option<Interval>,
    ) -> Result<InitSummary, EngineError> {
        if self.phase == MatchPhase::RoundRunning {
            return Err(EngineError::Guard { action: "init", phase: self.phase });
        }

        // Atomic: a validation failure leaves any previous match untouched
        let roster = Roster::initialize(&candidates)?;

        let session_id = Uuid::new_v4();
        self.store
            .create(session_id, roster.entries().iter().map(|e| e.id.to_string()).collect());

        self.roster = roster;
        self.session_id = Some(session_id);
        self.round = 1;
        self.phase = MatchPhase::AwaitingSongSelection;
        self.song = None;
        self.round_duration = None;
        self.timer = RoundTimer::idle();
        self.window = None;
        *ticker = None;

        info!(
            session_id = %session_id,
            players = self.roster.len(),
            "Match initialized"
        );
        self.emit_scoreboard();

        // Identify-only poll: resolve display names, keep every result a
        // placeholder until the first round is actually played
        let ids = self.roster.active_players();
        let outcomes = self.poller.poll_all(&ids).await;
        let mut failed = Vec::new();
        for id in &ids {
            if let Some(outcome) = outcomes.get(id) {
                if outcome.result.is_err() {
                    failed.push(id.to_string());
                }
                self.roster.apply_outcome(id, outcome, ApplyMode::IdentifyOnly);
            }
        }

        let loaded = ids.len() - failed.len();
        self.emit(MatchEvent::PollSettled { loaded, failed: failed.clone() });
        if failed.is_empty() {
            self.emit_notice(NoticeSeverity::Success, "The match is ready.");
        } else {
            warn!(failed = failed.len(), "Some players did not load at match init");
            self.emit_notice(
                NoticeSeverity::Warning,
                "Some players are not loaded. Resync to try again.",
            );
        }
        self.emit_scoreboard();

        Ok(InitSummary {
            session_id,
            players: ids.len(),
            loaded,
            failed,
        })
    }

    fn handle_select_song(&mut self, song_id: String) -> Result<SongSelection, EngineError> {
        if self.phase != MatchPhase::AwaitingSongSelection {
            return Err(EngineError::Guard { action: "select song", phase: self.phase });
        }

        let info = self
            .catalog
            .lookup(&song_id)
            .ok_or_else(|| EngineError::UnknownSong(song_id.clone()))?;

        let selection = SongSelection {
            song_id,
            title: info.title.clone(),
            base_duration_secs: info.base_duration_secs,
        };
        self.round_duration =
            Some(info.base_duration_secs + self.rules.round_bonus(self.round));
        self.song = Some(selection.clone());

        info!(
            song = %selection.title,
            duration_secs = self.round_duration.unwrap_or(0),
            "Song selected"
        );
        self.emit_scoreboard();
        Ok(selection)
    }

    fn handle_set_duration(&mut self, seconds: u32) -> Result<(), EngineError> {
        if self.phase != MatchPhase::AwaitingSongSelection {
            return Err(EngineError::Guard { action: "set duration", phase: self.phase });
        }
        if seconds == 0 {
            return Err(EngineError::RoundNotConfigured);
        }
        self.round_duration = Some(seconds);
        self.emit_scoreboard();
        Ok(())
    }

    fn handle_start_round(
        &mut self,
        ticker: &mut Option<Interval>,
    ) -> Result<RoundStartInfo, EngineError> {
        if self.phase != MatchPhase::AwaitingSongSelection {
            return Err(EngineError::Guard { action: "start round", phase: self.phase });
        }
        // Guard condition: refused, not erroneously taken
        let (Some(song), Some(duration)) = (self.song.clone(), self.round_duration) else {
            return Err(EngineError::RoundNotConfigured);
        };

        self.timer = RoundTimer::start(duration);
        let started_at = self.timer.started_at_millis.unwrap_or_else(unix_millis);
        let window = format!(
            "{} - {}",
            format_time_of_day(started_at),
            format_time_of_day(started_at + u64::from(duration) * 1000),
        );
        self.window = Some(window.clone());
        self.phase = MatchPhase::RoundRunning;

        // Survivors from the previous round start from a clean slate
        self.roster.clear_active_scores();

        let period = Duration::from_secs(1);
        *ticker = Some(interval_at(Instant::now() + period, period));

        info!(
            round = self.round,
            song = %song.title,
            duration_secs = duration,
            "Round started"
        );
        let info = RoundStartInfo {
            round: self.round,
            song_title: song.title.clone(),
            duration_secs: duration,
            display: format_clock(duration),
            window: window.clone(),
        };
        self.emit(MatchEvent::RoundStarted {
            round: self.round,
            song_title: song.title,
            duration_secs: duration,
            window,
        });
        self.emit_scoreboard();
        Ok(info)
    }

    async fn on_tick(&mut self, ticker: &mut Option<Interval>) {
        if self.timer.phase != TimerPhase::Running {
            *ticker = None;
            return;
        }

        self.timer.remaining_secs = self.timer.remaining_secs.saturating_sub(1);
        self.emit(MatchEvent::CountdownTick {
            remaining_secs: self.timer.remaining_secs,
            display: format_clock(self.timer.remaining_secs),
        });

        if self.timer.remaining_secs == 0 {
            *ticker = None;
            self.timer.phase = TimerPhase::Expired;
            info!(round = self.round, "Round expired, polling scores");
            self.emit(MatchEvent::RoundExpired { round: self.round });

            // Automatic poll over the active set; ranking stays unavailable
            // until every attempt has settled
            let ids = self.roster.active_players();
            let outcomes = self.poller.poll_all(&ids).await;
            let mut failed = Vec::new();
            for id in &ids {
                if let Some(outcome) = outcomes.get(id) {
                    if outcome.result.is_err() {
                        failed.push(id.to_string());
                    }
                    self.roster.apply_outcome(id, outcome, ApplyMode::Scored);
                }
            }

            self.phase = MatchPhase::AwaitingRanking;
            let loaded = ids.len() - failed.len();
            self.emit(MatchEvent::PollSettled { loaded, failed: failed.clone() });
            if !failed.is_empty() {
                self.emit_notice(
                    NoticeSeverity::Warning,
                    "Some scores did not load. Resync to try again.",
                );
            }
            self.emit_scoreboard();
        }
    }

    fn handle_toggle_elimination(
        &mut self,
        player: &str,
        eliminated: bool,
    ) -> Result<(), EngineError> {
        let action = if eliminated { "disqualify" } else { "reinstate" };
        if matches!(self.phase, MatchPhase::Idle | MatchPhase::MatchComplete) {
            return Err(EngineError::Guard { action, phase: self.phase });
        }

        let id = self
            .roster
            .find(player)
            .map(|e| e.id.clone())
            .ok_or_else(|| EngineError::UnknownPlayer(player.to_string()))?;

        if eliminated {
            self.roster.eliminate(&id)?;
        } else {
            self.roster.reinstate(&id)?;
        }
        debug!(player_id = %id, eliminated, "Elimination toggled");

        // A board that was already ranked stays ranked after the toggle
        if self.phase == MatchPhase::RoundEnded {
            let ranked = rank(self.roster.entries());
            self.roster.set_order(ranked);
        }
        self.emit_scoreboard();
        Ok(())
    }

    fn handle_rank(&mut self) -> Result<(), EngineError> {
        if !matches!(self.phase, MatchPhase::AwaitingRanking | MatchPhase::RoundEnded) {
            return Err(EngineError::Guard { action: "rank", phase: self.phase });
        }

        let ranked = rank(self.roster.entries());
        self.roster.set_order(ranked);
        if self.phase == MatchPhase::AwaitingRanking {
            self.phase = MatchPhase::RoundEnded;
        }
        self.emit_scoreboard();
        Ok(())
    }

    fn handle_end_round(&mut self) -> Result<RoundEndSummary, EngineError> {
        if self.phase != MatchPhase::RoundEnded {
            return Err(EngineError::Guard { action: "end round", phase: self.phase });
        }

        let completed = self.round;
        if let Some(session_id) = self.session_id {
            self.store.append(session_id, self.archive_round(completed));
        }

        let purged: Vec<String> = self
            .roster
            .purge_eliminated()
            .iter()
            .map(|id| id.to_string())
            .collect();

        self.round += 1;
        self.song = None;
        self.round_duration = None;
        self.timer = RoundTimer::idle();
        self.window = None;

        let phase = if self.roster.active_count() <= self.rules.completion_threshold {
            MatchPhase::MatchComplete
        } else {
            MatchPhase::AwaitingSongSelection
        };
        self.phase = phase;

        info!(
            round = completed,
            eliminated = purged.len(),
            remaining = self.roster.active_count(),
            "Round ended"
        );
        self.emit(MatchEvent::RoundEnded {
            round: completed,
            eliminated: purged.clone(),
        });
        if phase == MatchPhase::MatchComplete {
            let winner = (self.roster.active_count() == 1)
                .then(|| self.roster.entries()[0].display_name.clone());
            info!(winner = winner.as_deref().unwrap_or("none"), "Match complete");
            self.emit(MatchEvent::MatchCompleted { winner });
        }
        self.emit_scoreboard();

        Ok(RoundEndSummary {
            round_completed: completed,
            eliminated: purged,
            phase,
        })
    }

    fn handle_resync(&mut self, player: &str) -> Result<(), EngineError> {
        if matches!(self.phase, MatchPhase::Idle | MatchPhase::MatchComplete) {
            return Err(EngineError::Guard { action: "resync", phase: self.phase });
        }

        let entry = self
            .roster
            .find(player)
            .ok_or_else(|| EngineError::UnknownPlayer(player.to_string()))?;
        if entry.eliminated {
            return Err(EngineError::PlayerDisqualified(player.to_string()));
        }
        let id = entry.id.clone();

        // Runs as its own task so it can overlap an automatic poll; the
        // issue sequence decides who wins if both touch the same player
        let poller = self.poller.clone();
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let outcome = poller.poll_one(&id).await;
            let _ = cmd_tx.send(Command::ResyncSettled { id, outcome }).await;
        });
        Ok(())
    }

    fn handle_resync_settled(&mut self, id: PlayerId, outcome: PollOutcome) {
        let failure = outcome.result.as_ref().err().map(|f| f.message.clone());
        match self.roster.apply_outcome(&id, &outcome, ApplyMode::Scored) {
            ApplyResult::Applied => {
                if let Some(message) = failure {
                    self.emit_notice(
                        NoticeSeverity::Danger,
                        &format!("Resync failed for {id}: {message}"),
                    );
                }
                self.emit_scoreboard();
            }
            ApplyResult::Stale => {
                debug!(player_id = %id, seq = outcome.seq, "Dropped stale resync result");
            }
            ApplyResult::Unknown => {
                debug!(player_id = %id, "Resync settled for a purged player");
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn archive_round(&self, round: u32) -> RoundArchive {
        let players = self
            .roster
            .entries()
            .iter()
            .map(|entry| {
                (
                    entry.id.to_string(),
                    PlayerRoundRecord {
                        eliminated_this_round: entry.eliminated,
                        result: entry.latest.as_scored().map(|play| ArchivedResult {
                            title: play.title.clone(),
                            score: play.score,
                        }),
                    },
                )
            })
            .collect();
        RoundArchive { round, players }
    }

    fn view(&self) -> ScoreboardView {
        build_scoreboard(
            self.phase,
            self.round,
            self.session_id,
            self.song.as_ref(),
            self.round_duration,
            &self.timer,
            self.window.clone(),
            &self.roster,
        )
    }

    fn emit(&self, event: MatchEvent) {
        let _ = self.events.send(event);
    }

    fn emit_scoreboard(&self) {
        self.emit(MatchEvent::Scoreboard { view: self.view() });
    }

    fn emit_notice(&self, severity: NoticeSeverity, message: &str) {
        self.emit(MatchEvent::Notice {
            severity,
            message: message.to_string(),
        });
    }
}

/// Await the next countdown tick, or park forever while no timer is armed
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SongInfo;
    use crate::fetch::testutil::{sample_play, MockFetcher, ScriptedError};
    use crate::session::MemorySessionStore;

    const P1: &str = "111111111";
    const P2: &str = "222222222";
    const P3: &str = "333333333";

    fn catalog() -> Arc<SongCatalog> {
        Arc::new(SongCatalog::from_songs([(
            "fractureray".to_string(),
            SongInfo {
                title: "Fracture Ray".to_string(),
                base_duration_secs: 60,
            },
        )]))
    }

    fn spawn(fetcher: MockFetcher) -> (MatchHandle, Arc<MemorySessionStore>) {
        let store = MemorySessionStore::shared();
        let handle = MatchController::spawn(
            fetcher,
            catalog(),
            store.clone(),
            MatchRules::default(),
        );
        (handle, store)
    }

    fn codes(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bonus_tiers_step_down_with_round_number() {
        let rules = MatchRules::default();
        assert_eq!(rules.round_bonus(1), 90);
        assert_eq!(rules.round_bonus(3), 90);
        assert_eq!(rules.round_bonus(4), 60);
        assert_eq!(rules.round_bonus(9), 30);
        assert_eq!(rules.round_bonus(10), 0);
    }

    #[tokio::test]
    async fn init_rejects_malformed_ids_atomically() {
        let (handle, store) = spawn(MockFetcher::new());

        let err = handle
            .init_match(codes(&[P1, "nope", "123"]))
            .await
            .unwrap_err();
        match err {
            EngineError::InvalidIdentifiers(ids) => {
                assert_eq!(ids, vec!["nope".to_string(), "123".to_string()])
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.phase, MatchPhase::Idle);
        assert!(view.rows.is_empty());
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn init_excludes_reserved_ids_and_keeps_placeholders() {
        let fetcher = MockFetcher::new();
        fetcher.succeed(P1, "One", Some(sample_play("fractureray", 9_000_000, 0, 0)));
        fetcher.succeed(P2, "Two", None);
        let (handle, store) = spawn(fetcher);

        let summary = handle
            .init_match(codes(&[P1, "000000001", P2]))
            .await
            .unwrap();
        assert_eq!(summary.players, 2);
        assert_eq!(summary.loaded, 2);
        assert!(summary.failed.is_empty());
        assert_eq!(store.list(), vec![summary.session_id]);

        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.phase, MatchPhase::AwaitingSongSelection);
        assert_eq!(view.round, 1);
        let names: Vec<&str> = view.rows.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["One", "Two"]);
        // Identify-only: the fetched play is not admitted as a score
        assert!(view.rows.iter().all(|r| r.score.is_none()));
    }

    #[tokio::test]
    async fn init_reports_partial_failures_without_blocking_start() {
        let fetcher = MockFetcher::new();
        fetcher.succeed(P1, "One", None);
        fetcher.fail(P2, ScriptedError::Network("timed out".into()));
        let (handle, _) = spawn(fetcher);

        let summary = handle.init_match(codes(&[P1, P2])).await.unwrap();
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.failed, vec![P2.to_string()]);

        // Match still starts; the failed player keeps an inline indicator
        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.phase, MatchPhase::AwaitingSongSelection);
        let row = view.rows.iter().find(|r| r.player_id == P2).unwrap();
        assert!(row.sync_error.is_some());
    }

    #[tokio::test]
    async fn start_round_requires_song_and_duration() {
        let fetcher = MockFetcher::new();
        let (handle, _) = spawn(fetcher);
        handle.init_match(codes(&[P1])).await.unwrap();

        assert!(matches!(
            handle.start_round().await,
            Err(EngineError::RoundNotConfigured)
        ));
        assert!(matches!(
            handle.select_song("unlisted".into()).await,
            Err(EngineError::UnknownSong(_))
        ));

        let selection = handle.select_song("fractureray".into()).await.unwrap();
        assert_eq!(selection.base_duration_secs, 60);

        // Base 60 + round-1 bonus 90
        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.round_duration_secs, Some(150));

        let info = handle.start_round().await.unwrap();
        assert_eq!(info.duration_secs, 150);
        assert_eq!(info.display, "2:30");
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_expires_polls_and_round_completes() {
        let fetcher = MockFetcher::new();
        // First response resolves the name at init; the second is the round score
        fetcher.succeed(P1, "One", None);
        fetcher.succeed(P1, "One", Some(sample_play("fractureray", 9_800_000, 2, 1)));
        fetcher.succeed(P2, "Two", None);
        fetcher.succeed(P2, "Two", Some(sample_play("fractureray", 9_900_000, 0, 0)));
        let (handle, store) = spawn(fetcher);

        let summary = handle.init_match(codes(&[P1, P2])).await.unwrap();
        handle.select_song("fractureray".into()).await.unwrap();
        handle.set_duration(150).await.unwrap();

        let mut events = handle.subscribe();
        handle.start_round().await.unwrap();

        // Ranking is refused while the countdown runs
        assert!(matches!(
            handle.rank_players().await,
            Err(EngineError::Guard { .. })
        ));

        tokio::time::sleep(Duration::from_secs(151)).await;

        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.phase, MatchPhase::AwaitingRanking);
        assert_eq!(view.clock_display.as_deref(), Some("0:00"));
        assert!(view.rows.iter().all(|r| r.score.is_some()));

        // The countdown reached 0:00 before the poll settled
        let mut saw_zero = false;
        let mut saw_settled = false;
        while let Ok(event) = events.try_recv() {
            match event {
                MatchEvent::CountdownTick { remaining_secs: 0, display } => {
                    assert_eq!(display, "0:00");
                    saw_zero = true;
                }
                MatchEvent::PollSettled { loaded, .. } => {
                    assert_eq!(loaded, 2);
                    saw_settled = true;
                }
                _ => {}
            }
        }
        assert!(saw_zero && saw_settled);

        handle.rank_players().await.unwrap();
        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.phase, MatchPhase::RoundEnded);
        assert_eq!(view.rows[0].player_id, P2); // higher score first

        handle.disqualify(P1.to_string()).await.unwrap();
        let end = handle.end_round().await.unwrap();
        assert_eq!(end.round_completed, 1);
        assert_eq!(end.eliminated, vec![P1.to_string()]);
        assert_eq!(end.phase, MatchPhase::MatchComplete);

        let record = store.get(&summary.session_id).unwrap();
        assert_eq!(record.rounds.len(), 1);
        let archived = &record.rounds[0].players[P1];
        assert!(archived.eliminated_this_round);
        assert_eq!(archived.result.as_ref().unwrap().score, 9_800_000);
    }

    #[tokio::test(start_paused = true)]
    async fn reinstate_rerank_and_next_round_flow() {
        let fetcher = MockFetcher::new();
        for (code, name, score) in [(P1, "One", 9_700_000), (P2, "Two", 9_800_000), (P3, "Three", 9_900_000)] {
            fetcher.succeed(code, name, None);
            fetcher.succeed(code, name, Some(sample_play("fractureray", score, 0, 0)));
        }
        let (handle, _) = spawn(fetcher);

        handle.init_match(codes(&[P1, P2, P3])).await.unwrap();
        handle.select_song("fractureray".into()).await.unwrap();
        handle.set_duration(5).await.unwrap();
        handle.start_round().await.unwrap();

        // A mid-round disqualify never ends the round early
        handle.disqualify(P3.to_string()).await.unwrap();
        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.phase, MatchPhase::RoundRunning);
        handle.reinstate(P3.to_string()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        handle.rank_players().await.unwrap();

        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.rows[0].player_id, P3);

        // Disqualifying after ranking re-ranks automatically: the top scorer
        // drops below everyone still in contention
        handle.disqualify(P3.to_string()).await.unwrap();
        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.rows[2].player_id, P3);
        assert!(view.rows[2].eliminated);

        // Reinstating restores the score-based position
        handle.reinstate(P3.to_string()).await.unwrap();
        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.rows[0].player_id, P3);

        handle.disqualify(P1.to_string()).await.unwrap();
        let end = handle.end_round().await.unwrap();
        assert_eq!(end.eliminated, vec![P1.to_string()]);
        assert_eq!(end.phase, MatchPhase::AwaitingSongSelection);

        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.round, 2);
        assert!(view.song.is_none());
        assert!(view.round_duration_secs.is_none());

        // Purged players are permanently out
        assert!(matches!(
            handle.reinstate(P1.to_string()).await,
            Err(EngineError::UnknownPlayer(_))
        ));
        assert!(matches!(
            handle.resync(P1.to_string()).await,
            Err(EngineError::UnknownPlayer(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_resync_never_clobbers_newer_poll() {
        let fetcher = MockFetcher::new();
        fetcher.succeed(P1, "One", None);
        // Resync issued first but completing last (old play)
        fetcher.succeed_after(
            P1,
            Duration::from_secs(30),
            "One",
            Some(sample_play("fractureray", 9_000_000, 0, 0)),
        );
        // Automatic round-end poll, issued later, completes first (new play)
        fetcher.succeed(P1, "One", Some(sample_play("fractureray", 9_990_000, 0, 0)));
        let (handle, _) = spawn(fetcher);

        handle.init_match(codes(&[P1])).await.unwrap();
        handle.select_song("fractureray".into()).await.unwrap();
        handle.set_duration(5).await.unwrap();
        handle.start_round().await.unwrap();

        // Kick off the slow resync while the round is running
        handle.resync(P1.to_string()).await.unwrap();

        // Round expires at t+5s and applies the newer poll
        tokio::time::sleep(Duration::from_secs(6)).await;
        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.rows[0].score, Some(9_990_000));

        // The stale resync settles at t+30s and must be dropped
        tokio::time::sleep(Duration::from_secs(30)).await;
        let view = handle.scoreboard().await.unwrap();
        assert_eq!(view.rows[0].score, Some(9_990_000));
    }

    #[tokio::test]
    async fn resync_is_refused_for_disqualified_players() {
        let fetcher = MockFetcher::new();
        fetcher.succeed(P1, "One", None);
        let (handle, _) = spawn(fetcher);

        handle.init_match(codes(&[P1])).await.unwrap();
        handle.disqualify(P1.to_string()).await.unwrap();
        assert!(matches!(
            handle.resync(P1.to_string()).await,
            Err(EngineError::PlayerDisqualified(_))
        ));
    }

    #[tokio::test]
    async fn guards_reject_out_of_phase_actions() {
        let (handle, _) = spawn(MockFetcher::new());

        assert!(matches!(
            handle.rank_players().await,
            Err(EngineError::Guard { .. })
        ));
        assert!(matches!(
            handle.end_round().await,
            Err(EngineError::Guard { .. })
        ));
        assert!(matches!(
            handle.select_song("fractureray".into()).await,
            Err(EngineError::Guard { .. })
        ));
        assert!(matches!(
            handle.disqualify(P1.to_string()).await,
            Err(EngineError::Guard { .. })
        ));
    }
}

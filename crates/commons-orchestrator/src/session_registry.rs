//! Entry point for every orchestrator operation.
//!
//! The registry maps class codes and run ids to runs, and game ids to game
//! handles. These maps are the only state shared across runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use commons_core::{
    current_unix_timestamp_ms, normalize_class_code, DashboardToken, GameId, PlayerId, RunId,
};
use commons_dashboard::{EventJournal, JournalEntry, JournalError, RunAggregate};
use commons_game::{Decision, GameConfig, GameView, PlayerStatus, ScoringEngine};
use tokio::sync::{broadcast, watch};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::game_actor::{GameHandle, GameUpdate};
use crate::matchmaking::JoinOutcome;
use crate::run_context::{GameDirectory, RunContext};

/// Immutable record of one instructor-created run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSession {
    pub class_code: String,
    pub run_id: RunId,
    pub dashboard_token: DashboardToken,
    pub created_unix_ms: u64,
}

/// Read access to a run's dashboard, granted after token verification.
#[derive(Debug, Clone)]
pub struct DashboardHandle {
    run_id: RunId,
    class_code: String,
    journal: Arc<EventJournal>,
}

impl DashboardHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn class_code(&self) -> &str {
        &self.class_code
    }

    pub fn snapshot(&self) -> Arc<RunAggregate> {
        self.journal.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<RunAggregate>> {
        self.journal.subscribe()
    }

    pub fn events_since(&self, sequence: u64) -> Result<Vec<JournalEntry>, JournalError> {
        self.journal.events_since(sequence)
    }
}

pub struct SessionRegistry {
    engine: Arc<ScoringEngine>,
    game_config: GameConfig,
    runs: RwLock<HashMap<RunId, Arc<RunContext>>>,
    class_codes: RwLock<HashMap<String, RunId>>,
    directory: Arc<GameDirectory>,
}

impl SessionRegistry {
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        let engine = ScoringEngine::new(config.scoring).context("failed to build scoring engine")?;
        tracing::debug!(
            group_size = engine.group_size(),
            benchmark = engine.benchmark(),
            "session registry ready"
        );
        Ok(Self {
            engine: Arc::new(engine),
            game_config: config.game,
            runs: RwLock::new(HashMap::new()),
            class_codes: RwLock::new(HashMap::new()),
            directory: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    pub fn benchmark(&self) -> i64 {
        self.engine.benchmark()
    }

    /// Opens a new run for `class_code`.
    ///
    /// Reusing a class code points it at the new run; earlier runs keep
    /// serving their games and dashboards.
    pub fn create_session(&self, class_code: &str) -> Result<ClassSession, OrchestratorError> {
        let class_code = normalize_class_code(class_code)?;
        let session = ClassSession {
            class_code: class_code.clone(),
            run_id: RunId::generate(),
            dashboard_token: DashboardToken::generate(),
            created_unix_ms: current_unix_timestamp_ms(),
        };
        let run = RunContext::open(
            session.clone(),
            Arc::clone(&self.engine),
            self.game_config.clone(),
            Arc::clone(&self.directory),
        )?;

        self.runs
            .write()
            .map_err(|_| OrchestratorError::Poisoned("run registry"))?
            .insert(session.run_id.clone(), run);
        let previous = self
            .class_codes
            .write()
            .map_err(|_| OrchestratorError::Poisoned("class code index"))?
            .insert(class_code.clone(), session.run_id.clone());

        tracing::info!(
            class_code = %class_code,
            run_id = %session.run_id,
            replaced_run = previous.as_ref().map(|run_id| run_id.as_str()),
            "class session created"
        );
        Ok(session)
    }

    pub fn resolve_dashboard(
        &self,
        run_id: &RunId,
        token: &str,
    ) -> Result<DashboardHandle, OrchestratorError> {
        let run = self.run(run_id)?;
        if !run.session.dashboard_token.matches(token) {
            tracing::debug!(run_id = %run_id, "dashboard token rejected");
            return Err(OrchestratorError::Unauthorized(
                "dashboard token does not match this run",
            ));
        }
        Ok(DashboardHandle {
            run_id: run.session.run_id.clone(),
            class_code: run.session.class_code.clone(),
            journal: Arc::clone(&run.journal),
        })
    }

    /// Current session for a class code, case-insensitively.
    pub fn resolve_class_code(&self, class_code: &str) -> Result<ClassSession, OrchestratorError> {
        let class_code = normalize_class_code(class_code)?;
        let run_id = self
            .class_codes
            .read()
            .map_err(|_| OrchestratorError::Poisoned("class code index"))?
            .get(&class_code)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("class code", &class_code))?;
        self.session(&run_id)
    }

    pub fn session(&self, run_id: &RunId) -> Result<ClassSession, OrchestratorError> {
        Ok(self.run(run_id)?.session.clone())
    }

    /// Every session, oldest first.
    pub fn list_sessions(&self) -> Result<Vec<ClassSession>, OrchestratorError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| OrchestratorError::Poisoned("run registry"))?;
        let mut sessions = runs
            .values()
            .map(|run| run.session.clone())
            .collect::<Vec<_>>();
        sessions.sort_by(|left, right| {
            left.created_unix_ms
                .cmp(&right.created_unix_ms)
                .then_with(|| left.run_id.cmp(&right.run_id))
        });
        Ok(sessions)
    }

    pub fn join_queue(
        &self,
        run_id: &RunId,
        player_id: PlayerId,
    ) -> Result<JoinOutcome, OrchestratorError> {
        let run = self.run(run_id)?;
        let outcome = run.join(player_id.clone())?;
        tracing::debug!(run_id = %run_id, player_id = %player_id, outcome = ?outcome, "player joined");
        Ok(outcome)
    }

    /// Voluntary leave. Leaving while seated abandons the whole game.
    pub async fn leave_queue(
        &self,
        run_id: &RunId,
        player_id: &PlayerId,
    ) -> Result<PlayerStatus, OrchestratorError> {
        self.run(run_id)?.depart(player_id, false).await
    }

    /// Transport-level disconnect of a player.
    pub async fn disconnect(
        &self,
        run_id: &RunId,
        player_id: &PlayerId,
    ) -> Result<PlayerStatus, OrchestratorError> {
        self.run(run_id)?.depart(player_id, true).await
    }

    pub fn player_status(
        &self,
        run_id: &RunId,
        player_id: &PlayerId,
    ) -> Result<PlayerStatus, OrchestratorError> {
        self.run(run_id)?.status_of(player_id)
    }

    /// Submits a decision. Resolves once the game actor accepted or rejected it.
    pub async fn submit_move(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        round: u8,
        decision: Decision,
    ) -> Result<(), OrchestratorError> {
        let handle = self.seated_game(game_id, player_id)?;
        handle.submit_move(player_id.clone(), round, decision).await
    }

    pub async fn ready(&self, game_id: &GameId, player_id: &PlayerId) -> Result<(), OrchestratorError> {
        let handle = self.seated_game(game_id, player_id)?;
        handle.ready(player_id.clone()).await
    }

    pub fn game(&self, game_id: &GameId) -> Result<GameHandle, OrchestratorError> {
        self.directory
            .read()
            .map_err(|_| OrchestratorError::Poisoned("game directory"))?
            .get(game_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("game", game_id))
    }

    pub fn game_view(&self, game_id: &GameId) -> Result<GameView, OrchestratorError> {
        Ok(self.game(game_id)?.view())
    }

    /// Current view plus the live update stream of a game, for a seated player.
    pub fn subscribe_game(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> Result<(GameView, broadcast::Receiver<GameUpdate>), OrchestratorError> {
        let handle = self.seated_game(game_id, player_id)?;
        let updates = handle.subscribe();
        Ok((handle.view(), updates))
    }

    /// Abandons every game that is still running.
    pub fn shutdown(&self) -> Result<(), OrchestratorError> {
        let directory = self
            .directory
            .read()
            .map_err(|_| OrchestratorError::Poisoned("game directory"))?;
        for handle in directory.values() {
            handle.shutdown();
        }
        tracing::info!(games = directory.len(), "orchestrator shutdown requested");
        Ok(())
    }

    fn run(&self, run_id: &RunId) -> Result<Arc<RunContext>, OrchestratorError> {
        self.runs
            .read()
            .map_err(|_| OrchestratorError::Poisoned("run registry"))?
            .get(run_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("run", run_id))
    }

    /// Game handle for `game_id`, provided `player_id` holds one of its seats.
    pub fn seated_game(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> Result<GameHandle, OrchestratorError> {
        let handle = self.game(game_id)?;
        if !handle.is_seated(player_id) {
            return Err(OrchestratorError::Unauthorized(
                "player is not seated in this game",
            ));
        }
        Ok(handle)
    }
}

#[cfg(test)]
mod tests;

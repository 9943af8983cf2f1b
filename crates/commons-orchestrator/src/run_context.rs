use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use commons_core::{GameId, PlayerId};
use commons_dashboard::{EventJournal, RunEvent};
use commons_game::{GameConfig, GameState, PlayerStatus, ScoringEngine};

use crate::error::OrchestratorError;
use crate::game_actor::{spawn_game_actor, GameHandle};
use crate::matchmaking::{Departure, JoinOutcome, Roster};
use crate::session_registry::ClassSession;

/// Routing index of every game in the registry, across runs.
pub(crate) type GameDirectory = RwLock<HashMap<GameId, GameHandle>>;

/// Mutable state of one run: its roster, journal, and the shared game directory.
pub(crate) struct RunContext {
    pub(crate) session: ClassSession,
    pub(crate) engine: Arc<ScoringEngine>,
    pub(crate) game_config: GameConfig,
    pub(crate) journal: Arc<EventJournal>,
    roster: Mutex<Roster>,
    directory: Arc<GameDirectory>,
}

impl RunContext {
    pub(crate) fn open(
        session: ClassSession,
        engine: Arc<ScoringEngine>,
        game_config: GameConfig,
        directory: Arc<GameDirectory>,
    ) -> Result<Arc<Self>, OrchestratorError> {
        let journal = Arc::new(EventJournal::new());
        journal.append(RunEvent::RunOpened {
            run_id: session.run_id.clone(),
            class_code: session.class_code.clone(),
            benchmark: engine.benchmark(),
            group_size: engine.group_size(),
        })?;
        Ok(Arc::new(Self {
            session,
            engine,
            game_config,
            journal,
            roster: Mutex::new(Roster::default()),
            directory,
        }))
    }

    fn lock_roster(&self) -> Result<std::sync::MutexGuard<'_, Roster>, OrchestratorError> {
        self.roster
            .lock()
            .map_err(|_| OrchestratorError::Poisoned("run roster"))
    }

    /// Queues `player_id`, forming and starting a game when a group fills.
    ///
    /// The new game is registered before the roster lock is released so every
    /// seated player can address it as soon as they learn its id.
    pub(crate) fn join(
        self: &Arc<Self>,
        player_id: PlayerId,
    ) -> Result<JoinOutcome, OrchestratorError> {
        let mut roster = self.lock_roster()?;
        let admission = roster.join(player_id, self.engine.group_size())?;
        self.journal.append_all(admission.events)?;

        if let Some(group) = admission.formed {
            tracing::info!(
                run_id = %self.session.run_id,
                game_id = %group.game_id,
                players = group.players.len(),
                "game formed"
            );
            let (state, transitions) = GameState::form(
                group.game_id,
                self.session.run_id.clone(),
                group.players,
                Arc::clone(&self.engine),
                self.game_config.require_ready_handshake,
            );
            let handle = spawn_game_actor(state, transitions, Arc::clone(self));
            self.directory
                .write()
                .map_err(|_| OrchestratorError::Poisoned("game directory"))?
                .insert(handle.game_id().clone(), handle);
        }
        Ok(admission.outcome)
    }

    /// Leave (`disconnected == false`) or transport disconnect. Returns the
    /// player's status once the departure has been applied.
    pub(crate) async fn depart(
        &self,
        player_id: &PlayerId,
        disconnected: bool,
    ) -> Result<PlayerStatus, OrchestratorError> {
        let departure = {
            let mut roster = self.lock_roster()?;
            let (departure, events) = if disconnected {
                roster.disconnect(player_id)?
            } else {
                roster.leave(player_id)?
            };
            self.journal.append_all(events)?;
            departure
        };

        match departure {
            Departure::Settled(status) => Ok(status),
            Departure::InGame(game_id) => {
                if let Some(handle) = self.game(&game_id)? {
                    handle.depart(player_id.clone(), disconnected).await;
                }
                self.status_of(player_id)
            }
        }
    }

    /// Journals one batch of game events. When `settle` is given, the seated
    /// players' status changes join the same append, ahead of the terminal
    /// game event, so no journal prefix ending at that event shows a finished
    /// game whose players are still seated.
    pub(crate) fn commit_game_events(
        &self,
        mut events: Vec<RunEvent>,
        settle: Option<(&[PlayerId], PlayerStatus)>,
    ) -> Result<(), OrchestratorError> {
        let mut roster = self.lock_roster()?;
        if let Some((players, to)) = settle {
            let terminal = events
                .iter()
                .position(|event| {
                    matches!(
                        event,
                        RunEvent::GameCompleted { .. } | RunEvent::GameAbandoned { .. }
                    )
                })
                .unwrap_or(events.len());
            let tail = events.split_off(terminal);
            events.extend(roster.settle(players, to));
            events.extend(tail);
        }
        self.journal.append_all(events)?;
        Ok(())
    }

    pub(crate) fn status_of(&self, player_id: &PlayerId) -> Result<PlayerStatus, OrchestratorError> {
        self.lock_roster()?
            .record(player_id)
            .map(|record| record.status)
            .ok_or_else(|| OrchestratorError::not_found("player", player_id))
    }

    pub(crate) fn game(&self, game_id: &GameId) -> Result<Option<GameHandle>, OrchestratorError> {
        let directory = self
            .directory
            .read()
            .map_err(|_| OrchestratorError::Poisoned("game directory"))?;
        Ok(directory.get(game_id).cloned())
    }
}

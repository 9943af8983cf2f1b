//! Per-run roster: player statuses plus the FIFO waiting queue.
//!
//! All roster mutations happen under the owning run's mutex. A join that
//! brings the queue to the group size drains exactly that many players in
//! arrival order within the same call, so a player can never land in two
//! games and a game never receives a partial group.

use std::collections::{HashMap, VecDeque};

use commons_core::{GameId, PlayerId};
use commons_dashboard::RunEvent;
use commons_game::{PlayerStatus, StatusTransitionError};
use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum JoinOutcome {
    /// `position` is 1-based.
    Queued { position: usize },
    #[serde(rename_all = "camelCase")]
    InGame { game_id: GameId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub status: PlayerStatus,
    pub game_id: Option<GameId>,
}

/// A group drained from the queue, in seat order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormedGroup {
    pub game_id: GameId,
    pub players: Vec<PlayerId>,
}

/// Result of one join: the caller's outcome plus the journal events it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub outcome: JoinOutcome,
    pub formed: Option<FormedGroup>,
    pub events: Vec<RunEvent>,
}

/// Where a leaving or disconnecting player ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    Settled(PlayerStatus),
    /// The player is seated; the owning game decides the outcome.
    InGame(GameId),
}

#[derive(Debug, Default)]
pub struct Roster {
    players: HashMap<PlayerId, PlayerRecord>,
    queue: VecDeque<PlayerId>,
}

impl Roster {
    pub fn record(&self, player_id: &PlayerId) -> Option<&PlayerRecord> {
        self.players.get(player_id)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// 1-based queue position of `player_id`.
    pub fn position(&self, player_id: &PlayerId) -> Option<usize> {
        self.queue
            .iter()
            .position(|queued| queued == player_id)
            .map(|index| index + 1)
    }

    pub fn join(
        &mut self,
        player_id: PlayerId,
        group_size: usize,
    ) -> Result<Admission, OrchestratorError> {
        let mut events = Vec::new();
        let known = self.players.get(&player_id).map(|record| record.status);
        let status = match known {
            Some(status) => status,
            None => {
                self.set_status(&player_id, PlayerStatus::Connected, &mut events)?;
                PlayerStatus::Connected
            }
        };

        match status {
            PlayerStatus::Queued => {
                let position = self.position(&player_id).ok_or_else(|| {
                    OrchestratorError::not_found("queued player", player_id.as_str())
                })?;
                return Ok(Admission {
                    outcome: JoinOutcome::Queued { position },
                    formed: None,
                    events,
                });
            }
            PlayerStatus::InGame => {
                let game_id = self
                    .players
                    .get(&player_id)
                    .and_then(|record| record.game_id.clone())
                    .ok_or_else(|| OrchestratorError::not_found("game for player", &player_id))?;
                return Ok(Admission {
                    outcome: JoinOutcome::InGame { game_id },
                    formed: None,
                    events,
                });
            }
            PlayerStatus::Completed | PlayerStatus::Abandoned => {
                return Err(OrchestratorError::PlayerFinished {
                    player_id: player_id.to_string(),
                    status,
                });
            }
            PlayerStatus::Connected => {}
        }

        self.set_status(&player_id, PlayerStatus::Queued, &mut events)?;
        self.queue.push_back(player_id.clone());

        let formed = self.drain_group(group_size, &mut events)?;
        let outcome = match &formed {
            Some(group) if group.players.contains(&player_id) => JoinOutcome::InGame {
                game_id: group.game_id.clone(),
            },
            _ => JoinOutcome::Queued {
                position: self.position(&player_id).unwrap_or(self.queue.len()),
            },
        };
        Ok(Admission {
            outcome,
            formed,
            events,
        })
    }

    fn drain_group(
        &mut self,
        group_size: usize,
        events: &mut Vec<RunEvent>,
    ) -> Result<Option<FormedGroup>, StatusTransitionError> {
        if group_size == 0 || self.queue.len() < group_size {
            return Ok(None);
        }
        let game_id = GameId::generate();
        let players = self.queue.drain(..group_size).collect::<Vec<_>>();
        events.push(RunEvent::GameStarted {
            game_id: game_id.clone(),
            players: players.clone(),
        });
        for player_id in &players {
            self.set_status(player_id, PlayerStatus::InGame, events)?;
            if let Some(record) = self.players.get_mut(player_id) {
                record.game_id = Some(game_id.clone());
            }
        }
        Ok(Some(FormedGroup { game_id, players }))
    }

    /// Voluntary leave. A queued player goes back to `Connected`.
    pub fn leave(
        &mut self,
        player_id: &PlayerId,
    ) -> Result<(Departure, Vec<RunEvent>), OrchestratorError> {
        self.depart(player_id, PlayerStatus::Connected, false)
    }

    /// Transport disconnect. A connected or queued player is abandoned.
    pub fn disconnect(
        &mut self,
        player_id: &PlayerId,
    ) -> Result<(Departure, Vec<RunEvent>), OrchestratorError> {
        self.depart(player_id, PlayerStatus::Abandoned, true)
    }

    fn depart(
        &mut self,
        player_id: &PlayerId,
        queued_target: PlayerStatus,
        disconnecting: bool,
    ) -> Result<(Departure, Vec<RunEvent>), OrchestratorError> {
        let record = self
            .players
            .get(player_id)
            .ok_or_else(|| OrchestratorError::not_found("player", player_id))?;
        let mut events = Vec::new();
        let departure = match (record.status, record.game_id.clone()) {
            (PlayerStatus::Queued, _) => {
                self.queue.retain(|queued| queued != player_id);
                self.set_status(player_id, queued_target, &mut events)?;
                Departure::Settled(queued_target)
            }
            (PlayerStatus::Connected, _) if disconnecting => {
                self.set_status(player_id, PlayerStatus::Abandoned, &mut events)?;
                Departure::Settled(PlayerStatus::Abandoned)
            }
            (PlayerStatus::Connected, _) => Departure::Settled(PlayerStatus::Connected),
            (PlayerStatus::InGame, Some(game_id)) => Departure::InGame(game_id),
            (PlayerStatus::InGame, None) => {
                return Err(OrchestratorError::not_found("game for player", player_id));
            }
            (status, _) if disconnecting => Departure::Settled(status),
            (status, _) => {
                return Err(OrchestratorError::PlayerFinished {
                    player_id: player_id.to_string(),
                    status,
                });
            }
        };
        Ok((departure, events))
    }

    /// Moves every seated player of a finished game to `to`. Players whose
    /// current status cannot reach `to` are left untouched.
    pub fn settle(&mut self, players: &[PlayerId], to: PlayerStatus) -> Vec<RunEvent> {
        let mut events = Vec::new();
        for player_id in players {
            if !self.players.contains_key(player_id) {
                continue;
            }
            if let Err(error) = self.set_status(player_id, to, &mut events) {
                tracing::warn!(
                    player_id = %player_id,
                    error = %error,
                    "refused to settle player"
                );
            }
        }
        events
    }

    /// Writes `to` and journals the change. Unknown players may only enter as
    /// `Connected`; known players must follow the lifecycle.
    fn set_status(
        &mut self,
        player_id: &PlayerId,
        to: PlayerStatus,
        events: &mut Vec<RunEvent>,
    ) -> Result<(), StatusTransitionError> {
        let from = self.players.get(player_id).map(|record| record.status);
        match from {
            Some(current) => {
                current.ensure_transition(to)?;
                if current == to {
                    return Ok(());
                }
            }
            None if to != PlayerStatus::Connected => {
                return Err(StatusTransitionError {
                    from: PlayerStatus::Connected,
                    to,
                });
            }
            None => {}
        }
        let record = self
            .players
            .entry(player_id.clone())
            .or_insert(PlayerRecord {
                status: to,
                game_id: None,
            });
        record.status = to;
        events.push(RunEvent::PlayerStatusChanged {
            player_id: player_id.clone(),
            from,
            to,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{Departure, JoinOutcome, Roster};
    use commons_core::PlayerId;
    use commons_dashboard::{RunAggregate, RunEvent};
    use commons_game::PlayerStatus;

    use crate::error::OrchestratorError;

    fn player(index: usize) -> PlayerId {
        PlayerId::from_raw(format!("student-{index}"))
    }

    #[test]
    fn unit_first_joins_are_queued_in_arrival_order() {
        let mut roster = Roster::default();
        for index in 1..=3 {
            let admission = roster.join(player(index), 4).expect("join");
            assert_eq!(admission.outcome, JoinOutcome::Queued { position: index });
            assert!(admission.formed.is_none());
        }
        assert_eq!(roster.queue_len(), 3);
    }

    #[test]
    fn functional_fourth_join_drains_a_full_group() {
        let mut roster = Roster::default();
        for index in 1..=3 {
            roster.join(player(index), 4).expect("join");
        }
        let admission = roster.join(player(4), 4).expect("join");
        let group = admission.formed.expect("group formed");
        assert_eq!(group.players, (1..=4).map(player).collect::<Vec<_>>());
        assert_eq!(
            admission.outcome,
            JoinOutcome::InGame {
                game_id: group.game_id.clone()
            }
        );
        assert_eq!(roster.queue_len(), 0);
        for index in 1..=4 {
            let record = roster.record(&player(index)).expect("record");
            assert_eq!(record.status, PlayerStatus::InGame);
            assert_eq!(record.game_id.as_ref(), Some(&group.game_id));
        }
        assert!(admission
            .events
            .iter()
            .any(|event| matches!(event, RunEvent::GameStarted { .. })));
    }

    #[test]
    fn functional_rejoin_reports_current_position_or_game() {
        let mut roster = Roster::default();
        roster.join(player(1), 4).expect("join");
        roster.join(player(2), 4).expect("join");
        let again = roster.join(player(1), 4).expect("rejoin");
        assert_eq!(again.outcome, JoinOutcome::Queued { position: 1 });
        assert!(again.events.is_empty());

        roster.join(player(3), 4).expect("join");
        let last = roster.join(player(4), 4).expect("join");
        let game_id = last.formed.expect("group").game_id;
        let again = roster.join(player(2), 4).expect("rejoin");
        assert_eq!(again.outcome, JoinOutcome::InGame { game_id });
    }

    #[test]
    fn regression_ten_joins_form_two_games_and_leave_two_waiting() {
        let mut roster = Roster::default();
        let mut seated = HashSet::new();
        let mut games = 0;
        for index in 1..=10 {
            if let Some(group) = roster.join(player(index), 4).expect("join").formed {
                games += 1;
                assert_eq!(group.players.len(), 4);
                for seated_player in group.players {
                    assert!(seated.insert(seated_player), "player seated twice");
                }
            }
        }
        assert_eq!(games, 2);
        assert_eq!(roster.queue_len(), 2);
        assert_eq!(roster.position(&player(10)), Some(2));
    }

    #[test]
    fn functional_leave_returns_queued_player_to_connected() {
        let mut roster = Roster::default();
        roster.join(player(1), 4).expect("join");
        roster.join(player(2), 4).expect("join");
        let (departure, events) = roster.leave(&player(1)).expect("leave");
        assert_eq!(departure, Departure::Settled(PlayerStatus::Connected));
        assert_eq!(events.len(), 1);
        assert_eq!(roster.position(&player(2)), Some(1));
        let rejoin = roster.join(player(1), 4).expect("rejoin");
        assert_eq!(rejoin.outcome, JoinOutcome::Queued { position: 2 });
    }

    #[test]
    fn functional_disconnect_abandons_waiting_player() {
        let mut roster = Roster::default();
        roster.join(player(1), 4).expect("join");
        let (departure, _) = roster.disconnect(&player(1)).expect("disconnect");
        assert_eq!(departure, Departure::Settled(PlayerStatus::Abandoned));
        assert_eq!(roster.queue_len(), 0);
        assert!(matches!(
            roster.join(player(1), 4),
            Err(OrchestratorError::PlayerFinished { .. })
        ));
        let (departure, events) = roster.disconnect(&player(1)).expect("second disconnect");
        assert_eq!(departure, Departure::Settled(PlayerStatus::Abandoned));
        assert!(events.is_empty());
    }

    #[test]
    fn regression_leave_for_unknown_player_is_not_found() {
        let mut roster = Roster::default();
        assert!(matches!(
            roster.leave(&player(9)),
            Err(OrchestratorError::NotFound { .. })
        ));
    }

    #[test]
    fn functional_seated_departure_is_delegated_then_settled() {
        let mut roster = Roster::default();
        let mut formed = None;
        for index in 1..=4 {
            formed = roster.join(player(index), 4).expect("join").formed.or(formed);
        }
        let group = formed.expect("group");
        let (departure, events) = roster.leave(&player(2)).expect("leave");
        assert_eq!(departure, Departure::InGame(group.game_id.clone()));
        assert!(events.is_empty());

        let events = roster.settle(&group.players, PlayerStatus::Abandoned);
        assert_eq!(events.len(), 4);
        assert!(roster.settle(&group.players, PlayerStatus::Completed).is_empty());
        assert!(matches!(
            roster.leave(&player(2)),
            Err(OrchestratorError::PlayerFinished { .. })
        ));
    }

    #[test]
    fn regression_settle_refuses_lifecycle_jumps() {
        let mut roster = Roster::default();
        roster.join(player(1), 4).expect("join");
        roster.leave(&player(1)).expect("leave");

        assert!(roster.settle(&[player(1)], PlayerStatus::Completed).is_empty());
        assert_eq!(
            roster.record(&player(1)).map(|record| record.status),
            Some(PlayerStatus::Connected)
        );

        let events = roster.settle(&[player(1)], PlayerStatus::Abandoned);
        assert_eq!(
            events,
            vec![RunEvent::PlayerStatusChanged {
                player_id: player(1),
                from: Some(PlayerStatus::Connected),
                to: PlayerStatus::Abandoned,
            }]
        );
        assert!(roster.settle(&[player(1)], PlayerStatus::Connected).is_empty());
        assert!(roster.settle(&[player(1)], PlayerStatus::Abandoned).is_empty());
        assert_eq!(
            roster.record(&player(1)).map(|record| record.status),
            Some(PlayerStatus::Abandoned)
        );
    }

    #[test]
    fn integration_roster_events_fold_into_queue_counts() {
        let mut roster = Roster::default();
        let mut events = Vec::new();
        for index in 1..=6 {
            events.extend(roster.join(player(index), 4).expect("join").events);
        }
        let aggregate = RunAggregate::fold(&events);
        assert_eq!(aggregate.connected, 6);
        assert_eq!(aggregate.in_queue, 2);
        assert_eq!(aggregate.active_games, 1);
    }
}

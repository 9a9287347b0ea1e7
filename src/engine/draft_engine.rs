use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::draft::{Action, DRAFT_SEQUENCE, DraftState, Phase, Team};
use super::error::DraftError;
use super::events::{Role, ServerEvent, SessionId};
use super::room::{ParticipantSlot, Room};
use super::session::{MAX_OUTBOUND_QUEUE, PlayerSession};
use super::validation;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an unoccupied room survives before it is deleted.
    pub room_idle_timeout: Duration,
    /// Code of a pinned room created at startup and exempt from expiry.
    pub default_room: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            room_idle_timeout: Duration::from_secs(300),
            default_room: None,
        }
    }
}

/// The central hub that owns every room and every connected session.
/// Transport-agnostic — the TCP adapter and the HTTP surface both call
/// into this. All room mutation happens while holding that room's map
/// entry, which is the per-room critical section.
pub struct DraftEngine {
    /// Handle to ourselves for the cleanup tasks we spawn.
    me: Weak<DraftEngine>,
    /// All currently connected sessions, keyed by session ID.
    sessions: DashMap<SessionId, Arc<PlayerSession>>,
    /// All live rooms, keyed by normalized room code.
    rooms: DashMap<String, Room>,
    /// Which room each session is attached to, if any.
    session_rooms: DashMap<SessionId, String>,
    /// Pending expiry timers for unoccupied rooms.
    cleanup_timers: DashMap<String, CancellationToken>,
    config: EngineConfig,
}

impl DraftEngine {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            session_rooms: DashMap::new(),
            cleanup_timers: DashMap::new(),
            config,
        })
    }

    // ── Session management ──────────────────────────────────────────

    /// Register a new connection. Returns the session ID and the receiver
    /// the transport drains into its socket.
    pub fn register_session(&self) -> (SessionId, mpsc::Receiver<ServerEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(MAX_OUTBOUND_QUEUE);
        self.sessions
            .insert(session_id, Arc::new(PlayerSession::new(session_id, tx)));
        info!(%session_id, "session connected");
        (session_id, rx)
    }

    /// Tear down a connection: vacate its room (if any), notify the
    /// remaining occupants, and arm the room's expiry timer when it is
    /// left unoccupied.
    pub fn detach(&self, session_id: SessionId) {
        self.sessions.remove(&session_id);
        self.leave_current_room(session_id);
        info!(%session_id, "session disconnected");
    }

    pub fn get_session(&self, session_id: SessionId) -> Option<Arc<PlayerSession>> {
        self.sessions.get(&session_id).map(|s| s.clone())
    }

    /// Deliver an event to one session's outbound queue.
    pub fn send_to_session(&self, session_id: SessionId, event: ServerEvent) {
        if let Some(session) = self.sessions.get(&session_id)
            && !session.send(event)
        {
            warn!(%session_id, "failed to send event to session (queue full or closed)");
        }
    }

    // ── Room registry ───────────────────────────────────────────────

    pub fn room_exists(&self, room_code: &str) -> bool {
        self.rooms
            .contains_key(&validation::normalize_room_code(room_code))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Current draft state of a room, for the HTTP snapshot endpoint.
    /// Never creates the room.
    pub fn draft_snapshot(&self, room_code: &str) -> Result<DraftState, DraftError> {
        let code = validation::normalize_room_code(room_code);
        self.rooms
            .get(&code)
            .map(|room| room.draft.clone())
            .ok_or(DraftError::RoomNotFound(code))
    }

    /// Delete a room outright. Pinned rooms are refused. Returns whether
    /// a room was removed.
    pub fn delete_room(&self, room_code: &str) -> bool {
        let code = validation::normalize_room_code(room_code);
        let removed = self
            .rooms
            .remove_if(&code, |_, room| !room.pinned)
            .is_some();
        if removed {
            self.cancel_cleanup(&code);
            info!(room_code = %code, "room deleted");
        }
        removed
    }

    /// Create the configured default room if it does not exist yet.
    /// The room is pinned: it survives being unoccupied indefinitely.
    pub fn ensure_default_room(&self) -> Option<String> {
        let code = validation::normalize_room_code(self.config.default_room.as_deref()?);
        if validation::validate_room_code(&code).is_err() {
            warn!(room_code = %code, "configured default room code is invalid, skipping");
            return None;
        }
        self.rooms.entry(code.clone()).or_insert_with(|| {
            info!(room_code = %code, "default room ready");
            Room::new(code.clone(), true)
        });
        Some(code)
    }

    // ── Attach and detach ───────────────────────────────────────────

    /// Create a fresh room and seat the creator as Blue, captain of Blue,
    /// and host. Returns the generated room code.
    pub fn create_and_attach(
        &self,
        session_id: SessionId,
        player_name: String,
    ) -> Result<String, DraftError> {
        validation::validate_player_name(&player_name)?;
        self.leave_current_room(session_id);

        // Regenerate on the (unlikely) code collision.
        let room_code = loop {
            let candidate = validation::generate_room_code();
            match self.rooms.entry(candidate.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let mut room = Room::new(candidate.clone(), false);
                    room.blue = Some(ParticipantSlot {
                        session_id,
                        display_name: player_name.clone(),
                    });
                    room.blue_captain = Some(player_name.clone());
                    room.host = Some(session_id);
                    slot.insert(room);
                    break candidate;
                }
            }
        };

        self.session_rooms.insert(session_id, room_code.clone());
        info!(%session_id, %room_code, %player_name, "room created");

        let Some(room) = self.rooms.get(&room_code) else {
            return Err(DraftError::RoomNotFound(room_code));
        };
        self.send_to_session(
            session_id,
            ServerEvent::RoomCreated {
                room_code: room_code.clone(),
                role: Role::Blue,
                draft: room.draft.clone(),
                roster: room.roster(),
            },
        );
        drop(room);
        Ok(room_code)
    }

    /// Attach a session to a room: Red if the slot is free, otherwise
    /// Spectator. Unknown codes lazily create an empty room, so a link
    /// shared before anyone arrives still works.
    pub fn join_room(
        &self,
        session_id: SessionId,
        room_code: &str,
        player_name: String,
        captain: bool,
    ) -> Result<Role, DraftError> {
        validation::validate_player_name(&player_name)?;
        validation::validate_room_code(room_code)?;
        let room_code = validation::normalize_room_code(room_code);
        self.leave_current_room(session_id);

        let mut room = self.rooms.entry(room_code.clone()).or_insert_with(|| {
            info!(%room_code, "room created lazily on join");
            Room::new(room_code.clone(), false)
        });
        self.cancel_cleanup(&room_code);

        let role = if room.red.is_none() {
            if captain {
                claim_captain(room.captain_name_mut(Team::Red), &player_name)?;
            }
            room.red = Some(ParticipantSlot {
                session_id,
                display_name: player_name.clone(),
            });
            Role::Red
        } else {
            room.spectators.insert(session_id, player_name.clone());
            Role::Spectator
        };

        self.session_rooms.insert(session_id, room_code.clone());
        info!(%session_id, %room_code, %player_name, ?role, "joined room");

        self.send_to_session(
            session_id,
            ServerEvent::RoomJoined {
                room_code: room_code.clone(),
                role,
                sync: false,
                draft: room.draft.clone(),
                roster: room.roster(),
            },
        );
        if let Some(team) = role.team() {
            self.broadcast_to_room(
                &room,
                &ServerEvent::OpponentJoined {
                    team,
                    player_name: player_name.clone(),
                },
                Some(session_id),
            );
        }
        self.broadcast_to_room(
            &room,
            &ServerEvent::RoomUpdate {
                roster: room.roster(),
            },
            Some(session_id),
        );
        Ok(role)
    }

    /// Re-attach after a connection drop. The caller names the role it held;
    /// it gets that slot back if still free, Spectator otherwise. The reply
    /// snapshot is sync-tagged so clients replay it without animation.
    ///
    /// A session already attached to the room gets a pure snapshot resend,
    /// so repeated rejoins are idempotent.
    pub fn rejoin(
        &self,
        session_id: SessionId,
        room_code: &str,
        claimed: Role,
        player_name: String,
    ) -> Result<Role, DraftError> {
        validation::validate_player_name(&player_name)?;
        validation::validate_room_code(room_code)?;
        let room_code = validation::normalize_room_code(room_code);

        if self
            .session_rooms
            .get(&session_id)
            .is_some_and(|r| *r == room_code)
        {
            let Some(room) = self.rooms.get(&room_code) else {
                return Err(DraftError::RoomNotFound(room_code));
            };
            let role = room.role_of(session_id).unwrap_or(Role::Spectator);
            self.send_to_session(
                session_id,
                ServerEvent::RoomJoined {
                    room_code: room_code.clone(),
                    role,
                    sync: true,
                    draft: room.draft.clone(),
                    roster: room.roster(),
                },
            );
            return Ok(role);
        }

        self.leave_current_room(session_id);

        // An expired room materializes fresh here; its draft is gone but the
        // code stays usable.
        let mut room = self.rooms.entry(room_code.clone()).or_insert_with(|| {
            info!(%room_code, "room re-created on rejoin after expiry");
            Room::new(room_code.clone(), false)
        });
        self.cancel_cleanup(&room_code);

        let role = match claimed.team() {
            Some(team) if room.slot(team).is_none() => {
                *room.slot_mut(team) = Some(ParticipantSlot {
                    session_id,
                    display_name: player_name.clone(),
                });
                claimed
            }
            _ => {
                room.spectators.insert(session_id, player_name.clone());
                Role::Spectator
            }
        };

        self.session_rooms.insert(session_id, room_code.clone());
        info!(%session_id, %room_code, %player_name, ?role, "rejoined room");

        self.send_to_session(
            session_id,
            ServerEvent::RoomJoined {
                room_code: room_code.clone(),
                role,
                sync: true,
                draft: room.draft.clone(),
                roster: room.roster(),
            },
        );
        if let Some(team) = role.team() {
            self.broadcast_to_room(
                &room,
                &ServerEvent::OpponentJoined {
                    team,
                    player_name: player_name.clone(),
                },
                Some(session_id),
            );
        }
        self.broadcast_to_room(
            &room,
            &ServerEvent::RoomUpdate {
                roster: room.roster(),
            },
            Some(session_id),
        );
        Ok(role)
    }

    /// Move a session to another role in its current room. Refused while a
    /// draft is running. Deliberately switching away from a team drops that
    /// player's captain claim; a plain disconnect does not.
    pub fn switch_role(
        &self,
        session_id: SessionId,
        to: Role,
        player_name: String,
        captain: bool,
    ) -> Result<(), DraftError> {
        validation::validate_player_name(&player_name)?;
        let room_code = self.current_room_code(session_id)?;
        let Some(mut room) = self.rooms.get_mut(&room_code) else {
            return Err(DraftError::RoomNotFound(room_code));
        };

        if room.draft.phase == Phase::Drafting {
            return Err(DraftError::DraftInProgress);
        }
        if let Some(team) = to.team() {
            if room
                .slot(team)
                .is_some_and(|slot| slot.session_id != session_id)
            {
                return Err(DraftError::SlotOccupied);
            }
            if captain {
                claim_captain(room.captain_name_mut(team), &player_name)?;
            }
        }

        // All checks passed; now move the occupant.
        if let Some((old_role, old_name)) = room.vacate(session_id)
            && let Some(old_team) = old_role.team()
            && room.captain_name(old_team) == Some(old_name.as_str())
        {
            *room.captain_name_mut(old_team) = None;
        }
        match to.team() {
            Some(team) => {
                *room.slot_mut(team) = Some(ParticipantSlot {
                    session_id,
                    display_name: player_name.clone(),
                });
            }
            None => {
                room.spectators.insert(session_id, player_name.clone());
            }
        }

        info!(%session_id, %room_code, %player_name, role = ?to, "switched role");
        self.broadcast_to_room(
            &room,
            &ServerEvent::TeamSwitched {
                team: to,
                player_name,
            },
            None,
        );
        self.broadcast_to_room(
            &room,
            &ServerEvent::RoomUpdate {
                roster: room.roster(),
            },
            None,
        );
        Ok(())
    }

    // ── Draft operations ────────────────────────────────────────────

    /// Start (or restart) the draft in the session's room. Host-gated;
    /// a vacant host seat is claimed by the caller.
    pub fn start_draft(&self, session_id: SessionId) -> Result<(), DraftError> {
        let room_code = self.current_room_code(session_id)?;
        let Some(mut room) = self.rooms.get_mut(&room_code) else {
            return Err(DraftError::RoomNotFound(room_code));
        };
        require_host(&mut room, session_id)?;

        room.draft = DraftState::default();
        room.draft.phase = Phase::Drafting;
        room.draft.current_team = Some(DRAFT_SEQUENCE[0].team);
        room.draft.current_action = Some(DRAFT_SEQUENCE[0].action);
        room.refresh_session_snapshot();

        info!(%room_code, fearless = room.fearless_enabled, "draft started");
        self.broadcast_to_room(
            &room,
            &ServerEvent::DraftStarted {
                draft: room.draft.clone(),
            },
            None,
        );
        Ok(())
    }

    /// Apply one ban or pick for the session's room. Validation happens in
    /// a fixed order and nothing is mutated until every check has passed.
    pub fn apply_action(
        &self,
        session_id: SessionId,
        champion: String,
    ) -> Result<(), DraftError> {
        validation::validate_champion(&champion)?;
        let room_code = self.current_room_code(session_id)?;
        let Some(mut room) = self.rooms.get_mut(&room_code) else {
            return Err(DraftError::RoomNotFound(room_code));
        };

        if room.draft.phase != Phase::Drafting {
            return Err(DraftError::DraftNotInProgress);
        }
        let Some(step) = room.draft.current_step() else {
            // Turn pointer ran past the table without the phase flipping.
            // Repair rather than panic; the draft is over either way.
            room.draft.phase = Phase::Complete;
            room.draft.current_team = None;
            room.draft.current_action = None;
            return Err(DraftError::DraftAlreadyComplete);
        };

        let actor_team = room.role_of(session_id).and_then(|r| r.team());
        if actor_team != Some(step.team) {
            return Err(DraftError::NotYourTurn);
        }
        if step.action == Action::Ban
            && let Some(captain) = room.captain_name(step.team)
            && room.display_name_of(session_id) != Some(captain)
        {
            return Err(DraftError::OnlyCaptainMayBan);
        }
        if room.draft.champion_used(&champion) {
            return Err(DraftError::ChampionUnavailable(champion));
        }

        room.draft.record(step, champion.clone());
        if step.action == Action::Pick && room.fearless_enabled {
            room.session_used.insert(champion.clone());
            room.refresh_session_snapshot();
        }
        room.draft.advance();

        debug!(
            %room_code,
            team = step.team.as_str(),
            action = ?step.action,
            %champion,
            turn = room.draft.current_turn,
            "draft action applied"
        );
        if room.draft.phase == Phase::Complete {
            info!(%room_code, "draft complete");
        }

        self.broadcast_to_room(
            &room,
            &ServerEvent::DraftUpdate {
                draft: room.draft.clone(),
                sync: false,
            },
            None,
        );
        Ok(())
    }

    /// Turn fearless mode on or off for the session's room. Host-gated.
    /// The canonical used set is kept either way; disabling just stops it
    /// from being transmitted or enforced.
    pub fn toggle_fearless(
        &self,
        session_id: SessionId,
        enabled: bool,
    ) -> Result<(), DraftError> {
        let room_code = self.current_room_code(session_id)?;
        let Some(mut room) = self.rooms.get_mut(&room_code) else {
            return Err(DraftError::RoomNotFound(room_code));
        };
        require_host(&mut room, session_id)?;

        room.fearless_enabled = enabled;
        room.refresh_session_snapshot();
        info!(%room_code, %enabled, "fearless mode toggled");

        self.broadcast_to_room(&room, &ServerEvent::FearlessToggled { enabled }, None);
        self.broadcast_to_room(
            &room,
            &ServerEvent::DraftUpdate {
                draft: room.draft.clone(),
                sync: true,
            },
            None,
        );
        Ok(())
    }

    /// Clear the cross-draft used set. Host-gated.
    pub fn reset_fearless(&self, session_id: SessionId) -> Result<(), DraftError> {
        let room_code = self.current_room_code(session_id)?;
        let Some(mut room) = self.rooms.get_mut(&room_code) else {
            return Err(DraftError::RoomNotFound(room_code));
        };
        require_host(&mut room, session_id)?;

        room.session_used.clear();
        room.refresh_session_snapshot();
        info!(%room_code, "fearless history reset");

        self.broadcast_to_room(&room, &ServerEvent::FearlessReset, None);
        self.broadcast_to_room(
            &room,
            &ServerEvent::DraftUpdate {
                draft: room.draft.clone(),
                sync: true,
            },
            None,
        );
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn current_room_code(&self, session_id: SessionId) -> Result<String, DraftError> {
        self.session_rooms
            .get(&session_id)
            .map(|r| r.clone())
            .ok_or_else(|| DraftError::InvalidInput("no room joined".into()))
    }

    /// Vacate whatever room the session is attached to, tell the remaining
    /// occupants, and arm the expiry timer if the room is now unoccupied.
    fn leave_current_room(&self, session_id: SessionId) {
        let Some((_, room_code)) = self.session_rooms.remove(&session_id) else {
            return;
        };
        let Some(mut room) = self.rooms.get_mut(&room_code) else {
            return;
        };
        // Host authority is connection-scoped.
        if room.host == Some(session_id) {
            room.host = None;
        }
        let Some((role, player_name)) = room.vacate(session_id) else {
            return;
        };
        info!(%session_id, %room_code, %player_name, ?role, "left room");

        self.broadcast_to_room(
            &room,
            &ServerEvent::PlayerDisconnected { player_name, role },
            Some(session_id),
        );
        if let Some(team) = role.team() {
            self.broadcast_to_room(
                &room,
                &ServerEvent::OpponentDisconnected { team },
                Some(session_id),
            );
        }
        self.broadcast_to_room(
            &room,
            &ServerEvent::RoomUpdate {
                roster: room.roster(),
            },
            Some(session_id),
        );

        let arm = room.is_unoccupied() && !room.pinned;
        drop(room);
        if arm {
            self.schedule_cleanup(room_code);
        }
    }

    /// Arm (or re-arm) the expiry timer for an unoccupied room. The room is
    /// deleted when the timer fires unless someone attached in the meantime.
    fn schedule_cleanup(&self, room_code: String) {
        // Upgrade fails only during engine teardown, when expiry is moot.
        let Some(engine) = self.me.upgrade() else {
            return;
        };
        let token = CancellationToken::new();
        if let Some(previous) = self
            .cleanup_timers
            .insert(room_code.clone(), token.clone())
        {
            previous.cancel();
        }
        let delay = self.config.room_idle_timeout;
        debug!(%room_code, ?delay, "room expiry timer armed");

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    engine.cleanup_timers.remove(&room_code);
                    engine.expire_room_if_empty(&room_code);
                }
            }
        });
    }

    fn cancel_cleanup(&self, room_code: &str) {
        if let Some((_, token)) = self.cleanup_timers.remove(room_code) {
            token.cancel();
            debug!(%room_code, "room expiry timer cancelled");
        }
    }

    fn expire_room_if_empty(&self, room_code: &str) {
        let removed = self
            .rooms
            .remove_if(room_code, |_, room| room.is_unoccupied() && !room.pinned)
            .is_some();
        if removed {
            info!(%room_code, "idle room expired");
        }
    }

    /// Send an event to every occupant of a room, optionally excluding one
    /// session (usually the one the event is about).
    fn broadcast_to_room(&self, room: &Room, event: &ServerEvent, exclude: Option<SessionId>) {
        for occupant_id in room.occupant_ids() {
            if Some(occupant_id) == exclude {
                continue;
            }
            if let Some(session) = self.sessions.get(&occupant_id)
                && !session.send(event.clone())
            {
                warn!(%occupant_id, "failed to send event to session (queue full or closed)");
            }
        }
    }
}

/// Claim a captain seat by display name. Idempotent for the same name;
/// a different claimant is refused.
fn claim_captain(claim: &mut Option<String>, player_name: &str) -> Result<(), DraftError> {
    match claim.as_deref() {
        None => {
            *claim = Some(player_name.to_string());
            Ok(())
        }
        Some(existing) if existing == player_name => Ok(()),
        Some(_) => Err(DraftError::CaptainSlotTaken),
    }
}

/// Host-gate a room operation. A vacant host seat goes to the caller, so
/// a room whose creator vanished stays operable.
fn require_host(room: &mut Room, session_id: SessionId) -> Result<(), DraftError> {
    match room.host {
        None => {
            room.host = Some(session_id);
            info!(room_code = %room.id, %session_id, "vacant host seat claimed");
            Ok(())
        }
        Some(host) if host == session_id => Ok(()),
        Some(_) => Err(DraftError::NotAuthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine() -> Arc<DraftEngine> {
        DraftEngine::new(EngineConfig {
            room_idle_timeout: Duration::from_millis(50),
            default_room: None,
        })
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) {
        while rx.try_recv().is_ok() {}
    }

    /// Helper: a room with alice seated Blue (host, captain) and bob Red.
    fn setup_room(
        engine: &DraftEngine,
    ) -> (
        String,
        (SessionId, mpsc::Receiver<ServerEvent>),
        (SessionId, mpsc::Receiver<ServerEvent>),
    ) {
        let (blue, mut blue_rx) = engine.register_session();
        let room_code = engine.create_and_attach(blue, "alice".into()).unwrap();
        let (red, mut red_rx) = engine.register_session();
        engine
            .join_room(red, &room_code, "bob".into(), false)
            .unwrap();
        drain(&mut blue_rx);
        drain(&mut red_rx);
        (room_code, (blue, blue_rx), (red, red_rx))
    }

    /// Helper: walk the full sequence, acting as whichever team is up.
    /// Champions are named after their turn index.
    fn run_draft(engine: &DraftEngine, blue: SessionId, red: SessionId) {
        for (turn, step) in DRAFT_SEQUENCE.iter().enumerate() {
            let actor = match step.team {
                Team::Blue => blue,
                Team::Red => red,
            };
            engine.apply_action(actor, format!("Champion{turn}")).unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_room_seats_creator() {
        let engine = test_engine();
        let (sid, mut rx) = engine.register_session();
        let room_code = engine.create_and_attach(sid, "alice".into()).unwrap();

        assert!(validation::validate_room_code(&room_code).is_ok());
        assert!(engine.room_exists(&room_code));

        match rx.try_recv().unwrap() {
            ServerEvent::RoomCreated {
                room_code: code,
                role,
                draft,
                roster,
            } => {
                assert_eq!(code, room_code);
                assert_eq!(role, Role::Blue);
                assert_eq!(draft.phase, Phase::Idle);
                let blue = roster.blue.unwrap();
                assert_eq!(blue.player_name, "alice");
                assert!(blue.captain);
                assert_eq!(roster.host.as_deref(), Some("alice"));
            }
            other => panic!("expected RoomCreated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_fills_red_then_spectates() {
        let engine = test_engine();
        let (blue, mut blue_rx) = engine.register_session();
        let room_code = engine.create_and_attach(blue, "alice".into()).unwrap();
        drain(&mut blue_rx);

        let (red, mut red_rx) = engine.register_session();
        let role = engine
            .join_room(red, &room_code, "bob".into(), false)
            .unwrap();
        assert_eq!(role, Role::Red);

        match red_rx.try_recv().unwrap() {
            ServerEvent::RoomJoined { role, sync, .. } => {
                assert_eq!(role, Role::Red);
                assert!(!sync);
            }
            other => panic!("expected RoomJoined, got {other:?}"),
        }
        match blue_rx.try_recv().unwrap() {
            ServerEvent::OpponentJoined { team, player_name } => {
                assert_eq!(team, Team::Red);
                assert_eq!(player_name, "bob");
            }
            other => panic!("expected OpponentJoined, got {other:?}"),
        }
        assert!(matches!(
            blue_rx.try_recv().unwrap(),
            ServerEvent::RoomUpdate { .. }
        ));

        let (viewer, mut viewer_rx) = engine.register_session();
        let role = engine
            .join_room(viewer, &room_code, "carol".into(), false)
            .unwrap();
        assert_eq!(role, Role::Spectator);
        match viewer_rx.try_recv().unwrap() {
            ServerEvent::RoomJoined { role, roster, .. } => {
                assert_eq!(role, Role::Spectator);
                assert_eq!(roster.spectators, vec!["carol".to_string()]);
            }
            other => panic!("expected RoomJoined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_unknown_room_creates_it() {
        let engine = test_engine();
        let (sid, _rx) = engine.register_session();

        assert!(!engine.room_exists("FRESH9"));
        let role = engine
            .join_room(sid, "fresh9", "alice".into(), false)
            .unwrap();
        assert_eq!(role, Role::Red);
        assert!(engine.room_exists("FRESH9"));
    }

    #[tokio::test]
    async fn test_start_draft_is_host_gated() {
        let engine = test_engine();
        let (_code, (blue, mut blue_rx), (red, mut red_rx)) = setup_room(&engine);

        assert_eq!(
            engine.start_draft(red),
            Err(DraftError::NotAuthorized),
            "non-host must not start the draft"
        );
        engine.start_draft(blue).unwrap();

        for rx in [&mut blue_rx, &mut red_rx] {
            match rx.try_recv().unwrap() {
                ServerEvent::DraftStarted { draft } => {
                    assert_eq!(draft.phase, Phase::Drafting);
                    assert_eq!(draft.current_turn, 0);
                    assert_eq!(draft.current_team, Some(Team::Blue));
                    assert_eq!(draft.current_action, Some(Action::Ban));
                }
                other => panic!("expected DraftStarted, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_vacant_host_seat_is_claimed() {
        let engine = test_engine();
        let (_code, (blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);

        engine.detach(blue);
        // bob's start succeeds by claiming the vacated host seat.
        engine.start_draft(red).unwrap();
    }

    #[tokio::test]
    async fn test_wrong_turn_is_rejected_without_mutation() {
        let engine = test_engine();
        let (room_code, (blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);
        engine.start_draft(blue).unwrap();

        let before = engine.draft_snapshot(&room_code).unwrap();
        assert_eq!(
            engine.apply_action(red, "Ahri".into()),
            Err(DraftError::NotYourTurn)
        );
        assert_eq!(engine.draft_snapshot(&room_code).unwrap(), before);
    }

    #[tokio::test]
    async fn test_spectator_cannot_act() {
        let engine = test_engine();
        let (room_code, (blue, _blue_rx), (_red, _red_rx)) = setup_room(&engine);
        let (viewer, _viewer_rx) = engine.register_session();
        engine
            .join_room(viewer, &room_code, "carol".into(), false)
            .unwrap();
        engine.start_draft(blue).unwrap();

        assert_eq!(
            engine.apply_action(viewer, "Ahri".into()),
            Err(DraftError::NotYourTurn)
        );
    }

    #[tokio::test]
    async fn test_full_draft_runs_to_completion() {
        let engine = test_engine();
        let (room_code, (blue, mut blue_rx), (red, _red_rx)) = setup_room(&engine);
        engine.start_draft(blue).unwrap();
        drain(&mut blue_rx);

        run_draft(&engine, blue, red);

        let draft = engine.draft_snapshot(&room_code).unwrap();
        assert_eq!(draft.phase, Phase::Complete);
        assert_eq!(draft.current_turn, DRAFT_SEQUENCE.len());
        assert_eq!(draft.current_team, None);
        assert_eq!(draft.blue_bans.len(), 5);
        assert_eq!(draft.red_bans.len(), 5);
        assert_eq!(draft.blue_picks.len(), 5);
        assert_eq!(draft.red_picks.len(), 5);

        // Twenty turn-advancing updates reached the room.
        let mut updates = 0;
        while let Ok(event) = blue_rx.try_recv() {
            if let ServerEvent::DraftUpdate { sync, .. } = event {
                assert!(!sync);
                updates += 1;
            }
        }
        assert_eq!(updates, DRAFT_SEQUENCE.len());

        assert_eq!(
            engine.apply_action(blue, "Late".into()),
            Err(DraftError::DraftNotInProgress)
        );
    }

    #[tokio::test]
    async fn test_duplicate_champion_is_rejected() {
        let engine = test_engine();
        let (_code, (blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);
        engine.start_draft(blue).unwrap();

        engine.apply_action(blue, "Ahri".into()).unwrap();
        assert_eq!(
            engine.apply_action(red, "Ahri".into()),
            Err(DraftError::ChampionUnavailable("Ahri".into()))
        );
        engine.apply_action(red, "Zed".into()).unwrap();
    }

    #[tokio::test]
    async fn test_bans_are_captain_gated() {
        let engine = test_engine();
        let (room_code, (blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);

        // alice leaves; her captain claim on Blue stays behind.
        engine.detach(blue);
        let (carol, _carol_rx) = engine.register_session();
        engine
            .join_room(carol, &room_code, "carol".into(), false)
            .unwrap();
        engine
            .switch_role(carol, Role::Blue, "carol".into(), false)
            .unwrap();

        engine.start_draft(red).unwrap();
        assert_eq!(
            engine.apply_action(carol, "Ahri".into()),
            Err(DraftError::OnlyCaptainMayBan)
        );

        // Rejoining under the captain's name reclaims the seat and the ban.
        engine
            .switch_role(carol, Role::Spectator, "carol".into(), false)
            .unwrap();
        let (alice2, _alice2_rx) = engine.register_session();
        engine
            .rejoin(alice2, &room_code, Role::Blue, "alice".into())
            .unwrap();
        engine.apply_action(alice2, "Ahri".into()).unwrap();
    }

    #[tokio::test]
    async fn test_uncaptained_team_may_ban_freely() {
        let engine = test_engine();
        let (_code, (blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);
        engine.start_draft(blue).unwrap();

        engine.apply_action(blue, "Ahri".into()).unwrap();
        // bob joined without a captain claim and Red has none, so his ban
        // goes through.
        engine.apply_action(red, "Zed".into()).unwrap();
    }

    #[tokio::test]
    async fn test_switch_blocked_during_draft() {
        let engine = test_engine();
        let (_code, (blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);
        engine.start_draft(blue).unwrap();

        assert_eq!(
            engine.switch_role(red, Role::Spectator, "bob".into(), false),
            Err(DraftError::DraftInProgress)
        );
    }

    #[tokio::test]
    async fn test_switch_to_occupied_slot() {
        let engine = test_engine();
        let (_code, (_blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);

        assert_eq!(
            engine.switch_role(red, Role::Blue, "bob".into(), false),
            Err(DraftError::SlotOccupied)
        );
    }

    #[tokio::test]
    async fn test_stale_captain_claim_blocks_new_claimant() {
        let engine = test_engine();
        let (blue, _blue_rx) = engine.register_session();
        let room_code = engine.create_and_attach(blue, "alice".into()).unwrap();
        engine.detach(blue);

        let (bob, _bob_rx) = engine.register_session();
        engine
            .join_room(bob, &room_code, "bob".into(), false)
            .unwrap();
        assert_eq!(
            engine.switch_role(bob, Role::Blue, "bob".into(), true),
            Err(DraftError::CaptainSlotTaken)
        );
        // Without the claim the seat itself is free.
        engine
            .switch_role(bob, Role::Blue, "bob".into(), false)
            .unwrap();
    }

    #[tokio::test]
    async fn test_switch_away_releases_own_captain_claim() {
        let engine = test_engine();
        let (room_code, (blue, _blue_rx), (_red, _red_rx)) = setup_room(&engine);

        engine
            .switch_role(blue, Role::Spectator, "alice".into(), false)
            .unwrap();
        let room = engine.rooms.get(&room_code).unwrap();
        assert_eq!(
            room.blue_captain, None,
            "a deliberate switch gives the claim up, unlike a disconnect"
        );
    }

    #[tokio::test]
    async fn test_fearless_picks_carry_across_drafts() {
        let engine = test_engine();
        let (room_code, (blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);
        engine.toggle_fearless(blue, true).unwrap();

        engine.start_draft(blue).unwrap();
        run_draft(&engine, blue, red);

        // Second draft: turn 6 was Blue's first pick in the first draft.
        engine.start_draft(blue).unwrap();
        assert_eq!(
            engine.apply_action(blue, "Champion6".into()),
            Err(DraftError::ChampionUnavailable("Champion6".into())),
            "a previously picked champion is gone for the whole session"
        );
        // Turn 0 was a ban; bans never enter the session set.
        engine.apply_action(blue, "Champion0".into()).unwrap();

        let draft = engine.draft_snapshot(&room_code).unwrap();
        assert_eq!(draft.session_used.len(), 10);

        // After a reset the pick is available again.
        engine.reset_fearless(blue).unwrap();
        engine.start_draft(blue).unwrap();
        engine.apply_action(blue, "Champion6".into()).unwrap();
    }

    #[tokio::test]
    async fn test_fearless_disabled_transmits_nothing() {
        let engine = test_engine();
        let (room_code, (blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);
        engine.toggle_fearless(blue, true).unwrap();
        engine.start_draft(blue).unwrap();
        run_draft(&engine, blue, red);

        engine.toggle_fearless(blue, false).unwrap();
        let draft = engine.draft_snapshot(&room_code).unwrap();
        assert!(draft.session_used.is_empty());

        // With the mode off the old picks are draftable again.
        engine.start_draft(blue).unwrap();
        engine.apply_action(blue, "Champion6".into()).unwrap();
    }

    #[tokio::test]
    async fn test_fearless_toggle_is_host_gated() {
        let engine = test_engine();
        let (_code, (_blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);

        assert_eq!(
            engine.toggle_fearless(red, true),
            Err(DraftError::NotAuthorized)
        );
        assert_eq!(engine.reset_fearless(red), Err(DraftError::NotAuthorized));
    }

    #[tokio::test]
    async fn test_rejoin_resyncs_mid_draft() {
        let engine = test_engine();
        let (room_code, (blue, mut blue_rx), (red, _red_rx)) = setup_room(&engine);
        engine.start_draft(blue).unwrap();
        engine.apply_action(blue, "Ahri".into()).unwrap();
        engine.apply_action(red, "Zed".into()).unwrap();
        engine.apply_action(blue, "Lux".into()).unwrap();
        drain(&mut blue_rx);

        engine.detach(red);
        assert!(matches!(
            blue_rx.try_recv().unwrap(),
            ServerEvent::PlayerDisconnected { .. }
        ));
        assert!(matches!(
            blue_rx.try_recv().unwrap(),
            ServerEvent::OpponentDisconnected { team: Team::Red }
        ));

        let (bob2, mut bob2_rx) = engine.register_session();
        let role = engine
            .rejoin(bob2, &room_code, Role::Red, "bob".into())
            .unwrap();
        assert_eq!(role, Role::Red);

        match bob2_rx.try_recv().unwrap() {
            ServerEvent::RoomJoined { sync, draft, .. } => {
                assert!(sync, "rejoin snapshots carry the sync tag");
                assert_eq!(draft.current_turn, 3);
                assert_eq!(draft.blue_bans, vec!["Ahri".to_string(), "Lux".to_string()]);
                assert_eq!(draft.red_bans, vec!["Zed".to_string()]);
            }
            other => panic!("expected RoomJoined, got {other:?}"),
        }

        // The draft continues where it stopped; turn 3 belongs to Red.
        engine.apply_action(bob2, "Jinx".into()).unwrap();
    }

    #[tokio::test]
    async fn test_rejoin_is_idempotent() {
        let engine = test_engine();
        let (room_code, (blue, _blue_rx), (red, mut red_rx)) = setup_room(&engine);
        engine.start_draft(blue).unwrap();
        engine.apply_action(blue, "Ahri".into()).unwrap();
        drain(&mut red_rx);

        let first = {
            engine
                .rejoin(red, &room_code, Role::Red, "bob".into())
                .unwrap();
            serde_json::to_string(&red_rx.try_recv().unwrap()).unwrap()
        };
        let second = {
            engine
                .rejoin(red, &room_code, Role::Red, "bob".into())
                .unwrap();
            serde_json::to_string(&red_rx.try_recv().unwrap()).unwrap()
        };
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_idle_room_expires() {
        let engine = test_engine();
        let (_code, (blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);
        let room_code = engine.current_room_code(blue).unwrap();

        engine.detach(blue);
        assert!(engine.room_exists(&room_code), "still occupied by red");
        engine.detach(red);
        assert!(engine.room_exists(&room_code), "grace period not over yet");

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!engine.room_exists(&room_code));
    }

    #[tokio::test]
    async fn test_reattach_cancels_expiry() {
        let engine = test_engine();
        let (room_code, (blue, _blue_rx), (red, _red_rx)) = setup_room(&engine);
        engine.start_draft(blue).unwrap();
        engine.apply_action(blue, "Ahri".into()).unwrap();

        engine.detach(blue);
        engine.detach(red);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (bob2, _bob2_rx) = engine.register_session();
        engine
            .rejoin(bob2, &room_code, Role::Red, "bob".into())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.room_exists(&room_code), "rejoin must defuse expiry");
        let draft = engine.draft_snapshot(&room_code).unwrap();
        assert_eq!(draft.current_turn, 1, "state survived the vacancy window");
    }

    #[tokio::test]
    async fn test_pinned_default_room_survives_idle() {
        let engine = DraftEngine::new(EngineConfig {
            room_idle_timeout: Duration::from_millis(50),
            default_room: Some("lobby".into()),
        });
        let room_code = engine.ensure_default_room().unwrap();
        assert_eq!(room_code, "LOBBY");
        // Idempotent.
        assert_eq!(engine.ensure_default_room().unwrap(), "LOBBY");

        let (sid, _rx) = engine.register_session();
        engine
            .join_room(sid, &room_code, "alice".into(), false)
            .unwrap();
        engine.detach(sid);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(engine.room_exists(&room_code));
        assert!(!engine.delete_room(&room_code), "pinned rooms resist deletion");
    }

    #[tokio::test]
    async fn test_join_moves_session_between_rooms() {
        let engine = test_engine();
        let (sid, _rx) = engine.register_session();
        let first = engine.create_and_attach(sid, "alice".into()).unwrap();
        engine.join_room(sid, "SECOND", "alice".into(), false).unwrap();

        assert_eq!(engine.current_room_code(sid).unwrap(), "SECOND");
        // The abandoned room expires on its own.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!engine.room_exists(&first));
        assert!(engine.room_exists("SECOND"));
    }

    #[tokio::test]
    async fn test_snapshot_of_unknown_room() {
        let engine = test_engine();
        assert_eq!(
            engine.draft_snapshot("NOPE42"),
            Err(DraftError::RoomNotFound("NOPE42".into()))
        );
    }

    #[tokio::test]
    async fn test_acting_without_a_room() {
        let engine = test_engine();
        let (sid, _rx) = engine.register_session();
        assert!(matches!(
            engine.start_draft(sid),
            Err(DraftError::InvalidInput(_))
        ));
    }
}

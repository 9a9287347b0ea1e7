use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use super::draft::{DraftState, Team};
use super::events::{Role, RosterInfo, SessionId, SlotInfo};

/// One occupied team slot: which connection holds it and under what name.
#[derive(Debug, Clone)]
pub struct ParticipantSlot {
    pub session_id: SessionId,
    pub display_name: String,
}

/// A draft room. The unit of isolation — every mutation happens while
/// holding this room's registry entry exclusively.
#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub draft: DraftState,
    pub blue: Option<ParticipantSlot>,
    pub red: Option<ParticipantSlot>,
    /// Spectator connections and their display names, unordered.
    pub spectators: HashMap<SessionId, String>,
    /// Captain claims are display names, not connections, so a captain who
    /// drops and rejoins under the same name keeps the claim.
    pub blue_captain: Option<String>,
    pub red_captain: Option<String>,
    /// Room authority. Connection-scoped; cleared on disconnect and
    /// reclaimable by the next host-level action.
    pub host: Option<SessionId>,
    pub fearless_enabled: bool,
    /// Canonical cross-draft used set. Ordered so transmitted snapshots
    /// are deterministic.
    pub session_used: BTreeSet<String>,
    /// Pinned rooms (the configured default room) are never deleted.
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: String, pinned: bool) -> Self {
        Self {
            id,
            draft: DraftState::default(),
            blue: None,
            red: None,
            spectators: HashMap::new(),
            blue_captain: None,
            red_captain: None,
            host: None,
            fearless_enabled: false,
            session_used: BTreeSet::new(),
            pinned,
            created_at: Utc::now(),
        }
    }

    pub fn slot(&self, team: Team) -> Option<&ParticipantSlot> {
        match team {
            Team::Blue => self.blue.as_ref(),
            Team::Red => self.red.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, team: Team) -> &mut Option<ParticipantSlot> {
        match team {
            Team::Blue => &mut self.blue,
            Team::Red => &mut self.red,
        }
    }

    pub fn captain_name(&self, team: Team) -> Option<&str> {
        match team {
            Team::Blue => self.blue_captain.as_deref(),
            Team::Red => self.red_captain.as_deref(),
        }
    }

    pub fn captain_name_mut(&mut self, team: Team) -> &mut Option<String> {
        match team {
            Team::Blue => &mut self.blue_captain,
            Team::Red => &mut self.red_captain,
        }
    }

    /// The role a connection currently holds in this room, if any.
    pub fn role_of(&self, session_id: SessionId) -> Option<Role> {
        if self.blue.as_ref().is_some_and(|s| s.session_id == session_id) {
            return Some(Role::Blue);
        }
        if self.red.as_ref().is_some_and(|s| s.session_id == session_id) {
            return Some(Role::Red);
        }
        if self.spectators.contains_key(&session_id) {
            return Some(Role::Spectator);
        }
        None
    }

    pub fn display_name_of(&self, session_id: SessionId) -> Option<&str> {
        if let Some(slot) = &self.blue
            && slot.session_id == session_id
        {
            return Some(&slot.display_name);
        }
        if let Some(slot) = &self.red
            && slot.session_id == session_id
        {
            return Some(&slot.display_name);
        }
        self.spectators.get(&session_id).map(|s| s.as_str())
    }

    /// Every connection attached to this room.
    pub fn occupant_ids(&self) -> Vec<SessionId> {
        let mut ids = Vec::with_capacity(2 + self.spectators.len());
        if let Some(slot) = &self.blue {
            ids.push(slot.session_id);
        }
        if let Some(slot) = &self.red {
            ids.push(slot.session_id);
        }
        ids.extend(self.spectators.keys().copied());
        ids
    }

    pub fn is_unoccupied(&self) -> bool {
        self.blue.is_none() && self.red.is_none() && self.spectators.is_empty()
    }

    /// Remove a connection from whatever role it holds. Captain claims stay
    /// (they are name-scoped) and so does host authority; the caller decides
    /// whether the connection is switching roles or actually gone.
    pub fn vacate(&mut self, session_id: SessionId) -> Option<(Role, String)> {
        if self.blue.as_ref().is_some_and(|s| s.session_id == session_id) {
            let slot = self.blue.take().unwrap();
            return Some((Role::Blue, slot.display_name));
        }
        if self.red.as_ref().is_some_and(|s| s.session_id == session_id) {
            let slot = self.red.take().unwrap();
            return Some((Role::Red, slot.display_name));
        }
        self.spectators
            .remove(&session_id)
            .map(|name| (Role::Spectator, name))
    }

    /// Rebuild the transmitted session-used snapshot from the canonical set.
    /// Empty while fearless mode is off, so availability checks skip it.
    pub fn refresh_session_snapshot(&mut self) {
        self.draft.session_used = if self.fearless_enabled {
            self.session_used.iter().cloned().collect()
        } else {
            Vec::new()
        };
    }

    /// Host's display name, when the host connection also occupies a role.
    pub fn host_name(&self) -> Option<String> {
        self.host
            .and_then(|sid| self.display_name_of(sid))
            .map(String::from)
    }

    pub fn roster(&self) -> RosterInfo {
        let slot_info = |slot: &Option<ParticipantSlot>, captain: &Option<String>| {
            slot.as_ref().map(|s| SlotInfo {
                player_name: s.display_name.clone(),
                captain: captain.as_deref() == Some(s.display_name.as_str()),
            })
        };
        let mut spectators: Vec<String> = self.spectators.values().cloned().collect();
        spectators.sort();
        RosterInfo {
            blue: slot_info(&self.blue, &self.blue_captain),
            red: slot_info(&self.red, &self.red_captain),
            spectators,
            host: self.host_name(),
            fearless_enabled: self.fearless_enabled,
        }
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::draft::{DraftState, Team};
use super::error::DraftError;

/// Unique identifier for a connected session (one per connection, not per player).
pub type SessionId = Uuid;

/// What a connection currently is inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Blue,
    Red,
    Spectator,
}

impl Role {
    /// Parse a wire value ("blue"/"red"/"spectator", case-insensitive).
    pub fn parse(value: &str) -> Result<Role, DraftError> {
        match value.to_ascii_lowercase().as_str() {
            "blue" => Ok(Role::Blue),
            "red" => Ok(Role::Red),
            "spectator" => Ok(Role::Spectator),
            _ => Err(DraftError::InvalidTeam(value.to_string())),
        }
    }

    /// The team this role drafts for, if any.
    pub fn team(&self) -> Option<Team> {
        match self {
            Role::Blue => Some(Team::Blue),
            Role::Red => Some(Team::Red),
            Role::Spectator => None,
        }
    }

    /// The wire spelling, inverse of [`Role::parse`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Blue => "blue",
            Role::Red => "red",
            Role::Spectator => "spectator",
        }
    }
}

impl From<Team> for Role {
    fn from(team: Team) -> Self {
        match team {
            Team::Blue => Role::Blue,
            Team::Red => Role::Red,
        }
    }
}

/// One occupied team slot as transmitted in rosters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInfo {
    pub player_name: String,
    pub captain: bool,
}

/// Who is in the room right now. Pushed as `room_update` whenever the
/// roster changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterInfo {
    pub blue: Option<SlotInfo>,
    pub red: Option<SlotInfo>,
    pub spectators: Vec<String>,
    pub host: Option<String>,
    pub fearless_enabled: bool,
}

/// Everything a client may send. Parsed once at the connection boundary;
/// unknown types fail deserialization and are dropped there.
///
/// Team fields stay raw strings so a bad value surfaces as `InvalidTeam`
/// instead of a silently dropped frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateRoom {
        player_name: String,
    },
    JoinRoom {
        room_code: String,
        player_name: String,
        #[serde(default)]
        captain: bool,
    },
    SwitchTeam {
        team: String,
        player_name: String,
        #[serde(default)]
        captain: bool,
    },
    /// Reconnect-safe re-attach; the reply is sync-tagged.
    Rejoin {
        room_code: String,
        team: String,
        player_name: String,
    },
    StartDraft,
    DraftAction {
        champion: String,
    },
    ToggleFearless {
        enabled: bool,
    },
    ResetFearless,
    Ping {
        timestamp: i64,
    },
    Ack {
        message_id: Uuid,
    },
}

/// Everything the server may push. `draft_update` carries the full
/// DraftState on every change — the protocol is state-push, not diff-push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    RoomCreated {
        room_code: String,
        role: Role,
        draft: DraftState,
        roster: RosterInfo,
    },
    RoomJoined {
        room_code: String,
        role: Role,
        /// True when this snapshot replays known history (rejoin); the
        /// client applies it without animation.
        sync: bool,
        draft: DraftState,
        roster: RosterInfo,
    },
    OpponentJoined {
        team: Team,
        player_name: String,
    },
    OpponentDisconnected {
        team: Team,
    },
    DraftStarted {
        draft: DraftState,
    },
    DraftUpdate {
        draft: DraftState,
        sync: bool,
    },
    TeamSwitched {
        team: Role,
        player_name: String,
    },
    RoomUpdate {
        roster: RosterInfo,
    },
    PlayerDisconnected {
        player_name: String,
        role: Role,
    },
    FearlessToggled {
        enabled: bool,
    },
    FearlessReset,
    /// Addressed only to the offending connection, never broadcast.
    Error {
        code: String,
        message: String,
    },
    Pong {
        timestamp: i64,
    },
    Ack {
        message_id: Uuid,
    },
}

impl ServerEvent {
    pub fn error(err: &DraftError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Wire envelope shared by both directions: the tagged message plus the
/// optional correlation id and ack request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<M> {
    #[serde(flatten)]
    pub msg: M,
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(rename = "requiresAck", default, skip_serializing_if = "is_false")]
    pub requires_ack: bool,
}

impl<M> Envelope<M> {
    /// A plain message with no delivery tracking.
    pub fn bare(msg: M) -> Self {
        Self {
            msg,
            message_id: None,
            requires_ack: false,
        }
    }

    /// A message that must be acknowledged by the receiving side.
    pub fn tracked(msg: M, message_id: Uuid) -> Self {
        Self {
            msg,
            message_id: Some(message_id),
            requires_ack: true,
        }
    }
}

use thiserror::Error;

/// Every way a draft room operation can be refused. Each variant maps to a
/// stable wire code sent in `error` events; none of them mutate room state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("only the room host may do that")]
    NotAuthorized,

    #[error("it is not your team's turn")]
    NotYourTurn,

    #[error("only the team captain may ban")]
    OnlyCaptainMayBan,

    #[error("{0} is not available")]
    ChampionUnavailable(String),

    #[error("no draft is in progress")]
    DraftNotInProgress,

    #[error("the draft is already complete")]
    DraftAlreadyComplete,

    #[error("that team slot is already occupied")]
    SlotOccupied,

    #[error("that team already has a captain")]
    CaptainSlotTaken,

    #[error("roles cannot change while a draft is in progress")]
    DraftInProgress,

    #[error("invalid team {0:?}")]
    InvalidTeam(String),

    #[error("connection timed out")]
    ConnectionTimeout,

    #[error("not connected to a draft server")]
    NotConnected,

    #[error("message delivery failed after {0} attempts")]
    MessageDeliveryFailed(u32),

    #[error("{0}")]
    InvalidInput(String),
}

impl DraftError {
    /// Stable machine-readable code carried in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            DraftError::RoomNotFound(_) => "NOT_FOUND",
            DraftError::NotAuthorized => "NOT_AUTHORIZED",
            DraftError::NotYourTurn => "NOT_YOUR_TURN",
            DraftError::OnlyCaptainMayBan => "ONLY_CAPTAIN_MAY_BAN",
            DraftError::ChampionUnavailable(_) => "CHAMPION_UNAVAILABLE",
            DraftError::DraftNotInProgress => "DRAFT_NOT_IN_PROGRESS",
            DraftError::DraftAlreadyComplete => "DRAFT_ALREADY_COMPLETE",
            DraftError::SlotOccupied => "SLOT_OCCUPIED",
            DraftError::CaptainSlotTaken => "CAPTAIN_SLOT_TAKEN",
            DraftError::DraftInProgress => "DRAFT_IN_PROGRESS",
            DraftError::InvalidTeam(_) => "INVALID_TEAM",
            DraftError::ConnectionTimeout => "CONNECTION_TIMEOUT",
            DraftError::NotConnected => "NOT_CONNECTED",
            DraftError::MessageDeliveryFailed(_) => "MESSAGE_DELIVERY_FAILED",
            DraftError::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(DraftError::RoomNotFound("XK2P9Q".into()).code(), "NOT_FOUND");
        assert_eq!(DraftError::NotYourTurn.code(), "NOT_YOUR_TURN");
        assert_eq!(
            DraftError::ChampionUnavailable("Ahri".into()).code(),
            "CHAMPION_UNAVAILABLE"
        );
        assert_eq!(DraftError::MessageDeliveryFailed(3).code(), "MESSAGE_DELIVERY_FAILED");
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            DraftError::ChampionUnavailable("Ahri".into()).to_string(),
            "Ahri is not available"
        );
        assert_eq!(
            DraftError::MessageDeliveryFailed(3).to_string(),
            "message delivery failed after 3 attempts"
        );
    }
}

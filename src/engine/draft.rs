use serde::{Deserialize, Serialize};

use super::error::DraftError;

/// One of the two drafting sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Blue,
    Red,
}

impl Team {
    /// Parse a wire value ("blue"/"red", case-insensitive).
    pub fn parse(value: &str) -> Result<Team, DraftError> {
        match value.to_ascii_lowercase().as_str() {
            "blue" => Ok(Team::Blue),
            "red" => Ok(Team::Red),
            _ => Err(DraftError::InvalidTeam(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Team::Blue => "blue",
            Team::Red => "red",
        }
    }
}

/// What the team on turn does with its champion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Ban,
    Pick,
}

/// One entry of the fixed draft order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftStep {
    pub team: Team,
    pub action: Action,
}

const fn step(team: Team, action: Action) -> DraftStep {
    DraftStep { team, action }
}

/// The tournament draft order: two ban phases and two pick phases,
/// 5 bans and 5 picks per team across 20 steps.
pub const DRAFT_SEQUENCE: [DraftStep; 20] = [
    // Ban phase 1
    step(Team::Blue, Action::Ban),
    step(Team::Red, Action::Ban),
    step(Team::Blue, Action::Ban),
    step(Team::Red, Action::Ban),
    step(Team::Blue, Action::Ban),
    step(Team::Red, Action::Ban),
    // Pick phase 1
    step(Team::Blue, Action::Pick),
    step(Team::Red, Action::Pick),
    step(Team::Red, Action::Pick),
    step(Team::Blue, Action::Pick),
    step(Team::Blue, Action::Pick),
    step(Team::Red, Action::Pick),
    // Ban phase 2
    step(Team::Red, Action::Ban),
    step(Team::Blue, Action::Ban),
    step(Team::Red, Action::Ban),
    step(Team::Blue, Action::Ban),
    // Pick phase 2
    step(Team::Red, Action::Pick),
    step(Team::Blue, Action::Pick),
    step(Team::Blue, Action::Pick),
    step(Team::Red, Action::Pick),
];

/// Where a room's draft currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Drafting,
    Complete,
}

/// The full per-draft state, pushed wholesale to clients on every change.
/// Owned by its Room; reset on every draft start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftState {
    pub phase: Phase,
    /// Index into [`DRAFT_SEQUENCE`]; equals 20 once the draft is complete.
    pub current_turn: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_team: Option<Team>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_action: Option<Action>,
    pub blue_bans: Vec<String>,
    pub red_bans: Vec<String>,
    pub blue_picks: Vec<String>,
    pub red_picks: Vec<String>,
    /// Snapshot of the room's cross-draft used set, mirrored for
    /// transmission while fearless mode is enabled.
    pub session_used: Vec<String>,
}

impl Default for DraftState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            current_turn: 0,
            current_team: None,
            current_action: None,
            blue_bans: Vec::new(),
            red_bans: Vec::new(),
            blue_picks: Vec::new(),
            red_picks: Vec::new(),
            session_used: Vec::new(),
        }
    }
}

impl DraftState {
    /// The step the draft is waiting on, if any.
    pub fn current_step(&self) -> Option<DraftStep> {
        if self.phase == Phase::Drafting {
            DRAFT_SEQUENCE.get(self.current_turn).copied()
        } else {
            None
        }
    }

    /// True when `champion` already appears in any ban list, any pick list,
    /// or the transmitted session-used snapshot. One folded check covers
    /// bans and picks alike.
    pub fn champion_used(&self, champion: &str) -> bool {
        self.blue_bans.iter().any(|c| c == champion)
            || self.red_bans.iter().any(|c| c == champion)
            || self.blue_picks.iter().any(|c| c == champion)
            || self.red_picks.iter().any(|c| c == champion)
            || self.session_used.iter().any(|c| c == champion)
    }

    /// Append `champion` to the list selected by the step.
    pub fn record(&mut self, step: DraftStep, champion: String) {
        let list = match (step.team, step.action) {
            (Team::Blue, Action::Ban) => &mut self.blue_bans,
            (Team::Red, Action::Ban) => &mut self.red_bans,
            (Team::Blue, Action::Pick) => &mut self.blue_picks,
            (Team::Red, Action::Pick) => &mut self.red_picks,
        };
        list.push(champion);
    }

    /// Move the turn pointer forward, flipping to Complete after the final step.
    pub fn advance(&mut self) {
        self.current_turn += 1;
        match DRAFT_SEQUENCE.get(self.current_turn) {
            Some(next) => {
                self.current_team = Some(next.team);
                self.current_action = Some(next.action);
            }
            None => {
                self.phase = Phase::Complete;
                self.current_team = None;
                self.current_action = None;
            }
        }
    }
}

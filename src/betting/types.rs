use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why the match clock is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PauseReason {
    /// A time-boxed action bet is on screen.
    BettingOpportunity,
    HalfTime,
    MatchEnd,
}

impl PauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::BettingOpportunity => "BETTING_OPPORTUNITY",
            PauseReason::HalfTime => "HALF_TIME",
            PauseReason::MatchEnd => "MATCH_END",
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one opened betting opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpportunityId(pub Uuid);

impl OpportunityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 hex chars, for log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for OpportunityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One selectable answer of an action bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetChoice {
    pub label: String,
    /// Decimal odds, display only. Odds arithmetic lives in the wallet.
    pub odds: f64,
}

impl BetChoice {
    pub fn new(label: impl Into<String>, odds: f64) -> Self {
        Self {
            label: label.into(),
            odds,
        }
    }
}

/// Descriptive payload of an opportunity. Owned by the presentation layer;
/// the engine only passes it through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityContent {
    pub description: String,
    pub choices: Vec<BetChoice>,
    /// Match minute of the triggering event.
    pub minute: u32,
}

/// The user's pick on an open opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub opportunity: OpportunityId,
    pub choice_index: usize,
    pub choice: BetChoice,
    /// Whether the opportunity was minimized when the pick was made.
    pub while_minimized: bool,
}

/// How an opportunity was closed. The resume contract is identical for all
/// kinds except `Recovered`; only the feed's messaging differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseKind {
    Decided,
    TimedOut,
    /// Closed by forced recovery after an inconsistent snapshot.
    Recovered,
}

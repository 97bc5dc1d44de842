//! Channel message types between the session actor and its collaborators.
//!
//! Match clock ← (watch PauseSnapshot) ← Session ← (mpsc SessionCmd) ← Feed / UI
//! Session → (mpsc ClosedNotice) → Feed

use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::orchestrator::OpportunityError;
use super::presentation::PresentationSnapshot;
use super::types::{CloseKind, Decision, OpportunityContent, OpportunityId, PauseReason};

// ─────────────────────────────────────────────────────────
// Pause state broadcast (Session → Match clock)
// ─────────────────────────────────────────────────────────

/// Copy of the pause controller's state. Never a live reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PauseSnapshot {
    pub active: bool,
    pub reason: Option<PauseReason>,
    pub started_at: Option<Instant>,
    /// Delay left on the pending auto-resume, if one is armed.
    pub pending_remaining: Option<Duration>,
    /// A resume countdown is in flight.
    pub resuming: bool,
}

impl PauseSnapshot {
    /// Paused specifically for an action bet.
    pub fn is_betting(&self) -> bool {
        self.active && self.reason == Some(PauseReason::BettingOpportunity)
    }
}

// ─────────────────────────────────────────────────────────
// Commands (Feed / UI → Session)
// ─────────────────────────────────────────────────────────

pub type OpenReply = oneshot::Sender<Result<Option<OpportunityId>, OpportunityError>>;

#[derive(Debug)]
pub enum SessionCmd {
    /// Open an action bet. `duration: None` uses the configured default.
    Open {
        content: OpportunityContent,
        duration: Option<Duration>,
        reply: Option<OpenReply>,
    },
    Minimize,
    Restore,
    Decide {
        choice_index: usize,
    },
    /// Suspend for a reason other than betting (half-time, full-time).
    SuspendMatch {
        reason: PauseReason,
    },
    ResumeMatch,
    /// Upstream presentation update, checked field by field.
    ApplyPatch {
        patch: Value,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// Close everything and return to defaults.
    Reset,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub pause: PauseSnapshot,
    pub presentation: PresentationSnapshot,
}

// ─────────────────────────────────────────────────────────
// Close notifications (Session → Feed)
// ─────────────────────────────────────────────────────────

/// Sent once per opportunity when it closes.
#[derive(Debug, Clone)]
pub struct ClosedNotice {
    pub id: OpportunityId,
    pub kind: CloseKind,
    pub decision: Option<Decision>,
    /// Match minute of the triggering event, when the content survived.
    pub minute: Option<u32>,
}

// ─────────────────────────────────────────────────────────
// Match clock output (Match clock → Feed)
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    Minute(u32),
    HalfTime,
    FullTime,
}

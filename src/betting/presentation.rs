//! Presentation state of the currently open betting opportunity.
//!
//! Tracks whether the prompt is fully shown or minimized to the floating
//! indicator, and its time budget. `started_at` is written once per
//! opportunity; minimize/restore only flip the two view flags, so
//! `remaining` keeps falling with wall-clock time no matter how often the
//! user toggles the view.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

use super::types::{OpportunityContent, OpportunityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpportunityPhase {
    Closed,
    OpenVisible,
    OpenMinimized,
}

/// What the presentation collaborator renders from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationSnapshot {
    pub id: Option<OpportunityId>,
    pub visible: bool,
    pub minimized: bool,
    /// Milliseconds since the session epoch.
    pub started_at_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub remaining_ms: u64,
    pub content: Option<OpportunityContent>,
}

/// Fields applied and refused by [`OpportunityPresentation::apply_patch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub accepted: Vec<&'static str>,
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OpportunityPresentation {
    /// Reference point for the millisecond fields of snapshots and patches.
    epoch: Instant,
    id: Option<OpportunityId>,
    visible: bool,
    minimized: bool,
    started_at: Option<Instant>,
    duration: Option<Duration>,
    content: Option<OpportunityContent>,
}

impl OpportunityPresentation {
    pub fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            id: None,
            visible: false,
            minimized: false,
            started_at: None,
            duration: None,
            content: None,
        }
    }

    pub(crate) fn open(
        &mut self,
        id: OpportunityId,
        content: OpportunityContent,
        duration: Duration,
        now: Instant,
    ) {
        self.id = Some(id);
        self.visible = true;
        self.minimized = false;
        self.started_at = Some(now);
        self.duration = Some(duration);
        self.content = Some(content);
    }

    /// Null every field.
    pub(crate) fn close(&mut self) {
        *self = Self::new(self.epoch);
    }

    pub(crate) fn set_minimized_view(&mut self) {
        self.visible = false;
        self.minimized = true;
    }

    pub(crate) fn set_visible_view(&mut self) {
        self.visible = true;
        self.minimized = false;
    }

    // ═════════════════════════════════════════════════
    // Queries
    // ═════════════════════════════════════════════════

    pub fn is_active(&self) -> bool {
        self.visible || self.minimized
    }

    /// Time left on the opportunity. Zero when nothing is open or the
    /// timing fields are missing.
    pub fn remaining(&self, now: Instant) -> Duration {
        if !self.is_active() {
            return Duration::ZERO;
        }
        match (self.started_at, self.duration) {
            (Some(started), Some(budget)) => {
                budget.saturating_sub(now.saturating_duration_since(started))
            }
            _ => Duration::ZERO,
        }
    }

    pub fn remaining_ms(&self, now: Instant) -> u64 {
        self.remaining(now).as_millis() as u64
    }

    /// Vacuously true when nothing is open.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.remaining(now).is_zero()
    }

    pub fn phase(&self) -> OpportunityPhase {
        match (self.visible, self.minimized) {
            (true, false) => OpportunityPhase::OpenVisible,
            (false, true) => OpportunityPhase::OpenMinimized,
            (false, false) => OpportunityPhase::Closed,
            // Both flags set is corrupt; report it as visible so the
            // consistency check gets a chance to see it.
            (true, true) => OpportunityPhase::OpenVisible,
        }
    }

    pub fn id(&self) -> Option<OpportunityId> {
        self.id
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn minimized(&self) -> bool {
        self.minimized
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn content(&self) -> Option<&OpportunityContent> {
        self.content.as_ref()
    }

    pub fn snapshot(&self, now: Instant) -> PresentationSnapshot {
        PresentationSnapshot {
            id: self.id,
            visible: self.visible,
            minimized: self.minimized,
            started_at_ms: self
                .started_at
                .map(|t| t.saturating_duration_since(self.epoch).as_millis() as u64),
            duration_ms: self.duration.map(|d| d.as_millis() as u64),
            remaining_ms: self.remaining_ms(now),
            content: self.content.clone(),
        }
    }

    // ═════════════════════════════════════════════════
    // Defensive upstream setters
    // ═════════════════════════════════════════════════

    /// Apply a JSON patch coming from the presentation layer.
    ///
    /// Wrong-typed fields are refused and keep their current value:
    /// `visible`/`minimized` must be booleans, `startedAtMs`/`durationMs`
    /// non-negative numbers, `content` null or a valid content object.
    pub fn apply_patch(&mut self, patch: &Value) -> PatchReport {
        let mut report = PatchReport::default();
        let Some(fields) = patch.as_object() else {
            warn!("🚫 presentation patch is not an object: {patch}");
            report.rejected.push("<root>".to_string());
            return report;
        };

        for (key, value) in fields {
            let accepted = match key.as_str() {
                "visible" => value.as_bool().map(|v| self.visible = v).map(|_| "visible"),
                "minimized" => value
                    .as_bool()
                    .map(|v| self.minimized = v)
                    .map(|_| "minimized"),
                "startedAtMs" => non_negative_ms(value)
                    .map(|ms| self.started_at = Some(self.epoch + Duration::from_millis(ms)))
                    .map(|_| "startedAtMs"),
                "durationMs" => non_negative_ms(value)
                    .map(|ms| self.duration = Some(Duration::from_millis(ms)))
                    .map(|_| "durationMs"),
                "content" => {
                    if value.is_null() {
                        self.content = None;
                        Some("content")
                    } else {
                        serde_json::from_value::<OpportunityContent>(value.clone())
                            .ok()
                            .map(|c| self.content = Some(c))
                            .map(|_| "content")
                    }
                }
                _ => None,
            };
            match accepted {
                Some(name) => report.accepted.push(name),
                None => {
                    warn!("🚫 presentation patch refused field {key}={value}");
                    report.rejected.push(key.clone());
                }
            }
        }
        report
    }
}

fn non_negative_ms(value: &Value) -> Option<u64> {
    if let Some(ms) = value.as_u64() {
        return Some(ms);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f as u64)
}

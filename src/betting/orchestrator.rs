//! Opportunity Lifecycle Orchestrator.
//!
//! The only component allowed to touch both the pause controller and the
//! presentation state. One opportunity at a time:
//!
//! ```text
//! CLOSED ──open──▶ OPEN_VISIBLE ⇄ OPEN_MINIMIZED ──decide / expiry──▶ CLOSED
//! ```
//!
//! While an opportunity is open the clock is paused for
//! `BettingOpportunity` and the pending auto-resume fires at the
//! opportunity's logical deadline. Minimize and restore re-arm that timer
//! from the fresh `remaining` so the two never drift apart.
//!
//! Wrong-state transitions are silent no-ops. Only programmer errors
//! (bad duration, empty choices, out-of-range choice) come back as `Err`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::countdown::CountdownOutcome;
use super::messages::{ClosedNotice, SessionSnapshot};
use super::pause::{CountdownId, PauseController, ResumeOutcome};
use super::presentation::{OpportunityPhase, OpportunityPresentation, PatchReport};
use super::scheduler::{Scheduler, TimerId};
use super::types::{CloseKind, Decision, OpportunityContent, OpportunityId, PauseReason};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpportunityError {
    #[error("opportunity duration must be greater than zero")]
    InvalidDuration,
    #[error("opportunity content has no choices")]
    NoChoices,
    #[error("choice {index} out of range ({available} available)")]
    UnknownChoice { index: usize, available: usize },
}

/// Wallet boundary: commits the wager for a decision. Its outcome never
/// affects the resume.
pub type DecisionHook = Box<dyn FnMut(&Decision) -> anyhow::Result<()> + Send>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub opened: u64,
    pub decided: u64,
    pub timed_out: u64,
    pub recovered: u64,
    pub rescheduled: u64,
    pub rejected_opens: u64,
}

pub struct Orchestrator<S: Scheduler> {
    cfg: SessionConfig,
    pause: PauseController<S>,
    presentation: OpportunityPresentation,
    decision_hook: Option<DecisionHook>,
    closed_tx: Option<mpsc::UnboundedSender<ClosedNotice>>,
    stats: OrchestratorStats,
}

impl<S: Scheduler> Orchestrator<S> {
    pub fn new(cfg: SessionConfig, pause: PauseController<S>) -> Self {
        let epoch = pause.now();
        Self {
            cfg,
            pause,
            presentation: OpportunityPresentation::new(epoch),
            decision_hook: None,
            closed_tx: None,
            stats: OrchestratorStats::default(),
        }
    }

    pub fn with_decision_hook(mut self, hook: DecisionHook) -> Self {
        self.decision_hook = Some(hook);
        self
    }

    pub fn with_close_notifier(mut self, tx: mpsc::UnboundedSender<ClosedNotice>) -> Self {
        self.closed_tx = Some(tx);
        self
    }

    // ═════════════════════════════════════════════════
    // Transitions
    // ═════════════════════════════════════════════════

    /// Open an action bet and pause the clock for `duration`.
    ///
    /// Returns `Ok(None)` without touching anything when an opportunity is
    /// already open or the clock is held for another reason.
    pub fn open(
        &mut self,
        content: OpportunityContent,
        duration: Duration,
    ) -> Result<Option<OpportunityId>, OpportunityError> {
        if duration.is_zero() {
            return Err(OpportunityError::InvalidDuration);
        }
        if content.choices.is_empty() {
            return Err(OpportunityError::NoChoices);
        }
        if self.presentation.is_active() {
            warn!(
                "🚫 open rejected — opportunity {:?} still open",
                self.presentation.id().map(|id| id.short()),
            );
            self.stats.rejected_opens += 1;
            return Ok(None);
        }
        if self.pause.is_paused() && !self.pause.is_resuming() {
            warn!("🚫 open rejected — clock held for {:?}", self.pause.reason());
            self.stats.rejected_opens += 1;
            return Ok(None);
        }

        let id = OpportunityId::new();
        let now = self.pause.now();
        info!(
            "🎲 Opportunity {} opened | min={} budget={}ms \"{}\"",
            id.short(),
            content.minute,
            duration.as_millis(),
            content.description,
        );
        self.presentation.open(id, content, duration, now);
        self.pause.pause(PauseReason::BettingOpportunity, Some(duration));
        self.stats.opened += 1;
        Ok(Some(id))
    }

    /// OPEN_VISIBLE → OPEN_MINIMIZED. No-op from any other state.
    pub fn minimize(&mut self) -> bool {
        if self.presentation.phase() != OpportunityPhase::OpenVisible {
            debug!("minimize ignored in {:?}", self.presentation.phase());
            return false;
        }
        self.presentation.set_minimized_view();
        if self.resync_timer() {
            debug!("🔽 minimized | remaining={}ms", self.remaining_ms());
        }
        true
    }

    /// OPEN_MINIMIZED → OPEN_VISIBLE. No-op from any other state. If the
    /// opportunity ran out while minimized it closes as timed out instead.
    pub fn restore(&mut self) -> bool {
        if self.presentation.phase() != OpportunityPhase::OpenMinimized {
            debug!("restore ignored in {:?}", self.presentation.phase());
            return false;
        }
        if self.resync_timer() {
            self.presentation.set_visible_view();
            debug!("🔼 restored | remaining={}ms", self.remaining_ms());
        }
        true
    }

    /// Record the user's pick, close the opportunity and resume through
    /// the countdown. `Ok(None)` when nothing is open.
    pub fn decide(&mut self, choice_index: usize) -> Result<Option<Decision>, OpportunityError> {
        if !self.presentation.is_active() {
            debug!("decide ignored — no open opportunity");
            return Ok(None);
        }
        let picked = match (self.presentation.id(), self.presentation.content()) {
            (Some(id), Some(content)) => Some((
                id,
                content.minute,
                content.choices.len(),
                content.choices.get(choice_index).cloned(),
            )),
            _ => None,
        };
        let Some((id, minute, available, choice)) = picked else {
            self.recover("decide on opportunity without content");
            return Ok(None);
        };
        let Some(choice) = choice else {
            return Err(OpportunityError::UnknownChoice {
                index: choice_index,
                available,
            });
        };

        let decision = Decision {
            opportunity: id,
            choice_index,
            choice,
            while_minimized: self.presentation.minimized(),
        };
        info!(
            "✅ Opportunity {} decided: \"{}\" @{:.2} (minimized={})",
            id.short(),
            decision.choice.label,
            decision.choice.odds,
            decision.while_minimized,
        );
        self.run_decision_hook(&decision);

        self.presentation.close();
        self.pause.clear_pending_timeout();
        self.pause.resume(true, self.cfg.countdown_secs);
        self.stats.decided += 1;
        self.notify(ClosedNotice {
            id,
            kind: CloseKind::Decided,
            decision: Some(decision.clone()),
            minute: Some(minute),
        });
        Ok(Some(decision))
    }

    // ═════════════════════════════════════════════════
    // Timer / countdown events
    // ═════════════════════════════════════════════════

    /// A scheduler timer fired. Stale ids are ignored. With an opportunity
    /// open this is its expiry; otherwise it is the bare auto-resume of a
    /// non-betting pause.
    pub fn on_timer_fired(&mut self, id: TimerId) -> bool {
        if !self.pause.is_pending(id) {
            debug!("⏲️ stale timer #{} ignored", id);
            return false;
        }
        if self.presentation.is_active() {
            self.close_timed_out();
            return true;
        }
        self.pause.on_timer_fired(id)
    }

    /// Finish a resume countdown. A countdown that died without completing
    /// while nothing else has taken the clock is forced through so the
    /// match never stays stuck.
    pub fn on_countdown_settled(&mut self, id: CountdownId, outcome: CountdownOutcome) -> bool {
        let released = self.pause.on_countdown_settled(id, outcome);
        if !released
            && outcome == CountdownOutcome::Cancelled
            && self.pause.is_paused()
            && !self.pause.is_resuming()
            && !self.presentation.is_active()
        {
            warn!("⚠️ countdown #{} died mid-resume — forcing resume", id);
            return self.pause.force_resume();
        }
        released
    }

    pub async fn countdown_settled(&mut self) -> (CountdownId, CountdownOutcome) {
        self.pause.countdown_settled().await
    }

    // ═════════════════════════════════════════════════
    // Consistency / recovery
    // ═════════════════════════════════════════════════

    /// Look for a corrupted snapshot and recover from it. Returns whether a
    /// recovery ran.
    pub fn check_consistency(&mut self) -> bool {
        let problems = self.inconsistencies();
        if problems.is_empty() {
            return false;
        }
        self.recover(&problems.join(", "));
        true
    }

    fn inconsistencies(&self) -> Vec<&'static str> {
        let p = &self.presentation;
        let pause = self.pause.info();
        let mut problems = Vec::new();

        if p.is_active() {
            if p.content().is_none() {
                problems.push("open without content");
            }
            if p.started_at().is_none() || p.duration().is_none() {
                problems.push("open without timing");
            }
            if p.visible() && p.minimized() {
                problems.push("both visible and minimized");
            }
            if !pause.is_betting() {
                problems.push("open but clock not paused for betting");
            } else if pause.pending_remaining.is_none() {
                problems.push("open without auto-resume");
            }
        } else if pause.is_betting() && !pause.resuming {
            problems.push("betting pause without opportunity");
        }
        problems
    }

    /// Close unconditionally and release the clock without a countdown.
    fn recover(&mut self, why: &str) {
        let id = self.presentation.id();
        let minute = self.presentation.content().map(|c| c.minute);
        warn!("🚑 Forced recovery: {} (opportunity {:?})", why, id.map(|i| i.short()));

        self.presentation.close();
        self.pause.force_resume();
        self.stats.recovered += 1;
        if let Some(id) = id {
            self.notify(ClosedNotice {
                id,
                kind: CloseKind::Recovered,
                decision: None,
                minute,
            });
        }
    }

    /// Upstream presentation update. Not validated against the pause state
    /// here; the next [`Self::check_consistency`] does that.
    pub fn apply_presentation_patch(&mut self, patch: &Value) -> PatchReport {
        self.presentation.apply_patch(patch)
    }

    // ═════════════════════════════════════════════════
    // Non-betting suspensions
    // ═════════════════════════════════════════════════

    /// Hold the clock for half-time, full-time, … Refused for
    /// `BettingOpportunity` (use [`Self::open`]) and while an opportunity
    /// is open.
    pub fn suspend_match(&mut self, reason: PauseReason) -> bool {
        if reason == PauseReason::BettingOpportunity || self.presentation.is_active() {
            debug!("suspend_match({}) refused", reason);
            return false;
        }
        self.pause.pause(reason, None)
    }

    /// Release a non-betting suspension through the countdown.
    pub fn resume_match(&mut self) -> ResumeOutcome {
        if self.presentation.is_active()
            || self.pause.reason() == Some(PauseReason::BettingOpportunity)
        {
            debug!("resume_match refused while betting");
            return ResumeOutcome::NotPaused;
        }
        self.pause.resume(true, self.cfg.countdown_secs)
    }

    pub fn reset(&mut self) {
        self.presentation.close();
        self.pause.reset();
    }

    // ═════════════════════════════════════════════════
    // Queries
    // ═════════════════════════════════════════════════

    pub fn pause(&self) -> &PauseController<S> {
        &self.pause
    }

    pub fn presentation(&self) -> &OpportunityPresentation {
        &self.presentation
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        self.pause.scheduler_mut()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    pub fn remaining_ms(&self) -> u64 {
        self.presentation.remaining_ms(self.pause.now())
    }

    pub fn is_resuming(&self) -> bool {
        self.pause.is_resuming()
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.stats
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            pause: self.pause.info(),
            presentation: self.presentation.snapshot(self.pause.now()),
        }
    }

    // ═════════════════════════════════════════════════
    // Plumbing
    // ═════════════════════════════════════════════════

    /// Re-arm the auto-resume from the current `remaining`. Closes the
    /// opportunity as timed out instead when nothing is left. Returns
    /// whether the opportunity is still open.
    fn resync_timer(&mut self) -> bool {
        if !self.pause.info().is_betting() {
            return true;
        }
        let remaining = self.presentation.remaining(self.pause.now());
        if remaining.is_zero() {
            self.close_timed_out();
            return false;
        }
        self.pause.clear_pending_timeout();
        self.pause.arm_auto_resume(remaining + self.cfg.reschedule_margin);
        self.stats.rescheduled += 1;
        true
    }

    fn close_timed_out(&mut self) {
        let id = self.presentation.id();
        let minute = self.presentation.content().map(|c| c.minute);
        info!("⌛ Opportunity {:?} expired", id.map(|i| i.short()));

        self.presentation.close();
        self.pause.clear_pending_timeout();
        self.pause.resume(true, self.cfg.countdown_secs);
        self.stats.timed_out += 1;
        if let Some(id) = id {
            self.notify(ClosedNotice {
                id,
                kind: CloseKind::TimedOut,
                decision: None,
                minute,
            });
        }
    }

    fn run_decision_hook(&mut self, decision: &Decision) {
        let Some(hook) = self.decision_hook.as_mut() else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| hook(decision))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("⚠️ decision hook failed: {err:#} — resuming anyway"),
            Err(_) => warn!("⚠️ decision hook panicked — resuming anyway"),
        }
    }

    fn notify(&self, notice: ClosedNotice) {
        if let Some(tx) = &self.closed_tx {
            if tx.send(notice).is_err() {
                debug!("close notice dropped (receiver gone)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::betting::scheduler::ManualScheduler;
    use crate::betting::types::BetChoice;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;

    const MARGIN: Duration = Duration::from_millis(100);

    fn content() -> OpportunityContent {
        OpportunityContent {
            description: "Next corner: which side?".to_string(),
            choices: vec![
                BetChoice::new("Home", 1.8),
                BetChoice::new("Away", 2.1),
                BetChoice::new("None", 4.0),
            ],
            minute: 27,
        }
    }

    fn orch() -> Orchestrator<ManualScheduler> {
        let cfg = SessionConfig {
            reschedule_margin: MARGIN,
            ..Default::default()
        };
        Orchestrator::new(cfg, PauseController::new(ManualScheduler::new()))
    }

    fn with_notices() -> (Orchestrator<ManualScheduler>, mpsc::UnboundedReceiver<ClosedNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (orch().with_close_notifier(tx), rx)
    }

    fn advance(o: &mut Orchestrator<ManualScheduler>, ms: u64) -> Vec<TimerId> {
        o.scheduler_mut().advance(Duration::from_millis(ms))
    }

    /// Open presentation ⇔ betting pause, and the pending timer is the
    /// logical deadline (plus margin once re-armed).
    fn assert_linked(o: &Orchestrator<ManualScheduler>) {
        let pause = o.pause().info();
        assert_eq!(o.presentation().is_active(), pause.is_betting());
        if o.presentation().is_active() {
            let remaining = Duration::from_millis(o.remaining_ms());
            let pending = pause.pending_remaining.expect("auto-resume armed");
            assert!(pending == remaining || pending == remaining + MARGIN, "{pending:?} vs {remaining:?}");
        }
    }

    async fn settle(o: &mut Orchestrator<ManualScheduler>) {
        let (id, outcome) = o.countdown_settled().await;
        o.on_countdown_settled(id, outcome);
    }

    #[test]
    fn test_open_links_pause_and_presentation() {
        let mut o = orch();
        let id = o.open(content(), Duration::from_secs(10)).unwrap();
        assert!(id.is_some());

        let pause = o.pause().info();
        assert!(pause.active);
        assert_eq!(pause.reason, Some(PauseReason::BettingOpportunity));
        assert_eq!(pause.pending_remaining, Some(Duration::from_secs(10)));
        assert_eq!(o.presentation().phase(), OpportunityPhase::OpenVisible);
        assert_eq!(o.remaining_ms(), 10_000);
        assert_linked(&o);
    }

    #[test]
    fn test_open_argument_errors() {
        let mut o = orch();
        assert_eq!(o.open(content(), Duration::ZERO), Err(OpportunityError::InvalidDuration));

        let mut empty = content();
        empty.choices.clear();
        assert_eq!(o.open(empty, Duration::from_secs(5)), Err(OpportunityError::NoChoices));
        assert!(!o.pause().is_paused());
    }

    #[test]
    fn test_second_open_rejected() {
        let mut o = orch();
        let first = o.open(content(), Duration::from_secs(10)).unwrap().unwrap();
        advance(&mut o, 2000);

        assert_eq!(o.open(content(), Duration::from_secs(10)), Ok(None));
        assert_eq!(o.presentation().id(), Some(first));
        assert_eq!(o.remaining_ms(), 8000);
        assert_eq!(o.stats().rejected_opens, 1);
        assert_linked(&o);
    }

    #[test]
    fn test_minimize_restore_keeps_elapsed_time() {
        let mut o = orch();
        o.open(content(), Duration::from_secs(10)).unwrap();

        assert!(advance(&mut o, 4000).is_empty());
        assert!(o.minimize());
        assert_eq!(o.presentation().phase(), OpportunityPhase::OpenMinimized);
        assert_eq!(o.pause().info().pending_remaining, Some(Duration::from_millis(6000) + MARGIN));
        assert!(o.pause().is_paused());

        assert!(advance(&mut o, 3000).is_empty());
        assert!(o.restore());
        assert_eq!(o.presentation().phase(), OpportunityPhase::OpenVisible);
        assert_eq!(o.remaining_ms(), 3000);
        assert_eq!(o.pause().info().pending_remaining, Some(Duration::from_millis(3000) + MARGIN));
        assert_linked(&o);
    }

    #[test]
    fn test_minimize_and_restore_are_idempotent() {
        let mut o = orch();
        o.open(content(), Duration::from_secs(10)).unwrap();
        advance(&mut o, 1000);

        assert!(o.minimize());
        let timer = o.pause().pending_timer();
        assert!(!o.minimize());
        assert_eq!(o.pause().pending_timer(), timer);

        assert!(o.restore());
        let timer = o.pause().pending_timer();
        assert!(!o.restore());
        assert_eq!(o.pause().pending_timer(), timer);
        assert_linked(&o);
    }

    #[test]
    fn test_transitions_when_closed_are_noops() {
        let mut o = orch();
        assert!(!o.minimize());
        assert!(!o.restore());
        assert_eq!(o.decide(0), Ok(None));
        assert!(!o.pause().is_paused());
        assert_eq!(o.stats(), OrchestratorStats::default());
    }

    #[test]
    fn test_stale_timer_after_minimize_is_ignored() {
        let mut o = orch();
        o.open(content(), Duration::from_secs(10)).unwrap();
        let original = o.pause().pending_timer().unwrap().id;
        advance(&mut o, 1000);
        o.minimize();

        assert!(!o.on_timer_fired(original));
        assert!(o.presentation().is_active());
        assert_linked(&o);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decide_resumes_after_countdown() {
        let (mut o, mut notices) = with_notices();
        let id = o.open(content(), Duration::from_secs(10)).unwrap().unwrap();
        o.minimize();
        o.restore();

        let decision = o.decide(1).unwrap().unwrap();
        assert_eq!(decision.choice.label, "Away");
        assert!(!decision.while_minimized);

        // Presentation closes at once; the clock waits for the countdown.
        assert!(!o.presentation().is_active());
        assert!(o.presentation().content().is_none());
        assert!(o.pause().is_paused());
        assert!(o.is_resuming());
        assert_eq!(o.pause().info().pending_remaining, None);

        settle(&mut o).await;
        assert!(!o.pause().is_paused());

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.id, id);
        assert_eq!(notice.kind, CloseKind::Decided);
        assert_eq!(notice.minute, Some(27));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decide_while_minimized() {
        let mut o = orch();
        o.open(content(), Duration::from_secs(10)).unwrap();
        o.minimize();

        let decision = o.decide(0).unwrap().unwrap();
        assert!(decision.while_minimized);
        assert!(o.is_resuming());
        settle(&mut o).await;
        assert!(!o.pause().is_paused());
    }

    #[test]
    fn test_unknown_choice_leaves_opportunity_open() {
        let mut o = orch();
        o.open(content(), Duration::from_secs(10)).unwrap();
        assert_eq!(
            o.decide(7),
            Err(OpportunityError::UnknownChoice { index: 7, available: 3 })
        );
        assert!(o.presentation().is_active());
        assert_linked(&o);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_closes_and_resumes_with_countdown() {
        let (mut o, mut notices) = with_notices();
        o.open(content(), Duration::from_millis(1000)).unwrap();

        let fired = advance(&mut o, 1000);
        assert_eq!(fired.len(), 1);
        assert!(o.on_timer_fired(fired[0]));

        assert!(!o.presentation().is_active());
        assert!(o.is_resuming());
        settle(&mut o).await;
        assert!(!o.pause().is_paused());
        assert_eq!(notices.try_recv().unwrap().kind, CloseKind::TimedOut);
        assert_eq!(o.stats().timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimize_after_deadline_times_out() {
        let (mut o, mut notices) = with_notices();
        o.open(content(), Duration::from_millis(1000)).unwrap();
        // Deadline passes but the fired id is never delivered.
        let _ = advance(&mut o, 1500);

        assert!(o.minimize());
        assert!(!o.presentation().is_active());
        assert!(o.is_resuming());
        assert_eq!(notices.try_recv().unwrap().kind, CloseKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_after_deadline_times_out() {
        let mut o = orch();
        o.open(content(), Duration::from_millis(2000)).unwrap();
        o.minimize();
        let _ = advance(&mut o, 2000); // before the margin, nothing fired yet

        assert!(o.restore());
        assert_eq!(o.presentation().phase(), OpportunityPhase::Closed);
        assert!(o.is_resuming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduled_timer_fires_at_deadline() {
        let mut o = orch();
        o.open(content(), Duration::from_secs(10)).unwrap();
        advance(&mut o, 4000);
        o.minimize();

        assert!(advance(&mut o, 6000).is_empty()); // deadline, margin not yet elapsed
        let fired = advance(&mut o, MARGIN.as_millis() as u64);
        assert_eq!(fired.len(), 1);
        assert!(o.on_timer_fired(fired[0]));
        assert!(!o.presentation().is_active());
    }

    #[test]
    fn test_recovery_from_missing_content() {
        let (mut o, mut notices) = with_notices();
        o.open(content(), Duration::from_secs(10)).unwrap();

        let report = o.apply_presentation_patch(&json!({ "visible": true, "content": null }));
        assert!(report.rejected.is_empty());

        assert!(o.check_consistency());
        assert!(!o.presentation().is_active());
        // Immediate, no countdown.
        assert!(!o.pause().is_paused());
        assert!(!o.is_resuming());
        assert_eq!(notices.try_recv().unwrap().kind, CloseKind::Recovered);
        assert!(!o.check_consistency());
    }

    #[test]
    fn test_recovery_from_open_view_without_pause() {
        let mut o = orch();
        o.apply_presentation_patch(&json!({
            "visible": true,
            "startedAtMs": 0,
            "durationMs": 10000,
            "content": content(),
        }));
        assert!(o.check_consistency());
        assert!(!o.presentation().is_active());
        assert!(!o.pause().is_paused());
    }

    #[test]
    fn test_recovery_from_both_views() {
        let mut o = orch();
        o.open(content(), Duration::from_secs(10)).unwrap();
        o.apply_presentation_patch(&json!({ "minimized": true }));
        assert!(o.check_consistency());
        assert!(!o.pause().is_paused());
    }

    #[test]
    fn test_consistent_states_need_no_recovery() {
        let mut o = orch();
        assert!(!o.check_consistency());
        o.open(content(), Duration::from_secs(10)).unwrap();
        assert!(!o.check_consistency());
        o.minimize();
        assert!(!o.check_consistency());
        assert!(!o.suspend_match(PauseReason::HalfTime));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_hook_failure_still_resumes() {
        let mut o = orch().with_decision_hook(Box::new(|_: &Decision| -> anyhow::Result<()> {
            anyhow::bail!("insufficient balance")
        }));
        o.open(content(), Duration::from_secs(10)).unwrap();
        assert!(o.decide(2).unwrap().is_some());
        settle(&mut o).await;
        assert!(!o.pause().is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_hook_panic_still_resumes() {
        let mut o = orch().with_decision_hook(Box::new(|_: &Decision| -> anyhow::Result<()> {
            panic!("wallet exploded")
        }));
        o.open(content(), Duration::from_secs(10)).unwrap();
        assert!(o.decide(0).unwrap().is_some());
        assert!(o.is_resuming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_during_countdown_takes_over() {
        let mut o = orch();
        o.open(content(), Duration::from_secs(10)).unwrap();
        o.decide(0).unwrap();
        assert!(o.is_resuming());

        let second = o.open(content(), Duration::from_secs(5)).unwrap();
        assert!(second.is_some());
        assert!(!o.is_resuming());
        assert_eq!(o.pause().info().pending_remaining, Some(Duration::from_secs(5)));
        assert_linked(&o);
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_suspension() {
        let mut o = orch();
        assert!(!o.suspend_match(PauseReason::BettingOpportunity));
        assert!(o.suspend_match(PauseReason::HalfTime));
        assert_eq!(o.open(content(), Duration::from_secs(10)), Ok(None));

        assert!(matches!(o.resume_match(), ResumeOutcome::CountingDown(_)));
        settle(&mut o).await;
        assert!(!o.pause().is_paused());
        assert!(!o.check_consistency());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_everything() {
        let mut o = orch();
        o.open(content(), Duration::from_secs(10)).unwrap();
        o.minimize();
        o.reset();
        assert!(!o.presentation().is_active());
        assert!(!o.pause().is_paused());
        assert!(o.scheduler_mut().pending().is_empty());
    }

    #[test]
    fn test_random_toggling_keeps_invariant() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut o = orch();
            o.open(content(), Duration::from_secs(10)).unwrap();
            let mut last_remaining = o.remaining_ms();

            for _ in 0..20 {
                let step = rng.gen_range(0..400);
                let fired = advance(&mut o, step);
                // Keep the opportunity open: deliver nothing, stop near the end.
                if !fired.is_empty() || o.remaining_ms() < 500 {
                    break;
                }
                match rng.gen_range(0..3) {
                    0 => {
                        o.minimize();
                    }
                    1 => {
                        o.restore();
                    }
                    _ => {
                        o.minimize();
                        o.restore();
                        o.minimize();
                    }
                }
                assert!(o.remaining_ms() <= last_remaining);
                last_remaining = o.remaining_ms();
                assert_linked(&o);
                assert!(!o.check_consistency());
            }
        }
    }
}

//! Clock Pause Controller.
//!
//! Owns the one authoritative "may the match clock advance" flag, the reason
//! it is suspended, at most one pending auto-resume timer and at most one
//! in-flight resume countdown.
//!
//! Invariant: `!active` ⇒ no reason, no start time, no pending timer and no
//! countdown.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::countdown::{Countdown, CountdownOutcome, TickHook};
use super::messages::PauseSnapshot;
use super::scheduler::{Scheduler, TimerHandle, TimerId};
use super::types::PauseReason;

pub type CountdownId = u64;

/// Result of [`PauseController::resume`]. Every variant is a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Nothing to do, the clock was running.
    NotPaused,
    /// Cleared immediately.
    Resumed,
    /// Countdown started; the pause clears when it settles.
    CountingDown(CountdownId),
    /// A countdown was already in flight; this call changed nothing.
    AlreadyResuming,
}

struct InFlight {
    id: CountdownId,
    countdown: Countdown,
}

#[derive(Default)]
struct PauseState {
    active: bool,
    reason: Option<PauseReason>,
    started_at: Option<Instant>,
    pending: Option<TimerHandle>,
    countdown: Option<InFlight>,
}

pub struct PauseController<S: Scheduler> {
    scheduler: S,
    state: PauseState,
    next_countdown_id: CountdownId,
    tick_hook: Option<TickHook>,
    publisher: Option<watch::Sender<PauseSnapshot>>,
}

impl<S: Scheduler> PauseController<S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            state: PauseState::default(),
            next_countdown_id: 1,
            tick_hook: None,
            publisher: None,
        }
    }

    /// Receive every countdown tick.
    pub fn with_tick_hook(mut self, hook: TickHook) -> Self {
        self.tick_hook = Some(hook);
        self
    }

    /// Publish a snapshot after every state change.
    pub fn with_publisher(mut self, tx: watch::Sender<PauseSnapshot>) -> Self {
        tx.send_replace(self.info());
        self.publisher = Some(tx);
        self
    }

    pub fn now(&self) -> Instant {
        self.scheduler.now()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    // ═════════════════════════════════════════════════
    // Pause / resume
    // ═════════════════════════════════════════════════

    /// Suspend the clock. Returns false (and changes nothing) if already
    /// paused, unless a resume countdown is in flight: a new pause cancels
    /// that countdown and takes over.
    pub fn pause(&mut self, reason: PauseReason, timeout: Option<Duration>) -> bool {
        if self.state.active {
            match self.state.countdown.take() {
                Some(mut in_flight) => {
                    in_flight.countdown.cancel();
                    info!(
                        "⏸️ {} pre-empts resume countdown #{} (was {:?})",
                        reason, in_flight.id, self.state.reason,
                    );
                }
                None => {
                    debug!("pause({}) ignored — already paused for {:?}", reason, self.state.reason);
                    return false;
                }
            }
        }

        self.cancel_pending();
        self.state.active = true;
        self.state.reason = Some(reason);
        self.state.started_at = Some(self.scheduler.now());
        if let Some(delay) = timeout.filter(|d| !d.is_zero()) {
            self.state.pending = Some(self.scheduler.schedule(delay));
        }
        info!(
            "⏸️ Clock paused | reason={} auto_resume={:?}",
            reason,
            timeout.map(|d| d.as_millis()),
        );
        self.publish();
        true
    }

    /// Release the clock, optionally through a countdown of
    /// `countdown_secs`. Safe to call repeatedly and while a countdown is
    /// already running.
    pub fn resume(&mut self, with_countdown: bool, countdown_secs: u32) -> ResumeOutcome {
        if !self.state.active {
            return ResumeOutcome::NotPaused;
        }
        if self.state.countdown.is_some() {
            debug!("resume ignored — countdown already in flight");
            return ResumeOutcome::AlreadyResuming;
        }

        self.cancel_pending();

        if with_countdown && countdown_secs > 0 {
            let id = self.next_countdown_id;
            self.next_countdown_id += 1;
            let countdown = Countdown::run(countdown_secs, self.tick_hook.clone());
            self.state.countdown = Some(InFlight { id, countdown });
            info!("⏳ Resume countdown #{} started ({}s)", id, countdown_secs);
            self.publish();
            return ResumeOutcome::CountingDown(id);
        }

        self.clear();
        ResumeOutcome::Resumed
    }

    /// Wait for the in-flight countdown to settle. Never resolves when no
    /// countdown is running, so it can sit in a `select!` branch. Safe to
    /// drop and call again.
    pub async fn countdown_settled(&mut self) -> (CountdownId, CountdownOutcome) {
        match self.state.countdown.as_mut() {
            Some(in_flight) => {
                let outcome = (&mut in_flight.countdown).await;
                (in_flight.id, outcome)
            }
            None => std::future::pending().await,
        }
    }

    /// Finish a resume once its countdown has settled. The state is
    /// re-checked: a countdown that is no longer current changes nothing,
    /// and a cancelled one leaves the pause in place for the caller to
    /// resolve. Returns whether the clock was released.
    pub fn on_countdown_settled(&mut self, id: CountdownId, outcome: CountdownOutcome) -> bool {
        let current = self.state.countdown.as_ref().map(|c| c.id);
        if current != Some(id) {
            debug!("countdown #{} settled but is no longer current ({:?})", id, current);
            return false;
        }
        self.state.countdown = None;

        match outcome {
            CountdownOutcome::Completed if self.state.active => {
                self.clear();
                true
            }
            CountdownOutcome::Completed => false,
            CountdownOutcome::Cancelled => {
                warn!("⚠️ countdown #{} cancelled — clock still paused for {:?}", id, self.state.reason);
                self.publish();
                false
            }
        }
    }

    // ═════════════════════════════════════════════════
    // Auto-resume timer
    // ═════════════════════════════════════════════════

    /// Cancel the pending auto-resume without touching the pause itself.
    pub fn clear_pending_timeout(&mut self) -> bool {
        let cancelled = self.cancel_pending();
        if cancelled {
            self.publish();
        }
        cancelled
    }

    /// Replace the pending auto-resume with a fresh one `delay` from now.
    /// No-op when the clock is not paused or is already resuming.
    pub fn arm_auto_resume(&mut self, delay: Duration) -> bool {
        if !self.state.active || self.state.countdown.is_some() {
            return false;
        }
        self.cancel_pending();
        self.state.pending = Some(self.scheduler.schedule(delay));
        self.publish();
        true
    }

    pub fn pending_timer(&self) -> Option<TimerHandle> {
        self.state.pending
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.state.pending.map(|h| h.id) == Some(id)
    }

    /// Bare auto-resume: an immediate `resume(false, 0)`. Stale ids are
    /// ignored. Returns whether the timer was current.
    pub fn on_timer_fired(&mut self, id: TimerId) -> bool {
        if !self.is_pending(id) {
            debug!("⏲️ stale timer #{} ignored", id);
            return false;
        }
        self.state.pending = None;
        info!("⏲️ Auto-resume fired for {:?}", self.state.reason);
        self.resume(false, 0);
        true
    }

    // ═════════════════════════════════════════════════
    // Recovery
    // ═════════════════════════════════════════════════

    /// Release the clock right now, whatever is in flight.
    pub fn force_resume(&mut self) -> bool {
        let was_active = self.state.active;
        self.cancel_pending();
        if let Some(mut in_flight) = self.state.countdown.take() {
            in_flight.countdown.cancel();
        }
        if was_active {
            warn!("⚠️ Forced resume (was {:?})", self.state.reason);
            self.clear();
        }
        was_active
    }

    /// Back to defaults, e.g. on session reset.
    pub fn reset(&mut self) {
        self.cancel_pending();
        if let Some(mut in_flight) = self.state.countdown.take() {
            in_flight.countdown.cancel();
        }
        self.state = PauseState::default();
        info!("🔄 Pause controller reset");
        self.publish();
    }

    // ═════════════════════════════════════════════════
    // Queries
    // ═════════════════════════════════════════════════

    pub fn is_paused(&self) -> bool {
        self.state.active
    }

    pub fn is_resuming(&self) -> bool {
        self.state.countdown.is_some()
    }

    pub fn reason(&self) -> Option<PauseReason> {
        self.state.reason
    }

    pub fn info(&self) -> PauseSnapshot {
        let now = self.scheduler.now();
        PauseSnapshot {
            active: self.state.active,
            reason: self.state.reason,
            started_at: self.state.started_at,
            pending_remaining: self.state.pending.map(|h| h.remaining(now)),
            resuming: self.state.countdown.is_some(),
        }
    }

    // ═════════════════════════════════════════════════
    // Plumbing
    // ═════════════════════════════════════════════════

    fn cancel_pending(&mut self) -> bool {
        match self.state.pending.take() {
            Some(handle) => self.scheduler.cancel(&handle),
            None => false,
        }
    }

    fn clear(&mut self) {
        let paused_for = self
            .state
            .started_at
            .map(|t| self.scheduler.now().saturating_duration_since(t));
        let reason = self.state.reason;
        self.state.active = false;
        self.state.reason = None;
        self.state.started_at = None;
        self.state.pending = None;
        info!(
            "▶️ Clock resumed | was={:?} paused_for={:?}ms",
            reason,
            paused_for.map(|d| d.as_millis()),
        );
        self.publish();
    }

    fn publish(&self) {
        if let Some(tx) = &self.publisher {
            tx.send_replace(self.info());
        }
    }
}

//! Timer scheduling behind a small interface.
//!
//! The engine never touches `tokio::time` for its auto-resume timers directly.
//! It arms and cancels through [`Scheduler`], so the same state machine runs
//! on real tokio timers in the session actor and on a hand-cranked virtual
//! clock in tests.
//!
//! Fired timers are reported by id only. A fired id that no longer matches
//! the consumer's pending handle is stale and must be ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

pub type TimerId = u64;

/// An armed timer. Plain value; cancelling goes through the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    pub id: TimerId,
    pub deadline: Instant,
}

impl TimerHandle {
    /// Delay left until the timer fires, floored at zero.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

pub trait Scheduler: Send {
    fn now(&self) -> Instant;

    /// Arm a one-shot timer `delay` from now.
    fn schedule(&mut self, delay: Duration) -> TimerHandle;

    /// Disarm a timer. Returns whether it was still armed.
    fn cancel(&mut self, handle: &TimerHandle) -> bool;
}

// ─────────────────────────────────────────────────────────
// Tokio-backed scheduler
// ─────────────────────────────────────────────────────────

/// Arms one `sleep_until` task per timer. When a timer fires its id is sent
/// on the channel returned by [`TokioScheduler::new`]; the session actor
/// feeds those ids back into the orchestrator.
pub struct TokioScheduler {
    next_id: TimerId,
    armed: HashMap<TimerId, JoinHandle<()>>,
    fired_tx: mpsc::UnboundedSender<TimerId>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerId>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            next_id: 1,
            armed: HashMap::new(),
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    /// Number of timers whose task has not finished yet.
    pub fn armed_count(&self) -> usize {
        self.armed.values().filter(|h| !h.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        // Drop bookkeeping for timers that already fired.
        self.armed.retain(|_, h| !h.is_finished());

        let id = self.next_id;
        self.next_id += 1;
        let deadline = Instant::now() + delay;
        let tx = self.fired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(id);
        });
        self.armed.insert(id, task);
        debug!("⏲️ timer #{} armed for {}ms", id, delay.as_millis());
        TimerHandle { id, deadline }
    }

    fn cancel(&mut self, handle: &TimerHandle) -> bool {
        match self.armed.remove(&handle.id) {
            Some(task) => {
                let was_armed = !task.is_finished();
                task.abort();
                debug!("⏲️ timer #{} cancelled (armed={})", handle.id, was_armed);
                was_armed
            }
            None => false,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Manual (virtual clock) scheduler
// ─────────────────────────────────────────────────────────

/// Deterministic scheduler: time only moves when [`ManualScheduler::advance`]
/// is called.
#[derive(Debug)]
pub struct ManualScheduler {
    now: Instant,
    next_id: TimerId,
    armed: Vec<TimerHandle>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            now,
            next_id: 1,
            armed: Vec::new(),
        }
    }

    /// Move the clock forward and return the timers that fired, in deadline
    /// order (ties broken by arming order).
    pub fn advance(&mut self, by: Duration) -> Vec<TimerId> {
        self.now += by;
        let now = self.now;
        let mut fired: Vec<TimerHandle> = self
            .armed
            .iter()
            .copied()
            .filter(|h| h.deadline <= now)
            .collect();
        self.armed.retain(|h| h.deadline > now);
        fired.sort_by_key(|h| (h.deadline, h.id));
        fired.into_iter().map(|h| h.id).collect()
    }

    /// Timers still armed, soonest first.
    pub fn pending(&self) -> Vec<TimerHandle> {
        let mut pending = self.armed.clone();
        pending.sort_by_key(|h| (h.deadline, h.id));
        pending
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.now
    }

    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        let handle = TimerHandle {
            id: self.next_id,
            deadline: self.now + delay,
        };
        self.next_id += 1;
        self.armed.push(handle);
        handle
    }

    fn cancel(&mut self, handle: &TimerHandle) -> bool {
        let before = self.armed.len();
        self.armed.retain(|h| h.id != handle.id);
        self.armed.len() != before
    }
}

//! Resume countdown ("3… 2… 1…") before the match clock restarts.
//!
//! [`Countdown`] is a spawned task wrapped in a future. Awaiting it yields
//! [`CountdownOutcome::Completed`] one second after the last tick, or
//! [`CountdownOutcome::Cancelled`] if [`Countdown::cancel`] was called first.
//! A cancelled countdown emits no further ticks.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Receives each remaining second (`seconds`, …, 1).
pub type TickHook = Arc<dyn Fn(u32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    Completed,
    Cancelled,
}

pub struct Countdown {
    seconds: u32,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<CountdownOutcome>,
    settled: Option<CountdownOutcome>,
}

impl Countdown {
    /// Start ticking immediately. Must be called inside a tokio runtime.
    pub fn run(seconds: u32, on_tick: Option<TickHook>) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let task = tokio::spawn(async move {
            let start = Instant::now();
            for (step, remaining) in (1..=seconds).rev().enumerate() {
                if flag.load(Ordering::Acquire) {
                    return CountdownOutcome::Cancelled;
                }
                if let Some(hook) = &on_tick {
                    emit_tick(hook, remaining);
                }
                let next = start + Duration::from_secs(step as u64 + 1);
                tokio::time::sleep_until(next).await;
            }
            if flag.load(Ordering::Acquire) {
                CountdownOutcome::Cancelled
            } else {
                CountdownOutcome::Completed
            }
        });

        Self {
            seconds,
            cancelled,
            task,
            settled: None,
        }
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn is_settled(&self) -> bool {
        self.settled.is_some()
    }

    /// Stop the countdown. Returns false if it had already settled.
    pub fn cancel(&mut self) -> bool {
        if self.settled.is_some() {
            return false;
        }
        self.cancelled.store(true, Ordering::Release);
        self.task.abort();
        self.settled = Some(CountdownOutcome::Cancelled);
        debug!("⏹️ countdown ({}s) cancelled", self.seconds);
        true
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        if self.settled.is_none() {
            self.cancelled.store(true, Ordering::Release);
            self.task.abort();
        }
    }
}

impl Future for Countdown {
    type Output = CountdownOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.settled {
            return Poll::Ready(outcome);
        }
        let outcome = match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(err)) => {
                if err.is_panic() {
                    warn!("⚠️ countdown task panicked: {err}");
                }
                CountdownOutcome::Cancelled
            }
        };
        self.settled = Some(outcome);
        Poll::Ready(outcome)
    }
}

fn emit_tick(hook: &TickHook, remaining: u32) {
    if catch_unwind(AssertUnwindSafe(|| hook(remaining))).is_err() {
        warn!("⚠️ countdown tick hook panicked at {}s — continuing", remaining);
    }
}

//! Session actor.
//!
//! Owns the orchestrator and serialises every input into one event loop:
//!
//! ```text
//! Feed / UI ──(mpsc SessionCmd)──▶ ┐
//! TokioScheduler ──(timer ids)───▶ ├─ Session ──(watch PauseSnapshot)──▶ MatchClock
//! Countdown settlement ──────────▶ │          ──(mpsc ClosedNotice)───▶ Feed
//! Heartbeat (consistency check) ─▶ ┘
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::countdown::TickHook;
use super::messages::{ClosedNotice, PauseSnapshot, SessionCmd};
use super::orchestrator::{Orchestrator, OrchestratorStats};
use super::pause::PauseController;
use super::scheduler::{TimerId, TokioScheduler};

pub struct Session {
    orch: Orchestrator<TokioScheduler>,
    timer_rx: mpsc::UnboundedReceiver<TimerId>,
    cmd_rx: mpsc::Receiver<SessionCmd>,
}

impl Session {
    pub fn new(
        orch: Orchestrator<TokioScheduler>,
        timer_rx: mpsc::UnboundedReceiver<TimerId>,
        cmd_rx: mpsc::Receiver<SessionCmd>,
    ) -> Self {
        Self {
            orch,
            timer_rx,
            cmd_rx,
        }
    }

    /// Standard wiring: tokio scheduler, pause state published on
    /// `pause_tx`, close notices on `closed_tx`.
    pub fn from_config(
        cfg: SessionConfig,
        cmd_rx: mpsc::Receiver<SessionCmd>,
        pause_tx: watch::Sender<PauseSnapshot>,
        closed_tx: Option<mpsc::UnboundedSender<ClosedNotice>>,
        tick_hook: Option<TickHook>,
    ) -> Self {
        let (scheduler, timer_rx) = TokioScheduler::new();
        let mut pause = PauseController::new(scheduler).with_publisher(pause_tx);
        if let Some(hook) = tick_hook {
            pause = pause.with_tick_hook(hook);
        }
        let mut orch = Orchestrator::new(cfg, pause);
        if let Some(tx) = closed_tx {
            orch = orch.with_close_notifier(tx);
        }
        Self::new(orch, timer_rx, cmd_rx)
    }

    /// Main actor loop. Returns the orchestrator stats on exit.
    pub async fn run(mut self) -> OrchestratorStats {
        let cfg = self.orch.config().clone();
        info!(
            "🎮 Session started | budget={}ms countdown={}s margin={}ms heartbeat={}ms",
            cfg.opportunity_duration.as_millis(),
            cfg.countdown_secs,
            cfg.reschedule_margin.as_millis(),
            cfg.heartbeat.as_millis(),
        );

        let mut heartbeat = tokio::time::interval(cfg.heartbeat.max(Duration::from_millis(1)));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCmd::Shutdown) | None => break,
                        Some(cmd) => self.handle(cmd),
                    }
                }
                Some(id) = self.timer_rx.recv() => {
                    self.orch.on_timer_fired(id);
                }
                (id, outcome) = self.orch.countdown_settled() => {
                    self.orch.on_countdown_settled(id, outcome);
                }
                _ = heartbeat.tick() => {
                    self.orch.check_consistency();
                }
            }
        }

        self.orch.reset();
        let s = self.orch.stats();
        info!(
            "🎮 Shutdown | opened={} decided={} timed_out={} recovered={} rescheduled={} rejected={}",
            s.opened, s.decided, s.timed_out, s.recovered, s.rescheduled, s.rejected_opens,
        );
        s
    }

    fn handle(&mut self, cmd: SessionCmd) {
        match cmd {
            SessionCmd::Open {
                content,
                duration,
                reply,
            } => {
                let duration = duration.unwrap_or(self.orch.config().opportunity_duration);
                let result = self.orch.open(content, duration);
                if let Err(e) = &result {
                    warn!("🚫 open refused: {e}");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            SessionCmd::Minimize => {
                self.orch.minimize();
            }
            SessionCmd::Restore => {
                self.orch.restore();
            }
            SessionCmd::Decide { choice_index } => {
                if let Err(e) = self.orch.decide(choice_index) {
                    warn!("🚫 decide refused: {e}");
                }
            }
            SessionCmd::SuspendMatch { reason } => {
                self.orch.suspend_match(reason);
            }
            SessionCmd::ResumeMatch => {
                let outcome = self.orch.resume_match();
                debug!("resume_match → {:?}", outcome);
            }
            SessionCmd::ApplyPatch { patch } => {
                let report = self.orch.apply_presentation_patch(&patch);
                debug!("patch applied={:?} rejected={:?}", report.accepted, report.rejected);
            }
            SessionCmd::Snapshot { reply } => {
                let _ = reply.send(self.orch.snapshot());
            }
            SessionCmd::Reset => {
                info!("🔄 Session reset");
                self.orch.reset();
            }
            // Handled by the loop.
            SessionCmd::Shutdown => {}
        }
    }
}

//! Pause-aware match clock.
//!
//! Advances one match minute per `minute` of wall time, but only while the
//! published [`PauseSnapshot`] says the clock may run. A minute interrupted
//! by a pause keeps its partial progress.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use super::config::MatchConfig;
use super::messages::{MatchEvent, PauseSnapshot, SessionCmd};
use super::types::PauseReason;

pub struct MatchClock {
    cfg: MatchConfig,
    pause_rx: watch::Receiver<PauseSnapshot>,
    event_tx: mpsc::Sender<MatchEvent>,
    cmd_tx: mpsc::Sender<SessionCmd>,
    minute: u32,
}

impl MatchClock {
    pub fn new(
        cfg: MatchConfig,
        pause_rx: watch::Receiver<PauseSnapshot>,
        event_tx: mpsc::Sender<MatchEvent>,
        cmd_tx: mpsc::Sender<SessionCmd>,
    ) -> Self {
        Self {
            cfg,
            pause_rx,
            event_tx,
            cmd_tx,
            minute: 0,
        }
    }

    /// Run to full time. Returns the last minute played, which is short of
    /// `match_minutes` only if the session went away.
    pub async fn run(mut self) -> u32 {
        info!(
            "⚽ Kick-off | {} minutes, {}ms per minute",
            self.cfg.match_minutes,
            self.cfg.minute.as_millis(),
        );
        let half = self.cfg.match_minutes / 2;
        let mut progress = Duration::ZERO;

        while self.minute < self.cfg.match_minutes {
            if !self.wait_until_running().await {
                debug!("pause channel closed at minute {}", self.minute);
                return self.minute;
            }

            let left = self.cfg.minute.saturating_sub(progress);
            let started = Instant::now();
            tokio::select! {
                _ = tokio::time::sleep(left) => {
                    progress = Duration::ZERO;
                }
                changed = self.pause_rx.changed() => {
                    if changed.is_err() {
                        return self.minute;
                    }
                    progress += started.elapsed().min(left);
                    continue;
                }
            }

            self.minute += 1;
            self.emit(MatchEvent::Minute(self.minute)).await;

            if self.minute == half && half > 0 && self.minute < self.cfg.match_minutes {
                self.half_time().await;
            }
        }

        info!("🏁 Full time at minute {}", self.minute);
        self.command(SessionCmd::SuspendMatch {
            reason: PauseReason::MatchEnd,
        })
        .await;
        self.emit(MatchEvent::FullTime).await;
        self.minute
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    async fn half_time(&mut self) {
        info!("⏸️ Half time at minute {} ({}ms break)", self.minute, self.cfg.half_time.as_millis());
        self.command(SessionCmd::SuspendMatch {
            reason: PauseReason::HalfTime,
        })
        .await;
        self.emit(MatchEvent::HalfTime).await;
        tokio::time::sleep(self.cfg.half_time).await;
        self.command(SessionCmd::ResumeMatch).await;
    }

    /// Block while the clock is paused. Returns false if the publisher is gone.
    async fn wait_until_running(&mut self) -> bool {
        loop {
            let paused = self.pause_rx.borrow_and_update().active;
            if !paused {
                return true;
            }
            if self.pause_rx.changed().await.is_err() {
                return false;
            }
        }
    }

    async fn emit(&self, event: MatchEvent) {
        if self.event_tx.send(event).await.is_err() {
            debug!("match event {:?} dropped (feed gone)", event);
        }
    }

    async fn command(&self, cmd: SessionCmd) {
        if self.cmd_tx.send(cmd).await.is_err() {
            debug!("session command dropped (session gone)");
        }
    }
}

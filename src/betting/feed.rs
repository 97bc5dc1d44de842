//! Simulated match participants: the event feed that turns match minutes
//! into action bets, and the punter that answers them.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::config::{env_parse, MatchConfig};
use super::messages::{ClosedNotice, MatchEvent, PauseSnapshot, SessionCmd};
use super::types::{BetChoice, CloseKind, OpportunityContent};

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

// ─────────────────────────────────────────────────────────
// Event feed
// ─────────────────────────────────────────────────────────

struct Template {
    /// `{team}` is replaced by the side the event belongs to.
    description: &'static str,
    choices: &'static [(&'static str, f64)],
}

const TEMPLATES: &[Template] = &[
    Template {
        description: "Corner for {team}: shot on target from it?",
        choices: &[("Yes", 2.40), ("No", 1.55)],
    },
    Template {
        description: "Penalty to {team}! Will it be scored?",
        choices: &[("Scored", 1.30), ("Saved", 3.60), ("Missed", 6.50)],
    },
    Template {
        description: "Free kick to {team} on the edge of the box: outcome?",
        choices: &[("Goal", 7.00), ("On target", 2.80), ("Off target", 1.60)],
    },
    Template {
        description: "{team} breaking three on two: next goal?",
        choices: &[("Home", 2.10), ("Away", 2.70), ("No goal", 3.10)],
    },
    Template {
        description: "VAR check on a {team} goal: does it stand?",
        choices: &[("Stands", 1.45), ("Overturned", 2.75)],
    },
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    pub minutes: u32,
    pub offered: u32,
    pub decided: u32,
    pub timed_out: u32,
    pub recovered: u32,
}

pub struct EventFeed {
    cfg: MatchConfig,
    rng: StdRng,
    event_rx: mpsc::Receiver<MatchEvent>,
    closed_rx: mpsc::UnboundedReceiver<ClosedNotice>,
    cmd_tx: mpsc::Sender<SessionCmd>,
    stats: FeedStats,
}

impl EventFeed {
    pub fn new(
        cfg: MatchConfig,
        event_rx: mpsc::Receiver<MatchEvent>,
        closed_rx: mpsc::UnboundedReceiver<ClosedNotice>,
        cmd_tx: mpsc::Sender<SessionCmd>,
    ) -> Self {
        let rng = rng_from(cfg.seed);
        Self {
            cfg,
            rng,
            event_rx,
            closed_rx,
            cmd_tx,
            stats: FeedStats::default(),
        }
    }

    /// Run until full time (or until the clock goes away).
    pub async fn run(mut self) -> FeedStats {
        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(MatchEvent::Minute(minute)) => self.on_minute(minute).await,
                        Some(MatchEvent::HalfTime) => info!("📣 Half time"),
                        Some(MatchEvent::FullTime) | None => break,
                    }
                }
                Some(notice) = self.closed_rx.recv() => self.on_closed(&notice),
            }
        }

        while let Ok(notice) = self.closed_rx.try_recv() {
            self.on_closed(&notice);
        }
        let s = self.stats;
        info!(
            "📣 Feed done | minutes={} offered={} decided={} timed_out={} recovered={}",
            s.minutes, s.offered, s.decided, s.timed_out, s.recovered,
        );
        s
    }

    async fn on_minute(&mut self, minute: u32) {
        self.stats.minutes = minute;
        // No new bets once the final whistle is due.
        if minute >= self.cfg.match_minutes {
            return;
        }
        let Some(content) = self.roll(minute) else {
            return;
        };
        info!("📣 {}' {}", minute, content.description);
        let cmd = SessionCmd::Open {
            content,
            duration: None,
            reply: None,
        };
        if self.cmd_tx.send(cmd).await.is_err() {
            warn!("session gone, opportunity at {}' dropped", minute);
            return;
        }
        self.stats.offered += 1;
    }

    /// Roll for a betting-eligible event this minute.
    fn roll(&mut self, minute: u32) -> Option<OpportunityContent> {
        let chance = if self.cfg.bet_chance.is_finite() {
            self.cfg.bet_chance.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if !self.rng.gen_bool(chance) {
            return None;
        }

        let template = &TEMPLATES[self.rng.gen_range(0..TEMPLATES.len())];
        let team = if self.rng.gen_bool(0.5) { "Home" } else { "Away" };
        let choices = template
            .choices
            .iter()
            .map(|(label, odds)| {
                let jitter: f64 = self.rng.gen_range(0.92..1.08);
                BetChoice::new(*label, (odds * jitter * 100.0).round() / 100.0)
            })
            .collect();

        Some(OpportunityContent {
            description: template.description.replace("{team}", team),
            choices,
            minute,
        })
    }

    fn on_closed(&mut self, notice: &ClosedNotice) {
        let at = notice.minute.map(|m| format!("{m}'")).unwrap_or_else(|| "?".into());
        match notice.kind {
            CloseKind::Decided => {
                self.stats.decided += 1;
                if let Some(d) = &notice.decision {
                    info!("💰 {} bet placed: \"{}\" @{:.2}", at, d.choice.label, d.choice.odds);
                }
            }
            CloseKind::TimedOut => {
                self.stats.timed_out += 1;
                info!("⌛ {} no bet, opportunity {} ran out", at, notice.id.short());
            }
            CloseKind::Recovered => {
                self.stats.recovered += 1;
                warn!("🚑 {} opportunity {} force-closed", at, notice.id.short());
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// Simulated punter
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PunterConfig {
    /// Probability of placing a bet instead of letting it run out.
    pub decide_chance: f64,
    /// Upper bound of each think / toggle delay.
    pub max_think: Duration,
    /// Upper bound on minimize/restore toggles per opportunity.
    pub max_toggles: u32,
    pub seed: Option<u64>,
}

impl Default for PunterConfig {
    fn default() -> Self {
        Self {
            decide_chance: 0.7,
            max_think: Duration::from_millis(1500),
            max_toggles: 3,
            seed: None,
        }
    }
}

impl PunterConfig {
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Some(p) = env_parse::<f64>("PUNTER_DECIDE_CHANCE") {
            c.decide_chance = p.clamp(0.0, 1.0);
        }
        if let Some(ms) = env_parse::<u64>("PUNTER_MAX_THINK_MS") {
            c.max_think = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<u32>("PUNTER_MAX_TOGGLES") {
            c.max_toggles = n;
        }
        c.seed = env_parse::<u64>("MATCH_SEED").map(|s| s.wrapping_add(1));
        c
    }
}

/// Watches the pause state and plays every opened opportunity: fiddles
/// with the view, then bets or walks away.
pub struct Punter {
    cfg: PunterConfig,
    rng: StdRng,
    pause_rx: watch::Receiver<PauseSnapshot>,
    cmd_tx: mpsc::Sender<SessionCmd>,
    bets: u32,
}

impl Punter {
    pub fn new(
        cfg: PunterConfig,
        pause_rx: watch::Receiver<PauseSnapshot>,
        cmd_tx: mpsc::Sender<SessionCmd>,
    ) -> Self {
        let rng = rng_from(cfg.seed);
        Self {
            cfg,
            rng,
            pause_rx,
            cmd_tx,
            bets: 0,
        }
    }

    /// Runs until the session drops its pause publisher. Returns the number
    /// of bets placed.
    pub async fn run(mut self) -> u32 {
        loop {
            if !self.wait_for(|p| p.is_betting() && !p.resuming).await {
                break;
            }
            if self.play().await.is_none() {
                break;
            }
            if !self.wait_for(|p| !p.is_betting() || p.resuming).await {
                break;
            }
        }
        debug!("punter done, {} bets", self.bets);
        self.bets
    }

    /// `None` when the session is gone.
    async fn play(&mut self) -> Option<()> {
        let toggles = self.rng.gen_range(0..=self.cfg.max_toggles);
        for i in 0..toggles {
            self.think().await;
            if !self.still_betting() {
                return Some(());
            }
            let cmd = if i % 2 == 0 {
                SessionCmd::Minimize
            } else {
                SessionCmd::Restore
            };
            self.cmd_tx.send(cmd).await.ok()?;
        }

        let chance = if self.cfg.decide_chance.is_finite() {
            self.cfg.decide_chance.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if !self.rng.gen_bool(chance) {
            debug!("punter lets it run out");
            return Some(());
        }
        self.think().await;
        if !self.still_betting() {
            return Some(());
        }

        let (reply, rx) = oneshot::channel();
        self.cmd_tx.send(SessionCmd::Snapshot { reply }).await.ok()?;
        let snapshot = rx.await.ok()?;
        let Some(choices) = snapshot.presentation.content.map(|c| c.choices.len()) else {
            return Some(());
        };
        if choices == 0 {
            return Some(());
        }
        let choice_index = self.rng.gen_range(0..choices);
        self.cmd_tx.send(SessionCmd::Decide { choice_index }).await.ok()?;
        self.bets += 1;
        Some(())
    }

    async fn think(&mut self) {
        let max = self.cfg.max_think.as_millis().max(1) as u64;
        let ms = self.rng.gen_range(0..max);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn still_betting(&self) -> bool {
        let p = *self.pause_rx.borrow();
        p.is_betting() && !p.resuming
    }

    /// Wait until `cond` holds. Returns false if the publisher is gone.
    async fn wait_for(&mut self, cond: impl Fn(&PauseSnapshot) -> bool) -> bool {
        loop {
            let snap = *self.pause_rx.borrow_and_update();
            if cond(&snap) {
                return true;
            }
            if self.pause_rx.changed().await.is_err() {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::betting::messages::SessionSnapshot;
    use crate::betting::presentation::PresentationSnapshot;
    use crate::betting::types::{Decision, OpportunityId, PauseReason};
    use tokio::time::timeout;

    type FeedParts = (
        EventFeed,
        mpsc::Sender<MatchEvent>,
        mpsc::UnboundedSender<ClosedNotice>,
        mpsc::Receiver<SessionCmd>,
    );

    fn feed(bet_chance: f64, seed: u64) -> FeedParts {
        let cfg = MatchConfig {
            bet_chance,
            seed: Some(seed),
            ..Default::default()
        };
        let (event_tx, event_rx) = mpsc::channel(16);
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (EventFeed::new(cfg, event_rx, closed_rx, cmd_tx), event_tx, closed_tx, cmd_rx)
    }

    #[test]
    fn test_roll_always_or_never() {
        let (mut always, ..) = feed(1.0, 3);
        let content = always.roll(17).unwrap();
        assert_eq!(content.minute, 17);
        assert!(!content.choices.is_empty());
        assert!(!content.description.contains("{team}"));
        assert!(content.choices.iter().all(|c| c.odds > 1.0));

        let (mut never, ..) = feed(0.0, 3);
        assert!((1..=90).all(|m| never.roll(m).is_none()));

        let (mut broken, ..) = feed(f64::NAN, 3);
        assert!(broken.roll(1).is_none());
    }

    #[test]
    fn test_same_seed_same_events() {
        let (mut a, ..) = feed(0.3, 42);
        let (mut b, ..) = feed(0.3, 42);
        for minute in 1..=90 {
            assert_eq!(a.roll(minute), b.roll(minute));
        }
    }

    #[tokio::test]
    async fn test_feed_opens_and_counts_closes() {
        let (f, event_tx, closed_tx, mut cmd_rx) = feed(1.0, 9);
        let task = tokio::spawn(f.run());

        event_tx.send(MatchEvent::Minute(12)).await.unwrap();
        let cmd = timeout(Duration::from_secs(1), cmd_rx.recv()).await.unwrap().unwrap();
        let (content, duration, reply) = match cmd {
            SessionCmd::Open {
                content,
                duration,
                reply,
            } => (content, duration, reply),
            other => panic!("expected Open, got {other:?}"),
        };
        assert_eq!(content.minute, 12);
        assert!(duration.is_none());
        assert!(reply.is_none());

        let id = OpportunityId::new();
        closed_tx
            .send(ClosedNotice {
                id,
                kind: CloseKind::Decided,
                decision: Some(Decision {
                    opportunity: id,
                    choice_index: 0,
                    choice: content.choices[0].clone(),
                    while_minimized: false,
                }),
                minute: Some(12),
            })
            .unwrap();
        closed_tx
            .send(ClosedNotice {
                id: OpportunityId::new(),
                kind: CloseKind::TimedOut,
                decision: None,
                minute: None,
            })
            .unwrap();
        event_tx.send(MatchEvent::FullTime).await.unwrap();

        let stats = timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(stats.minutes, 12);
        assert_eq!(stats.offered, 1);
        assert_eq!(stats.decided, 1);
        assert_eq!(stats.timed_out, 1);
    }

    fn betting() -> PauseSnapshot {
        PauseSnapshot {
            active: true,
            reason: Some(PauseReason::BettingOpportunity),
            pending_remaining: Some(Duration::from_secs(10)),
            ..Default::default()
        }
    }

    fn snapshot_with(choices: usize) -> SessionSnapshot {
        SessionSnapshot {
            pause: betting(),
            presentation: PresentationSnapshot {
                id: Some(OpportunityId::new()),
                visible: true,
                minimized: false,
                started_at_ms: Some(0),
                duration_ms: Some(10_000),
                remaining_ms: 8_000,
                content: Some(OpportunityContent {
                    description: "Next goal?".into(),
                    choices: (0..choices).map(|i| BetChoice::new(format!("c{i}"), 2.0)).collect(),
                    minute: 30,
                }),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_punter_bets_on_open_opportunity() {
        let (pause_tx, pause_rx) = watch::channel(PauseSnapshot::default());
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let cfg = PunterConfig {
            decide_chance: 1.0,
            seed: Some(5),
            ..Default::default()
        };
        let punter = tokio::spawn(Punter::new(cfg, pause_rx, cmd_tx).run());

        pause_tx.send_replace(betting());
        let mut toggles = 0;
        let choice = loop {
            match timeout(Duration::from_secs(10), cmd_rx.recv()).await.unwrap().unwrap() {
                SessionCmd::Minimize | SessionCmd::Restore => toggles += 1,
                SessionCmd::Snapshot { reply } => {
                    let _ = reply.send(snapshot_with(3));
                }
                SessionCmd::Decide { choice_index } => break choice_index,
                other => panic!("unexpected {other:?}"),
            }
        };
        assert!(choice < 3);
        assert!(toggles <= 3);

        pause_tx.send_replace(PauseSnapshot::default());
        drop(pause_tx);
        assert_eq!(timeout(Duration::from_secs(10), punter).await.unwrap().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_punter_walks_away() {
        let (pause_tx, pause_rx) = watch::channel(PauseSnapshot::default());
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let cfg = PunterConfig {
            decide_chance: 0.0,
            max_toggles: 0,
            seed: Some(5),
            ..Default::default()
        };
        let punter = tokio::spawn(Punter::new(cfg, pause_rx, cmd_tx).run());

        pause_tx.send_replace(betting());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(cmd_rx.try_recv().is_err());

        drop(pause_tx);
        assert_eq!(timeout(Duration::from_secs(10), punter).await.unwrap().unwrap(), 0);
    }
}

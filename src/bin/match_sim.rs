//! Live Betting Pause — match simulation
//!
//! Actor-based architecture:
//!   MatchClock ──(MatchEvent)──→ EventFeed ──(Open)──→ Session ──(watch PauseSnapshot)──→ MatchClock / Punter
//!   Punter ──(Minimize / Restore / Decide)──→ Session ──(ClosedNotice)──→ EventFeed
//!
//! Runs one simulated match and exits at full time.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use live_bet_pause::betting::config::{MatchConfig, SessionConfig};
use live_bet_pause::betting::countdown::TickHook;
use live_bet_pause::betting::feed::{EventFeed, Punter, PunterConfig};
use live_bet_pause::betting::match_clock::MatchClock;
use live_bet_pause::betting::messages::{PauseSnapshot, SessionCmd};
use live_bet_pause::betting::session::Session;

// ─────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Console output, plus a daily rolling file when `SIM_LOG_DIR` is set. Keep
/// the returned guard alive until exit so the file writer flushes.
fn init_logging() -> anyhow::Result<Option<WorkerGuard>> {
    let console = tracing_subscriber::fmt::layer().with_filter(env_filter());

    match env::var("SIM_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(&dir, "match_sim.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter());
            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .try_init()
                .context("installing tracing subscriber")?;
            Ok(Some(guard))
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(console)
                .try_init()
                .context("installing tracing subscriber")?;
            Ok(None)
        }
    }
}

// ─────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = init_logging()?;

    info!("═══════════════════════════════════════════════════");
    info!("  Live Betting Pause — Match Simulation");
    info!("═══════════════════════════════════════════════════");

    let session_cfg = SessionConfig::from_env();
    let match_cfg = MatchConfig::from_env();
    let punter_cfg = PunterConfig::from_env();

    info!(
        "📊 Config: minutes={} minute={}ms half_time={}ms bet_chance={:.2} budget={}ms countdown={}s seed={:?}",
        match_cfg.match_minutes,
        match_cfg.minute.as_millis(),
        match_cfg.half_time.as_millis(),
        match_cfg.bet_chance,
        session_cfg.opportunity_duration.as_millis(),
        session_cfg.countdown_secs,
        match_cfg.seed,
    );

    // ═══ Channels ═══
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCmd>(64);
    let (pause_tx, pause_rx) = watch::channel(PauseSnapshot::default());
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(64);

    // ═══ Actors ═══
    let tick_hook: TickHook = Arc::new(|s: u32| info!("⏳ {}…", s));
    let session = Session::from_config(
        session_cfg,
        cmd_rx,
        pause_tx,
        Some(closed_tx),
        Some(tick_hook),
    );
    let session_handle = tokio::spawn(session.run());

    let feed = EventFeed::new(match_cfg.clone(), event_rx, closed_rx, cmd_tx.clone());
    let feed_handle = tokio::spawn(feed.run());

    let punter = Punter::new(punter_cfg, pause_rx.clone(), cmd_tx.clone());
    let punter_handle = tokio::spawn(punter.run());

    let clock = MatchClock::new(match_cfg, pause_rx, event_tx, cmd_tx.clone());
    let clock_handle = tokio::spawn(clock.run());

    let kickoff = chrono::Local::now();
    info!("⚽ Kick-off at {}", kickoff.format("%H:%M:%S"));

    // ═══ Play until full time or Ctrl-C ═══
    tokio::select! {
        played = futures::future::try_join(clock_handle, feed_handle) => {
            let (last_minute, feed_stats) = played.context("match actor panicked")?;
            info!(
                "🏁 Match over at {}' | offered={} decided={} timed_out={} recovered={}",
                last_minute,
                feed_stats.offered,
                feed_stats.decided,
                feed_stats.timed_out,
                feed_stats.recovered,
            );
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("🛑 Interrupted — shutting down");
        }
    }

    // ═══ Shutdown ═══
    if cmd_tx.send(SessionCmd::Shutdown).await.is_err() {
        warn!("session already gone");
    }
    let session_stats = session_handle.await.context("session actor panicked")?;
    let bets = punter_handle.await.context("punter panicked")?;

    let wall = chrono::Local::now().signed_duration_since(kickoff);
    info!(
        "📈 Summary | wall={}s opened={} decided={} (punter bets={}) timed_out={} recovered={} rescheduled={} rejected={}",
        wall.num_seconds(),
        session_stats.opened,
        session_stats.decided,
        bets,
        session_stats.timed_out,
        session_stats.recovered,
        session_stats.rescheduled,
        session_stats.rejected_opens,
    );
    Ok(())
}

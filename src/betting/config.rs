use std::time::Duration;

// ─────────────────────────────────────────────────────────
// Session (pause engine) configuration
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time budget of an action bet when the feed does not pass one.
    /// Default: 10s.
    pub opportunity_duration: Duration,
    /// Length of the resume countdown after a decision or expiry.
    /// Default: 3.
    pub countdown_secs: u32,
    /// Added to a rescheduled auto-resume so it never fires a hair before
    /// the logical deadline. Default: 100ms.
    pub reschedule_margin: Duration,
    /// How often the session runs the consistency check. Default: 250ms.
    pub heartbeat: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            opportunity_duration: Duration::from_millis(10_000),
            countdown_secs: 3,
            reschedule_margin: Duration::from_millis(100),
            heartbeat: Duration::from_millis(250),
        }
    }
}

impl SessionConfig {
    /// Load overrides from environment variables (if set).
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Some(ms) = env_parse::<u64>("BET_OPPORTUNITY_MS") {
            c.opportunity_duration = Duration::from_millis(ms);
        }
        if let Some(s) = env_parse::<u32>("BET_COUNTDOWN_SECS") {
            c.countdown_secs = s;
        }
        if let Some(ms) = env_parse::<u64>("BET_RESCHEDULE_MARGIN_MS") {
            c.reschedule_margin = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("BET_HEARTBEAT_MS") {
            // A zero interval would panic in tokio::time::interval.
            c.heartbeat = Duration::from_millis(ms.max(1));
        }
        c
    }
}

// ─────────────────────────────────────────────────────────
// Simulated match configuration
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Default: 90.
    pub match_minutes: u32,
    /// Wall-clock length of one match minute. Default: 500ms.
    pub minute: Duration,
    /// Wall-clock length of the half-time break. Default: 3s.
    pub half_time: Duration,
    /// Probability that a minute produces a betting-eligible event.
    /// Default: 0.15.
    pub bet_chance: f64,
    /// RNG seed for the event feed; random when unset.
    pub seed: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_minutes: 90,
            minute: Duration::from_millis(500),
            half_time: Duration::from_millis(3000),
            bet_chance: 0.15,
            seed: None,
        }
    }
}

impl MatchConfig {
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Some(m) = env_parse::<u32>("MATCH_MINUTES") {
            c.match_minutes = m;
        }
        if let Some(ms) = env_parse::<u64>("MATCH_MINUTE_MS") {
            c.minute = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = env_parse::<u64>("MATCH_HALF_TIME_MS") {
            c.half_time = Duration::from_millis(ms);
        }
        if let Some(p) = env_parse::<f64>("MATCH_BET_CHANCE") {
            c.bet_chance = p.clamp(0.0, 1.0);
        }
        if let Some(seed) = env_parse::<u64>("MATCH_SEED") {
            c.seed = Some(seed);
        }
        c
    }
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let c = SessionConfig::default();
        assert_eq!(c.opportunity_duration, Duration::from_secs(10));
        assert_eq!(c.countdown_secs, 3);
        assert_eq!(c.reschedule_margin, Duration::from_millis(100));
    }

    #[test]
    fn test_match_defaults() {
        let c = MatchConfig::default();
        assert_eq!(c.match_minutes, 90);
        assert_eq!(c.half_time, Duration::from_secs(3));
        assert!(c.seed.is_none());
        assert!((c.bet_chance - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_env_parse_ignores_garbage() {
        std::env::set_var("LBP_TEST_GARBAGE", "ten");
        assert_eq!(env_parse::<u64>("LBP_TEST_GARBAGE"), None);
        std::env::set_var("LBP_TEST_NUMBER", " 42 ");
        assert_eq!(env_parse::<u64>("LBP_TEST_NUMBER"), Some(42));
        assert_eq!(env_parse::<u64>("LBP_TEST_UNSET_KEY"), None);
    }
}

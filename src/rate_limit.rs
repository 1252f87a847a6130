// In-memory rate limiter for the oracle-backed and leaderboard-writing endpoints.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Different rate limit types with their constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Oracle calls (actions, openings, epilogues) per nickname.
    OracleCalls,
    /// Finished-game submissions per nickname.
    GameEnds,
}

impl RateLimitType {
    /// Maximum number of events allowed in the window.
    pub fn max_count(&self) -> usize {
        match self {
            RateLimitType::OracleCalls => 30,
            RateLimitType::GameEnds => 20,
        }
    }

    /// Time window for the rate limit.
    pub fn window(&self) -> Duration {
        match self {
            RateLimitType::OracleCalls => Duration::from_secs(60),
            RateLimitType::GameEnds => Duration::from_secs(60),
        }
    }
}

impl std::fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitType::OracleCalls => write!(f, "AI requests per minute"),
            RateLimitType::GameEnds => write!(f, "game submissions per minute"),
        }
    }
}

/// Error returned when a rate limit is exceeded.
#[derive(Debug, Clone)]
pub struct RateLimitError {
    pub limit_type: RateLimitType,
    pub max: usize,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rate limit exceeded: max {} {}",
            self.max, self.limit_type
        )
    }
}

impl std::error::Error for RateLimitError {}

/// Key for the rate limit map: (nickname, limit_type).
type LimitKey = (String, RateLimitType);

/// How often idle nicknames are swept out of the map.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Windows {
    entries: HashMap<LimitKey, Vec<Instant>>,
    last_sweep: Instant,
}

impl Windows {
    /// Drop expired timestamps, and every key left with none.
    fn sweep(&mut self, now: Instant) {
        self.entries.retain(|(_, limit_type), times| {
            let window = limit_type.window();
            times.retain(|t| now.duration_since(*t) < window);
            !times.is_empty()
        });
        self.last_sweep = now;
    }
}

/// Thread-safe in-memory sliding-window rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Windows>>,
    enabled: bool,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_enabled(!crate::config::is_local_mode())
    }

    /// A limiter that lets everything through.
    pub fn disabled() -> Self {
        Self::with_enabled(false)
    }

    fn with_enabled(enabled: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Windows {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            enabled,
        }
    }

    /// Check if the nickname is within the rate limit for the given type.
    /// If within limits, records the event and returns Ok(()).
    pub fn check_limit(
        &self,
        nickname: &str,
        limit_type: RateLimitType,
    ) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }
        self.check_limit_at(nickname, limit_type, Instant::now())
    }

    fn check_limit_at(
        &self,
        nickname: &str,
        limit_type: RateLimitType,
        now: Instant,
    ) -> Result<(), RateLimitError> {
        let mut windows = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if now.duration_since(windows.last_sweep) >= SWEEP_INTERVAL {
            windows.sweep(now);
        }

        let key = (nickname.to_string(), limit_type);
        let window = limit_type.window();
        let max = limit_type.max_count();

        let entries = windows.entries.entry(key).or_default();

        // Remove expired entries
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            return Err(RateLimitError { limit_type, max });
        }

        entries.push(now);
        Ok(())
    }

    /// Get the current count for a nickname and limit type (for testing/diagnostics).
    pub fn current_count(&self, nickname: &str, limit_type: RateLimitType) -> usize {
        let mut windows = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (nickname.to_string(), limit_type);
        let window = limit_type.window();
        let now = Instant::now();

        let Some(entries) = windows.entries.get_mut(&key) else {
            return 0;
        };
        entries.retain(|t| now.duration_since(*t) < window);
        let count = entries.len();
        if count == 0 {
            windows.entries.remove(&key);
        }
        count
    }

    /// Number of (nickname, kind) pairs currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

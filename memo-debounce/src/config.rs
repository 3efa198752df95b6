use serde::{Deserialize, Serialize};
use std::time::Duration;

// Round up so a sub-millisecond delay never collapses to zero
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

/// What happens to the future of a call that gets superseded or cancelled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonPolicy {
    /// The future never settles
    #[default]
    Silent,
    /// The future resolves with `DebounceError::Abandoned`
    Reject,
}

/// Configuration for a debouncer
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet period after the last call before the function runs
    pub delay_ms: u64,
    pub abandon: AbandonPolicy,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: 100,
            abandon: AbandonPolicy::Silent,
        }
    }
}

impl DebounceConfig {
    /// Create a new debounce configuration
    pub fn new(delay: Duration) -> Self {
        Self {
            delay_ms: whole_millis(delay),
            ..Self::default()
        }
    }

    pub fn with_abandon(mut self, abandon: AbandonPolicy) -> Self {
        self.abandon = abandon;
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Configuration for a memoized function backed by a strong store
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoizeConfig {
    /// Whole-cache time to live, restarted on every write. `None` keeps
    /// entries until an explicit clear.
    pub ttl_ms: Option<u64>,
}

impl MemoizeConfig {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl_ms: ttl.map(whole_millis),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }
}

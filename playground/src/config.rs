use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use getset::Getters;
use memo_debounce::{DebounceConfig, MemoizeConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Getters)]
#[get = "pub"]
#[serde(default)]
pub struct Config {
    log_level: String,
    debounce: DebounceConfig,
    memoize: MemoizeConfig,
    /// Words the simulated search runs against
    catalog: Vec<String>,
    /// What the simulated user types, one keystroke at a time
    typed: String,
    keystroke_interval_ms: u64,
    countdown_n: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debounce: DebounceConfig::default(),
            memoize: MemoizeConfig {
                ttl_ms: Some(500),
            },
            catalog: ["rust", "rustacean", "rustup", "ruby", "runtime", "tokio", "trait"]
                .iter()
                .map(|word| word.to_string())
                .collect(),
            typed: "rust".to_string(),
            keystroke_interval_ms: 30,
            countdown_n: 50_000_000,
        }
    }
}

impl Config {
    /// Defaults, overridden by the YAML file (if present) and then by
    /// `PLAYGROUND_*` environment variables, e.g. `PLAYGROUND_DEBOUNCE__DELAY_MS=250`.
    pub fn load(path: &Path) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("PLAYGROUND_").split("__"))
            .extract()
    }

    pub fn keystroke_interval(&self) -> Duration {
        Duration::from_millis(self.keystroke_interval_ms)
    }
}

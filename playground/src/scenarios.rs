use crate::context::{Context, Countdown, Matches};
use chrono::{DateTime, Utc};
use memo_debounce::{CacheStats, DebounceStats};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub matches: Vec<String>,
    pub countdown_ms: Vec<u128>,
    pub search: DebounceStats,
    pub lookup: CacheStats,
    pub countdown: CacheStats,
}

/// Feed the search box one keystroke at a time; only the last prefix is looked up.
pub async fn type_and_search(context: &Context) -> Option<Matches> {
    let typed = context.config().typed();
    let interval = context.config().keystroke_interval();

    let mut last = None;
    for (index, ch) in typed.char_indices() {
        let prefix = &typed[..index + ch.len_utf8()];
        log::debug!("Typed {:?}", prefix);
        last = Some(context.search().call(prefix.to_string()));
        tokio::time::sleep(interval).await;
    }

    match last?.await {
        Ok(matches) => Some(matches),
        Err(error) => {
            log::warn!("Search did not complete: {}", error);
            None
        }
    }
}

/// Run the countdown twice back to back, then once more after the TTL has
/// expired. Returns how long each run took.
pub async fn repeat_countdown(context: &Context) -> Vec<Duration> {
    let input = Countdown {
        id: 1,
        n: *context.config().countdown_n(),
    };

    let mut timings = Vec::new();
    for round in 0..3 {
        if round == 2 {
            let idle = context.config().memoize().ttl().unwrap_or_default() + Duration::from_millis(100);
            tokio::time::sleep(idle).await;
        }

        let start = Instant::now();
        let steps = match context.countdown().call(input.clone()) {
            Ok(steps) => steps,
            Err(never) => match never {},
        };
        let elapsed = start.elapsed();
        log::info!("Countdown round {} returned {} in {:?}", round + 1, steps, elapsed);
        timings.push(elapsed);
    }
    timings
}

pub async fn run(context: &Context) -> Report {
    let matches = type_and_search(context).await;
    let timings = repeat_countdown(context).await;

    Report {
        generated_at: Utc::now(),
        matches: matches.map(|matches| matches.to_vec()).unwrap_or_default(),
        countdown_ms: timings.iter().map(Duration::as_millis).collect(),
        search: context.search().stats(),
        lookup: context.lookup().cache().stats(),
        countdown: context.countdown().cache().stats(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test(start_paused = true)]
    async fn test_scenarios_report() {
        let config: Config = serde_json::from_value(serde_json::json!({ "countdown_n": 1_000 })).unwrap();
        let context = Context::new(config).unwrap();

        let report = run(&context).await;

        assert_eq!(report.matches, vec!["rust", "rustacean", "rustup"]);
        assert_eq!(report.search.calls, 4);
        assert_eq!(report.search.superseded, 3);
        assert_eq!(report.search.executed, 1);
        assert_eq!(report.lookup.misses, 1);
        assert_eq!(report.lookup.stores, 1);

        // Second round is a hit, third recomputes after the TTL clear
        assert_eq!(report.countdown.hits, 1);
        assert_eq!(report.countdown.misses, 2);
        assert_eq!(report.countdown.clears, 1);
        assert_eq!(report.countdown_ms.len(), 3);

        context.shutdown();
    }
}

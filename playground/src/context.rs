use crate::config::Config;
use crate::error::Error;
use getset::Getters;
use log::info;
use memo_debounce::{
    fingerprint_debug, memoize, memoize_async, AsyncMemoized, CacheEvent, CacheStats, CancelHandle, Debouncer,
    Fingerprint, StrongMemoized, StrongOptions, StrongStore,
};
use std::convert::Infallible;
use std::sync::Arc;

pub type Matches = Arc<Vec<String>>;

#[derive(Debug, Clone)]
pub struct Countdown {
    pub id: u32,
    pub n: u64,
}

/// Everything the playground drives: a memoized catalog lookup fed by a
/// debounced search box, and a memoized countdown.
#[derive(Getters)]
#[get = "pub"]
pub struct Context {
    config: Config,
    search: Debouncer<String, Matches, Infallible>,
    search_cancel: CancelHandle,
    lookup: AsyncMemoized<String, Matches, Infallible, StrongStore<Fingerprint, Matches>>,
    countdown: StrongMemoized<Countdown, u32, u64, Infallible>,
}

impl Context {
    pub fn new(config: Config) -> Result<Self, Error> {
        let catalog = Arc::new(config.catalog().clone());
        let lookup = memoize_async(
            move |prefix: String| {
                let catalog = catalog.clone();
                async move {
                    let matches = catalog
                        .iter()
                        .filter(|word| word.starts_with(prefix.as_str()))
                        .cloned()
                        .collect::<Vec<_>>();
                    Ok::<_, Infallible>(Arc::new(matches))
                }
            },
            StrongOptions::new(|prefix: &String| fingerprint_debug(prefix.as_str()))
                .config(config.memoize())
                .reporter(report_event("lookup")),
        )?;

        let search = {
            let lookup = lookup.clone();
            Debouncer::with_config(
                move |prefix: String| {
                    let lookup = lookup.clone();
                    async move { lookup.call(prefix).await }
                },
                config.debounce().clone(),
            )?
        };
        let search_cancel = search.cancel_handle();

        let countdown = memoize(
            |input: Countdown| {
                let mut remaining = input.n;
                let mut steps = 0u64;
                while remaining > 0 {
                    remaining = std::hint::black_box(remaining - 1);
                    steps += 1;
                }
                Ok::<_, Infallible>(steps)
            },
            StrongOptions::new(|input: &Countdown| input.id)
                .config(config.memoize())
                .reporter(report_event("countdown")),
        )?;

        info!(
            "Initialized playground (debounce: {}ms, TTL: {:?})",
            config.debounce().delay_ms,
            config.memoize().ttl()
        );

        Ok(Self {
            config,
            search,
            search_cancel,
            lookup,
            countdown,
        })
    }

    /// Abandon whatever search is still waiting
    pub fn shutdown(&self) {
        if self.search_cancel.cancel() {
            info!("Cancelled pending search on shutdown");
        }
    }
}

fn report_event(name: &'static str) -> impl Fn(CacheEvent, &CacheStats) + Send + Sync + 'static {
    move |event: CacheEvent, stats: &CacheStats| {
        log::debug!("[{}] {} ({} entries)", name, event, stats.entries)
    }
}

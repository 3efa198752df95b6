pub mod config;
pub mod debounce;
mod error;
pub mod memoize;
pub mod store;

#[cfg(test)]
mod tests;

pub use config::{AbandonPolicy, DebounceConfig, MemoizeConfig};
pub use debounce::{debounce, CancelHandle, DebounceStats, DebouncedCall, Debouncer};
pub use error::DebounceError;
pub use error::Error;
pub use memoize::{
    memoize, memoize_async, AsyncMemoized, CacheEvent, CacheStats, DebugReporter, MemoCache,
    Memoized, MemoizeOptions, StrongMemoized, StrongOptions, WeakMemoized, WeakOptions,
};
pub use store::{CacheStore, StrongStore, WeakStore};

// Key helpers for callers that need structural identity
pub use ::utils::{fingerprint_debug, fingerprint_json, Fingerprint, FingerprintBuilder};

use crate::{
    debounce, fingerprint_json, memoize, memoize_async, AbandonPolicy, DebounceConfig, Debouncer,
    StrongOptions,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize, Clone, Debug)]
struct SearchOptions {
    query: String,
    page: u32,
}

#[tokio::test(start_paused = true)]
async fn test_debounced_search_over_memoized_fetch() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let counter = fetches.clone();

    let fetch = memoize_async(
        move |options: SearchOptions| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(format!("{}#{}", options.query, options.page))
            }
        },
        StrongOptions::new(|options: &SearchOptions| {
            fingerprint_json(options).expect("search options serialize")
        })
        .ttl(Duration::from_secs(10)),
    )
    .unwrap();

    let search = {
        let fetch = fetch.clone();
        Debouncer::new(
            move |options: SearchOptions| {
                let fetch = fetch.clone();
                async move { fetch.call(options).await }
            },
            Duration::from_millis(100),
        )
        .unwrap()
    };

    // Typing "rust" one key at a time
    let mut calls = Vec::new();
    for end in 1..=4 {
        calls.push(search.call(SearchOptions {
            query: "rust"[..end].to_string(),
            page: 1,
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let last = calls.pop().unwrap();
    assert_eq!(last.await.unwrap(), "rust#1");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    // Same query again after the window: debounced again, served from cache
    let again = search.call(SearchOptions {
        query: "rust".to_string(),
        page: 1,
    });
    assert_eq!(again.await.unwrap(), "rust#1");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(fetch.cache().stats().hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_memoized_function_debounced_with_reject_policy() {
    let computed = Arc::new(AtomicUsize::new(0));
    let counter = computed.clone();
    let square = memoize(
        move |n: u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(n * n)
        },
        StrongOptions::new(|n: &u64| *n),
    )
    .unwrap();

    let debounced = Debouncer::with_config(
        move |n: u64| {
            let square = square.clone();
            async move { square.call(n) }
        },
        DebounceConfig::new(Duration::from_millis(30)).with_abandon(AbandonPolicy::Reject),
    )
    .unwrap();

    let superseded = debounced.call(3);
    let winner = debounced.call(4);

    assert!(superseded.await.unwrap_err().is_abandoned());
    assert_eq!(winner.await.unwrap(), 16);
    assert_eq!(debounced.call(4).await.unwrap(), 16);
    assert_eq!(computed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_handle_outlives_debouncer_clone() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let (debouncer, cancel) = debounce(
        move |_: ()| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(())
            }
        },
        Duration::from_millis(50),
    )
    .unwrap();

    let _pending = debouncer.call(());
    drop(debouncer);
    assert!(cancel.cancel());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

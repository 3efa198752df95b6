use memo_debounce::{memoize, Debouncer, StrongOptions};
use std::convert::Infallible;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Countdown {
    id: u32,
    n: u64,
}

fn countdown(input: Countdown) -> Result<u64, Infallible> {
    let mut remaining = input.n;
    let mut steps = 0u64;
    while remaining > 0 {
        remaining = std::hint::black_box(remaining - 1);
        steps += 1;
    }
    Ok(steps)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    println!("=== Memoized countdown ===");
    let memoized = memoize(
        countdown,
        StrongOptions::new(|input: &Countdown| input.id)
            .ttl(Duration::from_millis(500))
            .reporter(|event, stats| println!("  [{}] {} entries", event, stats.entries)),
    )?;

    let input = Countdown { id: 1, n: 500_000_000 };

    let start = Instant::now();
    let first = memoized.call(input.clone())?;
    println!("First call took: {:?} ({})", start.elapsed(), first);

    let start = Instant::now();
    let second = memoized.call(input.clone())?;
    println!("Cached call took: {:?} ({})", start.elapsed(), second);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let start = Instant::now();
    memoized.call(input)?;
    println!("Call after TTL took: {:?}", start.elapsed());
    println!("Cache stats: {:?}", memoized.cache().stats());

    println!("\n=== Debounced increment ===");
    let increment = Debouncer::from_fn(
        |n: u32| {
            println!("  increment({}) executed", n);
            Ok::<_, Infallible>(n + 1)
        },
        Duration::from_millis(100),
    )?;

    let start = Instant::now();
    let _first = increment.call(1);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let _second = increment.call(2);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let result = increment.call(3).await?;
    println!("Result {} after {:?}", result, start.elapsed());
    println!("Debounce stats: {:?}", increment.stats());

    Ok(())
}

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ro_core::cache::FetchCache;
use ro_core::clock::ManualClock;

fn cache_with_clock(ttl_secs: u64) -> (FetchCache<Result<u32, String>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let cache = FetchCache::new(Duration::from_secs(ttl_secs), clock.clone());
    (cache, clock)
}

type BoxedFetch = Pin<Box<dyn Future<Output = Result<u32, String>> + Send>>;

fn counting_fetch(calls: &Arc<AtomicUsize>, result: Result<u32, String>) -> impl FnOnce() -> BoxedFetch {
    let calls = calls.clone();
    move || {
        let fut: BoxedFetch = Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            result
        });
        fut
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_fetch() {
    let (cache, _clock) = cache_with_clock(300);
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b, c) = tokio::join!(
        cache.get_or_fetch("octo/repo", counting_fetch(&calls, Ok(7))),
        cache.get_or_fetch("octo/repo", counting_fetch(&calls, Ok(8))),
        cache.get_or_fetch("octo/repo", counting_fetch(&calls, Ok(9))),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a, Ok(7));
    assert_eq!(b, Ok(7));
    assert_eq!(c, Ok(7));
    assert_eq!(cache.in_flight(), 0);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn value_is_served_until_ttl_then_refetched() {
    let (cache, clock) = cache_with_clock(300);
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(cache.get_or_fetch("k", counting_fetch(&calls, Ok(1))).await, Ok(1));
    clock.advance(chrono::Duration::seconds(299));
    assert_eq!(cache.get_or_fetch("k", counting_fetch(&calls, Ok(2))).await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(chrono::Duration::seconds(1));
    assert_eq!(cache.get_or_fetch("k", counting_fetch(&calls, Ok(3))).await, Ok(3));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_stays_cached_until_expiry() {
    let (cache, clock) = cache_with_clock(300);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache
        .get_or_fetch("k", counting_fetch(&calls, Err("upstream down".into())))
        .await;
    assert_eq!(first, Err("upstream down".to_string()));

    // Within the window the rejection is replayed, not retried.
    clock.advance(chrono::Duration::seconds(120));
    let second = cache.get_or_fetch("k", counting_fetch(&calls, Ok(5))).await;
    assert_eq!(second, Err("upstream down".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(chrono::Duration::seconds(180));
    let third = cache.get_or_fetch("k", counting_fetch(&calls, Ok(5))).await;
    assert_eq!(third, Ok(5));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn keys_are_independent() {
    let (cache, _clock) = cache_with_clock(300);
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b) = tokio::join!(
        cache.get_or_fetch("octo/a", counting_fetch(&calls, Ok(1))),
        cache.get_or_fetch("octo/b", counting_fetch(&calls, Ok(2))),
    );
    assert_eq!((a, b), (Ok(1), Ok(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidate_and_evict() {
    let (cache, clock) = cache_with_clock(60);
    let calls = Arc::new(AtomicUsize::new(0));

    cache.get_or_fetch("a", counting_fetch(&calls, Ok(1))).await.unwrap();
    cache.get_or_fetch("b", counting_fetch(&calls, Ok(2))).await.unwrap();
    assert_eq!(cache.get("a"), Some(Ok(1)));

    cache.invalidate("a");
    assert_eq!(cache.get("a"), None);

    clock.advance(chrono::Duration::seconds(61));
    assert_eq!(cache.evict_expired(), 1);
    assert!(cache.is_empty());
}

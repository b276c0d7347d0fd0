// tests/subscription.rs
//
// Last-request-wins: a slow earlier request must not overwrite a newer one.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{client_with, history_payload, FakeTransport};
use cryptoverse_client::subscription::Subscription;
use cryptoverse_client::{FetchOptions, TimePeriod};

#[test]
fn only_the_latest_id_is_current() {
    let sub = Subscription::new();
    let a = sub.begin();
    let b = sub.begin();
    assert!(a < b);
    assert!(!sub.is_current(a));
    assert!(sub.is_current(b));
}

#[tokio::test(start_paused = true)]
async fn superseded_result_is_dropped() {
    let sub = Subscription::new();

    let slow = sub.run(async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        "7d"
    });
    let fast = sub.run(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        "30d"
    });
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(slow, None);
    assert_eq!(fast, Some("30d"));
}

#[tokio::test(start_paused = true)]
async fn period_switch_keeps_the_newer_chart() {
    let transport = Arc::new(FakeTransport::ok(history_payload()).with_delay(Duration::from_millis(100)));
    let client = client_with(transport.clone());
    let sub = Subscription::new();

    let week = sub.run(client.coin_history("Qwsogvtv82FCd", TimePeriod::Week, FetchOptions::new()));
    let year = sub.run(client.coin_history("Qwsogvtv82FCd", TimePeriod::Year, FetchOptions::new()));
    let (week, year) = tokio::join!(week, year);

    assert!(week.is_none());
    let year = year.expect("latest result delivered").unwrap();
    assert!(year.data.points.len() == 2);
    // The superseded call still ran and filled the cache.
    assert_eq!(transport.calls(), 2);
    assert_eq!(client.cache().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn call_order_not_poll_order_decides_the_latest() {
    let sub = Subscription::new();

    let older = sub.run(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        "older"
    });
    let newer = sub.run(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        "newer"
    });
    // Poll the newer request first; the older one must still lose.
    let (newer, older) = tokio::join!(newer, older);

    assert_eq!(newer, Some("newer"));
    assert_eq!(older, None);
}

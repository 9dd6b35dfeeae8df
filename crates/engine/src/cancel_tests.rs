use super::*;
use std::time::Duration;

#[tokio::test]
async fn cancelled_resolves_immediately_if_already_cancelled() {
    let token = CancelToken::new();
    token.cancel();
    tokio::time::timeout(Duration::from_millis(50), token.cancelled())
        .await
        .expect("cancelled() should resolve immediately");
}

#[tokio::test]
async fn cancelled_wakes_waiters_on_cancel() {
    let token = CancelToken::new();
    let waiter = token.clone();
    let handle = tokio::spawn(async move {
        waiter.cancelled().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();
    tokio::time::timeout(Duration::from_millis(200), handle)
        .await
        .expect("waiter should wake")
        .unwrap();
}

#[test]
fn is_cancelled_reflects_state() {
    let token = CancelToken::new();
    assert!(!token.is_cancelled());
    token.cancel();
    assert!(token.is_cancelled());
}

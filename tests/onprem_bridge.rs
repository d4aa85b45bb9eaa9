//! On-prem RPC bridge concurrency tests

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use callbridge::core::onprem::{OnPremBridge, OnPremConfig, OnPremError};

fn bridge(timeout: Duration) -> Arc<OnPremBridge> {
    Arc::new(OnPremBridge::new(OnPremConfig {
        timeout,
        orphan_ttl: Duration::from_secs(60),
    }))
}

/// Each caller gets the result submitted for its own request id, even when
/// results come back in reverse order.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_get_their_own_results() {
    let onprem = bridge(Duration::from_secs(5));
    let mut callers = JoinSet::new();

    for i in 0..25 {
        let onprem = Arc::clone(&onprem);
        callers.spawn(async move {
            let device = format!("sw-{i}");
            let result = onprem
                .execute("get_device_vlans", json!({"device_name": device}))
                .await
                .unwrap();
            (device, result)
        });
    }

    // Poller: collect everything, then answer newest first.
    let mut polled = Vec::new();
    while polled.len() < 25 {
        match onprem.dequeue_next() {
            Some(request) => polled.push(request),
            None => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
    let ids: HashSet<_> = polled.iter().map(|r| r.request_id.clone()).collect();
    assert_eq!(ids.len(), 25, "request ids must be unique");

    for request in polled.iter().rev() {
        onprem.submit_result(
            &request.request_id,
            json!({"device": request.params["device_name"]}),
        );
    }

    while let Some(joined) = callers.join_next().await {
        let (device, result) = joined.unwrap();
        assert_eq!(result, json!({"device": device}));
    }

    let stats = onprem.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.orphans, 0);
}

#[tokio::test]
async fn test_queue_is_fifo() {
    let onprem = bridge(Duration::from_millis(200));

    let first = {
        let onprem = Arc::clone(&onprem);
        tokio::spawn(async move { onprem.execute("get_device_cdp", json!({"n": 1})).await })
    };
    while onprem.stats().pending < 1 {
        tokio::task::yield_now().await;
    }
    let second = {
        let onprem = Arc::clone(&onprem);
        tokio::spawn(async move { onprem.execute("get_device_ntp", json!({"n": 2})).await })
    };
    while onprem.stats().pending < 2 {
        tokio::task::yield_now().await;
    }

    assert_eq!(onprem.dequeue_next().unwrap().tool, "get_device_cdp");
    assert_eq!(onprem.dequeue_next().unwrap().tool, "get_device_ntp");
    assert!(onprem.dequeue_next().is_none());

    // Never answered.
    assert!(matches!(
        first.await.unwrap(),
        Err(OnPremError::Timeout { .. })
    ));
    assert!(matches!(
        second.await.unwrap(),
        Err(OnPremError::Timeout { .. })
    ));
}

#[tokio::test]
async fn test_cancel_stops_waiting() {
    let onprem = bridge(Duration::from_secs(30));
    let cancel = CancellationToken::new();

    let waiter = {
        let onprem = Arc::clone(&onprem);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            onprem
                .execute_with_cancel("get_device_spanning_tree", json!({}), &cancel)
                .await
        })
    };
    while onprem.stats().waiting == 0 {
        tokio::task::yield_now().await;
    }

    cancel.cancel();
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, OnPremError::Cancelled { .. }));
    assert_eq!(err.to_string(), "Request cancelled");
    assert_eq!(onprem.stats().waiting, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reaper_sweeps_orphans() {
    let onprem = Arc::new(OnPremBridge::new(OnPremConfig {
        timeout: Duration::from_secs(10),
        orphan_ttl: Duration::from_secs(60),
    }));
    let shutdown = CancellationToken::new();
    let reaper = onprem.spawn_reaper(Duration::from_secs(30), shutdown.clone());

    onprem.submit_result("nobody-asked", json!({"late": true}));
    assert_eq!(onprem.stats().orphans, 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(onprem.stats().orphans, 1, "still inside the grace period");

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(onprem.stats().orphans, 0);

    shutdown.cancel();
    reaper.await.unwrap();
}

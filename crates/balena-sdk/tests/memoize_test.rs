// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Memoization tests: coalescing, failure eviction and auth scoping.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use balena_sdk::{Auth, MemoizeRegistry, SdkError};
use futures::future::join_all;
use tokio::sync::Notify;

#[tokio::test]
async fn test_concurrent_callers_share_one_fetch() {
    let registry = MemoizeRegistry::new();
    let fetches = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let counter = fetches.clone();
    let wait = gate.clone();
    let lookup = registry.memoize(move |id: u32| {
        let counter = counter.clone();
        let wait = wait.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            wait.notified().await;
            Ok(format!("device-{}", id))
        }
    });

    let callers = join_all((0..10).map(|_| lookup.call(7)));
    let release = async {
        tokio::task::yield_now().await;
        gate.notify_one();
    };
    let (results, ()) = tokio::join!(callers, release);

    assert_eq!(results.len(), 10);
    for result in results {
        assert_eq!(result.unwrap(), "device-7");
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_failure_reaches_every_caller_then_retries() {
    let registry = MemoizeRegistry::new();
    let fetches = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let counter = fetches.clone();
    let wait = gate.clone();
    let lookup = registry.memoize(move |_: ()| {
        let counter = counter.clone();
        let wait = wait.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                wait.notified().await;
                Err(SdkError::Timeout(100))
            } else {
                Ok(1u8)
            }
        }
    });

    let callers = join_all((0..4).map(|_| lookup.call(())));
    let release = async {
        tokio::task::yield_now().await;
        gate.notify_one();
    };
    let (results, ()) = tokio::join!(callers, release);

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(SdkError::Timeout(100)))));
    assert!(lookup.is_empty());

    assert_eq!(lookup.call(()).await.unwrap(), 1);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_arguments_compare_by_value() {
    let registry = MemoizeRegistry::new();
    let fetches = Arc::new(AtomicUsize::new(0));
    let counter = fetches.clone();
    let size = registry.memoize(move |(device_type, version): (String, String)| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok((device_type.len() + version.len()) as u64)
        }
    });

    let a = size
        .call(("raspberrypi4-64".to_string(), "2.9.6".to_string()))
        .await
        .unwrap();
    let b = size
        .call((String::from("raspberrypi4-64"), String::from("2.9.6")))
        .await
        .unwrap();
    assert_eq!(a, b);
    size.call(("intel-nuc".to_string(), "2.9.6".to_string()))
        .await
        .unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_identity_change_invalidates_every_function() {
    let auth = Auth::new();
    let registry = MemoizeRegistry::with_auth(auth.subscribe());
    let fetches = Arc::new(AtomicUsize::new(0));

    let c1 = fetches.clone();
    let first = registry.memoize(move |_: ()| {
        let c = c1.clone();
        async move { Ok(c.fetch_add(1, Ordering::SeqCst)) }
    });
    let c2 = fetches.clone();
    let second = registry.memoize(move |_: ()| {
        let c = c2.clone();
        async move { Ok(c.fetch_add(1, Ordering::SeqCst)) }
    });

    auth.set_token("key-a").await;
    first.call(()).await.unwrap();
    second.call(()).await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 2);

    // Refreshing the same credential is not an identity change.
    auth.set_token("key-a").await;
    first.call(()).await.unwrap();
    second.call(()).await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 2);

    auth.logout().await;
    first.call(()).await.unwrap();
    second.call(()).await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 4);
}

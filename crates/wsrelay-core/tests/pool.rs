//! Registry scenarios driven through in-memory connections.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tracing::Level;
use wsrelay_core::logging::capture_logs;
use wsrelay_core::testing::MemoryConnection;
use wsrelay_core::{Frame, SocketPool};

fn memory() -> Arc<MemoryConnection> {
    Arc::new(MemoryConnection::new())
}

#[tokio::test]
async fn lobby_and_other_are_isolated() {
    let pool = Arc::new(SocketPool::new());
    let a = memory();
    let b = memory();
    let c = memory();
    let _ra = pool.register("lobby", a.clone()).await;
    let _rb = pool.register("lobby", b.clone()).await;
    let _rc = pool.register("other", c.clone()).await;

    let delivery = pool.broadcast("lobby", &Frame::text("hi")).await;

    assert_eq!(delivery.recipients, 2);
    assert_eq!(delivery.delivered, 2);
    assert_eq!(a.texts(), vec!["hi".to_owned()]);
    assert_eq!(b.texts(), vec!["hi".to_owned()]);
    assert!(c.frames().is_empty());
}

#[tokio::test]
async fn failing_member_is_evicted_and_reported() {
    let (logs, _guard) = capture_logs();
    let pool = Arc::new(SocketPool::new());
    let a = memory();
    let b = Arc::new(MemoryConnection::failing());
    let c = memory();
    let _ra = pool.register("lobby", a.clone()).await;
    let rb = pool.register("lobby", b.clone()).await;
    let _rc = pool.register("lobby", c.clone()).await;
    let b_id = rb.id().clone();

    let delivery = pool.broadcast("lobby", &Frame::text("x")).await;

    assert_eq!(delivery.evicted, 1);
    assert_eq!(a.texts(), vec!["x".to_owned()]);
    assert_eq!(c.texts(), vec!["x".to_owned()]);
    assert!(!pool.contains("lobby", &b_id).await);
    assert_eq!(pool.members("lobby").await.len(), 2);
    assert!(b.is_closed());

    let failures = logs.matching("delivering to socket");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].level, Level::ERROR);
    assert_eq!(failures[0].field("id"), Some(b_id.as_str()));
    assert_eq!(failures[0].field("socket"), Some("lobby"));
    assert!(failures[0].field("error").is_some());

    // Remaining members keep receiving.
    let next = pool.broadcast("lobby", &Frame::text("y")).await;
    assert_eq!(next.recipients, 2);
    assert_eq!(next.delivered, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unregister_closes_once() {
    let pool = Arc::new(SocketPool::new());
    let conn = memory();
    let reg = pool.register("lobby", conn.clone()).await;
    let id = reg.id().clone();

    let first = {
        let pool = Arc::clone(&pool);
        let id = id.clone();
        tokio::spawn(async move { pool.unregister("lobby", &id).await })
    };
    let second = tokio::spawn(async move { reg.unregister().await });

    let removed = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(removed.iter().filter(|r| **r).count(), 1);
    assert_eq!(conn.close_calls(), 1);
    assert_eq!(pool.connection_count(), 0);
    assert!(!pool.unregister("lobby", &id).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connection_count_stays_in_range_under_churn() {
    const WORKERS: usize = 8;
    const ROUNDS: usize = 200;

    let pool = Arc::new(SocketPool::new());
    let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let watcher = {
        let pool = Arc::clone(&pool);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut max_seen = 0;
            while !done.load(std::sync::atomic::Ordering::SeqCst) {
                max_seen = max_seen.max(pool.connection_count());
                tokio::task::yield_now().await;
            }
            max_seen
        })
    };

    let workers: Vec<_> = (0..WORKERS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    let reg = pool.register("lobby", memory()).await;
                    let id = reg.id().clone();
                    // Races the registration's own removal, like an eviction.
                    let evict = {
                        let pool = Arc::clone(&pool);
                        tokio::spawn(async move { pool.unregister("lobby", &id).await })
                    };
                    let _ = reg.unregister().await;
                    let _ = evict.await.unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.await.unwrap();
    }
    done.store(true, std::sync::atomic::Ordering::SeqCst);

    let max_seen = watcher.await.unwrap();
    assert!(max_seen <= WORKERS, "count escaped its range: {max_seen}");
    assert_eq!(pool.connection_count(), 0);
    assert_eq!(pool.group_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn registration_during_broadcast_misses_the_frame() {
    let pool = Arc::new(SocketPool::new());
    let held = Arc::new(MemoryConnection::gated());
    let _rh = pool.register("lobby", held.clone()).await;

    let broadcast = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.broadcast("lobby", &Frame::text("snap")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let late = memory();
    let registering = {
        let pool = Arc::clone(&pool);
        let late = late.clone();
        tokio::spawn(async move { pool.register("lobby", late).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    // Still waiting for the broadcast's read lock to go away.
    assert_eq!(pool.connection_count(), 1);

    held.open_gate(1);
    let delivery = broadcast.await.unwrap();
    let _late_reg = registering.await.unwrap();

    assert_eq!(delivery.recipients, 1);
    assert_eq!(held.texts(), vec!["snap".to_owned()]);
    assert!(late.frames().is_empty());
    assert_eq!(pool.connection_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn writes_to_one_member_never_overlap() {
    let pool = Arc::new(SocketPool::new());
    let slow = Arc::new(MemoryConnection::with_delay(Duration::from_millis(20)));
    let _r = pool.register("lobby", slow.clone()).await;

    let one = Frame::text("one");
    let two = Frame::text("two");
    let (d1, d2) = tokio::join!(pool.broadcast("lobby", &one), pool.broadcast("lobby", &two));

    assert_eq!(d1.delivered + d2.delivered, 2);
    assert_eq!(slow.frames().len(), 2);
    assert_eq!(slow.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_member_does_not_hold_up_fast_member() {
    let pool = Arc::new(SocketPool::new());
    let fast = memory();
    let slow = Arc::new(MemoryConnection::gated());
    let _rf = pool.register("lobby", fast.clone()).await;
    let _rs = pool.register("lobby", slow.clone()).await;

    let broadcast = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.broadcast("lobby", &Frame::text("go")).await })
    };

    assert!(fast.wait_for_frames(1, Duration::from_millis(100)).await);
    assert!(slow.frames().is_empty());
    assert!(!broadcast.is_finished());

    slow.open_gate(1);
    let delivery = broadcast.await.unwrap();
    assert_eq!(delivery.delivered, 2);
    assert_eq!(slow.texts(), vec!["go".to_owned()]);
}

proptest! {
    #[test]
    fn identities_are_unique(groups in prop::collection::vec(prop::sample::select(vec!["a", "b", "c"]), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let pool = Arc::new(SocketPool::new());
            let mut regs = Vec::new();
            for group in &groups {
                regs.push(pool.register(group, memory()).await);
            }

            let ids: HashSet<_> = regs.iter().map(|r| r.id().clone()).collect();
            prop_assert_eq!(ids.len(), groups.len());
            prop_assert_eq!(pool.connection_count(), groups.len());

            for group in ["a", "b", "c"] {
                let expected = groups.iter().filter(|g| **g == group).count();
                prop_assert_eq!(pool.members(group).await.len(), expected);
            }

            for reg in regs {
                prop_assert!(reg.unregister().await);
            }
            prop_assert_eq!(pool.group_count().await, 0);
            Ok(())
        })?;
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use vellum_core::config::QueueConfig;
use vellum_core::error::ErrorType;
use vellum_core::queue::Queue;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn serial_queue_never_overlaps() {
    let queue = Queue::new(1, usize::MAX);
    let running = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..10u64 {
        let running = running.clone();
        let max_seen = max_seen.clone();
        let task = queue
            .add(move || async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1 + i % 3)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            })
            .unwrap();
        tasks.push(task);
    }
    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), i as u64);
    }
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(queue.pending_length(), 0);
    assert_eq!(queue.queue_length(), 0);
}

#[tokio::test]
async fn concurrency_ceiling_is_respected() {
    let queue = Queue::with_config(&QueueConfig::new().with_max_pending(3));
    let running = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::new();
    for _ in 0..9 {
        let running = running.clone();
        let max_seen = max_seen.clone();
        tasks.push(
            queue
                .add(move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap(),
        );
        assert!(queue.pending_length() <= 3);
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(max_seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn backlog_limit_rejects_immediately() {
    let queue = Queue::new(1, 2);
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let invoked = Arc::new(Mutex::new(Vec::new()));

    let first = queue
        .add(move || async move {
            let _ = release_rx.await;
            Ok(1)
        })
        .unwrap();
    let mut queued = Vec::new();
    for i in 2..=3 {
        let invoked = invoked.clone();
        queued.push(
            queue
                .add(move || async move {
                    invoked.lock().unwrap().push(i);
                    Ok(i)
                })
                .unwrap(),
        );
    }
    assert_eq!(queue.pending_length(), 1);
    assert_eq!(queue.queue_length(), 2);

    let rejected_invoked = invoked.clone();
    let err = queue
        .add(move || async move {
            rejected_invoked.lock().unwrap().push(4);
            Ok(4)
        })
        .err()
        .unwrap();
    assert_eq!(err.error_type, ErrorType::QueueLimitReached);

    release_tx.send(()).unwrap();
    assert_eq!(first.await.unwrap(), 1);
    for task in queued {
        task.await.unwrap();
    }
    assert_eq!(*invoked.lock().unwrap(), vec![2, 3]);
}

#[tokio::test]
async fn dropped_handle_still_runs_task() {
    let queue = Queue::new(1, usize::MAX);
    let (done_tx, done_rx) = oneshot::channel();
    let ignored = queue
        .add(move || async move {
            let _ = done_tx.send("ran");
            Ok(())
        })
        .unwrap();
    drop(ignored);
    assert_eq!(done_rx.await.unwrap(), "ran");
}

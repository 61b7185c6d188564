//! Polling scheduler behaviour.

use lensors_hw::{
    Device, DeviceId, DeviceLink, Error, Locator, PollEvent, Reading, Result, Sample, Scheduler,
    SensorTree, SourceBackend,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Link reporting an increasing counter as a fan speed.
struct CountingLink {
    reads: Arc<AtomicUsize>,
    fail_after: Option<usize>,
}

impl DeviceLink for CountingLink {
    fn read(&mut self, _locators: &[Locator]) -> Result<Vec<Sample>> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_after.is_some_and(|limit| n > limit) {
            return Err(Error::Disconnected("gone".to_string()));
        }

        Ok(vec![Sample {
            locator: Locator::Field {
                key: "Fan speed".to_string(),
            },
            label: "Fan speed".to_string(),
            unit: Some("rpm".to_string()),
            reading: Reading::Value(1000.0 + n as f64),
        }])
    }
}

struct CountingBackend {
    reads: Arc<AtomicUsize>,
    fail_after: Option<usize>,
}

impl SourceBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn discover(&mut self, known: &[DeviceId]) -> Vec<Device> {
        let id = DeviceId::new("counter0");
        if known.contains(&id) {
            return Vec::new();
        }

        vec![Device::new(
            id,
            "Counter",
            Box::new(CountingLink {
                reads: self.reads.clone(),
                fail_after: self.fail_after,
            }),
        )]
    }
}

fn counting_tree(fail_after: Option<usize>) -> (Arc<SensorTree>, Arc<AtomicUsize>) {
    let reads = Arc::new(AtomicUsize::new(0));
    let tree = Arc::new(SensorTree::new(Box::new(CountingBackend {
        reads: reads.clone(),
        fail_after,
    })));
    tree.discover();
    (tree, reads)
}

fn history_len(tree: &SensorTree) -> usize {
    tree.history(&DeviceId::new("counter0"), "Fan speed")
        .map(|h| h.len())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_refresh_now_runs_exactly_one_pass() {
    let (tree, reads) = counting_tree(None);
    let scheduler = Scheduler::new(vec![tree.clone()]);

    scheduler.refresh_now().await;
    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert_eq!(history_len(&tree), 1);
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn test_start_polls_and_stop_halts_updates() {
    let (tree, _reads) = counting_tree(None);
    let scheduler = Scheduler::new(vec![tree.clone()]);

    scheduler.start(Duration::from_millis(20)).await.unwrap();
    assert!(scheduler.is_running().await);
    tokio::time::sleep(Duration::from_millis(150)).await;

    scheduler.stop().await;
    assert!(!scheduler.is_running().await);
    let polled = history_len(&tree);
    assert!(polled >= 2, "expected several polls, got {}", polled);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(history_len(&tree), polled);
}

#[tokio::test]
async fn test_restart_replaces_timer() {
    let (tree, _reads) = counting_tree(None);
    let scheduler = Scheduler::new(vec![tree.clone()]);

    scheduler.start(Duration::from_millis(20)).await.unwrap();
    scheduler.start(Duration::from_millis(40)).await.unwrap();
    assert_eq!(scheduler.period().await, Some(Duration::from_millis(40)));

    scheduler.stop().await;
    let polled = history_len(&tree);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(history_len(&tree), polled);

    // Restartable after stop
    scheduler.start(Duration::from_millis(20)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.stop().await;
    assert!(history_len(&tree) > polled);
}

#[tokio::test]
async fn test_zero_period_is_rejected() {
    let (tree, _reads) = counting_tree(None);
    let scheduler = Scheduler::new(vec![tree]);

    assert!(matches!(
        scheduler.start(Duration::ZERO).await,
        Err(Error::InvalidInterval(0))
    ));
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn test_events_report_refresh_and_eviction() {
    let (tree, _reads) = counting_tree(Some(1));
    let scheduler = Scheduler::new(vec![tree.clone()]);
    let mut events = scheduler.subscribe();

    scheduler.refresh_now().await;
    assert_eq!(
        events.recv().await.unwrap(),
        PollEvent::Refreshed {
            source: "counting".to_string(),
            devices: 1,
        }
    );

    scheduler.refresh_now().await;
    assert_eq!(
        events.recv().await.unwrap(),
        PollEvent::Evicted {
            source: "counting".to_string(),
            device: DeviceId::new("counter0"),
            name: "Counter".to_string(),
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PollEvent::Refreshed {
            source: "counting".to_string(),
            devices: 0,
        }
    );
    assert!(tree.snapshot().is_empty());
}

#[tokio::test]
async fn test_rediscover_after_eviction() {
    let (tree, _reads) = counting_tree(Some(0));
    let scheduler = Scheduler::new(vec![tree.clone()]);

    scheduler.refresh_now().await;
    assert!(tree.is_empty());

    assert_eq!(scheduler.rediscover().await, 1);
    assert_eq!(tree.len(), 1);
}

#[tokio::test]
async fn test_shutdown_releases_devices() {
    let (tree, _reads) = counting_tree(None);
    let scheduler = Scheduler::new(vec![tree.clone()]);

    scheduler.start(Duration::from_millis(20)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.shutdown().await;

    assert!(!scheduler.is_running().await);
    assert!(tree.is_empty());
}

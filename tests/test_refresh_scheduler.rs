//! Debounced refresh behaviour observed through a recording refresh target

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use zagonel_bridge::bridge::{Refresh, RefreshScheduler};

const DEBOUNCE: Duration = Duration::from_millis(120);

#[derive(Default)]
struct RecordingRefresh {
    fired_at: Mutex<Vec<Instant>>,
}

impl RecordingRefresh {
    fn fired(&self) -> Vec<Instant> {
        self.fired_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl Refresh for RecordingRefresh {
    async fn refresh(&self) {
        self.fired_at.lock().unwrap().push(Instant::now());
    }
}

fn scheduler() -> (Arc<RecordingRefresh>, RefreshScheduler) {
    let target = Arc::new(RecordingRefresh::default());
    (target.clone(), RefreshScheduler::new(target, DEBOUNCE))
}

#[tokio::test]
async fn test_two_calls_in_window_fire_once_from_second_call() {
    // Arrange
    let (target, scheduler) = scheduler();

    // Act
    scheduler.schedule_refresh();
    tokio::time::sleep(DEBOUNCE / 2).await;
    let second_call = Instant::now();
    scheduler.schedule_refresh();
    tokio::time::sleep(DEBOUNCE * 3).await;

    // Assert
    let fired = target.fired();
    assert_eq!(fired.len(), 1);
    assert!(fired[0].duration_since(second_call) >= DEBOUNCE);
}

#[tokio::test]
async fn test_calls_outside_window_fire_separately() {
    let (target, scheduler) = scheduler();

    scheduler.schedule_refresh();
    tokio::time::sleep(DEBOUNCE * 2).await;
    scheduler.schedule_refresh();
    tokio::time::sleep(DEBOUNCE * 2).await;

    assert_eq!(target.fired().len(), 2);
}

#[tokio::test]
async fn test_many_rapid_calls_collapse() {
    let (target, scheduler) = scheduler();

    for _ in 0..10 {
        scheduler.schedule_refresh();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(DEBOUNCE * 2).await;

    assert_eq!(target.fired().len(), 1);
}

#[tokio::test]
async fn test_release_prevents_firing() {
    let (target, scheduler) = scheduler();

    scheduler.schedule_refresh();
    scheduler.release();
    tokio::time::sleep(DEBOUNCE * 2).await;

    assert!(target.fired().is_empty());
    assert!(!scheduler.is_scheduled());

    // Still usable after release
    scheduler.schedule_refresh();
    tokio::time::sleep(DEBOUNCE * 2).await;
    assert_eq!(target.fired().len(), 1);
}

//! Timing tests for the location feed
//!
//! Run on a paused clock: `sleep` advances virtual time instantly, so the
//! 3 s quiet period costs nothing.

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use walk_common::config::FilterConfig;
use walk_common::Coordinate;
use walk_tracker::models::{LocationSample, StableLocation};
use walk_tracker::services::{LocationFeed, LocationFilter};

fn spawn_feed() -> (LocationFeed, mpsc::Receiver<StableLocation>) {
    let (tx, rx) = mpsc::channel(8);
    let feed = LocationFeed::spawn(LocationFilter::new(FilterConfig::default()), tx);
    (feed, rx)
}

fn sample(lat: f64, lon: f64) -> LocationSample {
    LocationSample::new(Coordinate::new(lat, lon), Utc::now())
}

#[tokio::test(start_paused = true)]
async fn test_burst_yields_only_last_sample() {
    let (feed, mut stable) = spawn_feed();

    assert!(feed.observe(sample(52.2297, 21.0122)).await);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(feed.observe(sample(52.2400, 21.0122)).await);
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let location = stable.try_recv().unwrap();
    assert_eq!(location.coordinate, Coordinate::new(52.2400, 21.0122));
    assert!(stable.try_recv().is_err());

    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_nothing_emitted_before_quiet_period() {
    let (feed, mut stable) = spawn_feed();

    feed.observe(sample(52.2297, 21.0122)).await;
    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert!(stable.try_recv().is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(stable.try_recv().is_ok());

    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_sample_never_emitted() {
    let (feed, mut stable) = spawn_feed();

    let old = LocationSample::new(
        Coordinate::new(52.2297, 21.0122),
        Utc::now() - ChronoDuration::seconds(30),
    );
    feed.observe(old).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(stable.try_recv().is_err());
    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_small_displacement_is_ignored() {
    let (feed, mut stable) = spawn_feed();

    feed.observe(sample(52.2297, 21.0122)).await;
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(stable.try_recv().is_ok());

    // ~50 m: below the 80 m threshold
    feed.observe(sample(52.22915, 21.0122)).await;
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(stable.try_recv().is_err());

    // ~200 m from the first accepted fix
    feed.observe(sample(52.2315, 21.0122)).await;
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(stable.try_recv().is_ok());

    feed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_held_sample() {
    let (feed, mut stable) = spawn_feed();

    feed.observe(sample(52.2297, 21.0122)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    feed.stop().await;

    // Task ended without emitting; its sender is gone
    assert!(stable.recv().await.is_none());
}

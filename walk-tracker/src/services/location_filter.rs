//! Location filtering: raw fixes in, stable locations out
//!
//! [`LocationFilter`] holds the policy and is synchronous so every rule can
//! be tested directly. [`LocationFeed`] runs it on a task and owns the
//! debounce timer: a sample is held for the quiet period and replaced by any
//! newer sample that arrives meanwhile, so only the last fix of a burst is
//! considered.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walk_common::config::FilterConfig;
use walk_common::Coordinate;

use crate::models::{LocationSample, StableLocation};

const SAMPLE_CHANNEL_CAPACITY: usize = 64;

/// Why a sample was not held for the quiet period
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Screening {
    Held,
    Stale { age_secs: i64 },
    Inaccurate { accuracy_m: f64 },
    InvalidCoordinate,
}

#[derive(Debug, Clone)]
pub struct LocationFilter {
    config: FilterConfig,
    last_accepted: Option<Coordinate>,
}

impl LocationFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            last_accepted: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.config.quiet_period_ms)
    }

    pub fn last_accepted(&self) -> Option<Coordinate> {
        self.last_accepted
    }

    /// Checks applied when a sample arrives, before the quiet period
    pub fn screen(&self, sample: &LocationSample, received_at: DateTime<Utc>) -> Screening {
        if !sample.coordinate().is_valid() {
            return Screening::InvalidCoordinate;
        }

        let age = received_at - sample.timestamp;
        if age.num_milliseconds() > (self.config.staleness_secs as i64) * 1000 {
            return Screening::Stale {
                age_secs: age.num_seconds(),
            };
        }

        if let Some(accuracy_m) = sample.horizontal_accuracy {
            if accuracy_m < 0.0 || accuracy_m > self.config.max_accuracy_m {
                return Screening::Inaccurate { accuracy_m };
            }
        }

        Screening::Held
    }

    /// Decide on a sample that survived the quiet period
    ///
    /// The first sample after start or reset is always accepted; later ones
    /// only when strictly farther than the minimum displacement from the last
    /// accepted location.
    pub fn settle(&mut self, sample: &LocationSample) -> Option<StableLocation> {
        let coordinate = sample.coordinate();

        if let Some(last) = self.last_accepted {
            let moved = last.distance_to(&coordinate);
            if moved <= self.config.min_displacement_m {
                debug!(moved_m = moved, "Location within displacement threshold, ignored");
                return None;
            }
        }

        self.last_accepted = Some(coordinate);
        Some(StableLocation {
            coordinate,
            captured_at: sample.timestamp,
        })
    }

    /// Forget the last accepted location
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

/// Handle to a running filter task
pub struct LocationFeed {
    samples: mpsc::Sender<LocationSample>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LocationFeed {
    /// Start filtering; stable locations are sent to `stable`
    pub fn spawn(filter: LocationFilter, stable: mpsc::Sender<StableLocation>) -> Self {
        let (samples, samples_rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_filter(filter, samples_rx, stable, cancel.clone()));

        Self {
            samples,
            cancel,
            task,
        }
    }

    /// Hand a raw sample to the filter. Returns false once the feed stopped.
    pub async fn observe(&self, sample: LocationSample) -> bool {
        self.samples.send(sample).await.is_ok()
    }

    /// Stop the task, dropping any held sample and the filter state
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Location filter task ended abnormally: {}", e);
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_filter(
    mut filter: LocationFilter,
    mut samples: mpsc::Receiver<LocationSample>,
    stable: mpsc::Sender<StableLocation>,
    cancel: CancellationToken,
) {
    let quiet_period = filter.quiet_period();
    let mut held: Option<LocationSample> = None;
    let mut deadline: Option<Instant> = None;

    info!(quiet_period_ms = quiet_period.as_millis() as u64, "Location filter started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            received = samples.recv() => {
                let Some(sample) = received else { break };
                match filter.screen(&sample, Utc::now()) {
                    Screening::Held => {
                        held = Some(sample);
                        deadline = Some(Instant::now() + quiet_period);
                    }
                    rejected => debug!(?rejected, "Location sample discarded"),
                }
            }

            _ = wait_until(deadline) => {
                deadline = None;
                if let Some(sample) = held.take() {
                    if let Some(location) = filter.settle(&sample) {
                        if stable.send(location).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    filter.reset();
    info!("Location filter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn config() -> FilterConfig {
        FilterConfig {
            staleness_secs: 10,
            quiet_period_ms: 3000,
            min_displacement_m: 80.0,
            max_accuracy_m: 100.0,
        }
    }

    fn sample_at(lat: f64, lon: f64) -> LocationSample {
        LocationSample::new(Coordinate::new(lat, lon), Utc::now())
    }

    #[test]
    fn test_stale_sample_is_discarded() {
        let filter = LocationFilter::new(config());
        let now = Utc::now();
        let sample = LocationSample::new(Coordinate::new(52.0, 21.0), now - ChronoDuration::seconds(15));
        assert!(matches!(filter.screen(&sample, now), Screening::Stale { age_secs: 15 }));
    }

    #[test]
    fn test_sample_exactly_at_staleness_limit_is_held() {
        let filter = LocationFilter::new(config());
        let now = Utc::now();
        let sample = LocationSample::new(Coordinate::new(52.0, 21.0), now - ChronoDuration::seconds(10));
        assert_eq!(filter.screen(&sample, now), Screening::Held);
    }

    #[test]
    fn test_inaccurate_sample_is_discarded() {
        let filter = LocationFilter::new(config());
        let now = Utc::now();
        let coarse = sample_at(52.0, 21.0).with_accuracy(500.0);
        let invalid = sample_at(52.0, 21.0).with_accuracy(-1.0);
        assert!(matches!(filter.screen(&coarse, now), Screening::Inaccurate { .. }));
        assert!(matches!(filter.screen(&invalid, now), Screening::Inaccurate { .. }));
        assert_eq!(filter.screen(&sample_at(52.0, 21.0).with_accuracy(15.0), now), Screening::Held);
    }

    #[test]
    fn test_first_sample_always_accepted() {
        let mut filter = LocationFilter::new(config());
        assert!(filter.settle(&sample_at(52.2297, 21.0122)).is_some());
        assert_eq!(filter.last_accepted(), Some(Coordinate::new(52.2297, 21.0122)));
    }

    #[test]
    fn test_small_move_is_ignored_large_move_accepted() {
        let mut filter = LocationFilter::new(config());
        filter.settle(&sample_at(52.2297, 21.0122)).unwrap();

        // ~50 m north
        assert!(filter.settle(&sample_at(52.22915, 21.0122)).is_none());
        // ~100 m north of the first fix
        assert!(filter.settle(&sample_at(52.2306, 21.0122)).is_some());
    }

    #[test]
    fn test_reset_makes_next_sample_first_again() {
        let mut filter = LocationFilter::new(config());
        filter.settle(&sample_at(52.2297, 21.0122)).unwrap();
        filter.reset();
        assert!(filter.settle(&sample_at(52.2297, 21.0122)).is_some());
    }
}

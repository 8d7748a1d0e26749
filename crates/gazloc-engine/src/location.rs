//! Continuous position tracking.
//!
//! A [`PositionSource`] stands in for the device: it answers the permission
//! prompt and hands out a [`FixFeed`] already rate-limited by
//! [`WatchOptions`]. The [`LocationTracker`] sits on top of the feed and
//! reduces it to "the current position", dropping duplicates, stale fixes
//! and garbage coordinates.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gazloc_core::{distance, AppConfig, Position};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::LocationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// A position reading and when it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub position: Position,
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    #[must_use]
    pub fn new(position: Position, timestamp: DateTime<Utc>) -> Self {
        Self {
            position,
            timestamp,
        }
    }

    #[must_use]
    pub fn now(position: Position) -> Self {
        Self::new(position, Utc::now())
    }
}

/// Minimum spacing between consecutive fixes handed out by a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub min_interval: Duration,
    pub min_distance_m: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(5),
            min_distance_m: 10.0,
        }
    }
}

impl WatchOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            min_interval: Duration::from_secs(config.location_min_interval_secs),
            min_distance_m: config.location_min_distance_m,
        }
    }

    /// Pass every fix through.
    #[must_use]
    pub fn unthrottled() -> Self {
        Self {
            min_interval: Duration::ZERO,
            min_distance_m: 0.0,
        }
    }
}

/// Rate limiter applied by sources: a fix passes once both the interval has
/// elapsed and the displacement reached the minimum, measured from the last
/// fix that passed.
#[derive(Debug, Clone)]
struct Throttle {
    options: WatchOptions,
    last: Option<Fix>,
}

impl Throttle {
    fn new(options: WatchOptions) -> Self {
        Self {
            options,
            last: None,
        }
    }

    fn admit(&mut self, fix: &Fix) -> bool {
        // an unusable fix must not restart the interval
        if !fix.position.is_valid() {
            return false;
        }
        if let Some(last) = &self.last {
            let elapsed = (fix.timestamp - last.timestamp).to_std().unwrap_or_default();
            if elapsed < self.options.min_interval {
                return false;
            }
            if distance(last.position, fix.position) < self.options.min_distance_m {
                return false;
            }
        }
        self.last = Some(*fix);
        true
    }
}

/// Rate-limited stream of fixes from a source.
#[derive(Debug)]
pub struct FixFeed {
    rx: mpsc::UnboundedReceiver<Fix>,
    throttle: Throttle,
}

impl FixFeed {
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<Fix>, options: WatchOptions) -> Self {
        Self {
            rx,
            throttle: Throttle::new(options),
        }
    }

    /// Next fix that clears the throttle; `None` once the source is gone.
    pub async fn next(&mut self) -> Option<Fix> {
        loop {
            let fix = self.rx.recv().await?;
            if self.throttle.admit(&fix) {
                return Some(fix);
            }
        }
    }
}

/// The device side of location tracking.
pub trait PositionSource: Send + 'static {
    fn request_permission(&mut self) -> impl Future<Output = PermissionStatus> + Send;

    /// Starts delivering fixes.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Unavailable`] if the source cannot start.
    fn watch(self, options: WatchOptions) -> Result<FixFeed, LocationError>;
}

/// Source fed by hand through a [`FixSender`]: used by embedders that get
/// fixes from elsewhere, by the CLI, and by tests.
#[derive(Debug)]
pub struct ChannelPositionSource {
    permission: PermissionStatus,
    rx: mpsc::UnboundedReceiver<Fix>,
}

/// Sending half of a [`ChannelPositionSource`].
#[derive(Debug, Clone)]
pub struct FixSender {
    tx: mpsc::UnboundedSender<Fix>,
}

impl FixSender {
    /// Returns `false` once the tracker is gone.
    pub fn send(&self, fix: Fix) -> bool {
        self.tx.send(fix).is_ok()
    }

    /// Sends a fix stamped with the current time. Invalid coordinates are
    /// still sent; the tracker drops them.
    pub fn send_position(&self, latitude: f64, longitude: f64) -> bool {
        self.send(Fix::now(Position {
            latitude,
            longitude,
        }))
    }
}

impl ChannelPositionSource {
    #[must_use]
    pub fn new(permission: PermissionStatus) -> (Self, FixSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { permission, rx }, FixSender { tx })
    }
}

impl PositionSource for ChannelPositionSource {
    async fn request_permission(&mut self) -> PermissionStatus {
        self.permission
    }

    fn watch(self, options: WatchOptions) -> Result<FixFeed, LocationError> {
        Ok(FixFeed::new(self.rx, options))
    }
}

/// Tracker-side filter between the feed and the listener.
#[derive(Debug, Default)]
struct FixFilter {
    last: Option<Fix>,
}

impl FixFilter {
    fn accept(&mut self, fix: Fix) -> Option<Fix> {
        if !fix.position.is_valid() {
            tracing::debug!(
                latitude = fix.position.latitude,
                longitude = fix.position.longitude,
                "dropping invalid fix"
            );
            return None;
        }
        if let Some(last) = &self.last {
            if fix.timestamp < last.timestamp {
                tracing::debug!(
                    fix_at = %fix.timestamp,
                    last_at = %last.timestamp,
                    "dropping out-of-order fix"
                );
                return None;
            }
            if fix.position == last.position {
                return None;
            }
        }
        self.last = Some(fix);
        Some(fix)
    }
}

/// Handle to a running tracker.
#[derive(Debug)]
pub struct TrackerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TrackerHandle {
    /// Stops delivery. No update fires once this returns, apart from one
    /// already running.
    pub fn stop(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.task.is_finished()
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub struct LocationTracker;

impl LocationTracker {
    /// Requests permission, then starts delivering distinct positions to
    /// `on_update` until `token` is cancelled or the source ends.
    ///
    /// # Errors
    ///
    /// [`LocationError::PermissionDenied`] if the user refuses, or whatever
    /// the source reports when it cannot start watching.
    pub async fn start<P, F>(
        mut source: P,
        options: WatchOptions,
        token: CancellationToken,
        mut on_update: F,
    ) -> Result<TrackerHandle, LocationError>
    where
        P: PositionSource,
        F: FnMut(Fix) + Send + 'static,
    {
        if source.request_permission().await == PermissionStatus::Denied {
            tracing::warn!("location permission denied");
            return Err(LocationError::PermissionDenied);
        }
        let mut feed = source.watch(options)?;
        tracing::info!(
            min_interval_ms = u64::try_from(options.min_interval.as_millis()).unwrap_or(u64::MAX),
            min_distance_m = options.min_distance_m,
            "location tracking started"
        );

        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let mut filter = FixFilter::default();
            loop {
                let next = tokio::select! {
                    () = task_token.cancelled() => break,
                    next = feed.next() => next,
                };
                let Some(fix) = next else {
                    tracing::info!("location source ended");
                    break;
                };
                if let Some(fix) = filter.accept(fix) {
                    if task_token.is_cancelled() {
                        break;
                    }
                    on_update(fix);
                }
            }
        });

        Ok(TrackerHandle { token, task })
    }
}

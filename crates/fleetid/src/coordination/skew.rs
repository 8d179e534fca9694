//! Startup clock-skew checks and the timestamp heartbeat that feeds them.

use core::time::Duration;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    Error, MAX_LEASE_TTL, Result, TimeSource, WorkerSlot,
    backend::{CoordinationBackend, call},
};

/// How a distributed generator decides whether its clock is trustworthy
/// before it starts issuing IDs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SkewStrategy {
    /// No check and no heartbeat.
    Disabled,
    /// Compare local Unix seconds against the mean of the samples published
    /// by peers under `"<namespace>/timestamps/"`, and publish our own sample
    /// every `publish_interval` once ready.
    PeerAverage {
        /// Compared at one-second resolution, so it must be a whole number
        /// of seconds.
        tolerance: Duration,
        publish_interval: Duration,
        sample_ttl: Duration,
    },
    /// Compare local Unix milliseconds against the backend's
    /// [`server_time`](CoordinationBackend::server_time).
    ReferenceTime { tolerance: Duration },
}

impl SkewStrategy {
    /// Peer averaging with a 5 s tolerance and a 3 s heartbeat whose samples
    /// live for 3 s.
    pub const fn peer_average() -> Self {
        Self::PeerAverage {
            tolerance: Duration::from_secs(5),
            publish_interval: Duration::from_secs(3),
            sample_ttl: Duration::from_secs(3),
        }
    }

    /// Reference-time comparison with a 1 s tolerance.
    pub const fn reference_time() -> Self {
        Self::ReferenceTime {
            tolerance: Duration::from_secs(1),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match *self {
            Self::Disabled | Self::ReferenceTime { .. } => Ok(()),
            Self::PeerAverage {
                tolerance,
                publish_interval,
                sample_ttl,
            } => {
                if publish_interval.is_zero() {
                    return Err(Error::config("timestamp publish interval must be non-zero"));
                }
                if sample_ttl.is_zero() {
                    return Err(Error::config("timestamp sample ttl must be non-zero"));
                }
                if sample_ttl > MAX_LEASE_TTL {
                    return Err(Error::config(format!(
                        "timestamp sample ttl {sample_ttl:?} must not exceed {MAX_LEASE_TTL:?}"
                    )));
                }
                if tolerance.subsec_nanos() != 0 {
                    return Err(Error::config(format!(
                        "peer-average tolerance {tolerance:?} must be a whole number of seconds"
                    )));
                }
                Ok(())
            }
        }
    }
}

impl Default for SkewStrategy {
    fn default() -> Self {
        Self::peer_average()
    }
}

/// Prefix under which timestamp samples are published.
pub fn timestamps_prefix(namespace: &str) -> String {
    format!("{namespace}/timestamps/")
}

/// Runs the configured startup check against a backend.
pub struct ClockSkewMonitor<'a, T: TimeSource> {
    backend: &'a dyn CoordinationBackend,
    namespace: &'a str,
    request_timeout: Duration,
    time: &'a T,
}

impl<'a, T: TimeSource> ClockSkewMonitor<'a, T> {
    pub fn new(
        backend: &'a dyn CoordinationBackend,
        namespace: &'a str,
        request_timeout: Duration,
        time: &'a T,
    ) -> Self {
        Self {
            backend,
            namespace,
            request_timeout,
            time,
        }
    }

    /// Checks the local clock under `strategy`.
    ///
    /// # Errors
    ///
    /// - [`Error::ClockSkew`] if the local clock lags by more than the
    ///   strategy's tolerance. Running ahead is never rejected.
    /// - [`Error::CoordinationUnavailable`] if the backend cannot be queried.
    pub async fn check(&self, strategy: &SkewStrategy) -> Result<()> {
        match *strategy {
            SkewStrategy::Disabled => Ok(()),
            SkewStrategy::PeerAverage { tolerance, .. } => {
                self.check_peer_average(tolerance).await
            }
            SkewStrategy::ReferenceTime { tolerance } => {
                self.check_reference_time(tolerance).await
            }
        }
    }

    async fn check_peer_average(&self, tolerance: Duration) -> Result<()> {
        let prefix = timestamps_prefix(self.namespace);
        let samples = call(
            "get_prefix",
            self.request_timeout,
            self.backend.get_prefix(&prefix),
        )
        .await?;

        let mut total: i64 = 0;
        let mut count: i64 = 0;
        for sample in &samples {
            match sample.value.trim().parse::<i64>() {
                Ok(seconds) => {
                    total = total.saturating_add(seconds);
                    count += 1;
                }
                Err(_) => debug!(
                    key = %sample.key,
                    value = %sample.value,
                    "skipping unparsable timestamp sample"
                ),
            }
        }
        if count == 0 {
            debug!("no peer timestamp samples; skipping skew check");
            return Ok(());
        }

        let mean = total / count;
        let local_ms = self.time.current_millis();
        let local = (local_ms / 1_000) as i64;
        if local.saturating_add(tolerance.as_secs() as i64) < mean {
            warn!(local, mean, samples = count, "local clock lags the fleet average");
            return Err(Error::ClockSkew {
                local_ms,
                reference_ms: (mean as u64).saturating_mul(1_000),
                tolerance,
            });
        }
        info!(local, mean, samples = count, "clock skew check passed");
        Ok(())
    }

    async fn check_reference_time(&self, tolerance: Duration) -> Result<()> {
        let reference_ms = call(
            "server_time",
            self.request_timeout,
            self.backend.server_time(),
        )
        .await?;
        let local_ms = self.time.current_millis();
        let tolerance_ms = tolerance.as_millis() as u64;

        if local_ms.saturating_add(tolerance_ms) < reference_ms {
            warn!(local_ms, reference_ms, "local clock lags the reference time");
            return Err(Error::ClockSkew {
                local_ms,
                reference_ms,
                tolerance,
            });
        }
        info!(local_ms, reference_ms, "clock skew check passed");
        Ok(())
    }
}

/// Spawns the heartbeat that publishes this process's Unix seconds under
/// `"<namespace>/timestamps/<slot>"`.
///
/// Only [`SkewStrategy::PeerAverage`] publishes; other strategies return
/// `None`. The first sample is written immediately.
pub(crate) fn spawn_publisher<T: TimeSource + 'static>(
    strategy: &SkewStrategy,
    backend: Arc<dyn CoordinationBackend>,
    namespace: &str,
    slot: WorkerSlot,
    request_timeout: Duration,
    time: Arc<T>,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    let SkewStrategy::PeerAverage {
        publish_interval,
        sample_ttl,
        ..
    } = *strategy
    else {
        return None;
    };

    let publisher = TimestampPublisher {
        backend,
        key: format!("{}{slot}", timestamps_prefix(namespace)),
        sample_ttl,
        request_timeout,
        time,
    };
    Some(tokio::spawn(publisher.run(publish_interval, shutdown)))
}

struct TimestampPublisher<T> {
    backend: Arc<dyn CoordinationBackend>,
    key: String,
    sample_ttl: Duration,
    request_timeout: Duration,
    time: Arc<T>,
}

impl<T: TimeSource> TimestampPublisher<T> {
    async fn run(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!(key = %self.key, "timestamp publisher stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.publish_once().await {
                warn!(key = %self.key, error = %e, "failed to publish timestamp sample");
            }
        }
    }

    async fn publish_once(&self) -> Result<()> {
        let lease = call(
            "grant_lease",
            self.request_timeout,
            self.backend.grant_lease(self.sample_ttl),
        )
        .await?;
        let seconds = self.time.current_seconds().to_string();
        call(
            "put",
            self.request_timeout,
            self.backend.put(&self.key, &seconds, Some(lease)),
        )
        .await?;
        debug!(key = %self.key, %seconds, "published timestamp sample");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        MemoryBackend,
        testing::{CountingBackend, FailingBackend, MockClock, Op},
    };

    const NOW_MS: u64 = 1_700_000_000_000;
    const TIMEOUT: Duration = Duration::from_secs(3);

    async fn seed(backend: &MemoryBackend, samples: &[(&str, &str)]) {
        for (slot, value) in samples {
            backend
                .put(&format!("/UUID/timestamps/{slot}"), value, None)
                .await
                .unwrap();
        }
    }

    async fn check(
        backend: &MemoryBackend,
        clock: &MockClock,
        strategy: SkewStrategy,
    ) -> Result<()> {
        ClockSkewMonitor::new(backend, "/UUID", TIMEOUT, clock)
            .check(&strategy)
            .await
    }

    #[tokio::test]
    async fn peer_average_passes_with_no_samples() {
        let backend = MemoryBackend::new();
        let clock = MockClock::new(NOW_MS);
        assert_eq!(check(&backend, &clock, SkewStrategy::peer_average()).await, Ok(()));
    }

    #[tokio::test]
    async fn peer_average_passes_within_tolerance() {
        let backend = MemoryBackend::new();
        let clock = MockClock::new(NOW_MS);
        // Mean is exactly five seconds ahead.
        seed(&backend, &[("0", "1700000004"), ("8192", "1700000006")]).await;
        assert_eq!(check(&backend, &clock, SkewStrategy::peer_average()).await, Ok(()));
    }

    #[tokio::test]
    async fn peer_average_rejects_lagging_clock() {
        let backend = MemoryBackend::new();
        let clock = MockClock::new(NOW_MS);
        seed(&backend, &[("0", "1700000010"), ("8192", "1700000010")]).await;

        let err = check(&backend, &clock, SkewStrategy::peer_average())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::ClockSkew {
                local_ms: NOW_MS,
                reference_ms: 1_700_000_010_000,
                tolerance: Duration::from_secs(5),
            }
        );
    }

    #[tokio::test]
    async fn peer_average_ignores_clock_ahead() {
        let backend = MemoryBackend::new();
        let clock = MockClock::new(NOW_MS + 3_600_000);
        seed(&backend, &[("0", "1700000000")]).await;
        assert_eq!(check(&backend, &clock, SkewStrategy::peer_average()).await, Ok(()));
    }

    #[tokio::test]
    async fn peer_average_skips_unparsable_samples() {
        let backend = MemoryBackend::new();
        let clock = MockClock::new(NOW_MS);
        seed(&backend, &[("0", "garbage"), ("8192", "1700000001"), ("16384", "")]).await;
        assert_eq!(check(&backend, &clock, SkewStrategy::peer_average()).await, Ok(()));

        // Only garbage behaves like no samples at all.
        let backend = MemoryBackend::new();
        seed(&backend, &[("0", "garbage")]).await;
        assert_eq!(check(&backend, &clock, SkewStrategy::peer_average()).await, Ok(()));
    }

    #[tokio::test]
    async fn peer_average_uses_integer_mean() {
        let backend = MemoryBackend::new();
        let clock = MockClock::new(NOW_MS);
        // (1700000005 + 1700000006) / 2 truncates to 1700000005.
        seed(&backend, &[("0", "1700000005"), ("8192", "1700000006")]).await;
        assert_eq!(check(&backend, &clock, SkewStrategy::peer_average()).await, Ok(()));
    }

    #[tokio::test]
    async fn reference_time_rejects_lag_beyond_tolerance() {
        let clock = MockClock::new(NOW_MS);
        let backend = MemoryBackend::with_clock(MockClock::new(NOW_MS + 1_001));

        let err = check(&backend, &clock, SkewStrategy::reference_time())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::ClockSkew {
                local_ms: NOW_MS,
                reference_ms: NOW_MS + 1_001,
                tolerance: Duration::from_secs(1),
            }
        );
    }

    #[tokio::test]
    async fn reference_time_accepts_lag_within_tolerance() {
        let clock = MockClock::new(NOW_MS);
        let backend = MemoryBackend::with_clock(MockClock::new(NOW_MS + 1_000));
        assert_eq!(check(&backend, &clock, SkewStrategy::reference_time()).await, Ok(()));

        let backend = MemoryBackend::with_clock(MockClock::new(NOW_MS - 60_000));
        assert_eq!(check(&backend, &clock, SkewStrategy::reference_time()).await, Ok(()));
    }

    #[tokio::test]
    async fn disabled_never_queries_backend() {
        let counting = CountingBackend::new(MemoryBackend::new());
        let clock = MockClock::new(NOW_MS);
        ClockSkewMonitor::new(&counting, "/UUID", TIMEOUT, &clock)
            .check(&SkewStrategy::Disabled)
            .await
            .unwrap();
        assert_eq!(counting.total(), 0);
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        let failing = FailingBackend::new(MemoryBackend::new(), Op::GetPrefix);
        let clock = MockClock::new(NOW_MS);
        let err = ClockSkewMonitor::new(&failing, "/UUID", TIMEOUT, &clock)
            .check(&SkewStrategy::peer_average())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CoordinationUnavailable {
                op: "get_prefix",
                ..
            }
        ));
    }

    #[test]
    fn zero_publish_interval_is_rejected() {
        let strategy = SkewStrategy::PeerAverage {
            tolerance: Duration::from_secs(5),
            publish_interval: Duration::ZERO,
            sample_ttl: Duration::from_secs(3),
        };
        assert!(matches!(strategy.validate(), Err(Error::Configuration { .. })));
        assert!(SkewStrategy::Disabled.validate().is_ok());
    }

    #[test]
    fn sub_second_peer_tolerance_is_rejected() {
        let strategy = SkewStrategy::PeerAverage {
            tolerance: Duration::from_millis(500),
            publish_interval: Duration::from_secs(3),
            sample_ttl: Duration::from_secs(3),
        };
        assert!(matches!(strategy.validate(), Err(Error::Configuration { .. })));

        let strategy = SkewStrategy::PeerAverage {
            tolerance: Duration::from_secs(1),
            publish_interval: Duration::from_secs(3),
            sample_ttl: Duration::from_secs(3),
        };
        assert!(strategy.validate().is_ok());
        // Reference time compares milliseconds and accepts any tolerance.
        let strategy = SkewStrategy::ReferenceTime {
            tolerance: Duration::from_millis(500),
        };
        assert!(strategy.validate().is_ok());
    }

    #[tokio::test]
    async fn one_second_peer_tolerance_covers_one_second_lag() {
        let backend = MemoryBackend::new();
        let clock = MockClock::new(NOW_MS);
        seed(&backend, &[("0", "1700000001")]).await;
        let strategy = SkewStrategy::PeerAverage {
            tolerance: Duration::from_secs(1),
            publish_interval: Duration::from_secs(3),
            sample_ttl: Duration::from_secs(3),
        };
        assert_eq!(check(&backend, &clock, strategy).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn publisher_writes_immediately_and_refreshes() {
        let memory = MemoryBackend::new();
        let clock = Arc::new(MockClock::new(NOW_MS));
        let slot = WorkerSlot::new(1).unwrap();
        let token = CancellationToken::new();

        let handle = spawn_publisher(
            &SkewStrategy::peer_average(),
            Arc::new(memory.clone()),
            "/UUID",
            slot,
            TIMEOUT,
            Arc::clone(&clock),
            token.clone(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            memory.get("/UUID/timestamps/8192").await.unwrap().as_deref(),
            Some("1700000000")
        );

        // Samples expire after 3 s unless the next heartbeat replaces them.
        clock.advance(30_000);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            memory.get("/UUID/timestamps/8192").await.unwrap().as_deref(),
            Some("1700000030")
        );

        token.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(memory.get("/UUID/timestamps/8192").await, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn publisher_survives_failures() {
        let failing = FailingBackend::new(MemoryBackend::new(), Op::GrantLease).times(2);
        let counting = CountingBackend::new(failing);
        let token = CancellationToken::new();

        let handle = spawn_publisher(
            &SkewStrategy::peer_average(),
            Arc::new(counting.clone()),
            "/UUID",
            WorkerSlot::new(2).unwrap(),
            TIMEOUT,
            Arc::new(MockClock::new(NOW_MS)),
            token.clone(),
        )
        .unwrap();

        // Ticks at 0, 3 and 6 seconds; the first two fail.
        tokio::time::sleep(Duration::from_millis(6_500)).await;
        assert_eq!(counting.count(Op::GrantLease), 3);
        assert_eq!(counting.count(Op::Put), 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn only_peer_average_publishes() {
        let token = CancellationToken::new();
        for strategy in [SkewStrategy::Disabled, SkewStrategy::reference_time()] {
            assert!(
                spawn_publisher(
                    &strategy,
                    Arc::new(MemoryBackend::new()),
                    "/UUID",
                    WorkerSlot::new(0).unwrap(),
                    TIMEOUT,
                    Arc::new(MockClock::new(NOW_MS)),
                    token.clone(),
                )
                .is_none()
            );
        }
    }
}

//! Per-client admission control.
//!
//! Every request is charged against a token bucket keyed by the peer address.
//! Buckets live in an in-memory keyed store (one lock shard per key range), so
//! unrelated clients never contend on a single lock. The store is local to the
//! process and starts empty on restart.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    Quota, RateLimiter as Governor,
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
};
use std::{
    future::Future,
    net::{IpAddr, Ipv6Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, warn};

pub const DEFAULT_RATE_PER_SECOND: u32 = 5;
pub const DEFAULT_BURST: u32 = 15;
pub const BUCKET_EXPIRY: Duration = Duration::from_secs(3 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: IpAddr) -> RateLimitDecision;

    /// Drop idle buckets, returning how many clients are still tracked.
    fn sweep(&self) -> usize {
        0
    }
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: IpAddr) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitConfigError {
    #[error("rate limit per second must be at least 1")]
    ZeroRate,
    #[error("rate limit burst must be at least 1")]
    ZeroBurst,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    per_second: NonZeroU32,
    burst: NonZeroU32,
}

impl RateLimitConfig {
    /// # Errors
    /// Returns an error if either value is zero.
    pub fn new(per_second: u32, burst: u32) -> Result<Self, RateLimitConfigError> {
        Ok(Self {
            per_second: NonZeroU32::new(per_second).ok_or(RateLimitConfigError::ZeroRate)?,
            burst: NonZeroU32::new(burst).ok_or(RateLimitConfigError::ZeroBurst)?,
        })
    }

    #[must_use]
    pub fn per_second(&self) -> u32 {
        self.per_second.get()
    }

    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst.get()
    }

    fn quota(self) -> Quota {
        Quota::per_second(self.per_second).allow_burst(self.burst)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: NonZeroU32::new(DEFAULT_RATE_PER_SECOND).unwrap_or(NonZeroU32::MIN),
            burst: NonZeroU32::new(DEFAULT_BURST).unwrap_or(NonZeroU32::MIN),
        }
    }
}

/// GCRA token bucket per client address.
pub struct TokenBucketLimiter<C: Clock = DefaultClock> {
    buckets: Governor<IpAddr, DefaultKeyedStateStore<IpAddr>, C, NoOpMiddleware<C::Instant>>,
    clock: C,
}

impl TokenBucketLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock> TokenBucketLimiter<C> {
    #[must_use]
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Self {
        let buckets = Governor::new(config.quota(), DefaultKeyedStateStore::default(), &clock);
        Self { buckets, clock }
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

impl<C> RateLimiter for TokenBucketLimiter<C>
where
    C: Clock + Send + Sync,
{
    fn check_ip(&self, ip: IpAddr) -> RateLimitDecision {
        match self.buckets.check_key(&ip) {
            Ok(()) => RateLimitDecision::Allowed,
            Err(not_until) => RateLimitDecision::Limited {
                retry_after: not_until.wait_time_from(self.clock.now()),
            },
        }
    }

    // A bucket is dropped once it has fully refilled, which happens well
    // within BUCKET_EXPIRY of its last request.
    fn sweep(&self) -> usize {
        self.buckets.retain_recent();
        self.buckets.shrink_to_fit();
        self.buckets.len()
    }
}

/// Periodically evict idle buckets until `stop` resolves.
pub fn spawn_sweeper<F>(limiter: Arc<dyn RateLimiter>, period: Duration, stop: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::pin!(stop);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = &mut stop => break,
                _ = ticker.tick() => {
                    let tracked = limiter.sweep();
                    debug!(tracked_clients = tracked, "Swept idle rate limit buckets");
                }
            }
        }

        debug!("Rate limit sweeper stopped");
    })
}

/// Client identity used for admission: the direct peer address.
///
/// IPv4 peers accepted on a dual-stack socket are folded back to their IPv4
/// form so both families share one bucket.
#[must_use]
pub fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED), |ConnectInfo(addr)| {
            addr.ip().to_canonical()
        })
}

/// Middleware gate in front of every route.
pub async fn enforce(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    match limiter.check_ip(ip) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited { retry_after } => {
            warn!(client_ip = %ip, path = request.uri().path(), "Rate limit exceeded");
            let seconds = retry_after.as_secs().max(1).to_string();
            (StatusCode::TOO_MANY_REQUESTS, [(RETRY_AFTER, seconds)]).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use governor::clock::FakeRelativeClock;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, last))
    }

    fn limiter(clock: &FakeRelativeClock) -> TokenBucketLimiter<FakeRelativeClock> {
        TokenBucketLimiter::with_clock(RateLimitConfig::default(), clock.clone())
    }

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(limiter.check_ip(ip(1)), RateLimitDecision::Allowed);
        assert_eq!(limiter.sweep(), 0);
    }

    #[test]
    fn config_rejects_zero_values() {
        assert_eq!(
            RateLimitConfig::new(0, 15),
            Err(RateLimitConfigError::ZeroRate)
        );
        assert_eq!(
            RateLimitConfig::new(5, 0),
            Err(RateLimitConfigError::ZeroBurst)
        );
        let config = RateLimitConfig::default();
        assert_eq!(config.per_second(), 5);
        assert_eq!(config.burst(), 15);
    }

    #[test]
    fn burst_is_exhausted_on_the_sixteenth_request() {
        let clock = FakeRelativeClock::default();
        let limiter = limiter(&clock);

        for attempt in 0..15 {
            assert_eq!(
                limiter.check_ip(ip(1)),
                RateLimitDecision::Allowed,
                "attempt {attempt} should pass"
            );
        }
        assert!(matches!(
            limiter.check_ip(ip(1)),
            RateLimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn bucket_refills_at_five_per_second() {
        let clock = FakeRelativeClock::default();
        let limiter = limiter(&clock);

        for _ in 0..15 {
            limiter.check_ip(ip(1));
        }
        match limiter.check_ip(ip(1)) {
            RateLimitDecision::Limited { retry_after } => {
                assert!(retry_after <= Duration::from_millis(200));
            }
            RateLimitDecision::Allowed => panic!("bucket should be empty"),
        }

        clock.advance(Duration::from_millis(200));
        assert_eq!(limiter.check_ip(ip(1)), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.check_ip(ip(1)),
            RateLimitDecision::Limited { .. }
        ));

        clock.advance(Duration::from_secs(3));
        for _ in 0..15 {
            assert_eq!(limiter.check_ip(ip(1)), RateLimitDecision::Allowed);
        }
    }

    #[test]
    fn clients_have_independent_buckets() {
        let clock = FakeRelativeClock::default();
        let limiter = limiter(&clock);

        for _ in 0..16 {
            limiter.check_ip(ip(1));
        }
        assert!(matches!(
            limiter.check_ip(ip(1)),
            RateLimitDecision::Limited { .. }
        ));
        assert_eq!(limiter.check_ip(ip(2)), RateLimitDecision::Allowed);
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn system_clock_limiter_behind_trait_object() {
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(TokenBucketLimiter::new(RateLimitConfig::default()));

        for _ in 0..15 {
            assert_eq!(limiter.check_ip(ip(9)), RateLimitDecision::Allowed);
        }
        match limiter.check_ip(ip(9)) {
            RateLimitDecision::Limited { retry_after } => {
                assert!(retry_after <= Duration::from_millis(200));
            }
            RateLimitDecision::Allowed => panic!("bucket should be empty"),
        }
        assert_eq!(limiter.sweep(), 1);
    }

    #[test]
    fn sweep_evicts_idle_buckets() {
        let clock = FakeRelativeClock::default();
        let limiter = limiter(&clock);

        for _ in 0..15 {
            limiter.check_ip(ip(1));
        }
        limiter.check_ip(ip(2));
        assert_eq!(limiter.sweep(), 2);

        clock.advance(BUCKET_EXPIRY);
        assert_eq!(limiter.sweep(), 0);
        assert_eq!(limiter.tracked_clients(), 0);

        // an evicted client starts over with a full bucket
        for _ in 0..15 {
            assert_eq!(limiter.check_ip(ip(1)), RateLimitDecision::Allowed);
        }
    }

    #[test]
    fn client_ip_uses_peer_address() {
        let mut request = Request::new(Body::empty());
        assert_eq!(client_ip(&request), IpAddr::V6(Ipv6Addr::UNSPECIFIED));

        let mapped: SocketAddr = "[::ffff:192.0.2.7]:4000"
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        request.extensions_mut().insert(ConnectInfo(mapped));
        assert_eq!(client_ip(&request), ip(7));
    }

    struct CountingLimiter(AtomicUsize);

    impl RateLimiter for CountingLimiter {
        fn check_ip(&self, _ip: IpAddr) -> RateLimitDecision {
            RateLimitDecision::Allowed
        }

        fn sweep(&self) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    #[tokio::test]
    async fn sweeper_runs_until_stopped() -> anyhow::Result<()> {
        let counting = Arc::new(CountingLimiter(AtomicUsize::new(0)));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = spawn_sweeper(counting.clone(), Duration::from_millis(10), async move {
            let _ = stop_rx.await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = stop_tx.send(());
        handle.await?;

        let sweeps = counting.0.load(Ordering::SeqCst);
        assert!(sweeps >= 1, "expected at least one sweep, got {sweeps}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counting.0.load(Ordering::SeqCst), sweeps);
        Ok(())
    }
}

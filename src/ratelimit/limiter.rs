//! Core limiter facade.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::actor::{ActorContext, Decision, HydrationPolicy};
use super::backend::LimiterBackend;
use super::key::LimiterKey;
use super::quota::{QuotaLimiterActor, QuotaParams};
use super::rate::{RateLimiterActor, RateParams};
use super::registry::ActorRegistry;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::store::{MemoryStore, Store};

/// The limiter that owns one actor registry per limiter kind.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct Limiter {
    rate: ActorRegistry<RateLimiterActor>,
    quota: ActorRegistry<QuotaLimiterActor>,
}

impl Limiter {
    /// Create a limiter over `store`, reading time from `clock`.
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, hydration: HydrationPolicy) -> Self {
        let ctx = ActorContext::new(store, clock).with_hydration(hydration);
        Self {
            rate: ActorRegistry::new(ctx.clone()),
            quota: ActorRegistry::new(ctx),
        }
    }

    /// A limiter over a fresh in-memory store and the system clock.
    pub fn in_memory() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryStore::new(Arc::clone(&clock)));
        Self::new(store, clock, HydrationPolicy::default())
    }

    /// Get the number of live actors across both kinds.
    pub fn actor_count(&self) -> usize {
        self.rate.len() + self.quota.len()
    }

    /// Evict every detached actor idle for at least `max_idle`.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.rate.evict_idle(max_idle) + self.quota.evict_idle(max_idle)
    }

    /// Periodically evict idle actors until the returned task is aborted.
    pub fn spawn_eviction(self: &Arc<Self>, interval: Duration, max_idle: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = limiter.evict_idle(max_idle);
                trace!(evicted = evicted, live = limiter.actor_count(), "Actor eviction pass");
            }
        })
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl LimiterBackend for Limiter {
    async fn check_rate(&self, key: &LimiterKey, params: RateParams) -> Result<Decision> {
        let decision = self.rate.check(key.as_str(), params).await?;
        debug!(key = %key, rate_ms = params.rate_ms, decision = ?decision, "Rate check");
        Ok(decision)
    }

    async fn check_quota(&self, key: &LimiterKey, params: QuotaParams) -> Result<Decision> {
        let limit = params.limit;
        let decision = self.quota.check(key.as_str(), params).await?;
        debug!(key = %key, limit = limit, decision = ?decision, "Quota check");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::testing::FlakyStore;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::net::IpAddr;

    fn limiter() -> (Arc<ManualClock>, Limiter) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (clock.clone(), Limiter::new(store, clock, HydrationPolicy::FailClosed))
    }

    #[tokio::test]
    async fn test_limiter_creation() {
        let limiter = Limiter::in_memory();
        assert_eq!(limiter.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_rate_sequence() {
        let (clock, limiter) = limiter();
        let key = LimiterKey::global("api");
        let params = RateParams::new(15_000);

        assert!(limiter.check_rate(&key, params).await.unwrap().is_accepted());
        clock.advance(ChronoDuration::milliseconds(5_000));
        assert!(limiter.check_rate(&key, params).await.unwrap().is_rejected());
        clock.advance(ChronoDuration::milliseconds(11_000));
        assert!(limiter.check_rate(&key, params).await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn test_quota_sequence() {
        let (clock, limiter) = limiter();
        let key = LimiterKey::global("api");
        let params = QuotaParams::new(1, 2, "minute");

        assert!(limiter.check_quota(&key, params.clone()).await.unwrap().is_accepted());
        assert!(limiter.check_quota(&key, params.clone()).await.unwrap().is_rejected());
        clock.set(Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap());
        assert!(limiter.check_quota(&key, params).await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn test_rate_and_quota_records_are_separate() {
        let (_, limiter) = limiter();
        let key = LimiterKey::global("api");

        assert!(limiter.check_rate(&key, RateParams::new(60_000)).await.unwrap().is_accepted());
        assert!(limiter
            .check_quota(&key, QuotaParams::new(1, 1, "hour"))
            .await
            .unwrap()
            .is_accepted());
        assert_eq!(limiter.actor_count(), 2);
    }

    #[tokio::test]
    async fn test_per_user_and_per_ip_keys_are_isolated() {
        let (_, limiter) = limiter();
        let params = QuotaParams::new(1, 1, "minute");
        let ip: IpAddr = "198.51.100.4".parse().unwrap();

        let user = LimiterKey::per_user("api", "7");
        let other_user = LimiterKey::per_user("api", "8");
        let client = LimiterKey::per_ip("api", ip);

        assert!(limiter.check_quota(&user, params.clone()).await.unwrap().is_accepted());
        assert!(limiter.check_quota(&user, params.clone()).await.unwrap().is_rejected());
        assert!(limiter.check_quota(&other_user, params.clone()).await.unwrap().is_accepted());
        assert!(limiter.check_quota(&client, params).await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn test_rejection_does_not_affect_concurrent_key() {
        let (_, limiter) = limiter();
        let limiter = Arc::new(limiter);
        let params = RateParams::new(60_000);
        let a = LimiterKey::global("a");
        let b = LimiterKey::global("b");

        limiter.check_rate(&a, params).await.unwrap();

        let (on_a, on_b) = tokio::join!(limiter.check_rate(&a, params), limiter.check_rate(&b, params));
        assert!(on_a.unwrap().is_rejected());
        assert!(on_b.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn test_decisions_survive_eviction() {
        let (clock, limiter) = limiter();
        let key = LimiterKey::global("api");
        let params = QuotaParams::new(2, 1, "hour");

        limiter.check_quota(&key, params.clone()).await.unwrap();
        clock.advance(ChronoDuration::minutes(10));
        assert_eq!(limiter.evict_idle(Duration::from_secs(60)), 1);
        assert_eq!(limiter.actor_count(), 0);

        assert!(limiter.check_quota(&key, params.clone()).await.unwrap().is_accepted());
        assert!(limiter.check_quota(&key, params).await.unwrap().is_rejected());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let flaky = Arc::new(FlakyStore::new(Arc::new(MemoryStore::new(clock.clone()))));
        let limiter = Limiter::new(flaky.clone(), clock, HydrationPolicy::FailClosed);
        let key = LimiterKey::global("api");

        flaky.fail_writes(true);
        assert!(limiter.check_rate(&key, RateParams::default()).await.is_err());
        assert!(limiter.check_quota(&key, QuotaParams::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_eviction_task_runs() {
        let (clock, limiter) = limiter();
        let limiter = Arc::new(limiter);
        limiter
            .check_rate(&LimiterKey::global("api"), RateParams::default())
            .await
            .unwrap();
        clock.advance(ChronoDuration::minutes(10));

        let task = limiter.spawn_eviction(Duration::from_millis(10), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        assert_eq!(limiter.actor_count(), 0);
    }
}

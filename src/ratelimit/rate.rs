//! Minimum-gap rate limiter actor.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::actor::{storage_key, ActorContext, Decision, HydrationPolicy, LimiterActor};
use super::window::MIN_TTL;
use crate::error::Result;
use crate::store::{load_json, save_json};

/// Default minimum gap between accepted requests.
pub const DEFAULT_RATE_MS: i64 = 1000;

/// Parameters of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateParams {
    /// Minimum milliseconds between two accepted requests. Zero or negative
    /// disables the limit.
    #[serde(default = "default_rate_ms")]
    pub rate_ms: i64,
}

fn default_rate_ms() -> i64 {
    DEFAULT_RATE_MS
}

impl Default for RateParams {
    fn default() -> Self {
        Self {
            rate_ms: DEFAULT_RATE_MS,
        }
    }
}

impl RateParams {
    pub fn new(rate_ms: i64) -> Self {
        Self { rate_ms }
    }
}

/// Persisted rate limiter record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateState {
    /// Epoch milliseconds of the last accepted request; 0 means never.
    pub last_accept_ms: i64,
}

/// Enforces a minimum gap between accepted requests for one key.
pub struct RateLimiterActor {
    key: String,
    storage_key: String,
    ctx: ActorContext,
    state: Option<RateState>,
}

impl RateLimiterActor {
    /// The in-memory copy of the record, if hydrated.
    pub fn state(&self) -> Option<RateState> {
        self.state
    }

    async fn hydrate(&mut self) -> Result<RateState> {
        if let Some(state) = self.state {
            return Ok(state);
        }

        let state = match load_json::<RateState>(self.ctx.store.as_ref(), &self.storage_key).await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) if self.ctx.hydration == HydrationPolicy::FailOpen => {
                warn!(key = %self.key, error = %e, "Rate limiter hydration failed, starting empty");
                RateState::default()
            }
            Err(e) => return Err(e.into()),
        };

        debug!(key = %self.key, last_accept_ms = state.last_accept_ms, "Rate limiter hydrated");
        self.state = Some(state);
        Ok(state)
    }
}

#[async_trait]
impl LimiterActor for RateLimiterActor {
    type Params = RateParams;

    const KIND: &'static str = "rate";

    fn new(key: &str, ctx: ActorContext) -> Self {
        Self {
            key: key.to_string(),
            storage_key: storage_key(Self::KIND, key),
            ctx,
            state: None,
        }
    }

    async fn check(&mut self, params: RateParams) -> Result<Decision> {
        let state = self.hydrate().await?;
        let gap = params.rate_ms;
        let now = self.ctx.clock.now_millis();
        let elapsed = now.saturating_sub(state.last_accept_ms);

        trace!(key = %self.key, now = now, last = state.last_accept_ms, gap = gap, "Checking rate limit");

        if gap > 0 && elapsed < gap {
            let wait = gap.saturating_sub(elapsed.max(0));
            debug!(key = %self.key, elapsed = elapsed, gap = gap, "Rate limit exceeded");
            return Ok(Decision::Rejected {
                retry_after: Some(Duration::from_millis(wait as u64)),
            });
        }

        let next = RateState {
            last_accept_ms: state.last_accept_ms.max(now),
        };
        let ttl = Duration::from_millis(gap.max(0).saturating_mul(2) as u64).max(MIN_TTL);
        save_json(self.ctx.store.as_ref(), &self.storage_key, &next, ttl).await?;
        self.state = Some(next);

        Ok(Decision::Accepted)
    }

    fn is_hydrated(&self) -> bool {
        self.state.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TurnstileError;
    use crate::store::testing::FlakyStore;
    use crate::store::{MemoryStore, Store};
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;

    // Far enough from the epoch that "never" (0) is long ago.
    const T0: i64 = 1_700_000_000_000;

    fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, ActorContext) {
        let clock = Arc::new(ManualClock::at_millis(T0));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let ctx = ActorContext::new(store.clone(), clock.clone());
        (clock, store, ctx)
    }

    #[tokio::test]
    async fn test_gap_sequence() {
        let (clock, _, ctx) = setup();
        let mut actor = RateLimiterActor::new("api", ctx);
        let params = RateParams::new(15_000);

        assert_eq!(actor.check(params).await.unwrap(), Decision::Accepted);

        clock.advance(ChronoDuration::milliseconds(5_000));
        assert_eq!(
            actor.check(params).await.unwrap(),
            Decision::Rejected {
                retry_after: Some(Duration::from_millis(10_000))
            }
        );

        clock.advance(ChronoDuration::milliseconds(11_000));
        assert_eq!(actor.check(params).await.unwrap(), Decision::Accepted);
    }

    #[tokio::test]
    async fn test_exact_gap_is_accepted() {
        let (clock, _, ctx) = setup();
        let mut actor = RateLimiterActor::new("api", ctx);
        let params = RateParams::new(1_000);

        assert!(actor.check(params).await.unwrap().is_accepted());
        clock.advance(ChronoDuration::milliseconds(999));
        assert!(actor.check(params).await.unwrap().is_rejected());
        clock.advance(ChronoDuration::milliseconds(1));
        assert!(actor.check(params).await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn test_rejection_leaves_state_unchanged() {
        let (clock, _, ctx) = setup();
        let mut actor = RateLimiterActor::new("api", ctx);
        let params = RateParams::new(1_000);

        actor.check(params).await.unwrap();
        clock.advance(ChronoDuration::milliseconds(500));
        actor.check(params).await.unwrap();

        assert_eq!(actor.state(), Some(RateState { last_accept_ms: T0 }));
    }

    #[tokio::test]
    async fn test_non_positive_gap_accepts_everything() {
        let (_, _, ctx) = setup();
        let mut actor = RateLimiterActor::new("api", ctx);

        for rate_ms in [0, 0, -5, -5] {
            assert!(actor.check(RateParams::new(rate_ms)).await.unwrap().is_accepted());
        }
    }

    #[tokio::test]
    async fn test_timestamp_never_moves_backwards() {
        let (clock, _, ctx) = setup();
        let mut actor = RateLimiterActor::new("api", ctx);

        actor.check(RateParams::new(0)).await.unwrap();
        clock.advance(ChronoDuration::milliseconds(-2_000));
        actor.check(RateParams::new(0)).await.unwrap();
        assert_eq!(actor.state(), Some(RateState { last_accept_ms: T0 }));

        // a positive gap against a clock that stepped back is still enforced
        assert!(actor.check(RateParams::new(100)).await.unwrap().is_rejected());
    }

    #[tokio::test]
    async fn test_rehydrated_actor_decides_identically() {
        let (clock, _, ctx) = setup();
        let params = RateParams::new(15_000);

        let mut first = RateLimiterActor::new("api", ctx.clone());
        assert!(first.check(params).await.unwrap().is_accepted());
        drop(first);

        clock.advance(ChronoDuration::milliseconds(5_000));
        let mut second = RateLimiterActor::new("api", ctx);
        assert!(!second.is_hydrated());
        assert!(second.check(params).await.unwrap().is_rejected());
        assert!(second.is_hydrated());
    }

    #[tokio::test]
    async fn test_persisted_with_ttl() {
        let (clock, store, ctx) = setup();
        let mut actor = RateLimiterActor::new("api", ctx);
        actor.check(RateParams::new(60_000)).await.unwrap();

        let raw = store.get("rate:api").await.unwrap().unwrap();
        let stored: RateState = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.last_accept_ms, T0);

        // TTL is twice the gap
        clock.advance(ChronoDuration::milliseconds(119_999));
        assert!(store.get("rate:api").await.unwrap().is_some());
        clock.advance(ChronoDuration::milliseconds(1));
        assert!(store.get("rate:api").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_record_is_a_fresh_key() {
        let (clock, _, ctx) = setup();
        let params = RateParams::new(1_000);

        let mut first = RateLimiterActor::new("api", ctx.clone());
        first.check(params).await.unwrap();

        clock.advance(ChronoDuration::minutes(5));
        let mut second = RateLimiterActor::new("api", ctx);
        assert!(second.check(params).await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn test_write_failure_fails_closed() {
        let (_, store, _) = setup();
        let clock = Arc::new(ManualClock::at_millis(T0));
        let flaky = Arc::new(FlakyStore::new(store));
        let ctx = ActorContext::new(flaky.clone(), clock);
        let mut actor = RateLimiterActor::new("api", ctx);

        flaky.fail_writes(true);
        let result = actor.check(RateParams::new(1_000)).await;
        assert!(matches!(result, Err(TurnstileError::Store(_))));

        // nothing was recorded, so the next attempt is decided afresh
        flaky.fail_writes(false);
        assert!(actor.check(RateParams::new(1_000)).await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn test_hydration_failure_fails_closed_by_default() {
        let (clock, store, _) = setup();
        let flaky = Arc::new(FlakyStore::new(store));
        let ctx = ActorContext::new(flaky.clone(), clock);
        let mut actor = RateLimiterActor::new("api", ctx);

        flaky.fail_reads(true);
        assert!(actor.check(RateParams::default()).await.is_err());
        assert!(!actor.is_hydrated());

        flaky.fail_reads(false);
        assert!(actor.check(RateParams::default()).await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn test_hydration_failure_fail_open() {
        let (clock, store, _) = setup();
        let flaky = Arc::new(FlakyStore::new(store));
        let ctx = ActorContext::new(flaky.clone(), clock).with_hydration(HydrationPolicy::FailOpen);
        let mut actor = RateLimiterActor::new("api", ctx);

        flaky.fail_reads(true);
        assert!(actor.check(RateParams::default()).await.unwrap().is_accepted());
        assert!(actor.is_hydrated());
    }

    #[tokio::test]
    async fn test_hydrates_only_once() {
        let (clock, store, _) = setup();
        let flaky = Arc::new(FlakyStore::new(store));
        let ctx = ActorContext::new(flaky.clone(), clock);
        let mut actor = RateLimiterActor::new("api", ctx);

        for _ in 0..5 {
            actor.check(RateParams::new(0)).await.unwrap();
        }
        assert_eq!(flaky.reads(), 1);
        assert_eq!(flaky.writes(), 5);
    }
}

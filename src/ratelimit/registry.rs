//! Key-to-actor dispatch.
//!
//! The registry maps every key to exactly one live actor and serializes the
//! operations sent to it. This per-key exclusion is the only thing that makes
//! check-and-increment atomic; there is no other lock around limiter state.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use super::actor::{ActorContext, Decision, LimiterActor};
use crate::error::{Result, TurnstileError};

/// A resolved reference to one actor.
///
/// Handles are cheap to clone. While any handle is alive the registry will
/// not evict the actor, so a key can never have two live instances.
pub struct ActorHandle<A: LimiterActor> {
    key: Arc<str>,
    instance: Uuid,
    actor: Arc<Mutex<A>>,
    last_used: Arc<AtomicI64>,
    ctx: ActorContext,
}

impl<A: LimiterActor> Clone for ActorHandle<A> {
    fn clone(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
            instance: self.instance,
            actor: Arc::clone(&self.actor),
            last_used: Arc::clone(&self.last_used),
            ctx: self.ctx.clone(),
        }
    }
}

impl<A: LimiterActor> ActorHandle<A> {
    fn provision(key: &str, ctx: ActorContext) -> Self {
        let instance = Uuid::new_v4();
        debug!(kind = A::KIND, key = %key, instance = %instance, "Provisioning limiter actor");
        Self {
            key: Arc::from(key),
            instance,
            actor: Arc::new(Mutex::new(A::new(key, ctx.clone()))),
            last_used: Arc::new(AtomicI64::new(ctx.clock.now_millis())),
            ctx,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Identifies this incarnation of the actor. A key keeps the same
    /// instance until it is evicted.
    pub fn instance(&self) -> Uuid {
        self.instance
    }

    /// Run one check on the actor.
    ///
    /// Calls queue in arrival order. Once a call holds the actor it runs to
    /// completion on its own task, even if the caller stops waiting; the
    /// caller must then treat the outcome as unknown.
    pub async fn check(&self, params: A::Params) -> Result<Decision> {
        let mut actor = Arc::clone(&self.actor).lock_owned().await;
        let last_used = Arc::clone(&self.last_used);
        let clock = Arc::clone(&self.ctx.clock);

        let operation = tokio::spawn(async move {
            let decision = actor.check(params).await;
            last_used.store(clock.now_millis(), Ordering::Relaxed);
            decision
        });

        operation
            .await
            .map_err(|e| TurnstileError::Internal(format!("limiter actor {} failed: {}", self.key, e)))?
    }

    /// Whether the actor has loaded its state yet. Waits for any in-flight
    /// operation.
    pub async fn is_hydrated(&self) -> bool {
        self.actor.lock().await.is_hydrated()
    }

    /// The registry's own copy is the only reference left.
    fn is_detached(&self) -> bool {
        Arc::strong_count(&self.actor) == 1
    }

    fn idle_for(&self, now: i64) -> i64 {
        now.saturating_sub(self.last_used.load(Ordering::Relaxed))
    }
}

/// Resolves keys to singleton actors of one kind.
pub struct ActorRegistry<A: LimiterActor> {
    ctx: ActorContext,
    actors: DashMap<String, ActorHandle<A>>,
}

impl<A: LimiterActor> ActorRegistry<A> {
    pub fn new(ctx: ActorContext) -> Self {
        Self {
            ctx,
            actors: DashMap::new(),
        }
    }

    /// Resolve `key` to its actor, provisioning one on first use.
    pub fn resolve(&self, key: &str) -> ActorHandle<A> {
        if let Some(handle) = self.actors.get(key) {
            return handle.value().clone();
        }
        self.actors
            .entry(key.to_string())
            .or_insert_with(|| ActorHandle::provision(key, self.ctx.clone()))
            .value()
            .clone()
    }

    /// Resolve and check in one step.
    pub async fn check(&self, key: &str, params: A::Params) -> Result<Decision> {
        self.resolve(key).check(params).await
    }

    /// Number of live actors.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.actors.contains_key(key)
    }

    /// Drop the actor for `key` if nobody holds a handle to it. Its state
    /// survives in the store and is re-hydrated on next use.
    pub fn evict(&self, key: &str) -> bool {
        let evicted = self
            .actors
            .remove_if(key, |_, handle| handle.is_detached())
            .is_some();
        if evicted {
            debug!(kind = A::KIND, key = %key, "Evicted limiter actor");
        }
        evicted
    }

    /// Drop every detached actor unused for at least `max_idle`.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = self.ctx.clock.now_millis();
        let max_idle = i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);
        let mut evicted = 0;

        self.actors.retain(|_, handle| {
            let keep = !handle.is_detached() || handle.idle_for(now) < max_idle;
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            debug!(kind = A::KIND, evicted = evicted, remaining = self.actors.len(), "Evicted idle limiter actors");
        } else {
            trace!(kind = A::KIND, "No idle limiter actors to evict");
        }
        evicted
    }
}

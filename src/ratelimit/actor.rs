//! The contract shared by every per-key limiter actor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::Result;
use crate::store::Store;

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Accepted,
    /// The request exceeds the limit. `retry_after` is the earliest time a
    /// retry could succeed, when known.
    Rejected { retry_after: Option<Duration> },
    /// The check parameters were invalid; no state was touched.
    Invalid,
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Rejected { .. })
    }

    /// HTTP status an adapter should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Decision::Accepted => 200,
            Decision::Rejected { .. } => 429,
            Decision::Invalid => 400,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Decision::Accepted => "ok",
            Decision::Rejected { .. } => "rate limit exceeded",
            Decision::Invalid => "invalid interval",
        }
    }

    /// JSON body an adapter should answer with, e.g. `{"status":"ok"}`.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({ "status": self.message() })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Rejected { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// What an actor does when its first store read fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationPolicy {
    /// Surface the error; the next call retries hydration.
    #[default]
    FailClosed,
    /// Start from empty state as if the key had never been seen.
    FailOpen,
}

/// Shared collaborators handed to every actor a registry provisions.
#[derive(Clone)]
pub struct ActorContext {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub hydration: HydrationPolicy,
}

impl ActorContext {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            hydration: HydrationPolicy::default(),
        }
    }

    pub fn with_hydration(mut self, hydration: HydrationPolicy) -> Self {
        self.hydration = hydration;
        self
    }
}

impl std::fmt::Debug for ActorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorContext")
            .field("hydration", &self.hydration)
            .finish()
    }
}

/// A per-key state machine.
///
/// The registry guarantees that at most one instance exists per key and that
/// `check` is never called concurrently on it, so implementations need no
/// locking of their own.
#[async_trait]
pub trait LimiterActor: Send + 'static {
    /// Parameters of a single check.
    type Params: Send + 'static;

    /// Short name used in logs and store keys.
    const KIND: &'static str;

    /// Build an unhydrated actor for `key`.
    fn new(key: &str, ctx: ActorContext) -> Self;

    /// Decide one request: hydrate if needed, decide, persist.
    async fn check(&mut self, params: Self::Params) -> Result<Decision>;

    /// Whether state has been loaded from the store.
    fn is_hydrated(&self) -> bool;
}

/// Store key of the record owned by a `kind` actor for `key`.
pub fn storage_key(kind: &str, key: &str) -> String {
    format!("{}:{}", kind, key)
}

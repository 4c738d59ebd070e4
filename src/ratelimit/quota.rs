//! Fixed-window quota limiter actor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::actor::{storage_key, ActorContext, Decision, HydrationPolicy, LimiterActor};
use super::window::{IntervalUnit, WindowSpec};
use crate::error::Result;
use crate::store::{load_json, save_json};

/// Parameters of a quota check: at most `limit` requests per `interval`
/// `interval_unit`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaParams {
    /// Requests allowed per window. Default 1.
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Window length in units. Default 1.
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// One of second, minute, hour, day, month, year. Default "second".
    #[serde(default = "default_interval_unit")]
    pub interval_unit: String,
}

fn default_limit() -> u64 {
    1
}

fn default_interval() -> u32 {
    1
}

fn default_interval_unit() -> String {
    IntervalUnit::Second.to_string()
}

impl Default for QuotaParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            interval: default_interval(),
            interval_unit: default_interval_unit(),
        }
    }
}

impl QuotaParams {
    pub fn new(limit: u64, interval: u32, interval_unit: impl Into<String>) -> Self {
        Self {
            limit,
            interval,
            interval_unit: interval_unit.into(),
        }
    }

    /// The window these parameters describe, or `None` if the unit is not
    /// recognised or the interval is zero.
    pub fn window(&self) -> Option<WindowSpec> {
        let unit = self.interval_unit.parse::<IntervalUnit>().ok()?;
        WindowSpec::new(unit, self.interval)
    }
}

/// Persisted quota record. Both fields are always written together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    /// Key of the bucket `counter` belongs to.
    pub window_key: String,
    /// Attempts seen in that bucket, rejected ones included.
    pub counter: u64,
}

/// Counts requests per fixed window for one key.
pub struct QuotaLimiterActor {
    key: String,
    storage_key: String,
    ctx: ActorContext,
    state: Option<QuotaState>,
}

impl QuotaLimiterActor {
    /// The in-memory copy of the record, if hydrated.
    pub fn state(&self) -> Option<&QuotaState> {
        self.state.as_ref()
    }

    async fn hydrate(&mut self) -> Result<QuotaState> {
        if let Some(state) = &self.state {
            return Ok(state.clone());
        }

        let state = match load_json::<QuotaState>(self.ctx.store.as_ref(), &self.storage_key).await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) if self.ctx.hydration == HydrationPolicy::FailOpen => {
                warn!(key = %self.key, error = %e, "Quota limiter hydration failed, starting empty");
                QuotaState::default()
            }
            Err(e) => return Err(e.into()),
        };

        debug!(
            key = %self.key,
            window = %state.window_key,
            counter = state.counter,
            "Quota limiter hydrated"
        );
        self.state = Some(state.clone());
        Ok(state)
    }
}

#[async_trait]
impl LimiterActor for QuotaLimiterActor {
    type Params = QuotaParams;

    const KIND: &'static str = "quota";

    fn new(key: &str, ctx: ActorContext) -> Self {
        Self {
            key: key.to_string(),
            storage_key: storage_key(Self::KIND, key),
            ctx,
            state: None,
        }
    }

    async fn check(&mut self, params: QuotaParams) -> Result<Decision> {
        let Some(window) = params.window() else {
            debug!(
                key = %self.key,
                interval = params.interval,
                interval_unit = %params.interval_unit,
                "Invalid quota interval"
            );
            return Ok(Decision::Invalid);
        };

        let mut state = self.hydrate().await?;
        let now = self.ctx.clock.now();
        let window_key = window.window_key(now);

        if state.window_key != window_key {
            trace!(key = %self.key, from = %state.window_key, to = %window_key, "Quota window rolled over");
            state = QuotaState {
                window_key,
                counter: 0,
            };
        }
        state.counter = state.counter.saturating_add(1);

        trace!(
            key = %self.key,
            window = %state.window_key,
            counter = state.counter,
            limit = params.limit,
            "Checking quota"
        );

        // Rejected attempts are recorded too, so a rebuilt actor never
        // undercounts the window.
        save_json(self.ctx.store.as_ref(), &self.storage_key, &state, window.record_ttl(now)).await?;
        let over_limit = state.counter > params.limit;
        self.state = Some(state);

        if over_limit {
            debug!(key = %self.key, limit = params.limit, "Quota exceeded");
            let retry_after = window
                .bucket_end(now)
                .and_then(|end| (end - now).to_std().ok());
            return Ok(Decision::Rejected { retry_after });
        }

        Ok(Decision::Accepted)
    }

    fn is_hydrated(&self) -> bool {
        self.state.is_some()
    }
}

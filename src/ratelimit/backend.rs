//! Limiter backend trait for abstracting the service's decision source.

use async_trait::async_trait;

use super::actor::Decision;
use super::key::LimiterKey;
use super::quota::QuotaParams;
use super::rate::RateParams;
use crate::error::Result;

/// Trait for limiter implementations.
///
/// The gRPC service is written against this trait so it can be exercised
/// with substitute backends.
#[async_trait]
pub trait LimiterBackend: Send + Sync {
    /// Enforce a minimum gap between accepted requests for `key`.
    async fn check_rate(&self, key: &LimiterKey, params: RateParams) -> Result<Decision>;

    /// Enforce a fixed-window request quota for `key`.
    async fn check_quota(&self, key: &LimiterKey, params: QuotaParams) -> Result<Decision>;
}

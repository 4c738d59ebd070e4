//! Limiter service implementation.

use std::net::IpAddr;
use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument, warn};

use super::proto::limiter_service_server::LimiterService;
use super::proto::{CheckQuotaRequest, CheckRateRequest, CheckResponse, Code};
use crate::ratelimit::{Decision, LimiterBackend, LimiterKey, QuotaParams, RateParams};

/// Implementation of the `turnstile.v1.LimiterService` gRPC interface.
pub struct LimiterServiceImpl<B: LimiterBackend> {
    /// The limiter backend
    backend: Arc<B>,
}

impl<B: LimiterBackend> LimiterServiceImpl<B> {
    /// Create a new LimiterServiceImpl with the given backend.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

/// Compose the limiter key from the request's base key and scope.
fn compose_key(key: &str, user_id: Option<&str>, client_ip: Option<&str>) -> Result<LimiterKey, Status> {
    if key.is_empty() {
        warn!("Received limiter request with empty key");
        return Err(Status::invalid_argument("key is required"));
    }

    match (user_id, client_ip) {
        (Some(_), Some(_)) => {
            warn!(key = %key, "Received limiter request scoped to both user and client address");
            Err(Status::invalid_argument(
                "user_id and client_ip are mutually exclusive",
            ))
        }
        (Some(user_id), None) => Ok(LimiterKey::per_user(key, user_id)),
        (None, Some(client_ip)) => {
            let ip: IpAddr = client_ip.parse().map_err(|_| {
                warn!(key = %key, client_ip = %client_ip, "Received unparsable client address");
                Status::invalid_argument("client_ip is not a valid IP address")
            })?;
            Ok(LimiterKey::per_ip(key, ip))
        }
        (None, None) => Ok(LimiterKey::global(key)),
    }
}

/// Map a limiter outcome onto the wire. Backend failures become `INTERNAL`
/// so the protected route fails closed.
fn into_response(key: &LimiterKey, outcome: crate::error::Result<Decision>) -> Result<Response<CheckResponse>, Status> {
    let decision = outcome.map_err(|e| {
        error!(key = %key, error = %e, "Limiter check failed");
        Status::internal("limiter unavailable")
    })?;

    let code = match decision {
        Decision::Accepted => Code::Ok,
        Decision::Rejected { .. } => Code::OverLimit,
        Decision::Invalid => Code::Invalid,
    };

    let retry_after = decision.retry_after().map(|wait| prost_types::Duration {
        seconds: wait.as_secs() as i64,
        nanos: wait.subsec_nanos() as i32,
    });

    info!(key = %key, code = ?code, "Limiter decision made");

    Ok(Response::new(CheckResponse {
        code: code.into(),
        status: decision.message().to_string(),
        http_status: u32::from(decision.http_status()),
        body: decision.body().to_string(),
        retry_after,
    }))
}

#[tonic::async_trait]
impl<B: LimiterBackend + 'static> LimiterService for LimiterServiceImpl<B> {
    #[instrument(skip(self, request), fields(key = %request.get_ref().key))]
    async fn check_rate(
        &self,
        request: Request<CheckRateRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let req = request.into_inner();
        let key = compose_key(&req.key, req.user_id.as_deref(), req.client_ip.as_deref())?;
        let params = req.rate_ms.map(RateParams::new).unwrap_or_default();

        debug!(key = %key, rate_ms = params.rate_ms, "Processing rate check");

        let outcome = self.backend.check_rate(&key, params).await;
        into_response(&key, outcome)
    }

    #[instrument(skip(self, request), fields(key = %request.get_ref().key))]
    async fn check_quota(
        &self,
        request: Request<CheckQuotaRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let req = request.into_inner();
        let key = compose_key(&req.key, req.user_id.as_deref(), req.client_ip.as_deref())?;

        let defaults = QuotaParams::default();
        let params = QuotaParams {
            limit: req.limit.unwrap_or(defaults.limit),
            interval: req.interval.unwrap_or(defaults.interval),
            interval_unit: req.interval_unit.unwrap_or(defaults.interval_unit),
        };

        debug!(
            key = %key,
            limit = params.limit,
            interval = params.interval,
            interval_unit = %params.interval_unit,
            "Processing quota check"
        );

        let outcome = self.backend.check_quota(&key, params).await;
        into_response(&key, outcome)
    }
}

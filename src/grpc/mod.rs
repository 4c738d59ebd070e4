//! gRPC surface through which gateway adapters reach the limiters.

pub mod proto;
mod server;
mod service;

pub use server::GrpcServer;
pub use service::LimiterServiceImpl;

// Re-export commonly used types
pub use proto::{
    limiter_service_client::LimiterServiceClient, limiter_service_server::LimiterServiceServer,
    CheckQuotaRequest, CheckRateRequest, CheckResponse, Code,
};

//! gRPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::limiter_service_server::LimiterServiceServer;
use super::service::LimiterServiceImpl;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::LimiterBackend;

/// gRPC server for the limiter service.
pub struct GrpcServer<B: LimiterBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The limiter backend
    backend: Arc<B>,
}

impl<B: LimiterBackend + 'static> GrpcServer<B> {
    /// Create a new gRPC server over the given backend.
    pub fn new(addr: SocketAddr, backend: Arc<B>) -> Self {
        Self { addr, backend }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the gRPC server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already-bound listener until `signal` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let service = LimiterServiceImpl::new(self.backend);
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            "Starting gRPC server for LimiterService"
        );

        Server::builder()
            .add_service(LimiterServiceServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                TurnstileError::Grpc(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grpc::proto::limiter_service_client::LimiterServiceClient;
    use crate::grpc::proto::{CheckQuotaRequest, CheckRateRequest, Code};
    use crate::ratelimit::Limiter;
    use tokio::sync::oneshot;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let server = GrpcServer::new(addr, Arc::new(Limiter::in_memory()));
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = GrpcServer::new(addr, Arc::new(Limiter::in_memory()));
        let serving = tokio::spawn(server.serve_on(listener, async move {
            let _ = stop_rx.await;
        }));

        let mut client = LimiterServiceClient::connect(format!("http://{}", addr))
            .await
            .unwrap();

        let rate = CheckRateRequest {
            key: "api".to_string(),
            rate_ms: Some(60_000),
            ..Default::default()
        };
        let first = client.check_rate(rate.clone()).await.unwrap().into_inner();
        let second = client.check_rate(rate).await.unwrap().into_inner();
        assert_eq!(first.code(), Code::Ok);
        assert_eq!(second.code(), Code::OverLimit);
        assert!(second.retry_after.is_some());

        let quota = CheckQuotaRequest {
            key: "api".to_string(),
            interval_unit: Some("fortnight".to_string()),
            ..Default::default()
        };
        let invalid = client.check_quota(quota).await.unwrap().into_inner();
        assert_eq!(invalid.code(), Code::Invalid);
        assert_eq!(invalid.http_status, 400);

        let empty = client.check_rate(CheckRateRequest::default()).await;
        assert_eq!(empty.unwrap_err().code(), tonic::Code::InvalidArgument);

        stop_tx.send(()).unwrap();
        serving.await.unwrap().unwrap();
    }
}

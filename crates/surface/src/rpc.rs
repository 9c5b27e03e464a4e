//! The RPC surface: a streaming-capable remote call server. The generated
//! `AgentRpc` service multiplexes opaque frames; a hosted agent's own
//! logic lives behind whatever `AgentRpc` implementation the binary links
//! in (see [`crate::handlers::AgentHandlers`]).

#![allow(clippy::all)]

pub mod control {
    tonic::include_proto!("agentrt.surface.v1");
}

pub use control::agent_rpc_server::{AgentRpc, AgentRpcServer};
pub use control::Frame;

use futures_util::Stream;
use std::pin::Pin;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, Status>> + Send + 'static>>;

/// Passthrough implementation used by the reference runtime binary and by
/// integration tests: every inbound frame is echoed back unmodified. Real
/// agents link their own `AgentRpc` implementation instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoRpc;

#[tonic::async_trait]
impl AgentRpc for EchoRpc {
    type InvokeStream = FrameStream;

    async fn invoke(&self, request: Request<Streaming<Frame>>) -> Result<Response<Self::InvokeStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = tokio::sync::mpsc::channel(16);

        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(frame)) => {
                        if tx.send(Ok(frame)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        let _ = tx.send(Err(status)).await;
                        break;
                    }
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

/// Lets a trait object be mounted the same way a concrete type would be,
/// so [`crate::handlers::AgentHandlers`] can hand back `Arc<dyn AgentRpc<..>>`.
#[tonic::async_trait]
impl AgentRpc for std::sync::Arc<dyn AgentRpc<InvokeStream = FrameStream>> {
    type InvokeStream = FrameStream;

    async fn invoke(&self, request: Request<Streaming<Frame>>) -> Result<Response<Self::InvokeStream>, Status> {
        self.as_ref().invoke(request).await
    }
}

/// Serves `service` on `port` until `shutdown` is cancelled. In-flight
/// streaming calls are allowed to drain up to tonic's own graceful
/// shutdown grace, matching the host's `gracefulShutdownTimeout` budget.
pub async fn serve<T>(
    service: AgentRpcServer<T>,
    port: u16,
    shutdown: tokio_util::sync::CancellationToken,
) -> std::io::Result<tokio::task::JoinHandle<()>>
where
    T: AgentRpc,
{
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(port, "RPC surface bound");
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

    let handle = tokio::spawn(async move {
        let result = tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(incoming, async move {
                shutdown.cancelled().await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!("RPC surface exited with error: {e}");
        }
    });

    Ok(handle)
}

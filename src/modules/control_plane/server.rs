//! HTTP/1 server for the control plane.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::modules::relay::Relay;

use super::config::ControlPlaneConfig;
use super::error::{ControlPlaneError, ControlPlaneResult};
use super::handler;
use super::response::{self, ApiResponse};

/// Control plane HTTP server bound to a relay.
#[derive(Debug)]
pub struct ControlPlane {
    listener: TcpListener,
    local_addr: SocketAddr,
    relay: Arc<Relay>,
    max_body_size: usize,
}

impl ControlPlane {
    /// Bind the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Bind`] if the address cannot be bound.
    pub async fn bind(config: &ControlPlaneConfig, relay: Arc<Relay>) -> ControlPlaneResult<Self> {
        let address = config.listen_addr;
        let bind_error = |source| ControlPlaneError::Bind { address, source };

        let listener = TcpListener::bind(address).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        Ok(Self {
            listener,
            local_addr,
            relay,
            max_body_size: config.max_body_size,
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; accept errors are logged.
    pub async fn serve(self, shutdown: CancellationToken) -> ControlPlaneResult<()> {
        info!(address = %self.local_addr, "Control plane listening");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Control plane shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, remote_addr)) => {
                            debug!(%remote_addr, "New control plane connection");

                            let relay = Arc::clone(&self.relay);
                            let max_body_size = self.max_body_size;
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let relay = Arc::clone(&relay);
                                    async move { handle_request(req, &relay, max_body_size).await }
                                });

                                let connection = http1::Builder::new().serve_connection(io, service);
                                tokio::pin!(connection);

                                tokio::select! {
                                    result = connection.as_mut() => {
                                        if let Err(e) = result {
                                            debug!(%remote_addr, "Connection error: {e}");
                                        }
                                    }
                                    () = shutdown.cancelled() => {
                                        connection.as_mut().graceful_shutdown();
                                        let _ = connection.as_mut().await;
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {e}");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_request(
    req: Request<Incoming>,
    relay: &Relay,
    max_body_size: usize,
) -> Result<ApiResponse, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, max_body_size).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return Ok(response::error(&ControlPlaneError::Body(e.to_string()))),
    };

    Ok(handler::dispatch(relay, &parts.method, parts.uri.path(), body).await)
}

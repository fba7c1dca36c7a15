use anyhow::Result;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Liveness and readiness state shared with the file_sd writer.
///
/// Ready means at least one snapshot has been written to disk.
#[derive(Clone, Default)]
pub struct HealthServer {
    ready: Arc<AtomicBool>,
}

impl HealthServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        let was_ready = self.ready.swap(ready, Ordering::SeqCst);
        if ready && !was_ready {
            info!("First snapshot written, marked as ready");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Serves `/healthz` and `/readyz` until `cancel` fires.
    pub async fn serve(
        self,
        port: u16,
        listening: tokio::sync::oneshot::Sender<SocketAddr>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        let addr = listener.local_addr()?;

        info!(
            address = %addr,
            liveness_endpoint = "/healthz",
            readiness_endpoint = "/readyz",
            "Health check server started"
        );

        let _ = listening.send(addr);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let server = server.clone();
                    async move { Ok::<_, hyper::Error>(server.route(&req)) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(peer = %peer_addr, error = %e, "Error serving connection");
                }
            });
        }

        info!("Health check server stopped");
        Ok(())
    }

    fn route<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        debug!(
            method = %req.method(),
            path = %req.uri().path(),
            "Received health check request"
        );

        match req.uri().path() {
            "/healthz" | "/health" => respond(StatusCode::OK, "ok"),
            "/readyz" | "/ready" if self.is_ready() => respond(StatusCode::OK, "ready"),
            "/readyz" | "/ready" => respond(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
            _ => respond(StatusCode::NOT_FOUND, "Not Found"),
        }
    }
}

fn respond(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

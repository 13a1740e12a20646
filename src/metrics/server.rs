//! Metrics Server
//!
//! Serves the registry in the Prometheus text exposition format over
//! HTTP/1.1. One task per connection; the accept loop stops when the
//! shutdown token is cancelled.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::MetricsRegistry;
use crate::error::Result;

/// A bound, not yet serving, metrics endpoint.
pub struct MetricsServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl MetricsServer {
    /// Binds the listener. Port `0` picks a free port, see [`Self::local_addr`].
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` is cancelled.
    pub async fn serve(
        self,
        metrics: Arc<MetricsRegistry>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!("Metrics server listening on {}", self.local_addr);

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Metrics server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted?,
            };
            debug!(%peer, "Accepted metrics connection");

            let io = TokioIo::new(stream);
            let metrics = metrics.clone();

            tokio::spawn(async move {
                let svc = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let response = route(req.method(), req.uri().path(), &metrics);
                    async move { Ok::<_, Infallible>(response) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                    warn!(%peer, "Metrics server connection error: {}", e);
                }
            });
        }
    }
}

fn route(method: &Method, path: &str, metrics: &MetricsRegistry) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => {
            let encoder = TextEncoder::new();
            match metrics.encode_with(&encoder) {
                Ok(body) => {
                    let mut response = text_response(StatusCode::OK, body);
                    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
                        response.headers_mut().insert(CONTENT_TYPE, content_type);
                    }
                    response
                }
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            }
        }
        (&Method::GET, "/healthz" | "/livez" | "/readyz") => text_response(StatusCode::OK, "ok"),
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::time::Duration;

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.batch.set_txn_count("eft", 9752395.0);

        let response = route(&Method::GET, "/metrics", &metrics);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            TextEncoder::new().format_type()
        );
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; version=0.0.4"
        );
        assert!(body_text(response)
            .await
            .contains(r#"txn_count{batch="eft"} 9752395"#));
    }

    #[tokio::test]
    async fn test_health_routes() {
        let metrics = MetricsRegistry::new().unwrap();
        for path in ["/healthz", "/livez", "/readyz"] {
            let response = route(&Method::GET, path, &metrics);
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_text(response).await, "ok");
        }
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let metrics = MetricsRegistry::new().unwrap();
        assert_eq!(
            route(&Method::GET, "/nope", &metrics).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            route(&Method::POST, "/metrics", &metrics).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let server = MetricsServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_ne!(server.local_addr().port(), 0);

        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.serve(metrics, shutdown.clone()));

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}

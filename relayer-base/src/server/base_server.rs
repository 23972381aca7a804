use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use derive_new::new;
use prometheus::{Encoder, TextEncoder};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::CoreMetrics;

/// HTTP server of an agent: `/metrics`, `/health` and whatever routes the
/// agent adds on top.
#[derive(new, Debug)]
pub struct Server {
    listen_port: u16,
    core_metrics: Arc<CoreMetrics>,
}

impl Server {
    /// Serve the built-in routes only.
    pub fn run(self: Arc<Self>) -> JoinHandle<()> {
        self.run_with_custom_router(Router::new())
    }

    /// Serve the built-in routes merged with `router` on all interfaces.
    pub fn run_with_custom_router(self: Arc<Self>, router: Router) -> JoinHandle<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.listen_port));
        let app = self.router().merge(router);

        tokio::spawn(async move {
            let listener = match TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(err) => {
                    error!(?err, %addr, "Failed to bind to TCP port");
                    return;
                }
            };
            info!(%addr, "Serving HTTP");
            if let Err(err) = axum::serve(listener, app).await {
                error!(?err, "Server exited with an error");
            }
            warn!("Server exited early");
        })
    }

    /// The built-in routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(gather_metrics))
            .route("/health", get(|| async { StatusCode::OK }))
            .with_state(self.core_metrics.clone())
    }
}

/// Every registered metric in the Prometheus text format.
async fn gather_metrics(State(core_metrics): State<Arc<CoreMetrics>>) -> Response {
    debug!("Gathering metrics");
    match core_metrics.gather() {
        Ok(metrics) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_owned())],
            metrics,
        )
            .into_response(),
        Err(err) => {
            error!(?err, "Failed to gather metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use prometheus::{IntCounter, Registry};
    use tower::ServiceExt;

    use super::*;

    fn server() -> (Server, IntCounter) {
        let registry = Registry::new();
        let counter = IntCounter::new("vaas_seen_total", "test").unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        let metrics = CoreMetrics::new("relayer", 9090, registry).unwrap();
        (Server::new(9090, Arc::new(metrics)), counter)
    }

    #[tokio::test]
    async fn serves_metrics() {
        let (server, counter) = server();
        counter.inc_by(3);

        let response = server
            .router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("vaas_seen_total 3"));
    }

    #[tokio::test]
    async fn health() {
        let (server, _) = server();
        let response = server
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

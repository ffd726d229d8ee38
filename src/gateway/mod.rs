#![allow(clippy::needless_for_each)]

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderName, HeaderValue, Request},
    routing::get,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use rustls::ServerConfig;
use std::{
    future::Future,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, debug, info, info_span, warn};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod error;
pub mod handlers;
pub mod oracle;
pub mod proof;
pub mod protocol;
pub mod store;
pub mod token;

pub use error::GatewayError;
pub use oracle::{ProcessTableOracle, RetryPolicy, SessionOracle};
pub use proof::ProofDirectory;
pub use protocol::{Gateway, GatewayConfig, RequestTokenGrant, SessionTokenGrant};

#[derive(OpenApi)]
#[openapi(
    paths(handlers::tokens::tokens, handlers::auth::auth, handlers::health::health),
    components(
        schemas(handlers::health::Health, RequestTokenGrant, SessionTokenGrant)
    ),
    tags(
        (name = "sessiongate", description = "Request token, session token and session token validation"),
        (name = "health", description = "Service status"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the application router around a shared [`Gateway`].
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", get(handlers::tokens).post(handlers::auth))
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(gateway)),
        )
}

/// Start the server
///
/// Prepares the authorization directory, binds `127.0.0.1:<port>` and serves
/// until `shutdown` resolves.
///
/// # Errors
/// Return error if the authorization directory cannot be prepared or the
/// socket cannot be bound.
pub async fn new(
    port: u16,
    config: GatewayConfig,
    oracle: Arc<dyn SessionOracle>,
    proofs: ProofDirectory,
    tls: Option<ServerConfig>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    proofs.prepare()?;

    let gateway = Arc::new(Gateway::new(config, oracle, proofs));
    let app = router(gateway);

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
        .await
        .with_context(|| format!("Failed to bind 127.0.0.1:{port}"))?;

    let scheme = if tls.is_some() { "https" } else { "http" };
    info!("Listening on {scheme}://127.0.0.1:{port}");

    serve(listener, app, tls.map(Arc::new), shutdown).await
}

/// Serve `app` on an already bound listener, over TLS when `tls` is set.
///
/// # Errors
/// Returns an error if the plain HTTP server fails.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    tls: Option<Arc<ServerConfig>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let Some(tls) = tls else {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Gracefully shutdown");
        })
        .await?;
        return Ok(());
    };

    let acceptor = TlsAcceptor::from(tls);
    tokio::pin!(shutdown);

    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(err) => {
                    warn!("Failed to accept connection: {err}");
                    continue;
                }
            },
            () = &mut shutdown => {
                info!("Gracefully shutdown");
                return Ok(());
            }
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(err) => {
                    debug!(%remote_addr, "TLS handshake failed: {err}");
                    return;
                }
            };

            let service = app.map_request(move |mut request: Request<Incoming>| {
                request.extensions_mut().insert(ConnectInfo(remote_addr));
                request
            });

            if let Err(err) = auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(
                    TokioIo::new(stream),
                    TowerToHyperService::new(service),
                )
                .await
            {
                debug!(%remote_addr, "Connection closed with error: {err}");
            }
        });
    }
}

/// Resolve on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.to_string());

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.path = request.uri().path(),
        client,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::protocol::tests::{FakeOracle, test_config, test_proofs};
    use axum::http::StatusCode;

    fn app() -> anyhow::Result<Router> {
        Ok(router(Arc::new(Gateway::new(
            test_config(),
            Arc::new(FakeOracle::with_session("alice", "sess1")),
            test_proofs()?,
        ))))
    }

    #[test]
    fn openapi_documents_routes() {
        let doc = openapi();
        assert!(doc.paths.paths.contains_key("/"));
        assert!(doc.paths.paths.contains_key("/health"));
        let root = &doc.paths.paths["/"];
        assert!(root.get.is_some());
        assert!(root.post.is_some());
    }

    #[tokio::test]
    async fn router_sets_request_id() -> anyhow::Result<()> {
        let response = app()?
            .oneshot(Request::builder().uri("/health").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(Ulid::from_string(request_id).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn router_keeps_caller_request_id() -> anyhow::Result<()> {
        let response = app()?
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "caller-id")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(
            response.headers().get("x-request-id").map(|v| v.as_bytes()),
            Some(&b"caller-id"[..])
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() -> anyhow::Result<()> {
        let response = app()?
            .oneshot(Request::builder().uri("/other").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() -> anyhow::Result<()> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(serve(listener, app()?, None, async move {
            let _ = rx.await;
        }));

        let _ = tx.send(());
        handle.await??;
        Ok(())
    }
}

//! HTTP transport binding.
//!
//! Every path is routed to one catch-all handler that turns the axum
//! request into an [`InboundRequest`] and hands it to the
//! [`RequestHandler`]. Path dispatch is the application's business.

use std::collections::HashMap;
use std::future::{Future, IntoFuture};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, Uri},
    response::Response,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::error::Error;
use crate::handler::{InboundRequest, RequestHandler};

/// Create the router that sends every request to `handler`.
pub fn create_router(handler: RequestHandler) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

async fn dispatch(
    State(handler): State<RequestHandler>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = InboundRequest {
        form: form_values(uri.query(), &headers, &body),
        session_token: handler.session_token(&headers),
        method,
        path: uri.path().to_string(),
    };
    handler.handle(request)
}

/// Merge query-string and urlencoded body parameters.
///
/// The first occurrence of a name wins within each source; body values
/// win over query values.
fn form_values(query: Option<&str>, headers: &HeaderMap, body: &[u8]) -> HashMap<String, String> {
    let mut form = first_values(query.unwrap_or("").as_bytes());

    let is_urlencoded = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    if is_urlencoded {
        form.extend(first_values(body));
    }
    form
}

fn first_values(input: &[u8]) -> HashMap<String, String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(input).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "ignoring malformed parameters");
        Vec::new()
    });

    let mut values = HashMap::new();
    for (name, value) in pairs {
        values.entry(name).or_insert(value);
    }
    values
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Finish in-flight requests on shutdown.
    pub graceful_shutdown: bool,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            graceful_shutdown: true,
        }
    }

    pub fn without_graceful_shutdown(mut self) -> Self {
        self.graceful_shutdown = false;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 8080)
    }
}

/// Start the server and run until Ctrl-C.
pub async fn serve(config: ServerConfig, handler: RequestHandler) -> crate::Result<()> {
    serve_with_shutdown(config, handler, ctrl_c()).await
}

/// Start the server and run until `signal` resolves.
pub async fn serve_with_shutdown<F>(
    config: ServerConfig,
    handler: RequestHandler,
    signal: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.bind_address();
    let router = create_router(handler);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(Error::Io)?;

    tracing::info!("Starting plainweb server on {}", addr);

    if config.graceful_shutdown {
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, router).into_future() => {
                result?;
            }
            _ = signal => {}
        }
    }

    tracing::info!("plainweb server stopped");
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

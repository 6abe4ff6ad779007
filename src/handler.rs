//! Request lifecycle orchestration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};

use crate::context::RequestContext;
use crate::resolver::resolve;
use crate::session::SessionStore;
use crate::template::{TemplateRenderer, Templates};
use crate::Result;

/// Default name of the cookie carrying the session identifier.
pub const DEFAULT_COOKIE_NAME: &str = "PLAINWEB_SESSION_ID";

/// Templates used by [`RequestHandler::with_defaults`], relative to the working directory.
pub const DEFAULT_TEMPLATE_PATTERN: &str = "*.html";

/// Application callback invoked once per request.
pub type ServeFn = dyn Fn(&mut RequestContext) -> Result<()> + Send + Sync;

/// Transport-neutral view of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Request method.
    pub method: Method,
    /// URL path.
    pub path: String,
    /// Query and form parameters, form body winning on conflicts.
    pub form: HashMap<String, String>,
    /// Session token the client presented, if any.
    pub session_token: Option<String>,
}

impl InboundRequest {
    /// Create a request without parameters or session token.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    /// Add a parameter.
    pub fn with_form_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    /// Present a session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

/// Entry point that runs one request through the application callback.
///
/// Cheap to clone; clones share the store, renderer and callback.
#[derive(Clone)]
pub struct RequestHandler {
    serve: Arc<ServeFn>,
    store: Arc<SessionStore>,
    renderer: Arc<dyn TemplateRenderer>,
    cookie_name: String,
}

impl RequestHandler {
    /// Create a handler from a callback, a session store and a renderer.
    pub fn new<F>(serve: F, store: Arc<SessionStore>, renderer: Arc<dyn TemplateRenderer>) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            serve: Arc::new(serve),
            store,
            renderer,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }

    /// Create a handler with a fresh in-memory store and the templates
    /// matching `*.html`, re-read on every render.
    pub fn with_defaults<F>(serve: F) -> Result<Self>
    where
        F: Fn(&mut RequestContext) -> Result<()> + Send + Sync + 'static,
    {
        let templates = Templates::from_glob(DEFAULT_TEMPLATE_PATTERN)?.with_reload(true);
        Ok(Self::new(
            serve,
            Arc::new(SessionStore::new()),
            Arc::new(templates),
        ))
    }

    /// Use a different session cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Session cookie name.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// The shared session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Run one request: sweep, build the context, call back, resolve, emit.
    pub fn handle(&self, request: InboundRequest) -> Response {
        let started = Instant::now();
        let method = request.method.clone();
        let path = request.path.clone();
        tracing::debug!(%method, path = %path, "request");

        let response = match self.run(request) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(%method, path = %path, error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    StatusCode::INTERNAL_SERVER_ERROR
                        .canonical_reason()
                        .unwrap_or_default()
                        .to_string(),
                )
                    .into_response()
            }
        };

        tracing::info!(
            %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed = started.elapsed().as_secs_f64(),
            "served"
        );
        response
    }

    fn run(&self, request: InboundRequest) -> Result<Response> {
        self.store.expire_sessions()?;

        let mut ctx = RequestContext::new(
            request.method,
            request.path,
            request.form,
            Arc::clone(&self.store),
            request.session_token,
        )?;

        (self.serve)(&mut ctx)?;

        let mut response = resolve(&ctx).into_response(self.renderer.as_ref())?;

        if let Some(sid) = ctx.minted_session_id() {
            self.set_cookie(response.headers_mut(), &format!("{sid}; Path=/; HttpOnly"));
        } else if ctx.session_killed() {
            self.set_cookie(response.headers_mut(), "; Path=/; HttpOnly; Max-Age=0");
        }

        Ok(response)
    }

    fn set_cookie(&self, headers: &mut HeaderMap, rest: &str) {
        match HeaderValue::try_from(format!("{}={rest}", self.cookie_name)) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "invalid session cookie"),
        }
    }

    /// Pull this handler's session token out of request headers.
    pub fn session_token(&self, headers: &HeaderMap) -> Option<String> {
        session_token(headers, &self.cookie_name)
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("cookie_name", &self.cookie_name)
            .field("sessions", &self.store.count().ok())
            .finish_non_exhaustive()
    }
}

/// Find the cookie `name` in any `Cookie` header.
pub fn session_token(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

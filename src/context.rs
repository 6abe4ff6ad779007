//! Per-request state container.
//!
//! A [`RequestContext`] is built once per inbound request. It exposes the
//! read-only request inputs, accumulates a template model, holds the one
//! response directive the application picks, and routes session reads and
//! writes through the shared [`SessionStore`] using the request's current
//! session identifier.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::Value;

use crate::session::SessionStore;
use crate::Result;

/// Named values handed to the template renderer.
pub type Model = BTreeMap<String, Value>;

/// State of one request while the application callback runs.
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    path: String,
    form: HashMap<String, String>,
    store: Arc<SessionStore>,
    initial_sid: String,
    sid: String,
    killed: bool,
    model: Model,
    html: Option<String>,
    template: Option<String>,
    redirect: Option<String>,
    status: Option<StatusCode>,
}

impl RequestContext {
    /// Build a context for an inbound request.
    ///
    /// A presented session token is touched but not validated; if it names
    /// no live session, later reads simply find nothing.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        form: HashMap<String, String>,
        store: Arc<SessionStore>,
        session_token: Option<String>,
    ) -> Result<Self> {
        let sid = session_token.unwrap_or_default();
        if !sid.is_empty() {
            store.touch_session(&sid)?;
        }

        Ok(Self {
            method,
            path: path.into(),
            form,
            store,
            initial_sid: sid.clone(),
            sid,
            killed: false,
            model: Model::new(),
            html: None,
            template: None,
            redirect: None,
            status: None,
        })
    }

    /// Build a context backed by its own private store, without a session.
    ///
    /// Lets application callbacks be exercised without a server.
    pub fn stub(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            form: HashMap::new(),
            store: Arc::new(SessionStore::new()),
            initial_sid: String::new(),
            sid: String::new(),
            killed: false,
            model: Model::new(),
            html: None,
            template: None,
            redirect: None,
            status: None,
        }
    }

    /// Add a form value (builder style, for stubs).
    pub fn with_form_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Whether the request method is GET.
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Whether the request method is POST.
    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }

    /// URL path of the request.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// A request parameter, or the empty string if it was not sent.
    pub fn form_value(&self, name: &str) -> &str {
        self.form.get(name).map(String::as_str).unwrap_or("")
    }

    /// All request parameters.
    pub fn form_values(&self) -> &HashMap<String, String> {
        &self.form
    }

    /// Put a named value into the template model, replacing any previous one.
    pub fn set_model_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.model.insert(key.into(), value.into());
    }

    /// A named model value.
    pub fn model_value(&self, key: &str) -> Option<&Value> {
        self.model.get(key)
    }

    /// The whole model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Respond with a raw HTML body.
    pub fn set_html(&mut self, html: impl Into<String>) {
        self.html = Some(html.into());
    }

    /// Respond by rendering the named template against the model.
    pub fn set_template(&mut self, name: impl Into<String>) {
        self.template = Some(name.into());
    }

    /// Respond with a redirect.
    pub fn set_redirect(&mut self, url: impl Into<String>) {
        self.redirect = Some(url.into());
    }

    /// Respond with a bare status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Raw body, if set.
    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    /// Template name, if set.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Redirect target, if set.
    pub fn redirect(&self) -> Option<&str> {
        self.redirect.as_deref()
    }

    /// Explicit status, if set.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Put a value into this request's session, creating the session if needed.
    pub fn set_session_value(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let sid = self.store.put_value(&self.sid, key, value)?;
        if sid != self.sid {
            tracing::debug!(path = %self.path, "request started a new session");
            self.sid = sid;
        }
        Ok(())
    }

    /// A value from this request's session, or `None` if there is none.
    pub fn session_value(&self, key: &str) -> Result<Option<String>> {
        if self.sid.is_empty() {
            return Ok(None);
        }
        self.store.get_value(&self.sid, key)
    }

    /// Kill this request's session. The request has no session afterwards.
    pub fn kill_session(&mut self) -> Result<()> {
        if !self.sid.is_empty() {
            self.store.kill_session(&self.sid)?;
            self.sid.clear();
        }
        self.killed = true;
        Ok(())
    }

    /// Current session identifier; empty when the request has no session.
    pub fn session_id(&self) -> &str {
        &self.sid
    }

    /// The identifier minted during this request, if any.
    ///
    /// When set, the client has to be handed the new identifier.
    pub fn minted_session_id(&self) -> Option<&str> {
        if !self.sid.is_empty() && self.sid != self.initial_sid {
            Some(&self.sid)
        } else {
            None
        }
    }

    /// Whether the session was killed and not replaced during this request.
    pub fn session_killed(&self) -> bool {
        self.killed && self.sid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(store: &Arc<SessionStore>, token: Option<&str>) -> RequestContext {
        RequestContext::new(
            Method::GET,
            "/",
            HashMap::new(),
            Arc::clone(store),
            token.map(str::to_string),
        )
        .unwrap()
    }

    #[test]
    fn test_inputs() {
        let ctx = RequestContext::stub(Method::POST, "/chat").with_form_value("message", "hi");

        assert!(ctx.is_post());
        assert!(!ctx.is_get());
        assert_eq!(ctx.method(), &Method::POST);
        assert_eq!(ctx.path(), "/chat");
        assert_eq!(ctx.form_value("message"), "hi");
        assert_eq!(ctx.form_value("missing"), "");
        assert_eq!(ctx.form_values().len(), 1);
    }

    #[test]
    fn test_model_values() {
        let mut ctx = RequestContext::stub(Method::GET, "/");
        ctx.set_model_value("name", "chris");
        ctx.set_model_value("messages", vec!["a", "b"]);
        ctx.set_model_value("name", "bi");

        assert_eq!(ctx.model_value("name"), Some(&Value::from("bi")));
        assert_eq!(ctx.model().len(), 2);
        assert!(ctx.model_value("missing").is_none());
    }

    #[test]
    fn test_directives_start_unset() {
        let ctx = RequestContext::stub(Method::GET, "/");
        assert!(ctx.html().is_none());
        assert!(ctx.template().is_none());
        assert!(ctx.redirect().is_none());
        assert!(ctx.status().is_none());
    }

    #[test]
    fn test_no_session_reads_absent() {
        let ctx = RequestContext::stub(Method::GET, "/");
        assert_eq!(ctx.session_value("name").unwrap(), None);
        assert_eq!(ctx.session_id(), "");
        assert!(ctx.minted_session_id().is_none());
    }

    #[test]
    fn test_write_mints_session() {
        let store = Arc::new(SessionStore::new());
        let mut ctx = context(&store, None);

        ctx.set_session_value("name", "chris").unwrap();

        let sid = ctx.minted_session_id().unwrap().to_string();
        assert_eq!(sid.len(), 32);
        assert_eq!(ctx.session_value("name").unwrap().as_deref(), Some("chris"));
        assert_eq!(store.get_value(&sid, "name").unwrap().as_deref(), Some("chris"));
    }

    #[test]
    fn test_existing_session_is_kept() {
        let store = Arc::new(SessionStore::new());
        let sid = store.put_value("", "name", "chris").unwrap();
        let mut ctx = context(&store, Some(&sid));

        assert_eq!(ctx.session_value("name").unwrap().as_deref(), Some("chris"));
        ctx.set_session_value("name", "bi").unwrap();

        assert_eq!(ctx.session_id(), sid);
        assert!(ctx.minted_session_id().is_none());
    }

    #[test]
    fn test_stale_token_mints_new_session() {
        let store = Arc::new(SessionStore::new());
        let mut ctx = context(&store, Some("deadbeef"));

        assert_eq!(ctx.session_value("name").unwrap(), None);
        ctx.set_session_value("name", "chris").unwrap();

        let minted = ctx.minted_session_id().unwrap();
        assert_ne!(minted, "deadbeef");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_construction_touches_session() {
        let store = Arc::new(SessionStore::new());
        let sid = store.put_value("", "name", "chris").unwrap();
        let before = store.atime(&sid).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));
        let _ctx = context(&store, Some(&sid));

        assert!(store.atime(&sid).unwrap() > before);
    }

    #[test]
    fn test_kill_session() {
        let store = Arc::new(SessionStore::new());
        let sid = store.put_value("", "name", "chris").unwrap();
        let mut ctx = context(&store, Some(&sid));

        ctx.kill_session().unwrap();

        assert!(ctx.session_killed());
        assert_eq!(ctx.session_id(), "");
        assert_eq!(ctx.session_value("name").unwrap(), None);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_write_after_kill_mints_new_session() {
        let store = Arc::new(SessionStore::new());
        let sid = store.put_value("", "name", "chris").unwrap();
        let mut ctx = context(&store, Some(&sid));

        ctx.kill_session().unwrap();
        ctx.set_session_value("name", "bi").unwrap();

        assert!(!ctx.session_killed());
        let minted = ctx.minted_session_id().unwrap();
        assert_ne!(minted, sid);
    }
}

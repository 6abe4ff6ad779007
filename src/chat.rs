//! Chat demo application served by the `plainweb` binary.

use std::sync::{Arc, Mutex};

use axum::http::StatusCode;

use plainweb::{Error, RequestContext, Result, SessionStore};

/// In-memory message board, newest message first.
#[derive(Debug, Default)]
pub struct MessageDb {
    messages: Mutex<Vec<String>>,
}

impl MessageDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&self, message: String) -> Result<()> {
        let mut messages = self.messages.lock().map_err(|_| Error::LockPoisoned)?;
        messages.insert(0, message);
        Ok(())
    }

    pub fn messages(&self) -> Result<Vec<String>> {
        let messages = self.messages.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(messages.clone())
    }
}

/// The chat application: routes on path, keeps the user name in the session.
#[derive(Debug, Clone)]
pub struct ChatApp {
    db: Arc<MessageDb>,
    store: Arc<SessionStore>,
}

impl ChatApp {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            db: Arc::new(MessageDb::new()),
            store,
        }
    }

    pub fn serve(&self, req: &mut RequestContext) -> Result<()> {
        match req.path() {
            "/" => self.index(req),
            "/logout" => self.logout(req),
            "/chat" => self.chat(req),
            "/sessions" => self.sessions(req),
            _ => {
                req.set_status(StatusCode::NOT_FOUND);
                Ok(())
            }
        }
    }

    fn index(&self, req: &mut RequestContext) -> Result<()> {
        let reason = req.form_value("reason").to_string();
        req.set_model_value("reason", reason);
        if !req.is_post() {
            req.set_template("index.html");
            return Ok(());
        }

        let name = req.form_value("name").trim().to_string();
        if name.is_empty() {
            req.set_model_value("errors", vec!["Name must not be empty"]);
            req.set_template("index.html");
            return Ok(());
        }

        req.set_session_value("name", name)?;
        req.set_redirect("/chat");
        Ok(())
    }

    fn logout(&self, req: &mut RequestContext) -> Result<()> {
        req.kill_session()?;
        req.set_redirect("/");
        Ok(())
    }

    fn chat(&self, req: &mut RequestContext) -> Result<()> {
        let Some(name) = req.session_value("name")? else {
            req.set_redirect("/?reason=notLoggedIn");
            return Ok(());
        };

        if req.is_post() {
            let message = req.form_value("message").trim();
            if !message.is_empty() {
                self.db.add_message(format!("{name}: {message}"))?;
            }
        }

        req.set_model_value("name", name);
        req.set_model_value("messages", self.db.messages()?);
        req.set_template("chat.html");
        Ok(())
    }

    fn sessions(&self, req: &mut RequestContext) -> Result<()> {
        let listing = self.store.list_sessions()?.to_listing();
        let infos = serde_json::to_value(listing).map_err(|e| Error::Handler(e.to_string()))?;
        req.set_model_value("infos", infos);
        req.set_template("sessions.html");
        Ok(())
    }
}

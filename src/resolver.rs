//! Response resolution.
//!
//! [`resolve`] maps the directive state a request finished with onto
//! exactly one [`Resolution`]. Branches are checked in a fixed order and
//! the first one set wins: body, template, redirect, status, fallback.

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};

use crate::context::{Model, RequestContext};
use crate::template::TemplateRenderer;
use crate::Result;

/// Body sent when the application set no directive at all.
pub const FALLBACK_BODY: &str = "no result";

/// The one output action decided for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Send this body verbatim.
    Body(String),
    /// Render the named template against the model.
    Template {
        /// Template name.
        name: String,
        /// Accumulated model.
        model: Model,
    },
    /// Redirect with `302 Found`.
    Redirect(String),
    /// Send the status with its reason phrase as body.
    Status(StatusCode),
    /// Nothing was set.
    Fallback,
}

/// Decide the output action for a finished request.
pub fn resolve(ctx: &RequestContext) -> Resolution {
    if let Some(html) = ctx.html() {
        Resolution::Body(html.to_string())
    } else if let Some(name) = ctx.template() {
        Resolution::Template {
            name: name.to_string(),
            model: ctx.model().clone(),
        }
    } else if let Some(url) = ctx.redirect() {
        Resolution::Redirect(url.to_string())
    } else if let Some(status) = ctx.status() {
        Resolution::Status(status)
    } else {
        Resolution::Fallback
    }
}

impl Resolution {
    /// Turn the decision into an HTTP response.
    ///
    /// Only the template branch can fail: an unknown or broken template is
    /// returned as an error, never replaced by another branch.
    pub fn into_response(self, renderer: &dyn TemplateRenderer) -> Result<Response> {
        let response = match self {
            Self::Body(html) => Html(html).into_response(),
            Self::Template { name, model } => Html(renderer.render(&name, &model)?).into_response(),
            Self::Redirect(url) => (StatusCode::FOUND, [(header::LOCATION, url)]).into_response(),
            Self::Status(status) => {
                let reason = status.canonical_reason().unwrap_or("");
                (status, reason.to_string()).into_response()
            }
            Self::Fallback => FALLBACK_BODY.into_response(),
        };
        Ok(response)
    }
}

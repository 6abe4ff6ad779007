//! Error types for plainweb.

use thiserror::Error;

/// Main error type for plainweb operations.
///
/// Reading an unknown session or key is not an error; those reads
/// resolve to `Ok(None)`.
#[derive(Error, Debug)]
pub enum Error {
    /// The session store lock was poisoned by a panicking holder.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// No entropy could be drawn for a new session identifier.
    #[error("failed to mint session identifier: {0}")]
    IdentifierMinting(String),

    /// The selected template is unknown to the renderer.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// The selected template failed to render.
    #[error("template render error: {0}")]
    Render(String),

    /// Templates could not be discovered or parsed.
    #[error("template load error: {0}")]
    TemplateLoad(String),

    /// A glob pattern could not be parsed.
    #[error("invalid glob pattern: {0}")]
    InvalidPattern(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Application callback failed.
    #[error("handler error: {0}")]
    Handler(String),
}

/// Convenience Result type for plainweb operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Template rendering.
//!
//! The request core only needs something that turns a template name and a
//! model into a body; [`TemplateRenderer`] is that seam. [`Templates`] is
//! the stock implementation, a `minijinja` environment filled from files
//! discovered by a glob pattern.

use std::collections::BTreeSet;
use std::path::Path;

use minijinja::{Environment, ErrorKind};

use crate::context::Model;
use crate::error::Error;
use crate::Result;

/// Renders named templates against a model.
pub trait TemplateRenderer: Send + Sync {
    /// Render `name` with `model`.
    ///
    /// Fails with [`Error::TemplateNotFound`] for unknown names.
    fn render(&self, name: &str, model: &Model) -> Result<String>;
}

/// A set of named templates.
///
/// A set built by [`Templates::from_glob`] can be put in reload mode, in
/// which every render re-reads the glob so edited files show up without
/// a restart.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    env: Environment<'static>,
    names: BTreeSet<String>,
    pattern: Option<String>,
    reload: bool,
}

impl Templates {
    /// Create an empty template set.
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
            names: BTreeSet::new(),
            pattern: None,
            reload: false,
        }
    }

    /// Load every file matching `pattern`, each named by its file name.
    ///
    /// `templates/*.html` registers `templates/index.html` as `index.html`.
    pub fn from_glob(pattern: &str) -> Result<Self> {
        let mut templates = Self::new();
        templates.load_glob(pattern)?;
        templates.pattern = Some(pattern.to_string());

        if templates.is_empty() {
            tracing::warn!(pattern, "no templates matched");
        } else {
            tracing::info!(pattern, count = templates.len(), "templates loaded");
        }
        Ok(templates)
    }

    /// Re-read the glob on every render. Has no effect on sets not built from a glob.
    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    /// Whether renders re-read the template files.
    pub fn reloads(&self) -> bool {
        self.reload && self.pattern.is_some()
    }

    fn load_glob(&mut self, pattern: &str) -> Result<()> {
        let paths = glob::glob(pattern)
            .map_err(|e| Error::InvalidPattern(format!("{pattern}: {e}")))?;

        for entry in paths {
            let path = entry.map_err(|e| Error::TemplateLoad(e.to_string()))?;
            if path.is_file() {
                self.add_file(&path)?;
            }
        }
        Ok(())
    }

    /// A copy of this set with its files read from disk again.
    ///
    /// Registered functions and filters carry over; templates whose files
    /// are gone do not.
    fn reloaded(&self, pattern: &str) -> Result<Self> {
        let mut fresh = self.clone();
        fresh.env.clear_templates();
        fresh.names.clear();
        fresh.load_glob(pattern)?;
        Ok(fresh)
    }

    fn render_loaded(&self, name: &str, model: &Model) -> Result<String> {
        let template = self.env.get_template(name).map_err(|e| match e.kind() {
            ErrorKind::TemplateNotFound => Error::TemplateNotFound(name.to_string()),
            _ => Error::Render(e.to_string()),
        })?;
        template
            .render(model)
            .map_err(|e| Error::Render(format!("{name}: {e}")))
    }

    /// Build a set from in-memory `(name, source)` pairs.
    pub fn from_sources<I, N, S>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        let mut templates = Self::new();
        for (name, source) in sources {
            templates.add_template(name, source)?;
        }
        Ok(templates)
    }

    /// Add or replace a template.
    pub fn add_template(&mut self, name: impl Into<String>, source: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.env
            .add_template_owned(name.clone(), source.into())
            .map_err(|e| Error::TemplateLoad(format!("{name}: {e}")))?;
        self.names.insert(name);
        Ok(())
    }

    fn add_file(&mut self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::TemplateLoad(format!("no file name: {}", path.display())))?;
        let source = std::fs::read_to_string(path)?;
        tracing::debug!(name = %name, path = %path.display(), "loading template");
        self.add_template(name, source)
    }

    /// The underlying environment, for registering functions and filters.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Names of the registered templates.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Whether no templates are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TemplateRenderer for Templates {
    fn render(&self, name: &str, model: &Model) -> Result<String> {
        match self.pattern.as_deref() {
            Some(pattern) if self.reload => self.reloaded(pattern)?.render_loaded(name, model),
            _ => self.render_loaded(name, model),
        }
    }
}

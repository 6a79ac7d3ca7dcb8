//! Engine System - Render Steps Registered by Extension

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::asset::AssetError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("{0}")]
    Message(String),
}

/// One named transformation in a source's render pipeline
pub trait RenderStep {
    fn render(&self, path: &Path, content: &str) -> Result<String, EngineError>;
}

impl<F> RenderStep for F
where
    F: Fn(&Path, &str) -> Result<String, EngineError>,
{
    fn render(&self, path: &Path, content: &str) -> Result<String, EngineError> {
        self(path, content)
    }
}

/// Renders content as a Tera template with `path` in the context.
pub struct TeraEngine;

impl RenderStep for TeraEngine {
    fn render(&self, path: &Path, content: &str) -> Result<String, EngineError> {
        let mut context = tera::Context::new();
        context.insert("path", &path.to_string_lossy());
        Ok(tera::Tera::one_off(content, &context, false)?)
    }
}

/// Engine registry - resolves render steps by extension name
pub struct EngineRegistry {
    engines: HashMap<String, Box<dyn RenderStep>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self { engines: HashMap::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("tera", TeraEngine);
        registry
    }

    pub fn register(&mut self, extension: impl Into<String>, step: impl RenderStep + 'static) {
        self.engines.insert(extension.into(), Box::new(step));
    }

    pub fn get(&self, extension: &str) -> Option<&dyn RenderStep> {
        self.engines.get(extension).map(|step| step.as_ref())
    }

    pub fn extensions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run one step. A missing engine or a failing step aborts the build.
    pub fn render(&self, extension: &str, path: &Path, content: &str) -> Result<String, AssetError> {
        let step = self
            .get(extension)
            .ok_or_else(|| AssetError::EngineNotFound(extension.to_string()))?;

        tracing::trace!(extension, path = %path.display(), "rendering");

        step.render(path, content).map_err(|source| AssetError::RenderFailed {
            path: path.to_path_buf(),
            extension: extension.to_string(),
            source,
        })
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

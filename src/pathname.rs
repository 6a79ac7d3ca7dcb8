//! Pathname - Source Identity and Classification
//!
//! A pathname names one source and carries the type information the
//! concatenator needs before the source is ever read.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const FORMATS: &[(&str, &str)] = &[
    ("js", "application/javascript"),
    ("css", "text/css"),
    ("html", "text/html"),
    ("txt", "text/plain"),
    ("json", "application/json"),
    ("svg", "image/svg+xml"),
    ("xml", "application/xml"),
];

/// Look up the MIME type for a bare format extension (`"js"`, not `".js"`).
pub fn content_type_for(extension: &str) -> Option<&'static str> {
    FORMATS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pathname {
    path: PathBuf,
    content_type: String,
    format_extension: String,
    engine_extensions: Vec<String>,
}

impl Pathname {
    /// Classify a path from its file name.
    ///
    /// `app.js.erb.tera` yields format `.js`, content type
    /// `application/javascript` and engines `["erb", "tera"]`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let extensions: Vec<&str> = name.split('.').skip(1).filter(|e| !e.is_empty()).collect();

        let format_index = extensions
            .iter()
            .position(|ext| content_type_for(ext).is_some());

        let (content_type, format_extension, engine_extensions) = match format_index {
            Some(i) => (
                content_type_for(extensions[i]).unwrap_or(DEFAULT_CONTENT_TYPE).to_string(),
                format!(".{}", extensions[i]),
                extensions[i + 1..].iter().map(|e| e.to_string()).collect(),
            ),
            None => (
                DEFAULT_CONTENT_TYPE.to_string(),
                String::new(),
                extensions.iter().map(|e| e.to_string()).collect(),
            ),
        };

        Self {
            path,
            content_type,
            format_extension,
            engine_extensions,
        }
    }

    /// Build a pathname with caller-supplied classification.
    pub fn with_types(
        path: impl Into<PathBuf>,
        content_type: impl Into<String>,
        format_extension: impl Into<String>,
        engine_extensions: Vec<String>,
    ) -> Self {
        Self {
            path: path.into(),
            content_type: content_type.into(),
            format_extension: format_extension.into(),
            engine_extensions,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn format_extension(&self) -> &str {
        &self.format_extension
    }

    /// Engine extensions in file-name order (leftmost first).
    pub fn engine_extensions(&self) -> &[String] {
        &self.engine_extensions
    }
}

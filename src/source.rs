//! Source System - Parsed Sources and the Environments That Load Them

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::asset::AssetError;
use crate::pathname::Pathname;

/// Parsed contents of one source.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub mtime: DateTime<Utc>,
    /// Verbatim text emitted before included content. May be empty.
    pub header: String,
    pub body: String,
    /// Merged once into the asset as their own segments.
    pub required: Vec<Pathname>,
    /// Re-rendered inline every time they are named.
    pub included: Vec<Pathname>,
    /// Legacy `<%= NAME %>` substitution is enabled.
    pub compat: bool,
    pub constants: BTreeMap<String, String>,
}

impl SourceFile {
    pub fn new(body: impl Into<String>, mtime: DateTime<Utc>) -> Self {
        Self {
            mtime,
            header: String::new(),
            body: body.into(),
            required: vec![],
            included: vec![],
            compat: false,
            constants: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn requires(mut self, pathname: Pathname) -> Self {
        self.required.push(pathname);
        self
    }

    pub fn includes(mut self, pathname: Pathname) -> Self {
        self.included.push(pathname);
        self
    }

    pub fn with_constants(mut self, constants: BTreeMap<String, String>) -> Self {
        self.compat = true;
        self.constants = constants;
        self
    }
}

/// Where sources come from.
///
/// `load` is called once per merged or included source during a build.
/// `mtime` is queried live by staleness checks and must not be cached.
pub trait SourceEnvironment {
    /// Identity for a root path, keyed the same way as resolved requires.
    fn pathname(&self, path: &Path) -> Result<Pathname, AssetError> {
        Ok(Pathname::new(path))
    }

    fn load(&self, pathname: &Pathname) -> Result<SourceFile, AssetError>;

    /// Current modification time, `None` when the source no longer exists.
    fn mtime(&self, path: &Path) -> Option<DateTime<Utc>>;
}

/// In-memory environment keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnvironment {
    sources: HashMap<PathBuf, SourceFile>,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, source: SourceFile) {
        self.sources.insert(path.into(), source);
    }

    pub fn remove(&mut self, path: &Path) -> Option<SourceFile> {
        self.sources.remove(path)
    }

    /// Bump a source's modification time. Returns false for unknown paths.
    pub fn touch(&mut self, path: &Path, mtime: DateTime<Utc>) -> bool {
        match self.sources.get_mut(path) {
            Some(source) => {
                source.mtime = mtime;
                true
            }
            None => false,
        }
    }
}

impl SourceEnvironment for MemoryEnvironment {
    fn load(&self, pathname: &Pathname) -> Result<SourceFile, AssetError> {
        self.sources
            .get(pathname.path())
            .cloned()
            .ok_or_else(|| AssetError::SourceNotFound {
                name: pathname.path().display().to_string(),
                from: PathBuf::from("<memory>"),
            })
    }

    fn mtime(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.sources.get(path).map(|source| source.mtime)
    }
}

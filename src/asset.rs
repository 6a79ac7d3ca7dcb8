//! Concatenated Asset - Resolution and Concatenation Engine
//!
//! Building an asset walks the require/include graph from one root source and
//! produces the ordered output segments together with the digest, byte length
//! and newest source mtime. Everything is fixed once `build` returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::compat::substitute_constants;
use crate::engines::{EngineError, EngineRegistry};
use crate::hashing::RunningDigest;
use crate::pathname::Pathname;
use crate::source::SourceEnvironment;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("{} is '{actual}', not '{expected}'", .path.display())]
    ContentTypeMismatch {
        path: PathBuf,
        actual: String,
        expected: String,
    },

    #[error("Engine not found: {0}")]
    EngineNotFound(String),

    #[error("Render failed for {} ({extension}): {source}", .path.display())]
    RenderFailed {
        path: PathBuf,
        extension: String,
        #[source]
        source: EngineError,
    },

    #[error("Source not found: {name} (from {})", .from.display())]
    SourceNotFound { name: String, from: PathBuf },

    #[error("Include cycle through {}", .path.display())]
    IncludeCycle { path: PathBuf },

    #[error("Unknown directive '{directive}' in {}", .path.display())]
    UnknownDirective { path: PathBuf, directive: String },

    #[error("Invalid constants file {}: {source}", .path.display())]
    Constants {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Cache metadata for a built asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub content_type: String,
    pub format_extension: String,
    pub digest: String,
    pub length: usize,
    pub mtime: DateTime<Utc>,
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ConcatenatedAsset {
    content_type: String,
    format_extension: String,
    /// Dedup set for required sources, keyed by path.
    merged: HashSet<PathBuf>,
    /// Every contributing source (required or included), first-seen order.
    sources: Vec<PathBuf>,
    noted: HashSet<PathBuf>,
    segments: Vec<String>,
    digest: RunningDigest,
    mtime: DateTime<Utc>,
}

impl ConcatenatedAsset {
    /// Resolve `root` and everything it pulls in.
    ///
    /// Fails on the first content type mismatch, missing source or engine
    /// error; no partial asset is returned.
    pub fn build<E>(
        environment: &E,
        engines: &EngineRegistry,
        root: &Pathname,
    ) -> Result<Self, AssetError>
    where
        E: SourceEnvironment + ?Sized,
    {
        let asset = Self {
            content_type: root.content_type().to_string(),
            format_extension: root.format_extension().to_string(),
            merged: HashSet::new(),
            sources: vec![],
            noted: HashSet::new(),
            segments: vec![],
            digest: RunningDigest::new(),
            mtime: DateTime::<Utc>::UNIX_EPOCH,
        };

        let mut resolver = Resolver {
            environment,
            engines,
            asset,
            include_chain: vec![],
        };
        resolver.merge(root)?;

        let asset = resolver.asset;
        tracing::debug!(
            root = %root.path().display(),
            segments = asset.segments.len(),
            length = asset.length(),
            "asset built"
        );
        Ok(asset)
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn format_extension(&self) -> &str {
        &self.format_extension
    }

    /// Hex SHA-1 of the concatenated segments.
    pub fn digest(&self) -> String {
        self.digest.hexdigest()
    }

    /// Byte length of the concatenated segments.
    pub fn length(&self) -> usize {
        self.digest.length()
    }

    /// Newest modification time across every contributing source.
    pub fn mtime(&self) -> DateTime<Utc> {
        self.mtime
    }

    pub fn source_paths(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    pub fn each<F: FnMut(&str)>(&self, mut visitor: F) {
        for segment in &self.segments {
            visitor(segment);
        }
    }

    /// Stream the segments without joining them first.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for segment in &self.segments {
            writer.write_all(segment.as_bytes())?;
        }
        writer.flush()
    }

    /// True when any contributing source is newer than this asset, or gone.
    ///
    /// Queries the environment on every call.
    pub fn is_stale<E: SourceEnvironment + ?Sized>(&self, environment: &E) -> bool {
        self.modified_since(environment, self.mtime)
    }

    pub fn modified_since<E: SourceEnvironment + ?Sized>(
        &self,
        environment: &E,
        since: DateTime<Utc>,
    ) -> bool {
        self.sources.iter().any(|path| match environment.mtime(path) {
            Some(live) => live > since,
            None => true,
        })
    }

    pub fn manifest(&self) -> AssetManifest {
        AssetManifest {
            content_type: self.content_type.clone(),
            format_extension: self.format_extension.clone(),
            digest: self.digest(),
            length: self.length(),
            mtime: self.mtime,
            sources: self.sources.clone(),
        }
    }

    fn append(&mut self, segment: String) {
        self.digest.update(&segment);
        self.segments.push(segment);
    }

    fn note_source(&mut self, path: &Path) {
        if self.noted.insert(path.to_path_buf()) {
            self.sources.push(path.to_path_buf());
        }
    }
}

impl fmt::Display for ConcatenatedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            f.write_str(segment)?;
        }
        Ok(())
    }
}

struct Resolver<'a, E: SourceEnvironment + ?Sized> {
    environment: &'a E,
    engines: &'a EngineRegistry,
    asset: ConcatenatedAsset,
    /// Sources being expanded through includes since the last merge.
    include_chain: Vec<PathBuf>,
}

impl<E: SourceEnvironment + ?Sized> Resolver<'_, E> {
    fn merge(&mut self, pathname: &Pathname) -> Result<(), AssetError> {
        if pathname.content_type() != self.asset.content_type {
            tracing::warn!(
                path = %pathname.path().display(),
                actual = pathname.content_type(),
                expected = %self.asset.content_type,
                "content type mismatch"
            );
            return Err(AssetError::ContentTypeMismatch {
                path: pathname.path().to_path_buf(),
                actual: pathname.format_extension().to_string(),
                expected: self.asset.format_extension.clone(),
            });
        }

        // Marked before recursing so require cycles terminate.
        if !self.asset.merged.insert(pathname.path().to_path_buf()) {
            tracing::debug!(path = %pathname.path().display(), "already merged, skipping");
            return Ok(());
        }
        self.asset.note_source(pathname.path());
        tracing::debug!(path = %pathname.path().display(), "merging");

        let outer_chain = std::mem::take(&mut self.include_chain);
        let content = self.render(pathname)?;
        self.include_chain = outer_chain;

        self.asset.append(content);
        Ok(())
    }

    fn render(&mut self, pathname: &Pathname) -> Result<String, AssetError> {
        let mut content = self.expand(pathname)?;
        for extension in pathname.engine_extensions().iter().rev() {
            content = self.engines.render(extension, pathname.path(), &content)?;
        }
        Ok(content)
    }

    fn expand(&mut self, pathname: &Pathname) -> Result<String, AssetError> {
        let source = self.environment.load(pathname)?;
        if source.mtime > self.asset.mtime {
            self.asset.mtime = source.mtime;
        }

        for required in &source.required {
            self.merge(required)?;
        }

        let mut content = String::new();
        if !source.header.is_empty() {
            content.push_str(&source.header);
            content.push('\n');
        }

        self.include_chain.push(pathname.path().to_path_buf());
        for included in &source.included {
            if self.include_chain.iter().any(|p| p == included.path()) {
                return Err(AssetError::IncludeCycle {
                    path: included.path().to_path_buf(),
                });
            }
            self.asset.note_source(included.path());
            content.push_str(&self.render(included)?);
        }
        self.include_chain.pop();

        content.push_str(&source.body);

        if source.compat && !source.constants.is_empty() {
            content = substitute_constants(&content, &source.constants);
        }

        Ok(content)
    }
}

/// The compilation pipeline - single entry point for building assets
pub struct AssetPipeline<E: SourceEnvironment> {
    environment: E,
    engines: EngineRegistry,
}

impl<E: SourceEnvironment> AssetPipeline<E> {
    pub fn new(environment: E, engines: EngineRegistry) -> Self {
        Self { environment, engines }
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    pub fn build(&self, root: &Pathname) -> Result<ConcatenatedAsset, AssetError> {
        ConcatenatedAsset::build(&self.environment, &self.engines, root)
    }

    /// Build from a path, letting the environment decide the root's identity.
    pub fn build_path(&self, path: impl AsRef<Path>) -> Result<ConcatenatedAsset, AssetError> {
        let root = self.environment.pathname(path.as_ref())?;
        self.build(&root)
    }

    pub fn is_stale(&self, asset: &ConcatenatedAsset) -> bool {
        asset.is_stale(&self.environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryEnvironment, SourceFile};
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(secs)
    }

    fn suffix(tag: &'static str) -> impl Fn(&Path, &str) -> Result<String, EngineError> {
        move |_: &Path, content: &str| Ok(format!("{content}{tag}"))
    }

    #[test]
    fn test_mtime_is_newest_source() {
        let mut env = MemoryEnvironment::new();
        env.insert("a.js", SourceFile::new("a", at(5)).requires(Pathname::new("b.js")));
        env.insert("b.js", SourceFile::new("b", at(50)));

        let asset = ConcatenatedAsset::build(&env, &EngineRegistry::new(), &Pathname::new("a.js")).unwrap();
        assert_eq!(asset.mtime(), at(50));
    }

    #[test]
    fn test_engines_apply_innermost_first() {
        let mut env = MemoryEnvironment::new();
        env.insert("a.js.x.y", SourceFile::new("body", at(1)));

        let mut engines = EngineRegistry::new();
        engines.register("x", suffix("+x"));
        engines.register("y", suffix("+y"));

        let asset = ConcatenatedAsset::build(&env, &engines, &Pathname::new("a.js.x.y")).unwrap();
        assert_eq!(asset.to_string(), "body+y+x");
    }

    #[test]
    fn test_missing_engine_aborts() {
        let mut env = MemoryEnvironment::new();
        env.insert("a.js.coffee", SourceFile::new("x", at(1)));

        let result = ConcatenatedAsset::build(&env, &EngineRegistry::new(), &Pathname::new("a.js.coffee"));
        assert!(matches!(result, Err(AssetError::EngineNotFound(_))));
    }

    #[test]
    fn test_compat_constants_substituted_after_assembly() {
        let mut env = MemoryEnvironment::new();
        let constants = BTreeMap::from([("VERSION".to_string(), "2.0".to_string())]);
        env.insert(
            "a.js",
            SourceFile::new("var v = '<%= VERSION %>';", at(1))
                .includes(Pathname::new("b.js"))
                .with_constants(constants),
        );
        env.insert("b.js", SourceFile::new("/* <%= VERSION %> <%= OTHER %> */", at(1)));

        let asset = ConcatenatedAsset::build(&env, &EngineRegistry::new(), &Pathname::new("a.js")).unwrap();
        assert_eq!(asset.to_string(), "/* 2.0 <%= OTHER %> */var v = '2.0';");
    }

    #[test]
    fn test_include_cycle_is_an_error() {
        let mut env = MemoryEnvironment::new();
        env.insert("a.js", SourceFile::new("a", at(1)).includes(Pathname::new("b.js")));
        env.insert("b.js", SourceFile::new("b", at(1)).includes(Pathname::new("a.js")));

        let result = ConcatenatedAsset::build(&env, &EngineRegistry::new(), &Pathname::new("a.js"));
        assert!(matches!(result, Err(AssetError::IncludeCycle { .. })));
    }

    #[test]
    fn test_include_of_merged_source_is_not_a_cycle() {
        let mut env = MemoryEnvironment::new();
        env.insert("a.js", SourceFile::new("a", at(1)).requires(Pathname::new("b.js")));
        env.insert("b.js", SourceFile::new("b", at(1)).includes(Pathname::new("a.js")));

        let asset = ConcatenatedAsset::build(&env, &EngineRegistry::new(), &Pathname::new("a.js")).unwrap();
        // b inlines a; a's require of b is already merged by then
        assert_eq!(asset.segments().collect::<Vec<_>>(), vec!["ab", "a"]);
    }

    #[test]
    fn test_source_paths_listed_once() {
        let mut env = MemoryEnvironment::new();
        env.insert(
            "a.js",
            SourceFile::new("a", at(1))
                .includes(Pathname::new("c.js"))
                .includes(Pathname::new("c.js"))
                .requires(Pathname::new("b.js")),
        );
        env.insert("b.js", SourceFile::new("b", at(1)).includes(Pathname::new("c.js")));
        env.insert("c.js", SourceFile::new("c", at(1)));

        let asset = ConcatenatedAsset::build(&env, &EngineRegistry::new(), &Pathname::new("a.js")).unwrap();
        assert_eq!(
            asset.source_paths(),
            &[PathBuf::from("a.js"), PathBuf::from("b.js"), PathBuf::from("c.js")]
        );
    }

    #[test]
    fn test_write_to_matches_display() {
        let mut env = MemoryEnvironment::new();
        env.insert("a.css", SourceFile::new("a{}", at(1)).requires(Pathname::new("b.css")));
        env.insert("b.css", SourceFile::new("b{}", at(1)));

        let asset = ConcatenatedAsset::build(&env, &EngineRegistry::new(), &Pathname::new("a.css")).unwrap();
        let mut out = Vec::new();
        asset.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), asset.to_string());
    }

    #[test]
    fn test_manifest_fields() {
        let mut env = MemoryEnvironment::new();
        env.insert("a.css", SourceFile::new("a{}", at(7)));

        let asset = ConcatenatedAsset::build(&env, &EngineRegistry::new(), &Pathname::new("a.css")).unwrap();
        let manifest = asset.manifest();
        assert_eq!(manifest.content_type, "text/css");
        assert_eq!(manifest.format_extension, ".css");
        assert_eq!(manifest.length, 3);
        assert_eq!(manifest.mtime, at(7));
        assert_eq!(manifest.sources, vec![PathBuf::from("a.css")]);
    }
}

//! Filesystem Environment - Directive Headers and Name Resolution
//!
//! A source file may open with a comment block carrying directives:
//!
//! ```text
//! //= require "util"
//! //= require <vendor/jquery>
//! //= include "banner"
//! ```
//!
//! Quoted names resolve next to the requiring file, angle-bracketed names are
//! searched in the load paths. Directive lines are removed from the header.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::asset::AssetError;
use crate::pathname::Pathname;
use crate::source::{SourceEnvironment, SourceFile};

pub const CONSTANTS_FILE: &str = "constants.yml";

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?://|/\*|\*)\s*=\s*(\w+)(?:\s+(.*?))?\s*(?:\*/)?\s*$").expect("directive pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    Relative,
    LoadPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Directive {
    name: String,
    argument: String,
}

/// Header/body split of a source file with its directives extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedSource {
    header: String,
    body: String,
    directives: Vec<Directive>,
}

fn parse_source(text: &str) -> ParsedSource {
    let mut header = String::new();
    let mut directives = vec![];
    let mut in_block = false;
    let mut body_start = text.len();

    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        let indent = line.len() - line.trim_start().len();
        let opens_block = !in_block && trimmed.starts_with("/*");

        let is_header_line = if in_block || opens_block {
            let search_from = if opens_block { indent + 2 } else { 0 };
            match line[search_from..].find("*/") {
                Some(i) => {
                    in_block = false;
                    // Code after the closing marker starts the body.
                    let end = search_from + i + 2;
                    if !line[end..].trim().is_empty() {
                        header.push_str(&line[..end]);
                        body_start = offset + end;
                        break;
                    }
                }
                None => in_block = true,
            }
            true
        } else {
            trimmed.is_empty() || trimmed.starts_with("//")
        };

        if !is_header_line {
            body_start = offset;
            break;
        }

        match DIRECTIVE.captures(trimmed) {
            Some(caps) => directives.push(Directive {
                name: caps[1].to_string(),
                argument: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            }),
            None => header.push_str(line),
        }
        offset += line.len();
    }

    let header = header.trim_end().to_string();
    let header = if header.trim().is_empty() { String::new() } else { header };

    ParsedSource {
        header,
        body: text[body_start..].to_string(),
        directives,
    }
}

fn parse_argument(argument: &str) -> Option<(Lookup, &str)> {
    let argument = argument.trim();
    if let Some(inner) = argument.strip_prefix('"').and_then(|a| a.strip_suffix('"')) {
        Some((Lookup::Relative, inner))
    } else if let Some(inner) = argument.strip_prefix('<').and_then(|a| a.strip_suffix('>')) {
        Some((Lookup::LoadPath, inner))
    } else if argument.is_empty() {
        None
    } else {
        Some((Lookup::Relative, argument))
    }
}

/// Reads sources from disk
#[derive(Debug, Clone, Default)]
pub struct FileEnvironment {
    load_paths: Vec<PathBuf>,
}

impl FileEnvironment {
    pub fn new(load_paths: Vec<PathBuf>) -> Self {
        Self { load_paths }
    }

    pub fn load_paths(&self) -> &[PathBuf] {
        &self.load_paths
    }

    fn resolve(&self, argument: &str, from: &Pathname) -> Result<Pathname, AssetError> {
        let not_found = || AssetError::SourceNotFound {
            name: argument.to_string(),
            from: from.path().to_path_buf(),
        };

        let (lookup, name) = parse_argument(argument).ok_or_else(not_found)?;

        let roots: Vec<PathBuf> = match lookup {
            Lookup::Relative => from.path().parent().map(Path::to_path_buf).into_iter().collect(),
            Lookup::LoadPath => self.load_paths.clone(),
        };

        for root in roots {
            if let Some(found) = find_source(&root.join(name), from.format_extension())? {
                return self.pathname(&found);
            }
        }

        Err(not_found())
    }

    fn require_directory(&self, argument: &str, from: &Pathname) -> Result<Vec<Pathname>, AssetError> {
        let (lookup, name) = parse_argument(argument).unwrap_or((Lookup::Relative, "."));
        let roots: Vec<PathBuf> = match lookup {
            Lookup::Relative => vec![from.path().parent().unwrap_or_else(|| Path::new(".")).to_path_buf()],
            Lookup::LoadPath => self.load_paths.clone(),
        };

        let Some(dir) = roots.iter().map(|root| root.join(name)).find(|dir| dir.is_dir()) else {
            return Err(AssetError::SourceNotFound {
                name: argument.to_string(),
                from: from.path().to_path_buf(),
            });
        };

        let mut files = vec![];
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && Pathname::new(&path).format_extension() == from.format_extension() {
                files.push(path);
            }
        }
        files.sort();

        let mut pathnames = vec![];
        for file in files {
            let pathname = self.pathname(&file)?;
            if pathname.path() != from.path() {
                pathnames.push(pathname);
            }
        }
        Ok(pathnames)
    }

    fn load_constants(&self, pathname: &Pathname) -> Result<BTreeMap<String, String>, AssetError> {
        let Some(dir) = pathname.path().parent() else {
            return Ok(BTreeMap::new());
        };
        let file = dir.join(CONSTANTS_FILE);
        if !file.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&file)?;
        let raw: BTreeMap<String, serde_yaml::Value> =
            serde_yaml::from_str(&content).map_err(|source| AssetError::Constants {
                path: file.clone(),
                source,
            })?;

        let mut constants = BTreeMap::new();
        for (name, value) in raw {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                _ => {
                    tracing::warn!(file = %file.display(), name = %name, "skipping non-scalar constant");
                    continue;
                }
            };
            constants.insert(name, value);
        }
        Ok(constants)
    }
}

/// Exact match first, then `<name>.<engine>...` siblings in name order.
fn find_source(candidate: &Path, format_extension: &str) -> Result<Option<PathBuf>, AssetError> {
    let candidate = if Pathname::new(candidate).format_extension().is_empty() {
        let mut name = candidate.as_os_str().to_os_string();
        name.push(format_extension);
        PathBuf::from(name)
    } else {
        candidate.to_path_buf()
    };

    if candidate.is_file() {
        return Ok(Some(candidate));
    }

    let (Some(dir), Some(file_name)) = (candidate.parent(), candidate.file_name()) else {
        return Ok(None);
    };
    if !dir.is_dir() {
        return Ok(None);
    }

    let prefix = format!("{}.", file_name.to_string_lossy());
    let mut matches = vec![];
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches_prefix = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with(&prefix));
        if matches_prefix && path.is_file() {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches.into_iter().next())
}

impl SourceEnvironment for FileEnvironment {
    /// Canonical, so a root reached again through a require is deduplicated.
    fn pathname(&self, path: &Path) -> Result<Pathname, AssetError> {
        Ok(Pathname::new(fs::canonicalize(path)?))
    }

    fn load(&self, pathname: &Pathname) -> Result<SourceFile, AssetError> {
        let text = fs::read_to_string(pathname.path())?;
        let parsed = parse_source(&text);
        let mtime = self.mtime(pathname.path()).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let mut source = SourceFile::new(parsed.body, mtime).with_header(parsed.header);
        for directive in &parsed.directives {
            match directive.name.as_str() {
                "require" => source.required.push(self.resolve(&directive.argument, pathname)?),
                "include" => source.included.push(self.resolve(&directive.argument, pathname)?),
                "require_directory" => source
                    .required
                    .extend(self.require_directory(&directive.argument, pathname)?),
                "compat" => source.compat = true,
                other => {
                    return Err(AssetError::UnknownDirective {
                        path: pathname.path().to_path_buf(),
                        directive: other.to_string(),
                    })
                }
            }
        }

        if source.compat {
            source.constants = self.load_constants(pathname)?;
        }

        tracing::trace!(
            path = %pathname.path().display(),
            requires = source.required.len(),
            includes = source.included.len(),
            "loaded source"
        );
        Ok(source)
    }

    fn mtime(&self, path: &Path) -> Option<DateTime<Utc>> {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }
}

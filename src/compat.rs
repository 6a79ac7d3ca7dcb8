//! Legacy Constant Substitution
//!
//! Older sources embed `<%= NAME %>` placeholders that are filled from a flat
//! constants table after the source has been assembled.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<%=(.*?)%>").expect("placeholder pattern is valid"));

/// Replace every mapped placeholder. Unmapped placeholders are kept verbatim.
pub fn substitute_constants(content: &str, constants: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(content, |caps: &Captures| match constants.get(caps[1].trim()) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

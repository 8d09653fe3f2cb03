// src/allowed.rs

//! Input shape validation
//!
//! Namespaces, package names and versions must be keywords: lowercase
//! alphanumerics and hyphens, starting with an alphanumeric. Warehouse
//! roots must look like a path and remote locators like a URL. The path
//! and URL shapes also accept the empty string, which callers treat as
//! "use the default" or "disabled".

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// The shape an input was recognized as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedKind {
    Keyword,
    Path,
    Url,
}

static KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("valid keyword regex"));

// Unix absolute (/opt/x), Unix relative (./x, ../x), Windows drive paths
// (C:\x or C:/x) and UNC paths (\\server\share).
static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:(?:[A-Za-z]:[\\/])|(?:\\\\)|/|\./|\.\./).+)?$").expect("valid path regex")
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.-]*://\S+)?$").expect("valid url regex")
});

// Rendered registry names: keywords joined with underscores.
static MODULE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid module name regex"));

impl AllowedKind {
    fn regex(self) -> &'static Regex {
        match self {
            Self::Keyword => &KEYWORD_RE,
            Self::Path => &PATH_RE,
            Self::Url => &URL_RE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Path => "path",
            Self::Url => "url",
        }
    }
}

pub fn matches(kind: AllowedKind, value: &str) -> bool {
    kind.regex().is_match(value)
}

pub fn is_keyword(value: &str) -> bool {
    matches(AllowedKind::Keyword, value)
}

pub fn is_path(value: &str) -> bool {
    matches(AllowedKind::Path, value)
}

pub fn is_url(value: &str) -> bool {
    matches(AllowedKind::Url, value)
}

/// Whether `value` can be used as a fully-qualified module name
pub fn is_module_name(value: &str) -> bool {
    MODULE_NAME_RE.is_match(value)
}

/// Return the first matching shape, checked as URL, then path, then keyword
pub fn detect(value: &str) -> Option<AllowedKind> {
    [AllowedKind::Url, AllowedKind::Path, AllowedKind::Keyword]
        .into_iter()
        .find(|kind| matches(*kind, value))
}

/// Require `value` to have the given shape
///
/// `what` names the input in the error message (e.g. "package name").
pub fn require(kind: AllowedKind, what: &str, value: &str) -> Result<()> {
    if matches(kind, value) {
        Ok(())
    } else {
        Err(Error::InvalidIdentity(format!(
            "{} '{}' is not a valid {}",
            what,
            value,
            kind.name()
        )))
    }
}

/// Require `value` to be a keyword
pub fn require_keyword(what: &str, value: &str) -> Result<()> {
    require(AllowedKind::Keyword, what, value)
}

/// Require `value` to be a usable module name
pub fn require_module_name(value: &str) -> Result<()> {
    if is_module_name(value) {
        Ok(())
    } else {
        Err(Error::InvalidIdentity(format!(
            "module name '{}' is not valid",
            value
        )))
    }
}

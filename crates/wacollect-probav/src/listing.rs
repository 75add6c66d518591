//! Version token discovery from the archive's HTML directory listings.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Processing version embedded in tile file names, e.g. `V101`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(String);

impl VersionToken {
    /// Wrap a token, dropping a leading underscore if present.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        match token.strip_prefix('_') {
            Some(stripped) => Self(stripped.to_string()),
            None => Self(token),
        }
    }

    /// The token without leading underscore.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Patterns are literals; a compile failure leaves the lookup returning `None`.
static HREF: OnceLock<Option<Regex>> = OnceLock::new();
static VERSIONED_HREF: OnceLock<Option<Regex>> = OnceLock::new();
static VERSION_TOKEN: OnceLock<Option<Regex>> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Option<Regex>>, source: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(source).ok()).as_ref()
}

/// Find the version token in a directory listing.
///
/// Takes the first anchor whose `href` mentions a `V10x` version and extracts
/// the `_V10...` suffix from it. Returns `None` when no anchor qualifies or the
/// first qualifying anchor carries no extractable token.
pub fn parse_version_token(listing: &str) -> Option<VersionToken> {
    let anchors = pattern(&HREF, r#"(?i)<a\s[^>]*href\s*=\s*["']([^"']*)["']"#)?;
    let versioned = pattern(&VERSIONED_HREF, r"(?i)V10\d")?;
    let token = pattern(&VERSION_TOKEN, r"_V10\w+")?;

    let href = anchors
        .captures_iter(listing)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|href| versioned.is_match(href))?;

    token.find(href).map(|m| VersionToken::new(m.as_str()))
}

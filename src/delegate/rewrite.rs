//! Config-driven delegate that redirects a host (and optional path prefix)
//! to another base URL

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use url::Url;

use super::Delegate;

/// One redirect rule as it appears in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    /// Label used in logs
    pub name: String,

    /// Host to claim, compared case-insensitively
    pub host: String,

    /// Only claim paths under this prefix
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Base URL requests are redirected to
    pub target: String,

    /// Remove `path_prefix` before appending the request path to `target`
    #[serde(default)]
    pub strip_prefix: bool,
}

#[derive(Debug, Clone)]
pub struct RewriteDelegate {
    name: String,
    host: String,
    path_prefix: Option<String>,
    target: Url,
    strip_prefix: bool,
}

impl RewriteDelegate {
    pub fn new(name: impl Into<String>, host: impl Into<String>, target: Url) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            path_prefix: None,
            target,
            strip_prefix: false,
        }
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>, strip: bool) -> Self {
        self.path_prefix = Some(prefix.into());
        self.strip_prefix = strip;
        self
    }

    pub fn from_rule(rule: &RewriteRule) -> Result<Self, url::ParseError> {
        let target = Url::parse(&rule.target)?;
        let mut delegate = Self::new(rule.name.clone(), rule.host.clone(), target);
        if let Some(prefix) = &rule.path_prefix {
            delegate = delegate.with_path_prefix(prefix.clone(), rule.strip_prefix);
        }
        Ok(delegate)
    }

    pub fn target(&self) -> &Url {
        &self.target
    }
}

#[async_trait]
impl Delegate for RewriteDelegate {
    fn applies_to(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let host_matches = url
            .host_str()
            .map_or(false, |host| host.eq_ignore_ascii_case(&self.host));
        let path_matches = self
            .path_prefix
            .as_deref()
            .map_or(true, |prefix| under_prefix(url.path(), prefix).is_some());
        host_matches && path_matches
    }

    async fn transform(&self, url: &Url) -> io::Result<Url> {
        let path = match (&self.path_prefix, self.strip_prefix) {
            (Some(prefix), true) => under_prefix(url.path(), prefix).unwrap_or(url.path()),
            _ => url.path(),
        };

        let mut rewritten = self.target.clone();
        let base = rewritten.path().trim_end_matches('/').to_string();
        rewritten.set_path(&format!("{}/{}", base, path.trim_start_matches('/')));
        rewritten.set_query(url.query());
        rewritten.set_fragment(None);
        Ok(rewritten)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Remainder of `path` below `prefix`, matching whole segments only
fn under_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

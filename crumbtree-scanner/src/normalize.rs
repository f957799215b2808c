//! Canonical page identity.
//!
//! Every URL the crawler touches goes through [`normalize`] or [`resolve`]
//! before it is used as a key, so `HTTP://Shop.example/a//b/` and
//! `http://shop.example/a/b` always land on the same node.

use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// An absolute `http(s)` URL reduced to `scheme://host[:port]/path`.
///
/// Host is lower-cased, dot segments are resolved, repeated slashes are
/// collapsed, query and fragment are dropped, and there is no trailing slash
/// unless the path is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Byte offset of the first `/` after `scheme://`.
    fn path_start(&self) -> usize {
        let after_scheme = self.0.find("://").map(|i| i + 3).unwrap_or(0);
        self.0[after_scheme..]
            .find('/')
            .map(|i| after_scheme + i)
            .unwrap_or(self.0.len())
    }

    pub fn scheme(&self) -> &str {
        self.0.split("://").next().unwrap_or_default()
    }

    /// Host including a non-default port, e.g. `shop.example:8080`.
    pub fn host(&self) -> &str {
        let after_scheme = self.0.find("://").map(|i| i + 3).unwrap_or(0);
        &self.0[after_scheme..self.path_start()]
    }

    pub fn path(&self) -> &str {
        &self.0[self.path_start()..]
    }

    pub fn is_root(&self) -> bool {
        self.path() == "/"
    }

    /// Last non-empty path segment, percent-decoded. `None` for the root.
    pub fn last_segment(&self) -> Option<String> {
        let segment = self.path().rsplit('/').find(|s| !s.is_empty())?;
        Some(percent_decode(segment))
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NormalizedUrl {
    type Error = ScanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        normalize(&value).ok_or(ScanError::InvalidUrl(value))
    }
}

impl From<NormalizedUrl> for String {
    fn from(value: NormalizedUrl) -> Self {
        value.0
    }
}

/// Normalize an absolute URL. Returns `None` for empty input, relative
/// references, non-http schemes and URLs without a host.
pub fn normalize(raw: &str) -> Option<NormalizedUrl> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = Url::parse(raw).ok()?;
    from_parsed(&parsed)
}

/// Resolve `href` against the page it was found on, then normalize.
///
/// `//host/x` keeps the base scheme, `/x` stays on the base host, anything
/// else is resolved relative to the base's directory. Fragment-only and
/// script/mail links yield `None`.
pub fn resolve(href: &str, base: &str) -> Option<NormalizedUrl> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
    {
        return None;
    }

    match Url::parse(href) {
        Ok(absolute) => from_parsed(&absolute),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(base.trim()).ok()?;
            let joined = base.join(href).ok()?;
            from_parsed(&joined)
        }
        Err(_) => None,
    }
}

fn from_parsed(url: &Url) -> Option<NormalizedUrl> {
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return None;
    }

    let host = url.host_str().filter(|h| !h.is_empty())?.to_ascii_lowercase();
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();

    Some(NormalizedUrl(format!(
        "{}://{}{}{}",
        scheme,
        host,
        port,
        normalize_path(url.path())
    )))
}

/// Collapse empty segments and resolve dot segments against a rooted path.
/// `..` at the root stays at the root.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(hex) = segment.get(i + 1..i + 3)
            && let Ok(byte) = u8::from_str_radix(hex, 16)
        {
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        normalize(s).map(|u| u.to_string()).unwrap_or_default()
    }

    #[test]
    fn test_equivalent_spellings_collapse() {
        assert_eq!(norm("HTTP://Example.com/a//b/"), norm("http://example.com/a/b"));
        assert_eq!(norm("http://example.com/a/b"), "http://example.com/a/b");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "HTTP://Example.com/a//b/",
            "https://shop.example/catalog/./tools/../drills/?page=2#top",
            "http://shop.example",
            "http://shop.example:8080//x///y/",
            "https://shop.example/%D0%B4%D1%80%D0%B5%D0%BB%D0%B8/",
            "https://shop.example/кат/дрели",
        ];
        for input in inputs {
            let once = normalize(input).expect(input);
            let twice = normalize(once.as_str()).expect(input);
            assert_eq!(once, twice, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_root_keeps_single_slash() {
        assert_eq!(norm("http://example.com"), "http://example.com/");
        assert_eq!(norm("http://example.com///"), "http://example.com/");
        assert!(normalize("http://example.com/").unwrap().is_root());
    }

    #[test]
    fn test_query_and_fragment_dropped() {
        assert_eq!(
            norm("https://example.com/tools?sort=price#reviews"),
            "https://example.com/tools"
        );
    }

    #[test]
    fn test_default_port_dropped_custom_port_kept() {
        assert_eq!(norm("http://example.com:80/a"), "http://example.com/a");
        assert_eq!(norm("http://example.com:8080/a"), "http://example.com:8080/a");
    }

    #[test]
    fn test_dot_segments_never_escape_root() {
        assert_eq!(norm("http://example.com/../../a"), "http://example.com/a");
    }

    #[test]
    fn test_rejects_unusable_input() {
        assert!(normalize("").is_none());
        assert!(normalize("   ").is_none());
        assert!(normalize("/relative/path").is_none());
        assert!(normalize("mailto:shop@example.com").is_none());
        assert!(normalize("ftp://example.com/file").is_none());
        assert!(normalize("not a url").is_none());
    }

    #[test]
    fn test_resolve_protocol_relative() {
        let resolved = resolve("//cdn.example.com/img/a.jpg", "https://shop.example/x/y").unwrap();
        assert_eq!(resolved.as_str(), "https://cdn.example.com/img/a.jpg");
    }

    #[test]
    fn test_resolve_absolute_path() {
        let resolved = resolve("/catalog/tools/", "https://shop.example/x/y").unwrap();
        assert_eq!(resolved.as_str(), "https://shop.example/catalog/tools");
    }

    #[test]
    fn test_resolve_relative_to_directory() {
        let resolved = resolve("drills", "https://shop.example/catalog/tools/").unwrap();
        assert_eq!(resolved.as_str(), "https://shop.example/catalog/tools/drills");

        let resolved = resolve("../garden", "https://shop.example/catalog/tools/").unwrap();
        assert_eq!(resolved.as_str(), "https://shop.example/catalog/garden");
    }

    #[test]
    fn test_resolve_skips_non_navigational_links() {
        let base = "https://shop.example/";
        assert!(resolve("#", base).is_none());
        assert!(resolve("javascript:void(0)", base).is_none());
        assert!(resolve("tel:+100", base).is_none());
        assert!(resolve("", base).is_none());
    }

    #[test]
    fn test_accessors() {
        let url = normalize("https://Shop.Example:8443/catalog/tools").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host(), "shop.example:8443");
        assert_eq!(url.path(), "/catalog/tools");
        assert_eq!(url.last_segment().as_deref(), Some("tools"));
        assert_eq!(normalize("https://shop.example/").unwrap().last_segment(), None);
        assert_eq!(
            normalize("https://shop.example/catalog/дрели").unwrap().last_segment().as_deref(),
            Some("дрели")
        );
    }

    #[test]
    fn test_serde_normalizes_on_read() {
        let url: NormalizedUrl = serde_json::from_str("\"HTTP://Example.com/a//b/\"").unwrap();
        assert_eq!(url.as_str(), "http://example.com/a/b");
        assert_eq!(serde_json::to_string(&url).unwrap(), "\"http://example.com/a/b\"");
        assert!(serde_json::from_str::<NormalizedUrl>("\"nope\"").is_err());
    }
}

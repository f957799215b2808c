// Seed reading: sitemap XML or a URL list, into a deduplicated seed set

use crate::error::{CrawlError, SeedError};
use crumbtree_scanner::{Fetcher, NormalizedUrl, normalize};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Where the seed URLs come from. The two modes are mutually exclusive.
#[derive(Debug, Clone)]
pub enum SeedSource {
    /// A `urlset` sitemap, as a local path or an `http(s)` URL.
    Sitemap(String),
    /// A JSON array, a JSON object with `errors`/`urls`, or plain lines.
    UrlList(PathBuf),
}

impl SeedSource {
    pub fn kind(&self) -> &'static str {
        match self {
            SeedSource::Sitemap(_) => "sitemap",
            SeedSource::UrlList(_) => "url_list",
        }
    }

    pub fn location(&self) -> String {
        match self {
            SeedSource::Sitemap(location) => location.clone(),
            SeedSource::UrlList(path) => path.display().to_string(),
        }
    }
}

/// The normalized, deduplicated URLs to fetch, in source order.
#[derive(Debug, Clone, Default)]
pub struct SeedSet {
    pub urls: Vec<NormalizedUrl>,
    /// Raw entries read from the source, before normalization and dedup.
    pub candidates: usize,
}

/// Read the seed source and build the seed set, capped at `limit` entries
/// (0 = unlimited).
pub async fn load_seeds(
    source: &SeedSource,
    fetcher: &Fetcher,
    limit: usize,
) -> Result<SeedSet, CrawlError> {
    let candidates = read_candidates(source, fetcher)
        .await
        .map_err(|e| CrawlError::Configuration {
            path: source.location(),
            reason: e.to_string(),
        })?;

    let count = candidates.len();
    let urls = dedupe_seeds(candidates, limit);
    info!(
        "Loaded {} seed URLs from {} ({} raw entries)",
        urls.len(),
        source.location(),
        count
    );

    Ok(SeedSet {
        urls,
        candidates: count,
    })
}

async fn read_candidates(source: &SeedSource, fetcher: &Fetcher) -> Result<Vec<String>, SeedError> {
    match source {
        SeedSource::Sitemap(location) => {
            let xml = if is_remote(location) {
                fetcher
                    .fetch_text(location)
                    .await
                    .map_err(|source| SeedError::Fetch {
                        url: location.clone(),
                        source,
                    })?
            } else {
                read_file(&PathBuf::from(location))?
            };
            parse_sitemap(&xml)
        }
        SeedSource::UrlList(path) => Ok(parse_url_list(&read_file(path)?)),
    }
}

fn is_remote(location: &str) -> bool {
    let lowered = location.trim().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

fn read_file(path: &PathBuf) -> Result<String, SeedError> {
    fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.clone(),
        source,
    })
}

/// Extract every `urlset/url/loc` value. The root must be `<urlset>`.
pub fn parse_sitemap(xml: &str) -> Result<Vec<String>, SeedError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root_seen = false;
    let mut in_url = false;
    let mut in_loc = false;
    let mut locs = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if !root_seen {
                    if name != "urlset" {
                        return Err(SeedError::NotUrlset(name));
                    }
                    root_seen = true;
                    continue;
                }
                match name.as_str() {
                    "url" => in_url = true,
                    "loc" if in_url => in_loc = true,
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) if !root_seen => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name != "urlset" {
                    return Err(SeedError::NotUrlset(name));
                }
                root_seen = true;
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"url" => in_url = false,
                b"loc" => in_loc = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_loc => {
                let text = e
                    .unescape()
                    .map_err(|err| SeedError::Xml(err.to_string()))?;
                locs.push(text.trim().to_string());
            }
            Ok(Event::CData(e)) if in_loc => {
                locs.push(String::from_utf8_lossy(&e.into_inner()).trim().to_string());
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SeedError::Xml(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if !root_seen {
        return Err(SeedError::Xml("document has no root element".to_string()));
    }

    debug!("Sitemap yielded {} <loc> entries", locs.len());
    Ok(locs)
}

/// Candidate URLs from a list file. Never fails: unknown shapes yield
/// nothing and bad entries are left for normalization to drop.
pub fn parse_url_list(content: &str) -> Vec<String> {
    let trimmed = content.trim_start_matches('\u{feff}').trim();

    if (trimmed.starts_with('[') || trimmed.starts_with('{'))
        && let Ok(value) = serde_json::from_str::<Value>(trimmed)
    {
        return urls_from_json(&value);
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn urls_from_json(value: &Value) -> Vec<String> {
    match value {
        Value::Array(entries) => entries.iter().filter_map(url_of_entry).collect(),
        Value::Object(map) => ["errors", "urls"]
            .iter()
            .filter_map(|key| map.get(*key))
            .flat_map(|section| match section {
                Value::Array(entries) => entries.iter().filter_map(url_of_entry).collect(),
                // `{"errors": {"<url>": "<reason>"}}`
                Value::Object(by_url) => by_url.keys().cloned().collect(),
                _ => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn url_of_entry(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Normalize, drop invalid entries and duplicates, keep source order, and
/// keep only the first `limit` (0 = all).
pub fn dedupe_seeds<I, S>(candidates: I, limit: usize) -> Vec<NormalizedUrl>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let unique = candidates
        .into_iter()
        .filter_map(|raw| normalize(raw.as_ref()))
        .filter(|url| seen.insert(url.clone()));

    if limit == 0 {
        unique.collect()
    } else {
        unique.take(limit).collect()
    }
}

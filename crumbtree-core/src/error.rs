use crumbtree_scanner::{FetchError, ScanError};
use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading the seed source. All of them are fatal: nothing is
/// fetched from a source that cannot be read.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unparseable sitemap XML: {0}")]
    Xml(String),

    #[error("sitemap root element is <{0}>, expected <urlset>")]
    NotUrlset(String),

    #[error("cannot fetch sitemap {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("configuration error ({path}): {reason}")]
    Configuration { path: String, reason: String },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CrawlError>;

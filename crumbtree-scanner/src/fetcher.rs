use crate::encoding::decode_body;
use crate::error::{FetchError, Result};
use crate::normalize::NormalizedUrl;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, CONTENT_TYPE};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tunables for a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Maximum number of requests in flight at once.
    pub concurrency: usize,
    pub connect_timeout: Duration,
    /// Whole-request ceiling, body included.
    pub timeout: Duration,
    /// Pause between dispatching two requests. Zero disables throttling.
    pub enqueue_delay: Duration,
    pub user_agent: String,
    pub accept_language: String,
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 24,
            connect_timeout: Duration::from_secs(8),
            timeout: Duration::from_secs(20),
            enqueue_delay: Duration::ZERO,
            user_agent: "Crumbtree/0.1 (+https://github.com/trapdoorsec/crumbtree)".to_string(),
            accept_language: "ru-RU,ru;q=0.9,en;q=0.8".to_string(),
            max_redirects: 5,
        }
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Where the redirect chain ended. Bookkeeping still uses the requested URL.
    pub final_url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: String,
    pub response_time: Duration,
}

/// Outcome of one request, always attributed to the URL that was asked for.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: NormalizedUrl,
    pub outcome: std::result::Result<Page, FetchError>,
}

impl FetchResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn page(&self) -> Option<&Page> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.outcome.as_ref().err()
    }
}

/// Owns one pooled HTTP client and fans requests out over it with bounded
/// concurrency.
pub struct Fetcher {
    client: Client,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.concurrency.max(1))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch a single URL. Never fails: errors are folded into the result.
    pub async fn fetch(&self, url: &NormalizedUrl) -> FetchResult {
        debug!("Fetching {}", url);
        let outcome = self.get(url.as_str()).await;
        if let Err(ref e) = outcome {
            warn!("Fetch failed for {}: {}", url, e);
        }
        FetchResult {
            url: url.clone(),
            outcome,
        }
    }

    /// Fetch raw text from an arbitrary URL, e.g. a remote sitemap.
    pub async fn fetch_text(&self, url: &str) -> std::result::Result<String, FetchError> {
        self.get(url).await.map(|page| page.body)
    }

    /// Fetch every URL, yielding results as they complete.
    ///
    /// At most `concurrency` requests are in flight; each completion lets the
    /// next queued URL start. Every input URL appears in the output exactly
    /// once, in completion order.
    pub fn fetch_all(&self, urls: Vec<NormalizedUrl>) -> impl Stream<Item = FetchResult> + '_ {
        let delay = self.config.enqueue_delay;
        let concurrency = self.config.concurrency.max(1);

        stream::iter(urls)
            .then(move |url| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                url
            })
            .map(move |url| async move { self.fetch(&url).await })
            .buffer_unordered(concurrency)
    }

    async fn get(&self, url: &str) -> std::result::Result<Page, FetchError> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .header(ACCEPT_LANGUAGE, self.config.accept_language.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(FetchError::EmptyBody);
        }

        Ok(Page {
            final_url,
            status_code: status.as_u16(),
            body: decode_body(&bytes, content_type.as_deref()),
            content_type,
            response_time: start.elapsed(),
        })
    }
}

use crate::error::Result;
use crate::report::{
    ArtifactPaths, ErrorsDocument, FetchErrorEntry, RunConfig, RunCounts, TreeDocument, TreeMeta,
    generated_at, write_artifacts,
};
use crate::seed::{SeedSource, load_seeds};
use crate::sink::ProductSink;
use crate::taxonomy::TaxonomyBuilder;
use crate::tree::build_tree;
use crumbtree_scanner::product::extract_product;
use crumbtree_scanner::{BreadcrumbRules, Fetcher, FetcherConfig, NormalizedUrl, Page, PageExtractor};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Options for configuring a crawl run
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub source: SeedSource,
    pub fetcher: FetcherConfig,
    pub breadcrumbs: BreadcrumbRules,
    /// Maximum seed URLs to process, 0 = unlimited
    pub limit: usize,
    /// How many roots/conflicts/errors go into the tree document's samples
    pub sample_size: usize,
    /// Log progress every N completed requests
    pub progress_every: usize,
    pub show_progress: bool,
}

impl CrawlOptions {
    pub fn new(source: SeedSource) -> Self {
        Self {
            source,
            fetcher: FetcherConfig::default(),
            breadcrumbs: BreadcrumbRules::default(),
            limit: 0,
            sample_size: 50,
            progress_every: 100,
            show_progress: false,
        }
    }

    fn run_config(&self) -> RunConfig {
        RunConfig {
            concurrency: self.fetcher.concurrency,
            connect_timeout_secs: self.fetcher.connect_timeout.as_secs(),
            timeout_secs: self.fetcher.timeout.as_secs(),
            delay_ms: self.fetcher.enqueue_delay.as_millis() as u64,
            limit: self.limit,
            sample_size: self.sample_size,
        }
    }
}

/// Running totals, reported at coarse intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlProgress {
    pub processed: usize,
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
    /// Pages that contributed something: a breadcrumb chain or a product.
    pub hits: usize,
}

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(CrawlProgress) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct TaxonomySummary {
    pub counts: RunCounts,
    pub paths: ArtifactPaths,
    pub forest_verified: bool,
}

#[derive(Debug, Clone)]
pub struct ProductSummary {
    pub source_urls: usize,
    pub processed_urls: usize,
    pub products: usize,
    pub errors: Vec<FetchErrorEntry>,
}

/// Fetch every seed, fold breadcrumb chains into the taxonomy, resolve it
/// and write the tree and errors documents.
pub async fn execute_taxonomy_crawl(
    options: CrawlOptions,
    paths: ArtifactPaths,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<TaxonomySummary> {
    let fetcher = Fetcher::new(options.fetcher.clone())?;
    let extractor = PageExtractor::new(&options.breadcrumbs)?;
    let seeds = load_seeds(&options.source, &fetcher, options.limit).await?;
    let source_urls = seeds.urls.len();

    let mut builder = TaxonomyBuilder::new();
    let (progress, errors) = drive(
        &fetcher,
        seeds.urls,
        &options,
        "with breadcrumbs",
        progress_callback,
        |url, page| {
            let Some(chain) = extractor.breadcrumbs(&page.body, url) else {
                return Ok(false);
            };
            builder.observe(&chain);
            Ok(true)
        },
    )
    .await?;

    let taxonomy = builder.resolve();
    let forest_verified = taxonomy.is_forest();
    if !forest_verified {
        warn!("Resolved taxonomy failed the forest check; the tree renderer will cut cycles");
    }
    let tree = build_tree(&taxonomy);

    let counts = RunCounts {
        source_urls,
        processed_urls: progress.processed,
        ok_pages: progress.ok,
        fetch_errors: progress.errors,
        breadcrumb_pages: progress.hits,
        nodes: taxonomy.node_count(),
        edges: taxonomy.edge_count(),
        roots: taxonomy.roots().len(),
        conflicts: taxonomy.conflicts().len(),
        rejected_edges: taxonomy.rejected_edges(),
    };

    let timestamp = generated_at();
    let meta = TreeMeta {
        generated_at: timestamp.clone(),
        source_type: options.source.kind().to_string(),
        source: options.source.location(),
        counts: counts.clone(),
        config: options.run_config(),
    };
    let tree_doc = TreeDocument::new(meta, &taxonomy, tree, &errors);
    let errors_doc = ErrorsDocument::new(timestamp, source_urls, progress.processed, errors);

    write_artifacts(&paths, &tree_doc, &errors_doc)?;

    Ok(TaxonomySummary {
        counts,
        paths,
        forest_verified,
    })
}

/// Fetch every seed and hand each extracted product to `sink`.
pub async fn execute_product_crawl(
    options: CrawlOptions,
    sink: &mut dyn ProductSink,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<ProductSummary> {
    let fetcher = Fetcher::new(options.fetcher.clone())?;
    let seeds = load_seeds(&options.source, &fetcher, options.limit).await?;
    let source_urls = seeds.urls.len();

    let (progress, errors) = drive(
        &fetcher,
        seeds.urls,
        &options,
        "with products",
        progress_callback,
        |url, page| match extract_product(&page.body, url) {
            Some(record) => sink.upsert(&record).map(|_| true),
            None => Ok(false),
        },
    )
    .await?;

    sink.finish()?;

    Ok(ProductSummary {
        source_urls,
        processed_urls: progress.processed,
        products: progress.hits,
        errors,
    })
}

/// The single accumulation loop: results arrive in completion order, pages
/// go to `on_page`, failures go to the error log keyed by requested URL.
async fn drive<F>(
    fetcher: &Fetcher,
    urls: Vec<NormalizedUrl>,
    options: &CrawlOptions,
    hit_label: &str,
    progress_callback: Option<CrawlProgressCallback>,
    mut on_page: F,
) -> Result<(CrawlProgress, Vec<FetchErrorEntry>)>
where
    F: FnMut(&NormalizedUrl, &Page) -> Result<bool>,
{
    let mut progress = CrawlProgress {
        total: urls.len(),
        ..Default::default()
    };
    let mut errors: BTreeMap<NormalizedUrl, String> = BTreeMap::new();
    let every = options.progress_every.max(1);

    let spinner = options.show_progress.then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(format!("Fetching {} URLs...", progress.total));
        pb
    });

    info!(
        "Fetching {} URLs with concurrency {}",
        progress.total, options.fetcher.concurrency
    );

    let mut results = pin!(fetcher.fetch_all(urls));
    while let Some(result) = results.next().await {
        progress.processed += 1;

        match &result.outcome {
            Ok(page) => {
                progress.ok += 1;
                if on_page(&result.url, page)? {
                    progress.hits += 1;
                }
            }
            Err(e) => {
                progress.errors += 1;
                errors.insert(result.url.clone(), e.to_string());
            }
        }

        let message = format!(
            "{}/{} processed, {} ok, {} errors, {} {}",
            progress.processed,
            progress.total,
            progress.ok,
            progress.errors,
            progress.hits,
            hit_label
        );
        if let Some(pb) = &spinner {
            pb.set_message(message.clone());
        }
        if progress.processed % every == 0 || progress.processed == progress.total {
            info!("{}", message);
            if let Some(callback) = &progress_callback {
                callback(progress);
            }
        }
    }

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let errors = errors
        .into_iter()
        .map(|(url, error)| FetchErrorEntry {
            url: url.to_string(),
            error,
        })
        .collect();
    Ok((progress, errors))
}

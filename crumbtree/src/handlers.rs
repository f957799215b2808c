use anyhow::{Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use crumbtree_core::crawl::{
    CrawlOptions, TaxonomySummary, execute_product_crawl, execute_taxonomy_crawl,
};
use crumbtree_core::report::{ArtifactPaths, ErrorsDocument, generated_at, write_json};
use crumbtree_core::seed::SeedSource;
use crumbtree_core::sink::JsonLinesSink;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber. `RUST_LOG` wins over the default level.
pub fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Expand a leading `~` in a user supplied path
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

pub fn seed_source_from_args(args: &ArgMatches) -> Result<SeedSource> {
    if let Some(location) = args.get_one::<String>("sitemap") {
        let lowered = location.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            return Ok(SeedSource::Sitemap(location.clone()));
        }
        return Ok(SeedSource::Sitemap(
            expand_path(location).display().to_string(),
        ));
    }

    if let Some(path) = args.get_one::<PathBuf>("url-list") {
        return Ok(SeedSource::UrlList(expand_path(&path.to_string_lossy())));
    }

    bail!("Either --sitemap or --url-list must be provided")
}

pub fn crawl_options_from_args(args: &ArgMatches) -> Result<CrawlOptions> {
    let mut options = CrawlOptions::new(seed_source_from_args(args)?);

    if let Some(concurrency) = args.get_one::<usize>("concurrency") {
        options.fetcher.concurrency = (*concurrency).max(1);
    }
    if let Some(secs) = args.get_one::<u64>("connect-timeout") {
        options.fetcher.connect_timeout = Duration::from_secs(*secs);
    }
    if let Some(secs) = args.get_one::<u64>("timeout") {
        options.fetcher.timeout = Duration::from_secs(*secs);
    }
    if let Some(millis) = args.get_one::<u64>("delay-ms") {
        options.fetcher.enqueue_delay = Duration::from_millis(*millis);
    }
    if let Some(limit) = args.get_one::<usize>("limit") {
        options.limit = *limit;
    }
    if let Some(every) = args.get_one::<usize>("progress-every") {
        options.progress_every = (*every).max(1);
    }
    // Only the taxonomy subcommand defines it.
    if let Ok(Some(sample)) = args.try_get_one::<usize>("sample-size") {
        options.sample_size = *sample;
    }
    options.show_progress = !args.get_flag("quiet");

    Ok(options)
}

pub async fn handle_taxonomy(args: &ArgMatches) -> Result<()> {
    let options = crawl_options_from_args(args)?;
    let out_dir = args
        .get_one::<String>("out-dir")
        .map(|dir| expand_path(dir))
        .unwrap_or_else(|| PathBuf::from("storage/taxonomy"));
    debug!("Taxonomy crawl options: {:?}", options);

    eprintln!(
        "{} Crawling {} {}",
        "→".blue(),
        options.source.kind(),
        options.source.location().bright_white()
    );

    let summary = execute_taxonomy_crawl(options, ArtifactPaths::in_dir(out_dir), None).await?;
    println!("{}", format_taxonomy_summary(&summary));
    Ok(())
}

pub async fn handle_products(args: &ArgMatches) -> Result<()> {
    let options = crawl_options_from_args(args)?;
    let output = args
        .get_one::<String>("output")
        .map(|path| expand_path(path))
        .unwrap_or_else(|| PathBuf::from("storage/products.jsonl"));
    debug!("Product crawl options: {:?}", options);

    let mut sink = JsonLinesSink::new(&output);
    let summary = execute_product_crawl(options, &mut sink, None).await?;

    println!("\n{} Product crawl complete!\n", "✓".green().bold());
    println!("  Seed URLs:      {}", summary.source_urls);
    println!("  Processed:      {}", summary.processed_urls);
    println!("  Products:       {}", summary.products.to_string().green());
    println!("  Fetch errors:   {}", summary.errors.len().to_string().yellow());
    println!("  Records:        {}", sink.path().display());

    if !summary.errors.is_empty() {
        let errors_path = output.with_extension("errors.json");
        let doc = ErrorsDocument::new(
            generated_at(),
            summary.source_urls,
            summary.processed_urls,
            summary.errors,
        );
        write_json(&errors_path, &doc, "errors document")?;
        println!("  Errors log:     {}", errors_path.display());
    }
    Ok(())
}

/// The final report printed after a taxonomy run.
pub fn format_taxonomy_summary(summary: &TaxonomySummary) -> String {
    let counts = &summary.counts;
    let mut report = String::new();

    report.push_str(&format!("\n{} Taxonomy crawl complete!\n\n", "✓".green().bold()));
    report.push_str(&format!(
        "  Pages:          {}/{} processed, {} ok, {} errors\n",
        counts.processed_urls,
        counts.source_urls,
        counts.ok_pages,
        counts.fetch_errors.to_string().yellow()
    ));
    report.push_str(&format!(
        "  Breadcrumbs:    {} pages\n",
        counts.breadcrumb_pages
    ));
    report.push_str(&format!(
        "  Nodes:          {}\n",
        counts.nodes.to_string().green().bold()
    ));
    report.push_str(&format!("  Edges:          {}\n", counts.edges));
    report.push_str(&format!("  Roots:          {}\n", counts.roots));
    report.push_str(&format!("  Conflicts:      {}\n", counts.conflicts));
    if counts.rejected_edges > 0 {
        report.push_str(&format!(
            "  Cycle edges:    {} rejected\n",
            counts.rejected_edges
        ));
    }
    if !summary.forest_verified {
        report.push_str(&format!(
            "  {} forest check failed, see logs\n",
            "⚠".yellow().bold()
        ));
    }
    report.push_str(&format!("\n  Tree:           {}\n", summary.paths.tree.display()));
    report.push_str(&format!("  Errors:         {}\n", summary.paths.errors.display()));
    report
}

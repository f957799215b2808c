pub mod commands;

// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub use commands::command_argument_builder;
pub use handlers::{
    crawl_options_from_args, expand_path, format_taxonomy_summary, seed_source_from_args,
};

// Re-export crawl functionality from crumbtree-core
pub use crumbtree_core::crawl::{
    CrawlOptions, CrawlProgressCallback, execute_product_crawl, execute_taxonomy_crawl,
};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

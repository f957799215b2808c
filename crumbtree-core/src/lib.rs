pub mod crawl;
pub mod error;
pub mod report;
pub mod seed;
pub mod sink;
pub mod taxonomy;
pub mod tree;

pub use error::{CrawlError, SeedError};
pub use taxonomy::{Conflict, ResolvedNode, Taxonomy, TaxonomyBuilder};
pub use tree::TreeNode;

pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
   ___                  _    _
  / __|_ _ _  _ _ __ | |__| |_ _ _ ___ ___
 | (__| '_| || | '  \| '_ \  _| '_/ -_) -_)
  \___|_|  \_,_|_|_|_|_.__/\__|_| \___\___|  v{}

  breadcrumbs in, category tree out
"#,
        version
    );
}

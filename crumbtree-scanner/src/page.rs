use crate::breadcrumb::{BreadcrumbChain, BreadcrumbExtractor, BreadcrumbRules};
use crate::error::Result;
use crate::normalize::NormalizedUrl;
use crate::product::{ProductRecord, extract_product_from};
use scraper::Html;

/// Everything a page can contribute. Both halves are optional: a page with
/// neither is simply skipped.
#[derive(Debug, Clone, Default)]
pub struct PageData {
    pub breadcrumbs: Option<BreadcrumbChain>,
    pub product: Option<ProductRecord>,
}

impl PageData {
    pub fn is_empty(&self) -> bool {
        self.breadcrumbs.is_none() && self.product.is_none()
    }
}

/// Parses a page once and runs the extractors over the shared document.
/// Pure in `(html, url)`, so it is safe to call from any task.
pub struct PageExtractor {
    breadcrumbs: BreadcrumbExtractor,
}

impl PageExtractor {
    pub fn new(rules: &BreadcrumbRules) -> Result<Self> {
        Ok(Self {
            breadcrumbs: BreadcrumbExtractor::new(rules)?,
        })
    }

    /// Breadcrumbs only; what the taxonomy crawl needs.
    pub fn breadcrumbs(&self, html: &str, page_url: &NormalizedUrl) -> Option<BreadcrumbChain> {
        self.breadcrumbs.extract(html, page_url)
    }

    pub fn extract(&self, html: &str, page_url: &NormalizedUrl) -> PageData {
        let document = Html::parse_document(html);
        PageData {
            breadcrumbs: self.breadcrumbs.extract_from(&document, page_url),
            product: extract_product_from(&document, page_url),
        }
    }
}

use crate::error::{Result, ScanError};
use crate::normalize::{NormalizedUrl, resolve};
use crate::text::{element_text, is_numeric_label};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreadcrumbItem {
    pub name: String,
    pub url: Option<NormalizedUrl>,
}

impl BreadcrumbItem {
    pub fn new(name: impl Into<String>, url: Option<NormalizedUrl>) -> Self {
        Self {
            name: name.into(),
            url,
        }
    }
}

/// A page's ancestry, outermost category first, the page itself last.
///
/// Always holds at least two items and no two neighbours share a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreadcrumbChain {
    items: Vec<BreadcrumbItem>,
}

impl BreadcrumbChain {
    /// Collapse consecutive duplicate URLs; `None` if fewer than two remain.
    pub fn new(mut items: Vec<BreadcrumbItem>) -> Option<Self> {
        items.dedup_by(|later, earlier| later.url.is_some() && later.url == earlier.url);
        (items.len() >= 2).then_some(Self { items })
    }

    pub fn items(&self) -> &[BreadcrumbItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Adjacent `(parent, child)` pairs in chain order.
    pub fn links(&self) -> impl Iterator<Item = (&BreadcrumbItem, &BreadcrumbItem)> {
        self.items.windows(2).map(|pair| (&pair[0], &pair[1]))
    }
}

/// Markup conventions for locating the breadcrumb widget.
#[derive(Debug, Clone)]
pub struct BreadcrumbRules {
    /// The list element holding the trail.
    pub container_selector: String,
    /// One crumb, relative to the container.
    pub item_selector: String,
    /// Preferred label element nested inside a crumb's anchor.
    pub label_selector: String,
    /// Lower-case words marking the leading "home" crumb.
    pub home_words: Vec<String>,
}

impl Default for BreadcrumbRules {
    fn default() -> Self {
        Self {
            container_selector: "ul.breadcrumb, ol.breadcrumb".to_string(),
            item_selector: "li".to_string(),
            label_selector: "span".to_string(),
            home_words: vec!["главная".to_string()],
        }
    }
}

pub struct BreadcrumbExtractor {
    container: Selector,
    item: Selector,
    anchor: Selector,
    label: Selector,
    home_words: Vec<String>,
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::ParseError(format!("selector '{}': {}", css, e)))
}

impl BreadcrumbExtractor {
    pub fn new(rules: &BreadcrumbRules) -> Result<Self> {
        Ok(Self {
            container: parse_selector(&rules.container_selector)?,
            item: parse_selector(&rules.item_selector)?,
            anchor: parse_selector("a")?,
            label: parse_selector(&rules.label_selector)?,
            home_words: rules.home_words.iter().map(|w| w.to_lowercase()).collect(),
        })
    }

    pub fn extract(&self, html: &str, page_url: &NormalizedUrl) -> Option<BreadcrumbChain> {
        let document = Html::parse_document(html);
        self.extract_from(&document, page_url)
    }

    /// Read the trail from an already parsed document. `None` means the page
    /// carries no usable taxonomy signal.
    pub fn extract_from(&self, document: &Html, page_url: &NormalizedUrl) -> Option<BreadcrumbChain> {
        let container = document.select(&self.container).next()?;

        let mut items: Vec<BreadcrumbItem> = container
            .select(&self.item)
            .filter(|item| !self.is_nested_item(item, &container))
            .map(|item| self.read_item(&item, page_url))
            .filter(|item| !item.name.is_empty() && !is_numeric_label(&item.name))
            .collect();

        if items.first().is_some_and(|first| self.is_home(first)) {
            items.remove(0);
        }

        if let Some(last) = items.last_mut()
            && last.url.is_none()
        {
            last.url = Some(page_url.clone());
        }

        items.retain(|item| item.url.is_some());

        let chain = BreadcrumbChain::new(items);
        if chain.is_none() {
            debug!("No usable breadcrumb chain on {}", page_url);
        }
        chain
    }

    fn read_item(&self, item: &ElementRef<'_>, page_url: &NormalizedUrl) -> BreadcrumbItem {
        let anchor = item.select(&self.anchor).next();

        let name = anchor
            .as_ref()
            .and_then(|a| a.select(&self.label).next())
            .map(|label| element_text(&label))
            .filter(|s| !s.is_empty())
            .or_else(|| anchor.as_ref().map(element_text).filter(|s| !s.is_empty()))
            .unwrap_or_else(|| element_text(item));

        let url = anchor
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve(href, page_url.as_str()));

        BreadcrumbItem { name, url }
    }

    fn is_home(&self, item: &BreadcrumbItem) -> bool {
        if item.url.as_ref().is_some_and(NormalizedUrl::is_root) {
            return true;
        }
        let label = item.name.to_lowercase();
        self.home_words.iter().any(|word| label.contains(word.as_str()))
    }

    /// Crumbs inside another crumb (drop-down menus) are not part of the trail.
    fn is_nested_item(&self, item: &ElementRef<'_>, container: &ElementRef<'_>) -> bool {
        item.ancestors()
            .take_while(|node| node.id() != container.id())
            .filter_map(ElementRef::wrap)
            .any(|ancestor| self.item.matches(&ancestor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn extractor() -> BreadcrumbExtractor {
        BreadcrumbExtractor::new(&BreadcrumbRules::default()).unwrap()
    }

    fn page(path: &str) -> NormalizedUrl {
        normalize(&format!("https://shop.example{}", path)).unwrap()
    }

    fn names(chain: &BreadcrumbChain) -> Vec<&str> {
        chain.items().iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_home_crumb_at_root_is_trimmed() {
        let html = r#"<html><body><ul class="breadcrumb">
            <li><a href="/">Home</a></li>
            <li><a href="/tools/"><span>Tools</span></a></li>
            <li><a href="/tools/drills/"><span>Drills</span></a></li>
            <li>Drill X</li>
        </ul></body></html>"#;

        let chain = extractor().extract(html, &page("/product/drill-x")).unwrap();
        assert_eq!(names(&chain), vec!["Tools", "Drills", "Drill X"]);
        assert_eq!(chain.items()[0].url, Some(page("/tools")));
        assert_eq!(chain.items()[2].url, Some(page("/product/drill-x")));
    }

    #[test]
    fn test_home_word_trimmed_even_off_root() {
        let html = r#"<ul class="breadcrumb">
            <li><a href="/index.php">Главная страница</a></li>
            <li><a href="/catalog/">Каталог</a></li>
            <li><a href="/catalog/drills/">Дрели</a></li>
        </ul>"#;

        let chain = extractor().extract(html, &page("/catalog/drills")).unwrap();
        assert_eq!(names(&chain), vec!["Каталог", "Дрели"]);
    }

    #[test]
    fn test_single_crumb_contributes_nothing() {
        let html = r#"<ul class="breadcrumb">
            <li><a href="/">Home</a></li>
            <li>Tools</li>
        </ul>"#;
        assert!(extractor().extract(html, &page("/tools")).is_none());
    }

    #[test]
    fn test_numeric_and_empty_labels_dropped() {
        let html = r#"<ul class="breadcrumb">
            <li><a href="/tools/">Tools</a></li>
            <li><a href="/tools/?page=2">2</a></li>
            <li><a href="/tools/x"> </a></li>
            <li><a href="/tools/drills/">Drills</a></li>
        </ul>"#;
        let chain = extractor().extract(html, &page("/tools/drills")).unwrap();
        assert_eq!(names(&chain), vec!["Tools", "Drills"]);
    }

    #[test]
    fn test_consecutive_duplicate_urls_collapse() {
        let html = r#"<ul class="breadcrumb">
            <li><a href="/tools/">Tools</a></li>
            <li><a href="/tools/drills/">Drills</a></li>
            <li>Drills</li>
        </ul>"#;
        let chain = extractor().extract(html, &page("/tools/drills/")).unwrap();
        assert_eq!(names(&chain), vec!["Tools", "Drills"]);
    }

    #[test]
    fn test_label_fallbacks() {
        let html = r#"<ul class="breadcrumb">
            <li><a href="/a/"><span itemprop="name"> Anchor Span </span><i>icon</i></a></li>
            <li><a href="/a/b/">Anchor Text</a></li>
            <li><b>Item</b> Text</li>
        </ul>"#;
        let chain = extractor().extract(html, &page("/a/b/c")).unwrap();
        assert_eq!(names(&chain), vec!["Anchor Span", "Anchor Text", "Item Text"]);
    }

    #[test]
    fn test_nested_menu_items_ignored() {
        let html = r#"<ul class="breadcrumb">
            <li><a href="/tools/">Tools</a>
                <ul class="dropdown"><li><a href="/garden/">Garden</a></li></ul>
            </li>
            <li><a href="/tools/drills/">Drills</a></li>
        </ul>"#;
        let chain = extractor().extract(html, &page("/tools/drills")).unwrap();
        assert_eq!(names(&chain), vec!["Tools", "Drills"]);
    }

    #[test]
    fn test_relative_hrefs_resolved_against_page() {
        let html = r#"<ol class="breadcrumb">
            <li><a href="../">Tools</a></li>
            <li><a href="./">Drills</a></li>
        </ol>"#;
        let base = normalize("https://shop.example/tools/drills/x").unwrap();
        let chain = extractor().extract(html, &base).unwrap();
        assert_eq!(chain.items()[0].url, Some(page("/tools")));
        assert_eq!(chain.items()[1].url, Some(page("/tools/drills")));
    }

    #[test]
    fn test_missing_or_malformed_markup_is_not_an_error() {
        assert!(extractor().extract("", &page("/x")).is_none());
        assert!(extractor().extract("<div><p>no crumbs", &page("/x")).is_none());

        let broken = r#"<ul class="breadcrumb"><li><a href="/a/">A<li><a href="/a/b/">B</ul"#;
        let chain = extractor().extract(broken, &page("/a/b"));
        assert!(chain.is_some());
    }

    #[test]
    fn test_links_iterate_adjacent_pairs() {
        let html = r#"<ul class="breadcrumb">
            <li><a href="/a/">A</a></li><li><a href="/a/b/">B</a></li><li>C</li>
        </ul>"#;
        let chain = extractor().extract(html, &page("/a/b/c")).unwrap();
        let pairs: Vec<(&str, &str)> = chain
            .links()
            .map(|(p, c)| (p.name.as_str(), c.name.as_str()))
            .collect();
        assert_eq!(pairs, vec![("A", "B"), ("B", "C")]);
    }
}
